use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::oauth::{ConnectorError, ConnectorRegistry, decode_platform_error};
use crate::storage::{Platform, SocialAccountRecord, Storage};

pub const DEFAULT_METRICS: &[&str] = &["reach", "profile_views", "follower_count"];
pub const DEFAULT_PERIOD: &str = "day";

/// Metrics the Graph API only serves with `metric_type=total_value`.
const TOTAL_VALUE_METRICS: &[&str] = &["profile_views"];

/// follower_count is not an insights metric at all; it is read off the
/// profile and reported as a synthetic single-value metric.
const FOLLOWER_COUNT: &str = "follower_count";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightMetric {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    pub values: Vec<MetricValue>,
}

/// Resolved insights request parameters.
#[derive(Debug, Clone)]
pub struct InsightsParams {
    pub metrics: Vec<String>,
    pub period: String,
    pub since: Option<String>,
    pub until: Option<String>,
}

impl Default for InsightsParams {
    fn default() -> Self {
        Self {
            metrics: DEFAULT_METRICS.iter().map(|m| m.to_string()).collect(),
            period: DEFAULT_PERIOD.to_string(),
            since: None,
            until: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphInsightsResponse {
    #[serde(default)]
    data: Vec<GraphInsight>,
}

#[derive(Debug, Deserialize)]
struct GraphInsight {
    name: String,
    #[serde(default)]
    period: Option<String>,
    #[serde(default)]
    values: Vec<GraphInsightValue>,
    #[serde(default)]
    total_value: Option<GraphTotalValue>,
}

#[derive(Debug, Deserialize)]
struct GraphInsightValue {
    value: serde_json::Value,
    #[serde(default)]
    end_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphTotalValue {
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct FollowersResponse {
    #[serde(default)]
    followers_count: Option<i64>,
}

/// Split requested metric names into the bucket served by plain insights
/// calls, the bucket requiring `metric_type=total_value`, and whether the
/// synthetic follower count was asked for.
fn partition_metrics(metrics: &[String]) -> (Vec<String>, Vec<String>, bool) {
    let mut series = Vec::new();
    let mut total = Vec::new();
    let mut followers = false;

    for metric in metrics {
        if metric == FOLLOWER_COUNT {
            followers = true;
        } else if TOTAL_VALUE_METRICS.contains(&metric.as_str()) {
            total.push(metric.clone());
        } else {
            series.push(metric.clone());
        }
    }

    (series, total, followers)
}

/// Fetches Instagram insights for connected accounts, transparently
/// refreshing an expired access token exactly once.
pub struct AnalyticsService {
    storage: Arc<Storage>,
    connectors: ConnectorRegistry,
    http: reqwest::Client,
    graph_api_url: String,
}

impl AnalyticsService {
    pub fn new(
        storage: Arc<Storage>,
        connectors: ConnectorRegistry,
        http: reqwest::Client,
        graph_api_url: String,
    ) -> Self {
        Self {
            storage,
            connectors,
            http,
            graph_api_url,
        }
    }

    pub async fn get_insights(
        &self,
        account_id: &str,
        user_id: i64,
        params: &InsightsParams,
    ) -> Result<Vec<InsightMetric>, ConnectorError> {
        let account = self
            .storage
            .database
            .find_account_for_user(account_id, user_id)
            .await?
            .ok_or(ConnectorError::AccountNotFound)?;

        if account.platform != Platform::Instagram {
            return Err(ConnectorError::UnsupportedPlatform(account.platform));
        }

        if !account.has_resolved_identity() {
            return Err(ConnectorError::UnresolvedIdentity {
                message: "This account was connected without a platform identity. \
                          Reconnect it via OAuth to enable analytics."
                    .to_string(),
            });
        }

        match self.fetch_all(&account, params).await {
            Err(err) if err.is_auth_expired() => {
                info!(account_id = %account.id, "Access token rejected, refreshing and retrying");
                let connector = self.connectors.get(account.platform)?;
                connector.refresh_token(&account.id).await?;

                let refreshed = self
                    .storage
                    .database
                    .find_account(&account.id)
                    .await?
                    .ok_or(ConnectorError::AccountNotFound)?;
                // Second rejection propagates; there is no third attempt.
                self.fetch_all(&refreshed, params).await
            }
            result => result,
        }
    }

    async fn fetch_all(
        &self,
        account: &SocialAccountRecord,
        params: &InsightsParams,
    ) -> Result<Vec<InsightMetric>, ConnectorError> {
        let (series, total, followers) = partition_metrics(&params.metrics);
        let mut metrics = Vec::new();

        if !series.is_empty() {
            metrics.extend(
                self.fetch_insights(account, &series, &params.period, params, false)
                    .await?,
            );
        }

        if !total.is_empty() {
            metrics.extend(
                self.fetch_insights(account, &total, &params.period, params, true)
                    .await?,
            );
        }

        if followers {
            // Follower count is best-effort; its failure never sinks the
            // rest of the response, auth errors included.
            match self.fetch_follower_count(account).await {
                Ok(Some(count)) => metrics.push(InsightMetric {
                    name: FOLLOWER_COUNT.to_string(),
                    period: None,
                    values: vec![MetricValue {
                        value: serde_json::json!(count),
                        end_time: None,
                    }],
                }),
                Ok(None) => {}
                Err(err) => {
                    warn!(account_id = %account.id, error = %err, "Follower count fetch failed");
                }
            }
        }

        Ok(metrics)
    }

    async fn fetch_insights(
        &self,
        account: &SocialAccountRecord,
        metric_names: &[String],
        period: &str,
        params: &InsightsParams,
        total_value: bool,
    ) -> Result<Vec<InsightMetric>, ConnectorError> {
        let mut query: Vec<(&str, String)> = vec![
            ("metric", metric_names.join(",")),
            ("period", period.to_string()),
            ("access_token", account.access_token.clone()),
        ];
        if total_value {
            query.push(("metric_type", "total_value".to_string()));
        }
        if let Some(since) = &params.since {
            query.push(("since", since.clone()));
        }
        if let Some(until) = &params.until {
            query.push(("until", until.clone()));
        }

        let response = self
            .http
            .get(format!(
                "{}/{}/insights",
                self.graph_api_url, account.platform_user_id
            ))
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(decode_platform_error(response).await);
        }

        let body: GraphInsightsResponse = response.json().await?;
        Ok(body
            .data
            .into_iter()
            .map(|insight| {
                let values = if insight.values.is_empty() {
                    insight
                        .total_value
                        .map(|t| {
                            vec![MetricValue {
                                value: t.value,
                                end_time: None,
                            }]
                        })
                        .unwrap_or_default()
                } else {
                    insight
                        .values
                        .into_iter()
                        .map(|v| MetricValue {
                            value: v.value,
                            end_time: v.end_time,
                        })
                        .collect()
                };

                InsightMetric {
                    name: insight.name,
                    period: insight.period,
                    values,
                }
            })
            .collect())
    }

    async fn fetch_follower_count(
        &self,
        account: &SocialAccountRecord,
    ) -> Result<Option<i64>, ConnectorError> {
        let response = self
            .http
            .get(format!(
                "{}/{}",
                self.graph_api_url, account.platform_user_id
            ))
            .query(&[
                ("fields", "followers_count"),
                ("access_token", account.access_token.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(decode_platform_error(response).await);
        }

        let body: FollowersResponse = response.json().await?;
        Ok(body.followers_count)
    }
}
