use axum::{Json, Router, routing::post};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::server::Server;
use crate::summarization::generate_insight_text;

#[derive(Debug, Deserialize)]
pub struct InsightTextRequest {
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize)]
pub struct InsightTextResponse {
    pub insight: String,
}

pub fn create_ai_routes() -> Router<Server> {
    Router::new().route("/insights", post(insights))
}

async fn insights(Json(payload): Json<InsightTextRequest>) -> Json<InsightTextResponse> {
    Json(InsightTextResponse {
        insight: generate_insight_text(&payload.metrics),
    })
}
