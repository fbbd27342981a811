use std::collections::BTreeMap;

/// Turn a metric map into a short human-readable summary with
/// recommendations. Rule-based; no external model involved.
pub fn generate_insight_text(metrics: &BTreeMap<String, f64>) -> String {
    let mut summary_parts = Vec::new();
    let mut recommendations = Vec::new();

    if let Some(reach) = metrics.get("reach") {
        summary_parts.push(format!("your content reached {:.0} accounts", reach));
        if *reach < 1000.0 {
            recommendations.push(
                "Post consistently and use relevant hashtags to grow your reach.".to_string(),
            );
        } else {
            recommendations
                .push("Your reach is solid. Experiment with new formats to keep it growing.".to_string());
        }
    }

    if let Some(views) = metrics.get("profile_views") {
        summary_parts.push(format!("{:.0} people viewed your profile", views));
        if *views < 100.0 {
            recommendations.push(
                "Add a clear call to action in your posts to drive more profile visits."
                    .to_string(),
            );
        }
    }

    if let Some(followers) = metrics.get("follower_count") {
        summary_parts.push(format!("you have {:.0} followers", followers));
        recommendations.push(
            "Engage with comments and similar accounts to keep your follower base active."
                .to_string(),
        );
    }

    for (name, value) in metrics {
        if !matches!(name.as_str(), "reach" | "profile_views" | "follower_count") {
            summary_parts.push(format!("{} is at {:.0}", name.replace('_', " "), value));
        }
    }

    if summary_parts.is_empty() {
        return "No metrics provided, so there is nothing to summarize yet. Connect an account \
                and fetch analytics first."
            .to_string();
    }

    let mut text = format!("Summary: Over this period, {}.", summary_parts.join(", "));
    if !recommendations.is_empty() {
        text.push_str("\nRecommendations:");
        for rec in recommendations {
            text.push_str("\n- ");
            text.push_str(&rec);
        }
    }
    text
}
