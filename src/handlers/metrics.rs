use axum::{extract::State, http::header, response::IntoResponse, Json};
use prometheus::proto::{MetricFamily, MetricType};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::AppState;

use super::AppError;

/// One labelled series of a metric family.
#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    /// Counter value, or number of observations for a histogram.
    pub count: f64,
    /// Sum of observed seconds; histograms only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub metrics: BTreeMap<String, Vec<Series>>,
}

// ─── GET /metrics ────────────────────────────────────────────────
/// Prometheus text exposition of the whole registry.

pub async fn exposition(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let body = state.registry.encode_text()?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

// ─── GET /api/metrics ────────────────────────────────────────────
/// JSON view of the redis_* families — handy for curl / debugging.

pub async fn summary(State(state): State<Arc<AppState>>) -> Json<Summary> {
    Json(summarize(&state.registry.gather()))
}

fn summarize(families: &[MetricFamily]) -> Summary {
    let metrics = families
        .iter()
        .filter(|f| f.get_name().contains("redis_"))
        .map(|family| {
            let series = family
                .get_metric()
                .iter()
                .map(|m| {
                    let labels = m
                        .get_label()
                        .iter()
                        .map(|l| (l.get_name().to_owned(), l.get_value().to_owned()))
                        .collect();
                    match family.get_field_type() {
                        MetricType::HISTOGRAM => Series {
                            labels,
                            count: m.get_histogram().get_sample_count() as f64,
                            sum_secs: Some(m.get_histogram().get_sample_sum()),
                        },
                        _ => Series {
                            labels,
                            count: m.get_counter().get_value(),
                            sum_secs: None,
                        },
                    }
                })
                .collect();
            (family.get_name().to_owned(), series)
        })
        .collect();

    Summary { metrics }
}
