use crate::agent::AgentMetrics;
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use tracing::{debug, error};

pub async fn metrics(Extension(metrics): Extension<AgentMetrics>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        "content-type",
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );

    match metrics.encode() {
        Ok(body) => {
            debug!("Successfully encoded agent metrics");
            (StatusCode::OK, headers, body)
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                format!("Error encoding metrics: {}", e),
            )
        }
    }
}
