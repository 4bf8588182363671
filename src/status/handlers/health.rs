use crate::agent::{AgentMetrics, AgentState};
use crate::status::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    running: bool,
    polls: u64,
    last_poll: Option<i64>,
    last_poll_metrics: usize,
}

fn create_health_response(state: &AgentState) -> Health {
    Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        running: state.running,
        polls: state.polls,
        last_poll: state.last_poll,
        last_poll_metrics: state.last_poll_metrics,
    }
}

// HEAD and OPTIONS only get the status and headers
fn create_response_body(method: &Method, health: &Health) -> Body {
    if method == Method::GET {
        Json(health).into_response().into_body()
    } else {
        Body::empty()
    }
}

// X-App: name:version:short-commit
fn create_app_headers(health: &Health) -> HeaderMap {
    let short_hash = health.commit.get(..7).unwrap_or("");

    let header_value = format!("{}:{}:{}", health.name, health.version, short_hash);

    match header_value.parse::<HeaderValue>() {
        Ok(x_app_header_value) => {
            debug!("X-App header: {:?}", x_app_header_value);
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        }
        Err(err) => {
            debug!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        }
    }
}

/// Reports whether the poll scheduler is running.
pub async fn health(method: Method, Extension(metrics): Extension<AgentMetrics>) -> impl IntoResponse {
    let state = metrics.state();
    let health = create_health_response(&state);
    let body = create_response_body(&method, &health);
    let headers = create_app_headers(&health);

    if state.running {
        (StatusCode::OK, headers, body)
    } else {
        debug!("agent is not running");
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
