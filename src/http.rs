//! Outbound HTTP on the blocking pool.
//!
//! `ureq` is synchronous, so every request runs under `spawn_blocking` and is
//! bounded twice: by the agent's socket timeout and by a `tokio` timeout on
//! the awaiting future. When the future times out it is dropped and its
//! result, if one ever arrives, is discarded.

use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "storefront-locale/0.3";

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("unreadable body: {0}")]
    Body(String),
}

/// GET `url` with `query` and return the body of a 2xx response.
pub async fn get_text(
    url: &str,
    query: &[(&str, String)],
    timeout: Duration,
) -> Result<String, HttpError> {
    let url = url.to_string();
    let query: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();

    let task = tokio::task::spawn_blocking(move || {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build();
        let mut req = agent.get(&url);
        for (k, v) in &query {
            req = req.query(k, v);
        }
        match req.call() {
            Ok(resp) => resp.into_string().map_err(|e| HttpError::Body(e.to_string())),
            Err(ureq::Error::Status(code, _)) => Err(HttpError::Status(code)),
            Err(e) => Err(HttpError::Network(e.to_string())),
        }
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(HttpError::Network(join.to_string())),
        Err(_) => Err(HttpError::Timeout(timeout)),
    }
}
