//! HTTP probe used by configured checks.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use vigil_health::{CheckError, Evaluation, Periodic, Probe, Shutdown, State};

use crate::config::HttpCheckConfig;

/// Map an HTTP status code to a health state.
///
/// Only `200` is fully healthy. Other success codes degrade to minor,
/// redirects to major and client errors to outage. Server errors and
/// anything unexpected carry no verdict.
pub fn state_for_status(status: u16) -> State {
    match status {
        200 => State::Ok,
        201..=299 => State::Minor,
        300..=399 => State::Major,
        400..=499 => State::Outage,
        _ => State::Unknown,
    }
}

/// Probe that issues a GET request and grades the response status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn run(&self, _shutdown: Shutdown) -> Evaluation {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(url = %self.url, status, "HTTP probe answered");
                match state_for_status(status) {
                    State::Ok => Evaluation::new(State::Ok),
                    state => Evaluation::with_error(
                        state,
                        CheckError::msg(format!("{} responded with status {}", self.url, status)),
                    ),
                }
            }
            Err(err) => Evaluation::with_error(State::Unknown, CheckError::new(err)),
        }
    }
}

/// Build the periodic check described by `config`.
pub fn http_check(config: &HttpCheckConfig, client: reqwest::Client) -> Periodic {
    Periodic::new(
        config.metadata(),
        config.interval(),
        Arc::new(HttpProbe::new(client, config.url.clone())),
    )
    .with_timeout(config.timeout())
}
