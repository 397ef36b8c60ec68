//! Health report and event stream handlers

use std::convert::Infallible;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures_util::stream::{self, Stream};
use tokio::sync::mpsc;
use tracing::warn;
use vigil_health::{Report, Unsubscribe};

use super::state::AppState;

/// Render the current health report.
///
/// Responds 500 while the system is in outage so load balancers can act
/// on the status code alone.
pub async fn health_report(State(state): State<AppState>) -> Response {
    let report = state.monitor.report();

    let body = match serde_json::to_vec(&report) {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, "Failed to serialize health report");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let status = if report.is_outage() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Stream every check and system transition via SSE.
pub async fn stream_reports(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (reports, unsubscribe) = state.monitor.subscribe();
    let subscription = Subscription {
        reports,
        unsubscribe: Some(unsubscribe),
    };

    let stream = stream::unfold(subscription, |mut subscription| async move {
        match subscription.reports.recv().await {
            Some(report) => Some((Ok(report_event(&report)), subscription)),
            // the monitor stopped or this subscription was removed
            None => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keep_alive).text("ping"))
}

fn report_event(report: &Report) -> Event {
    let kind = if report.is_system() { "system" } else { "check" };
    match Event::default().event(kind).json_data(report) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "Failed to serialize report event");
            Event::default().comment("unserializable report")
        }
    }
}

/// Subscription held by one event stream; released when the client goes away.
struct Subscription {
    reports: mpsc::Receiver<Report>,
    unsubscribe: Option<Unsubscribe>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe.unsubscribe();
        }
    }
}
