use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::export::Summary;
use crate::monitor::Monitor;
use crate::AppState;

// ─── GET /metrics/stream ─────────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes the full cross-store summary as JSON every `stream.interval_ms`.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let period = Duration::from_millis(state.monitor.config().stream.interval_ms);
    let interval = tokio::time::interval(period);

    let stream = IntervalStream::new(interval)
        .filter_map(move |_| summary_event(&state.monitor).map(Ok));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// One `summary` event, or `None` when the summary fails to serialize.
fn summary_event(monitor: &Monitor) -> Option<Event> {
    match serde_json::to_string(&Summary::build(monitor)) {
        Ok(json) => Some(Event::default().event("summary").data(json)),
        Err(e) => {
            tracing::error!(error = %e, "summary serialization failed, event skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use axum::response::IntoResponse;

    #[test]
    fn summary_event_carries_json_payload() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        assert!(summary_event(&monitor).is_some());
    }

    #[tokio::test]
    async fn stream_emits_a_non_empty_summary_frame() {
        let monitor = Monitor::new(MonitorConfig::default()).unwrap();
        let state = Arc::new(AppState::new(monitor));
        let mut body = metrics_stream(State(state))
            .await
            .into_response()
            .into_body()
            .into_data_stream();

        let frame = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();
        assert!(text.starts_with("event: summary\n"));
        assert!(text.contains("data: {"));
        assert!(text.contains("\"web-vitals\""));
    }
}
