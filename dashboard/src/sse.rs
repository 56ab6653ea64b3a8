//! Server-Sent Events stream of loop events.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use tracing::debug;

use crate::broker::EventBroker;
use crate::state::AppState;

/// First frame sent on every stream.
pub const CONNECTED_PAYLOAD: &str = r#"{"type":"connected"}"#;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// JSON payloads for one observer: the connected marker, then everything the
/// broker queues for it. The subscription lives as long as the stream.
pub fn payload_stream(broker: EventBroker) -> impl Stream<Item = String> {
    async_stream::stream! {
        let (mut rx, subscription) = broker.subscribe();
        yield CONNECTED_PAYLOAD.to_string();

        while let Some(payload) = rx.recv().await {
            yield payload;
        }

        debug!("event stream closed");
        subscription.unsubscribe();
    }
}

/// SSE endpoint handler.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("SSE client connected");
    let stream = payload_stream(state.broker).map(|payload| Ok(Event::default().data(payload)));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("ping"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, IterationEvent};

    #[tokio::test]
    async fn stream_starts_with_connected_then_task_info() {
        let broker = EventBroker::new();
        broker.publish(&IterationEvent::new(EventKind::TaskInfo, 0, 3).with_task("ship"));

        let mut stream = Box::pin(payload_stream(broker.clone()));
        assert_eq!(stream.next().await.as_deref(), Some(CONNECTED_PAYLOAD));

        let task_info = stream.next().await.expect("task info frame");
        assert!(task_info.contains("\"type\":\"task_info\""));
        assert!(task_info.contains("ship"));
    }

    #[tokio::test]
    async fn live_events_follow_in_publish_order() {
        let broker = EventBroker::new();
        let mut stream = Box::pin(payload_stream(broker.clone()));
        assert_eq!(stream.next().await.as_deref(), Some(CONNECTED_PAYLOAD));
        assert_eq!(broker.subscriber_count(), 1);

        broker.publish(&IterationEvent::new(EventKind::IterationStart, 1, 0));
        broker.publish(&IterationEvent::new(EventKind::IterationEnd, 1, 0));

        let first = stream.next().await.expect("first");
        let second = stream.next().await.expect("second");
        assert!(first.contains("iteration_start"));
        assert!(second.contains("iteration_end"));
    }

    #[tokio::test]
    async fn dropping_stream_unsubscribes() {
        let broker = EventBroker::new();
        let mut stream = Box::pin(payload_stream(broker.clone()));
        let _ = stream.next().await;
        assert_eq!(broker.subscriber_count(), 1);

        drop(stream);
        assert_eq!(broker.subscriber_count(), 0);
    }
}
