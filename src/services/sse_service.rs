use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dao::{query::Subscription, session_store::ChangeStream},
    dto::sse::{CHANGE_EVENT, HANDSHAKE_EVENT, Handshake, ServerEvent},
    error::ServiceError,
    state::SharedState,
};

/// Open a change feed on the hosted store.
pub async fn subscribe_changes(
    state: &SharedState,
    subscription: Subscription,
) -> Result<ChangeStream, ServiceError> {
    let stream = state.store().subscribe(subscription.clone()).await?;
    info!(
        collection = subscription.collection.as_str(),
        kind = subscription.kind.as_str(),
        clauses = subscription.filter.clauses.len(),
        "new change feed connection"
    );
    Ok(stream)
}

/// Handshake announcing the feed and the current health of the store.
pub fn handshake(state: &SharedState, subscription: &Subscription) -> Option<ServerEvent> {
    let handshake = Handshake {
        collection: subscription.collection,
        message: format!("watching {} {}s", subscription.collection.as_str(), subscription.kind.as_str()),
        degraded: state.is_degraded(),
    };
    ServerEvent::json(Some(HANDSHAKE_EVENT.to_string()), &handshake).ok()
}

/// Convert a change stream into an SSE response, forwarding events until
/// either side goes away.
pub fn to_sse_stream(
    mut changes: ChangeStream,
    handshake: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(handshake) = handshake {
            if tx.send(Ok(to_event(handshake))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                next = changes.next() => {
                    let Some(change) = next else { break };
                    let payload = match ServerEvent::json(Some(CHANGE_EVENT.to_string()), &change) {
                        Ok(payload) => payload,
                        Err(err) => {
                            warn!(error = %err, "failed to encode change event");
                            continue;
                        }
                    };

                    if tx.send(Ok(to_event(payload))).await.is_err() {
                        break;
                    }
                }
            }
        }

        info!("change feed disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}
