//! Spectator SSE streams over a session's ordered events.

use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::Serialize;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::dto::{
    events::{EventEnvelope, ResyncRequired},
    session::SessionSnapshot,
};

/// Build an SSE event carrying `payload` as JSON.
fn json_event<T: Serialize>(name: &str, payload: &T) -> Option<Event> {
    match Event::default().event(name).json_data(payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event = name, error = %err, "failed to serialize SSE payload");
            None
        }
    }
}

/// Convert a session subscription into an SSE response: the snapshot first, then every
/// event published after it. Forwarding stops once the client disconnects.
pub fn to_sse_stream(
    snapshot: SessionSnapshot,
    mut receiver: broadcast::Receiver<EventEnvelope>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);
    let session_id = snapshot.session_id.clone();

    tokio::spawn(async move {
        if let Some(event) = json_event("snapshot", &snapshot)
            && tx.send(Ok(event)).await.is_err()
        {
            return;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    let event = match recv_result {
                        Ok(envelope) => json_event(envelope.event.name(), &envelope)
                            .map(|event| event.id(envelope.seq.to_string())),
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(session_id = %session_id, missed, "SSE subscriber lagged behind");
                            json_event(
                                "resync_required",
                                &ResyncRequired {
                                    session_id: session_id.clone(),
                                    missed,
                                },
                            )
                        }
                    };

                    if let Some(event) = event
                        && tx.send(Ok(event)).await.is_err()
                    {
                        break;
                    }
                }
            }
        }

        info!(session_id = %session_id, "session SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
