//! Player WebSocket transport: join handshake, answer frames and event forwarding.

use std::{ops::ControlFlow, time::Duration};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        events::ResyncRequired,
        ws::{PlayerInboundMessage, PlayerOutboundMessage},
    },
    error::{RejectionReason, ServiceError},
    services::session_service,
    state::SharedState,
};

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// The writer task is gone; the connection must be torn down.
#[derive(Debug, Error)]
#[error("connection closed")]
struct ConnectionClosed;

/// Identity of a joined connection.
struct PlayerConnection {
    /// Distinguishes successive connections of the same player in logs.
    id: Uuid,
    session_id: String,
    player: String,
    /// Membership generation returned by the join; leaving is scoped to it.
    generation: u64,
}

/// Session, category and player named by a join frame.
#[derive(Debug, PartialEq, Eq)]
struct JoinRequest {
    session_id: String,
    category_id: String,
    player: String,
}

/// Parse the opening frame, which must be a `join`.
fn join_request(text: &str) -> Option<JoinRequest> {
    match serde_json::from_str::<PlayerInboundMessage>(text) {
        Ok(PlayerInboundMessage::Join {
            session_id,
            category_id,
            player,
        }) => Some(JoinRequest {
            session_id,
            category_id,
            player,
        }),
        _ => None,
    }
}

/// Handle the full lifecycle of one player WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(JOIN_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket join timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let Some(JoinRequest {
        session_id,
        category_id,
        player,
    }) = join_request(&initial_message)
    else {
        warn!("first message was not a join");
        let _ = send_rejection(
            &outbound_tx,
            RejectionReason::InvalidInput,
            "first message must be a join".into(),
        );
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let joined =
        match session_service::join_and_subscribe(&state, &session_id, &category_id, &player).await
        {
            Ok(joined) => joined,
            Err(err) => {
                info!(session_id = %session_id, player = %player, error = %err, "join rejected");
                let _ = send_rejection(&outbound_tx, err.reason(), err.to_string());
                let _ = outbound_tx.send(Message::Close(None));
                finalize(writer_task, outbound_tx).await;
                return;
            }
        };

    let connection = PlayerConnection {
        id: Uuid::new_v4(),
        session_id,
        player: joined.player,
        generation: joined.connection,
    };
    let Some(mut events) = joined.events else {
        finalize(writer_task, outbound_tx).await;
        return;
    };
    info!(
        connection_id = %connection.id,
        session_id = %connection.session_id,
        player = %connection.player,
        "player connected"
    );

    if send_message(&outbound_tx, &PlayerOutboundMessage::Snapshot(joined.snapshot)).is_err() {
        leave_quietly(&state, &connection).await;
        finalize(writer_task, outbound_tx).await;
        return;
    }

    let mut left = false;
    loop {
        tokio::select! {
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match handle_frame(&state, &connection, &outbound_tx, &text).await {
                        Ok(ControlFlow::Continue(())) => {}
                        Ok(ControlFlow::Break(())) => {
                            left = true;
                            let _ = outbound_tx.send(Message::Close(None));
                            break;
                        }
                        Err(ConnectionClosed) => break,
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = outbound_tx.send(Message::Pong(payload));
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(session_id = %connection.session_id, player = %connection.player, "player closed");
                    let _ = outbound_tx.send(Message::Close(frame));
                    break;
                }
                Some(Ok(Message::Binary(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Err(err)) => {
                    warn!(session_id = %connection.session_id, player = %connection.player, error = %err, "websocket error");
                    break;
                }
                None => break,
            },
            event = events.recv() => {
                let sent = match event {
                    Ok(envelope) => send_message(&outbound_tx, &PlayerOutboundMessage::Event(envelope)),
                    Err(RecvError::Lagged(missed)) => resync(&state, &connection, &outbound_tx, missed).await,
                    Err(RecvError::Closed) => {
                        info!(session_id = %connection.session_id, "session closed; dropping connection");
                        let _ = outbound_tx.send(Message::Close(None));
                        break;
                    }
                };
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    if !left {
        leave_quietly(&state, &connection).await;
    }
    info!(
        connection_id = %connection.id,
        session_id = %connection.session_id,
        player = %connection.player,
        "player disconnected"
    );

    finalize(writer_task, outbound_tx).await;
}

/// React to one inbound text frame. `Break` means the player asked to leave.
async fn handle_frame(
    state: &SharedState,
    connection: &PlayerConnection,
    tx: &mpsc::UnboundedSender<Message>,
    text: &str,
) -> Result<ControlFlow<()>, ConnectionClosed> {
    let message = match serde_json::from_str::<PlayerInboundMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(player = %connection.player, error = %err, "failed to parse player message");
            send_rejection(tx, RejectionReason::InvalidInput, err.to_string())?;
            return Ok(ControlFlow::Continue(()));
        }
    };

    match message {
        PlayerInboundMessage::Answer {
            round_id,
            selected_option_index,
            elapsed_ms,
        } => {
            let result = session_service::submit_answer(
                state,
                &connection.session_id,
                &connection.player,
                &round_id,
                selected_option_index,
                elapsed_ms,
            )
            .await;
            match result {
                Ok(accepted) => send_message(tx, &PlayerOutboundMessage::AnswerAccepted(accepted))?,
                Err(err) => send_rejection(tx, err.reason(), err.to_string())?,
            }
        }
        PlayerInboundMessage::Leave => {
            if let Err(err) = session_service::leave_connection(
                state,
                &connection.session_id,
                &connection.player,
                connection.generation,
            )
            .await
            {
                send_rejection(tx, err.reason(), err.to_string())?;
            }
            return Ok(ControlFlow::Break(()));
        }
        PlayerInboundMessage::Ping => send_message(tx, &PlayerOutboundMessage::Pong)?,
        PlayerInboundMessage::Join { .. } => {
            warn!(player = %connection.player, "ignoring duplicate join message");
            send_rejection(
                tx,
                RejectionReason::InvalidState,
                "connection already joined a session".into(),
            )?;
        }
        PlayerInboundMessage::Unknown => {
            send_rejection(tx, RejectionReason::InvalidInput, "unknown message type".into())?;
        }
    }
    Ok(ControlFlow::Continue(()))
}

/// Tell a lagging client what it missed and hand it a fresh snapshot.
async fn resync(
    state: &SharedState,
    connection: &PlayerConnection,
    tx: &mpsc::UnboundedSender<Message>,
    missed: u64,
) -> Result<(), ConnectionClosed> {
    warn!(session_id = %connection.session_id, player = %connection.player, missed, "player connection lagged");
    send_message(
        tx,
        &PlayerOutboundMessage::ResyncRequired(ResyncRequired {
            session_id: connection.session_id.clone(),
            missed,
        }),
    )?;
    match session_service::snapshot(state, &connection.session_id).await {
        Ok(snapshot) => send_message(tx, &PlayerOutboundMessage::Snapshot(snapshot)),
        Err(err) => send_rejection(tx, err.reason(), err.to_string()),
    }
}

async fn leave_quietly(state: &SharedState, connection: &PlayerConnection) {
    let result = session_service::leave_connection(
        state,
        &connection.session_id,
        &connection.player,
        connection.generation,
    )
    .await;
    match result {
        Ok(()) => {}
        Err(ServiceError::NotFound(what)) => {
            debug!(session_id = %connection.session_id, player = %connection.player, %what, "nothing to leave");
        }
        Err(err) => {
            warn!(session_id = %connection.session_id, player = %connection.player, error = %err, "failed to leave session on disconnect");
        }
    }
}

fn send_rejection(
    tx: &mpsc::UnboundedSender<Message>,
    reason: RejectionReason,
    message: String,
) -> Result<(), ConnectionClosed> {
    send_message(tx, &PlayerOutboundMessage::Rejected { reason, message })
}

/// Serialize a payload and push it onto the writer channel.
///
/// Serialization failures are logged and swallowed; only a closed writer is an error.
fn send_message(
    tx: &mpsc::UnboundedSender<Message>,
    value: &PlayerOutboundMessage,
) -> Result<(), ConnectionClosed> {
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound message");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
