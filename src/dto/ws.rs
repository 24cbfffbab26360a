use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::{
        events::{EventEnvelope, ResyncRequired},
        session::{AnswerAccepted, SessionSnapshot},
    },
    error::RejectionReason,
};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerInboundMessage {
    /// Must be the first frame of every connection.
    Join {
        session_id: String,
        category_id: String,
        player: String,
    },
    /// Answer to the current round.
    Answer {
        /// Round being answered.
        round_id: String,
        /// Chosen option; `null` gives up the round.
        selected_option_index: Option<usize>,
        /// Time the client saw elapse.
        elapsed_ms: u64,
    },
    /// Leave the session and close the socket.
    Leave,
    /// Application-level keep-alive, answered with `pong`.
    Ping,
    /// Any other `type`; rejected without closing.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, ToSchema)]
/// Frames pushed to player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerOutboundMessage {
    /// Full session view after joining or a resync.
    Snapshot(SessionSnapshot),
    /// One session event, in publish order.
    Event(EventEnvelope),
    /// The last answer was recorded.
    AnswerAccepted(AnswerAccepted),
    /// The last request was refused.
    Rejected {
        /// Machine-readable cause.
        reason: RejectionReason,
        /// Human-readable detail.
        message: String,
    },
    /// Events were dropped; a snapshot follows.
    ResyncRequired(ResyncRequired),
    /// Reply to `ping`.
    Pong,
}
