// Wire format: one JSON text frame per event, {"event": "<name>", "data": <payload>}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{ClientEvent, IncomingMessage, OutgoingMessage, ServerEvent, TypingPayload};
use crate::models::{ConversationId, UserId};

pub const MESSAGE: &str = "message";
pub const TYPING: &str = "typing";
pub const STOP_TYPING: &str = "stop_typing";
pub const USER_ONLINE: &str = "user_online";
pub const USER_OFFLINE: &str = "user_offline";
pub const JOIN_ROOM: &str = "join_room";

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid payload for '{event}': {source}")]
    Payload {
        event: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

fn payload<T: serde::de::DeserializeOwned>(event: &str, data: Value) -> Result<T, FrameError> {
    serde_json::from_value(data).map_err(|source| FrameError::Payload {
        event: event.to_string(),
        source,
    })
}

fn to_frame<T: Serialize>(event: &str, data: &T) -> Result<String, FrameError> {
    let frame = Frame {
        event: event.to_string(),
        data: serde_json::to_value(data)?,
    };
    Ok(serde_json::to_string(&frame)?)
}

pub fn encode_client_event(event: &ClientEvent) -> Result<String, FrameError> {
    match event {
        // join_room carries the bare conversation id
        ClientEvent::JoinRoom(id) => to_frame(JOIN_ROOM, id),
        ClientEvent::Message(msg) => to_frame(MESSAGE, msg),
        ClientEvent::Typing(p) => to_frame(TYPING, p),
        ClientEvent::StopTyping(p) => to_frame(STOP_TYPING, p),
    }
}

/// Decode a frame received from the server. Unknown event names yield `None`.
pub fn decode_server_event(text: &str) -> Result<Option<ServerEvent>, FrameError> {
    let Frame { event, data } = serde_json::from_str(text)?;
    let decoded = match event.as_str() {
        MESSAGE => ServerEvent::Message(payload::<IncomingMessage>(&event, data)?),
        TYPING => ServerEvent::Typing(payload::<TypingPayload>(&event, data)?),
        STOP_TYPING => ServerEvent::StopTyping(payload::<TypingPayload>(&event, data)?),
        USER_ONLINE => ServerEvent::UserOnline(payload::<UserId>(&event, data)?),
        USER_OFFLINE => ServerEvent::UserOffline(payload::<UserId>(&event, data)?),
        _ => return Ok(None),
    };
    Ok(Some(decoded))
}

/// Server side of the codec, used by relays and test servers.
pub fn encode_server_event(event: &ServerEvent) -> Result<Option<String>, FrameError> {
    let text = match event {
        ServerEvent::Message(msg) => to_frame(MESSAGE, msg)?,
        ServerEvent::Typing(p) => to_frame(TYPING, p)?,
        ServerEvent::StopTyping(p) => to_frame(STOP_TYPING, p)?,
        ServerEvent::UserOnline(id) => to_frame(USER_ONLINE, id)?,
        ServerEvent::UserOffline(id) => to_frame(USER_OFFLINE, id)?,
        // Lifecycle events are local to the client
        ServerEvent::Connected | ServerEvent::Disconnected { .. } => return Ok(None),
    };
    Ok(Some(text))
}

pub fn decode_client_event(text: &str) -> Result<Option<ClientEvent>, FrameError> {
    let Frame { event, data } = serde_json::from_str(text)?;
    let decoded = match event.as_str() {
        JOIN_ROOM => ClientEvent::JoinRoom(payload::<ConversationId>(&event, data)?),
        MESSAGE => ClientEvent::Message(payload::<OutgoingMessage>(&event, data)?),
        TYPING => ClientEvent::Typing(payload::<TypingPayload>(&event, data)?),
        STOP_TYPING => ClientEvent::StopTyping(payload::<TypingPayload>(&event, data)?),
        _ => return Ok(None),
    };
    Ok(Some(decoded))
}
