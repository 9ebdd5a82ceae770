// chat-protocol: wire schema for the chat hub.
//
// A single tagged `Frame` carries every event kind over the wire as JSON
// text. Unknown fields decode to their defaults and are dropped on
// re-encode, so older and newer peers can exchange frames without breaking
// (see `Event` below for the frozen event tags).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length, in bytes, of a channel name.
pub const MAX_CHANNEL_LEN: usize = 64;
/// Maximum length, in bytes, of a message body.
pub const MAX_CONTENT_LEN: usize = 4096;

/// The frozen set of frame event tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Message,
    AddChannel,
    LeaveChannel,
    ChannelSubscriptions,
    PerfTest,
    MessageHistory,
}

/// Per-core CPU load fractions, sampled by the telemetry sidecar.
pub type CpuLoad = Vec<f32>;

/// One encoded wire frame. Every field but `event` is optional and decodes
/// to its zero/empty default when absent, so adding a new optional field
/// never breaks an older peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perf_test_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_load: Option<CpuLoad>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_connections: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_volume: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mv_period: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mv_adjusted: Option<u64>,
}

impl Frame {
    /// A minimal chat-message frame, as sent by a client.
    pub fn message(channel: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            event: Event::Message,
            channel: Some(channel.into()),
            content: Some(content.into()),
            ..Self::empty(Event::Message)
        }
    }

    pub fn add_channel(channel: impl Into<String>) -> Self {
        Self {
            event: Event::AddChannel,
            channel: Some(channel.into()),
            ..Self::empty(Event::AddChannel)
        }
    }

    pub fn leave_channel(channel: impl Into<String>) -> Self {
        Self {
            event: Event::LeaveChannel,
            channel: Some(channel.into()),
            ..Self::empty(Event::LeaveChannel)
        }
    }

    pub fn channel_subscriptions(channels: Vec<String>) -> Self {
        Self {
            event: Event::ChannelSubscriptions,
            data: channels,
            ..Self::empty(Event::ChannelSubscriptions)
        }
    }

    pub fn perf_test(perf_test_id: u64) -> Self {
        Self {
            event: Event::PerfTest,
            perf_test_id: Some(perf_test_id),
            ..Self::empty(Event::PerfTest)
        }
    }

    /// A monitor's `perf_test` reply, carrying the sampled telemetry fields.
    #[allow(clippy::too_many_arguments)]
    pub fn perf_test_reply(
        perf_test_id: u64,
        cpu_load: CpuLoad,
        memory_usage: f32,
        active_connections: u32,
        message_volume: u64,
        mv_period: f64,
        mv_adjusted: u64,
    ) -> Self {
        Self {
            perf_test_id: Some(perf_test_id),
            cpu_load: Some(cpu_load),
            memory_usage: Some(memory_usage),
            active_connections: Some(active_connections),
            message_volume: Some(message_volume),
            mv_period: Some(mv_period),
            mv_adjusted: Some(mv_adjusted),
            ..Self::empty(Event::PerfTest)
        }
    }

    fn empty(event: Event) -> Self {
        Self {
            event,
            channel: None,
            content: None,
            sender: None,
            sent_at: None,
            data: Vec::new(),
            perf_test_id: None,
            cpu_load: None,
            memory_usage: None,
            active_connections: None,
            message_volume: None,
            mv_period: None,
            mv_adjusted: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("channel name exceeds {MAX_CHANNEL_LEN} bytes")]
    ChannelTooLong,
    #[error("channel name contains non-printable characters")]
    ChannelNotPrintable,
    #[error("message content exceeds {MAX_CONTENT_LEN} bytes")]
    ContentTooLong,
    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Serde(#[from] serde_json::Error),
}

fn validate(frame: &Frame) -> Result<(), EncodeError> {
    if let Some(channel) = &frame.channel {
        if channel.len() > MAX_CHANNEL_LEN {
            return Err(EncodeError::ChannelTooLong);
        }
        if !channel.chars().all(|c| !c.is_control()) {
            return Err(EncodeError::ChannelNotPrintable);
        }
    }
    if let Some(content) = &frame.content {
        if content.len() > MAX_CONTENT_LEN {
            return Err(EncodeError::ContentTooLong);
        }
    }
    Ok(())
}

/// Encode a frame to its wire representation (JSON text).
///
/// Fails with [`EncodeError`] if a field violates its stated bound — the
/// codec never silently truncates.
pub fn encode(frame: &Frame) -> Result<String, EncodeError> {
    validate(frame)?;
    Ok(serde_json::to_string(frame)?)
}

/// Decode a frame from its wire representation.
///
/// Unknown fields are ignored. Absent optional fields take their defaults.
pub fn decode(bytes: &str) -> Result<Frame, DecodeError> {
    Ok(serde_json::from_str(bytes)?)
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Event::Message => "message",
            Event::AddChannel => "add_channel",
            Event::LeaveChannel => "leave_channel",
            Event::ChannelSubscriptions => "channel_subscriptions",
            Event::PerfTest => "perf_test",
            Event::MessageHistory => "message_history",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_message_frame() {
        let frame = Frame::message("welcome", "hi");
        let wire = encode(&frame).expect("encode");
        let decoded = decode(&wire).expect("decode");
        assert_eq!(frame, decoded);
    }

    #[test]
    fn unknown_fields_decode_to_defaults() {
        let json = r#"{"event":"message","channel":"welcome","content":"hi","unexpected_field":42}"#;
        let frame = decode(json).expect("decode should ignore unknown fields");
        assert_eq!(frame.channel.as_deref(), Some("welcome"));
        assert!(frame.data.is_empty());
        assert!(frame.perf_test_id.is_none());
    }

    #[test]
    fn absent_optional_fields_take_defaults() {
        let json = r#"{"event":"perf_test","perf_test_id":7}"#;
        let frame = decode(json).expect("decode");
        assert_eq!(frame.perf_test_id, Some(7));
        assert!(frame.channel.is_none());
        assert!(frame.cpu_load.is_none());
    }

    #[test]
    fn encode_rejects_oversized_channel() {
        let frame = Frame::add_channel("x".repeat(MAX_CHANNEL_LEN + 1));
        assert!(matches!(encode(&frame), Err(EncodeError::ChannelTooLong)));
    }

    #[test]
    fn encode_rejects_oversized_content() {
        let frame = Frame::message("room", "x".repeat(MAX_CONTENT_LEN + 1));
        assert!(matches!(encode(&frame), Err(EncodeError::ContentTooLong)));
    }

    #[test]
    fn decode_rejects_malformed_json() {
        assert!(decode("{not-json").is_err());
    }

    #[test]
    fn channel_subscriptions_round_trips_data_list() {
        let frame = Frame::channel_subscriptions(vec!["a".to_owned(), "b".to_owned()]);
        let wire = encode(&frame).expect("encode");
        let decoded = decode(&wire).expect("decode");
        assert_eq!(decoded.data, vec!["a", "b"]);
    }
}
