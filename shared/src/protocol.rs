use serde::{Deserialize, Serialize};

/// Most channels a single `open` request may name.
pub const MAX_OPEN_CHANNELS: usize = 255;

// === Server -> Client ===

/// Body of a successful `/register` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterResponse {
    /// Session token. Doubles as the only credential for the session.
    pub user: String,
}

/// A message as handed to a listening client, stamped with the distance
/// between sender and recipient at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveredMessage {
    pub channel: u16,
    pub reply_channel: u16,
    pub message: String,
    pub distance: f64,
}

// === Client -> Server ===

/// A message as submitted to `/transmit`.
///
/// Any `distance` a client includes is not part of this type and is dropped
/// during decoding; the server always computes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboundMessage {
    pub channel: u16,
    pub reply_channel: u16,
    pub message: String,
}

impl OutboundMessage {
    pub fn new(channel: u16, reply_channel: u16, message: impl Into<String>) -> Self {
        Self {
            channel,
            reply_channel,
            message: message.into(),
        }
    }

    /// Copy of this message stamped for one recipient.
    pub fn deliver(&self, distance: f64) -> DeliveredMessage {
        DeliveredMessage {
            channel: self.channel,
            reply_channel: self.reply_channel,
            message: self.message.clone(),
            distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_ignores_client_supplied_distance() {
        let json = r#"[{"channel":5,"reply_channel":7,"message":"hi","distance":3.5}]"#;
        let parsed: Vec<OutboundMessage> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, vec![OutboundMessage::new(5, 7, "hi")]);
    }

    #[test]
    fn outbound_rejects_out_of_range_channel() {
        let json = r#"[{"channel":70000,"reply_channel":0,"message":"x"}]"#;
        assert!(serde_json::from_str::<Vec<OutboundMessage>>(json).is_err());

        let json = r#"[{"channel":-1,"reply_channel":0,"message":"x"}]"#;
        assert!(serde_json::from_str::<Vec<OutboundMessage>>(json).is_err());
    }

    #[test]
    fn outbound_requires_all_fields() {
        let json = r#"[{"channel":1,"message":"x"}]"#;
        assert!(serde_json::from_str::<Vec<OutboundMessage>>(json).is_err());
    }

    #[test]
    fn delivered_message_carries_distance() {
        let msg = OutboundMessage::new(5, 0, "hi").deliver(12.5);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"reply_channel\":0"));
        assert!(json.contains("\"distance\":12.5"));
        assert!(json.contains("\"message\":\"hi\""));
    }

    #[test]
    fn register_response_shape() {
        let resp = RegisterResponse {
            user: "abc".to_string(),
        };
        assert_eq!(serde_json::to_string(&resp).unwrap(), r#"{"user":"abc"}"#);
    }
}
