//! Wire Message Shapes
//!
//! Prost definitions for the remote stream's protobuf envelope and the
//! sub-message payloads we decode. Field tags mirror the platform's wire
//! format; fields we never read are left undeclared and skipped by prost.

use prost::Message;

/// Method name carried by chat sub-messages.
pub const CHAT_METHOD: &str = "WebcastChatMessage";

/// Method name carried by gift sub-messages.
pub const GIFT_METHOD: &str = "WebcastGiftMessage";

/// Decompressed frame envelope: an ordered list of sub-messages.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<SubMessage>,
}

/// One `(method, payload)` entry of an envelope.
///
/// The payload stays opaque at this layer; callers select a typed decoder
/// by `method`.
#[derive(Clone, PartialEq, Message)]
pub struct SubMessage {
    #[prost(string, tag = "1")]
    pub method: String,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
}

/// Header shared by typed sub-messages.
#[derive(Clone, PartialEq, Message)]
pub struct MessageHeader {
    #[prost(string, tag = "1")]
    pub method: String,
    #[prost(uint64, tag = "2")]
    pub msg_id: u64,
    #[prost(uint64, tag = "3")]
    pub room_id: u64,
}

/// Sender identity embedded in chat and gift messages.
#[derive(Clone, PartialEq, Message)]
pub struct StreamUser {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(string, tag = "3")]
    pub nickname: String,
}

/// Decoded `WebcastChatMessage` payload.
#[derive(Clone, PartialEq, Message)]
pub struct ChatMessage {
    #[prost(message, optional, tag = "1")]
    pub header: Option<MessageHeader>,
    #[prost(message, optional, tag = "2")]
    pub user: Option<StreamUser>,
    #[prost(string, tag = "3")]
    pub content: String,
}

/// Gift metadata embedded in gift messages.
#[derive(Clone, PartialEq, Message)]
pub struct GiftDetail {
    #[prost(uint32, tag = "12")]
    pub diamond_count: u32,
    #[prost(string, tag = "16")]
    pub name: String,
}

/// Decoded `WebcastGiftMessage` payload.
#[derive(Clone, PartialEq, Message)]
pub struct GiftMessage {
    #[prost(message, optional, tag = "1")]
    pub header: Option<MessageHeader>,
    #[prost(uint64, tag = "2")]
    pub gift_id: u64,
    #[prost(uint64, tag = "6")]
    pub combo_count: u64,
    #[prost(message, optional, tag = "7")]
    pub user: Option<StreamUser>,
    #[prost(message, optional, tag = "15")]
    pub gift: Option<GiftDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_round_trip() {
        let chat = ChatMessage {
            header: Some(MessageHeader {
                method: CHAT_METHOD.to_string(),
                msg_id: 42,
                room_id: 7,
            }),
            user: Some(StreamUser {
                id: 99,
                nickname: "viewer".to_string(),
            }),
            content: "hello".to_string(),
        };

        let bytes = chat.encode_to_vec();
        let decoded = ChatMessage::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.content, "hello");
        assert_eq!(decoded.user.unwrap().nickname, "viewer");
    }

    #[test]
    fn test_gift_message_decodes_partial_fields() {
        // Senders may omit optional sections; decoding must not require them.
        let gift = GiftMessage {
            header: None,
            gift_id: 5,
            combo_count: 2,
            user: None,
            gift: None,
        };

        let bytes = gift.encode_to_vec();
        let decoded = GiftMessage::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.gift_id, 5);
        assert_eq!(decoded.combo_count, 2);
        assert!(decoded.gift.is_none());
    }
}
