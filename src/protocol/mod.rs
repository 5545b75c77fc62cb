//! Remote Stream Wire Protocol
//!
//! Decodes the framed binary format used by the remote live-room stream.
//! A frame arrives as a gzip-compressed protobuf envelope holding an ordered
//! list of sub-messages; each sub-message names a method and carries an
//! opaque payload. Payload interpretation is a second decode step keyed by
//! the method name, so unknown methods pass through without failing the
//! frame.

mod codec;
mod messages;

pub use codec::{decode_frame, CodecError};
pub use messages::{
    ChatMessage, Envelope, GiftDetail, GiftMessage, MessageHeader, StreamUser, SubMessage,
    CHAT_METHOD, GIFT_METHOD,
};
