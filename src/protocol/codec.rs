//! Frame Codec
//!
//! Pure transform from one raw wire frame to its sub-messages:
//! gzip decompression followed by envelope parsing. The two failure modes
//! are kept distinct so callers can tell a corrupted stream from a
//! well-compressed frame with a malformed envelope.

use std::io::Read;

use flate2::read::GzDecoder;
use prost::Message;
use thiserror::Error;

use super::messages::{Envelope, SubMessage};

/// Errors produced while decoding one frame
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame bytes are not a valid compressed stream
    #[error("frame decompression failed: {0}")]
    FrameDecompression(#[source] std::io::Error),

    /// The decompressed bytes are not a valid envelope
    #[error("frame envelope parse failed: {0}")]
    FrameParse(#[source] prost::DecodeError),
}

/// Decode one raw frame into its ordered sub-messages.
///
/// Payload bytes are extracted but not interpreted; per-method decoding is
/// the caller's responsibility.
pub fn decode_frame(raw: &[u8]) -> Result<Vec<SubMessage>, CodecError> {
    let mut decompressed = Vec::new();
    GzDecoder::new(raw)
        .read_to_end(&mut decompressed)
        .map_err(CodecError::FrameDecompression)?;

    let envelope =
        Envelope::decode(decompressed.as_slice()).map_err(CodecError::FrameParse)?;

    Ok(envelope.messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn compress(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decode_valid_frame() {
        let envelope = Envelope {
            messages: vec![
                SubMessage {
                    method: "WebcastChatMessage".to_string(),
                    payload: vec![1, 2, 3],
                },
                SubMessage {
                    method: "WebcastLikeMessage".to_string(),
                    payload: vec![],
                },
            ],
        };

        let frame = compress(&envelope.encode_to_vec());
        let decoded = decode_frame(&frame).unwrap();

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].method, "WebcastChatMessage");
        assert_eq!(decoded[0].payload, vec![1, 2, 3]);
        assert_eq!(decoded[1].method, "WebcastLikeMessage");
    }

    #[test]
    fn test_unknown_methods_pass_through() {
        let envelope = Envelope {
            messages: vec![SubMessage {
                method: "WebcastMemberMessage".to_string(),
                payload: vec![0xde, 0xad],
            }],
        };

        let decoded = decode_frame(&compress(&envelope.encode_to_vec())).unwrap();
        assert_eq!(decoded[0].method, "WebcastMemberMessage");
        assert_eq!(decoded[0].payload, vec![0xde, 0xad]);
    }

    #[test]
    fn test_malformed_compression_fails() {
        let result = decode_frame(b"not a gzip stream");
        assert!(matches!(result, Err(CodecError::FrameDecompression(_))));
    }

    #[test]
    fn test_malformed_envelope_fails() {
        // Valid gzip, but a truncated length-delimited field inside.
        let frame = compress(&[0x0a, 0xff]);
        let result = decode_frame(&frame);
        assert!(matches!(result, Err(CodecError::FrameParse(_))));
    }

    #[test]
    fn test_empty_envelope_is_valid() {
        let decoded = decode_frame(&compress(&[])).unwrap();
        assert!(decoded.is_empty());
    }
}
