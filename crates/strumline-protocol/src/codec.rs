//! Codec trait and implementations for serializing/deserializing messages.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Converts wire types to bytes and back.
///
/// The engine only talks to clients through this trait so the JSON
/// format can be swapped without touching room code.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use strumline_protocol::{Codec, Envelope, JsonCodec, NamedMessage, Payload};
///
/// let codec = JsonCodec;
/// let envelope = Envelope {
///     seq: 1,
///     timestamp: 5000,
///     payload: Payload::Message(NamedMessage::new("chat", "hi")),
/// };
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Envelope, Payload, SystemMessage};

    #[test]
    fn test_json_codec_decode_rejects_garbage() {
        let result: Result<Envelope, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_decode_rejects_unknown_system_type() {
        let bytes = br#"{"seq":1,"timestamp":0,"payload":{"type":"System","data":{"type":"Teleport"}}}"#;
        let result: Result<Envelope, _> = JsonCodec.decode(bytes);
        assert!(result.is_err());
    }

    #[test]
    fn test_json_codec_decodes_client_leave() {
        let bytes = br#"{"seq":4,"timestamp":10,"payload":{"type":"System","data":{"type":"Leave"}}}"#;
        let envelope: Envelope = JsonCodec.decode(bytes).unwrap();
        assert_eq!(envelope.payload, Payload::System(SystemMessage::Leave));
    }
}
