//! Transfer message definitions.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{ProtocolError, Result, CHUNK_TYPE, END_TYPE, START_TYPE};

/// Smallest valid chunk frame: type byte, empty id, index.
const CHUNK_MIN_LEN: usize = 1 + 4 + 4;

/// The kind of transfer message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Announces a transfer.
    Start = START_TYPE,
    /// Carries one slice of the compressed payload.
    Chunk = CHUNK_TYPE,
    /// Closes a transfer with its checksum.
    End = END_TYPE,
}

impl MessageKind {
    /// Parse a message kind from its discriminator byte.
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            START_TYPE => Ok(MessageKind::Start),
            CHUNK_TYPE => Ok(MessageKind::Chunk),
            END_TYPE => Ok(MessageKind::End),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }

    /// The discriminator byte for this kind.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Provenance of a transferred payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetadata {
    /// Platform that produced the payload.
    pub source_platform: String,
    /// Session the payload was exported from.
    pub source_session_id: String,
    /// Where the receiver should file the payload.
    pub destination: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: i64,
}

/// Opens a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMessage {
    /// Sender-generated transfer identifier.
    pub export_id: String,
    /// Number of chunk messages that follow. Always positive.
    pub total_chunks: u32,
    /// Payload size before compression.
    pub total_bytes: u64,
    /// Payload size after compression (the bytes actually chunked).
    pub compressed_bytes: u64,
    /// Payload provenance. Its fields sit at the top level of the JSON body.
    #[serde(flatten)]
    pub metadata: TransferMetadata,
}

impl StartMessage {
    /// Encode the message to bytes.
    pub fn encode(&self) -> Result<Bytes> {
        encode_json(START_TYPE, self)
    }

    /// Decode the message from bytes.
    pub fn decode(data: &Bytes) -> Result<Self> {
        let msg: StartMessage = decode_json(START_TYPE, data)?;
        if msg.total_chunks == 0 {
            return Err(ProtocolError::Schema("totalChunks must be positive".into()));
        }
        Ok(msg)
    }
}

/// One numbered slice of a transfer's compressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMessage {
    /// Transfer this chunk belongs to.
    pub export_id: String,
    /// Zero-based chunk index.
    pub index: u32,
    /// Raw chunk bytes.
    pub data: Bytes,
}

impl ChunkMessage {
    /// Create a chunk message.
    pub fn new(export_id: impl Into<String>, index: u32, data: Bytes) -> Self {
        Self {
            export_id: export_id.into(),
            index,
            data,
        }
    }

    /// Encode the message to bytes.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let id = self.export_id.as_bytes();
        let mut buf = BytesMut::with_capacity(chunk_header_len(&self.export_id) + self.data.len());
        buf.put_u8(CHUNK_TYPE);
        buf.put_u32(id.len() as u32);
        buf.put_slice(id);
        buf.put_u32(self.index);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    /// Decode the message from bytes. The payload is a zero-copy slice of `data`.
    pub fn decode(data: &Bytes) -> Result<Self> {
        check_discriminator(CHUNK_TYPE, data)?;
        if data.len() < CHUNK_MIN_LEN {
            return Err(ProtocolError::Truncated("chunk header"));
        }

        let mut buf = &data[1..];
        let id_len = buf.get_u32() as usize;
        if buf.remaining() < id_len {
            return Err(ProtocolError::Truncated("export id"));
        }
        let export_id = String::from_utf8(buf[..id_len].to_vec()).map_err(|source| {
            ProtocolError::InvalidUtf8 {
                field: "exportId",
                source,
            }
        })?;
        buf.advance(id_len);

        if buf.remaining() < 4 {
            return Err(ProtocolError::Truncated("chunk index"));
        }
        let index = buf.get_u32();

        let offset = data.len() - buf.remaining();
        Ok(ChunkMessage {
            export_id,
            index,
            data: data.slice(offset..),
        })
    }
}

/// Closes a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndMessage {
    /// Transfer being closed.
    pub export_id: String,
    /// Hex digest of the full compressed payload.
    pub checksum: String,
}

impl EndMessage {
    /// Encode the message to bytes.
    pub fn encode(&self) -> Result<Bytes> {
        encode_json(END_TYPE, self)
    }

    /// Decode the message from bytes.
    pub fn decode(data: &Bytes) -> Result<Self> {
        let msg: EndMessage = decode_json(END_TYPE, data)?;
        if msg.checksum.is_empty() || !msg.checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ProtocolError::Schema("checksum must be a hex digest".into()));
        }
        Ok(msg)
    }
}

/// Unified transfer message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMessage {
    /// See [`StartMessage`].
    Start(StartMessage),
    /// See [`ChunkMessage`].
    Chunk(ChunkMessage),
    /// See [`EndMessage`].
    End(EndMessage),
}

impl TransferMessage {
    /// The message kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            TransferMessage::Start(_) => MessageKind::Start,
            TransferMessage::Chunk(_) => MessageKind::Chunk,
            TransferMessage::End(_) => MessageKind::End,
        }
    }

    /// The transfer this message belongs to.
    #[must_use]
    pub fn export_id(&self) -> &str {
        match self {
            TransferMessage::Start(m) => &m.export_id,
            TransferMessage::Chunk(m) => &m.export_id,
            TransferMessage::End(m) => &m.export_id,
        }
    }

    /// Encode the message to bytes.
    pub fn encode(&self) -> Result<Bytes> {
        match self {
            TransferMessage::Start(m) => m.encode(),
            TransferMessage::Chunk(m) => Ok(m.encode()),
            TransferMessage::End(m) => m.encode(),
        }
    }

    /// Decode any transfer message by its discriminator.
    pub fn decode(data: &Bytes) -> Result<Self> {
        decode_any(data)
    }
}

/// Inspect the leading byte of `data` and decode the matching message.
pub fn decode_any(data: &Bytes) -> Result<TransferMessage> {
    let first = *data.first().ok_or(ProtocolError::Empty)?;

    match MessageKind::from_byte(first)? {
        MessageKind::Start => Ok(TransferMessage::Start(StartMessage::decode(data)?)),
        MessageKind::Chunk => Ok(TransferMessage::Chunk(ChunkMessage::decode(data)?)),
        MessageKind::End => Ok(TransferMessage::End(EndMessage::decode(data)?)),
    }
}

/// Bytes a chunk frame spends on everything except its payload.
#[must_use]
pub fn chunk_header_len(export_id: &str) -> usize {
    CHUNK_MIN_LEN + export_id.len()
}

fn check_discriminator(expected: u8, data: &[u8]) -> Result<()> {
    match data.first() {
        None => Err(ProtocolError::Empty),
        Some(&found) if found != expected => {
            Err(ProtocolError::DiscriminatorMismatch { expected, found })
        }
        Some(_) => Ok(()),
    }
}

fn encode_json<T: Serialize>(kind: u8, body: &T) -> Result<Bytes> {
    let json = serde_json::to_vec(body)?;
    let mut buf = BytesMut::with_capacity(1 + json.len());
    buf.put_u8(kind);
    buf.put_slice(&json);
    Ok(buf.freeze())
}

fn decode_json<T: for<'de> Deserialize<'de>>(kind: u8, data: &[u8]) -> Result<T> {
    check_discriminator(kind, data)?;
    Ok(serde_json::from_slice(&data[1..])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> StartMessage {
        StartMessage {
            export_id: "abc".to_string(),
            total_chunks: 3,
            total_bytes: 12,
            compressed_bytes: 12,
            metadata: TransferMetadata {
                source_platform: "claude-code".to_string(),
                source_session_id: "sess-1".to_string(),
                destination: "plan-9".to_string(),
                created_at: 1_700_000_000_000,
            },
        }
    }

    #[test]
    fn test_start_roundtrip() {
        let msg = start();
        let encoded = msg.encode().unwrap();
        assert_eq!(encoded[0], START_TYPE);

        match decode_any(&encoded).unwrap() {
            TransferMessage::Start(d) => assert_eq!(d, msg),
            other => panic!("wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_start_json_field_names() {
        let encoded = start().encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&encoded[1..]).unwrap();
        assert_eq!(json["exportId"], "abc");
        assert_eq!(json["totalChunks"], 3);
        assert_eq!(json["compressedBytes"], 12);
        assert_eq!(json["sourceSessionId"], "sess-1");
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_start_decodes_flat_body() {
        let mut buf = vec![START_TYPE];
        buf.extend_from_slice(
            br#"{"exportId":"abc","totalChunks":3,"totalBytes":12,"compressedBytes":12,"sourcePlatform":"p","sourceSessionId":"s","destination":"d","createdAt":1}"#,
        );

        match decode_any(&Bytes::from(buf)).unwrap() {
            TransferMessage::Start(msg) => {
                assert_eq!(msg.export_id, "abc");
                assert_eq!(msg.total_chunks, 3);
                assert_eq!(msg.total_bytes, 12);
                assert_eq!(msg.compressed_bytes, 12);
                assert_eq!(
                    msg.metadata,
                    TransferMetadata {
                        source_platform: "p".to_string(),
                        source_session_id: "s".to_string(),
                        destination: "d".to_string(),
                        created_at: 1,
                    }
                );
            }
            other => panic!("wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_start_empty_metadata_roundtrip() {
        let msg = StartMessage {
            export_id: String::new(),
            total_chunks: 1,
            total_bytes: 0,
            compressed_bytes: 0,
            metadata: TransferMetadata::default(),
        };
        let decoded = StartMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_start_rejects_zero_chunks() {
        let mut msg = start();
        msg.total_chunks = 0;
        let encoded = msg.encode().unwrap();
        assert!(matches!(
            StartMessage::decode(&encoded),
            Err(ProtocolError::Schema(_))
        ));
    }

    #[test]
    fn test_start_rejects_missing_field() {
        let mut buf = vec![START_TYPE];
        buf.extend_from_slice(br#"{"exportId":"abc","totalChunks":1}"#);
        assert!(matches!(
            StartMessage::decode(&Bytes::from(buf)),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_start_rejects_wrong_type() {
        let mut buf = vec![START_TYPE];
        buf.extend_from_slice(
            br#"{"exportId":"abc","totalChunks":"3","totalBytes":1,"compressedBytes":1,
                "sourcePlatform":"","sourceSessionId":"","destination":"","createdAt":0}"#,
        );
        assert!(matches!(
            StartMessage::decode(&Bytes::from(buf)),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_start_rejects_negative_size() {
        let mut buf = vec![START_TYPE];
        buf.extend_from_slice(
            br#"{"exportId":"abc","totalChunks":1,"totalBytes":-1,"compressedBytes":1,
                "sourcePlatform":"","sourceSessionId":"","destination":"","createdAt":0}"#,
        );
        assert!(StartMessage::decode(&Bytes::from(buf)).is_err());
    }

    #[test]
    fn test_chunk_roundtrip() {
        let msg = ChunkMessage::new("abc", 7, Bytes::from_static(b"hello"));
        let encoded = msg.encode();
        assert_eq!(encoded.len(), chunk_header_len("abc") + 5);

        match decode_any(&encoded).unwrap() {
            TransferMessage::Chunk(d) => assert_eq!(d, msg),
            other => panic!("wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_chunk_layout_is_big_endian() {
        let encoded = ChunkMessage::new("ab", 0x0102_0304, Bytes::from_static(b"z")).encode();
        assert_eq!(
            &encoded[..],
            &[CHUNK_TYPE, 0, 0, 0, 2, b'a', b'b', 1, 2, 3, 4, b'z'][..]
        );
    }

    #[test]
    fn test_chunk_zero_length_payload() {
        let msg = ChunkMessage::new("", 0, Bytes::new());
        let encoded = msg.encode();
        assert_eq!(encoded.len(), CHUNK_MIN_LEN);
        assert_eq!(ChunkMessage::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_chunk_truncated_header() {
        let data = Bytes::from_static(&[CHUNK_TYPE, 0, 0, 0]);
        assert!(matches!(
            ChunkMessage::decode(&data),
            Err(ProtocolError::Truncated(_))
        ));
    }

    #[test]
    fn test_chunk_id_length_past_end() {
        let data = Bytes::from_static(&[CHUNK_TYPE, 0, 0, 0, 200, b'a', b'b', 0, 0, 0, 0]);
        assert!(matches!(
            ChunkMessage::decode(&data),
            Err(ProtocolError::Truncated("export id"))
        ));
    }

    #[test]
    fn test_chunk_missing_index() {
        let data = Bytes::from_static(&[CHUNK_TYPE, 0, 0, 0, 4, b'a', b'b', b'c', b'd', 0]);
        assert!(matches!(
            ChunkMessage::decode(&data),
            Err(ProtocolError::Truncated("chunk index"))
        ));
    }

    #[test]
    fn test_chunk_invalid_utf8_id() {
        let data = Bytes::from_static(&[CHUNK_TYPE, 0, 0, 0, 1, 0xFF, 0, 0, 0, 0]);
        assert!(matches!(
            ChunkMessage::decode(&data),
            Err(ProtocolError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn test_end_roundtrip() {
        let msg = EndMessage {
            export_id: "abc".to_string(),
            checksum: "deadbeef".to_string(),
        };
        match decode_any(&msg.encode().unwrap()).unwrap() {
            TransferMessage::End(d) => assert_eq!(d, msg),
            other => panic!("wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_end_rejects_non_hex_checksum() {
        let msg = EndMessage {
            export_id: "abc".to_string(),
            checksum: "not-hex".to_string(),
        };
        assert!(matches!(
            EndMessage::decode(&msg.encode().unwrap()),
            Err(ProtocolError::Schema(_))
        ));
    }

    #[test]
    fn test_typed_decoders_check_discriminator() {
        let chunk = ChunkMessage::new("abc", 0, Bytes::new()).encode();
        assert!(matches!(
            StartMessage::decode(&chunk),
            Err(ProtocolError::DiscriminatorMismatch {
                expected: START_TYPE,
                found: CHUNK_TYPE
            })
        ));

        let start = start().encode().unwrap();
        assert!(matches!(
            ChunkMessage::decode(&start),
            Err(ProtocolError::DiscriminatorMismatch { .. })
        ));
        assert!(matches!(
            EndMessage::decode(&start),
            Err(ProtocolError::DiscriminatorMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_any_empty() {
        assert!(matches!(
            decode_any(&Bytes::new()),
            Err(ProtocolError::Empty)
        ));
    }

    #[test]
    fn test_decode_any_unknown_type() {
        for b in [0x00u8, 0x01, 0x42, 0xF3, 0xFF] {
            assert!(matches!(
                decode_any(&Bytes::copy_from_slice(&[b, 1, 2, 3])),
                Err(ProtocolError::UnknownType(found)) if found == b
            ));
        }
    }

    #[test]
    fn test_decode_any_invalid_json() {
        let data = Bytes::from_static(&[END_TYPE, b'{', b'x']);
        assert!(matches!(decode_any(&data), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_message_kind_from_byte() {
        assert_eq!(MessageKind::from_byte(START_TYPE).unwrap(), MessageKind::Start);
        assert_eq!(MessageKind::from_byte(CHUNK_TYPE).unwrap(), MessageKind::Chunk);
        assert_eq!(MessageKind::from_byte(END_TYPE).unwrap(), MessageKind::End);
        assert_eq!(MessageKind::End.as_byte(), END_TYPE);
        assert!(MessageKind::from_byte(0x00).is_err());
    }
}
