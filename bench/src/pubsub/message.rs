use crate::error::BenchError;
use bytes::Bytes;
use derive_more::derive::Display;
use std::collections::HashMap;
use std::fmt::{Display as FmtDisplay, Formatter};
use tokio::sync::oneshot;
use ulid::Ulid;
use uuid::Uuid;

const CORRELATION_ID_KEY: &str = "correlation_id";
const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Opaque message identifier. Textual for most backends, raw bytes for the ones
/// that mandate a binary encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(Bytes);

impl MessageId {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl FmtDisplay for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) => f.write_str(text),
            Err(_) => self.0.iter().try_for_each(|byte| write!(f, "{byte:02x}")),
        }
    }
}

/// Strategy used to assign identifiers to published messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum IdGenerator {
    /// Random UUID encoded in base62, 22 characters at most.
    #[default]
    #[display("short-uuid")]
    ShortUuid,
    /// Random UUID in its hyphenated form.
    #[display("uuid")]
    Uuid,
    /// ULID text, lexicographically ordered by creation time.
    #[display("ulid")]
    TimeOrdered,
    /// ULID as 16 raw bytes.
    #[display("binary-ulid")]
    BinaryUlid,
}

impl IdGenerator {
    pub fn generate(&self) -> MessageId {
        match self {
            IdGenerator::ShortUuid => MessageId::from(encode_base62(Uuid::new_v4().as_u128())),
            IdGenerator::Uuid => MessageId::from(Uuid::new_v4().to_string()),
            IdGenerator::TimeOrdered => MessageId::from(Ulid::new().to_string()),
            IdGenerator::BinaryUlid => {
                MessageId::new(Bytes::copy_from_slice(&Ulid::new().to_bytes()))
            }
        }
    }
}

/// Base62 text of a UUID, the short-uuid format: at most 22 characters.
fn encode_base62(mut value: u128) -> String {
    let mut digits = Vec::with_capacity(22);
    loop {
        digits.push(BASE62_ALPHABET[(value % 62) as usize]);
        value /= 62;
        if value == 0 {
            break;
        }
    }
    digits.into_iter().rev().map(char::from).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    /// Shared by every message of a run, cloning only bumps the reference count.
    pub payload: Bytes,
    pub metadata: HashMap<String, String>,
}

impl Message {
    pub fn new(id: MessageId, payload: Bytes) -> Self {
        Self {
            id,
            payload,
            metadata: HashMap::new(),
        }
    }

    pub fn set_correlation_id(&mut self, correlation_id: String) {
        self.metadata
            .insert(CORRELATION_ID_KEY.to_owned(), correlation_id);
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata.get(CORRELATION_ID_KEY).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Ack,
    Nack,
}

/// A message handed out by a subscriber together with its acknowledgement handle.
/// Dropping a delivery without acking it is treated as a nack by the backend.
#[derive(Debug)]
pub struct Delivery {
    message: Message,
    acker: Option<oneshot::Sender<AckOutcome>>,
}

impl Delivery {
    pub fn new(message: Message, acker: oneshot::Sender<AckOutcome>) -> Self {
        Self {
            message,
            acker: Some(acker),
        }
    }

    /// For backends without acknowledgement semantics.
    pub fn auto_acked(message: Message) -> Self {
        Self {
            message,
            acker: None,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn ack(self) -> Result<Message, BenchError> {
        let Delivery { message, acker } = self;
        if let Some(acker) = acker {
            acker
                .send(AckOutcome::Ack)
                .map_err(|_| BenchError::Acknowledge(message.id.to_string()))?;
        }
        Ok(message)
    }

    pub fn nack(self) -> Result<(), BenchError> {
        let Delivery { message, acker } = self;
        if let Some(acker) = acker {
            acker
                .send(AckOutcome::Nack)
                .map_err(|_| BenchError::Acknowledge(message.id.to_string()))?;
        }
        Ok(())
    }
}
