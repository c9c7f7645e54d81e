//! Byte codec for batch files and metadata blobs.
//!
//! The default [`TlvCodec`] frames every event as a sequence of blocks:
//!
//! ```text
//! +------------+--------------+-----------------+
//! | type (u16) | length (u32) | payload         |
//! +------------+--------------+-----------------+
//! ```
//!
//! Integers are big-endian. Block types:
//! - `0x02`: event kind (1 byte), present only when the event has a kind
//! - `0x01`: per-event metadata
//! - `0x00`: event data, terminates the event
//!
//! Batch files are plain concatenations of encoded events, so appending is
//! the only write ever needed. Decoding stops at the first malformed block
//! and returns the events parsed so far.

use std::fmt;
use std::sync::Arc;

use bv_common::{Error, Result};
use tracing::Level;

use crate::event::{EventKind, RawEvent};
use crate::logging::{log_internal, LogTarget};

const BLOCK_DATA: u16 = 0x00;
const BLOCK_EVENT_METADATA: u16 = 0x01;
const BLOCK_EVENT_KIND: u16 = 0x02;

const TYPE_SIZE: usize = 2;
const LENGTH_SIZE: usize = 4;
const HEADER_SIZE: usize = TYPE_SIZE + LENGTH_SIZE;

/// Symmetric byte transform applied before bytes reach the disk.
pub trait Encryption: Send + Sync {
    fn encrypt(&self, data: &[u8]) -> Vec<u8>;

    /// Returns `None` when `data` cannot be decrypted.
    fn decrypt(&self, data: &[u8]) -> Option<Vec<u8>>;
}

/// Serializes events and metadata blobs to and from their on-disk bytes.
pub trait BatchCodec: Send + Sync + fmt::Debug {
    /// Bytes to append to a batch file for one event.
    fn encode_event(&self, event: &RawEvent) -> Result<Vec<u8>>;

    /// Every event that could be parsed from the content of a batch file.
    fn decode_events(&self, bytes: &[u8]) -> Vec<RawEvent>;

    /// Bytes of a metadata file holding `metadata`.
    fn encode_metadata(&self, metadata: &[u8]) -> Result<Vec<u8>>;

    /// Metadata stored in a metadata file, `None` if it cannot be read back.
    fn decode_metadata(&self, bytes: &[u8]) -> Option<Vec<u8>>;
}

/// Type/length/value codec, optionally encrypting every payload.
#[derive(Clone, Default)]
pub struct TlvCodec {
    encryption: Option<Arc<dyn Encryption>>,
}

impl fmt::Debug for TlvCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlvCodec")
            .field("encrypted", &self.encryption.is_some())
            .finish()
    }
}

impl TlvCodec {
    pub fn new() -> Self {
        TlvCodec::default()
    }

    pub fn with_encryption(encryption: Arc<dyn Encryption>) -> Self {
        TlvCodec {
            encryption: Some(encryption),
        }
    }

    fn seal(&self, payload: &[u8]) -> Vec<u8> {
        match &self.encryption {
            Some(encryption) => encryption.encrypt(payload),
            None => payload.to_vec(),
        }
    }

    fn open(&self, payload: &[u8]) -> Option<Vec<u8>> {
        match &self.encryption {
            Some(encryption) => encryption.decrypt(payload),
            None => Some(payload.to_vec()),
        }
    }

    fn put_block(out: &mut Vec<u8>, block_type: u16, payload: &[u8]) -> Result<()> {
        let length = u32::try_from(payload.len()).map_err(|_| Error::ItemTooLarge {
            size: payload.len() as u64,
            limit: u64::from(u32::MAX),
        })?;
        out.extend_from_slice(&block_type.to_be_bytes());
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(payload);
        Ok(())
    }
}

/// Split the block starting at `offset` into (type, payload, next offset).
fn read_block(bytes: &[u8], offset: usize) -> std::result::Result<(u16, &[u8], usize), String> {
    let header_end = offset + HEADER_SIZE;
    if header_end > bytes.len() {
        return Err(format!(
            "truncated block header at offset {} ({} bytes left)",
            offset,
            bytes.len() - offset
        ));
    }
    let block_type = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
    let length = u32::from_be_bytes([
        bytes[offset + 2],
        bytes[offset + 3],
        bytes[offset + 4],
        bytes[offset + 5],
    ]) as usize;
    let end = header_end
        .checked_add(length)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| {
            format!(
                "block of type {:#04x} at offset {} declares {} bytes, only {} available",
                block_type,
                offset,
                length,
                bytes.len() - header_end
            )
        })?;
    Ok((block_type, &bytes[header_end..end], end))
}

impl BatchCodec for TlvCodec {
    fn encode_event(&self, event: &RawEvent) -> Result<Vec<u8>> {
        let metadata = self.seal(&event.metadata);
        let data = self.seal(&event.data);

        let mut out = Vec::with_capacity(3 * HEADER_SIZE + 1 + metadata.len() + data.len());
        if let Some(kind) = event.kind {
            Self::put_block(&mut out, BLOCK_EVENT_KIND, &[kind.as_byte()])?;
        }
        Self::put_block(&mut out, BLOCK_EVENT_METADATA, &metadata)?;
        Self::put_block(&mut out, BLOCK_DATA, &data)?;
        Ok(out)
    }

    fn decode_events(&self, bytes: &[u8]) -> Vec<RawEvent> {
        let mut events = Vec::new();
        let mut offset = 0;
        let mut kind = None;
        let mut metadata = None;

        while offset < bytes.len() {
            let start = offset;
            let (block_type, payload, next) = match read_block(bytes, offset) {
                Ok(block) => block,
                Err(reason) => {
                    log_internal(
                        Level::ERROR,
                        &[LogTarget::Maintainer, LogTarget::Telemetry],
                        &format!("Corrupt batch, keeping {} events: {}", events.len(), reason),
                    );
                    break;
                }
            };
            offset = next;

            match block_type {
                BLOCK_EVENT_KIND => {
                    kind = payload.first().copied().and_then(EventKind::from_byte);
                }
                BLOCK_EVENT_METADATA => match self.open(payload) {
                    Some(plain) => metadata = Some(plain),
                    None => {
                        log_internal(
                            Level::ERROR,
                            &[LogTarget::Maintainer],
                            "Unable to decrypt event metadata, stopping batch decode",
                        );
                        break;
                    }
                },
                BLOCK_DATA => match self.open(payload) {
                    Some(data) => events.push(RawEvent {
                        data,
                        metadata: metadata.take().unwrap_or_default(),
                        kind: kind.take(),
                    }),
                    None => {
                        log_internal(
                            Level::ERROR,
                            &[LogTarget::Maintainer],
                            "Unable to decrypt event data, stopping batch decode",
                        );
                        break;
                    }
                },
                other => {
                    log_internal(
                        Level::ERROR,
                        &[LogTarget::Maintainer, LogTarget::Telemetry],
                        &format!(
                            "Unexpected block type {:#04x} at offset {}, keeping {} events",
                            other,
                            start,
                            events.len()
                        ),
                    );
                    break;
                }
            }
        }

        events
    }

    fn encode_metadata(&self, metadata: &[u8]) -> Result<Vec<u8>> {
        Ok(self.seal(metadata))
    }

    fn decode_metadata(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        self.open(bytes)
    }
}
