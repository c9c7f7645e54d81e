//! Events and batches as seen by producers and the uploader.

use bv_common::BatchId;
use serde::{Deserialize, Serialize};

/// Category of an event, persisted alongside its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Default,
    Crash,
    Telemetry,
}

impl EventKind {
    /// On-disk tag of this kind.
    pub fn as_byte(self) -> u8 {
        match self {
            EventKind::Default => 0,
            EventKind::Crash => 1,
            EventKind::Telemetry => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(EventKind::Default),
            1 => Some(EventKind::Crash),
            2 => Some(EventKind::Telemetry),
            _ => None,
        }
    }
}

/// One serialized event: opaque payload plus opaque per-event metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEvent {
    pub data: Vec<u8>,
    pub metadata: Vec<u8>,
    pub kind: Option<EventKind>,
}

impl RawEvent {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        RawEvent {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Bytes counted against the per-item limit: the payload only.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A batch handed to the uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchData {
    pub id: BatchId,
    pub events: Vec<RawEvent>,
    pub metadata: Option<Vec<u8>>,
}
