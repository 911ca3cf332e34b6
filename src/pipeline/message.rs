//! Message groups and batches
//!
//! A [`MessageGroup`] is the unit of work handed over by the transport layer:
//! the decoded messages of one upsert notification together with the settings
//! that were current when it arrived. A [`Batch`] is what one batching window
//! collected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use strum_macros::{Display, EnumIter, EnumString};

/// Classification of an upsert delivered by the transport
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UpsertKind {
    /// Newly arrived messages the application should react to
    Notify,
    /// Historical or synced messages appended without notification
    Append,
}

/// One unit of inbound work
///
/// Immutable once submitted; the pipeline shares it behind an `Arc` between
/// the batcher, the executor and every handler attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageGroup {
    /// Decoded messages in transport order
    pub messages: Vec<Value>,

    /// Upsert classification
    #[serde(rename = "type")]
    pub kind: UpsertKind,

    /// Correlation identifier supplied by the transport, if any
    #[serde(default, rename = "requestId", alias = "request_id")]
    pub request_id: Option<String>,

    /// Caller context valid for the lifetime of this group
    #[serde(default = "empty_settings")]
    pub settings: Arc<Value>,

    /// Submission order, assigned by the ingestion channel
    #[serde(skip)]
    pub sequence: u64,

    /// When the transport handed the group over
    #[serde(skip, default = "SystemTime::now")]
    pub received_at: SystemTime,
}

fn empty_settings() -> Arc<Value> {
    Arc::new(Value::Null)
}

impl MessageGroup {
    pub fn new(messages: Vec<Value>, kind: UpsertKind) -> Self {
        Self {
            messages,
            kind,
            request_id: None,
            settings: empty_settings(),
            sequence: 0,
            received_at: SystemTime::now(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_settings(mut self, settings: Arc<Value>) -> Self {
        self.settings = settings;
        self
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Time since the transport handed the group over
    ///
    /// Zero if the wall clock went backwards in between.
    pub fn queued_for(&self) -> Duration {
        self.received_at.elapsed().unwrap_or_default()
    }

    /// Short identifier for logs: the request id when present, the sequence otherwise
    pub fn label(&self) -> String {
        match &self.request_id {
            Some(id) => format!("#{} ({})", self.sequence, id),
            None => format!("#{}", self.sequence),
        }
    }
}

/// Groups collected during one batching window, in arrival order
#[derive(Debug, Clone)]
pub struct Batch {
    window_id: u64,
    groups: Vec<Arc<MessageGroup>>,
}

impl Batch {
    /// Build a batch; empty windows produce no batch at all
    pub fn new(window_id: u64, groups: Vec<Arc<MessageGroup>>) -> Option<Self> {
        if groups.is_empty() {
            None
        } else {
            Some(Self { window_id, groups })
        }
    }

    pub fn window_id(&self) -> u64 {
        self.window_id
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> &[Arc<MessageGroup>] {
        &self.groups
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.groups.iter().map(|g| g.sequence).collect()
    }

    pub fn into_groups(self) -> Vec<Arc<MessageGroup>> {
        self.groups
    }
}
