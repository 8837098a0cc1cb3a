// SPDX-License-Identifier: Apache-2.0

//! Interface to the provenance event repository.

use std::collections::HashMap;

/// The kinds of provenance events the queue emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvenanceEventType {
    /// A record was removed from the flow without being processed further.
    Drop,
}

/// Content-claim coordinates recorded on a provenance event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceClaim {
    /// Storage container holding the resource.
    pub container: String,
    /// Section within the container.
    pub section: String,
    /// Unique id of the resource within its section.
    pub claim_id: String,
    /// Offset of the record's content within the resource.
    pub offset: u64,
    /// Size of the record's content in bytes.
    pub size: u64,
}

/// A single provenance event.
#[derive(Debug, Clone)]
pub struct ProvenanceEventRecord {
    /// What happened.
    pub event_type: ProvenanceEventType,
    /// Id of the record the event is about.
    pub flow_file_id: u64,
    /// Identifier of the queue the event originated from.
    pub source_queue_identifier: String,
    /// When the record's lineage began, in epoch milliseconds.
    pub lineage_start_ms: i64,
    /// Snapshot of the record's attributes at event time.
    pub attributes: HashMap<String, String>,
    /// Human-readable details, e.g. who requested the drop.
    pub details: String,
    /// The record's content claim at event time, if it had content.
    pub content_claim: Option<ProvenanceClaim>,
}

impl ProvenanceEventRecord {
    /// Starts building an event of the given type.
    #[must_use]
    pub fn builder(event_type: ProvenanceEventType) -> ProvenanceEventBuilder {
        ProvenanceEventBuilder {
            event_type,
            flow_file_id: 0,
            source_queue_identifier: String::new(),
            lineage_start_ms: 0,
            attributes: HashMap::new(),
            details: String::new(),
            content_claim: None,
        }
    }
}

/// Builder for [`ProvenanceEventRecord`].
#[derive(Debug)]
pub struct ProvenanceEventBuilder {
    event_type: ProvenanceEventType,
    flow_file_id: u64,
    source_queue_identifier: String,
    lineage_start_ms: i64,
    attributes: HashMap<String, String>,
    details: String,
    content_claim: Option<ProvenanceClaim>,
}

impl ProvenanceEventBuilder {
    /// Sets the id of the record the event is about.
    #[must_use]
    pub fn flow_file_id(mut self, id: u64) -> Self {
        self.flow_file_id = id;
        self
    }

    /// Sets the originating queue.
    #[must_use]
    pub fn source_queue_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.source_queue_identifier = identifier.into();
        self
    }

    /// Sets the lineage start date.
    #[must_use]
    pub fn lineage_start_ms(mut self, millis: i64) -> Self {
        self.lineage_start_ms = millis;
        self
    }

    /// Sets the attribute snapshot.
    #[must_use]
    pub fn attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Sets the human-readable details text.
    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    /// Sets the content claim the record carried.
    #[must_use]
    pub fn content_claim(mut self, claim: Option<ProvenanceClaim>) -> Self {
        self.content_claim = claim;
        self
    }

    /// Finishes the event.
    #[must_use]
    pub fn build(self) -> ProvenanceEventRecord {
        ProvenanceEventRecord {
            event_type: self.event_type,
            flow_file_id: self.flow_file_id,
            source_queue_identifier: self.source_queue_identifier,
            lineage_start_ms: self.lineage_start_ms,
            attributes: self.attributes,
            details: self.details,
            content_claim: self.content_claim,
        }
    }
}

/// Repository collecting provenance events.
pub trait ProvenanceEventRepository: Send + Sync {
    /// Registers a batch of events.
    fn register_events(&self, events: Vec<ProvenanceEventRecord>) -> Result<(), std::io::Error>;
}
