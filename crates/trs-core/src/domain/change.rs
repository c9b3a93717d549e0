//! Change records and feed pages
//!
//! These are the values that flow from the feed reader through the change
//! processor into the downstream sink. Payloads are opaque: the engine
//! never looks inside them.

use serde::{Deserialize, Serialize};
use url::Url;

use super::newtypes::{PageToken, SequenceId};

/// Kind of change recorded in a TRS change log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A resource was added to the tracked set
    Creation,
    /// A tracked resource changed
    Modification,
    /// A resource left the tracked set
    Deletion,
}

impl ChangeKind {
    /// Parses the change type as written by TRS providers
    ///
    /// Accepts bare names (`Creation`) as well as prefixed or full-URI
    /// forms (`trs:Creation`, `http://open-services.net/ns/core/trs#Creation`),
    /// case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        let name = raw
            .rsplit(|c| c == ':' || c == '#' || c == '/')
            .next()
            .unwrap_or(raw)
            .to_ascii_lowercase();
        match name.as_str() {
            "creation" => Some(ChangeKind::Creation),
            "modification" => Some(ChangeKind::Modification),
            "deletion" => Some(ChangeKind::Deletion),
            _ => None,
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            ChangeKind::Creation => "Creation",
            ChangeKind::Modification => "Modification",
            ChangeKind::Deletion => "Deletion",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single change event read from a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Position in the change log
    pub sequence_id: SequenceId,
    /// What happened to the resource
    pub kind: ChangeKind,
    /// The tracked resource the event is about
    pub resource_uri: Url,
    /// Opaque event payload, passed through to the sink untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ChangeRecord {
    /// Creates a record without payload
    pub fn new(sequence_id: SequenceId, kind: ChangeKind, resource_uri: Url) -> Self {
        Self {
            sequence_id,
            kind,
            resource_uri,
            payload: None,
        }
    }

    /// Attaches an opaque payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Synthetic creation used to deliver a base member to the sink
    ///
    /// Base members carry the base snapshot's cutoff marker as their
    /// sequence id.
    pub fn base_member(member: &ResourceRef, marker: SequenceId) -> Self {
        Self::new(marker, ChangeKind::Creation, member.uri.clone())
    }
}

/// A member of the base snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// URI of the tracked resource
    pub uri: Url,
}

impl ResourceRef {
    pub fn new(uri: Url) -> Self {
        Self { uri }
    }
}

/// One page of the base snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasePage {
    /// Members listed on this page
    pub members: Vec<ResourceRef>,
    /// The base's cutoff event (every change up to it is reflected in the base)
    pub cutoff: Option<SequenceId>,
    /// Token for the next base page, `None` on the last page
    pub next_page: Option<PageToken>,
}

/// One page of the change log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangePage {
    /// Records on this page, ascending by sequence id per feed contract
    pub records: Vec<ChangeRecord>,
    /// Token for the next page, `None` when the feed has nothing more for this poll
    pub next_page: Option<PageToken>,
}

impl ChangePage {
    /// Returns true if the page carries no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest sequence id on the page
    pub fn last_sequence(&self) -> Option<SequenceId> {
        self.records.iter().map(|r| r.sequence_id).max()
    }
}
