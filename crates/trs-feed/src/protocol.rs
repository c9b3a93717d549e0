//! TRS wire format
//!
//! Raw JSON shapes returned by a provider, and their conversion into the
//! page types defined in `trs-core`. Links in a response may be absolute or
//! relative; they are resolved against the URL the response came from, and
//! page tokens handed back to the engine are always absolute.
//!
//! ```text
//! GET {feed}              {"base": "...", "changeLog": "..."}
//! GET {base}              {"cutoffEvent": 3, "members": ["..."], "nextPage": "..."}
//! GET {changeLog}?since=N {"changes": [{"order": 4, "type": "trs:Creation",
//!                          "changed": "...", "payload": {...}}], "nextPage": null}
//! ```

use serde::Deserialize;
use trs_core::domain::{
    BasePage, ChangeKind, ChangePage, ChangeRecord, PageToken, ResourceRef, SequenceId,
};
use trs_core::ports::FeedError;
use url::Url;

// ============================================================================
// Wire types
// ============================================================================

/// The TRS document served at the feed URI
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrsDocument {
    pub base: String,
    pub change_log: String,
}

/// One page of the base snapshot
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBasePage {
    #[serde(default)]
    pub cutoff_event: Option<u64>,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// One page of the change log
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireChangePage {
    #[serde(default)]
    pub changes: Vec<WireChange>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// One change event
#[derive(Debug, Deserialize)]
pub struct WireChange {
    pub order: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub changed: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

// ============================================================================
// Resolution
// ============================================================================

/// Absolute base and change-log locations of a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrsLinks {
    pub base: Url,
    pub change_log: Url,
}

impl TrsDocument {
    /// Resolves the document's links against the feed URI
    pub fn resolve(&self, feed_uri: &Url) -> Result<TrsLinks, FeedError> {
        Ok(TrsLinks {
            base: resolve(feed_uri, &self.base)?,
            change_log: resolve(feed_uri, &self.change_log)?,
        })
    }
}

impl WireBasePage {
    /// Converts into a [`BasePage`], resolving links against `source`
    pub fn into_page(self, source: &Url) -> Result<BasePage, FeedError> {
        let members = self
            .members
            .iter()
            .map(|m| resolve(source, m).map(ResourceRef::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BasePage {
            members,
            cutoff: self.cutoff_event.map(SequenceId::new),
            next_page: next_token(source, self.next_page.as_deref())?,
        })
    }
}

impl WireChangePage {
    /// Converts into a [`ChangePage`], resolving links against `source`
    ///
    /// Record order is preserved as served; ordering is checked by the
    /// processor, not here.
    pub fn into_page(self, source: &Url) -> Result<ChangePage, FeedError> {
        let records = self
            .changes
            .into_iter()
            .map(|c| c.into_record(source))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ChangePage {
            records,
            next_page: next_token(source, self.next_page.as_deref())?,
        })
    }
}

impl WireChange {
    fn into_record(self, source: &Url) -> Result<ChangeRecord, FeedError> {
        let kind = ChangeKind::parse(&self.kind).ok_or_else(|| {
            FeedError::InvalidResponse(format!(
                "unknown change type '{}' at order {}",
                self.kind, self.order
            ))
        })?;
        let resource_uri = resolve(source, &self.changed)?;

        Ok(ChangeRecord {
            sequence_id: SequenceId::new(self.order),
            kind,
            resource_uri,
            payload: self.payload,
        })
    }
}

/// Resolves a possibly relative link
pub fn resolve(source: &Url, link: &str) -> Result<Url, FeedError> {
    source
        .join(link.trim())
        .map_err(|e| FeedError::InvalidResponse(format!("invalid link '{link}': {e}")))
}

fn next_token(source: &Url, link: Option<&str>) -> Result<Option<PageToken>, FeedError> {
    match link.map(str::trim).filter(|l| !l.is_empty()) {
        None => Ok(None),
        Some(link) => {
            let url = resolve(source, link)?;
            PageToken::new(url.to_string())
                .map(Some)
                .map_err(|e| FeedError::InvalidResponse(e.to_string()))
        }
    }
}
