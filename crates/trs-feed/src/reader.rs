//! [`IFeedReader`] over HTTP
//!
//! The TRS document at the feed URI is fetched once, on first use, and its
//! base and change-log links are reused for the lifetime of the reader. A
//! failed document fetch is not cached; the next call tries again.

use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, info};
use trs_core::domain::{BasePage, ChangePage, EndpointDescriptor, PageToken, SequenceId};
use trs_core::ports::{FeedError, IFeedReader};
use url::Url;

use crate::client::FeedClient;
use crate::protocol::{TrsDocument, TrsLinks, WireBasePage, WireChangePage};

/// HTTP implementation of [`IFeedReader`]
#[derive(Debug)]
pub struct HttpFeedReader {
    endpoint: EndpointDescriptor,
    client: FeedClient,
    links: OnceCell<TrsLinks>,
}

impl HttpFeedReader {
    /// Creates a reader for `endpoint`
    pub fn new(endpoint: EndpointDescriptor, request_timeout: Duration) -> Result<Self, FeedError> {
        let client = FeedClient::new(&endpoint, request_timeout)?;
        Ok(Self {
            endpoint,
            client,
            links: OnceCell::new(),
        })
    }

    /// The endpoint this reader talks to
    pub fn endpoint(&self) -> &EndpointDescriptor {
        &self.endpoint
    }

    async fn links(&self) -> Result<&TrsLinks, FeedError> {
        self.links
            .get_or_try_init(|| async {
                let feed_uri = self.endpoint.feed_uri();
                let doc: TrsDocument = self.client.get_json(feed_uri).await?;
                let links = doc.resolve(feed_uri)?;
                info!(
                    feed = %feed_uri,
                    base = %links.base,
                    change_log = %links.change_log,
                    "Resolved TRS document"
                );
                Ok(links)
            })
            .await
    }

    fn page_url(token: &PageToken) -> Result<Url, FeedError> {
        Url::parse(token.as_str())
            .map_err(|e| FeedError::InvalidResponse(format!("invalid page token '{token}': {e}")))
    }

    /// Change-log URL for the first page after `since`
    pub fn changes_url(change_log: &Url, since: Option<SequenceId>) -> Url {
        let mut url = change_log.clone();
        if let Some(since) = since {
            url.query_pairs_mut()
                .append_pair("since", &since.value().to_string());
        }
        url
    }
}

#[async_trait::async_trait]
impl IFeedReader for HttpFeedReader {
    fn feed_uri(&self) -> &Url {
        self.endpoint.feed_uri()
    }

    async fn fetch_base_page(&self, page: Option<&PageToken>) -> Result<BasePage, FeedError> {
        let url = match page {
            Some(token) => Self::page_url(token)?,
            None => self.links().await?.base.clone(),
        };

        let wire: WireBasePage = self.client.get_json(&url).await?;
        let page = wire.into_page(&url)?;
        debug!(
            feed = %self.endpoint.feed_uri(),
            members = page.members.len(),
            cutoff = ?page.cutoff,
            has_next = page.next_page.is_some(),
            "Fetched base page"
        );
        Ok(page)
    }

    async fn fetch_changes_page(
        &self,
        since: Option<SequenceId>,
        page: Option<&PageToken>,
    ) -> Result<ChangePage, FeedError> {
        let url = match page {
            Some(token) => Self::page_url(token)?,
            None => Self::changes_url(&self.links().await?.change_log, since),
        };

        let wire: WireChangePage = self.client.get_json(&url).await?;
        let page = wire.into_page(&url)?;
        debug!(
            feed = %self.endpoint.feed_uri(),
            records = page.records.len(),
            last = ?page.last_sequence(),
            has_next = page.next_page.is_some(),
            "Fetched change page"
        );
        Ok(page)
    }
}
