//! trsync Feed - HTTP client for Tracked Resource Set providers
//!
//! Implements the [`IFeedReader`](trs_core::ports::IFeedReader) port over
//! HTTP(S) with optional Basic authentication.
//!
//! ## Modules
//!
//! - [`client`] - reqwest wrapper: auth header, timeout, status classification
//! - [`protocol`] - JSON wire types of the TRS document, base and change log
//! - [`reader`] - [`HttpFeedReader`], the port implementation
//! - [`retry_after`] - `Retry-After` header parsing

pub mod client;
pub mod protocol;
pub mod reader;
pub mod retry_after;

pub use client::FeedClient;
pub use reader::HttpFeedReader;
