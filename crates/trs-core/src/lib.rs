//! trsync Core - Domain logic for Tracked Resource Set synchronization
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `EndpointDescriptor`, `ChangeRecord`, `Cursor`, `FeedStatus`, `SyncSession`
//! - **Port definitions** - Traits for adapters: `IFeedReader`, `ICursorStore`, `IChangeSink`
//! - **Error taxonomy** - [`SyncError`](domain::SyncError) shared by every adapter
//! - **Configuration** - YAML-backed [`Config`](config::Config)
//!
//! # Architecture
//!
//! The domain module has no I/O. Ports define the trait interfaces that the
//! feed, cache and sync crates implement or consume.

pub mod config;
pub mod domain;
pub mod ports;
