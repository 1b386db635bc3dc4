//! State pipeline for live events.
//!
//! This crate owns everything between a snapshot source and a
//! subscriber: the per-entity state table, the bounded artifact
//! history, the poll loop that keeps both current, and the fan-out
//! that pushes changes to live subscribers.
//!
//! # Modules
//!
//! - [`broadcast`] -- [`Broadcaster`] registry and [`Subscription`] handles.
//! - [`config`] -- Configuration loading from `touchline-config.yaml` into
//!   strongly-typed structs.
//! - [`generator`] -- [`ArtifactGenerator`] trait and the
//!   [`DownDistanceGenerator`] heuristic.
//! - [`history`] -- Fixed-capacity [`HistoryRing`].
//! - [`poller`] -- The Idle/Polling/Backoff [`Poller`] loop.
//! - [`shutdown`] -- Cooperative [`Shutdown`] signal.
//! - [`source`] -- [`SnapshotSource`] trait and [`StaticSource`].
//! - [`store`] -- The authoritative [`StateStore`].
//!
//! [`Broadcaster`]: broadcast::Broadcaster
//! [`Subscription`]: broadcast::Subscription
//! [`ArtifactGenerator`]: generator::ArtifactGenerator
//! [`DownDistanceGenerator`]: generator::DownDistanceGenerator
//! [`HistoryRing`]: history::HistoryRing
//! [`Poller`]: poller::Poller
//! [`Shutdown`]: shutdown::Shutdown
//! [`SnapshotSource`]: source::SnapshotSource
//! [`StaticSource`]: source::StaticSource
//! [`StateStore`]: store::StateStore

pub mod broadcast;
pub mod config;
pub mod generator;
pub mod history;
pub mod poller;
pub mod shutdown;
pub mod source;
pub mod store;
