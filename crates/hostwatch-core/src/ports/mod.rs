//! Port and connection classification engine.
//!
//! Pipeline: a [`FallbackCoordinator`] captures socket tables through
//! [`ConnectionSource`]s, [`parse`] turns each table into
//! [`ConnectionRecord`]s (classifying the peer with [`is_local`] as it
//! goes), and [`summarize`] folds the records into a [`PortReport`].
//! [`PortAnalyzer`] wires the stages together with service names and
//! interface byte counters.

mod analyzer;
mod classify;
mod collect;
pub mod netdev;
mod parse;
mod record;
mod report;
mod services;
mod source;

pub use analyzer::PortAnalyzer;
pub use classify::{is_foreign_peer, is_local, is_local_ip};
pub use collect::{Collection, CollectionOutcome, FallbackCoordinator, FallbackPolicy};
pub use netdev::InterfaceCounters;
pub use parse::parse;
pub use record::{ConnectionRecord, Protocol, Tool};
pub use report::{PortEntry, PortReport, summarize};
pub use services::{ServiceResolver, ServiceTable};
pub use source::{CommandSource, ConnectionSource};
