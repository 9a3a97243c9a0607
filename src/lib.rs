//! heartwave-node: proximity discovery and mutual-interest matching
//!
//! Clients report their position periodically, see the other actors within a
//! small radius, send one-directional "hearts", and learn when a heart is
//! returned (a match). This crate provides:
//! - Haversine distance and radius ranking (`geo`, `proximity`)
//! - The interest ledger and match detection (`ledger`, `matching`)
//! - Live candidate sets pushed from store snapshots (`feed`)
//! - Cancellable periodic position refresh (`scheduler`)
//! - Session wiring over explicit collaborator handles (`session`)
//!
//! All durable state lives behind the [`store::DocumentStore`] trait.

pub mod config;
pub mod error;
pub mod telemetry;

pub mod geo;
pub mod models;
pub mod proximity;

pub mod identity;
pub mod position;
pub mod store;

pub mod ledger;
pub mod matching;

pub mod feed;
pub mod scheduler;
pub mod session;

pub use config::Config;
pub use error::{HeartwaveError, Result};
pub use geo::{distance, Coordinate};
pub use models::{ActorId, CandidateSet, MatchId, MatchRecord, PositionRecord};
pub use session::{Services, Session};
