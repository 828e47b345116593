//! # Kindred
//!
//! Relationship graph synthesis and reconciliation engine for colony-sim
//! character editors. Kindred lets an editor declare a graph of typed,
//! directed relationships and parent-child family groups over the host
//! simulation's characters, then reconciles that declared model against the
//! host's live relationship storage in one synchronous pass.
//!
//! The engine never hardcodes relation-type knowledge: it discovers the
//! assignable type set from the host at session start and learns each type's
//! inverse empirically, by wiring two disposable probe characters together
//! and observing what the host records on the far side.
//!
//! ## Quick Start
//!
//! ```rust
//! use kindred::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let mut host = InMemoryHost::with_family_types();
//!     let alex = host.spawn(CharacterKind::default(), Gender::Male, 34.0);
//!     let blair = host.spawn(CharacterKind::default(), Gender::Female, 31.0);
//!
//!     let config = EngineConfig::builder().with_rng_seed(1).build()?;
//!     let starting = vec![
//!         (CharacterId::from("alex"), alex),
//!         (CharacterId::from("blair"), blair),
//!     ];
//!     let mut session = Session::open(host, config, &starting)?;
//!
//!     // Declare an edge, then push the model into host storage.
//!     session.add_relationship("rival".into(), "alex".into(), "blair".into())?;
//!     let report = session.commit()?;
//!     assert!(report.is_clean());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`host`]: the [`HostSim`](host::HostSim) trait the engine talks through,
//!   plus an in-memory host for tests.
//! - [`model`]: the declared graph of character references, edges, and
//!   parent-child groups.
//! - [`catalog`] / [`inverse`]: type discovery and empirical inverse
//!   resolution.
//! - [`groups`] / [`sampling`]: group synthesis, deduplication, and
//!   Gaussian parent-age generation.
//! - [`builder`] / [`compat`]: the commit-time reconciliation pass and
//!   greedy compatibility improvement.
//! - [`session`]: the facade an editor holds.
//! - [`logging`]: opt-in subscriber setup for embedders and tests.

pub mod builder;
pub mod catalog;
pub mod compat;
pub mod config;
pub mod groups;
pub mod host;
pub mod inverse;
pub mod logging;
pub mod model;
pub mod sampling;
pub mod session;

/// The prelude re-exports commonly used types for convenience
pub mod prelude {
    pub use crate::builder::{BuildReport, BuildWarning};
    pub use crate::config::{
        AgeSynthesisConfig, EngineConfig, EngineConfigBuilder, TokenPoolConfig,
    };
    pub use crate::host::{
        CharacterKind, Gender, HostSim, InMemoryHost, LiveId, RelationTypeDef, RelationTypeId,
    };
    pub use crate::model::{
        CharacterId, CharacterRef, CharacterRole, ParentChildGroup, Relationship,
        RelationshipModel, SavedGroup, SavedRelationship,
    };
    pub use crate::session::Session;
    pub use crate::{KindredError, Result};
}

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum KindredError {
    /// The host simulation rejected or failed an operation
    #[error("Host error: {0}")]
    Host(#[from] crate::host::HostError),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The declared model rejected an edit
    #[error("Model error: {0}")]
    Model(#[from] crate::model::ModelError),

    /// The type is not offered for assignment (workerless, blood-derived, or
    /// excluded by configuration)
    #[error("Relation type '{0}' is not assignable")]
    TypeNotAssignable(crate::host::RelationTypeId),
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, KindredError>;
