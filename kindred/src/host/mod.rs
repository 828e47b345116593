//! Host-simulation interface.
//!
//! The engine never owns characters: they live inside the host simulation and
//! are reached through the [`HostSim`] trait. Everything here is synchronous;
//! a reconciliation pass runs to completion inside one commit call, so the
//! host is only ever touched from a single thread.

mod memory;

pub use memory::InMemoryHost;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a live character inside the host simulation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LiveId(pub u64);

impl fmt::Display for LiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "live:{}", self.0)
    }
}

/// Character gender, as far as parent synthesis cares about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn opposite(self) -> Self {
        match self {
            Gender::Male => Gender::Female,
            Gender::Female => Gender::Male,
        }
    }
}

/// Species/kind of a character, owned by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterKind(pub String);

impl CharacterKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CharacterKind {
    fn default() -> Self {
        Self("human".to_string())
    }
}

impl fmt::Display for CharacterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a host-defined relation type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationTypeId(String);

impl RelationTypeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelationTypeId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Host-defined relation type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationTypeDef {
    pub id: RelationTypeId,

    /// Blood-derived types are implied by parentage, never assigned manually.
    pub family_by_blood: bool,

    /// Whether the host exposes a construction capability for this type.
    pub has_worker: bool,

    /// Whether relations of this type bias gameplay by pairwise compatibility.
    pub compatibility_sensitive: bool,
}

impl RelationTypeDef {
    pub fn new(id: impl Into<RelationTypeId>) -> Self {
        Self {
            id: id.into(),
            family_by_blood: false,
            has_worker: true,
            compatibility_sensitive: false,
        }
    }

    pub fn family_by_blood(mut self) -> Self {
        self.family_by_blood = true;
        self
    }

    pub fn without_worker(mut self) -> Self {
        self.has_worker = false;
        self
    }

    pub fn compatibility_sensitive(mut self) -> Self {
        self.compatibility_sensitive = true;
        self
    }
}

impl From<String> for RelationTypeId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Request for the host to generate a character.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub kind: CharacterKind,
    pub fixed_gender: Option<Gender>,
    pub fixed_biological_age: Option<f32>,
}

impl GenerationRequest {
    pub fn of_kind(kind: CharacterKind) -> Self {
        Self {
            kind,
            fixed_gender: None,
            fixed_biological_age: None,
        }
    }
}

/// Error type for host operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    #[error("unknown live character: {0}")]
    UnknownCharacter(LiveId),

    #[error("unknown relation type: {0}")]
    UnknownRelationType(RelationTypeId),

    #[error("character generation failed: {0}")]
    GenerationFailed(String),

    #[error("relation worker failed for {ty}: {reason}")]
    WorkerFailed { ty: RelationTypeId, reason: String },
}

/// The host simulation's character and relation storage, as the engine sees it.
///
/// `direct_relations` returns an owned snapshot: callers may remove edges
/// while iterating the snapshot without invalidating it.
pub trait HostSim {
    /// All relation types the host defines, assignable or not.
    fn relation_types(&self) -> Vec<RelationTypeDef>;

    /// The distinguished parent relation type.
    fn parent_type(&self) -> RelationTypeId;

    fn generate_character(&mut self, req: &GenerationRequest) -> Result<LiveId, HostError>;

    /// Mark a materialized placeholder inactive/non-participating.
    fn kill_offstage(&mut self, id: LiveId) -> Result<(), HostError>;

    /// Snapshot of the relations held from `id` toward other characters.
    fn direct_relations(&self, id: LiveId) -> Result<Vec<(RelationTypeId, LiveId)>, HostError>;

    /// Construction primitive: assert `ty` from `source` toward `target`.
    /// Creating an already-existing relation is a no-op.
    fn create_relation(
        &mut self,
        ty: &RelationTypeId,
        source: LiveId,
        target: LiveId,
    ) -> Result<(), HostError>;

    fn remove_relation(
        &mut self,
        owner: LiveId,
        ty: &RelationTypeId,
        other: LiveId,
    ) -> Result<(), HostError>;

    /// Relation types currently holding from `a` toward `b`.
    fn existing_relation_types(
        &self,
        a: LiveId,
        b: LiveId,
    ) -> Result<Vec<RelationTypeId>, HostError>;

    fn kind(&self, id: LiveId) -> Result<CharacterKind, HostError>;

    fn gender(&self, id: LiveId) -> Result<Gender, HostError>;

    fn biological_age(&self, id: LiveId) -> Result<f32, HostError>;

    fn chronological_age(&self, id: LiveId) -> Result<f32, HostError>;

    fn set_ages(
        &mut self,
        id: LiveId,
        biological: f32,
        chronological: f32,
    ) -> Result<(), HostError>;

    /// Species life expectancy, if the host has lifespan data for the kind.
    fn life_expectancy(&self, kind: &CharacterKind) -> Option<f32>;

    /// Mint a spare identity token for the compatibility pool.
    fn allocate_identity_token(&mut self) -> i32;

    fn identity_token(&self, id: LiveId) -> Result<i32, HostError>;

    fn set_identity_token(&mut self, id: LiveId, token: i32) -> Result<(), HostError>;

    /// Pairwise compatibility score between two live characters.
    fn compatibility(&self, a: LiveId, b: LiveId) -> Result<f32, HostError>;
}
