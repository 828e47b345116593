//! Declared relationship model.
//!
//! The session-scoped, in-memory graph: directed relationship edges plus
//! parent-child groups, over character references that are independent of any
//! specific live instance. The model is what the editing layer mutates; the
//! reconciliation builder consumes it at commit and makes the host match it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::RelationTypeCatalog;
use crate::host::{CharacterKind, Gender, HostSim, LiveId, RelationTypeId};
use crate::inverse::InverseResolver;

/// Error types for model operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("unknown character: {0}")]
    UnknownCharacter(CharacterId),

    #[error("duplicate relationship ({ty}, {from} -> {target})")]
    DuplicateRelationship {
        ty: RelationTypeId,
        from: CharacterId,
        target: CharacterId,
    },

    #[error("a character cannot relate to itself: {0}")]
    SelfRelationship(CharacterId),

    #[error("unknown parent-child group index: {0}")]
    UnknownGroup(usize),
}

/// Stable character id, persisted across sessions.
///
/// Live host characters keep their host-given id; placeholders mint a UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(String);

impl CharacterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CharacterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CharacterId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Where a referenced character comes from.
///
/// Hidden characters are real family members inferred from existing
/// relations, never directly edited; Temporary characters are throwaway
/// placeholders used during group editing. Both materialize lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CharacterRole {
    Colony,
    World,
    Hidden,
    Temporary,
}

impl CharacterRole {
    pub fn is_placeholder(self) -> bool {
        matches!(self, CharacterRole::Hidden | CharacterRole::Temporary)
    }
}

/// Opaque reference to a live character or an unmaterialized placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterRef {
    pub id: CharacterId,
    pub role: CharacterRole,
    pub kind: CharacterKind,

    /// Live binding; `None` until first materialization. The transition is
    /// one-way.
    pub live: Option<LiveId>,

    /// Synthesis constraints for not-yet-materialized placeholders.
    pub fixed_gender: Option<Gender>,
    pub fixed_biological_age: Option<f32>,

    /// Display index for unnamed-family-member labeling; Hidden and
    /// Temporary characters are numbered separately.
    pub display_index: Option<u32>,
}

impl CharacterRef {
    pub fn new(id: CharacterId, role: CharacterRole, kind: CharacterKind) -> Self {
        Self {
            id,
            role,
            kind,
            live: None,
            fixed_gender: None,
            fixed_biological_age: None,
            display_index: None,
        }
    }

    /// A colony character already bound to its live instance.
    pub fn colony(id: CharacterId, live: LiveId, kind: CharacterKind) -> Self {
        let mut character = Self::new(id, CharacterRole::Colony, kind);
        character.live = Some(live);
        character
    }

    /// A world character already bound to its live instance.
    pub fn world(id: CharacterId, live: LiveId, kind: CharacterKind) -> Self {
        let mut character = Self::new(id, CharacterRole::World, kind);
        character.live = Some(live);
        character
    }

    /// A fresh hidden family member, unmaterialized.
    pub fn hidden(kind: CharacterKind) -> Self {
        Self::new(CharacterId::fresh(), CharacterRole::Hidden, kind)
    }

    /// A fresh temporary placeholder, unmaterialized.
    pub fn temporary(kind: CharacterKind) -> Self {
        Self::new(CharacterId::fresh(), CharacterRole::Temporary, kind)
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.fixed_gender = Some(gender);
        self
    }

    pub fn with_biological_age(mut self, age: f32) -> Self {
        self.fixed_biological_age = Some(age);
        self
    }

    pub fn is_materialized(&self) -> bool {
        self.live.is_some()
    }

    /// Record the one-way placeholder-to-live transition. A second bind is
    /// ignored: the first live instance stays authoritative.
    pub fn bind(&mut self, live: LiveId) {
        if self.live.is_none() {
            self.live = Some(live);
        } else {
            debug!(id = %self.id, "ignoring rebind of materialized character");
        }
    }
}

/// A declared, directed relationship edge with its precomputed inverse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub ty: RelationTypeId,
    pub source: CharacterId,
    pub target: CharacterId,
    pub inverse: Option<RelationTypeId>,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn new(
        ty: RelationTypeId,
        source: CharacterId,
        target: CharacterId,
        inverse: Option<RelationTypeId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ty,
            source,
            target,
            inverse,
            created_at: Utc::now(),
        }
    }

    pub fn involves(&self, id: &CharacterId) -> bool {
        self.source == *id || self.target == *id
    }

    /// Whether this edge sanctions `ty` holding between `a` and `b`,
    /// checked by the edge's type or its inverse, in either direction.
    pub fn covers(&self, ty: &RelationTypeId, a: &CharacterId, b: &CharacterId) -> bool {
        let type_matches = self.ty == *ty || self.inverse.as_ref() == Some(ty);
        let endpoints_match = (self.source == *a && self.target == *b)
            || (self.source == *b && self.target == *a);
        type_matches && endpoints_match
    }
}

/// A parent-child group: ordered, duplicate-free parent and child sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParentChildGroup {
    pub parents: Vec<CharacterId>,
    pub children: Vec<CharacterId>,
}

impl ParentChildGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parent(&mut self, id: CharacterId) {
        if !self.parents.contains(&id) {
            self.parents.push(id);
        }
    }

    pub fn add_child(&mut self, id: CharacterId) {
        if !self.children.contains(&id) {
            self.children.push(id);
        }
    }

    pub fn remove_parent(&mut self, id: &CharacterId) {
        self.parents.retain(|p| p != id);
    }

    pub fn remove_child(&mut self, id: &CharacterId) {
        self.children.retain(|c| c != id);
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty() && self.children.is_empty()
    }

    pub fn sanctions_parent_link(&self, child: &CharacterId, parent: &CharacterId) -> bool {
        self.children.contains(child) && self.parents.contains(parent)
    }
}

/// Externally persisted edge shape: `(sourceId, targetId, relationTypeName)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedRelationship {
    #[serde(rename = "sourceId")]
    pub source: CharacterId,
    #[serde(rename = "targetId")]
    pub target: CharacterId,
    #[serde(rename = "relationTypeName")]
    pub ty: RelationTypeId,
}

/// Externally persisted group shape: `(parentIds[], childIds[])`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedGroup {
    #[serde(rename = "parentIds")]
    pub parents: Vec<CharacterId>,
    #[serde(rename = "childIds")]
    pub children: Vec<CharacterId>,
}

/// The session-scoped declared graph.
#[derive(Debug, Clone, Default)]
pub struct RelationshipModel {
    characters: BTreeMap<CharacterId, CharacterRef>,
    edges: Vec<Relationship>,
    groups: Vec<ParentChildGroup>,
    next_hidden_index: u32,
    next_temporary_index: u32,
}

impl RelationshipModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reverse-engineer a starting model from the relations and parent links
    /// already recorded on the given live characters.
    ///
    /// Assignable edges and parent links are imported; group synthesis later
    /// consumes the parent links into groups. Everything else the host
    /// recorded is left for the validity pass to strip at commit.
    pub fn from_host<H: HostSim>(
        host: &mut H,
        resolver: &mut InverseResolver,
        catalog: &RelationTypeCatalog,
        starting: &[(CharacterId, LiveId)],
    ) -> crate::Result<Self> {
        let mut model = Self::new();
        let parent_type = catalog.parent_type().clone();

        let mut by_live: BTreeMap<LiveId, CharacterId> = BTreeMap::new();
        for (id, live) in starting {
            let kind = host.kind(*live)?;
            model.register_character(CharacterRef::colony(id.clone(), *live, kind));
            by_live.insert(*live, id.clone());
        }

        for (_, live) in starting {
            let this_id = by_live[live].clone();
            for (ty, other_live) in host.direct_relations(*live)? {
                if ty != parent_type && !catalog.is_assignable(&ty) {
                    continue;
                }
                let other_id = match by_live.get(&other_live) {
                    Some(id) => id.clone(),
                    None => {
                        // A family member outside the editable set: track it
                        // as a hidden character bound to its live instance.
                        let kind = host.kind(other_live)?;
                        let mut hidden = CharacterRef::hidden(kind);
                        hidden.bind(other_live);
                        let id = hidden.id.clone();
                        by_live.insert(other_live, id.clone());
                        model.register_character(hidden);
                        id
                    }
                };
                if model.edge_covering(&ty, &this_id, &other_id).is_some() {
                    continue;
                }
                let inverse = resolver.resolve(host, &ty)?;
                model.add_relationship(ty, this_id.clone(), other_id, inverse)?;
            }
        }

        debug!(
            characters = model.characters.len(),
            edges = model.edges.len(),
            "bootstrapped relationship model from host"
        );
        Ok(model)
    }

    /// Replay externally persisted edges and groups into this model.
    /// References to characters the model does not know are skipped with a
    /// warning; stale preset data never blocks the session.
    pub fn import_saved<H: HostSim>(
        &mut self,
        host: &mut H,
        resolver: &mut InverseResolver,
        edges: &[SavedRelationship],
        groups: &[SavedGroup],
    ) -> crate::Result<()> {
        for saved in edges {
            if self.character(&saved.source).is_none() {
                tracing::warn!(id = %saved.source, "saved relationship references unknown character; skipped");
                continue;
            }
            if self.character(&saved.target).is_none() {
                tracing::warn!(id = %saved.target, "saved relationship references unknown character; skipped");
                continue;
            }
            if self
                .edge_covering(&saved.ty, &saved.source, &saved.target)
                .is_some()
            {
                continue;
            }
            let inverse = resolver.resolve(host, &saved.ty)?;
            self.add_relationship(
                saved.ty.clone(),
                saved.source.clone(),
                saved.target.clone(),
                inverse,
            )?;
        }

        for saved in groups {
            let index = self.add_group();
            for parent in &saved.parents {
                if self.character(parent).is_none() {
                    tracing::warn!(id = %parent, "saved group references unknown parent; skipped");
                    continue;
                }
                self.add_parent_to_group(index, parent.clone())?;
            }
            for child in &saved.children {
                if self.character(child).is_none() {
                    tracing::warn!(id = %child, "saved group references unknown child; skipped");
                    continue;
                }
                self.add_child_to_group(index, child.clone())?;
            }
        }
        Ok(())
    }

    /// Export the declared graph in the externally persisted shapes.
    pub fn to_saved(&self) -> (Vec<SavedRelationship>, Vec<SavedGroup>) {
        let edges = self
            .edges
            .iter()
            .map(|e| SavedRelationship {
                source: e.source.clone(),
                target: e.target.clone(),
                ty: e.ty.clone(),
            })
            .collect();
        let groups = self
            .groups
            .iter()
            .map(|g| SavedGroup {
                parents: g.parents.clone(),
                children: g.children.clone(),
            })
            .collect();
        (edges, groups)
    }

    pub fn register_character(&mut self, character: CharacterRef) {
        self.characters
            .entry(character.id.clone())
            .or_insert(character);
    }

    pub fn character(&self, id: &CharacterId) -> Option<&CharacterRef> {
        self.characters.get(id)
    }

    pub fn character_mut(&mut self, id: &CharacterId) -> Option<&mut CharacterRef> {
        self.characters.get_mut(id)
    }

    pub fn characters(&self) -> impl Iterator<Item = &CharacterRef> {
        self.characters.values()
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.edges
    }

    pub fn groups(&self) -> &[ParentChildGroup] {
        &self.groups
    }

    pub(crate) fn groups_mut(&mut self) -> &mut Vec<ParentChildGroup> {
        &mut self.groups
    }

    /// Add a declared edge. At most one edge per `(type, source, target)`
    /// triple may exist.
    pub fn add_relationship(
        &mut self,
        ty: RelationTypeId,
        source: CharacterId,
        target: CharacterId,
        inverse: Option<RelationTypeId>,
    ) -> Result<&Relationship, ModelError> {
        if source == target {
            return Err(ModelError::SelfRelationship(source));
        }
        if !self.characters.contains_key(&source) {
            return Err(ModelError::UnknownCharacter(source));
        }
        if !self.characters.contains_key(&target) {
            return Err(ModelError::UnknownCharacter(target));
        }
        if self
            .edges
            .iter()
            .any(|e| e.ty == ty && e.source == source && e.target == target)
        {
            return Err(ModelError::DuplicateRelationship {
                ty,
                from: source,
                target,
            });
        }

        self.edges
            .push(Relationship::new(ty, source, target, inverse));
        let index = self.edges.len() - 1;
        Ok(&self.edges[index])
    }

    pub fn remove_relationship(&mut self, edge_id: &str) -> Option<Relationship> {
        let index = self.edges.iter().position(|e| e.id == edge_id)?;
        Some(self.edges.remove(index))
    }

    /// Remove and return every declared edge of the given type. Group
    /// discovery uses this to consume parent-type edges, leaving groups as
    /// the only declared carrier of parenthood.
    pub(crate) fn take_edges_of_type(&mut self, ty: &RelationTypeId) -> Vec<Relationship> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.edges)
            .into_iter()
            .partition(|e| e.ty == *ty);
        self.edges = kept;
        taken
    }

    pub fn find_relationship(
        &self,
        ty: &RelationTypeId,
        source: &CharacterId,
        target: &CharacterId,
    ) -> Option<&Relationship> {
        self.edges
            .iter()
            .find(|e| e.ty == *ty && e.source == *source && e.target == *target)
    }

    /// First declared edge sanctioning `ty` between `a` and `b`, if any.
    pub fn edge_covering(
        &self,
        ty: &RelationTypeId,
        a: &CharacterId,
        b: &CharacterId,
    ) -> Option<&Relationship> {
        self.edges.iter().find(|e| e.covers(ty, a, b))
    }

    /// Whether any group lists `parent` as a parent of `child`.
    pub fn sanctions_parent_link(&self, child: &CharacterId, parent: &CharacterId) -> bool {
        self.groups
            .iter()
            .any(|g| g.sanctions_parent_link(child, parent))
    }

    pub fn add_group(&mut self) -> usize {
        self.groups.push(ParentChildGroup::new());
        self.groups.len() - 1
    }

    pub fn group(&self, index: usize) -> Option<&ParentChildGroup> {
        self.groups.get(index)
    }

    pub fn remove_group(&mut self, index: usize) -> Result<ParentChildGroup, ModelError> {
        if index >= self.groups.len() {
            return Err(ModelError::UnknownGroup(index));
        }
        Ok(self.groups.remove(index))
    }

    pub fn add_parent_to_group(
        &mut self,
        index: usize,
        parent: CharacterId,
    ) -> Result<(), ModelError> {
        if !self.characters.contains_key(&parent) {
            return Err(ModelError::UnknownCharacter(parent));
        }
        let group = self
            .groups
            .get_mut(index)
            .ok_or(ModelError::UnknownGroup(index))?;
        group.add_parent(parent);
        Ok(())
    }

    pub fn add_child_to_group(
        &mut self,
        index: usize,
        child: CharacterId,
    ) -> Result<(), ModelError> {
        if !self.characters.contains_key(&child) {
            return Err(ModelError::UnknownCharacter(child));
        }
        let group = self
            .groups
            .get_mut(index)
            .ok_or(ModelError::UnknownGroup(index))?;
        group.add_child(child);
        Ok(())
    }

    pub fn remove_parent_from_group(
        &mut self,
        index: usize,
        parent: &CharacterId,
    ) -> Result<(), ModelError> {
        let group = self
            .groups
            .get_mut(index)
            .ok_or(ModelError::UnknownGroup(index))?;
        group.remove_parent(parent);
        Ok(())
    }

    pub fn remove_child_from_group(
        &mut self,
        index: usize,
        child: &CharacterId,
    ) -> Result<(), ModelError> {
        let group = self
            .groups
            .get_mut(index)
            .ok_or(ModelError::UnknownGroup(index))?;
        group.remove_child(child);
        Ok(())
    }

    /// Ids referenced by any declared edge or group, in traversal order
    /// (edges first, then groups), deduplicated.
    pub fn referenced_character_ids(&self) -> Vec<CharacterId> {
        let mut seen = std::collections::BTreeSet::new();
        let mut ordered = Vec::new();
        let push = |id: &CharacterId, seen: &mut std::collections::BTreeSet<CharacterId>,
                        ordered: &mut Vec<CharacterId>| {
            if seen.insert(id.clone()) {
                ordered.push(id.clone());
            }
        };
        for edge in &self.edges {
            push(&edge.source, &mut seen, &mut ordered);
            push(&edge.target, &mut seen, &mut ordered);
        }
        for group in &self.groups {
            for parent in &group.parents {
                push(parent, &mut seen, &mut ordered);
            }
            for child in &group.children {
                push(child, &mut seen, &mut ordered);
            }
        }
        ordered
    }

    pub(crate) fn claim_hidden_index(&mut self) -> u32 {
        let index = self.next_hidden_index;
        self.next_hidden_index += 1;
        index
    }

    pub(crate) fn claim_temporary_index(&mut self) -> u32 {
        let index = self.next_temporary_index;
        self.next_temporary_index += 1;
        index
    }
}
