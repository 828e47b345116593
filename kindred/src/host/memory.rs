//! In-memory host backend.
//!
//! A complete, deterministic implementation of [`HostSim`] backed by plain
//! maps. It is the reference backend for headless embedding and the double
//! every test in this crate runs against.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{
    CharacterKind, Gender, GenerationRequest, HostError, HostSim, LiveId, RelationTypeDef,
    RelationTypeId,
};

#[derive(Debug, Clone)]
struct LiveCharacter {
    kind: CharacterKind,
    gender: Gender,
    biological_age: f32,
    chronological_age: f32,
    identity_token: i32,
    offstage: bool,
    /// Directed: each entry means the relation holds from this character
    /// toward the other.
    relations: Vec<(RelationTypeId, LiveId)>,
}

/// In-memory [`HostSim`] implementation.
///
/// Relation types may carry a host-private implied inverse: creating a
/// relation also records the implied reciprocal on the other side, which is
/// exactly what empirical inverse probing discovers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHost {
    characters: BTreeMap<LiveId, LiveCharacter>,
    types: BTreeMap<RelationTypeId, RelationTypeDef>,
    implied_inverse: BTreeMap<RelationTypeId, RelationTypeId>,
    life_expectancies: HashMap<CharacterKind, f32>,
    failing_workers: BTreeSet<RelationTypeId>,
    parent_type: Option<RelationTypeId>,
    next_live: u64,
    next_token: i32,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host pre-seeded with a family-style relation vocabulary:
    /// blood-derived `parent`/`child`, symmetric `lover` and `fiance`
    /// (compatibility-sensitive), symmetric `rival`, one-way `admirer`
    /// (no discoverable inverse), and symmetric `bond`.
    pub fn with_family_types() -> Self {
        let mut host = Self::new();
        host.register_relation_type(
            RelationTypeDef::new("parent").family_by_blood(),
            Some("child".into()),
        );
        host.register_relation_type(
            RelationTypeDef::new("child").family_by_blood(),
            Some("parent".into()),
        );
        host.register_relation_type(
            RelationTypeDef::new("lover").compatibility_sensitive(),
            Some("lover".into()),
        );
        host.register_relation_type(
            RelationTypeDef::new("fiance").compatibility_sensitive(),
            Some("fiance".into()),
        );
        host.register_relation_type(RelationTypeDef::new("rival"), Some("rival".into()));
        host.register_relation_type(RelationTypeDef::new("admirer"), None);
        host.register_relation_type(RelationTypeDef::new("bond"), Some("bond".into()));
        host.register_relation_type(RelationTypeDef::new("kin").family_by_blood().without_worker(), None);
        host.set_parent_type("parent".into());
        host.set_life_expectancy(CharacterKind::default(), 80.0);
        host
    }

    pub fn register_relation_type(
        &mut self,
        def: RelationTypeDef,
        implied_inverse: Option<RelationTypeId>,
    ) {
        if let Some(inverse) = implied_inverse {
            self.implied_inverse.insert(def.id.clone(), inverse);
        }
        self.types.insert(def.id.clone(), def);
    }

    pub fn set_parent_type(&mut self, ty: RelationTypeId) {
        self.parent_type = Some(ty);
    }

    pub fn set_life_expectancy(&mut self, kind: CharacterKind, years: f32) {
        self.life_expectancies.insert(kind, years);
    }

    /// Make a relation type's worker fail, for failure-path testing.
    pub fn fail_worker(&mut self, ty: RelationTypeId) {
        self.failing_workers.insert(ty);
    }

    /// Spawn a fully-specified character, the way a scenario seeds colonists.
    pub fn spawn(&mut self, kind: CharacterKind, gender: Gender, biological_age: f32) -> LiveId {
        let id = LiveId(self.next_live);
        self.next_live += 1;
        let token = self.allocate_identity_token();
        self.characters.insert(
            id,
            LiveCharacter {
                kind,
                gender,
                biological_age,
                chronological_age: biological_age,
                identity_token: token,
                offstage: false,
                relations: Vec::new(),
            },
        );
        id
    }

    /// Record a relation directly, bypassing workers, the way the host's own
    /// systems write blood-derived relations.
    pub fn seed_relation(&mut self, owner: LiveId, ty: RelationTypeId, other: LiveId) {
        self.insert_relation(owner, ty, other);
    }

    pub fn is_offstage(&self, id: LiveId) -> bool {
        self.characters.get(&id).map(|c| c.offstage).unwrap_or(false)
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    fn character(&self, id: LiveId) -> Result<&LiveCharacter, HostError> {
        self.characters.get(&id).ok_or(HostError::UnknownCharacter(id))
    }

    fn character_mut(&mut self, id: LiveId) -> Result<&mut LiveCharacter, HostError> {
        self.characters
            .get_mut(&id)
            .ok_or(HostError::UnknownCharacter(id))
    }

    fn insert_relation(&mut self, owner: LiveId, ty: RelationTypeId, other: LiveId) {
        if let Some(character) = self.characters.get_mut(&owner) {
            if !character.relations.iter().any(|(t, o)| *t == ty && *o == other) {
                character.relations.push((ty, other));
            }
        }
    }

    /// Deterministic, symmetric compatibility derived from identity tokens.
    fn token_compatibility(a: i32, b: i32) -> f32 {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut h = (lo as u64)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (hi as u64).wrapping_mul(0xD1B5_4A32_D192_ED03);
        h ^= h >> 33;
        h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
        h ^= h >> 33;
        ((h % 2001) as f32 / 1000.0) - 1.0
    }
}

impl HostSim for InMemoryHost {
    fn relation_types(&self) -> Vec<RelationTypeDef> {
        self.types.values().cloned().collect()
    }

    fn parent_type(&self) -> RelationTypeId {
        self.parent_type
            .clone()
            .unwrap_or_else(|| RelationTypeId::new("parent"))
    }

    fn generate_character(&mut self, req: &GenerationRequest) -> Result<LiveId, HostError> {
        let gender = req
            .fixed_gender
            .unwrap_or(if self.next_live % 2 == 0 { Gender::Male } else { Gender::Female });
        let age = req.fixed_biological_age.unwrap_or(30.0);
        if age < 0.0 {
            return Err(HostError::GenerationFailed(format!(
                "negative biological age {age}"
            )));
        }
        Ok(self.spawn(req.kind.clone(), gender, age))
    }

    fn kill_offstage(&mut self, id: LiveId) -> Result<(), HostError> {
        self.character_mut(id)?.offstage = true;
        Ok(())
    }

    fn direct_relations(&self, id: LiveId) -> Result<Vec<(RelationTypeId, LiveId)>, HostError> {
        Ok(self.character(id)?.relations.clone())
    }

    fn create_relation(
        &mut self,
        ty: &RelationTypeId,
        source: LiveId,
        target: LiveId,
    ) -> Result<(), HostError> {
        let def = self
            .types
            .get(ty)
            .ok_or_else(|| HostError::UnknownRelationType(ty.clone()))?;
        if !def.has_worker || self.failing_workers.contains(ty) {
            return Err(HostError::WorkerFailed {
                ty: ty.clone(),
                reason: "no usable relation worker".to_string(),
            });
        }
        self.character(source)?;
        self.character(target)?;

        self.insert_relation(source, ty.clone(), target);
        if let Some(inverse) = self.implied_inverse.get(ty).cloned() {
            self.insert_relation(target, inverse, source);
        }
        Ok(())
    }

    fn remove_relation(
        &mut self,
        owner: LiveId,
        ty: &RelationTypeId,
        other: LiveId,
    ) -> Result<(), HostError> {
        let character = self.character_mut(owner)?;
        character
            .relations
            .retain(|(t, o)| !(t == ty && *o == other));
        Ok(())
    }

    fn existing_relation_types(
        &self,
        a: LiveId,
        b: LiveId,
    ) -> Result<Vec<RelationTypeId>, HostError> {
        Ok(self
            .character(a)?
            .relations
            .iter()
            .filter(|(_, other)| *other == b)
            .map(|(ty, _)| ty.clone())
            .collect())
    }

    fn kind(&self, id: LiveId) -> Result<CharacterKind, HostError> {
        Ok(self.character(id)?.kind.clone())
    }

    fn gender(&self, id: LiveId) -> Result<Gender, HostError> {
        Ok(self.character(id)?.gender)
    }

    fn biological_age(&self, id: LiveId) -> Result<f32, HostError> {
        Ok(self.character(id)?.biological_age)
    }

    fn chronological_age(&self, id: LiveId) -> Result<f32, HostError> {
        Ok(self.character(id)?.chronological_age)
    }

    fn set_ages(
        &mut self,
        id: LiveId,
        biological: f32,
        chronological: f32,
    ) -> Result<(), HostError> {
        let character = self.character_mut(id)?;
        character.biological_age = biological;
        character.chronological_age = chronological;
        Ok(())
    }

    fn life_expectancy(&self, kind: &CharacterKind) -> Option<f32> {
        self.life_expectancies.get(kind).copied()
    }

    fn allocate_identity_token(&mut self) -> i32 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    fn identity_token(&self, id: LiveId) -> Result<i32, HostError> {
        Ok(self.character(id)?.identity_token)
    }

    fn set_identity_token(&mut self, id: LiveId, token: i32) -> Result<(), HostError> {
        self.character_mut(id)?.identity_token = token;
        Ok(())
    }

    fn compatibility(&self, a: LiveId, b: LiveId) -> Result<f32, HostError> {
        let ta = self.identity_token(a)?;
        let tb = self.identity_token(b)?;
        Ok(Self::token_compatibility(ta, tb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_and_lookup() {
        let mut host = InMemoryHost::with_family_types();
        let id = host.spawn(CharacterKind::default(), Gender::Female, 25.0);
        assert_eq!(host.gender(id).unwrap(), Gender::Female);
        assert_eq!(host.biological_age(id).unwrap(), 25.0);
        assert!(!host.is_offstage(id));
    }

    #[test]
    fn test_create_relation_records_implied_inverse() {
        let mut host = InMemoryHost::with_family_types();
        let a = host.spawn(CharacterKind::default(), Gender::Male, 30.0);
        let b = host.spawn(CharacterKind::default(), Gender::Female, 28.0);

        host.create_relation(&"parent".into(), a, b).unwrap();

        assert_eq!(
            host.existing_relation_types(a, b).unwrap(),
            vec![RelationTypeId::new("parent")]
        );
        assert_eq!(
            host.existing_relation_types(b, a).unwrap(),
            vec![RelationTypeId::new("child")]
        );
    }

    #[test]
    fn test_duplicate_create_is_noop() {
        let mut host = InMemoryHost::with_family_types();
        let a = host.spawn(CharacterKind::default(), Gender::Male, 30.0);
        let b = host.spawn(CharacterKind::default(), Gender::Female, 28.0);

        host.create_relation(&"lover".into(), a, b).unwrap();
        host.create_relation(&"lover".into(), a, b).unwrap();

        assert_eq!(host.direct_relations(a).unwrap().len(), 1);
        assert_eq!(host.direct_relations(b).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_relation_is_single_sided() {
        let mut host = InMemoryHost::with_family_types();
        let a = host.spawn(CharacterKind::default(), Gender::Male, 30.0);
        let b = host.spawn(CharacterKind::default(), Gender::Female, 28.0);

        host.create_relation(&"lover".into(), a, b).unwrap();
        host.remove_relation(a, &"lover".into(), b).unwrap();

        assert!(host.existing_relation_types(a, b).unwrap().is_empty());
        assert_eq!(
            host.existing_relation_types(b, a).unwrap(),
            vec![RelationTypeId::new("lover")]
        );
    }

    #[test]
    fn test_worker_failure() {
        let mut host = InMemoryHost::with_family_types();
        let a = host.spawn(CharacterKind::default(), Gender::Male, 30.0);
        let b = host.spawn(CharacterKind::default(), Gender::Female, 28.0);

        host.fail_worker("lover".into());
        let err = host.create_relation(&"lover".into(), a, b).unwrap_err();
        assert!(matches!(err, HostError::WorkerFailed { .. }));

        let err = host.create_relation(&"kin".into(), a, b).unwrap_err();
        assert!(matches!(err, HostError::WorkerFailed { .. }));
    }

    #[test]
    fn test_compatibility_is_symmetric_and_token_driven() {
        let mut host = InMemoryHost::with_family_types();
        let a = host.spawn(CharacterKind::default(), Gender::Male, 30.0);
        let b = host.spawn(CharacterKind::default(), Gender::Female, 28.0);

        let forward = host.compatibility(a, b).unwrap();
        let backward = host.compatibility(b, a).unwrap();
        assert_eq!(forward, backward);
        assert!((-1.0..=1.0).contains(&forward));

        let before = host.compatibility(a, b).unwrap();
        host.set_identity_token(b, 991_231).unwrap();
        let after = host.compatibility(a, b).unwrap();
        // Token changes feed straight into the score.
        assert_ne!(before, after);
    }

    #[test]
    fn test_kill_offstage() {
        let mut host = InMemoryHost::with_family_types();
        let a = host.spawn(CharacterKind::default(), Gender::Male, 30.0);
        host.kill_offstage(a).unwrap();
        assert!(host.is_offstage(a));
    }
}
