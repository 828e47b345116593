//! Commit-time reconciliation.
//!
//! The builder consumes the declared model and mutates host relationship
//! storage until the live graph matches it: materialize placeholder
//! characters, strip live edges the model no longer sanctions, create the
//! edges it requires, repair parent-child groups against live data, and
//! opportunistically improve compatibility on the edges it just created.
//!
//! The pass is idempotent: re-running with an unchanged model performs no
//! further mutation. Per-edge failures are downgraded to warnings so a
//! smaller-but-consistent graph wins over an aborted commit; host
//! character-generation failures abort, since they indicate host state the
//! engine cannot reason about.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::catalog::RelationTypeCatalog;
use crate::compat::IdentityTokenPool;
use crate::config::EngineConfig;
use crate::groups;
use crate::host::{GenerationRequest, HostError, HostSim, LiveId, RelationTypeId};
use crate::inverse::InverseResolver;
use crate::model::{CharacterId, CharacterRole, RelationshipModel};

/// Non-fatal findings accumulated during a reconciliation pass.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BuildWarning {
    #[error("declared reference {id} has no live character; skipped")]
    MissingReference { id: CharacterId },

    #[error("relation worker failed for {ty} ({from} -> {target}): {reason}")]
    WorkerFailed {
        ty: RelationTypeId,
        from: CharacterId,
        target: CharacterId,
        reason: String,
    },

    #[error("failed to remove stale {ty} relation from {owner}: {reason}")]
    RemovalFailed {
        ty: RelationTypeId,
        owner: CharacterId,
        reason: String,
    },

    #[error("no inverse resolved for {ty}; reciprocal edges skipped")]
    UnresolvedInverse { ty: RelationTypeId },

    #[error("parent-child group {group} left with {parents} parent(s): {reason}")]
    GroupUnderParented {
        group: usize,
        parents: usize,
        reason: String,
    },

    #[error("compatibility improvement failed for {from} -> {target}: {reason}")]
    CompatibilityFailed {
        from: CharacterId,
        target: CharacterId,
        reason: String,
    },
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub warnings: Vec<BuildWarning>,
    pub edges_created: usize,
    pub edges_removed: usize,
    pub parents_synthesized: usize,
    pub characters_materialized: usize,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Whether the pass changed anything in host storage.
    pub fn mutated(&self) -> bool {
        self.edges_created > 0
            || self.edges_removed > 0
            || self.parents_synthesized > 0
            || self.characters_materialized > 0
    }
}

/// One-shot reconciliation engine. Construct, call [`build`], read the report.
///
/// [`build`]: RelationshipBuilder::build
pub struct RelationshipBuilder<'a, H: HostSim, R: Rng> {
    host: &'a mut H,
    catalog: &'a RelationTypeCatalog,
    resolver: &'a mut InverseResolver,
    config: &'a EngineConfig,
    rng: &'a mut R,
    report: BuildReport,
}

impl<'a, H: HostSim, R: Rng> RelationshipBuilder<'a, H, R> {
    pub fn new(
        host: &'a mut H,
        catalog: &'a RelationTypeCatalog,
        resolver: &'a mut InverseResolver,
        config: &'a EngineConfig,
        rng: &'a mut R,
    ) -> Self {
        Self {
            host,
            catalog,
            resolver,
            config,
            rng,
            report: BuildReport::default(),
        }
    }

    /// Run the reconciliation pass, mutating host storage to match `model`.
    pub fn build(mut self, model: &mut RelationshipModel) -> crate::Result<BuildReport> {
        self.materialize_placeholders(model)?;
        self.validity_pass(model)?;
        let mut compat_targets = self.materialize_edges(model)?;
        self.repair_groups_live(model)?;
        self.materialize_parent_edges(model, &mut compat_targets)?;
        self.improve_compatibility(&compat_targets);

        info!(
            created = self.report.edges_created,
            removed = self.report.edges_removed,
            materialized = self.report.characters_materialized,
            synthesized_parents = self.report.parents_synthesized,
            warnings = self.report.warnings.len(),
            "reconciliation pass complete"
        );
        Ok(self.report)
    }

    fn warn(&mut self, warning: BuildWarning) {
        warn!("{warning}");
        self.report.warnings.push(warning);
    }

    fn live_of(model: &RelationshipModel, id: &CharacterId) -> Option<LiveId> {
        model.character(id).and_then(|c| c.live)
    }

    /// Pass 1: every referenced Hidden/Temporary placeholder gets a live
    /// instance, generated then retired offstage. Unbound Colony/World
    /// references are stale data and are skipped with a warning.
    fn materialize_placeholders(&mut self, model: &mut RelationshipModel) -> crate::Result<()> {
        for id in model.referenced_character_ids() {
            self.materialize_ref(model, &id)?;
        }
        Ok(())
    }

    fn materialize_ref(
        &mut self,
        model: &mut RelationshipModel,
        id: &CharacterId,
    ) -> crate::Result<()> {
        let (role, request) = match model.character(id) {
            None => {
                self.warn(BuildWarning::MissingReference { id: id.clone() });
                return Ok(());
            }
            Some(character) if character.is_materialized() => return Ok(()),
            Some(character) => (
                character.role,
                GenerationRequest {
                    kind: character.kind.clone(),
                    fixed_gender: character.fixed_gender,
                    fixed_biological_age: character.fixed_biological_age,
                },
            ),
        };

        if !role.is_placeholder() {
            self.warn(BuildWarning::MissingReference { id: id.clone() });
            return Ok(());
        }

        let live = self.host.generate_character(&request)?;
        self.host.kill_offstage(live)?;
        if let Some(character) = model.character_mut(id) {
            character.bind(live);
        }
        self.report.characters_materialized += 1;
        debug!(%id, %live, "materialized placeholder character");
        Ok(())
    }

    /// Pass 2: strip live edges the declared model no longer sanctions.
    fn validity_pass(&mut self, model: &RelationshipModel) -> crate::Result<()> {
        let parent_type = self.catalog.parent_type().clone();
        let child_type = self.resolver.resolve(self.host, &parent_type)?;

        let by_live: BTreeMap<LiveId, CharacterId> = model
            .characters()
            .filter_map(|c| c.live.map(|live| (live, c.id.clone())))
            .collect();

        for (live, this_id) in &by_live {
            // Owned snapshot: edge removal cannot invalidate the scan.
            let snapshot = self.host.direct_relations(*live)?;
            for (ty, other_live) in snapshot {
                let keep = match by_live.get(&other_live) {
                    None => false,
                    Some(other_id) => {
                        model.edge_covering(&ty, this_id, other_id).is_some()
                            || (ty == parent_type
                                && model.sanctions_parent_link(this_id, other_id))
                            || (child_type.as_ref() == Some(&ty)
                                && model.sanctions_parent_link(other_id, this_id))
                    }
                };
                if keep {
                    continue;
                }
                match self.host.remove_relation(*live, &ty, other_live) {
                    Ok(()) => {
                        self.report.edges_removed += 1;
                        debug!(owner = %this_id, %ty, "removed unsanctioned relation");
                    }
                    Err(err) => self.warn(BuildWarning::RemovalFailed {
                        ty: ty.clone(),
                        owner: this_id.clone(),
                        reason: err.to_string(),
                    }),
                }
            }
        }
        Ok(())
    }

    /// Pass 3: create every declared edge missing from the live graph, plus
    /// its reciprocal when the type's inverse resolved. Returns the live
    /// pairs whose new edges are compatibility-sensitive.
    fn materialize_edges(
        &mut self,
        model: &mut RelationshipModel,
    ) -> crate::Result<Vec<(CharacterId, CharacterId, LiveId, LiveId)>> {
        let mut compat_targets = Vec::new();
        let mut unresolved_noted = std::collections::BTreeSet::new();
        let edges = model.relationships().to_vec();

        for edge in edges {
            let Some(source_live) = Self::live_of(model, &edge.source) else {
                self.warn(BuildWarning::MissingReference { id: edge.source });
                continue;
            };
            let Some(target_live) = Self::live_of(model, &edge.target) else {
                self.warn(BuildWarning::MissingReference { id: edge.target });
                continue;
            };

            let existing = self.host.existing_relation_types(source_live, target_live)?;
            if !existing.contains(&edge.ty) {
                if !self.try_create(&edge.ty, &edge.source, &edge.target, source_live, target_live)? {
                    continue;
                }
                if self.catalog.is_compatibility_sensitive(&edge.ty) {
                    compat_targets.push((
                        edge.source.clone(),
                        edge.target.clone(),
                        source_live,
                        target_live,
                    ));
                }
            }

            // Automatic reciprocal edge, skipped for types whose inverse
            // never resolved.
            let inverse = match edge.inverse.clone() {
                Some(inverse) => Some(inverse),
                None => self.resolver.resolve(self.host, &edge.ty)?,
            };
            match inverse {
                Some(inverse) => {
                    let back = self.host.existing_relation_types(target_live, source_live)?;
                    if !back.contains(&inverse) {
                        self.try_create(
                            &inverse,
                            &edge.target,
                            &edge.source,
                            target_live,
                            source_live,
                        )?;
                    }
                }
                // Already logged when the resolver gave up on the type; the
                // report notes it once per type per pass.
                None => {
                    if unresolved_noted.insert(edge.ty.clone()) {
                        self.report
                            .warnings
                            .push(BuildWarning::UnresolvedInverse { ty: edge.ty.clone() });
                    }
                }
            }
        }
        Ok(compat_targets)
    }

    /// Worker invocation with the per-edge failure policy: worker errors are
    /// warnings, everything else is fatal. Returns whether an edge was made.
    fn try_create(
        &mut self,
        ty: &RelationTypeId,
        source_id: &CharacterId,
        target_id: &CharacterId,
        source: LiveId,
        target: LiveId,
    ) -> crate::Result<bool> {
        match self.host.create_relation(ty, source, target) {
            Ok(()) => {
                self.report.edges_created += 1;
                Ok(true)
            }
            Err(err @ (HostError::WorkerFailed { .. } | HostError::UnknownRelationType(_))) => {
                self.warn(BuildWarning::WorkerFailed {
                    ty: ty.clone(),
                    from: source_id.clone(),
                    target: target_id.clone(),
                    reason: err.to_string(),
                });
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Pass 4: group parent repair against materialized live characters,
    /// then materialize any parents it synthesized and apply corrected ages.
    fn repair_groups_live(&mut self, model: &mut RelationshipModel) -> crate::Result<()> {
        let mut warnings = Vec::new();
        let synthesized =
            groups::repair_groups(model, &*self.host, self.config, self.rng, &mut warnings);
        // Already logged at the point of recording.
        self.report.warnings.extend(warnings);
        self.report.parents_synthesized += synthesized.len();

        for id in synthesized {
            self.materialize_ref(model, &id)?;
        }
        groups::assign_display_indices(model);
        self.apply_age_constraints(model)?;
        Ok(())
    }

    /// Push repair-corrected ages onto live hidden characters, preserving
    /// each one's chronological-minus-biological gap.
    fn apply_age_constraints(&mut self, model: &RelationshipModel) -> crate::Result<()> {
        let constrained: Vec<(LiveId, f32)> = model
            .characters()
            .filter(|c| c.role == CharacterRole::Hidden)
            .filter_map(|c| c.live.zip(c.fixed_biological_age))
            .collect();
        for (live, target_age) in constrained {
            let biological = self.host.biological_age(live)?;
            if (biological - target_age).abs() < 0.01 {
                continue;
            }
            let gap = self.host.chronological_age(live)? - biological;
            self.host.set_ages(live, target_age, target_age + gap)?;
        }
        Ok(())
    }

    /// Pass 5: the parent-type edge for every (parent, child) pair a group
    /// implies.
    fn materialize_parent_edges(
        &mut self,
        model: &mut RelationshipModel,
        compat_targets: &mut Vec<(CharacterId, CharacterId, LiveId, LiveId)>,
    ) -> crate::Result<()> {
        let parent_type = self.catalog.parent_type().clone();
        let groups = model.groups().to_vec();

        for group in groups {
            for child in &group.children {
                let Some(child_live) = Self::live_of(model, child) else {
                    self.warn(BuildWarning::MissingReference { id: child.clone() });
                    continue;
                };
                for parent in &group.parents {
                    let Some(parent_live) = Self::live_of(model, parent) else {
                        self.warn(BuildWarning::MissingReference { id: parent.clone() });
                        continue;
                    };
                    let existing =
                        self.host.existing_relation_types(child_live, parent_live)?;
                    if existing.contains(&parent_type) {
                        continue;
                    }
                    if self.try_create(&parent_type, child, parent, child_live, parent_live)?
                        && self.catalog.is_compatibility_sensitive(&parent_type)
                    {
                        compat_targets.push((
                            child.clone(),
                            parent.clone(),
                            child_live,
                            parent_live,
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Pass 6: best-effort greedy compatibility improvement on newly created
    /// compatibility-sensitive edges.
    fn improve_compatibility(&mut self, targets: &[(CharacterId, CharacterId, LiveId, LiveId)]) {
        if targets.is_empty() {
            return;
        }
        let size = self.config.pool.size_for(self.report.edges_created);
        let mut pool = IdentityTokenPool::allocate(self.host, size);
        debug!(pool = pool.len(), edges = targets.len(), "improving compatibility");

        for (source_id, target_id, source, target) in targets {
            if let Err(err) = pool.improve_edge(self.host, *source, *target) {
                self.warn(BuildWarning::CompatibilityFailed {
                    from: source_id.clone(),
                    target: target_id.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CharacterKind, Gender, InMemoryHost};
    use crate::model::CharacterRef;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    struct Fixture {
        host: InMemoryHost,
        catalog: RelationTypeCatalog,
        resolver: InverseResolver,
        config: EngineConfig,
        rng: ChaCha8Rng,
    }

    impl Fixture {
        fn new() -> Self {
            let host = InMemoryHost::with_family_types();
            let config = EngineConfig::default();
            let catalog = RelationTypeCatalog::from_host(&host, &config);
            let resolver = InverseResolver::new(&config);
            Self {
                host,
                catalog,
                resolver,
                config,
                rng: ChaCha8Rng::seed_from_u64(42),
            }
        }

        fn build(&mut self, model: &mut RelationshipModel) -> BuildReport {
            RelationshipBuilder::new(
                &mut self.host,
                &self.catalog,
                &mut self.resolver,
                &self.config,
                &mut self.rng,
            )
            .build(model)
            .unwrap()
        }
    }

    #[test]
    fn test_warning_messages_render_both_endpoints() {
        let failed = BuildWarning::WorkerFailed {
            ty: "rival".into(),
            from: "a".into(),
            target: "b".into(),
            reason: "worker down".to_string(),
        };
        assert_eq!(
            failed.to_string(),
            "relation worker failed for rival (a -> b): worker down"
        );

        let compat = BuildWarning::CompatibilityFailed {
            from: "a".into(),
            target: "b".into(),
            reason: "no tokens".to_string(),
        };
        assert_eq!(
            compat.to_string(),
            "compatibility improvement failed for a -> b: no tokens"
        );
    }

    #[test]
    fn test_missing_colony_reference_is_warned_and_skipped() {
        let mut fixture = Fixture::new();
        let mut model = RelationshipModel::new();
        // Two colony refs that never got a live binding (stale preset data).
        for id in ["a", "b"] {
            model.register_character(CharacterRef::new(
                id.into(),
                CharacterRole::Colony,
                CharacterKind::default(),
            ));
        }
        model
            .add_relationship("lover".into(), "a".into(), "b".into(), Some("lover".into()))
            .unwrap();

        let report = fixture.build(&mut model);
        assert!(!report.is_clean());
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, BuildWarning::MissingReference { .. })));
        assert_eq!(report.edges_created, 0);
    }

    #[test]
    fn test_worker_failure_keeps_rest_of_graph() {
        let mut fixture = Fixture::new();
        fixture.host.fail_worker("rival".into());

        let a = fixture.host.spawn(CharacterKind::default(), Gender::Male, 30.0);
        let b = fixture.host.spawn(CharacterKind::default(), Gender::Female, 28.0);
        let c = fixture.host.spawn(CharacterKind::default(), Gender::Male, 40.0);

        let mut model = RelationshipModel::new();
        model.register_character(CharacterRef::colony("a".into(), a, CharacterKind::default()));
        model.register_character(CharacterRef::colony("b".into(), b, CharacterKind::default()));
        model.register_character(CharacterRef::colony("c".into(), c, CharacterKind::default()));
        model
            .add_relationship("rival".into(), "a".into(), "b".into(), None)
            .unwrap();
        model
            .add_relationship("lover".into(), "a".into(), "c".into(), Some("lover".into()))
            .unwrap();

        let report = fixture.build(&mut model);

        // The failing edge warned; the healthy edge still materialized.
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, BuildWarning::WorkerFailed { .. })));
        assert!(fixture
            .host
            .existing_relation_types(a, c)
            .unwrap()
            .contains(&"lover".into()));
        assert!(fixture
            .host
            .existing_relation_types(a, b)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_placeholders_materialize_offstage_once() {
        let mut fixture = Fixture::new();
        let mut model = RelationshipModel::new();
        let a = fixture.host.spawn(CharacterKind::default(), Gender::Male, 30.0);
        model.register_character(CharacterRef::colony("a".into(), a, CharacterKind::default()));
        let hidden = CharacterRef::hidden(CharacterKind::default()).with_gender(Gender::Female);
        let hidden_id = hidden.id.clone();
        model.register_character(hidden);
        model
            .add_relationship(
                "lover".into(),
                "a".into(),
                hidden_id.clone(),
                Some("lover".into()),
            )
            .unwrap();

        let report = fixture.build(&mut model);
        assert_eq!(report.characters_materialized, 1);

        let live = model.character(&hidden_id).unwrap().live.unwrap();
        assert!(fixture.host.is_offstage(live));
        assert_eq!(fixture.host.gender(live).unwrap(), Gender::Female);

        // Second pass: binding reused, nothing regenerated.
        let report = fixture.build(&mut model);
        assert_eq!(report.characters_materialized, 0);
    }
}
