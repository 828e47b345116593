//! Editing session facade.
//!
//! A [`Session`] owns everything one editor window needs: the host handle,
//! the discovered type catalog, the inverse resolver with its cache, the
//! declared model, and a seedable RNG. UI code talks to the session; the
//! session decides when the lower layers run.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::builder::{BuildReport, BuildWarning, RelationshipBuilder};
use crate::catalog::RelationTypeCatalog;
use crate::config::EngineConfig;
use crate::groups;
use crate::host::{HostSim, LiveId, RelationTypeDef, RelationTypeId};
use crate::inverse::InverseResolver;
use crate::model::{
    CharacterId, CharacterRef, Relationship, RelationshipModel, SavedGroup, SavedRelationship,
};
use crate::{KindredError, Result};

pub struct Session<H: HostSim> {
    host: H,
    config: EngineConfig,
    catalog: RelationTypeCatalog,
    resolver: InverseResolver,
    model: RelationshipModel,
    rng: ChaCha8Rng,
}

impl<H: HostSim> Session<H> {
    /// Open a session over `host` for the given editable characters.
    ///
    /// Bootstraps the declared model from the relations already recorded on
    /// those characters, then folds their parent links into groups.
    pub fn open(
        mut host: H,
        config: EngineConfig,
        starting: &[(CharacterId, LiveId)],
    ) -> Result<Self> {
        config.validate()?;
        let catalog = RelationTypeCatalog::from_host(&host, &config);
        let mut resolver = InverseResolver::new(&config);
        let mut rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut model = RelationshipModel::from_host(&mut host, &mut resolver, &catalog, starting)?;
        let mut warnings = Vec::new();
        groups::synthesize_groups(&mut model, &host, &config, &mut rng, &mut warnings);

        info!(
            characters = starting.len(),
            assignable_types = catalog.assignable().count(),
            "session opened"
        );
        Ok(Self {
            host,
            config,
            catalog,
            resolver,
            model,
            rng,
        })
    }

    pub fn model(&self) -> &RelationshipModel {
        &self.model
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Relation types the UI may offer for assignment.
    pub fn allowed_relationship_types(&self) -> impl Iterator<Item = &RelationTypeDef> {
        self.catalog.assignable()
    }

    /// The inverse of `ty`, probing the host on first ask.
    pub fn inverse_of(&mut self, ty: &RelationTypeId) -> Result<Option<RelationTypeId>> {
        self.resolver.resolve(&mut self.host, ty)
    }

    /// Register an additional character reference (placeholder or bound).
    pub fn register_character(&mut self, character: CharacterRef) {
        self.model.register_character(character);
    }

    /// Declare an edge. The type must be assignable; its inverse is resolved
    /// up front so the declared edge carries it.
    pub fn add_relationship(
        &mut self,
        ty: RelationTypeId,
        source: CharacterId,
        target: CharacterId,
    ) -> Result<String> {
        if !self.catalog.is_assignable(&ty) {
            return Err(KindredError::TypeNotAssignable(ty));
        }
        let inverse = self.resolver.resolve(&mut self.host, &ty)?;
        let edge = self.model.add_relationship(ty, source, target, inverse)?;
        Ok(edge.id.clone())
    }

    /// Retract a declared edge. The live counterpart, if any, is removed by
    /// the validity pass on the next commit.
    pub fn remove_relationship(&mut self, edge_id: &str) -> Option<Relationship> {
        self.model.remove_relationship(edge_id)
    }

    pub fn add_group(&mut self) -> usize {
        self.model.add_group()
    }

    pub fn remove_group(&mut self, index: usize) -> Result<()> {
        self.model.remove_group(index)?;
        Ok(())
    }

    pub fn add_parent_to_group(&mut self, index: usize, parent: CharacterId) -> Result<()> {
        self.model.add_parent_to_group(index, parent)?;
        Ok(())
    }

    pub fn add_child_to_group(&mut self, index: usize, child: CharacterId) -> Result<()> {
        self.model.add_child_to_group(index, child)?;
        Ok(())
    }

    pub fn remove_parent_from_group(&mut self, index: usize, parent: &CharacterId) -> Result<()> {
        self.model.remove_parent_from_group(index, parent)?;
        Ok(())
    }

    pub fn remove_child_from_group(&mut self, index: usize, child: &CharacterId) -> Result<()> {
        self.model.remove_child_from_group(index, child)?;
        Ok(())
    }

    /// Replay externally persisted edges and groups, then re-run group
    /// synthesis so imported parent edges fold into groups.
    pub fn import_saved(
        &mut self,
        edges: &[SavedRelationship],
        saved_groups: &[SavedGroup],
    ) -> Result<Vec<BuildWarning>> {
        self.model
            .import_saved(&mut self.host, &mut self.resolver, edges, saved_groups)?;
        let mut warnings = Vec::new();
        groups::synthesize_groups(
            &mut self.model,
            &self.host,
            &self.config,
            &mut self.rng,
            &mut warnings,
        );
        Ok(warnings)
    }

    pub fn export_saved(&self) -> (Vec<SavedRelationship>, Vec<SavedGroup>) {
        self.model.to_saved()
    }

    /// Commit the declared model to host storage.
    ///
    /// Runs group synthesis first so freshly declared parent edges are
    /// grouped before reconciliation, then the full reconciliation pass.
    /// Committing twice in a row performs no further mutation.
    pub fn commit(&mut self) -> Result<BuildReport> {
        let mut warnings = Vec::new();
        let synthesized = groups::synthesize_groups(
            &mut self.model,
            &self.host,
            &self.config,
            &mut self.rng,
            &mut warnings,
        );

        let builder = RelationshipBuilder::new(
            &mut self.host,
            &self.catalog,
            &mut self.resolver,
            &self.config,
            &mut self.rng,
        );
        let mut report = builder.build(&mut self.model)?;
        report.parents_synthesized += synthesized.len();
        warnings.extend(report.warnings);
        report.warnings = warnings;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfigBuilder;
    use crate::host::{CharacterKind, Gender, InMemoryHost};

    fn session_with_pair() -> (Session<InMemoryHost>, CharacterId, CharacterId) {
        let mut host = InMemoryHost::with_family_types();
        let a = host.spawn(CharacterKind::default(), Gender::Male, 30.0);
        let b = host.spawn(CharacterKind::default(), Gender::Female, 28.0);
        let config = EngineConfigBuilder::default().with_rng_seed(7).build().unwrap();
        let starting = vec![(CharacterId::from("alex"), a), (CharacterId::from("blair"), b)];
        let session = Session::open(host, config, &starting).unwrap();
        (session, "alex".into(), "blair".into())
    }

    #[test]
    fn test_unassignable_type_is_rejected() {
        let (mut session, alex, blair) = session_with_pair();
        // "kin" is family-by-blood and workerless, never offered in the UI.
        let err = session
            .add_relationship("kin".into(), alex, blair)
            .unwrap_err();
        assert!(matches!(err, KindredError::TypeNotAssignable(_)));
    }

    #[test]
    fn test_add_then_commit_materializes_both_directions() {
        let (mut session, alex, blair) = session_with_pair();
        session
            .add_relationship("lover".into(), alex.clone(), blair.clone())
            .unwrap();

        let report = session.commit().unwrap();
        assert!(report.edges_created >= 1);

        let a = session.model().character(&alex).unwrap().live.unwrap();
        let b = session.model().character(&blair).unwrap().live.unwrap();
        assert!(session
            .host()
            .existing_relation_types(a, b)
            .unwrap()
            .contains(&"lover".into()));
        assert!(session
            .host()
            .existing_relation_types(b, a)
            .unwrap()
            .contains(&"lover".into()));
    }

    #[test]
    fn test_commit_is_idempotent() {
        let (mut session, alex, blair) = session_with_pair();
        session
            .add_relationship("rival".into(), alex, blair)
            .unwrap();

        let first = session.commit().unwrap();
        assert!(first.mutated());

        let second = session.commit().unwrap();
        assert!(!second.mutated(), "second commit mutated: {second:?}");
    }

    #[test]
    fn test_retracting_edge_strips_live_relation_on_commit() {
        let (mut session, alex, blair) = session_with_pair();
        let edge_id = session
            .add_relationship("rival".into(), alex.clone(), blair.clone())
            .unwrap();
        session.commit().unwrap();

        session.remove_relationship(&edge_id).unwrap();
        let report = session.commit().unwrap();
        assert!(report.edges_removed >= 1);

        let a = session.model().character(&alex).unwrap().live.unwrap();
        let b = session.model().character(&blair).unwrap().live.unwrap();
        assert!(session
            .host()
            .existing_relation_types(a, b)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_saved_round_trip_survives_reopen() {
        let (mut session, alex, blair) = session_with_pair();
        session
            .add_relationship("admirer".into(), alex.clone(), blair.clone())
            .unwrap();
        let (edges, saved_groups) = session.export_saved();

        let (mut fresh, _, _) = session_with_pair();
        fresh.import_saved(&edges, &saved_groups).unwrap();
        assert!(fresh
            .model()
            .find_relationship(&"admirer".into(), &alex, &blair)
            .is_some());
    }
}
