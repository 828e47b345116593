//! Relation type catalog.
//!
//! A pure, session-start snapshot of the host's relation-type definitions,
//! filtered down to the types a user may assign by hand: a usable worker,
//! not blood-derived, and not barred by configuration.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::EngineConfig;
use crate::host::{HostSim, RelationTypeDef, RelationTypeId};

#[derive(Debug, Clone)]
pub struct RelationTypeCatalog {
    all: BTreeMap<RelationTypeId, RelationTypeDef>,
    assignable: BTreeSet<RelationTypeId>,
    parent_type: RelationTypeId,
}

impl RelationTypeCatalog {
    pub fn from_host<H: HostSim>(host: &H, config: &EngineConfig) -> Self {
        let mut all = BTreeMap::new();
        let mut assignable = BTreeSet::new();
        for def in host.relation_types() {
            let allowed = def.has_worker
                && !def.family_by_blood
                && !config.excluded_types.contains(def.id.as_str());
            if allowed {
                assignable.insert(def.id.clone());
            }
            all.insert(def.id.clone(), def);
        }
        Self {
            all,
            assignable,
            parent_type: host.parent_type(),
        }
    }

    /// Types a user may assign, in stable order.
    pub fn assignable(&self) -> impl Iterator<Item = &RelationTypeDef> {
        self.assignable.iter().filter_map(|id| self.all.get(id))
    }

    pub fn is_assignable(&self, ty: &RelationTypeId) -> bool {
        self.assignable.contains(ty)
    }

    /// Any host-defined type, assignable or not.
    pub fn get(&self, ty: &RelationTypeId) -> Option<&RelationTypeDef> {
        self.all.get(ty)
    }

    pub fn is_compatibility_sensitive(&self, ty: &RelationTypeId) -> bool {
        self.all
            .get(ty)
            .map(|def| def.compatibility_sensitive)
            .unwrap_or(false)
    }

    pub fn parent_type(&self) -> &RelationTypeId {
        &self.parent_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;

    #[test]
    fn test_blood_and_workerless_types_filtered() {
        let host = InMemoryHost::with_family_types();
        let catalog = RelationTypeCatalog::from_host(&host, &EngineConfig::default());

        assert!(catalog.is_assignable(&"lover".into()));
        assert!(catalog.is_assignable(&"rival".into()));
        // Blood-derived.
        assert!(!catalog.is_assignable(&"parent".into()));
        assert!(!catalog.is_assignable(&"child".into()));
        // Blood-derived and workerless.
        assert!(!catalog.is_assignable(&"kin".into()));
        // Still known to the catalog.
        assert!(catalog.get(&"parent".into()).is_some());
    }

    #[test]
    fn test_config_exclusions_apply() {
        let host = InMemoryHost::with_family_types();
        let config = EngineConfig::builder()
            .with_excluded_type("bond")
            .build()
            .unwrap();
        let catalog = RelationTypeCatalog::from_host(&host, &config);

        assert!(!catalog.is_assignable(&"bond".into()));
        assert!(catalog.is_assignable(&"lover".into()));
    }

    #[test]
    fn test_compatibility_sensitivity_lookup() {
        let host = InMemoryHost::with_family_types();
        let catalog = RelationTypeCatalog::from_host(&host, &EngineConfig::default());

        assert!(catalog.is_compatibility_sensitive(&"lover".into()));
        assert!(!catalog.is_compatibility_sensitive(&"rival".into()));
        assert!(!catalog.is_compatibility_sensitive(&"missing".into()));
    }
}
