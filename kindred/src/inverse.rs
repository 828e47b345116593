//! Inverse relation resolution.
//!
//! The host does not expose inverse-relation metadata, so the resolver
//! discovers it empirically: instantiate two disposable probe characters,
//! assert the relation between them, and read back which type now holds in
//! the opposite direction. Results are cached for the resolver's lifetime;
//! an explicit override table wins over probing for the cases generic
//! inference gets wrong.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::host::{GenerationRequest, HostError, HostSim, RelationTypeId};

#[derive(Debug, Clone, Default)]
pub struct InverseResolver {
    overrides: BTreeMap<RelationTypeId, RelationTypeId>,
    cache: HashMap<RelationTypeId, Option<RelationTypeId>>,
}

impl InverseResolver {
    pub fn new(config: &EngineConfig) -> Self {
        let overrides = config
            .inverse_overrides
            .iter()
            .map(|(ty, inverse)| {
                (
                    RelationTypeId::new(ty.clone()),
                    RelationTypeId::new(inverse.clone()),
                )
            })
            .collect();
        Self {
            overrides,
            cache: HashMap::new(),
        }
    }

    /// The inverse of `ty`, if one is configured or discoverable.
    ///
    /// `Ok(None)` means the type has no resolvable inverse and is excluded
    /// from automatic reciprocal-edge creation; that outcome is cached and
    /// warned about once. Probe-character generation failures propagate.
    pub fn resolve<H: HostSim>(
        &mut self,
        host: &mut H,
        ty: &RelationTypeId,
    ) -> crate::Result<Option<RelationTypeId>> {
        if let Some(cached) = self.cache.get(ty) {
            return Ok(cached.clone());
        }

        let resolved = if let Some(inverse) = self.overrides.get(ty) {
            debug!(%ty, %inverse, "inverse resolved from override table");
            Some(inverse.clone())
        } else {
            self.probe(host, ty)?
        };

        if resolved.is_none() {
            warn!(%ty, "no inverse resolvable; excluding type from reciprocal creation");
        }
        self.cache.insert(ty.clone(), resolved.clone());
        Ok(resolved)
    }

    /// Cached answer, if this type has been resolved before.
    pub fn cached(&self, ty: &RelationTypeId) -> Option<Option<RelationTypeId>> {
        self.cache.get(ty).cloned()
    }

    /// Empirical discovery with two disposable probe characters. The probes
    /// never enter the model; they are killed offstage before returning.
    fn probe<H: HostSim>(
        &self,
        host: &mut H,
        ty: &RelationTypeId,
    ) -> crate::Result<Option<RelationTypeId>> {
        let request = GenerationRequest::default();
        let source = host.generate_character(&request)?;
        let target = host.generate_character(&request)?;

        let answer = match host.create_relation(ty, source, target) {
            Ok(()) => match host.existing_relation_types(target, source) {
                // Prefer a distinct reciprocal type; a symmetric type reports
                // only itself on the far side and resolves to itself.
                Ok(types) => types
                    .iter()
                    .find(|t| *t != ty)
                    .cloned()
                    .or_else(|| types.into_iter().next()),
                Err(err) => {
                    warn!(%ty, error = %err, "inverse probe query failed");
                    None
                }
            },
            Err(HostError::WorkerFailed { reason, .. }) => {
                warn!(%ty, %reason, "inverse probe worker failed");
                None
            }
            Err(HostError::UnknownRelationType(_)) => {
                warn!(%ty, "inverse probe found no such relation type");
                None
            }
            Err(err) => return Err(err.into()),
        };

        for probe in [source, target] {
            if let Err(err) = host.kill_offstage(probe) {
                warn!(%probe, error = %err, "failed to retire inverse probe character");
            }
        }

        debug!(%ty, inverse = ?answer, "inverse probe completed");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;

    fn resolver() -> InverseResolver {
        InverseResolver::new(&EngineConfig::default())
    }

    #[test]
    fn test_probe_discovers_implied_inverse() {
        let mut host = InMemoryHost::with_family_types();
        let mut resolver = resolver();

        let inverse = resolver.resolve(&mut host, &"parent".into()).unwrap();
        assert_eq!(inverse, Some(RelationTypeId::new("child")));
    }

    #[test]
    fn test_symmetric_type_resolves_to_itself() {
        let mut host = InMemoryHost::with_family_types();
        let mut resolver = resolver();

        let inverse = resolver.resolve(&mut host, &"lover".into()).unwrap();
        assert_eq!(inverse, Some(RelationTypeId::new("lover")));
    }

    #[test]
    fn test_unresolvable_inverse_is_nonfatal() {
        let mut host = InMemoryHost::with_family_types();
        let mut resolver = resolver();

        let inverse = resolver.resolve(&mut host, &"admirer".into()).unwrap();
        assert_eq!(inverse, None);
    }

    #[test]
    fn test_override_table_wins_without_probing() {
        let mut host = InMemoryHost::with_family_types();
        let config = EngineConfig::builder()
            .with_inverse_override("admirer", "admired")
            .build()
            .unwrap();
        let mut resolver = InverseResolver::new(&config);

        let before = host.character_count();
        let inverse = resolver.resolve(&mut host, &"admirer".into()).unwrap();
        assert_eq!(inverse, Some(RelationTypeId::new("admired")));
        // No probe characters were generated.
        assert_eq!(host.character_count(), before);
    }

    #[test]
    fn test_resolution_is_cached() {
        let mut host = InMemoryHost::with_family_types();
        let mut resolver = resolver();

        resolver.resolve(&mut host, &"parent".into()).unwrap();
        let after_first = host.character_count();
        resolver.resolve(&mut host, &"parent".into()).unwrap();
        // Second resolution spends no more probes.
        assert_eq!(host.character_count(), after_first);
        assert_eq!(
            resolver.cached(&"parent".into()),
            Some(Some(RelationTypeId::new("child")))
        );
    }

    #[test]
    fn test_probe_characters_are_retired_offstage() {
        let mut host = InMemoryHost::with_family_types();
        let mut resolver = resolver();

        let before = host.character_count();
        resolver.resolve(&mut host, &"lover".into()).unwrap();
        assert_eq!(host.character_count(), before + 2);
        // Both probes exist but are offstage.
        for id in [crate::host::LiveId(0), crate::host::LiveId(1)] {
            assert!(host.is_offstage(id));
        }
    }

    #[test]
    fn test_worker_failure_caches_none() {
        let mut host = InMemoryHost::with_family_types();
        host.fail_worker("lover".into());
        let mut resolver = resolver();

        let inverse = resolver.resolve(&mut host, &"lover".into()).unwrap();
        assert_eq!(inverse, None);
        assert_eq!(resolver.cached(&"lover".into()), Some(None));
    }
}
