//! Parent-child group synthesis.
//!
//! The pipeline runs whenever declared parent/child structure changes and
//! again at commit: discover candidate groups from parent-type edges,
//! canonicalize parent order, merge groups with identical parent sets,
//! repair under-parented groups by manufacturing plausible hidden parents,
//! and hand out display indices for unnamed family members.
//!
//! The host treats children sharing only one listed parent as half-siblings,
//! so any group with two or more children must end up with exactly two
//! parents.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{DefaultHasher, Hash, Hasher};

use rand::Rng;
use tracing::{debug, warn};

use crate::builder::BuildWarning;
use crate::config::EngineConfig;
use crate::host::{CharacterKind, Gender, HostSim};
use crate::model::{CharacterId, CharacterRef, CharacterRole, ParentChildGroup, RelationshipModel};
use crate::sampling::parent_age_offset;

/// Run the full pipeline. Returns the ids of any parents synthesized during
/// repair alongside the warnings it accumulated.
pub fn synthesize_groups<H: HostSim, R: Rng>(
    model: &mut RelationshipModel,
    host: &H,
    config: &EngineConfig,
    rng: &mut R,
    warnings: &mut Vec<BuildWarning>,
) -> Vec<CharacterId> {
    discover(model, host);
    canonicalize(model);
    deduplicate(model);
    let synthesized = repair_groups(model, host, config, rng, warnings);
    assign_display_indices(model);
    synthesized
}

/// Fold declared parent-type edges into candidate groups, one per child.
///
/// The edges are consumed: after discovery, groups are the only declared
/// carrier of parenthood, so removing a group membership cannot be undone by
/// a lingering edge on the next pass.
fn discover<H: HostSim>(model: &mut RelationshipModel, host: &H) {
    let parent_type = host.parent_type();
    let mut candidates: BTreeMap<CharacterId, Vec<CharacterId>> = BTreeMap::new();
    for edge in model.take_edges_of_type(&parent_type) {
        let parents = candidates.entry(edge.source).or_default();
        if !parents.contains(&edge.target) {
            parents.push(edge.target);
        }
    }

    for (child, parents) in candidates {
        let mut group = ParentChildGroup::new();
        group.parents = parents;
        group.children = vec![child];
        model.groups_mut().push(group);
    }
}

/// Sort each group's parents by stable id for order-independent comparison;
/// parents the model no longer knows sort first.
fn canonicalize(model: &mut RelationshipModel) {
    let known: BTreeSet<CharacterId> = model.characters().map(|c| c.id.clone()).collect();
    for group in model.groups_mut() {
        group
            .parents
            .sort_by_key(|id| (known.contains(id), id.clone()));
    }
}

/// XOR-combined per-parent id hash, used as a dedup pre-filter only.
fn combination_hash(parents: &[CharacterId]) -> u64 {
    parents
        .iter()
        .map(|id| {
            let mut hasher = DefaultHasher::new();
            id.hash(&mut hasher);
            hasher.finish()
        })
        .fold(0, |acc, h| acc ^ h)
}

/// Merge groups whose canonical parent sequences are equal, unioning their
/// children. The combination hash narrows candidates; equality of the
/// sequences decides the merge.
fn deduplicate(model: &mut RelationshipModel) {
    let groups = std::mem::take(model.groups_mut());
    let mut merged: Vec<(u64, ParentChildGroup)> = Vec::new();
    for group in groups {
        let hash = combination_hash(&group.parents);
        match merged
            .iter_mut()
            .find(|(h, existing)| *h == hash && existing.parents == group.parents)
        {
            Some((_, existing)) => {
                for child in group.children {
                    existing.add_child(child);
                }
            }
            None => merged.push((hash, group)),
        }
    }
    *model.groups_mut() = merged.into_iter().map(|(_, group)| group).collect();
}

fn record(warnings: &mut Vec<BuildWarning>, warning: BuildWarning) {
    warn!("{warning}");
    warnings.push(warning);
}

/// Biological age of a referenced character: live data when bound, the
/// synthesis constraint otherwise.
fn known_age<H: HostSim>(model: &RelationshipModel, host: &H, id: &CharacterId) -> Option<f32> {
    let character = model.character(id)?;
    character
        .live
        .and_then(|live| host.biological_age(live).ok())
        .or(character.fixed_biological_age)
}

fn known_gender<H: HostSim>(
    model: &RelationshipModel,
    host: &H,
    id: &CharacterId,
) -> Option<Gender> {
    let character = model.character(id)?;
    character
        .live
        .and_then(|live| host.gender(live).ok())
        .or(character.fixed_gender)
}

/// Bring every group with two or more children up to exactly two parents.
///
/// Returns the ids of synthesized hidden parents; they are registered on the
/// model but not yet materialized.
pub(crate) fn repair_groups<H: HostSim, R: Rng>(
    model: &mut RelationshipModel,
    host: &H,
    config: &EngineConfig,
    rng: &mut R,
    warnings: &mut Vec<BuildWarning>,
) -> Vec<CharacterId> {
    let mut synthesized = Vec::new();

    for index in 0..model.groups().len() {
        let (parents, children) = {
            let group = &model.groups()[index];
            (group.parents.clone(), group.children.clone())
        };
        if children.len() < 2 || parents.len() >= 2 {
            continue;
        }

        let oldest = children
            .iter()
            .filter_map(|id| known_age(model, host, id))
            .fold(None, |acc: Option<f32>, age| {
                Some(acc.map_or(age, |a| a.max(age)))
            });
        let Some(oldest) = oldest else {
            record(
                warnings,
                BuildWarning::GroupUnderParented {
                    group: index,
                    parents: parents.len(),
                    reason: "no child age data".to_string(),
                },
            );
            continue;
        };

        let kind: CharacterKind = children
            .iter()
            .filter_map(|id| model.character(id))
            .map(|c| c.kind.clone())
            .next()
            .unwrap_or_default();
        let Some(life_expectancy) = host.life_expectancy(&kind) else {
            record(
                warnings,
                BuildWarning::GroupUnderParented {
                    group: index,
                    parents: parents.len(),
                    reason: format!("no life expectancy data for kind '{kind}'"),
                },
            );
            continue;
        };

        // Age up implausibly-young hidden parents, preserving their
        // chronological-minus-biological gap.
        for parent_id in &parents {
            let Some(parent) = model.character(parent_id) else {
                continue;
            };
            if parent.role != CharacterRole::Hidden {
                continue;
            }
            let Some(current) = known_age(model, host, parent_id) else {
                continue;
            };
            if current > oldest {
                continue;
            }
            // Record the corrected age as a constraint; the builder applies
            // it to the live instance, preserving the chronological gap.
            let new_biological = oldest + parent_age_offset(rng, life_expectancy, &config.age);
            if let Some(parent) = model.character_mut(parent_id) {
                parent.fixed_biological_age = Some(new_biological);
            }
        }

        let existing_gender = parents
            .iter()
            .filter_map(|id| known_gender(model, host, id))
            .next();
        let needed: Vec<Gender> = match parents.len() {
            0 => vec![Gender::Male, Gender::Female],
            1 => vec![existing_gender.unwrap_or(Gender::Male).opposite()],
            _ => Vec::new(),
        };

        for gender in needed {
            let offset = parent_age_offset(rng, life_expectancy, &config.age);
            let parent = CharacterRef::hidden(kind.clone())
                .with_gender(gender)
                .with_biological_age(oldest + offset);
            let parent_id = parent.id.clone();
            debug!(
                group = index,
                parent = %parent_id,
                ?gender,
                age = oldest + offset,
                "synthesized hidden parent"
            );
            model.register_character(parent);
            model.groups_mut()[index].add_parent(parent_id.clone());
            synthesized.push(parent_id);
        }
    }

    synthesized
}

/// Number Hidden and Temporary characters (separately) in traversal order,
/// for stable unnamed-family-member labels.
pub(crate) fn assign_display_indices(model: &mut RelationshipModel) {
    for id in model.referenced_character_ids() {
        let role = match model.character(&id) {
            Some(c) if c.display_index.is_none() => c.role,
            _ => continue,
        };
        let index = match role {
            CharacterRole::Hidden => model.claim_hidden_index(),
            CharacterRole::Temporary => model.claim_temporary_index(),
            _ => continue,
        };
        if let Some(character) = model.character_mut(&id) {
            character.display_index = Some(index);
        }
    }
}
