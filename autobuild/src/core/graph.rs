//! Dependency graph validation and topological scheduling.
//!
//! `check_acyclic` is a hard precondition gate: it must run to completion
//! before any agent invocation. `topological_order` then yields the build
//! order for pending features, tie-breaking by roadmap declaration order so
//! repeated runs schedule identically.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::core::types::{Feature, FeatureStatus};
use crate::errors::OrchestratorError;

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Reject any cycle in the declared dependency relation.
///
/// Three-state depth-first traversal: a back-edge to an in-progress node is a
/// cycle. Edges to ids absent from the roadmap are ignored here; scheduling
/// treats them as unsatisfiable instead.
pub fn check_acyclic(features: &[Feature]) -> Result<()> {
    let by_id: HashMap<u32, &Feature> = features.iter().map(|f| (f.id, f)).collect();
    let mut marks: HashMap<u32, Mark> = features.iter().map(|f| (f.id, Mark::Unvisited)).collect();

    for feature in features {
        if marks[&feature.id] == Mark::Unvisited {
            visit(feature.id, &by_id, &mut marks, &mut vec![feature.id])?;
        }
    }
    Ok(())
}

fn visit(
    id: u32,
    by_id: &HashMap<u32, &Feature>,
    marks: &mut HashMap<u32, Mark>,
    path: &mut Vec<u32>,
) -> Result<()> {
    marks.insert(id, Mark::InProgress);
    let deps = by_id.get(&id).map(|f| f.dependency_ids.as_slice()).unwrap_or(&[]);
    for &dep in deps {
        match marks.get(&dep).copied() {
            Some(Mark::InProgress) => {
                path.push(dep);
                return Err(OrchestratorError::CircularDependency {
                    cycle: format_cycle(path),
                }
                .into());
            }
            Some(Mark::Unvisited) => {
                path.push(dep);
                visit(dep, by_id, marks, path)?;
                path.pop();
            }
            Some(Mark::Done) | None => {}
        }
    }
    marks.insert(id, Mark::Done);
    Ok(())
}

fn format_cycle(path: &[u32]) -> String {
    path.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Return pending features in a valid build order.
///
/// Kahn's algorithm over the pending subset. Dependencies on completed
/// features count as satisfied; dependencies on features that are neither
/// pending nor completed are ignored, matching the roadmap's convention that
/// such rows are parked outside this engine. Ties are broken by declaration
/// order.
pub fn topological_order(features: &[Feature]) -> Result<Vec<Feature>> {
    let completed: HashSet<u32> = features
        .iter()
        .filter(|f| f.status == FeatureStatus::Completed)
        .map(|f| f.id)
        .collect();
    let pending: Vec<&Feature> = features
        .iter()
        .filter(|f| f.status == FeatureStatus::Pending)
        .collect();
    let pending_ids: HashSet<u32> = pending.iter().map(|f| f.id).collect();

    // Unmet dependency counts, restricted to edges between pending features.
    let mut unmet: HashMap<u32, usize> = HashMap::new();
    let mut blocked_on: HashMap<u32, Vec<u32>> = HashMap::new();
    for feature in &pending {
        let deps: Vec<u32> = feature
            .dependency_ids
            .iter()
            .copied()
            .filter(|dep| !completed.contains(dep) && pending_ids.contains(dep))
            .collect();
        unmet.insert(feature.id, deps.len());
        blocked_on.insert(feature.id, deps);
    }

    let mut queue: Vec<u32> = pending
        .iter()
        .filter(|f| unmet[&f.id] == 0)
        .map(|f| f.id)
        .collect();
    let mut ordered_ids: Vec<u32> = Vec::new();
    let mut cursor = 0;

    while cursor < queue.len() {
        let current = queue[cursor];
        cursor += 1;
        ordered_ids.push(current);

        // Scan in declaration order so newly unblocked features keep it.
        for feature in &pending {
            if blocked_on[&feature.id].contains(&current) {
                let remaining = unmet.get_mut(&feature.id).expect("pending id tracked");
                *remaining -= 1;
                blocked_on
                    .get_mut(&feature.id)
                    .expect("pending id tracked")
                    .retain(|&dep| dep != current);
                if *remaining == 0 {
                    queue.push(feature.id);
                }
            }
        }
    }

    if ordered_ids.len() < pending.len() {
        let stuck: Vec<u32> = pending
            .iter()
            .filter(|f| !ordered_ids.contains(&f.id))
            .map(|f| f.id)
            .collect();
        return Err(OrchestratorError::CircularDependency {
            cycle: format_cycle(&stuck),
        }
        .into());
    }

    let by_id: HashMap<u32, &Feature> = pending.iter().map(|f| (f.id, *f)).collect();
    Ok(ordered_ids
        .into_iter()
        .map(|id| {
            let feature: &Feature = by_id[&id];
            feature.clone()
        })
        .collect())
}
