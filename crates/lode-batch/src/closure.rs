//! Transitive asset-closure construction.

use std::collections::HashSet;
use std::sync::Arc;

use lode_core::Guid;
use lode_reflect::{descriptor_by_id, TypeFn, FN_COLLECT_ASSET_GUIDS};
use lode_runtime::{BatchId, ResourceManager, TaskResult};

pub(crate) struct ClosureBuildResult {
    pub result: TaskResult,
    pub closure: Vec<Guid>,
    /// GUIDs newly loaded during the build, for rollback on failure.
    pub loaded_now: Vec<Guid>,
}

/// Outgoing asset GUIDs of one loaded asset, via its reflected
/// `collect_asset_guids`.
pub(crate) fn collect_referenced_asset_guids(
    resources: &ResourceManager,
    guid: Guid,
) -> Vec<Guid> {
    let Some(handle) = resources.handle_for_guid(guid) else {
        return Vec::new();
    };
    let Ok(desc) = descriptor_by_id(handle.type_id) else {
        return Vec::new();
    };
    let mut children = Vec::new();
    if let Some(TypeFn::CollectAssetGuids(collect)) = desc.function(FN_COLLECT_ASSET_GUIDS) {
        let _ = resources
            .storage()
            .with_value(handle, &mut |value| collect(value, &mut children));
    }
    children
}

/// BFS over asset GUIDs. Each frontier is loaded before expansion, so later
/// levels can follow references that only exist once their owner is in
/// memory. On a failed load the newly loaded set is reported for rollback
/// and the build aborts.
pub(crate) fn build_asset_closure_recursive(
    roots: &[Guid],
    already_in_closure: &[Guid],
    batch: BatchId,
    resources: &Arc<ResourceManager>,
) -> ClosureBuildResult {
    let mut out = ClosureBuildResult {
        result: TaskResult::ok(),
        closure: Vec::new(),
        loaded_now: Vec::new(),
    };

    let mut already: HashSet<Guid> = already_in_closure.iter().copied().collect();
    let mut seen = HashSet::new();
    let mut frontier = Vec::new();

    for &guid in roots {
        if !guid.is_valid() {
            continue;
        }
        if seen.insert(guid) {
            out.closure.push(guid);
            frontier.push(guid);
        }
    }

    while !frontier.is_empty() && out.result.success {
        // 1) Load everything in this frontier not already leased to the
        //    batch closure.
        let to_load: Vec<Guid> = frontier
            .iter()
            .copied()
            .filter(|guid| !already.contains(guid))
            .collect();

        if !to_load.is_empty() {
            let loaded = resources.load_and_bind(&to_load, batch);
            out.loaded_now.extend(to_load.iter().copied());
            out.result.merge(loaded);
            if !out.result.success {
                break;
            }
            already.extend(to_load);
        }

        // 2) Expand: follow each frontier asset's outgoing references.
        let mut next = Vec::new();
        for &guid in &frontier {
            for child in collect_referenced_asset_guids(resources, guid) {
                if !child.is_valid() {
                    continue;
                }
                if seen.insert(child) {
                    out.closure.push(child);
                    next.push(child);
                }
            }
        }
        frontier = next;
    }

    out.closure.sort();
    out.closure.dedup();
    out
}

pub(crate) fn append_new_elements(
    closure: &mut Vec<Guid>,
    candidates: &[Guid],
    added: &mut Vec<Guid>,
) {
    for &guid in candidates {
        if !closure.contains(&guid) {
            closure.push(guid);
            added.push(guid);
        }
    }
}

pub(crate) fn diff_sets(
    old_closure: &[Guid],
    new_closure: &[Guid],
    to_add: &mut Vec<Guid>,
    to_remove: &mut Vec<Guid>,
) {
    let old: HashSet<Guid> = old_closure.iter().copied().collect();
    let new: HashSet<Guid> = new_closure.iter().copied().collect();
    to_add.extend(new.difference(&old));
    to_remove.extend(old.difference(&new));
    to_add.sort();
    to_remove.sort();
}
