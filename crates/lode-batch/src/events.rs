use lode_core::Guid;
use lode_runtime::BatchId;

use crate::BatchInfo;

/// Kind of batch operation an event reports on.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BatchTaskType {
    /// `queue_load`
    Load,
    /// `queue_unload`
    Unload,
    /// `queue_save_batch`
    Save,
    /// `queue_load_all_async`
    LoadAll,
    /// `queue_unload_all_async`
    UnloadAll,
    /// `queue_save_all_async`
    SaveAll,
    /// `queue_create_entity`
    CreateEntity,
    /// `queue_destroy_entity`
    DestroyEntity,
    /// `queue_attach_entity`
    AttachEntity,
    /// `queue_detach_entity`
    DetachEntity,
    /// `queue_spawn_entity`
    SpawnEntity,
    /// `queue_rebuild_closure`
    RebuildClosure,
}

/// Completion report of one batch operation, published on the event queue.
#[derive(Clone, Debug)]
pub struct BatchTaskCompletedEvent {
    /// Operation kind.
    pub kind: BatchTaskType,
    /// Batch the operation ran on; invalid for whole-registry fan-outs.
    pub batch_id: BatchId,
    /// Batch display name, when known.
    pub batch_name: String,
    /// Overall outcome.
    pub success: bool,
    /// Live entities after the operation.
    pub live_entities: usize,
    /// Closure size after the operation.
    pub asset_closure_size: usize,
    /// Batches touched; 1 for single-batch operations.
    pub batch_count: usize,
    /// `true` when the closure statistics below are meaningful.
    pub has_closure_delta: bool,
    /// Direct roots the closure rebuild started from.
    pub closure_roots: usize,
    /// Closure size before the rebuild.
    pub closure_old: usize,
    /// Closure size after the rebuild.
    pub closure_new: usize,
    /// GUIDs added by the rebuild.
    pub closure_added: usize,
    /// GUIDs removed by the rebuild.
    pub closure_removed: usize,
    /// Whether the closure's assets were rebound after the rebuild.
    pub assets_rebound: bool,
}

impl BatchTaskCompletedEvent {
    pub(crate) fn new(kind: BatchTaskType, batch_id: BatchId, success: bool) -> Self {
        Self {
            kind,
            batch_id,
            batch_name: String::new(),
            success,
            live_entities: 0,
            asset_closure_size: 0,
            batch_count: 0,
            has_closure_delta: false,
            closure_roots: 0,
            closure_old: 0,
            closure_new: 0,
            closure_added: 0,
            closure_removed: 0,
            assets_rebound: false,
        }
    }

    pub(crate) fn whole_registry(kind: BatchTaskType, success: bool, batch_count: usize) -> Self {
        let mut event = Self::new(kind, Guid::INVALID, success);
        event.batch_count = batch_count;
        event
    }

    pub(crate) fn fill_from_info(&mut self, info: &BatchInfo) {
        self.batch_name = info.name.clone();
        self.live_entities = info.live.len();
        self.asset_closure_size = info.asset_closure.len();
        if self.batch_count == 0 {
            self.batch_count = 1;
        }
    }
}
