use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, RwLock};

use lode_core::{EntityId, Guid, MetaHandle, TypeId};
use lode_reflect::{descriptor_by_id, RefResolver, TypeDescriptor, TypeFn};
use lode_reflect::{
    FN_BIND_ASSET, FN_LOAD_ASSET, FN_UNBIND_ASSET, FN_UNLOAD_ASSET, FN_VALIDATE_ASSET,
    FN_VALIDATE_ASSET_RECURSIVE,
};
use lode_storage::Storage;
use lode_tasks::{Task, TaskPool};

use crate::asset_types::{validate_asset_in, validate_asset_recursive_in};
use crate::{AssetEnv, AssetIndex};

/// Id of the batch an operation is scoped to.
pub type BatchId = Guid;

/// Aggregated outcome of an asynchronous operation, with per-GUID errors on
/// partial failure.
#[derive(Clone, Debug)]
pub struct TaskResult {
    /// `true` iff every sub-operation succeeded.
    pub success: bool,
    /// Per-GUID error messages of the failed sub-operations.
    pub errors: Vec<(Guid, String)>,
}

impl TaskResult {
    /// A successful, empty result.
    pub fn ok() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }

    /// Records one failed sub-operation.
    pub fn fail(&mut self, guid: Guid, message: impl Into<String>) {
        self.success = false;
        self.errors.push((guid, message.into()));
    }

    /// Folds another result in; success is the conjunction.
    pub fn merge(&mut self, other: TaskResult) {
        self.success &= other.success;
        self.errors.extend(other.errors);
    }
}

impl Default for TaskResult {
    fn default() -> Self {
        Self::ok()
    }
}

/// Load state of one asset GUID.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum LoadState {
    /// Not materialized.
    #[default]
    Unloaded,
    /// Load dispatched.
    Loading,
    /// Materialized in storage.
    Loaded,
    /// Unload dispatched.
    Unloading,
    /// The last load attempt failed.
    Failed,
}

/// Externally visible status of one asset GUID.
#[derive(Clone, Debug, Default)]
pub struct AssetStatus {
    /// Current load state.
    pub state: LoadState,
    /// Error message of the last failed load.
    pub error: Option<String>,
    /// Leases summed over all batches.
    pub total_leases: usize,
}

#[derive(Default)]
struct AssetState {
    state: LoadState,
    error: Option<String>,
    leases: HashMap<BatchId, usize>,
}

impl AssetState {
    fn total(&self) -> usize {
        self.leases.values().sum()
    }
}

#[derive(Default)]
struct Activity {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Activity {
    fn start(&self) {
        *self.count.lock().unwrap() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn pending(&self) -> usize {
        *self.count.lock().unwrap()
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.idle.wait(count).unwrap();
        }
    }
}

/// Asynchronous, batch-scoped asset lifecycle.
///
/// Each GUID carries a load state and a lease count per batch; the asset is
/// materialized while the summed lease count is non-zero. Loading twice from
/// the same batch accumulates leases but loads exactly once.
pub struct ResourceManager {
    env: AssetEnv,
    pool: Arc<TaskPool>,
    states: Mutex<HashMap<Guid, AssetState>>,
    /// Serializes load/unload bodies; batch strands already serialize within
    /// a batch, this covers cross-batch races on the same GUID.
    op_lock: Mutex<()>,
    activity: Activity,
}

impl ResourceManager {
    /// Creates a manager over the shared storage and worker pool.
    pub fn new(storage: Arc<Storage>, pool: Arc<TaskPool>) -> Arc<Self> {
        Arc::new(Self {
            env: AssetEnv {
                storage,
                index: Arc::new(RwLock::new(AssetIndex::new())),
            },
            pool,
            states: Mutex::new(HashMap::new()),
            op_lock: Mutex::new(()),
            activity: Activity::default(),
        })
    }

    /// The shared object storage.
    pub fn storage(&self) -> &Arc<Storage> {
        &self.env.storage
    }

    /// The shared asset index.
    pub fn index(&self) -> &Arc<RwLock<AssetIndex>> {
        &self.env.index
    }

    fn spawn(self: &Arc<Self>, body: impl FnOnce(&Self) -> TaskResult + Send + 'static) -> Task<TaskResult> {
        let this = self.clone();
        self.activity.start();
        self.pool.submit(move || {
            let result = body(&this);
            this.activity.finish();
            result
        })
    }

    /// Populates the index from a filesystem tree.
    pub fn scan_assets_async(self: &Arc<Self>, root: PathBuf) -> Task<TaskResult> {
        self.spawn(move |this| {
            let result = this.env.index.write().unwrap().scan(&root);
            tracing::info!(
                "asset scan of '{}' indexed {} assets",
                root.display(),
                this.env.index.read().unwrap().len()
            );
            result
        })
    }

    /// For each GUID: takes a lease for `batch`, loads on the 0→1 lease
    /// transition, then runs the type's bind pass. Order is preserved and
    /// duplicates within the call collapse to one lease each.
    pub fn load_and_bind_async(
        self: &Arc<Self>,
        guids: Vec<Guid>,
        batch: BatchId,
    ) -> Task<TaskResult> {
        self.spawn(move |this| this.load_and_bind(&guids, batch))
    }

    /// Synchronous body of [`Self::load_and_bind_async`].
    pub fn load_and_bind(&self, guids: &[Guid], batch: BatchId) -> TaskResult {
        let _serialized = self.op_lock.lock().unwrap();
        let mut result = TaskResult::ok();
        let mut seen = HashSet::new();
        for &guid in guids {
            if !guid.is_valid() {
                result.fail(guid, "invalid guid");
                continue;
            }
            if !seen.insert(guid) {
                continue;
            }
            if let Err(message) = self.load_one(guid, batch) {
                result.fail(guid, message);
            }
        }
        result
    }

    fn descriptor_for(&self, guid: Guid) -> Result<&'static TypeDescriptor, String> {
        let type_id: TypeId = self
            .env
            .index
            .read()
            .unwrap()
            .get(guid)
            .map(|entry| entry.type_id)
            .or_else(|| {
                self.env
                    .storage
                    .handle_for_guid(guid)
                    .map(|handle| handle.type_id)
            })
            .ok_or_else(|| format!("asset {guid} is not in the index"))?;
        descriptor_by_id(type_id).map_err(|err| err.to_string())
    }

    fn load_one(&self, guid: Guid, batch: BatchId) -> Result<(), String> {
        let needs_load = {
            let mut states = self.states.lock().unwrap();
            let state = states.entry(guid).or_default();
            *state.leases.entry(batch).or_insert(0) += 1;
            !matches!(state.state, LoadState::Loaded | LoadState::Loading)
        };

        let desc = self.descriptor_for(guid)?;

        if needs_load {
            self.set_state(guid, LoadState::Loading, None);
            let load = match desc.function(FN_LOAD_ASSET) {
                Some(TypeFn::LoadAsset(load)) => *load,
                _ => {
                    let message = format!("type '{}' registers no load_asset", desc.id_string);
                    self.set_state(guid, LoadState::Failed, Some(message.clone()));
                    return Err(message);
                }
            };
            if let Err(err) = load(&self.env as &dyn Any, guid) {
                let message = err.to_string();
                tracing::warn!("load of asset {guid} failed: {message}");
                self.set_state(guid, LoadState::Failed, Some(message.clone()));
                return Err(message);
            }
            self.set_state(guid, LoadState::Loaded, None);
        }

        if let Some(TypeFn::BindAsset(bind)) = desc.function(FN_BIND_ASSET) {
            bind(&self.env as &dyn Any, guid).map_err(|err| err.to_string())?;
        }
        Ok(())
    }

    /// Inverse of [`Self::load_and_bind_async`]: drops one lease per GUID and
    /// unloads on the 1→0 transition. If the type layer refuses to unload,
    /// the lease is re-taken and the asset stays loaded.
    pub fn unbind_and_unload_async(
        self: &Arc<Self>,
        guids: Vec<Guid>,
        batch: BatchId,
    ) -> Task<TaskResult> {
        self.spawn(move |this| this.unbind_and_unload(&guids, batch))
    }

    /// Synchronous body of [`Self::unbind_and_unload_async`].
    pub fn unbind_and_unload(&self, guids: &[Guid], batch: BatchId) -> TaskResult {
        let _serialized = self.op_lock.lock().unwrap();
        let mut result = TaskResult::ok();
        let mut seen = HashSet::new();
        for &guid in guids {
            if !guid.is_valid() {
                result.fail(guid, "invalid guid");
                continue;
            }
            if !seen.insert(guid) {
                continue;
            }
            if let Err(message) = self.unload_one(guid, batch) {
                result.fail(guid, message);
            }
        }
        result
    }

    fn unload_one(&self, guid: Guid, batch: BatchId) -> Result<(), String> {
        let last_lease = {
            let mut states = self.states.lock().unwrap();
            let state = states
                .get_mut(&guid)
                .ok_or_else(|| format!("asset {guid} has no lease for this batch"))?;
            let count = state
                .leases
                .get_mut(&batch)
                .filter(|count| **count > 0)
                .ok_or_else(|| format!("asset {guid} has no lease for this batch"))?;
            *count -= 1;
            if *count == 0 {
                state.leases.remove(&batch);
            }
            state.total() == 0
        };

        if !last_lease {
            return Ok(());
        }

        let desc = self.descriptor_for(guid)?;
        self.set_state(guid, LoadState::Unloading, None);

        if let Some(TypeFn::UnbindAsset(unbind)) = desc.function(FN_UNBIND_ASSET) {
            if let Err(err) = unbind(&self.env as &dyn Any, guid) {
                // Keep shared resources alive rather than drop them.
                self.retake_lease(guid, batch);
                self.set_state(guid, LoadState::Loaded, None);
                return Err(err.to_string());
            }
        }

        let unload = match desc.function(FN_UNLOAD_ASSET) {
            Some(TypeFn::UnloadAsset(unload)) => *unload,
            _ => {
                self.retake_lease(guid, batch);
                self.set_state(guid, LoadState::Loaded, None);
                return Err(format!("type '{}' registers no unload_asset", desc.id_string));
            }
        };
        if let Err(err) = unload(&self.env as &dyn Any, guid) {
            self.retake_lease(guid, batch);
            self.set_state(guid, LoadState::Loaded, None);
            return Err(err.to_string());
        }

        self.set_state(guid, LoadState::Unloaded, None);
        Ok(())
    }

    /// Runs the per-type bind pass for each GUID without touching leases.
    /// Used to re-resolve references after a closure changes shape.
    pub fn bind_assets(&self, guids: &[Guid]) -> TaskResult {
        let mut result = TaskResult::ok();
        let mut seen = HashSet::new();
        for &guid in guids {
            if !guid.is_valid() || !seen.insert(guid) {
                continue;
            }
            let desc = match self.descriptor_for(guid) {
                Ok(desc) => desc,
                Err(message) => {
                    result.fail(guid, message);
                    continue;
                }
            };
            if let Some(TypeFn::BindAsset(bind)) = desc.function(FN_BIND_ASSET) {
                if let Err(err) = bind(&self.env as &dyn Any, guid) {
                    result.fail(guid, err.to_string());
                }
            }
        }
        result
    }

    fn retake_lease(&self, guid: Guid, batch: BatchId) {
        let mut states = self.states.lock().unwrap();
        let state = states.entry(guid).or_default();
        *state.leases.entry(batch).or_insert(0) += 1;
    }

    /// Unloads and reloads each GUID in place, preserving lease ownership.
    pub fn reload_and_rebind_async(
        self: &Arc<Self>,
        guids: Vec<Guid>,
        batch: BatchId,
    ) -> Task<TaskResult> {
        self.spawn(move |this| this.reload_and_rebind(&guids, batch))
    }

    /// Synchronous body of [`Self::reload_and_rebind_async`].
    pub fn reload_and_rebind(&self, guids: &[Guid], _batch: BatchId) -> TaskResult {
        let _serialized = self.op_lock.lock().unwrap();
        let mut result = TaskResult::ok();
        let mut seen = HashSet::new();
        for &guid in guids {
            if !guid.is_valid() || !seen.insert(guid) {
                continue;
            }
            if let Err(message) = self.reload_one(guid) {
                result.fail(guid, message);
            }
        }
        result
    }

    fn reload_one(&self, guid: Guid) -> Result<(), String> {
        if self.total_leases(guid) == 0 {
            return Err(format!("asset {guid} is not leased"));
        }
        let desc = self.descriptor_for(guid)?;

        if self.get_status(guid).state == LoadState::Loaded {
            if let Some(TypeFn::UnloadAsset(unload)) = desc.function(FN_UNLOAD_ASSET) {
                unload(&self.env as &dyn Any, guid).map_err(|err| err.to_string())?;
            }
        }
        self.set_state(guid, LoadState::Loading, None);
        match desc.function(FN_LOAD_ASSET) {
            Some(TypeFn::LoadAsset(load)) => {
                if let Err(err) = load(&self.env as &dyn Any, guid) {
                    let message = err.to_string();
                    self.set_state(guid, LoadState::Failed, Some(message.clone()));
                    return Err(message);
                }
            }
            _ => return Err(format!("type '{}' registers no load_asset", desc.id_string)),
        }
        self.set_state(guid, LoadState::Loaded, None);
        if let Some(TypeFn::BindAsset(bind)) = desc.function(FN_BIND_ASSET) {
            bind(&self.env as &dyn Any, guid).map_err(|err| err.to_string())?;
        }
        Ok(())
    }

    fn set_state(&self, guid: Guid, state: LoadState, error: Option<String>) {
        let mut states = self.states.lock().unwrap();
        let asset = states.entry(guid).or_default();
        asset.state = state;
        asset.error = error;
    }

    /// Current status of one GUID.
    pub fn get_status(&self, guid: Guid) -> AssetStatus {
        let states = self.states.lock().unwrap();
        states
            .get(&guid)
            .map(|state| AssetStatus {
                state: state.state,
                error: state.error.clone(),
                total_leases: state.total(),
            })
            .unwrap_or_default()
    }

    /// Leases summed over all batches.
    pub fn total_leases(&self, guid: Guid) -> usize {
        self.get_status(guid).total_leases
    }

    /// Checks the GUID's slot through the reflected `validate_asset` when
    /// present.
    pub fn validate_asset(&self, guid: Guid) -> bool {
        if let Ok(desc) = self.descriptor_for(guid) {
            if let Some(TypeFn::ValidateAsset(validate)) = desc.function(FN_VALIDATE_ASSET) {
                return validate(&self.env as &dyn Any, guid);
            }
        }
        validate_asset_in(&self.env, guid)
    }

    /// Checks the GUID and every asset reachable from it.
    pub fn validate_asset_recursive(&self, guid: Guid) -> bool {
        if let Ok(desc) = self.descriptor_for(guid) {
            if let Some(TypeFn::ValidateAssetRecursive(validate)) =
                desc.function(FN_VALIDATE_ASSET_RECURSIVE)
            {
                return validate(&self.env as &dyn Any, guid);
            }
        }
        validate_asset_recursive_in(&self.env, guid)
    }

    /// Current handle of an asset GUID, if loaded.
    pub fn handle_for_guid(&self, guid: Guid) -> Option<MetaHandle> {
        self.env.storage.handle_for_guid(guid)
    }

    /// GUIDs whose indexed name contains `needle`.
    pub fn find_guids_by_name(&self, needle: &str) -> Vec<Guid> {
        self.env.index.read().unwrap().find_guids_by_name(needle)
    }

    /// Returns `true` while manager tasks are outstanding.
    pub fn is_busy(&self) -> bool {
        self.activity.pending() > 0
    }

    /// Number of outstanding manager tasks.
    pub fn queued_tasks(&self) -> usize {
        self.activity.pending()
    }

    /// Blocks until all manager tasks have finished. No cancellation.
    pub fn wait_until_idle(&self) {
        self.activity.wait_idle();
    }
}

impl RefResolver for ResourceManager {
    fn resolve_asset(&self, guid: Guid) -> Option<MetaHandle> {
        self.env.storage.handle_for_guid(guid)
    }

    fn resolve_entity(&self, _guid: Guid) -> Option<EntityId> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_asset::{register_test_types, write_test_asset, TestAsset};

    fn setup() -> (tempfile::TempDir, Arc<ResourceManager>) {
        register_test_types();
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::new());
        let pool = Arc::new(TaskPool::with_threads(2));
        (dir, ResourceManager::new(storage, pool))
    }

    fn scan(rm: &Arc<ResourceManager>, dir: &tempfile::TempDir) {
        let result = rm.scan_assets_async(dir.path().to_path_buf()).wait();
        assert!(result.success);
    }

    #[test]
    fn scan_populates_the_index() {
        let (dir, rm) = setup();
        let first = Guid::generate();
        let second = Guid::generate();
        write_test_asset(dir.path(), first, "rock_small", 1, None);
        write_test_asset(dir.path(), second, "rock_large", 2, None);
        scan(&rm, &dir);

        assert_eq!(rm.index().read().unwrap().len(), 2);
        let found = rm.find_guids_by_name("rock");
        assert_eq!(found, vec![second, first], "sorted by name");
        assert_eq!(rm.find_guids_by_name("tree"), Vec::new());
    }

    #[test]
    fn leases_accumulate_but_the_asset_loads_once() {
        let (dir, rm) = setup();
        let guid = Guid::generate();
        write_test_asset(dir.path(), guid, "lonely", 5, None);
        scan(&rm, &dir);
        let batch = Guid::generate();

        assert!(rm.load_and_bind_async(vec![guid], batch).wait().success);
        assert!(rm.load_and_bind_async(vec![guid], batch).wait().success);
        assert_eq!(rm.total_leases(guid), 2);
        assert_eq!(rm.get_status(guid).state, LoadState::Loaded);

        let handle = rm
            .storage()
            .handle_for_guid_typed::<TestAsset>(guid)
            .unwrap();
        assert_eq!(rm.storage().get_value(handle).unwrap().value, 5);

        assert!(rm.unbind_and_unload_async(vec![guid], batch).wait().success);
        assert_eq!(rm.get_status(guid).state, LoadState::Loaded);
        assert_eq!(rm.total_leases(guid), 1);

        assert!(rm.unbind_and_unload_async(vec![guid], batch).wait().success);
        assert_eq!(rm.get_status(guid).state, LoadState::Unloaded);
        assert!(rm.handle_for_guid(guid).is_none());
    }

    #[test]
    fn duplicates_within_one_call_collapse_to_one_lease() {
        let (dir, rm) = setup();
        let guid = Guid::generate();
        write_test_asset(dir.path(), guid, "dup", 1, None);
        scan(&rm, &dir);
        let batch = Guid::generate();

        assert!(rm
            .load_and_bind_async(vec![guid, guid, guid], batch)
            .wait()
            .success);
        assert_eq!(rm.total_leases(guid), 1);
    }

    #[test]
    fn unknown_guids_surface_per_guid_errors() {
        let (_dir, rm) = setup();
        let missing = Guid::generate();
        let result = rm
            .load_and_bind_async(vec![missing], Guid::generate())
            .wait();
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].0, missing);
    }

    #[test]
    fn bind_resolves_references_between_loaded_assets() {
        let (dir, rm) = setup();
        let child = Guid::generate();
        let parent = Guid::generate();
        write_test_asset(dir.path(), child, "child", 1, None);
        write_test_asset(dir.path(), parent, "parent", 2, Some(child));
        scan(&rm, &dir);
        let batch = Guid::generate();

        assert!(rm
            .load_and_bind_async(vec![child, parent], batch)
            .wait()
            .success);

        let handle = rm
            .storage()
            .handle_for_guid_typed::<TestAsset>(parent)
            .unwrap();
        let loaded = rm.storage().get_value(handle).unwrap();
        assert_eq!(loaded.child.guid, child);
        assert!(loaded.child.is_bound());
    }

    #[test]
    fn binding_a_missing_target_is_soft() {
        let (dir, rm) = setup();
        let child = Guid::generate();
        let parent = Guid::generate();
        write_test_asset(dir.path(), parent, "parent", 2, Some(child));
        scan(&rm, &dir);

        let result = rm.load_and_bind_async(vec![parent], Guid::generate()).wait();
        assert!(result.success, "dangling references never fail the load");

        let handle = rm
            .storage()
            .handle_for_guid_typed::<TestAsset>(parent)
            .unwrap();
        assert!(!rm.storage().get_value(handle).unwrap().child.is_bound());
    }

    #[test]
    fn recursive_validation_follows_references() {
        let (dir, rm) = setup();
        let child = Guid::generate();
        let parent = Guid::generate();
        write_test_asset(dir.path(), child, "child", 1, None);
        write_test_asset(dir.path(), parent, "parent", 2, Some(child));
        scan(&rm, &dir);
        let batch = Guid::generate();

        assert!(rm
            .load_and_bind_async(vec![child, parent], batch)
            .wait()
            .success);
        assert!(rm.validate_asset(parent));
        assert!(rm.validate_asset_recursive(parent));

        assert!(rm.unbind_and_unload_async(vec![child], batch).wait().success);
        assert!(rm.validate_asset(parent));
        assert!(!rm.validate_asset_recursive(parent));
    }

    #[test]
    fn unmatched_unload_fails() {
        let (dir, rm) = setup();
        let guid = Guid::generate();
        write_test_asset(dir.path(), guid, "asset", 1, None);
        scan(&rm, &dir);

        let result = rm
            .unbind_and_unload_async(vec![guid], Guid::generate())
            .wait();
        assert!(!result.success);
        assert_eq!(result.errors[0].0, guid);
    }

    #[test]
    fn reload_restores_the_file_state_and_keeps_leases() {
        let (dir, rm) = setup();
        let guid = Guid::generate();
        write_test_asset(dir.path(), guid, "asset", 5, None);
        scan(&rm, &dir);
        let batch = Guid::generate();

        assert!(rm.load_and_bind_async(vec![guid], batch).wait().success);
        let handle = rm
            .storage()
            .handle_for_guid_typed::<TestAsset>(guid)
            .unwrap();
        rm.storage()
            .modify(handle, |asset: &mut TestAsset| asset.value = 99)
            .unwrap();

        assert!(rm.reload_and_rebind_async(vec![guid], batch).wait().success);
        let handle = rm
            .storage()
            .handle_for_guid_typed::<TestAsset>(guid)
            .unwrap();
        assert_eq!(rm.storage().get_value(handle).unwrap().value, 5);
        assert_eq!(rm.total_leases(guid), 1);
    }

    #[test]
    fn wait_until_idle_drains_manager_tasks() {
        let (dir, rm) = setup();
        let guid = Guid::generate();
        write_test_asset(dir.path(), guid, "asset", 1, None);
        let scan_task = rm.scan_assets_async(dir.path().to_path_buf());
        let load_task = rm.load_and_bind_async(vec![guid], Guid::generate());
        rm.wait_until_idle();
        assert!(!rm.is_busy());
        assert!(scan_task.try_result().is_some());
        assert!(load_task.try_result().is_some());
    }
}
