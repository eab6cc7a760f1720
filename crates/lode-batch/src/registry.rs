use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use lode_core::{Guid, TypeId};
use lode_runtime::{BatchId, EntityManager, ResourceManager, TaskResult};
use lode_storage::EntityRef;
use lode_tasks::{EventQueue, MainThreadQueue, Strand, Task, TaskPool};
use serde_json::Value;

use crate::closure::{append_new_elements, build_asset_closure_recursive, diff_sets};
use crate::{
    bind_refs_for_entity, collect_asset_guids_for_entity, serialize_entity, spawn_entity_from_desc,
    BatchError, BatchFile, BatchInfo, BatchState, BatchTaskCompletedEvent, BatchTaskType,
    IndexFile,
};
use lode_reflect::Purpose;

struct RegistryInner {
    batches: HashMap<BatchId, BatchInfo>,
    index_path: Option<PathBuf>,
    dirty: HashSet<BatchId>,
}

/// A persistable set of batches.
///
/// Book-keeping (the batch map, live sets, dirty flags) sits behind one
/// mutex that is only held for reads and writes, never across asset loads or
/// main-thread hops. State-changing operations are serialized through the
/// per-registry [`Strand`].
pub struct BatchRegistry {
    inner: Mutex<RegistryInner>,
    resources: Arc<ResourceManager>,
    entities: Arc<Mutex<dyn EntityManager>>,
    main_queue: Arc<MainThreadQueue>,
    events: Arc<EventQueue>,
    pool: Arc<TaskPool>,
    strand: Strand,
}

impl BatchRegistry {
    /// Creates a registry over the shared collaborators.
    pub fn new(
        resources: Arc<ResourceManager>,
        entities: Arc<Mutex<dyn EntityManager>>,
        main_queue: Arc<MainThreadQueue>,
        events: Arc<EventQueue>,
        pool: Arc<TaskPool>,
    ) -> Arc<Self> {
        let strand = Strand::new(pool.clone());
        Arc::new(Self {
            inner: Mutex::new(RegistryInner {
                batches: HashMap::new(),
                index_path: None,
                dirty: HashSet::new(),
            }),
            resources,
            entities,
            main_queue,
            events,
            pool,
            strand,
        })
    }

    /// The resource manager this registry leases assets from.
    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    fn emit(&self, event: BatchTaskCompletedEvent) {
        self.events.enqueue_event(event);
    }

    // ---- index persistence -------------------------------------------------

    /// Loads the batch index, creating an empty one when the file is absent.
    pub fn load_or_create_index(&self, index_path: &Path) -> Result<(), BatchError> {
        match std::fs::read_to_string(index_path) {
            Ok(text) => {
                let file: IndexFile = serde_json::from_str(&text)?;
                let mut inner = self.inner.lock().unwrap();
                inner.batches = file
                    .into_batches()
                    .into_iter()
                    .map(|info| (info.id, info))
                    .collect();
                inner.index_path = Some(index_path.to_path_buf());
                Ok(())
            }
            Err(_missing) => {
                {
                    let mut inner = self.inner.lock().unwrap();
                    inner.batches.clear();
                    inner.index_path = Some(index_path.to_path_buf());
                }
                self.save_index()
            }
        }
    }

    /// Writes the index for all known batches.
    pub fn save_index(&self) -> Result<(), BatchError> {
        let (path, file) = {
            let inner = self.inner.lock().unwrap();
            let path = inner.index_path.clone().ok_or(BatchError::NoIndex)?;
            (path, IndexFile::from_batches(inner.batches.values()))
        };
        let text = serde_json::to_string_pretty(&file)?;
        std::fs::write(&path, text)
            .map_err(|err| BatchError::Io(path.display().to_string(), err.to_string()))
    }

    fn index_dir(&self) -> Result<PathBuf, BatchError> {
        let inner = self.inner.lock().unwrap();
        let path = inner.index_path.as_ref().ok_or(BatchError::NoIndex)?;
        Ok(path.parent().map(Path::to_path_buf).unwrap_or_default())
    }

    /// Creates a new, unloaded batch. Requires a loaded index.
    pub fn create_batch(&self, name: &str) -> Result<BatchId, BatchError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.index_path.is_none() {
            return Err(BatchError::NoIndex);
        }
        let id = Guid::generate();
        let info = BatchInfo::new(id, name.to_owned(), PathBuf::from(format!("{id}.json")));
        inner.batches.insert(id, info);
        Ok(id)
    }

    // ---- snapshots ---------------------------------------------------------

    /// Snapshot of one batch.
    pub fn batch(&self, id: BatchId) -> Option<BatchInfo> {
        self.inner.lock().unwrap().batches.get(&id).cloned()
    }

    /// Snapshots of all batches.
    pub fn list(&self) -> Vec<BatchInfo> {
        self.inner.lock().unwrap().batches.values().cloned().collect()
    }

    /// Current state of one batch.
    pub fn state(&self, id: BatchId) -> Option<BatchState> {
        self.inner.lock().unwrap().batches.get(&id).map(|info| info.state)
    }

    // ---- live-set book-keeping --------------------------------------------

    /// Adds an entity to a loaded batch's live set. Book-keeping only.
    pub fn attach_live(&self, id: BatchId, entity_ref: EntityRef) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.batches.get_mut(&id) {
            Some(info) if info.state == BatchState::Loaded => {
                info.live.push(entity_ref);
                true
            }
            _ => false,
        }
    }

    /// Removes an entity from a batch's live set. The closure is left as an
    /// over-approximation.
    pub fn detach_live(&self, id: BatchId, entity_guid: Guid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.batches.get_mut(&id) {
            Some(info) => {
                let before = info.live.len();
                info.live.retain(|entity| entity.guid != entity_guid);
                info.live.len() != before
            }
            None => false,
        }
    }

    /// Marks the batch owning an entity as closure-dirty; returns it.
    pub fn mark_closure_dirty_for_entity(&self, entity_guid: Guid) -> Option<BatchId> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner
            .batches
            .values()
            .find(|info| info.live.iter().any(|entity| entity.guid == entity_guid))
            .map(|info| info.id)?;
        inner.dirty.insert(id);
        Some(id)
    }

    /// Batches whose closure needs a rebuild.
    pub fn dirty_batches(&self) -> Vec<BatchId> {
        self.inner.lock().unwrap().dirty.iter().copied().collect()
    }

    // ---- load / unload -----------------------------------------------------

    /// Loads a batch: reads its file, leases the closure, spawns the live
    /// entities on the main thread and binds their references.
    pub fn queue_load(self: &Arc<Self>, id: BatchId) -> Task<TaskResult> {
        let this = self.clone();
        self.strand.submit(move || {
            {
                let mut inner = this.inner.lock().unwrap();
                let Some(info) = inner.batches.get_mut(&id) else {
                    let mut result = TaskResult::ok();
                    result.fail(id, "unknown batch");
                    this.emit(BatchTaskCompletedEvent::new(BatchTaskType::Load, id, false));
                    return result;
                };
                info.state = BatchState::Queued;
            }

            let result = this.do_load(id);

            let mut event = BatchTaskCompletedEvent::new(BatchTaskType::Load, id, result.success);
            {
                let mut inner = this.inner.lock().unwrap();
                if let Some(info) = inner.batches.get_mut(&id) {
                    info.last_result = Some(result.clone());
                    info.state = if result.success {
                        BatchState::Loaded
                    } else {
                        BatchState::Error
                    };
                    event.fill_from_info(info);
                }
            }
            this.emit(event);
            result
        })
    }

    fn do_load(self: &Arc<Self>, id: BatchId) -> TaskResult {
        let mut result = TaskResult::ok();

        let dir = match self.index_dir() {
            Ok(dir) => dir,
            Err(err) => {
                result.fail(id, err.to_string());
                return result;
            }
        };
        let filename = {
            let mut inner = self.inner.lock().unwrap();
            let Some(info) = inner.batches.get_mut(&id) else {
                result.fail(id, "unknown batch");
                return result;
            };
            info.state = BatchState::Loading;
            info.filename.clone()
        };

        let path = dir.join(filename);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_missing) => {
                // No file yet: a brand new, empty batch. Not an error.
                let mut inner = self.inner.lock().unwrap();
                if let Some(info) = inner.batches.get_mut(&id) {
                    info.asset_closure.clear();
                    info.live.clear();
                }
                return result;
            }
        };

        let file: BatchFile = match serde_json::from_str(&text) {
            Ok(file) => file,
            Err(err) => {
                result.fail(id, format!("malformed batch file: {err}"));
                return result;
            }
        };
        let closure = file.closure();
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(info) = inner.batches.get_mut(&id) {
                info.asset_closure = closure.clone();
            }
        }

        // 1) Lease and load the closure.
        if !closure.is_empty() {
            let loaded = self.resources.load_and_bind(&closure, id);
            if !loaded.success {
                return loaded;
            }
            result.merge(loaded);
        }

        // 2) Spawn entities on the main thread.
        let entities = self.entities.clone();
        let descriptors = file.entities;
        let spawned: Result<Vec<EntityRef>, String> = self.main_queue.push_and_wait(move || {
            let mut entities = entities.lock().unwrap();
            descriptors
                .iter()
                .map(|descriptor| {
                    spawn_entity_from_desc(&mut *entities, descriptor)
                        .map_err(|err| err.to_string())
                })
                .collect()
        });
        let live = match spawned {
            Ok(live) => live,
            Err(message) => {
                result.fail(id, message);
                return result;
            }
        };
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(info) = inner.batches.get_mut(&id) {
                info.live = live.clone();
            }
        }

        // 3) Bind asset and entity refs inside the spawned components.
        self.bind_refs_on_main(&live);

        result
    }

    /// Unloads a batch: queues its entities for destruction, then drops the
    /// closure leases. On failure the closure is kept for a later retry.
    pub fn queue_unload(self: &Arc<Self>, id: BatchId) -> Task<TaskResult> {
        let this = self.clone();
        self.strand.submit(move || {
            let mut event = BatchTaskCompletedEvent::new(BatchTaskType::Unload, id, false);
            {
                let mut inner = this.inner.lock().unwrap();
                let Some(info) = inner.batches.get_mut(&id) else {
                    let mut result = TaskResult::ok();
                    result.fail(id, "unknown batch");
                    this.emit(event);
                    return result;
                };
                if info.state == BatchState::Unloaded {
                    // Nothing to do.
                    event.success = true;
                    event.fill_from_info(info);
                    drop(inner);
                    this.emit(event);
                    return TaskResult::ok();
                }
                info.state = BatchState::Queued;
            }

            let result = this.do_unload(id);

            {
                let mut inner = this.inner.lock().unwrap();
                if let Some(info) = inner.batches.get_mut(&id) {
                    info.last_result = Some(result.clone());
                    info.state = if result.success {
                        BatchState::Unloaded
                    } else {
                        BatchState::Error
                    };
                    event.fill_from_info(info);
                }
            }
            event.success = result.success;
            this.emit(event);
            result
        })
    }

    fn do_unload(self: &Arc<Self>, id: BatchId) -> TaskResult {
        let (live, closure) = {
            let mut inner = self.inner.lock().unwrap();
            let Some(info) = inner.batches.get_mut(&id) else {
                let mut result = TaskResult::ok();
                result.fail(id, "unknown batch");
                return result;
            };
            info.state = BatchState::Unloading;
            (info.live.clone(), info.asset_closure.clone())
        };

        // 1) Main thread: queue the live entities for destruction. Asset
        //    unload proceeds while destruction is still pending.
        let entities = self.entities.clone();
        self.main_queue.push_and_wait(move || {
            let mut entities = entities.lock().unwrap();
            for entity in &live {
                if entity.is_bound() {
                    entities.queue_destroy(entity.entity);
                }
            }
        });
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(info) = inner.batches.get_mut(&id) {
                info.live.clear();
            }
        }

        // 2) Drop the closure leases. On failure keep the closure so shared
        //    assets stay alive and the unload can be retried.
        if !closure.is_empty() {
            let unloaded = self.resources.unbind_and_unload(&closure, id);
            if !unloaded.success {
                return unloaded;
            }
        }

        TaskResult::ok()
    }

    // ---- save --------------------------------------------------------------

    /// Saves a loaded batch to its file and refreshes the index. Refuses in
    /// any state but [`BatchState::Loaded`].
    pub fn queue_save_batch(self: &Arc<Self>, id: BatchId) -> Task<TaskResult> {
        let this = self.clone();
        self.strand.submit(move || {
            let mut result = TaskResult::ok();
            if let Err(err) = this.save_batch(id) {
                result.fail(id, err.to_string());
            }
            let mut event = BatchTaskCompletedEvent::new(BatchTaskType::Save, id, result.success);
            {
                let inner = this.inner.lock().unwrap();
                if let Some(info) = inner.batches.get(&id) {
                    event.fill_from_info(info);
                }
            }
            this.emit(event);
            result
        })
    }

    fn save_batch(self: &Arc<Self>, id: BatchId) -> Result<(), BatchError> {
        let snapshot = {
            let inner = self.inner.lock().unwrap();
            let info = inner.batches.get(&id).ok_or(BatchError::UnknownBatch(id))?;
            if info.state != BatchState::Loaded {
                return Err(BatchError::InvalidState(id));
            }
            info.clone()
        };

        // Main thread: serialize the live entities under the file purpose.
        let entities = self.entities.clone();
        let live = snapshot.live.clone();
        let serialized: Result<Vec<Value>, String> = self.main_queue.push_and_wait(move || {
            let entities = entities.lock().unwrap();
            live.iter()
                .filter(|entity| entity.is_bound())
                .map(|entity| {
                    serialize_entity(&*entities, *entity, Purpose::File)
                        .map_err(|err| err.to_string())
                })
                .collect()
        });
        let serialized = serialized.map_err(BatchError::MalformedBatchFile)?;

        let file = BatchFile::new(&snapshot, serialized);
        let path = self.index_dir()?.join(&snapshot.filename);
        let text = serde_json::to_string_pretty(&file)?;
        std::fs::write(&path, text)
            .map_err(|err| BatchError::Io(path.display().to_string(), err.to_string()))?;

        // Keep the saved index in sync with the batch files.
        self.save_index()
    }

    // ---- entity operations -------------------------------------------------

    /// Creates a fresh entity inside a loaded batch.
    pub fn queue_create_entity(
        self: &Arc<Self>,
        id: BatchId,
        name: String,
        parent: EntityRef,
    ) -> Task<EntityRef> {
        let this = self.clone();
        self.strand.submit(move || {
            if !this.batch_is_loaded(id) {
                this.emit_entity_event(BatchTaskType::CreateEntity, id, false);
                return EntityRef::default();
            }

            let entities = this.entities.clone();
            let created = this.main_queue.push_and_wait(move || {
                let mut entities = entities.lock().unwrap();
                let parent = parent.is_bound().then_some(parent.entity);
                let (guid, entity) = entities.create_entity(&name, parent, None);
                EntityRef::bound(guid, entity)
            });

            this.attach_live(id, created);
            // No components yet, so no closure delta now.
            this.emit_entity_event(BatchTaskType::CreateEntity, id, created.is_bound());
            created
        })
    }

    /// Removes an entity from the batch and queues it for destruction. The
    /// closure stays as an over-approximation until the next rebuild.
    pub fn queue_destroy_entity(self: &Arc<Self>, id: BatchId, entity: EntityRef) -> Task<bool> {
        let this = self.clone();
        self.strand.submit(move || {
            if !this.batch_is_loaded(id) {
                this.emit_entity_event(BatchTaskType::DestroyEntity, id, false);
                return false;
            }
            this.detach_live(id, entity.guid);

            let entities = this.entities.clone();
            this.main_queue.push_and_wait(move || {
                if entity.is_bound() {
                    entities.lock().unwrap().queue_destroy(entity.entity);
                }
            });

            this.emit_entity_event(BatchTaskType::DestroyEntity, id, true);
            true
        })
    }

    /// Attaches an existing entity to a loaded batch, extending the closure
    /// with the entity's direct asset references.
    pub fn queue_attach_entity(self: &Arc<Self>, id: BatchId, entity: EntityRef) -> Task<bool> {
        let this = self.clone();
        self.strand.submit(move || {
            if !this.batch_is_loaded(id) {
                this.emit_entity_event(BatchTaskType::AttachEntity, id, false);
                return false;
            }
            this.attach_live(id, entity);

            if entity.is_bound() {
                this.extend_closure_for_entity(id, entity);
                this.bind_refs_on_main(&[entity]);
            }

            this.emit_entity_event(BatchTaskType::AttachEntity, id, true);
            true
        })
    }

    /// Detaches an entity from the batch without destroying it.
    pub fn queue_detach_entity(self: &Arc<Self>, id: BatchId, entity: EntityRef) -> Task<bool> {
        let this = self.clone();
        self.strand.submit(move || {
            if !this.batch_is_loaded(id) {
                this.emit_entity_event(BatchTaskType::DetachEntity, id, false);
                return false;
            }
            let removed = this.detach_live(id, entity.guid);
            this.emit_entity_event(BatchTaskType::DetachEntity, id, removed);
            removed
        })
    }

    /// Spawns an entity from a serialized descriptor into a loaded batch.
    pub fn queue_spawn_entity(self: &Arc<Self>, id: BatchId, descriptor: Value) -> Task<EntityRef> {
        let this = self.clone();
        self.strand.submit(move || {
            if !this.batch_is_loaded(id) {
                this.emit_entity_event(BatchTaskType::SpawnEntity, id, false);
                return EntityRef::default();
            }

            let entities = this.entities.clone();
            let spawned: Result<EntityRef, String> = this.main_queue.push_and_wait(move || {
                let mut entities = entities.lock().unwrap();
                spawn_entity_from_desc(&mut *entities, &descriptor).map_err(|err| err.to_string())
            });
            let created = match spawned {
                Ok(created) => created,
                Err(message) => {
                    tracing::warn!("spawn into batch {id} failed: {message}");
                    this.emit_entity_event(BatchTaskType::SpawnEntity, id, false);
                    return EntityRef::default();
                }
            };

            this.attach_live(id, created);
            this.extend_closure_for_entity(id, created);
            this.bind_refs_on_main(&[created]);

            this.emit_entity_event(BatchTaskType::SpawnEntity, id, created.is_bound());
            created
        })
    }

    // ---- closure rebuild ---------------------------------------------------

    /// Recomputes the batch's transitive asset closure from its live set,
    /// loading newly discovered assets and unloading removed ones.
    pub fn queue_rebuild_closure(self: &Arc<Self>, id: BatchId) -> Task<TaskResult> {
        let this = self.clone();
        self.strand.submit(move || {
            let mut result = TaskResult::ok();
            let mut event =
                BatchTaskCompletedEvent::new(BatchTaskType::RebuildClosure, id, true);

            // 1) Snapshot the data this job needs.
            let (live_snapshot, old_closure) = {
                let inner = this.inner.lock().unwrap();
                match inner.batches.get(&id) {
                    Some(info) if info.state == BatchState::Loaded => {
                        event.batch_name = info.name.clone();
                        event.batch_count = 1;
                        (info.live.clone(), info.asset_closure.clone())
                    }
                    _ => {
                        result.fail(id, "batch not loaded");
                        event.success = false;
                        this.emit(event);
                        return result;
                    }
                }
            };
            event.live_entities = live_snapshot.len();
            event.asset_closure_size = old_closure.len();

            // 2) Main thread: direct roots from the live entities.
            let entities = this.entities.clone();
            let live_for_roots = live_snapshot.clone();
            let mut roots: Vec<Guid> = this.main_queue.push_and_wait(move || {
                let entities = entities.lock().unwrap();
                let mut guids = Vec::new();
                for entity in &live_for_roots {
                    if entity.is_bound() {
                        guids.extend(collect_asset_guids_for_entity(&*entities, entity.entity));
                    }
                }
                guids
            });
            roots.sort();
            roots.dedup();

            // 3) Transitive closure, loading each frontier as it goes.
            let built =
                build_asset_closure_recursive(&roots, &old_closure, id, &this.resources);
            result.merge(built.result.clone());
            if !result.success {
                // Roll back the assets that were bound during the build.
                let mut rollback = built.loaded_now;
                rollback.retain(|guid| guid.is_valid());
                rollback.sort();
                rollback.dedup();
                if !rollback.is_empty() {
                    this.resources.unbind_and_unload(&rollback, id);
                }
                event.success = false;
                this.emit(event);
                return result;
            }

            // 4) Cleanup and diff against the old closure.
            let mut old_closure = old_closure;
            old_closure.retain(|guid| guid.is_valid());
            old_closure.sort();
            old_closure.dedup();
            let mut new_closure = built.closure;
            new_closure.retain(|guid| guid.is_valid());
            new_closure.sort();
            new_closure.dedup();

            let mut to_add = Vec::new();
            let mut to_remove = Vec::new();
            diff_sets(&old_closure, &new_closure, &mut to_add, &mut to_remove);

            event.has_closure_delta = true;
            event.closure_roots = roots.len();
            event.closure_old = old_closure.len();
            event.closure_new = new_closure.len();
            event.closure_added = to_add.len();
            event.closure_removed = to_remove.len();
            event.asset_closure_size = new_closure.len();

            // 5) Everything in to_add is already loaded by the build; only
            //    removals change leases here.
            if !to_remove.is_empty() {
                let unloaded = this.resources.unbind_and_unload(&to_remove, id);
                result.merge(unloaded);
            }
            if !result.success {
                // Keep the old closure so a later retry can unload it.
                event.success = false;
                this.emit(event);
                return result;
            }

            // 6) Rebind assets now that the closure has its final shape.
            let rebound = this.resources.bind_assets(&new_closure);
            event.assets_rebound = rebound.success;
            result.merge(rebound);

            // 7) Commit.
            {
                let mut guard = this.inner.lock().unwrap();
                let inner = &mut *guard;
                match inner.batches.get_mut(&id) {
                    Some(info) if info.state == BatchState::Loaded => {
                        info.asset_closure = new_closure;
                        inner.dirty.remove(&id);
                    }
                    _ => {
                        result.fail(id, "batch left the loaded state during rebuild");
                    }
                }
            }

            // 8) Main thread: rebind refs inside the live entities.
            this.bind_refs_on_main(&live_snapshot);

            event.success = result.success;
            this.emit(event);
            result
        })
    }

    // ---- whole-registry fan-outs ------------------------------------------

    /// Loads every known batch; success is the conjunction.
    pub fn queue_load_all_async(self: &Arc<Self>) -> Task<TaskResult> {
        let ids: Vec<BatchId> = {
            let inner = self.inner.lock().unwrap();
            inner.batches.keys().copied().collect()
        };
        let this = self.clone();
        self.pool.submit(move || {
            let tasks: Vec<_> = ids.iter().map(|id| this.queue_load(*id)).collect();
            let mut merged = TaskResult::ok();
            for task in tasks {
                merged.merge(task.wait());
            }
            this.emit(BatchTaskCompletedEvent::whole_registry(
                BatchTaskType::LoadAll,
                merged.success,
                ids.len(),
            ));
            merged
        })
    }

    /// Unloads every batch that is not already unloaded.
    pub fn queue_unload_all_async(self: &Arc<Self>) -> Task<TaskResult> {
        let ids: Vec<BatchId> = {
            let inner = self.inner.lock().unwrap();
            inner
                .batches
                .values()
                .filter(|info| info.state != BatchState::Unloaded)
                .map(|info| info.id)
                .collect()
        };
        let this = self.clone();
        self.pool.submit(move || {
            let tasks: Vec<_> = ids.iter().map(|id| this.queue_unload(*id)).collect();
            let mut merged = TaskResult::ok();
            for task in tasks {
                merged.merge(task.wait());
            }
            this.emit(BatchTaskCompletedEvent::whole_registry(
                BatchTaskType::UnloadAll,
                merged.success,
                ids.len(),
            ));
            merged
        })
    }

    /// Saves every loaded batch.
    pub fn queue_save_all_async(self: &Arc<Self>) -> Task<TaskResult> {
        let ids: Vec<BatchId> = {
            let inner = self.inner.lock().unwrap();
            inner
                .batches
                .values()
                .filter(|info| info.state == BatchState::Loaded)
                .map(|info| info.id)
                .collect()
        };
        let this = self.clone();
        self.pool.submit(move || {
            let mut merged = TaskResult::ok();
            for id in &ids {
                merged.merge(this.queue_save_batch(*id).wait());
            }
            this.emit(BatchTaskCompletedEvent::whole_registry(
                BatchTaskType::SaveAll,
                merged.success,
                ids.len(),
            ));
            merged
        })
    }

    // ---- helpers -----------------------------------------------------------

    fn batch_is_loaded(&self, id: BatchId) -> bool {
        self.state(id) == Some(BatchState::Loaded)
    }

    fn emit_entity_event(&self, kind: BatchTaskType, id: BatchId, success: bool) {
        let mut event = BatchTaskCompletedEvent::new(kind, id, success);
        {
            let inner = self.inner.lock().unwrap();
            if let Some(info) = inner.batches.get(&id) {
                event.fill_from_info(info);
            }
        }
        self.emit(event);
    }

    /// Collects the entity's direct asset GUIDs on the main thread, unions
    /// them into the closure and leases the newly added ones.
    fn extend_closure_for_entity(self: &Arc<Self>, id: BatchId, entity: EntityRef) {
        let entities = self.entities.clone();
        let guids: Vec<Guid> = self.main_queue.push_and_wait(move || {
            let entities = entities.lock().unwrap();
            collect_asset_guids_for_entity(&*entities, entity.entity)
        });
        if guids.is_empty() {
            return;
        }

        let mut to_add = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(info) = inner.batches.get_mut(&id) {
                append_new_elements(&mut info.asset_closure, &guids, &mut to_add);
            }
        }
        if !to_add.is_empty() {
            let loaded = self.resources.load_and_bind(&to_add, id);
            if !loaded.success {
                tracing::warn!(
                    "leasing {} newly referenced assets for batch {id} failed",
                    to_add.len()
                );
            }
        }
    }

    /// Main thread: rebind asset and entity refs inside the given entities.
    fn bind_refs_on_main(self: &Arc<Self>, live: &[EntityRef]) {
        let entities = self.entities.clone();
        let resources = self.resources.clone();
        let live = live.to_vec();
        self.main_queue.push_and_wait(move || {
            let mut entities = entities.lock().unwrap();
            for entity in &live {
                if entity.is_bound() {
                    bind_refs_for_entity(&mut *entities, entity.entity, &resources);
                }
            }
        });
    }

    /// Entity type ids present on any live entity of the batch; diagnostic
    /// helper for editor panels.
    pub fn live_component_types(&self, id: BatchId) -> Vec<TypeId> {
        let live = match self.batch(id) {
            Some(info) => info.live,
            None => return Vec::new(),
        };
        let entities = self.entities.lock().unwrap();
        let mut types: Vec<TypeId> = live
            .iter()
            .filter(|entity| entity.is_bound())
            .flat_map(|entity| entities.component_types(entity.entity))
            .collect();
        types.sort();
        types.dedup();
        types
    }
}
