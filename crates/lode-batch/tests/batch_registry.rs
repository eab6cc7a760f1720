//! End-to-end batch lifecycle: index handling, load/save/unload round trips,
//! closure maintenance and events.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lode_batch::{BatchRegistry, BatchState, BatchTaskCompletedEvent, BatchTaskType};
use lode_core::Guid;
use lode_reflect::type_id_of;
use lode_runtime::test_asset::{register_test_types, write_test_asset, TestComponent};
use lode_runtime::test_world::TestWorld;
use lode_runtime::{EntityManager, ResourceManager};
use lode_storage::{AssetRef, EntityRef, Storage};
use lode_tasks::{EventQueue, MainThreadQueue, Task, TaskPool};

struct Harness {
    _dir: tempfile::TempDir,
    index_path: PathBuf,
    resources: Arc<ResourceManager>,
    world: Arc<Mutex<TestWorld>>,
    main_queue: Arc<MainThreadQueue>,
    events: Arc<EventQueue>,
    event_log: Arc<Mutex<Vec<(BatchTaskType, bool)>>>,
    registry: Arc<BatchRegistry>,
}

impl Harness {
    fn new() -> Self {
        register_test_types();
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("index.json");

        let storage = Arc::new(Storage::new());
        let pool = Arc::new(TaskPool::with_threads(4));
        let resources = ResourceManager::new(storage, pool.clone());

        let world = Arc::new(Mutex::new(TestWorld::new()));
        let main_queue = Arc::new(MainThreadQueue::new());
        let events = Arc::new(EventQueue::new());

        let event_log = Arc::new(Mutex::new(Vec::new()));
        {
            let event_log = event_log.clone();
            events.register_callback(move |event: &BatchTaskCompletedEvent| {
                event_log.lock().unwrap().push((event.kind, event.success));
            });
        }

        let entities: Arc<Mutex<dyn EntityManager>> = world.clone();
        let registry = BatchRegistry::new(
            resources.clone(),
            entities,
            main_queue.clone(),
            events.clone(),
            pool,
        );

        Self {
            _dir: dir,
            index_path,
            resources,
            world,
            main_queue,
            events,
            event_log,
            registry,
        }
    }

    fn assets_dir(&self) -> PathBuf {
        self._dir.path().to_path_buf()
    }

    /// Pumps the main-thread queue until the task resolves, like the engine
    /// frame loop would.
    fn pump<T: Clone>(&self, task: &Task<T>) -> T {
        loop {
            self.main_queue.execute_all();
            if let Some(result) = task.try_result() {
                return result;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn scan(&self) {
        let task = self.resources.scan_assets_async(self.assets_dir());
        assert!(self.pump(&task).success);
    }

    fn event_kinds(&self) -> Vec<(BatchTaskType, bool)> {
        self.events.dispatch_all_events();
        std::mem::take(&mut *self.event_log.lock().unwrap())
    }
}

#[test]
fn loading_a_missing_batch_file_yields_an_empty_loaded_batch() {
    let harness = Harness::new();
    harness.registry.load_or_create_index(&harness.index_path).unwrap();
    assert!(harness.index_path.exists(), "absent index is created empty");

    let batch = harness.registry.create_batch("fresh").unwrap();
    let result = harness.pump(&harness.registry.queue_load(batch));

    assert!(result.success);
    let info = harness.registry.batch(batch).unwrap();
    assert_eq!(info.state, BatchState::Loaded);
    assert!(info.asset_closure.is_empty());
    assert!(info.live.is_empty());

    let events = harness.event_kinds();
    assert!(events.contains(&(BatchTaskType::Load, true)));
}

#[test]
fn save_unload_load_round_trip_preserves_the_batch() {
    let harness = Harness::new();

    // Two assets: the mesh references a child asset, so the closure must
    // pick up both.
    let mesh = Guid::generate();
    let child = Guid::generate();
    write_test_asset(&harness.assets_dir(), child, "child", 3, None);
    write_test_asset(&harness.assets_dir(), mesh, "mesh", 7, Some(child));
    harness.scan();

    harness.registry.load_or_create_index(&harness.index_path).unwrap();
    let batch = harness.registry.create_batch("level01").unwrap();
    assert!(harness.pump(&harness.registry.queue_load(batch)).success);

    // Build two entities on the main thread: a hero whose component
    // references the mesh asset and targets the second entity.
    let hero = harness.pump(&harness.registry.queue_create_entity(
        batch,
        "hero".into(),
        EntityRef::default(),
    ));
    let sidekick = harness.pump(&harness.registry.queue_create_entity(
        batch,
        "sidekick".into(),
        EntityRef::default(),
    ));
    assert!(hero.is_bound() && sidekick.is_bound());

    {
        let mut world = harness.world.lock().unwrap();
        world.insert_component(
            hero.entity,
            Box::new(TestComponent {
                label: "hero".into(),
                mesh: AssetRef::new(mesh),
                target: EntityRef::new(sidekick.guid),
                scratch: 42,
                edits: 0,
            }),
        );
    }

    // The closure rebuild discovers mesh and, transitively, child.
    assert!(harness.pump(&harness.registry.queue_rebuild_closure(batch)).success);
    let mut closure = harness.registry.batch(batch).unwrap().asset_closure;
    closure.sort();
    let mut expected = vec![mesh, child];
    expected.sort();
    assert_eq!(closure, expected);
    assert_eq!(harness.resources.total_leases(mesh), 1);
    assert_eq!(harness.resources.total_leases(child), 1);

    // Rebuilding again without live changes is idempotent.
    assert!(harness.pump(&harness.registry.queue_rebuild_closure(batch)).success);
    let mut closure_again = harness.registry.batch(batch).unwrap().asset_closure;
    closure_again.sort();
    assert_eq!(closure_again, expected);
    assert_eq!(harness.resources.total_leases(mesh), 1);

    // The entity-ref inside the component resolved to the sidekick.
    {
        let world = harness.world.lock().unwrap();
        let mut bound_target = None;
        world.with_component(
            hero.entity,
            type_id_of::<TestComponent>().unwrap(),
            &mut |value| {
                bound_target = value.downcast_ref::<TestComponent>().map(|c| c.target);
            },
        );
        let bound_target = bound_target.unwrap();
        assert_eq!(bound_target.guid, sidekick.guid);
        assert_eq!(bound_target.entity, sidekick.entity);
    }

    // Save, unload, destroy pending entities, reload.
    assert!(harness.pump(&harness.registry.queue_save_batch(batch)).success);
    assert!(harness.pump(&harness.registry.queue_unload(batch)).success);
    assert_eq!(
        harness.registry.batch(batch).unwrap().state,
        BatchState::Unloaded
    );
    assert_eq!(harness.resources.total_leases(mesh), 0);
    assert!(harness.resources.handle_for_guid(mesh).is_none());
    harness.world.lock().unwrap().destroy_pending();
    assert_eq!(harness.world.lock().unwrap().entity_count(), 0);

    assert!(harness.pump(&harness.registry.queue_load(batch)).success);

    // Functionally equivalent: same closure set, same live entity guids,
    // same component values modulo the file-excluded fields.
    let info = harness.registry.batch(batch).unwrap();
    assert_eq!(info.state, BatchState::Loaded);
    let mut closure = info.asset_closure.clone();
    closure.sort();
    assert_eq!(closure, expected);

    let mut live_guids: Vec<Guid> = info.live.iter().map(|entity| entity.guid).collect();
    live_guids.sort();
    let mut expected_guids = vec![hero.guid, sidekick.guid];
    expected_guids.sort();
    assert_eq!(live_guids, expected_guids);

    {
        let world = harness.world.lock().unwrap();
        let hero_entity = world.entity_from_guid(hero.guid).unwrap();
        let sidekick_entity = world.entity_from_guid(sidekick.guid).unwrap();
        let mut component = None;
        world.with_component(
            hero_entity,
            type_id_of::<TestComponent>().unwrap(),
            &mut |value| {
                component = value.downcast_ref::<TestComponent>().cloned();
            },
        );
        let component = component.unwrap();
        assert_eq!(component.label, "hero");
        assert_eq!(component.scratch, 0, "file-excluded field reverts to default");
        assert_eq!(component.mesh.guid, mesh);
        assert!(component.mesh.is_bound(), "asset ref rebinds on load");
        assert_eq!(component.target.entity, sidekick_entity);
    }

    let events = harness.event_kinds();
    for kind in [
        BatchTaskType::Load,
        BatchTaskType::RebuildClosure,
        BatchTaskType::Save,
        BatchTaskType::Unload,
    ] {
        assert!(
            events.contains(&(kind, true)),
            "missing successful {kind:?} event in {events:?}"
        );
    }
}

#[test]
fn attach_and_detach_maintain_the_closure() {
    let harness = Harness::new();
    let mesh = Guid::generate();
    write_test_asset(&harness.assets_dir(), mesh, "prop", 1, None);
    harness.scan();

    harness.registry.load_or_create_index(&harness.index_path).unwrap();
    let batch = harness.registry.create_batch("props").unwrap();
    assert!(harness.pump(&harness.registry.queue_load(batch)).success);

    // An entity created outside any batch, carrying an asset reference.
    let (guid, entity) = harness
        .world
        .lock()
        .unwrap()
        .create_entity("prop", None, None);
    harness.world.lock().unwrap().insert_component(
        entity,
        Box::new(TestComponent {
            label: "prop".into(),
            mesh: AssetRef::new(mesh),
            ..Default::default()
        }),
    );
    let entity_ref = EntityRef::bound(guid, entity);

    assert!(harness.pump(&harness.registry.queue_attach_entity(batch, entity_ref)));
    let info = harness.registry.batch(batch).unwrap();
    assert_eq!(info.live.len(), 1);
    assert_eq!(info.asset_closure, vec![mesh]);
    assert_eq!(harness.resources.total_leases(mesh), 1);

    // Detach keeps the closure as an over-approximation...
    assert!(harness.pump(&harness.registry.queue_detach_entity(batch, entity_ref)));
    let info = harness.registry.batch(batch).unwrap();
    assert!(info.live.is_empty());
    assert_eq!(info.asset_closure, vec![mesh]);

    // ...until a rebuild shrinks it and releases the lease.
    assert!(harness.pump(&harness.registry.queue_rebuild_closure(batch)).success);
    assert!(harness.registry.batch(batch).unwrap().asset_closure.is_empty());
    assert_eq!(harness.resources.total_leases(mesh), 0);
    assert!(harness.resources.handle_for_guid(mesh).is_none());
}

#[test]
fn whole_registry_fan_outs_aggregate_success() {
    let harness = Harness::new();
    harness.registry.load_or_create_index(&harness.index_path).unwrap();
    let first = harness.registry.create_batch("first").unwrap();
    let second = harness.registry.create_batch("second").unwrap();

    let result = harness.pump(&harness.registry.queue_load_all_async());
    assert!(result.success);
    assert_eq!(harness.registry.state(first), Some(BatchState::Loaded));
    assert_eq!(harness.registry.state(second), Some(BatchState::Loaded));

    assert!(harness.pump(&harness.registry.queue_save_all_async()).success);
    assert!(harness.pump(&harness.registry.queue_unload_all_async()).success);
    assert_eq!(harness.registry.state(first), Some(BatchState::Unloaded));
    assert_eq!(harness.registry.state(second), Some(BatchState::Unloaded));

    let events = harness.event_kinds();
    assert!(events.contains(&(BatchTaskType::LoadAll, true)));
    assert!(events.contains(&(BatchTaskType::SaveAll, true)));
    assert!(events.contains(&(BatchTaskType::UnloadAll, true)));
}

#[test]
fn dirty_marking_finds_the_owning_batch() {
    let harness = Harness::new();
    harness.registry.load_or_create_index(&harness.index_path).unwrap();
    let batch = harness.registry.create_batch("dirty").unwrap();
    assert!(harness.pump(&harness.registry.queue_load(batch)).success);

    let entity = harness.pump(&harness.registry.queue_create_entity(
        batch,
        "thing".into(),
        EntityRef::default(),
    ));
    assert_eq!(
        harness.registry.mark_closure_dirty_for_entity(entity.guid),
        Some(batch)
    );
    assert_eq!(harness.registry.dirty_batches(), vec![batch]);
    assert_eq!(
        harness.registry.mark_closure_dirty_for_entity(Guid::generate()),
        None
    );

    // A successful rebuild clears the dirty flag.
    assert!(harness.pump(&harness.registry.queue_rebuild_closure(batch)).success);
    assert!(harness.registry.dirty_batches().is_empty());
}
