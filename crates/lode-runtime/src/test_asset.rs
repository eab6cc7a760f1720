//! Asset and component fixture types shared by tests across the workspace.

use std::path::{Path, PathBuf};
use std::sync::Once;

use lode_core::Guid;
use lode_reflect::{
    field_accessors, of, of_mut, serialize_value, MetaFieldPath, MetaFlags, Purpose, RefResolver,
    Reflect, TypeBuilder, TypeFn, FN_BIND_ASSET_REFS, FN_BIND_ENTITY_REFS,
    FN_COLLECT_ASSET_GUIDS, FN_POST_ASSIGN,
};
use lode_storage::{
    bind_asset_ref, bind_entity_ref, register_asset_ref, register_entity_ref, AssetRef, EntityRef,
};

use crate::{install_asset_functions, AssetFile};

/// Asset type used by tests; references another asset of its own type.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct TestAsset {
    /// Payload.
    pub value: i32,
    /// Optional reference to another asset.
    pub child: AssetRef<TestAsset>,
}

/// Component type used by tests.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct TestComponent {
    /// Display label.
    pub label: String,
    /// Asset reference contributing to batch closures.
    pub mesh: AssetRef<TestAsset>,
    /// Soft entity reference.
    pub target: EntityRef,
    /// Editor-only scratch value, excluded from files.
    pub scratch: i32,
    /// Post-assign counter, never serialized.
    pub edits: u32,
}

fn collect_test_asset_guids(value: &dyn Reflect, out: &mut Vec<Guid>) {
    let asset = of::<TestAsset>(value);
    if asset.child.guid.is_valid() {
        out.push(asset.child.guid);
    }
}

fn bind_test_asset_refs(value: &mut dyn Reflect, resolver: &dyn RefResolver) {
    bind_asset_ref(&mut of_mut::<TestAsset>(value).child, resolver);
}

fn collect_test_component_guids(value: &dyn Reflect, out: &mut Vec<Guid>) {
    let component = of::<TestComponent>(value);
    if component.mesh.guid.is_valid() {
        out.push(component.mesh.guid);
    }
}

fn bind_test_component_asset_refs(value: &mut dyn Reflect, resolver: &dyn RefResolver) {
    bind_asset_ref(&mut of_mut::<TestComponent>(value).mesh, resolver);
}

fn bind_test_component_entity_refs(value: &mut dyn Reflect, resolver: &dyn RefResolver) {
    bind_entity_ref(&mut of_mut::<TestComponent>(value).target, resolver);
}

fn test_component_post_assign(value: &mut dyn Reflect, _path: &MetaFieldPath, _is_undo: bool) {
    of_mut::<TestComponent>(value).edits += 1;
}

/// Registers [`TestAsset`], [`TestComponent`] and their reference
/// descriptors. Idempotent.
pub fn register_test_types() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        install_asset_functions(
            TypeBuilder::<TestAsset>::new("TestAsset")
                .tooltip("Asset type used by tests.")
                .data("value", field_accessors!(TestAsset, value))
                .data("child", field_accessors!(TestAsset, child)),
        )
        .function(
            FN_COLLECT_ASSET_GUIDS,
            TypeFn::CollectAssetGuids(collect_test_asset_guids),
        )
        .function(
            FN_BIND_ASSET_REFS,
            TypeFn::BindAssetRefs(bind_test_asset_refs),
        )
        .register()
        .unwrap();
        register_asset_ref::<TestAsset>().unwrap();
        register_entity_ref().unwrap();

        TypeBuilder::<TestComponent>::new("TestComponent")
            .tooltip("Component type used by tests.")
            .data("label", field_accessors!(TestComponent, label))
            .data("mesh", field_accessors!(TestComponent, mesh))
            .data("target", field_accessors!(TestComponent, target))
            .data("scratch", field_accessors!(TestComponent, scratch))
            .field_flags(MetaFlags::NO_SERIALIZE_FILE)
            .data("edits", field_accessors!(TestComponent, edits))
            .field_flags(MetaFlags::NO_SERIALIZE)
            .function(
                FN_COLLECT_ASSET_GUIDS,
                TypeFn::CollectAssetGuids(collect_test_component_guids),
            )
            .function(
                FN_BIND_ASSET_REFS,
                TypeFn::BindAssetRefs(bind_test_component_asset_refs),
            )
            .function(
                FN_BIND_ENTITY_REFS,
                TypeFn::BindEntityRefs(bind_test_component_entity_refs),
            )
            .function(
                FN_POST_ASSIGN,
                TypeFn::PostAssign(test_component_post_assign),
            )
            .register()
            .unwrap();
    });
}

/// Writes a [`TestAsset`] file into `dir` and returns its path.
pub fn write_test_asset(
    dir: &Path,
    guid: Guid,
    name: &str,
    value: i32,
    child: Option<Guid>,
) -> PathBuf {
    register_test_types();
    let asset = TestAsset {
        value,
        child: child.map(AssetRef::new).unwrap_or_default(),
    };
    let file = AssetFile {
        guid,
        type_name: "TestAsset".into(),
        name: name.into(),
        data: serialize_value(&asset, Purpose::File).unwrap(),
    };
    let path = dir.join(format!("{guid}.json"));
    file.write(&path).unwrap();
    path
}
