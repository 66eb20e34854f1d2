mod common;

use std::sync::Arc;

use common::Harness;
use fragment_stack::{
    ComponentHooks, ContainerId, FactoryRegistry, HookCx, LifecycleState, ManagerError,
    NoopHooks, PopTarget, SavedRegistryState,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Collects the saved blob each component sees when it is created.
struct BlobReader {
    seen: Arc<Mutex<Vec<Value>>>,
}

impl ComponentHooks for BlobReader {
    fn on_create(&mut self, cx: &mut HookCx<'_>) {
        if let Some(blob) = cx.saved_state() {
            self.seen.lock().push(blob.clone());
        }
        cx.call_through();
    }
}

/// `list` mounted in container 1, then replaced by `detail` on the back stack.
fn populated() -> (Harness, SavedRegistryState) {
    let mut h = Harness::resumed();
    let list_hooks = h.hooks("list").with_state(json!({ "scroll": 3 }));
    let list = h.component_with("list", list_hooks);
    let detail_hooks = h.hooks("detail").with_state(json!({ "page": 2 }));
    let detail = h.component_with("detail", detail_hooks);

    let mut tx = h.manager.begin_transaction();
    tx.add_to(ContainerId(1), list, Some("list")).unwrap();
    tx.commit(&mut h.manager).unwrap();
    h.pump();

    h.manager.set_target(detail, Some(list), 7).unwrap();
    let mut tx = h.manager.begin_transaction();
    tx.replace(ContainerId(1), detail, Some("detail")).unwrap();
    tx.add_to_back_stack(Some("detail")).unwrap();
    tx.set_primary(Some(detail)).unwrap();
    tx.commit(&mut h.manager).unwrap();
    h.pump();

    let saved = h.manager.save_state().unwrap();
    (h, saved)
}

fn factory(seen: &Arc<Mutex<Vec<Value>>>) -> FactoryRegistry {
    let mut factory = FactoryRegistry::new();
    for kind in ["list", "detail"] {
        let seen = Arc::clone(seen);
        factory.register(kind, move || BlobReader {
            seen: Arc::clone(&seen),
        });
    }
    factory
}

#[test]
fn test_save_captures_membership_and_back_stack() {
    let (h, saved) = populated();
    assert!(h.manager.is_state_saved());

    let detail = h.manager.find_by_tag("detail").unwrap();
    assert_eq!(saved.added, vec![detail]);
    assert_eq!(saved.primary, Some(detail));
    assert_eq!(saved.components.len(), 2);
    assert_eq!(saved.back_stack.len(), 1);
    assert_eq!(saved.back_stack[0].name.as_deref(), Some("detail"));

    let list = saved
        .components
        .iter()
        .find(|c| c.kind == "list")
        .unwrap();
    assert!(list.removing);
    assert_eq!(list.saved, Some(json!({ "scroll": 3 })));
    let detail = saved
        .components
        .iter()
        .find(|c| c.kind == "detail")
        .unwrap();
    assert_eq!(detail.target, Some(list.id));
    assert_eq!(detail.target_request_code, 7);
}

#[test]
fn test_saved_state_survives_json() {
    let (_h, saved) = populated();
    let json = saved.to_json().unwrap();
    let parsed = SavedRegistryState::from_json(&json).unwrap();
    assert_eq!(parsed, saved);
}

#[test]
fn test_restore_rebuilds_and_pops() {
    let (_h, saved) = populated();
    let saved = SavedRegistryState::from_json(&saved.to_json().unwrap()).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut restored = Harness::new();
    restored
        .manager
        .restore_state(&saved, &factory(&seen))
        .unwrap();
    restored.resume();

    let list = restored.manager.find_by_tag("list").unwrap();
    let detail = restored.manager.find_by_tag("detail").unwrap();
    assert_eq!(restored.manager.added(), &[detail]);
    assert_eq!(restored.state(detail), LifecycleState::Resumed);
    // Kept on the back stack at CREATED.
    assert_eq!(restored.state(list), LifecycleState::Created);
    assert_eq!(restored.manager.primary(), Some(detail));
    assert_eq!(restored.manager.target_of(detail), Some(list));
    assert_eq!(restored.manager.back_stack_entry_count(), 1);
    assert_eq!(
        restored.manager.back_stack_entry_at(0).unwrap().id,
        Some(fragment_stack::BackStackId::new(0).unwrap())
    );
    {
        let blobs = seen.lock();
        assert!(blobs.contains(&json!({ "scroll": 3 })));
        assert!(blobs.contains(&json!({ "page": 2 })));
    }

    assert!(restored
        .manager
        .pop_back_stack_immediate(PopTarget::Top, false)
        .unwrap());
    assert_eq!(restored.manager.added(), &[list]);
    assert_eq!(restored.state(list), LifecycleState::Resumed);
    assert_eq!(restored.state(detail), LifecycleState::Initializing);
}

#[test]
fn test_restore_with_unknown_kind_fails() {
    let (_h, saved) = populated();
    let mut factory = FactoryRegistry::new();
    factory.register("list", || NoopHooks);
    assert!(!factory.contains("detail"));

    let mut restored = Harness::new();
    match restored.manager.restore_state(&saved, &factory) {
        Err(ManagerError::UnknownKind(kind)) => assert_eq!(kind, "detail"),
        other => panic!("expected UnknownKind, got {:?}", other),
    }
}

#[test]
fn test_restore_rejects_dangling_added_id() {
    let (_h, mut saved) = populated();
    saved.components.retain(|c| c.kind != "detail");
    saved.back_stack.clear();
    saved.primary = None;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut restored = Harness::new();
    assert!(matches!(
        restored.manager.restore_state(&saved, &factory(&seen)),
        Err(ManagerError::CorruptState(_))
    ));
}

#[test]
fn test_resume_after_save_clears_saved_mark() {
    let (mut h, _saved) = populated();
    h.manager.dispatch_pause().unwrap();
    h.manager.dispatch_resume().unwrap();
    assert!(!h.manager.is_state_saved());

    h.manager.save_state().unwrap();
    h.manager.note_state_not_saved();
    assert!(!h.manager.is_state_saved());
}
