mod common;

use std::sync::Arc;

use common::{Harness, RecordingHost};
use fragment_stack::{
    ComponentId, ContainerId, Hook, LifecycleCallbacks, LifecycleEvent, LifecycleState,
    ManagerError, NoopHooks,
};
use parking_lot::Mutex;

#[derive(Default)]
struct EventSink {
    events: Mutex<Vec<(ComponentId, LifecycleEvent)>>,
}

impl EventSink {
    fn saw(&self, id: ComponentId, event: LifecycleEvent) -> bool {
        self.events.lock().contains(&(id, event))
    }

    fn count_for(&self, id: ComponentId) -> usize {
        self.events.lock().iter().filter(|(c, _)| *c == id).count()
    }
}

impl LifecycleCallbacks for EventSink {
    fn on_event(&self, component: ComponentId, _kind: &str, event: LifecycleEvent) {
        self.events.lock().push((component, event));
    }
}

#[test]
fn test_hook_without_call_through_fails_the_drain() {
    let mut h = Harness::resumed();
    let hooks = h.hooks("x").skipping(Hook::Create);
    let x = h.component_with("x", hooks);

    let mut tx = h.manager.begin_transaction();
    tx.add_to(ContainerId(1), x, None).unwrap();
    tx.commit(&mut h.manager).unwrap();

    match h.manager.pump(&h.looper) {
        Err(ManagerError::HookNotAcknowledged { component, hook }) => {
            assert_eq!(component, x);
            assert_eq!(hook, Hook::Create);
        }
        other => panic!("expected HookNotAcknowledged, got {:?}", other),
    }
    assert!(!h.manager.is_executing());
}

#[test]
fn test_missing_container_is_reported() {
    let mut h = Harness::with_host(RecordingHost {
        containers: Some(vec![1]),
        ..Default::default()
    });
    h.resume();
    let x = h.component("x");

    let mut tx = h.manager.begin_transaction();
    tx.add_to(ContainerId(7), x, None).unwrap();
    tx.commit(&mut h.manager).unwrap();

    assert!(matches!(
        h.manager.pump(&h.looper),
        Err(ManagerError::ContainerNotFound { container: ContainerId(7), .. })
    ));
}

#[test]
fn test_component_without_container_has_no_view() {
    let mut h = Harness::resumed();
    let x = h.component("x");
    let mut tx = h.manager.begin_transaction();
    tx.add(x, Some("headless")).unwrap();
    tx.commit(&mut h.manager).unwrap();
    h.pump();

    assert_eq!(h.state(x), LifecycleState::Resumed);
    assert!(!h.manager.component(x).unwrap().has_view());
    assert!(h.host.lock().events.is_empty());
}

#[test]
fn test_exit_animation_holds_at_created_until_finished() {
    let mut h = Harness::with_host(RecordingHost {
        animate_exits: true,
        ..Default::default()
    });
    h.resume();
    let x = h.component("x");
    h.mount(1, x);
    h.take_log();

    let mut tx = h.manager.begin_transaction();
    tx.set_custom_animations(None, Some("fade"), None, None).unwrap();
    tx.remove(x).unwrap();
    tx.commit(&mut h.manager).unwrap();
    h.pump();

    assert_eq!(h.state(x), LifecycleState::Created);
    assert!(h.manager.component(x).unwrap().is_animating_away());
    assert_eq!(h.events_for("x"), vec!["Pause", "Stop", "DestroyView"]);
    assert_eq!(h.manager.active_components().count(), 1);

    h.manager.finish_animation(x).unwrap();
    assert_eq!(h.state(x), LifecycleState::Initializing);
    assert_eq!(
        h.events_for("x"),
        vec!["Pause", "Stop", "DestroyView", "Destroy", "Detach"]
    );
    assert_eq!(h.manager.active_components().count(), 0);

    // A second report is ignored.
    h.manager.finish_animation(x).unwrap();
}

#[test]
fn test_deferred_start_holds_at_view_ready() {
    let mut h = Harness::resumed();
    let x = h.component("x");
    h.manager.set_user_visible_hint(x, false).unwrap();
    h.mount(1, x);

    assert_eq!(h.state(x), LifecycleState::ViewReady);
    assert!(h.manager.component(x).unwrap().is_start_deferred());

    // Another drain does not release it.
    let y = h.component("y");
    h.mount(2, y);
    assert_eq!(h.state(x), LifecycleState::ViewReady);

    h.manager.set_user_visible_hint(x, true).unwrap();
    assert_eq!(h.state(x), LifecycleState::Resumed);
    assert!(!h.manager.component(x).unwrap().is_start_deferred());
}

#[test]
fn test_deferred_start_released_mid_drain_runs_after_drain() {
    let mut h = Harness::resumed();
    let x = h.component("x");
    let y = h.component("y");
    h.manager.set_user_visible_hint(x, false).unwrap();
    h.mount(1, x);

    let mut tx = h.manager.begin_transaction();
    tx.add_to(ContainerId(2), y, None).unwrap();
    tx.run_on_commit(move |manager| manager.set_user_visible_hint(x, true))
        .unwrap();
    tx.commit(&mut h.manager).unwrap();
    h.pump();

    assert_eq!(h.state(x), LifecycleState::Resumed);
}

#[test]
fn test_recursive_observers_see_nested_components() {
    let mut h = Harness::resumed();
    let parent = h.component("parent");
    h.mount(1, parent);

    let everything = Arc::new(EventSink::default());
    let local_only = Arc::new(EventSink::default());
    h.manager
        .register_lifecycle_callbacks(everything.clone(), true);
    h.manager
        .register_lifecycle_callbacks(local_only.clone(), false);

    let nested = {
        let child = h.manager.child_registry_mut(parent).unwrap();
        assert_eq!(child.state(), LifecycleState::Resumed);
        let nested = child.create("nested", NoopHooks);
        let mut tx = child.begin_transaction();
        tx.add_to(ContainerId(10), nested, None).unwrap();
        tx.commit(child).unwrap();
        nested
    };
    h.pump();

    let child = h
        .manager
        .component(parent)
        .and_then(|c| c.child_registry())
        .unwrap();
    assert_eq!(
        child.component(nested).unwrap().state(),
        LifecycleState::Resumed
    );
    assert!(everything.saw(nested, LifecycleEvent::Created));
    assert!(everything.saw(nested, LifecycleEvent::Resumed));
    assert_eq!(local_only.count_for(nested), 0);

    // Tearing the parent down takes the nested registry with it.
    let mut tx = h.manager.begin_transaction();
    tx.remove(parent).unwrap();
    tx.commit(&mut h.manager).unwrap();
    h.pump();
    assert!(everything.saw(nested, LifecycleEvent::Destroyed));
    assert!(local_only.saw(parent, LifecycleEvent::Destroyed));

    let dyn_sink: Arc<dyn LifecycleCallbacks> = local_only.clone();
    assert!(h.manager.unregister_lifecycle_callbacks(&dyn_sink));
    assert!(!h.manager.unregister_lifecycle_callbacks(&dyn_sink));
}

#[test]
fn test_target_links_reject_cycles_and_strangers() {
    let mut h = Harness::resumed();
    let a = h.component("a");
    let b = h.component("b");
    let c = h.component("c");

    h.manager.set_target(a, Some(b), 1).unwrap();
    h.manager.set_target(b, Some(c), 2).unwrap();
    assert!(matches!(
        h.manager.set_target(c, Some(a), 3),
        Err(ManagerError::TargetCycle { .. })
    ));
    assert!(matches!(
        h.manager.set_target(a, Some(a), 0),
        Err(ManagerError::TargetCycle { .. })
    ));

    let mut other = Harness::resumed();
    let stranger = other.component("stranger");
    assert!(matches!(
        h.manager.set_target(a, Some(stranger), 0),
        Err(ManagerError::TargetNotInRegistry { .. })
    ));

    assert_eq!(h.manager.target_of(a), Some(b));
    assert_eq!(h.manager.component(a).unwrap().target_request_code(), 1);
    h.manager.set_target(a, None, 0).unwrap();
    assert_eq!(h.manager.target_of(a), None);
}

#[test]
fn test_target_is_created_first() {
    let mut h = Harness::resumed();
    let a = h.component("a");
    let b = h.component("b");
    h.manager.set_target(a, Some(b), 0).unwrap();

    // The target is activated in the same transaction, after the dependant.
    let mut tx = h.manager.begin_transaction();
    tx.add(a, None).unwrap();
    tx.add(b, None).unwrap();
    tx.commit(&mut h.manager).unwrap();
    h.pump();

    let log = h.take_log();
    let created_b = log.iter().position(|e| e == "b:Create").unwrap();
    let created_a = log.iter().position(|e| e == "a:Create").unwrap();
    assert!(created_b < created_a);
    assert_eq!(h.state(a), LifecycleState::Resumed);
    assert_eq!(h.state(b), LifecycleState::Resumed);
}

#[test]
fn test_modal_shows_and_dismisses() {
    let mut h = Harness::resumed();
    let dialog = h.manager.create_modal("dialog", NoopHooks, true);
    let modal = h.manager.component(dialog).unwrap().modal().unwrap();
    assert!(modal.cancelable);

    h.manager.show_modal(dialog, Some("dlg")).unwrap();
    h.pump();
    assert_eq!(h.state(dialog), LifecycleState::Resumed);
    assert_eq!(h.manager.find_by_tag("dlg"), Some(dialog));
    assert!(h
        .host
        .lock()
        .events
        .contains(&format!("modal {} true", dialog)));

    h.manager.dismiss_modal(dialog, false).unwrap();
    assert!(h
        .host
        .lock()
        .events
        .contains(&format!("modal {} false", dialog)));
    h.pump();
    assert_eq!(h.state(dialog), LifecycleState::Initializing);
    assert!(h.manager.added().is_empty());

    // Dismissing twice is a no-op.
    h.manager.dismiss_modal(dialog, false).unwrap();
    assert!(h.looper.is_empty());
}

#[test]
fn test_modal_on_back_stack_dismisses_by_popping() {
    let mut h = Harness::resumed();
    let dialog = h.manager.create_modal("dialog", NoopHooks, false);

    let mut tx = h.manager.begin_transaction();
    tx.add_to_back_stack(Some("dialog")).unwrap();
    let entry = h.manager.show_modal_in(dialog, &mut tx, None).unwrap();
    assert!(entry.is_some());
    h.pump();
    assert_eq!(h.manager.back_stack_entry_count(), 1);

    h.manager.dismiss_modal(dialog, false).unwrap();
    h.pump();
    assert_eq!(h.manager.back_stack_entry_count(), 0);
    assert_eq!(h.state(dialog), LifecycleState::Initializing);
}

#[test]
fn test_rejected_dismiss_leaves_modal_showing() {
    let mut h = Harness::resumed();
    let dialog = h.manager.create_modal("dialog", NoopHooks, true);
    h.manager.show_modal(dialog, None).unwrap();
    h.pump();
    h.manager.save_state().unwrap();

    assert!(matches!(
        h.manager.dismiss_modal(dialog, false),
        Err(ManagerError::StateLoss)
    ));
    let modal = h.manager.component(dialog).unwrap().modal().unwrap();
    assert!(modal.is_showing());
    assert!(modal.is_surface_visible());
    assert_eq!(h.manager.added(), &[dialog]);

    // The retry still goes through.
    h.manager.dismiss_modal(dialog, true).unwrap();
    h.pump();
    assert!(h.manager.component(dialog).unwrap().modal().unwrap().is_dismissed());
    assert_eq!(h.state(dialog), LifecycleState::Initializing);
}

#[test]
fn test_rejected_dismiss_keeps_back_stack_entry() {
    let mut h = Harness::resumed();
    let dialog = h.manager.create_modal("dialog", NoopHooks, false);
    let mut tx = h.manager.begin_transaction();
    tx.add_to_back_stack(None).unwrap();
    let entry = h.manager.show_modal_in(dialog, &mut tx, None).unwrap();
    h.pump();
    h.manager.save_state().unwrap();

    assert!(h.manager.dismiss_modal(dialog, false).is_err());
    let modal = h.manager.component(dialog).unwrap().modal().unwrap();
    assert_eq!(modal.back_stack_id(), entry);
    assert!(!modal.is_dismissed());
}

#[test]
fn test_dismiss_plain_component_is_rejected() {
    let mut h = Harness::resumed();
    let x = h.component("x");
    assert!(matches!(
        h.manager.dismiss_modal(x, false),
        Err(ManagerError::NotModal(id)) if id == x
    ));
}

#[test]
fn test_destroyed_registry_rejects_or_drops_commits() {
    let mut h = Harness::resumed();
    let x = h.component("x");
    h.mount(1, x);
    h.take_log();

    h.manager.dispatch_destroy().unwrap();
    assert!(h.manager.is_destroyed());
    assert_eq!(h.state(x), LifecycleState::Initializing);
    assert_eq!(
        h.events_for("x"),
        vec!["Pause", "Stop", "DestroyView", "Destroy", "Detach"]
    );

    let y = h.component("y");
    let mut tx = h.manager.begin_transaction();
    tx.add(y, None).unwrap();
    assert!(matches!(
        tx.commit(&mut h.manager),
        Err(ManagerError::Destroyed)
    ));

    let mut lossy = h.manager.begin_transaction();
    lossy.add(y, None).unwrap();
    assert_eq!(lossy.commit_allowing_state_loss(&mut h.manager).unwrap(), None);
    assert!(lossy.is_committed());
    assert!(h.looper.is_empty());
}

#[test]
fn test_retained_instance_survives_saved_teardown() {
    let mut h = Harness::resumed();
    let x = h.component("x");
    h.manager.set_retain_instance(x, true).unwrap();
    h.mount(1, x);
    h.take_log();

    h.manager.save_state().unwrap();
    h.manager.dispatch_pause().unwrap();
    h.manager.dispatch_stop().unwrap();
    h.manager.dispatch_destroy().unwrap();

    let events = h.events_for("x");
    assert!(events.contains(&"Detach".to_string()));
    assert!(!events.contains(&"Destroy".to_string()));
    assert!(h.manager.component(x).unwrap().retains_instance());
}

#[test]
fn test_request_codes_route_back_once() {
    let mut h = Harness::resumed();
    let x = h.component("x");

    let packed = h.manager.start_request(x, 5).unwrap();
    assert_eq!(h.manager.pending_request_count(), 1);
    assert_eq!(h.manager.dispatch_result(packed), Some((x, 5)));
    assert_eq!(h.manager.dispatch_result(packed), None);

    assert!(matches!(
        h.manager.start_request(x, 0x1_0000),
        Err(ManagerError::RequestCodeOutOfRange(_))
    ));
}
