mod common;

use common::Harness;
use fragment_stack::{ComponentId, ContainerId, LifecycleState, PopTarget};

fn commit_postponed(h: &mut Harness, container: u32, id: ComponentId, back_stack: bool) {
    let mut tx = h.manager.begin_transaction();
    tx.add_to(ContainerId(container), id, None).unwrap();
    tx.set_reordering_allowed(true).unwrap();
    if back_stack {
        tx.add_to_back_stack(None).unwrap();
    }
    tx.commit(&mut h.manager).unwrap();
    h.pump();
}

fn resume_count(h: &Harness, name: &str) -> usize {
    h.events_for(name).iter().filter(|e| *e == "Resume").count()
}

#[test]
fn test_postponed_add_stays_incomplete_until_ready() {
    let mut h = Harness::resumed();
    let hooks = h.hooks("p").postponing();
    let p = h.component_with("p", hooks);

    commit_postponed(&mut h, 1, p, false);

    assert_eq!(h.manager.postponed_count(), 1);
    let component = h.manager.component(p).unwrap();
    assert!(component.is_postponed());
    assert!(!component.is_added());
    assert!(component.has_view());
    assert_eq!(component.state(), LifecycleState::Started);
    assert!(h
        .host
        .lock()
        .events
        .contains(&format!("visible {} false", p)));

    // Nothing is scheduled while it waits.
    assert_eq!(h.pump(), 0);
    assert_eq!(h.manager.postponed_count(), 1);

    h.manager.start_postponed_enter(p).unwrap();
    assert_eq!(h.pump(), 1);

    assert_eq!(h.manager.postponed_count(), 0);
    assert_eq!(h.state(p), LifecycleState::Resumed);
    assert_eq!(h.manager.added(), &[p]);
    assert!(h
        .host
        .lock()
        .events
        .contains(&format!("visible {} true", p)));

    // Completes exactly once.
    h.pump();
    assert_eq!(resume_count(&h, "p"), 1);
}

#[test]
fn test_execute_pending_forces_postponed_completion() {
    let mut h = Harness::resumed();
    let hooks = h.hooks("p").postponing();
    let p = h.component_with("p", hooks);
    commit_postponed(&mut h, 1, p, false);
    assert_eq!(h.manager.postponed_count(), 1);

    h.manager.execute_pending_transactions().unwrap();

    assert_eq!(h.manager.postponed_count(), 0);
    assert_eq!(h.state(p), LifecycleState::Resumed);
    assert!(!h.manager.component(p).unwrap().is_postponed());
}

#[test]
fn test_batch_touching_same_container_completes_postponed_first() {
    let mut h = Harness::resumed();
    let hooks = h.hooks("p").postponing();
    let p = h.component_with("p", hooks);
    let q = h.component("q");
    commit_postponed(&mut h, 1, p, false);

    let mut tx = h.manager.begin_transaction();
    tx.add_to(ContainerId(1), q, None).unwrap();
    tx.set_reordering_allowed(true).unwrap();
    tx.commit(&mut h.manager).unwrap();
    h.pump();

    assert_eq!(h.manager.postponed_count(), 0);
    assert_eq!(h.state(p), LifecycleState::Resumed);
    assert_eq!(h.state(q), LifecycleState::Resumed);
    assert_eq!(h.manager.added(), &[p, q]);
}

#[test]
fn test_batch_elsewhere_leaves_postponed_waiting() {
    let mut h = Harness::resumed();
    let hooks = h.hooks("p").postponing();
    let p = h.component_with("p", hooks);
    let q = h.component("q");
    commit_postponed(&mut h, 1, p, false);

    let mut tx = h.manager.begin_transaction();
    tx.add_to(ContainerId(2), q, None).unwrap();
    tx.set_reordering_allowed(true).unwrap();
    tx.commit(&mut h.manager).unwrap();
    h.pump();

    assert_eq!(h.manager.postponed_count(), 1);
    assert_eq!(h.state(q), LifecycleState::Resumed);
    assert!(!h.manager.component(p).unwrap().is_added());
}

#[test]
fn test_popping_postponed_entry_cancels_it() {
    let mut h = Harness::resumed();
    let hooks = h.hooks("p").postponing();
    let p = h.component_with("p", hooks);
    commit_postponed(&mut h, 1, p, true);
    assert_eq!(h.manager.postponed_count(), 1);
    assert_eq!(h.manager.back_stack_entry_count(), 1);

    h.manager.pop_back_stack(PopTarget::Top, false).unwrap();
    h.pump();

    assert_eq!(h.manager.postponed_count(), 0);
    assert_eq!(h.manager.back_stack_entry_count(), 0);
    assert_eq!(h.state(p), LifecycleState::Initializing);
    assert_eq!(resume_count(&h, "p"), 0);

    // The component can be postponed again by a later transaction.
    commit_postponed(&mut h, 1, p, false);
    assert_eq!(h.manager.postponed_count(), 1);
}

#[test]
fn test_ordered_transactions_are_never_postponed() {
    let mut h = Harness::resumed();
    let hooks = h.hooks("p").postponing();
    let p = h.component_with("p", hooks);

    let mut tx = h.manager.begin_transaction();
    tx.add_to(ContainerId(1), p, None).unwrap();
    tx.commit(&mut h.manager).unwrap();
    h.pump();

    assert_eq!(h.manager.postponed_count(), 0);
    assert_eq!(h.state(p), LifecycleState::Resumed);
}
