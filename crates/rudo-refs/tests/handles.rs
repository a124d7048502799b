//! Handle lifecycles against a standalone registry.

mod common;

use std::sync::Arc;

use common::{objects, FakeObject, ScriptedHooks};
use rudo_refs::{BridgeRef, RegistryConfig, SpecialRefRegistry, StableRef, WeakRef};

#[test]
fn test_stable_handles_are_roots_until_disposed() {
    let registry = SpecialRefRegistry::new(RegistryConfig::default());
    let mut queue = registry.thread_queue();
    let pool = objects(3);

    let handles: Vec<_> = pool
        .iter()
        .map(|obj| StableRef::create_in(&mut queue, obj.obj()))
        .collect();
    queue.publish();

    let mut roots: Vec<_> = registry.roots().collect();
    roots.sort();
    let mut expected: Vec<_> = pool.iter().map(FakeObject::obj).collect();
    expected.sort();
    assert_eq!(roots, expected);

    for handle in handles {
        handle.dispose_in(&mut queue);
    }
    assert_eq!(registry.roots().count(), 0);
    assert_eq!(registry.lock_for_iter().iter().count(), 0);
    assert_eq!(registry.published_len(), 0);
}

#[test]
fn test_weak_handle_invalidated_by_collector() {
    let hooks = Arc::new(ScriptedHooks::default());
    let registry = SpecialRefRegistry::with_hooks(RegistryConfig::default(), hooks.clone());
    let mut queue = registry.thread_queue();
    let obj = FakeObject::new(7);

    let weak = WeakRef::create_in(&mut queue, obj.obj());
    queue.publish();
    assert_eq!(registry.roots().count(), 0);
    assert_eq!(weak.try_get(), Some(obj.obj()));

    // Marking found the object dead: raise the barrier, then clear.
    hooks.mark_dying(obj.obj());
    hooks.set_barrier(true);
    assert_eq!(weak.try_get(), None);
    for node in &mut registry.lock_for_iter() {
        if node.object() == Some(obj.obj()) {
            node.clear_object();
        }
    }
    hooks.set_barrier(false);
    assert_eq!(weak.try_get(), None);

    weak.dispose_in(&mut queue);
    assert_eq!(registry.lock_for_iter().iter().count(), 0);
    assert_eq!(registry.published_len(), 0);
}

#[test]
fn test_bridge_release_and_retain_cycles() {
    let registry = SpecialRefRegistry::new(RegistryConfig::default());
    let mut queue = registry.thread_queue();
    let obj = FakeObject::new(1);
    let bridge = BridgeRef::create_in(&mut queue, obj.obj());
    queue.publish();

    for round in 0..10 {
        bridge.release();
        if round % 2 == 0 {
            // Scan while released so the entry gets unlinked.
            assert_eq!(registry.roots().count(), 0);
        }
        assert!(bridge.try_retain());
        assert_eq!(registry.roots().collect::<Vec<_>>(), vec![obj.obj()]);
    }
    bridge.release();
    bridge.dispose_in(&mut queue);

    assert_eq!(registry.roots().count(), 0);
    assert_eq!(registry.lock_for_iter().iter().count(), 0);
    assert_eq!(registry.published_len(), 0);
}

#[test]
fn test_bridge_try_retain_fails_during_barrier() {
    let hooks = Arc::new(ScriptedHooks::default());
    let registry = SpecialRefRegistry::with_hooks(RegistryConfig::default(), hooks.clone());
    let mut queue = registry.thread_queue();
    let obj = FakeObject::new(2);
    let bridge = BridgeRef::create_in(&mut queue, obj.obj());
    bridge.release();

    hooks.mark_dying(obj.obj());
    hooks.set_barrier(true);
    assert!(!bridge.try_retain());
    assert_eq!(bridge.ref_count(), 0);
    hooks.set_barrier(false);

    bridge.dispose_in(&mut queue);
}

#[test]
fn test_permanent_objects_bypass_registry() {
    let hooks = Arc::new(ScriptedHooks::default());
    let registry = SpecialRefRegistry::with_hooks(RegistryConfig::default(), hooks.clone());
    let mut queue = registry.thread_queue();
    let obj = FakeObject::new(3);
    hooks.mark_permanent(obj.obj());

    let stable = StableRef::create_in(&mut queue, obj.obj());
    let weak = WeakRef::create_in(&mut queue, obj.obj());
    let bridge = BridgeRef::create_in(&mut queue, obj.obj());
    assert!(queue.is_empty());

    assert_eq!(stable.get(), obj.obj());
    assert_eq!(weak.try_get(), Some(obj.obj()));
    bridge.release();
    assert!(bridge.try_retain());
    assert_eq!(bridge.get(), obj.obj());
    assert_eq!(registry.roots().count(), 0);

    stable.dispose_in(&mut queue);
    weak.dispose_in(&mut queue);
    bridge.dispose_in(&mut queue);
    assert_eq!(registry.stats().nodes_created, 0);
}

#[test]
fn test_raw_pointers_round_trip_through_native_code() {
    let registry = SpecialRefRegistry::new(RegistryConfig::default());
    let mut queue = registry.thread_queue();
    let obj = FakeObject::new(4);

    let stable = StableRef::create_in(&mut queue, obj.obj()).into_raw();
    let bridge = BridgeRef::create_in(&mut queue, obj.obj()).into_raw();
    assert_eq!(registry.roots().count(), 2);

    // SAFETY: both pointers came from `into_raw` and are used once.
    let stable = unsafe { StableRef::from_raw(stable) };
    let bridge = unsafe { BridgeRef::from_raw(bridge) };
    assert_eq!(stable.get(), obj.obj());
    bridge.release();

    stable.dispose_in(&mut queue);
    bridge.dispose_in(&mut queue);
}

#[test]
fn test_handles_move_between_threads() {
    let registry = SpecialRefRegistry::new(RegistryConfig::default());
    let obj = FakeObject::new(5);
    let stable = {
        let mut queue = registry.thread_queue();
        StableRef::create_in(&mut queue, obj.obj())
    };

    let expected = obj.obj();
    let disposer = std::thread::spawn(move || {
        assert_eq!(stable.get(), expected);
        stable.dispose();
    });
    disposer.join().unwrap();

    assert_eq!(registry.roots().count(), 0);
    assert_eq!(registry.lock_for_iter().iter().count(), 0);
    assert_eq!(registry.published_len(), 0);
}

#[test]
fn test_stats_follow_node_lifecycle() {
    let registry = SpecialRefRegistry::new(RegistryConfig::default());
    let pool = objects(2);
    let mut queue = registry.thread_queue();

    let local = WeakRef::create_in(&mut queue, pool[0].obj());
    local.dispose_in(&mut queue);

    let published = StableRef::create_in(&mut queue, pool[1].obj());
    queue.publish();
    published.dispose_in(&mut queue);
    let _ = registry.roots().count();
    let _ = registry.lock_for_iter().iter().count();

    let stats = registry.stats();
    assert_eq!(stats.nodes_created, 2);
    assert_eq!(stats.nodes_deleted_locally, 1);
    assert_eq!(stats.nodes_published, 1);
    assert_eq!(stats.roots_erased, 1);
    assert_eq!(stats.nodes_swept, 1);
    assert_eq!(stats.root_scans, 1);
    assert_eq!(stats.full_iterations, 1);
}
