use reactive_runtime::{prelude::*, signal::Signal, RuntimeError};

#[test]
fn signal_holds_and_replaces_value() {
    let a = Signal::new(1);
    assert_eq!(a.get(), 1);
    a.set(2);
    assert_eq!(a.get(), 2);
}

#[test]
fn equal_write_is_ignored_entirely() {
    let a = Signal::new(5);
    let v0 = a.version();

    a.set(5);
    assert_eq!(a.version(), v0);
    assert_eq!(a.get(), 5);

    a.set(6);
    assert_eq!(a.version(), v0 + 1);

    a.set(6);
    assert_eq!(a.version(), v0 + 1);
}

#[test]
fn custom_comparator_gates_writes() {
    // only the magnitude is significant
    let a = Signal::new_with_compare(4i32, |x, y| x.abs() == y.abs());
    let v0 = a.version();

    a.set(-4);
    assert_eq!(a.version(), v0);
    assert_eq!(a.get(), 4);

    a.set(3);
    assert_eq!(a.version(), v0 + 1);
    assert_eq!(a.get(), 3);
}

#[test]
fn read_guard_derefs_to_value() {
    let greeting = Signal::new(String::from("hello"));
    let guard = greeting.read();
    assert_eq!(guard.len(), 5);
    assert_eq!(*guard, "hello");
}

#[test]
fn update_mutates_in_place_and_bumps_version() {
    let list = Signal::new(vec![1, 2]);
    let v0 = list.version();

    list.update(|list| list.push(3));
    assert_eq!(list.get(), vec![1, 2, 3]);
    // in-place mutation cannot be equality gated
    assert_eq!(list.version(), v0 + 1);
}

#[test]
fn write_guard_notifies_on_drop_unless_untracked() {
    let a = Signal::new(1);
    let v0 = a.version();

    {
        let mut guard = a.write();
        *guard = 10;
    }
    assert_eq!(a.version(), v0 + 1);

    {
        let mut guard = a.write();
        *guard = 20;
        guard.untrack();
    }
    assert_eq!(a.version(), v0 + 1);
    assert_eq!(a.get(), 20);
}

#[test]
fn untracked_write_does_not_notify() {
    let a = Signal::new(1);
    let v0 = a.version();
    *a.write_untracked() = 7;
    assert_eq!(a.version(), v0);
    assert_eq!(a.get(), 7);
}

#[test]
fn dispose_is_idempotent_and_rejects_access() {
    let a = Signal::new(1);
    a.dispose();
    a.dispose();

    assert!(a.is_disposed());
    assert_eq!(a.try_get(), Err(RuntimeError::Disposed));
    assert_eq!(a.try_set(2), Err(RuntimeError::Disposed));
}

#[test]
fn weak_handle_upgrades_until_dropped() {
    let a = Signal::new(1);
    let weak = a.downgrade();

    let again = weak.upgrade().expect("signal is still alive");
    assert_eq!(again.get(), 1);

    drop(again);
    drop(a);
    assert_eq!(weak.upgrade().map(|_| ()), Err(RuntimeError::Gone));
}

#[test]
fn untracked_accessors_exist_outside_any_observer() {
    let a = Signal::new(3);
    assert_eq!(a.get_untracked(), 3);
    assert_eq!(a.with_untracked(|v| v * 2), 6);
}
