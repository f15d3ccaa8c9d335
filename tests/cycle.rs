use reactive_runtime::{
    computed::Memo, prelude::*, signal::Signal, RuntimeError,
};
use std::sync::{Arc, RwLock};

#[test]
fn a_memo_reading_itself_fails_with_cycle() {
    let slot: Arc<RwLock<Option<Memo<i32>>>> = Arc::new(RwLock::new(None));
    let m = Memo::new({
        let slot = Arc::clone(&slot);
        move |_| {
            let me = slot.read().unwrap().clone().unwrap();
            me.get() + 1
        }
    });
    *slot.write().unwrap() = Some(m.clone());

    assert_eq!(m.try_get(), Err(RuntimeError::Cycle));

    // the failed evaluation left no trace: no cached value, no edges, and
    // the next read fails the same way
    assert_eq!(m.version(), 0);
    assert_eq!(m.source_count(), 0);
    assert_eq!(m.try_get(), Err(RuntimeError::Cycle));
}

#[test]
fn a_transitive_cycle_is_detected_and_unwound() {
    let a_slot: Arc<RwLock<Option<Memo<i32>>>> = Arc::new(RwLock::new(None));
    let b = Memo::new({
        let a_slot = Arc::clone(&a_slot);
        move |_| {
            let a = a_slot.read().unwrap().clone().unwrap();
            a.get() * 2
        }
    });
    let a = Memo::new({
        let b = b.clone();
        move |_| b.get() + 1
    });
    *a_slot.write().unwrap() = Some(a.clone());

    assert_eq!(a.try_get(), Err(RuntimeError::Cycle));

    // both partially-evaluated memos were restored
    assert_eq!(a.source_count(), 0);
    assert_eq!(b.source_count(), 0);
    assert_eq!(a.version(), 0);
    assert_eq!(b.version(), 0);
}

#[test]
fn cycle_detection_does_not_disturb_unrelated_edges() {
    let s = Signal::new(1);
    let fine = Memo::new({
        let s = s.clone();
        move |_| s.get() + 1
    });
    assert_eq!(fine.get(), 2);

    let slot: Arc<RwLock<Option<Memo<i32>>>> = Arc::new(RwLock::new(None));
    let broken = Memo::new({
        let slot = Arc::clone(&slot);
        let s = s.clone();
        move |_| {
            let me = slot.read().unwrap().clone().unwrap();
            s.get() + me.get()
        }
    });
    *slot.write().unwrap() = Some(broken.clone());

    assert_eq!(broken.try_get(), Err(RuntimeError::Cycle));

    // the healthy part of the graph keeps working
    s.set(10);
    assert_eq!(fine.get(), 11);
}
