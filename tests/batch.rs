use reactive_runtime::{effect::Effect, prelude::*, signal::Signal};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, RwLock,
};

#[test]
fn batch_coalesces_writes_into_one_pass() {
    let s = Signal::new(0);
    let t = Signal::new(0);
    let runs = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(RwLock::new((0, 0)));

    let _e = Effect::new({
        let runs = Arc::clone(&runs);
        let observed = Arc::clone(&observed);
        let (s, t) = (s.clone(), t.clone());
        move || {
            runs.fetch_add(1, Ordering::SeqCst);
            *observed.write().unwrap() = (s.get(), t.get());
        }
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    batch(|| {
        s.set(1);
        t.set(1);
        s.set(2);
    });

    // one pass, and the effect saw only the final values
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(*observed.read().unwrap(), (2, 1));
}

#[test]
fn batch_that_cancels_out_runs_nothing() {
    let s = Signal::new(0);
    let runs = Arc::new(AtomicUsize::new(0));

    let _e = Effect::new({
        let runs = Arc::clone(&runs);
        let s = s.clone();
        move || {
            runs.fetch_add(1, Ordering::SeqCst);
            s.get();
        }
    });
    let v0 = s.version();

    batch(|| {
        s.set(7);
        s.set(0);
    });

    // the final value equals the pre-batch value: no version bump, no run
    assert_eq!(s.version(), v0);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn reads_inside_the_window_see_the_pre_batch_value() {
    let s = Signal::new(1);

    batch(|| {
        s.set(2);
        assert_eq!(s.get_untracked(), 1);
    });

    assert_eq!(s.get_untracked(), 2);
}

#[test]
fn nested_batches_flush_at_the_outermost_close() {
    let s = Signal::new(0);
    let runs = Arc::new(AtomicUsize::new(0));

    let _e = Effect::new({
        let runs = Arc::clone(&runs);
        let s = s.clone();
        move || {
            runs.fetch_add(1, Ordering::SeqCst);
            s.get();
        }
    });

    batch(|| {
        s.set(1);
        batch(|| {
            s.set(2);
        });
        // the inner close deferred to us
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        s.set(3);
    });

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(s.get_untracked(), 3);
}

#[test]
fn batch_returns_the_closure_value() {
    assert_eq!(batch(|| 42), 42);
}

#[test]
fn effect_created_inside_a_batch_first_runs_at_close() {
    let s = Signal::new(5);
    let runs = Arc::new(AtomicUsize::new(0));

    let _e = batch({
        let runs = Arc::clone(&runs);
        let s = s.clone();
        move || {
            let e = Effect::new({
                let runs = Arc::clone(&runs);
                move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    s.get();
                }
            });
            assert_eq!(runs.load(Ordering::SeqCst), 0);
            e
        }
    });

    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
