use reactive_runtime::{
    computed::Memo, effect::Effect, prelude::*, signal::Signal,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

#[test]
fn a_write_from_another_thread_drives_effects() {
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
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let writer = thread::spawn({
        let s = s.clone();
        move || s.set(5)
    });
    writer.join().unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(s.get(), 5);
}

#[test]
fn concurrent_writers_leave_the_graph_consistent() {
    let s = Signal::new(0usize);
    let doubled = Memo::new({
        let s = s.clone();
        move |_| s.get() * 2
    });

    let writers: Vec<_> = (1..=8)
        .map(|n| {
            thread::spawn({
                let s = s.clone();
                move || s.set(n * 100)
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let settled = s.get();
    assert!(settled % 100 == 0 && settled > 0);
    assert_eq!(doubled.get(), settled * 2);
}

#[test]
fn tracking_does_not_leak_into_spawned_threads() {
    let driver = Signal::new(0);
    let side = Signal::new(0);
    let runs = Arc::new(AtomicUsize::new(0));

    let _e = Effect::new({
        let runs = Arc::clone(&runs);
        let (driver, side) = (driver.clone(), side.clone());
        move || {
            runs.fetch_add(1, Ordering::SeqCst);
            driver.get();
            // a child thread has no observer frame: this read is untracked
            let reader = thread::spawn({
                let side = side.clone();
                move || side.get()
            });
            reader.join().unwrap();
        }
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(side.subscriber_count(), 0);

    side.set(3);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn owning_handles_move_across_threads() {
    let s = Signal::new(String::from("alpha"));
    let reader = thread::spawn({
        let s = s.clone();
        move || s.get()
    });
    assert_eq!(reader.join().unwrap(), "alpha");
}
