use reactive_runtime::{
    computed::Memo, effect::Effect, prelude::*, signal::Signal, RuntimeError,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, RwLock,
};

#[test]
fn memo_calculates_value() {
    let a = Signal::new(1);
    let b = Signal::new(2);
    let c = Signal::new(3);

    let d = Memo::new({
        let (a, b, c) = (a.clone(), b.clone(), c.clone());
        move |_| a.get() + b.get() + c.get()
    });
    assert_eq!(d.get(), 6);
}

#[test]
fn memo_is_lazy() {
    let calculations = Arc::new(RwLock::new(0));
    let a = Signal::new(1);

    let d = Memo::new({
        let calculations = Arc::clone(&calculations);
        let a = a.clone();
        move |_| {
            *calculations.write().unwrap() += 1;
            a.get() * 2
        }
    });

    // nothing runs until the first read
    assert_eq!(*calculations.read().unwrap(), 0);
    assert_eq!(d.get(), 2);
    assert_eq!(*calculations.read().unwrap(), 1);
}

#[test]
fn memo_doesnt_repeat_calculation_per_get() {
    let calculations = Arc::new(RwLock::new(0));

    let a = Signal::new(1);
    let b = Signal::new(2);
    let c = Signal::new(3);

    let d = Memo::new({
        let calculations = Arc::clone(&calculations);
        let (a, b, c) = (a.clone(), b.clone(), c.clone());
        move |_| {
            *calculations.write().unwrap() += 1;
            a.get() + b.get() + c.get()
        }
    });
    assert_eq!(d.get(), 6);
    assert_eq!(d.get(), 6);
    assert_eq!(d.get(), 6);
    assert_eq!(*calculations.read().unwrap(), 1);

    a.set(0);
    assert_eq!(d.get(), 5);
    assert_eq!(*calculations.read().unwrap(), 2);
}

#[test]
fn nested_memos() {
    let a = Signal::new(0);
    let b = Signal::new(0);
    let c = Memo::new({
        let (a, b) = (a.clone(), b.clone());
        move |_| a.get() + b.get()
    });
    let d = Memo::new({
        let c = c.clone();
        move |_| c.get() * 2
    });
    let e = Memo::new({
        let d = d.clone();
        move |_| d.get() + 1
    });
    assert_eq!(e.get(), 1);
    assert_eq!(d.get(), 0);
    assert_eq!(c.get(), 0);

    a.set(5);
    assert_eq!(c.get(), 5);
    assert_eq!(d.get(), 10);
    assert_eq!(e.get(), 11);

    b.set(1);
    assert_eq!(e.get(), 13);
    assert_eq!(d.get(), 12);
    assert_eq!(c.get(), 6);
}

#[test]
fn diamond_evaluates_combined_memo_once() {
    let name = Signal::new("Greg Johnston".to_string());
    let first = Memo::new({
        let name = name.clone();
        move |_| name.get().split_whitespace().next().unwrap().to_string()
    });
    let last = Memo::new({
        let name = name.clone();
        move |_| name.get().split_whitespace().nth(1).unwrap().to_string()
    });

    let combined_count = Arc::new(RwLock::new(0));
    let combined = Memo::new({
        let combined_count = Arc::clone(&combined_count);
        let (first, last) = (first.clone(), last.clone());
        move |_| {
            *combined_count.write().unwrap() += 1;
            format!("{} {}", last.get(), first.get())
        }
    });

    assert_eq!(combined.get(), "Johnston Greg");
    assert_eq!(*combined_count.read().unwrap(), 1);

    name.set("Will Smith".to_string());
    assert_eq!(first.get(), "Will");
    assert_eq!(last.get(), "Smith");
    assert_eq!(combined.get(), "Smith Will");
    assert_eq!(*combined_count.read().unwrap(), 2);
}

#[test]
fn unchanged_memo_result_keeps_version_and_short_circuits() {
    let x = Signal::new(4);
    let sq_count = Arc::new(RwLock::new(0));
    let sq = Memo::new({
        let sq_count = Arc::clone(&sq_count);
        let x = x.clone();
        move |_| {
            *sq_count.write().unwrap() += 1;
            x.get() * x.get()
        }
    });
    let sign_count = Arc::new(RwLock::new(0));
    let sign = Memo::new({
        let sign_count = Arc::clone(&sign_count);
        let sq = sq.clone();
        move |_| {
            *sign_count.write().unwrap() += 1;
            sq.get() > 0
        }
    });

    assert!(sign.get());
    let sq_version = sq.version();
    assert_eq!((*sq_count.read().unwrap(), *sign_count.read().unwrap()), (1, 1));

    // -4 squares to the same 16: sq recomputes, but its version holds, so
    // sign reconciles back to clean without running
    x.set(-4);
    assert!(sign.get());
    assert_eq!(sq.version(), sq_version);
    assert_eq!((*sq_count.read().unwrap(), *sign_count.read().unwrap()), (2, 1));
}

#[test]
fn memo_receives_its_previous_value() {
    let a = Signal::new(10);
    let history = Memo::new({
        let a = a.clone();
        move |prev: Option<&Vec<i32>>| {
            let mut items = prev.cloned().unwrap_or_default();
            items.push(a.get());
            items
        }
    });

    assert_eq!(history.get(), vec![10]);
    a.set(20);
    assert_eq!(history.get(), vec![10, 20]);
}

#[test]
fn failing_memo_caches_the_error_and_retries_after_upstream_change() {
    let denominator = Signal::new(0);
    let runs = Arc::new(RwLock::new(0));
    let quotient = Memo::new({
        let runs = Arc::clone(&runs);
        let denominator = denominator.clone();
        move |_| {
            *runs.write().unwrap() += 1;
            let d = denominator.get();
            if d == 0 {
                panic!("division by zero");
            }
            100 / d
        }
    });

    let err = quotient.try_get().unwrap_err();
    assert!(matches!(err, RuntimeError::Callback(_)));
    assert_eq!(*runs.read().unwrap(), 1);

    // the failure is cached: reads re-raise without re-running
    assert!(quotient.try_get().is_err());
    assert_eq!(*runs.read().unwrap(), 1);

    // an upstream change clears the failure and retries
    denominator.set(5);
    assert_eq!(quotient.try_get(), Ok(20));
    assert_eq!(*runs.read().unwrap(), 2);
}

#[test]
fn disposed_memo_rejects_reads_and_releases_edges() {
    let a = Signal::new(1);
    let doubled = Memo::new({
        let a = a.clone();
        move |_| a.get() * 2
    });
    assert_eq!(doubled.get(), 2);
    assert_eq!(a.subscriber_count(), 1);

    doubled.dispose();
    doubled.dispose();

    assert!(doubled.is_disposed());
    assert_eq!(doubled.try_get(), Err(RuntimeError::Disposed));
    assert_eq!(a.subscriber_count(), 0);
}

#[test]
fn dispose_during_evaluation_still_releases_prior_edges() {
    let s = Signal::new(1);
    let dispose_now = Arc::new(AtomicBool::new(false));
    let slot: Arc<RwLock<Option<Memo<i32>>>> = Arc::new(RwLock::new(None));
    let m = Memo::new({
        let s = s.clone();
        let slot = Arc::clone(&slot);
        let dispose_now = Arc::clone(&dispose_now);
        move |_| {
            let v = s.get();
            if dispose_now.load(Ordering::SeqCst) {
                slot.read().unwrap().clone().unwrap().dispose();
            }
            v * 2
        }
    });
    *slot.write().unwrap() = Some(m.clone());

    assert_eq!(m.get(), 2);
    assert_eq!(s.subscriber_count(), 1);

    // disposing from inside the re-evaluation must release the edges the
    // memo held before the evaluation started, not just the fresh ones
    dispose_now.store(true, Ordering::SeqCst);
    s.set(5);
    assert_eq!(m.try_get(), Err(RuntimeError::Disposed));
    assert!(m.is_disposed());
    assert_eq!(s.subscriber_count(), 0);
}

#[test]
fn weak_memo_fails_with_gone_after_drop() {
    let doubled = Memo::new(move |_| 2);
    let weak = doubled.downgrade();
    assert_eq!(weak.upgrade().and_then(|m| m.try_get()), Ok(2));

    drop(doubled);
    assert_eq!(weak.upgrade().map(|_| ()), Err(RuntimeError::Gone));
}

#[test]
fn memo_stays_alive_while_a_subscriber_reads_it() {
    let a = Signal::new(1);
    let seen = Arc::new(RwLock::new(0));
    let doubled = Memo::new({
        let a = a.clone();
        move |_| a.get() * 2
    });
    let _e = Effect::new({
        let seen = Arc::clone(&seen);
        let doubled = doubled.clone();
        move || {
            *seen.write().unwrap() = doubled.get();
        }
    });
    assert_eq!(*seen.read().unwrap(), 2);

    // dropping the outer handle does not kill the memo: the effect still
    // reaches it through its source edge
    drop(doubled);
    a.set(3);
    assert_eq!(*seen.read().unwrap(), 6);
}
