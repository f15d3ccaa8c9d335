#![cfg(feature = "serde")]

use reactive_runtime::{computed::Memo, prelude::*, signal::Signal};

#[test]
fn signal_serializes_as_its_current_value() {
    let s = Signal::new(vec![1, 2, 3]);
    assert_eq!(serde_json::to_string(&s).unwrap(), "[1,2,3]");

    s.set(vec![4]);
    assert_eq!(serde_json::to_string(&s).unwrap(), "[4]");
}

#[test]
fn memo_serializes_as_its_cached_value() {
    let s = Signal::new(2);
    let squared = Memo::new({
        let s = s.clone();
        move |_| s.get() * s.get()
    });
    assert_eq!(serde_json::to_string(&squared).unwrap(), "4");
}

#[test]
fn signal_deserializes_as_a_fresh_signal() {
    let s: Signal<Vec<i32>> = serde_json::from_str("[7,8]").unwrap();
    assert_eq!(s.get(), vec![7, 8]);
    assert_eq!(s.subscriber_count(), 0);
}
