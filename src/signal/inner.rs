use crate::{
    graph::SubscriberSet,
    runtime::{NodeId, Runtime},
};

pub struct SignalInner<T> {
    pub(crate) id: NodeId,
    pub(crate) value: T,
    /// Staged value for a write performed inside a batch window. Reads
    /// during the window keep seeing `value`; the final staged value is
    /// compared and applied when the outermost batch closes.
    pub(crate) pending: Option<T>,
    pub(crate) version: u64,
    pub(crate) compare: fn(&T, &T) -> bool,
    pub(crate) subscribers: SubscriberSet,
    pub(crate) disposed: bool,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::unregister(self.id);
    }
}
