//! Serialization for reactive values: a signal or memo serializes as its
//! current value, and a signal deserializes as a fresh signal holding the
//! deserialized value.

use crate::{
    computed::Memo,
    signal::Signal,
    traits::With,
};
use serde::{Deserialize, Serialize};

impl<T: Serialize + Send + Sync + 'static> Serialize for Signal<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.try_with(|value| value.serialize(serializer))
            .map_err(serde::ser::Error::custom)?
    }
}

impl<T: Serialize + Send + Sync + 'static> Serialize for Memo<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.try_with(|value| value.serialize(serializer))
            .map_err(serde::ser::Error::custom)?
    }
}

impl<'de, T> Deserialize<'de> for Signal<T>
where
    T: Deserialize<'de> + PartialEq + Send + Sync + 'static,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Signal::new)
    }
}
