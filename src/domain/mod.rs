//! Domain types
//!
//! Extraction input (estimate line items, roof measurements, roof type),
//! per-rule analysis results and progress events.

pub mod analysis;
pub mod estimate;
pub mod measurements;
pub mod progress;

/// Extraction output may send `null` for any field; read it as the field's default
pub(crate) mod nullable {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }
}
