//! Availability items and their cross-cycle identity.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Whether a slot can currently be booked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Available,
    Unavailable,
}

/// One unit of availability observed on the target resource.
///
/// Items are built fresh by a strategy on every cycle and never mutated.
/// Only their [`IdentityKey`] outlives the cycle (inside the dedup store).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailabilityItem {
    /// Free-text label, e.g. `C존 A1`.
    pub name: String,

    /// Zone tag used for filtering and display, e.g. `C ZONE`.
    pub zone: String,

    /// Bookability at observation time.
    pub status: ItemStatus,

    /// Search date this item applies to.
    pub date: NaiveDate,

    /// Name of the strategy that produced the item.
    pub source: String,
}

impl AvailabilityItem {
    /// Create an available item.
    pub fn available(
        name: impl Into<String>,
        zone: impl Into<String>,
        date: NaiveDate,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            zone: zone.into(),
            status: ItemStatus::Available,
            date,
            source: source.into(),
        }
    }

    /// Create an unavailable item.
    pub fn unavailable(
        name: impl Into<String>,
        zone: impl Into<String>,
        date: NaiveDate,
        source: impl Into<String>,
    ) -> Self {
        Self {
            status: ItemStatus::Unavailable,
            ..Self::available(name, zone, date, source)
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == ItemStatus::Available
    }

    /// Stable identity used for deduplication across cycles.
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            zone: self.zone.clone(),
            name: self.name.clone(),
            date: self.date,
        }
    }
}

/// Ordered `(zone, name, date)` triple identifying a reservation slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub zone: String,
    pub name: String,
    pub date: NaiveDate,
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.zone, self.name, self.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 8).unwrap()
    }

    #[test]
    fn test_identity_ignores_source_and_status() {
        let a = AvailabilityItem::available("C존 A1", "C ZONE", date(), "direct_fetch");
        let b = AvailabilityItem::unavailable("C존 A1", "C ZONE", date(), "secondary_api");
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn test_identity_distinguishes_dates() {
        let a = AvailabilityItem::available("C존 A1", "C ZONE", date(), "direct_fetch");
        let mut b = a.clone();
        b.date = date().succ_opt().unwrap();
        assert_ne!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn test_identity_key_display() {
        let item = AvailabilityItem::available("D존 B1", "D ZONE", date(), "direct_fetch");
        assert_eq!(item.identity_key().to_string(), "D ZONE-D존 B1-2025-09-08");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ItemStatus::Available).unwrap();
        assert_eq!(json, "\"available\"");
    }
}
