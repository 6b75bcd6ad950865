use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::ItemTypeId;

/// Kind of mutation applied to an offer's request item fork.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModificationKind {
    Added,
    Edited,
    Deleted,
}

/// Immutable record of one ADD/EDIT/DELETE on a request item fork.
///
/// Entries are append-only; displays sort them newest-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationHistoryEntry {
    pub item_type_id: ItemTypeId,
    pub kind: ModificationKind,
    pub old_quantity: Option<i64>,
    pub new_quantity: Option<i64>,
    pub old_comment: Option<String>,
    pub new_comment: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Sort a copy of the history newest-first for display.
pub fn newest_first(entries: &[ModificationHistoryEntry]) -> Vec<ModificationHistoryEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use offerflow_core::AggregateId;

    fn entry(kind: ModificationKind, at: DateTime<Utc>) -> ModificationHistoryEntry {
        ModificationHistoryEntry {
            item_type_id: ItemTypeId::new(AggregateId::new()),
            kind,
            old_quantity: None,
            new_quantity: Some(1),
            old_comment: None,
            new_comment: None,
            actor: "alice".to_string(),
            occurred_at: at,
        }
    }

    #[test]
    fn newest_first_orders_by_timestamp_descending() {
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 2, 10, 0, 0).unwrap();
        let entries = vec![
            entry(ModificationKind::Added, t1),
            entry(ModificationKind::Edited, t2),
        ];

        let sorted = newest_first(&entries);
        assert_eq!(sorted[0].kind, ModificationKind::Edited);
        assert_eq!(sorted[1].kind, ModificationKind::Added);
    }
}
