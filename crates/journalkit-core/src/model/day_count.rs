// ── Per-day entry counts ──

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Entry count per calendar day, for calendar-style views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayCounts(BTreeMap<NaiveDate, u32>);

impl DayCounts {
    /// Entries posted on `day`; zero for days without posts.
    pub fn get(&self, day: NaiveDate) -> u32 {
        self.0.get(&day).copied().unwrap_or(0)
    }

    /// Sum over all days.
    pub fn total(&self) -> u64 {
        self.0.values().map(|&n| u64::from(n)).sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Days in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, u32)> + '_ {
        self.0.iter().map(|(day, n)| (*day, *n))
    }

    pub(crate) fn insert(&mut self, day: NaiveDate, count: u32) {
        self.0.insert(day, count);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_days_count_zero() {
        let mut counts = DayCounts::default();
        let day = NaiveDate::from_ymd_opt(2003, 1, 2).unwrap();
        counts.insert(day, 3);
        counts.insert(NaiveDate::from_ymd_opt(2003, 1, 5).unwrap(), 1);

        assert_eq!(counts.get(day), 3);
        assert_eq!(counts.get(NaiveDate::from_ymd_opt(2003, 1, 3).unwrap()), 0);
        assert_eq!(counts.total(), 4);
    }
}
