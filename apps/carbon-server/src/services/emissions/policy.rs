use crate::input::{CampusFilter, YearFilter};
use crate::store::EmissionRow;

/// Granularity of the per-campus buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKey {
    Year,
    Month,
}

impl BucketKey {
    /// Month whenever the year is pinned, otherwise year. The campus filter
    /// does not change the outcome.
    pub fn select(_campus: &CampusFilter, year: &YearFilter) -> Self {
        if year.is_all() {
            Self::Year
        } else {
            Self::Month
        }
    }

    pub fn of(self, row: &EmissionRow) -> Option<i32> {
        match self {
            Self::Year => row.year,
            Self::Month => row.month,
        }
    }
}
