//! Date utilities

use chrono::{Datelike, NaiveDate};

/// Completed years between `dob` and `on`
///
/// Returns None when `on` precedes `dob`.
pub fn age_in_years(dob: NaiveDate, on: NaiveDate) -> Option<u32> {
    if on < dob {
        return None;
    }
    let mut years = on.year() - dob.year();
    if (on.month(), on.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}
