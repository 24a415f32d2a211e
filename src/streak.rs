use std::collections::HashSet;

use chrono::NaiveDate;

/// Length of the current run of consecutive completed days.
///
/// Dates after `reference` never count. The run is anchored on `reference`
/// when it is present, otherwise on the day before, so a streak stays alive
/// until today's entry is made. Counting walks backward from the anchor and
/// stops at the first missing day.
pub fn streak<'a, I>(dates: I, reference: NaiveDate) -> u32
where
    I: IntoIterator<Item = &'a NaiveDate>,
{
    let days: HashSet<NaiveDate> = dates
        .into_iter()
        .copied()
        .filter(|d| *d <= reference)
        .collect();

    let anchor = if days.contains(&reference) {
        Some(reference)
    } else {
        reference.pred_opt()
    };

    let mut count = 0;
    let mut cursor = anchor;
    while let Some(day) = cursor {
        if !days.contains(&day) {
            break;
        }
        count += 1;
        cursor = day.pred_opt();
    }
    count
}
