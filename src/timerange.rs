//! Decomposition of a time interval into a minimal covering set of
//! hierarchical time prefixes.
//!
//! A delegation over `[start, end]` must hand out one key per covering
//! prefix, so the decomposition directly determines delegation size: the
//! interior of the interval collapses into whole days, months, or years,
//! while the ragged edges near `start` and `end` are covered by
//! progressively finer prefixes.

use chrono::{DateTime, TimeZone};

use crate::error::{Error, Result};
use crate::time::{component_bounds, TimePath, TimePosition, MAX_TIME_LENGTH};

type Quantities = [u16; MAX_TIME_LENGTH];

fn quantities_of<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> Result<Quantities> {
    let path = TimePath::from_timestamp(timestamp)?;
    let mut quantities = [0u16; MAX_TIME_LENGTH];
    for (q, component) in quantities.iter_mut().zip(path.components()) {
        *q = component.quantity();
    }
    Ok(quantities)
}

/// The earliest hour-resolution path inside the subtree of `prefix`.
fn subtree_min(prefix: &[u16]) -> Quantities {
    let mut full = [0u16; MAX_TIME_LENGTH];
    full[..prefix.len()].copy_from_slice(prefix);
    for i in prefix.len()..MAX_TIME_LENGTH {
        let position = TimePosition::from_index(i).expect("index bounded above");
        full[i] = component_bounds(&full[..i], position).0;
    }
    full
}

/// The latest hour-resolution path inside the subtree of `prefix`.
fn subtree_max(prefix: &[u16]) -> Quantities {
    let mut full = [0u16; MAX_TIME_LENGTH];
    full[..prefix.len()].copy_from_slice(prefix);
    for i in prefix.len()..MAX_TIME_LENGTH {
        let position = TimePosition::from_index(i).expect("index bounded above");
        full[i] = component_bounds(&full[..i], position).1;
    }
    full
}

/// Emits the minimal cover of `subtree(prefix) ∩ [start, end]`.
///
/// Invariant: the intersection is non-empty, because the caller only
/// recurses into child quantities clipped to the interval boundaries.
fn cover(
    prefix: &mut Vec<u16>,
    start: &Quantities,
    end: &Quantities,
    out: &mut Vec<TimePath>,
) -> Result<()> {
    if &subtree_min(prefix) >= start && &subtree_max(prefix) <= end {
        out.push(TimePath::from_quantities(prefix)?);
        return Ok(());
    }

    let position = TimePosition::from_index(prefix.len())
        .expect("full paths are always inside a one-path interval");
    let (mut lo, mut hi) = component_bounds(prefix, position);
    if prefix[..] == start[..prefix.len()] {
        lo = start[prefix.len()];
    }
    if prefix[..] == end[..prefix.len()] {
        hi = end[prefix.len()];
    }
    for quantity in lo..=hi {
        prefix.push(quantity);
        cover(prefix, start, end, out)?;
        prefix.pop();
    }
    Ok(())
}

/// Computes the minimal set of time prefixes whose union exactly covers
/// the closed interval `[start, end]` at one-hour granularity.
///
/// The result is ordered chronologically and is deterministic. Fails with
/// [`Error::InvalidTime`] if either endpoint is out of the representable
/// range or if `start` is after `end`.
pub fn time_range<Tz: TimeZone>(
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
) -> Result<Vec<TimePath>> {
    let start = quantities_of(start)?;
    let end = quantities_of(end)?;
    if start > end {
        return Err(Error::InvalidTime(
            "start of time range is after its end".to_owned(),
        ));
    }

    let mut out = Vec::new();
    for year in start[0]..=end[0] {
        cover(&mut vec![year], &start, &end, &mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;

    fn range_strings(
        (y1, mo1, d1, h1): (i32, u32, u32, u32),
        (y2, mo2, d2, h2): (i32, u32, u32, u32),
    ) -> Vec<String> {
        let start = Utc.with_ymd_and_hms(y1, mo1, d1, h1, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(y2, mo2, d2, h2, 0, 0).unwrap();
        time_range(&start, &end)
            .unwrap()
            .iter()
            .map(TimePath::to_string)
            .collect()
    }

    #[test]
    fn multi_year() {
        assert_eq!(
            range_strings((2017, 12, 28, 21), (2019, 3, 1, 6)),
            vec![
                "2017/12/6/28/4/21",
                "2017/12/6/28/4/22",
                "2017/12/6/28/4/23",
                "2017/12/6/29",
                "2017/12/6/30",
                "2017/12/6/31",
                "2018",
                "2019/1",
                "2019/2",
                "2019/3/1/1/1",
                "2019/3/1/1/2/6",
            ]
        );
    }

    #[test]
    fn one_day() {
        assert_eq!(
            range_strings((2017, 10, 10, 0), (2017, 10, 10, 23)),
            vec!["2017/10/2/10"]
        );
    }

    #[test]
    fn two_days() {
        assert_eq!(
            range_strings((2017, 10, 10, 0), (2017, 10, 11, 23)),
            vec!["2017/10/2/10", "2017/10/3/11"]
        );
    }

    #[test]
    fn single_hour() {
        assert_eq!(
            range_strings((2017, 10, 10, 18), (2017, 10, 10, 18)),
            vec!["2017/10/2/10/4/18"]
        );
    }

    #[test]
    fn two_hours() {
        assert_eq!(
            range_strings((2017, 10, 10, 18), (2017, 10, 10, 19)),
            vec!["2017/10/2/10/4/18", "2017/10/2/10/4/19"]
        );
    }

    #[test]
    fn leap_february() {
        assert_eq!(
            range_strings((2016, 2, 28, 23), (2016, 3, 2, 0)),
            vec!["2016/2/6/28/4/23", "2016/2/6/29", "2016/3/1/1", "2016/3/1/2/1/0"]
        );
    }

    #[test]
    fn start_after_end() {
        let start = Utc.with_ymd_and_hms(2019, 1, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            time_range(&start, &end),
            Err(Error::InvalidTime(_))
        ));
    }

    #[test]
    fn minutes_are_floored_to_the_hour() {
        let start = Utc.with_ymd_and_hms(2017, 10, 10, 18, 45, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2017, 10, 10, 18, 50, 0).unwrap();
        let paths = time_range(&start, &end).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].to_string(), "2017/10/2/10/4/18");
    }

    #[test]
    fn covers_every_hour() {
        let start = Utc.with_ymd_and_hms(2016, 2, 26, 7, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2016, 3, 4, 22, 0, 0).unwrap();
        let paths = time_range(&start, &end).unwrap();

        let mut hour = start;
        while hour <= end {
            let full = TimePath::from_timestamp(&hour).unwrap();
            let covered = paths.iter().any(|p| {
                p.components()
                    .iter()
                    .zip(full.components())
                    .all(|(a, b)| a == b)
            });
            assert!(covered, "hour {} not covered", hour);
            hour = hour + chrono::Duration::hours(1);
        }
    }
}
