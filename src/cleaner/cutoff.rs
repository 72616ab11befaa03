use chrono::{DateTime, Days, Duration, TimeZone, Utc};

/// Compute the retention cutoff: `now` minus `retention_days` calendar days.
///
/// Days are subtracted on the calendar of `now`'s time zone, so a cutoff taken
/// from local time lands on the same wall-clock time across a DST change. When
/// that wall-clock time does not exist locally, whole 24h days are subtracted
/// instead. `None` means no retention period, hence no cutoff.
pub fn retention_cutoff<Tz: TimeZone>(
    now: DateTime<Tz>,
    retention_days: Option<u32>,
) -> Option<DateTime<Utc>> {
    let days = retention_days?;
    let cutoff = now
        .clone()
        .checked_sub_days(Days::new(u64::from(days)))
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            now.with_timezone(&Utc)
                .checked_sub_signed(Duration::days(i64::from(days)))
        })
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    Some(cutoff)
}

/// Whether a task created at `created` is past the cutoff.
///
/// Strictly earlier only: a task created exactly at the cutoff is kept.
/// Without a cutoff every task qualifies.
pub fn is_stale(created: DateTime<Utc>, cutoff: Option<DateTime<Utc>>) -> bool {
    cutoff.is_none_or(|cutoff| created < cutoff)
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;
    use rstest::rstest;

    use super::*;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_no_retention_means_no_cutoff() {
        assert_eq!(retention_cutoff(utc(2024, 1, 31), None), None);
    }

    #[test]
    fn test_cutoff_subtracts_calendar_days() {
        assert_eq!(
            retention_cutoff(utc(2024, 1, 31), Some(30)),
            Some(utc(2024, 1, 1))
        );
        assert_eq!(
            retention_cutoff(utc(2024, 3, 1), Some(1)),
            Some(utc(2024, 2, 29))
        );
        assert_eq!(
            retention_cutoff(utc(2024, 1, 31), Some(0)),
            Some(utc(2024, 1, 31))
        );
    }

    #[test]
    fn test_cutoff_in_fixed_offset_is_normalized_to_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = offset.with_ymd_and_hms(2024, 1, 31, 1, 0, 0).unwrap();
        assert_eq!(
            retention_cutoff(now, Some(30)),
            Some(Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_huge_retention_saturates() {
        let cutoff = retention_cutoff(utc(2024, 1, 31), Some(u32::MAX)).unwrap();
        assert!(cutoff < utc(1, 1, 1));
        assert!(!is_stale(utc(1970, 1, 1), Some(cutoff)));
    }

    #[rstest]
    #[case::well_before(utc(2023, 12, 1), true)]
    #[case::one_second_before(utc(2024, 1, 1) - Duration::seconds(1), true)]
    #[case::exactly_at_cutoff(utc(2024, 1, 1), false)]
    #[case::after(utc(2024, 1, 15), false)]
    fn test_is_stale_boundary(#[case] created: DateTime<Utc>, #[case] expected: bool) {
        assert_eq!(is_stale(created, Some(utc(2024, 1, 1))), expected);
    }

    #[rstest]
    #[case(utc(1970, 1, 1))]
    #[case(utc(2099, 12, 31))]
    fn test_without_cutoff_everything_is_stale(#[case] created: DateTime<Utc>) {
        assert!(is_stale(created, None));
    }
}
