use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, TimeZone, Utc};

/// Day key for attendance documents: the *local* calendar day as
/// `YYYY-MM-DD`. All record identity is derived from this.
pub fn today_string() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

pub fn parse_day(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Strict `HH:MM` (exactly five characters, zero-padded). Manual edits must
/// match this before any write happens.
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    if s.len() != 5 || s.as_bytes()[2] != b':' {
        return None;
    }
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

/// Interpret a wall-clock time on a local calendar day as a UTC instant.
/// DST gaps yield `None`; ambiguous times take the earlier offset.
pub fn local_instant(day: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    Local
        .from_local_datetime(&day.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Half-open day range for a `YYYY-MM` month: first day inclusive, first
/// day of the next month exclusive.
pub fn month_bounds(month: &str) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").ok()?;
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
    };
    Some((first, next))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hhmm_accepts_zero_padded_times() {
        assert_eq!(parse_hhmm("08:05"), NaiveTime::from_hms_opt(8, 5, 0));
        assert_eq!(parse_hhmm("23:59"), NaiveTime::from_hms_opt(23, 59, 0));
    }

    #[test]
    fn hhmm_rejects_loose_input() {
        assert!(parse_hhmm("8:05").is_none());
        assert!(parse_hhmm("0805").is_none());
        assert!(parse_hhmm("24:00").is_none());
        assert!(parse_hhmm("08:60").is_none());
        assert!(parse_hhmm("08:05:30").is_none());
        assert!(parse_hhmm("").is_none());
    }

    #[test]
    fn month_bounds_handles_year_rollover() {
        let (first, next) = month_bounds("2026-12").unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
        assert_eq!(next, NaiveDate::from_ymd_opt(2027, 1, 1).unwrap());
    }

    #[test]
    fn month_bounds_rejects_garbage() {
        assert!(month_bounds("2026-13").is_none());
        assert!(month_bounds("2026").is_none());
    }

    #[test]
    fn month_bounds_track_leap_years() {
        let span = |m| {
            let (first, next) = month_bounds(m).unwrap();
            (next - first).num_days()
        };
        assert_eq!(span("2026-02"), 28);
        assert_eq!(span("2028-02"), 29);
        assert_eq!(span("2026-01"), 31);
    }
}
