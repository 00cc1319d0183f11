//! Local-time helpers for schedule evaluation and daily daemons.
//!
//! All schedule windows are evaluated in the configured zone; persisted
//! timestamps stay UTC. Naive and aware times are never mixed.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Wall clock pinned to one IANA zone.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    tz: Tz,
}

impl LocalClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    pub fn now_local(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    /// Local calendar date of a UTC instant.
    pub fn local_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.tz).date_naive()
    }

    /// Local time-of-day of a UTC instant.
    pub fn local_time(&self, ts: DateTime<Utc>) -> NaiveTime {
        ts.with_timezone(&self.tz).time()
    }

    /// UTC bounds `[start, end)` of a local calendar day.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = local_midnight(self.tz, date);
        let end = local_midnight(self.tz, date + Duration::days(1));
        (start, end)
    }

    /// Duration from `now` until the next local midnight.
    pub fn until_next_midnight(&self, now: DateTime<Utc>) -> std::time::Duration {
        let tomorrow = self.local_date(now) + Duration::days(1);
        clamp_duration(local_midnight(self.tz, tomorrow) - now)
    }

    /// Duration from `now` until the next local occurrence of `time`.
    pub fn until_next_time(&self, now: DateTime<Utc>, time: NaiveTime) -> std::time::Duration {
        let today = self.local_date(now);
        let mut target = local_datetime(self.tz, today, time);
        if target <= now {
            target = local_datetime(self.tz, today + Duration::days(1), time);
        }
        clamp_duration(target - now)
    }
}

fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    local_datetime(tz, date, NaiveTime::MIN)
}

fn local_datetime(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    // DST gaps resolve to the earliest valid instant.
    match tz.from_local_datetime(&date.and_time(time)) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        chrono::LocalResult::None => tz
            .from_local_datetime(&date.and_time(time + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
    }
}

fn clamp_duration(d: Duration) -> std::time::Duration {
    d.to_std()
        .unwrap_or_else(|_| std::time::Duration::from_secs(1))
        .max(std::time::Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jakarta() -> LocalClock {
        LocalClock::new(chrono_tz::Asia::Jakarta)
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        // 18:00 UTC = 01:00 WIB next day
        let ts = Utc.with_ymd_and_hms(2024, 5, 6, 18, 0, 0).unwrap();
        assert_eq!(
            jakarta().local_date(ts),
            NaiveDate::from_ymd_opt(2024, 5, 7).unwrap()
        );
    }

    #[test]
    fn test_day_bounds_offset() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let (start, end) = jakarta().day_bounds(date);
        // WIB midnight is 17:00 UTC the previous day
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 5, 17, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn test_until_next_time_today_and_tomorrow() {
        let clock = jakarta();
        // 09:00 WIB = 02:00 UTC
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 2, 0, 0).unwrap();
        let to_1730 = clock.until_next_time(now, NaiveTime::from_hms_opt(17, 30, 0).unwrap());
        assert_eq!(to_1730.as_secs(), (8 * 3600 + 1800) as u64);

        // 18:00 WIB: 17:30 already passed, schedule for tomorrow
        let evening = Utc.with_ymd_and_hms(2024, 5, 6, 11, 0, 0).unwrap();
        let to_next = clock.until_next_time(evening, NaiveTime::from_hms_opt(17, 30, 0).unwrap());
        assert_eq!(to_next.as_secs(), (23 * 3600 + 1800) as u64);
    }
}
