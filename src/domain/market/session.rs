use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;

/// Regular Trading Hours gate in the market timezone.
///
/// Entry windows are half-open `[start, end)` so the 16:00 close is
/// exclusive. The end-of-day flatten window is the closing subset
/// `[15:58, 16:00]` and is allowed to emit exit proposals after the entry
/// cutoff.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
    flatten_start: NaiveTime,
}

impl SessionClock {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            open: NaiveTime::from_hms_opt(9, 30, 0).expect("static time"),
            close: NaiveTime::from_hms_opt(16, 0, 0).expect("static time"),
            flatten_start: NaiveTime::from_hms_opt(15, 58, 0).expect("static time"),
        }
    }

    fn local_time(&self, ts: DateTime<Utc>) -> NaiveTime {
        ts.with_timezone(&self.tz).time()
    }

    /// True inside `[09:30, 16:00)` local; new entries are permitted.
    pub fn in_entry_window(&self, ts: DateTime<Utc>) -> bool {
        let t = self.local_time(ts);
        t >= self.open && t < self.close
    }

    /// True inside the closing subset `[15:58, 16:00]` local.
    pub fn in_eod_flatten_window(&self, ts: DateTime<Utc>) -> bool {
        let t = self.local_time(ts);
        t >= self.flatten_start && t <= self.close
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn ny_clock() -> SessionClock {
        SessionClock::new(New_York)
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        // 2024-01-02 is an EST trading day: local = UTC-5.
        New_York
            .with_ymd_and_hms(2024, 1, 2, h, m, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_entry_window_half_open() {
        let clock = ny_clock();
        assert!(!clock.in_entry_window(at(9, 29, 59)));
        assert!(clock.in_entry_window(at(9, 30, 0)));
        assert!(clock.in_entry_window(at(15, 59, 59)));
        // The close itself is exclusive for entries.
        assert!(!clock.in_entry_window(at(16, 0, 0)));
    }

    #[test]
    fn test_flatten_window_covers_close() {
        let clock = ny_clock();
        assert!(!clock.in_eod_flatten_window(at(15, 57, 59)));
        assert!(clock.in_eod_flatten_window(at(15, 58, 0)));
        assert!(clock.in_eod_flatten_window(at(16, 0, 0)));
        assert!(!clock.in_eod_flatten_window(at(16, 0, 1)));
    }
}
