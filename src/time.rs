//! Safe time functions.
use std::time::SystemTime;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

fn is_leap_year(year: i64) -> bool {
    if year % 400 == 0 {
        true
    } else if year % 100 == 0 {
        false
    } else {
        year % 4 == 0
    }
}

fn year_len_days(year: i64) -> i64 {
    if is_leap_year(year) {
        366
    } else {
        365
    }
}

#[must_use]
pub fn month_len_days(year: i64, month: i64) -> i64 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => unimplemented!(),
    }
}

const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub struct DateTime {
    pub year: i64,
    pub month: i64,
    pub day: i64,
    /// 0 = Sunday.
    pub weekday: i64,
    pub hour: i64,
    pub min: i64,
    pub sec: i64,
}
impl DateTime {
    // Epoch time assumes that every day is the same length, 24 * 60 * 60 seconds.
    // It ignores leap seconds.
    ///
    /// # Panics
    /// Panics when `epoch_seconds` is negative.
    #[must_use]
    pub fn new(epoch_seconds: i64) -> Self {
        assert!(epoch_seconds >= 0, "dates before 1970 are not supported");
        let mut days = epoch_seconds.div_euclid(SECS_PER_DAY);
        let mut secs = epoch_seconds.rem_euclid(SECS_PER_DAY);
        // 1970-01-01 was a Thursday.
        let weekday = (days + 4) % 7;
        let mut year = 1970;
        while days >= year_len_days(year) {
            days -= year_len_days(year);
            year += 1;
        }
        let mut month = 1;
        while days >= month_len_days(year, month) {
            days -= month_len_days(year, month);
            month += 1;
        }
        let hour = secs / 3600;
        secs %= 3600;
        Self {
            year,
            month,
            day: days + 1,
            weekday,
            hour,
            min: secs / 60,
            sec: secs % 60,
        }
    }

    #[must_use]
    pub fn weekday_name(&self) -> &'static str {
        WEEKDAY_NAMES[usize::try_from(self.weekday).unwrap()]
    }

    #[must_use]
    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[usize::try_from(self.month - 1).unwrap()]
    }

    /// Formats the date-time the way HTTP headers want it,
    /// `Sun, 06 Nov 1994 08:49:37 GMT`.
    #[must_use]
    pub fn http_date(&self) -> String {
        format!(
            "{}, {:02} {} {:04} {:02}:{:02}:{:02} GMT",
            self.weekday_name(),
            self.day,
            self.month_name(),
            self.year,
            self.hour,
            self.min,
            self.sec
        )
    }
}

#[allow(clippy::module_name_repetitions)]
pub trait FormatTime {
    fn http_date(&self) -> String;
    fn iso8601_utc(&self) -> String;
}

impl FormatTime for SystemTime {
    fn http_date(&self) -> String {
        DateTime::new(epoch_seconds(self)).http_date()
    }

    fn iso8601_utc(&self) -> String {
        let dt = DateTime::new(epoch_seconds(self));
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            dt.year, dt.month, dt.day, dt.hour, dt.min, dt.sec
        )
    }
}

fn epoch_seconds(time: &SystemTime) -> i64 {
    // Times before the epoch clamp to it.
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap())
}
