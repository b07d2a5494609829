//! Calendar conversion and date formatting.
//!
//! Temporal cells and export filenames are rendered through the calendar
//! configured in [`AppSettings::calendar`](crate::settings::AppSettings).
//! The Jalali conversion is arithmetic (Julian day numbers plus the 33-year
//! leap cycle break table) and needs no lookup data beyond the break years.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::settings::Calendar;

/// A calendar-neutral year/month/day triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

const BREAKS: [i64; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

struct JalaliYear {
    leap: i64,
    gregorian_year: i64,
    march: i64,
}

fn jal_cal(jy: i64) -> Option<JalaliYear> {
    let gy = jy + 621;
    let mut leap_j = -14;
    let mut jp = BREAKS[0];
    if jy < jp || jy >= BREAKS[BREAKS.len() - 1] {
        return None;
    }

    let mut jump = 0;
    for &jm in &BREAKS[1..] {
        jump = jm - jp;
        if jy < jm {
            break;
        }
        leap_j += (jump / 33) * 8 + (jump % 33) / 4;
        jp = jm;
    }
    let mut n = jy - jp;

    leap_j += (n / 33) * 8 + ((n % 33) + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_j += 1;
    }

    let leap_g = gy / 4 - ((gy / 100 + 1) * 3) / 4 - 150;
    let march = 20 + leap_j - leap_g;

    if jump - n < 6 {
        n = n - jump + ((jump + 4) / 33) * 33;
    }
    let mut leap = (((n + 1) % 33) - 1) % 4;
    if leap == -1 {
        leap = 4;
    }

    Some(JalaliYear {
        leap,
        gregorian_year: gy,
        march,
    })
}

fn g2d(gy: i64, gm: i64, gd: i64) -> i64 {
    let d = ((gy + (gm - 8) / 6 + 100_100) * 1461) / 4 + (153 * ((gm + 9) % 12) + 2) / 5 + gd
        - 34_840_408;
    d - ((gy + 100_100 + (gm - 8) / 6) / 100 * 3) / 4 + 752
}

fn d2g(jdn: i64) -> (i64, i64, i64) {
    let mut j = 4 * jdn + 139_361_631;
    j += ((4 * jdn + 183_187_720) / 146_097 * 3) / 4 * 4 - 3908;
    let i = ((j % 1461) / 4) * 5 + 308;
    let gd = (i % 153) / 5 + 1;
    let gm = ((i / 153) % 12) + 1;
    let gy = j / 1461 - 100_100 + (8 - gm) / 6;
    (gy, gm, gd)
}

/// Converts a Gregorian date to the Jalali calendar.
///
/// Returns `None` outside the supported range (Jalali years -61 to 3177).
///
/// ```
/// use chrono::NaiveDate;
/// use flex_report_core::i18n::calendar::{to_jalali, CalendarDate};
///
/// let date = NaiveDate::from_ymd_opt(2016, 4, 11).unwrap();
/// assert_eq!(to_jalali(date), Some(CalendarDate { year: 1395, month: 1, day: 23 }));
/// ```
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_jalali(date: NaiveDate) -> Option<CalendarDate> {
    let jdn = g2d(
        i64::from(date.year()),
        i64::from(date.month()),
        i64::from(date.day()),
    );
    let (gy, _, _) = d2g(jdn);
    let mut jy = gy - 621;
    let year = jal_cal(jy)?;
    let first_day = g2d(gy, 3, year.march);
    let mut k = jdn - first_day;

    if k >= 0 {
        if k <= 185 {
            return Some(CalendarDate {
                year: jy as i32,
                month: (1 + k / 31) as u32,
                day: (k % 31 + 1) as u32,
            });
        }
        k -= 186;
    } else {
        jy -= 1;
        k += 179;
        if year.leap == 1 {
            k += 1;
        }
    }

    Some(CalendarDate {
        year: jy as i32,
        month: (7 + k / 30) as u32,
        day: (k % 30 + 1) as u32,
    })
}

/// Converts a Jalali date back to the Gregorian calendar.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn from_jalali(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if !(1..=12).contains(&month) || day == 0 || day > 31 {
        return None;
    }
    let (jm, jd) = (i64::from(month), i64::from(day));
    let cal = jal_cal(i64::from(year))?;
    let jdn = g2d(cal.gregorian_year, 3, cal.march) + (jm - 1) * 31 - (jm / 7) * (jm - 7) + jd - 1;
    let (gy, gm, gd) = d2g(jdn);
    let date = NaiveDate::from_ymd_opt(gy as i32, gm as u32, gd as u32)?;
    // Reject days past the end of the Jalali month.
    (to_jalali(date)? == CalendarDate { year, month, day }).then_some(date)
}

/// Formats a date-time with a `strftime`-style format in the given calendar.
///
/// Supported directives: `%Y %y %m %d %H %M %S %%`. Other directives are
/// copied through untouched.
pub fn strftime(value: &NaiveDateTime, fmt: &str, calendar: Calendar) -> String {
    let date = match calendar {
        Calendar::Gregorian => None,
        Calendar::Jalali => to_jalali(value.date()),
    }
    .unwrap_or(CalendarDate {
        year: value.year(),
        month: value.month(),
        day: value.day(),
    });
    render(fmt, date, value.time())
}

/// Formats a date in the given calendar.
pub fn format_date(value: NaiveDate, fmt: &str, calendar: Calendar) -> String {
    strftime(&value.and_time(NaiveTime::MIN), fmt, calendar)
}

/// Formats a time of day; calendars do not affect times.
pub fn format_time(value: NaiveTime, fmt: &str) -> String {
    strftime(&NaiveDate::default().and_time(value), fmt, Calendar::Gregorian)
}

/// Parses a user-entered date (`YYYY/MM/DD` or `YYYY-MM-DD`) in the given calendar.
///
/// ISO date-times (containing `T`) are always read as Gregorian.
pub fn parse_date(input: &str, calendar: Calendar) -> Option<NaiveDate> {
    let input = input.trim();
    if input.contains('T') {
        return NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M"))
            .ok()
            .map(|dt| dt.date());
    }
    let mut parts = input.split(['/', '-']).map(str::parse::<u32>);
    let (Some(Ok(y)), Some(Ok(m)), Some(Ok(d)), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let year = i32::try_from(y).ok()?;
    match calendar {
        Calendar::Gregorian => NaiveDate::from_ymd_opt(year, m, d),
        Calendar::Jalali => from_jalali(year, m, d),
    }
}

fn render(fmt: &str, date: CalendarDate, time: NaiveTime) -> String {
    let mut out = String::with_capacity(fmt.len() + 8);
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('Y') => out.push_str(&format!("{:04}", date.year)),
            Some('y') => out.push_str(&format!("{:02}", date.year.rem_euclid(100))),
            Some('m') => out.push_str(&format!("{:02}", date.month)),
            Some('d') => out.push_str(&format!("{:02}", date.day)),
            Some('H') => out.push_str(&format!("{:02}", time.hour())),
            Some('M') => out.push_str(&format!("{:02}", time.minute())),
            Some('S') => out.push_str(&format!("{:02}", time.second())),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_to_jalali_known_dates() {
        assert_eq!(
            to_jalali(ymd(2016, 4, 11)),
            Some(CalendarDate { year: 1395, month: 1, day: 23 })
        );
        assert_eq!(
            to_jalali(ymd(2024, 3, 20)),
            Some(CalendarDate { year: 1403, month: 1, day: 1 })
        );
        assert_eq!(
            to_jalali(ymd(2024, 3, 19)),
            Some(CalendarDate { year: 1402, month: 12, day: 29 })
        );
    }

    #[test]
    fn test_round_trip_through_jalali() {
        for date in [ymd(2016, 4, 11), ymd(2023, 12, 31), ymd(2000, 2, 29), ymd(2024, 9, 22)] {
            let j = to_jalali(date).unwrap();
            assert_eq!(from_jalali(j.year, j.month, j.day), Some(date));
        }
    }

    #[test]
    fn test_from_jalali_rejects_invalid_day() {
        assert_eq!(from_jalali(1402, 7, 31), None);
        assert_eq!(from_jalali(1402, 13, 1), None);
    }

    #[test]
    fn test_strftime_gregorian_and_jalali() {
        let dt = ymd(2016, 4, 11).and_hms_opt(9, 5, 7).unwrap();
        assert_eq!(
            strftime(&dt, "%H:%M %Y/%m/%d", Calendar::Gregorian),
            "09:05 2016/04/11"
        );
        assert_eq!(
            strftime(&dt, "%H:%M %Y/%m/%d", Calendar::Jalali),
            "09:05 1395/01/23"
        );
        assert_eq!(strftime(&dt, "%Y-%m-%d_%H-%M-%S", Calendar::Gregorian), "2016-04-11_09-05-07");
    }

    #[test]
    fn test_strftime_passes_unknown_directives() {
        let dt = ymd(2020, 1, 2).and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(strftime(&dt, "%q %%", Calendar::Gregorian), "%q %");
    }

    #[test]
    fn test_format_time() {
        let t = NaiveTime::from_hms_opt(13, 4, 59).unwrap();
        assert_eq!(format_time(t, "%H:%M:%S"), "13:04:59");
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2016-04-11", Calendar::Gregorian), Some(ymd(2016, 4, 11)));
        assert_eq!(parse_date("1395/01/23", Calendar::Jalali), Some(ymd(2016, 4, 11)));
        assert_eq!(parse_date("2016-04-11T10:00", Calendar::Jalali), Some(ymd(2016, 4, 11)));
        assert_eq!(parse_date("yesterday", Calendar::Gregorian), None);
        assert_eq!(parse_date("2016/04", Calendar::Gregorian), None);
    }
}
