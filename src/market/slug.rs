//! Hourly market slugs
//!
//! Slugs name one hour in US Eastern time, e.g.
//! `bitcoin-up-or-down-march-10-7am-et`. Encoding projects a UTC instant into
//! Eastern time; decoding goes back through the same zone so daylight-saving
//! offsets line up on transition days.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Tz;

/// Civil timezone every slug is expressed in
pub const SLUG_TIMEZONE: Tz = New_York;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Render the slug of the hour containing `instant`
pub fn encode(prefix: &str, instant: DateTime<Utc>) -> String {
    let local = instant.with_timezone(&SLUG_TIMEZONE);
    let month = MONTHS[local.month0() as usize];
    let (is_pm, hour) = local.hour12();
    let meridiem = if is_pm { "pm" } else { "am" };

    format!("{}-{}-{}-{}{}-et", prefix, month, local.day(), hour, meridiem)
}

/// Truncate to the top of the hour (minutes, seconds and sub-seconds zeroed)
pub fn truncate_to_hour(instant: DateTime<Utc>) -> DateTime<Utc> {
    let secs = instant.timestamp();
    let hour_secs = secs - secs.rem_euclid(3600);
    DateTime::from_timestamp(hour_secs, 0).unwrap_or(instant)
}

/// Slugs for the current hour and the `n - 1` hours after it
pub fn upcoming_slugs(prefix: &str, n: usize) -> Vec<String> {
    upcoming_slugs_from(prefix, Utc::now(), n)
}

/// Slugs for the hour containing `now` and the `n - 1` hours after it
pub fn upcoming_slugs_from(prefix: &str, now: DateTime<Utc>, n: usize) -> Vec<String> {
    let start = truncate_to_hour(now);
    (0..n)
        .map(|i| encode(prefix, start + Duration::hours(i as i64)))
        .collect()
}

/// Recover the hour start a slug names, assuming the current Eastern year.
///
/// Slugs carry no year, so a slug minted in late December and decoded in
/// January resolves to the wrong year.
pub fn decode(slug: &str) -> Option<DateTime<Utc>> {
    let year = Utc::now().with_timezone(&SLUG_TIMEZONE).year();
    decode_in_year(slug, year)
}

/// Recover the hour start a slug names, taking the year that lands closest
/// to `now`.
///
/// Around New Year the next-hour slug `january-1-12am` belongs to the year
/// after `now`'s Eastern year; checking the neighbouring years covers it.
pub fn decode_near(slug: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let year = now.with_timezone(&SLUG_TIMEZONE).year();
    [year - 1, year, year + 1]
        .into_iter()
        .filter_map(|y| decode_in_year(slug, y))
        .min_by_key(|start| (*start - now).num_seconds().abs())
}

/// Recover the hour start a slug names within a given year
///
/// Returns `None` for malformed slugs and for hours that do not exist locally
/// (the skipped hour on the spring-forward day). The repeated hour on the
/// fall-back day resolves to its first occurrence.
pub fn decode_in_year(slug: &str, year: i32) -> Option<DateTime<Utc>> {
    let body = slug.strip_suffix("-et")?;

    let mut parts = body.rsplitn(4, '-');
    let hour_part = parts.next()?;
    let day_part = parts.next()?;
    let month_part = parts.next()?;
    // The prefix itself may contain dashes; it only has to be present
    parts.next()?;

    let month = MONTHS.iter().position(|m| *m == month_part)? as u32 + 1;
    let day: u32 = parse_digits(day_part)?;
    let hour = parse_hour(hour_part)?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, 0, 0)?;
    SLUG_TIMEZONE
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// `7am` -> 7, `12am` -> 0, `12pm` -> 12, `3pm` -> 15
fn parse_hour(token: &str) -> Option<u32> {
    let (digits, is_pm) = if let Some(d) = token.strip_suffix("am") {
        (d, false)
    } else if let Some(d) = token.strip_suffix("pm") {
        (d, true)
    } else {
        return None;
    };

    let hour: u32 = parse_digits(digits)?;
    if !(1..=12).contains(&hour) {
        return None;
    }

    Some(match (hour, is_pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    })
}

fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
