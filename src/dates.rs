use chrono::{Days, NaiveDate, SecondsFormat, Utc};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// ISO-8601 timestamp with millisecond precision and a `Z` suffix.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}

/// `2024-03-04` becomes `Mon, Mar 4`. Unparseable input is returned as is.
pub fn format_display_date(date: &str) -> String {
    match parse_date(date) {
        Some(parsed) => parsed.format("%a, %b %-d").to_string(),
        None => date.to_string(),
    }
}

pub fn today() -> String {
    format_date(Utc::now().date_naive())
}

pub fn yesterday() -> String {
    previous_day(&today()).unwrap_or_else(today)
}

pub fn previous_day(date: &str) -> Option<String> {
    parse_date(date)
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .map(format_date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_date_is_short_weekday_month_day() {
        assert_eq!(format_display_date("2024-03-04"), "Mon, Mar 4");
        assert_eq!(format_display_date("2024-12-25"), "Wed, Dec 25");
        assert_eq!(format_display_date("not-a-date"), "not-a-date");
    }

    #[test]
    fn previous_day_crosses_month_boundaries() {
        assert_eq!(previous_day("2024-03-01").as_deref(), Some("2024-02-29"));
        assert_eq!(previous_day("garbage"), None);
    }

    #[test]
    fn timestamps_are_millisecond_utc() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
    }
}
