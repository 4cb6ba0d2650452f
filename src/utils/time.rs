use chrono::{Days, Local, NaiveDate};

pub const ISS_DATE_FORMAT: &str = "%Y-%m-%d";

/// ISO date `days` before `today`, as the ISS `from` parameter expects it.
pub fn history_start_date(today: NaiveDate, days: u64) -> String {
    today
        .checked_sub_days(Days::new(days))
        .unwrap_or(NaiveDate::MIN)
        .format(ISS_DATE_FORMAT)
        .to_string()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn iss_date(date: NaiveDate) -> String {
    date.format(ISS_DATE_FORMAT).to_string()
}
