use anyhow::Context;
use chrono::NaiveDate;

/// Wire format for every date-scoped request. Not configurable.
pub const API_DATE_FORMAT: &str = "%d/%m/%Y";

pub fn format_api_date(date: NaiveDate) -> String {
    date.format(API_DATE_FORMAT).to_string()
}

/// Parses a user supplied date, as `DD/MM/YYYY` or `YYYY-MM-DD`.
pub fn parse_user_date(input: &str) -> anyhow::Result<NaiveDate> {
    let input = input.trim();
    NaiveDate::parse_from_str(input, API_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(input, "%Y-%m-%d"))
        .with_context(|| format!("Failed to parse date: {input}"))
}
