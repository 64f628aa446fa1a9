//! Date helpers for service-date ranges and generated records

use chrono::{Datelike, Local, Months, NaiveDate};

/// Format used by the application's date inputs
pub const US_FORMAT: &str = "%m/%d/%Y";

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// First day of the month `offset` months away from `date`'s month.
pub fn first_of_month(date: NaiveDate, offset: i32) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    shift_months(first, offset)
}

/// Last day of the month `offset` months away from `date`'s month.
pub fn last_of_month(date: NaiveDate, offset: i32) -> NaiveDate {
    let next = shift_months(first_of_month(date, offset), 1);
    next.pred_opt().unwrap_or(next)
}

fn shift_months(date: NaiveDate, offset: i32) -> NaiveDate {
    let months = Months::new(offset.unsigned_abs());
    let shifted = if offset >= 0 {
        date.checked_add_months(months)
    } else {
        date.checked_sub_months(months)
    };
    shifted.unwrap_or(date)
}

/// `MM/DD/YYYY`
pub fn format_us(date: NaiveDate) -> String {
    date.format(US_FORMAT).to_string()
}

/// `YYYY-MM-DD`
pub fn format_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_us(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), US_FORMAT).ok()
}

/// First day of the offset month relative to today, `MM/DD/YYYY`
pub fn first_date_of_month_with_offset(offset: i32) -> String {
    format_us(first_of_month(today(), offset))
}

/// Last day of the offset month relative to today, `MM/DD/YYYY`
pub fn last_date_of_month_with_offset(offset: i32) -> String {
    format_us(last_of_month(today(), offset))
}
