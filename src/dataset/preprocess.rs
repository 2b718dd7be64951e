//! Derives model features from raw session rows.
//!
//! [`preprocess`] is pure: it reads a [`RawTable`] and builds a fresh
//! [`Dataset`]. Rows with a blank login, logout or survey count are dropped;
//! values that are present but unparseable fail the whole table.

use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Month, PrimitiveDateTime, Time};
use tracing::{debug, info};

use super::encoder::LabelEncoder;
use super::loader::{Cell, LOGIN_COLUMN, LOGOUT_COLUMN, RawTable, SURVEY_COLUMN};
use super::record::{Dataset, Record, TimeCategory, is_peak_hour};

const DATE_TIME_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    format_description!(
        "[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]:[second]"
    ),
    format_description!(
        "[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]"
    ),
];

const TIME_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[hour padding:none]:[minute]:[second]"),
    format_description!("[hour padding:none]:[minute]"),
];

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("data row {row}: invalid `{column}` value {value:?}")]
    InvalidValue {
        row: usize,
        column: &'static str,
        value: String,
    },
}

/// Encode identifiers, derive hour/duration/peak/category fields and drop
/// incomplete rows.
pub fn preprocess(table: &RawTable) -> Result<Dataset, PreprocessError> {
    let keys: Vec<String> = table.rows.iter().map(|row| provider_key(&row.provider)).collect();
    let encoder = LabelEncoder::fit(keys.iter().map(String::as_str));

    let mut records = Vec::with_capacity(table.rows.len());
    let mut dropped = 0usize;
    for (idx, (row, key)) in table.rows.iter().zip(&keys).enumerate() {
        let row_number = idx + 1;
        let login = parse_timestamp(&row.login)
            .map_err(|value| invalid(row_number, LOGIN_COLUMN, value))?;
        let logout = parse_timestamp(&row.logout)
            .map_err(|value| invalid(row_number, LOGOUT_COLUMN, value))?;
        let attempts = parse_count(&row.survey_attempts)
            .map_err(|value| invalid(row_number, SURVEY_COLUMN, value))?;

        let (Some(login), Some(logout), Some(survey_attempts), Some(provider_id)) =
            (login, logout, attempts, encoder.transform(key))
        else {
            dropped += 1;
            continue;
        };

        let login_hour = login.hour();
        records.push(Record {
            provider_id,
            login_hour,
            logout_hour: logout.hour(),
            session_minutes: (logout - login).as_seconds_f64() / 60.0,
            peak_hours: is_peak_hour(login_hour),
            survey_attempts,
            time_category: TimeCategory::from_hour(login_hour),
        });
    }

    if dropped > 0 {
        debug!(dropped, "Dropped incomplete rows");
    }
    info!(
        rows = records.len(),
        providers = encoder.len(),
        "Data preprocessing completed successfully"
    );
    Ok(Dataset::new(records, encoder.len()))
}

fn invalid(row: usize, column: &'static str, value: String) -> PreprocessError {
    PreprocessError::InvalidValue { row, column, value }
}

fn provider_key(cell: &Cell) -> String {
    match cell {
        Cell::Empty => String::new(),
        Cell::Text(value) => value.clone(),
        Cell::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", *value as i64)
        }
        Cell::Number(value) => value.to_string(),
    }
}

/// `Ok(None)` for blank cells, `Err(raw)` for values that are not timestamps.
fn parse_timestamp(cell: &Cell) -> Result<Option<PrimitiveDateTime>, String> {
    match cell {
        Cell::Empty => Ok(None),
        Cell::Number(serial) => excel_serial_to_datetime(*serial)
            .map(Some)
            .ok_or_else(|| serial.to_string()),
        Cell::Text(value) => parse_timestamp_text(value)
            .map(Some)
            .ok_or_else(|| value.clone()),
    }
}

fn parse_timestamp_text(value: &str) -> Option<PrimitiveDateTime> {
    for format in DATE_TIME_FORMATS {
        if let Ok(parsed) = PrimitiveDateTime::parse(value, format) {
            return Some(parsed);
        }
    }
    let date = Date::from_calendar_date(1970, Month::January, 1).ok()?;
    TIME_FORMATS
        .iter()
        .find_map(|format| Time::parse(value, format).ok())
        .map(|time| PrimitiveDateTime::new(date, time))
}

/// Convert an Excel serial date (days since 1899-12-30) to a timestamp,
/// rounded to the millisecond.
fn excel_serial_to_datetime(serial: f64) -> Option<PrimitiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = Date::from_calendar_date(1899, Month::December, 30)
        .ok()?
        .midnight();
    let millis = (serial * SECONDS_PER_DAY * 1000.0).round();
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    epoch.checked_add(time::Duration::milliseconds(millis as i64))
}

fn parse_count(cell: &Cell) -> Result<Option<i64>, String> {
    match cell {
        Cell::Empty => Ok(None),
        Cell::Number(value) => whole_number(*value)
            .map(Some)
            .ok_or_else(|| value.to_string()),
        Cell::Text(value) => value
            .parse::<i64>()
            .ok()
            .or_else(|| value.parse::<f64>().ok().and_then(whole_number))
            .map(Some)
            .ok_or_else(|| value.clone()),
    }
}

fn whole_number(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15).then_some(value as i64)
}
