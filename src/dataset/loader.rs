//! Reads the provider session table from CSV or Excel workbooks.

use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto};
use thiserror::Error;
use tracing::info;

use super::preprocess::{PreprocessError, preprocess};
use super::record::Dataset;
use crate::config::DatasetSettings;

pub const PROVIDER_COLUMN: &str = "NPI";
pub const LOGIN_COLUMN: &str = "Login Time";
pub const LOGOUT_COLUMN: &str = "Logout Time";
pub const SURVEY_COLUMN: &str = "Count of Survey Attempts";

#[derive(Debug, Error)]
pub enum DatasetLoadError {
    #[error("dataset file not found: {0}")]
    NotFound(PathBuf),
    #[error("unsupported dataset format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("workbook has no sheets")]
    NoSheets,
    #[error("missing required column `{0}`")]
    MissingColumn(&'static str),
    #[error("preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
}

/// Untyped cell value as read from the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    /// Numeric cell; in time columns this is an Excel serial date.
    Number(f64),
}

impl Cell {
    pub fn text(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }
}

/// The four source columns of one row, before any parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub provider: Cell,
    pub login: Cell,
    pub logout: Cell,
    pub survey_attempts: Cell,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    provider: usize,
    login: usize,
    logout: usize,
    survey_attempts: usize,
}

impl ColumnIndex {
    fn resolve(headers: &[String]) -> Result<Self, DatasetLoadError> {
        let find = |name: &'static str| {
            headers
                .iter()
                .position(|header| header.trim() == name)
                .ok_or(DatasetLoadError::MissingColumn(name))
        };
        Ok(Self {
            provider: find(PROVIDER_COLUMN)?,
            login: find(LOGIN_COLUMN)?,
            logout: find(LOGOUT_COLUMN)?,
            survey_attempts: find(SURVEY_COLUMN)?,
        })
    }

    fn row(&self, mut cell: impl FnMut(usize) -> Cell) -> RawRow {
        RawRow {
            provider: cell(self.provider),
            login: cell(self.login),
            logout: cell(self.logout),
            survey_attempts: cell(self.survey_attempts),
        }
    }
}

/// Read and preprocess the configured dataset.
pub fn load_dataset(settings: &DatasetSettings) -> Result<Dataset, DatasetLoadError> {
    let table = read_table(&settings.path, settings.sheet.as_deref())?;
    info!(
        "Dataset loaded from {}: {} rows",
        settings.path.display(),
        table.rows.len()
    );
    Ok(preprocess(&table)?)
}

/// Read the raw table, dispatching on the file extension.
pub fn read_table(path: &Path, sheet: Option<&str>) -> Result<RawTable, DatasetLoadError> {
    if !path.is_file() {
        return Err(DatasetLoadError::NotFound(path.to_path_buf()));
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("csv") => read_csv(path),
        Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => read_workbook(path, sheet),
        _ => Err(DatasetLoadError::UnsupportedFormat(path.to_path_buf())),
    }
}

fn read_csv(path: &Path) -> Result<RawTable, DatasetLoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let columns = ColumnIndex::resolve(&headers)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(columns.row(|idx| Cell::text(record.get(idx).unwrap_or(""))));
    }
    Ok(RawTable { rows })
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<RawTable, DatasetLoadError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = match sheet {
        Some(name) => workbook.worksheet_range(name)?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or(DatasetLoadError::NoSheets)??,
    };
    let mut sheet_rows = range.rows();
    let headers: Vec<String> = sheet_rows
        .next()
        .map(|header| header.iter().map(ToString::to_string).collect())
        .unwrap_or_default();
    let columns = ColumnIndex::resolve(&headers)?;
    let rows = sheet_rows
        .map(|cells| columns.row(|idx| cells.get(idx).map(workbook_cell).unwrap_or(Cell::Empty)))
        .collect();
    Ok(RawTable { rows })
}

fn workbook_cell(data: &Data) -> Cell {
    match data {
        Data::String(value) | Data::DateTimeIso(value) | Data::DurationIso(value) => {
            Cell::text(value)
        }
        Data::Float(value) => Cell::Number(*value),
        Data::Int(value) => Cell::Number(*value as f64),
        Data::DateTime(value) => Cell::Number(value.as_f64()),
        Data::Bool(value) => Cell::Text(value.to_string()),
        _ => Cell::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_csv_columns_by_header_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.csv");
        std::fs::write(
            &path,
            "State,NPI,Login Time,Logout Time,Count of Survey Attempts\n\
             NY,1001,2024-03-01 09:15:00,2024-03-01 10:00:00,4\n\
             CA, 1002 ,,2024-03-01 10:00:00,\n",
        )
        .unwrap();

        let table = read_table(&path, None).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].provider, Cell::Text("1001".into()));
        assert_eq!(
            table.rows[0].login,
            Cell::Text("2024-03-01 09:15:00".into())
        );
        assert_eq!(table.rows[0].survey_attempts, Cell::Text("4".into()));
        assert_eq!(table.rows[1].provider, Cell::Text("1002".into()));
        assert_eq!(table.rows[1].login, Cell::Empty);
        assert_eq!(table.rows[1].survey_attempts, Cell::Empty);
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.csv");
        std::fs::write(&path, "NPI,Login Time,Logout Time\n1,2024-03-01 09:00:00,\n").unwrap();

        let err = read_table(&path, None).unwrap_err();
        assert!(matches!(err, DatasetLoadError::MissingColumn(SURVEY_COLUMN)));
    }

    #[test]
    fn missing_and_unsupported_files_fail() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.xlsx");
        assert!(matches!(
            read_table(&missing, None),
            Err(DatasetLoadError::NotFound(_))
        ));

        let json = dir.path().join("sessions.json");
        std::fs::write(&json, "[]").unwrap();
        assert!(matches!(
            read_table(&json, None),
            Err(DatasetLoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn load_dataset_preprocesses_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.csv");
        std::fs::write(
            &path,
            "NPI,Login Time,Logout Time,Count of Survey Attempts\n\
             20,2024-03-01 07:00:00,2024-03-01 08:30:00,2\n\
             10,2024-03-01 19:00:00,2024-03-01 20:00:00,5\n",
        )
        .unwrap();
        let settings = DatasetSettings {
            path,
            sheet: None,
        };

        let dataset = load_dataset(&settings).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records()[0].provider_id, 1);
        assert_eq!(dataset.records()[1].provider_id, 0);
        assert_eq!(dataset.records()[0].session_minutes, 90.0);
    }
}
