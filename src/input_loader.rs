use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Reader};
use log::{info, warn};

use crate::error::FinderError;

/// Where company names live in the uploaded table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanyColumn {
    /// No header row, names in the first column.
    FirstUnlabeled,
    /// A header row with a column of this name (matched case-insensitively).
    Named(String),
}

impl CompanyColumn {
    pub fn from_setting(column: Option<&str>) -> Self {
        match column.map(str::trim).filter(|c| !c.is_empty()) {
            Some(name) => CompanyColumn::Named(name.to_string()),
            None => CompanyColumn::FirstUnlabeled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Spreadsheet,
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

impl InputFormat {
    /// Content wins over the file name: a workbook uploaded as `.csv` is still
    /// read as a workbook.
    pub fn detect(filename: &str, bytes: &[u8]) -> Self {
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
            return InputFormat::Spreadsheet;
        }
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => InputFormat::Spreadsheet,
            _ => InputFormat::Csv,
        }
    }
}

pub fn load_companies<P: AsRef<Path>>(
    path: P,
    column: &CompanyColumn,
) -> Result<Vec<String>, FinderError> {
    let path_ref = path.as_ref();
    let bytes = std::fs::read(path_ref).map_err(|source| FinderError::ReadInput {
        path: path_ref.to_path_buf(),
        source,
    })?;

    let format = InputFormat::detect(&path_ref.to_string_lossy(), &bytes);
    let companies = parse_companies(&bytes, format, column)?;
    info!(
        "Loaded {} companies from {:?} ({:?})",
        companies.len(),
        path_ref,
        format
    );
    Ok(companies)
}

pub fn parse_companies(
    bytes: &[u8],
    format: InputFormat,
    column: &CompanyColumn,
) -> Result<Vec<String>, FinderError> {
    let rows = match format {
        InputFormat::Csv => read_csv_rows(bytes)?,
        InputFormat::Spreadsheet => read_spreadsheet_rows(bytes)?,
    };
    select_companies(rows, column)
}

fn read_csv_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>, FinderError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn read_spreadsheet_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>, FinderError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| FinderError::Spreadsheet(e.to_string()))?;

    let worksheets = workbook.worksheets();
    let Some((name, range)) = worksheets.first() else {
        return Err(FinderError::Spreadsheet("workbook has no worksheets".to_string()));
    };
    if worksheets.len() > 1 {
        warn!("Workbook has {} sheets, reading only '{}'", worksheets.len(), name);
    }

    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect())
        .collect())
}

fn select_companies(
    rows: Vec<Vec<String>>,
    column: &CompanyColumn,
) -> Result<Vec<String>, FinderError> {
    let mut rows = rows.into_iter();

    let idx = match column {
        CompanyColumn::FirstUnlabeled => 0,
        CompanyColumn::Named(wanted) => {
            let header = rows.next().unwrap_or_default();
            let wanted_norm = normalize_header(wanted);
            match header.iter().position(|h| normalize_header(h) == wanted_norm) {
                Some(i) => i,
                None => {
                    return Err(FinderError::MissingInputColumn {
                        column: wanted.clone(),
                        found: if header.is_empty() {
                            "no header row".to_string()
                        } else {
                            header.join(", ")
                        },
                    })
                }
            }
        }
    };

    Ok(rows
        .filter_map(|row| row.get(idx).map(|cell| cell.trim().to_string()))
        .filter(|name| !name.is_empty())
        .collect())
}

fn normalize_header(header: &str) -> String {
    header.trim_start_matches('\u{feff}').trim().to_lowercase()
}
