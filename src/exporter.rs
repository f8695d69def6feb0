use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;

use log::info;
use serde::Serialize;

use crate::error::FinderError;
use crate::report_scanner::{FETCH_ERROR, NOT_FOUND};

pub const EXPORT_FILENAME: &str = "annual_reports.csv";
pub const EXPORT_MIME: &str = "text/csv";
pub const EXPORT_HEADERS: [&str; 4] = ["Company", "Official Website", "Annual Report URL", "Status"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message")]
pub enum LookupStatus {
    Found,
    NotFound,
    Error(String),
}

impl fmt::Display for LookupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupStatus::Found => write!(f, "Found"),
            LookupStatus::NotFound => write!(f, "Not Found"),
            LookupStatus::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyRecord {
    pub name: String,
    pub official_website: Option<String>,
    pub report_link: Option<String>,
    pub status: LookupStatus,
}

impl CompanyRecord {
    pub fn new(name: impl Into<String>) -> Self {
        CompanyRecord {
            name: name.into(),
            official_website: None,
            report_link: None,
            status: LookupStatus::NotFound,
        }
    }

    pub fn website_cell(&self) -> &str {
        self.official_website.as_deref().unwrap_or(NOT_FOUND)
    }

    /// The matched URL, or the sentinel explaining why there is none.
    pub fn report_cell(&self) -> &str {
        match (&self.report_link, &self.status) {
            (Some(link), _) => link,
            (None, LookupStatus::Error(_)) if self.official_website.is_some() => FETCH_ERROR,
            _ => NOT_FOUND,
        }
    }

    fn row(&self) -> [String; 4] {
        [
            self.name.clone(),
            self.website_cell().to_string(),
            self.report_cell().to_string(),
            self.status.to_string(),
        ]
    }
}

/// Append-only, input-ordered table of lookups.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ResultTable {
    records: Vec<CompanyRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub found: usize,
    pub not_found: usize,
    pub errors: usize,
}

impl ResultTable {
    pub fn new() -> Self {
        ResultTable::default()
    }

    pub fn push(&mut self, record: CompanyRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[CompanyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> TableSummary {
        self.records
            .iter()
            .fold(TableSummary::default(), |mut acc, r| {
                match r.status {
                    LookupStatus::Found => acc.found += 1,
                    LookupStatus::NotFound => acc.not_found += 1,
                    LookupStatus::Error(_) => acc.errors += 1,
                }
                acc
            })
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, FinderError> {
        let mut csv_writer = csv::Writer::from_writer(Vec::new());
        self.write_rows(&mut csv_writer)?;
        csv_writer
            .into_inner()
            .map_err(|e| FinderError::Export(e.to_string()))
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), FinderError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| FinderError::Export(format!("{}: {}", path.display(), e)))?;

        let mut csv_writer = csv::Writer::from_writer(file);
        self.write_rows(&mut csv_writer)?;
        csv_writer
            .flush()
            .map_err(|e| FinderError::Export(e.to_string()))?;
        info!("Wrote {} rows to {:?}", self.len(), path);
        Ok(())
    }

    fn write_rows<W: std::io::Write>(&self, csv_writer: &mut csv::Writer<W>) -> Result<(), FinderError> {
        let export_err = |e: csv::Error| FinderError::Export(e.to_string());
        csv_writer.write_record(EXPORT_HEADERS).map_err(export_err)?;
        for record in &self.records {
            csv_writer.write_record(record.row()).map_err(export_err)?;
        }
        Ok(())
    }

    /// Column-aligned plain text, for terminals.
    pub fn render_text(&self) -> String {
        let rows: Vec<[String; 4]> = self.records.iter().map(CompanyRecord::row).collect();
        let mut widths = EXPORT_HEADERS.map(|h| h.chars().count());
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row.iter()) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        let header = EXPORT_HEADERS.map(str::to_string);
        push_line(&mut out, &header, &widths);
        let rule = widths.map(|w| "-".repeat(w));
        push_line(&mut out, &rule, &widths);
        for row in &rows {
            push_line(&mut out, row, &widths);
        }
        out
    }
}

fn push_line(out: &mut String, cells: &[String; 4], widths: &[usize; 4]) {
    let line = cells
        .iter()
        .zip(widths.iter())
        .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}
