use std::collections::VecDeque;

use serde::Serialize;

use crate::exporter::{CompanyRecord, LookupStatus};

/// Handed to the progress callback once per finished company.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
    pub company: String,
    pub status_line: String,
    pub record: CompanyRecord,
}

impl BatchProgress {
    pub fn after(processed: usize, total: usize, record: &CompanyRecord) -> Self {
        let outcome = match (&record.status, &record.report_link) {
            (LookupStatus::Found, Some(link)) => format!("Found {}", link),
            (status, _) => status.to_string(),
        };
        BatchProgress {
            processed,
            total,
            company: record.name.clone(),
            status_line: format!("[{}/{}] {}: {}", processed, total, record.name, outcome),
            record: record.clone(),
        }
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

/// Keeps the most recent status lines.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressLog {
    lines: VecDeque<String>,
    #[serde(skip)]
    capacity: usize,
}

impl ProgressLog {
    pub fn with_capacity(capacity: usize) -> Self {
        ProgressLog {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_and_fraction() {
        let record = CompanyRecord {
            name: "Acme".to_string(),
            official_website: Some("https://acme.com".to_string()),
            report_link: Some("https://acme.com/investors".to_string()),
            status: LookupStatus::Found,
        };
        let progress = BatchProgress::after(1, 4, &record);
        assert_eq!(progress.status_line, "[1/4] Acme: Found https://acme.com/investors");
        assert_eq!(progress.fraction(), 0.25);
        assert_eq!(progress.record, record);

        let missing = BatchProgress::after(4, 4, &CompanyRecord::new("Ghost"));
        assert_eq!(missing.status_line, "[4/4] Ghost: Not Found");
        assert_eq!(missing.fraction(), 1.0);
    }

    #[test]
    fn test_progress_log_is_bounded() {
        let mut log = ProgressLog::with_capacity(2);
        log.push("a");
        log.push("b");
        log.push("c");
        assert_eq!(log.lines().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(log.len(), 2);
    }
}
