use log::{info, warn, error};

use crate::delay_manager::Throttle;
use crate::error::FinderError;
use crate::exporter::{CompanyRecord, LookupStatus, ResultTable};
use crate::progress::BatchProgress;
use crate::report_scanner::{LinkScanner, ReportScanner, ScanOutcome, FETCH_ERROR};
use crate::search_engine::{build_provider, SearchProvider};
use crate::settings::FinderSettings;

/// Resolves websites and scans them for report links, one company at a time.
pub struct Finder<'a> {
    search: &'a dyn SearchProvider,
    scanner: &'a dyn LinkScanner,
    throttle: Throttle,
}

impl<'a> Finder<'a> {
    pub fn new(search: &'a dyn SearchProvider, scanner: &'a dyn LinkScanner, throttle: Throttle) -> Self {
        Finder { search, scanner, throttle }
    }

    /// Never fails: provider and site errors end up in the record's status.
    pub fn process_company(&self, name: &str) -> CompanyRecord {
        let mut record = CompanyRecord::new(name);

        let website = match self.search.top_result(name) {
            Ok(Some(result)) => {
                info!(
                    "Resolved '{}' -> {} ({})",
                    name,
                    result.link,
                    result.domain.as_deref().unwrap_or("unknown domain")
                );
                result.link
            }
            Ok(None) => {
                warn!("Could not find website for {}", name);
                record.status = LookupStatus::NotFound;
                return record;
            }
            Err(e) => {
                error!("Search for '{}' via {} failed: {}", name, self.search.name(), e);
                record.status = LookupStatus::Error(format!("Search failed: {}", e));
                return record;
            }
        };
        record.official_website = Some(website.clone());

        match self.scanner.scan(&website) {
            ScanOutcome::Found(link) => {
                record.report_link = Some(link);
                record.status = LookupStatus::Found;
            }
            ScanOutcome::NotFound => {
                record.status = LookupStatus::NotFound;
            }
            ScanOutcome::FetchError(msg) => {
                record.status = LookupStatus::Error(format!("{}: {}", FETCH_ERROR, msg));
            }
        }
        record
    }

    /// One record per company, in input order. `on_progress` runs after each
    /// company; the throttle runs between companies.
    pub fn run<F>(&self, companies: &[String], mut on_progress: F) -> ResultTable
    where
        F: FnMut(&BatchProgress),
    {
        let total = companies.len();
        let mut table = ResultTable::new();

        for (i, company) in companies.iter().enumerate() {
            info!("Processing {} / {} : {}", i + 1, total, company);
            let record = self.process_company(company);
            let progress = BatchProgress::after(i + 1, total, &record);
            table.push(record);
            on_progress(&progress);

            if i + 1 < total {
                self.throttle.pause();
            }
        }

        let summary = table.summary();
        info!(
            "Batch completed: {} found, {} not found, {} errors.",
            summary.found, summary.not_found, summary.errors
        );
        table
    }
}

/// Checks credentials, then builds the configured provider and scanner and
/// runs the batch. Nothing is sent to the provider when validation fails.
pub fn run_batch<F>(
    settings: &FinderSettings,
    companies: &[String],
    on_progress: F,
) -> Result<ResultTable, FinderError>
where
    F: FnMut(&BatchProgress),
{
    settings.validate()?;
    let search = build_provider(settings)?;
    let scanner = ReportScanner::new(settings)?;
    let throttle = Throttle::new(settings.delay(), settings.delay_jitter());

    let finder = Finder::new(search.as_ref(), &scanner, throttle);
    Ok(finder.run(companies, on_progress))
}
