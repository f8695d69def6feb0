use report_finder_lib::{input_loader, logger, run_batch};
use report_finder_lib::{CompanyColumn, FinderError, FinderSettings, ProviderKind};
use report_finder_lib::exporter::EXPORT_FILENAME;

use std::error::Error;
use std::path::PathBuf;
use clap::Parser;
use log::{info, error, LevelFilter};

/// Find each company's official website and its investor/annual-report page.
#[derive(Parser, Debug)]
#[command(name = "report-finder", version)]
struct Cli {
    /// Company list: CSV/TXT or a spreadsheet (xlsx, xls, ods)
    input: PathBuf,

    /// Where to write the results
    #[arg(short, long, default_value = EXPORT_FILENAME)]
    output: PathBuf,

    /// Search provider: serpapi or google-cse
    #[arg(long)]
    provider: Option<ProviderKind>,

    /// Provider API key (also REPORT_FINDER_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Google Custom Search engine id (also REPORT_FINDER_SEARCH_ENGINE_ID)
    #[arg(long)]
    cx: Option<String>,

    /// Header of the company column; without it the first column of a
    /// headerless file is read
    #[arg(long)]
    column: Option<String>,

    /// Pause between companies, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Settings file (defaults to ./report_finder.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, settings: &mut FinderSettings) {
        if let Some(provider) = self.provider {
            settings.provider = provider;
        }
        if let Some(key) = &self.api_key {
            settings.api_key = key.clone();
        }
        if let Some(cx) = &self.cx {
            settings.search_engine_id = Some(cx.clone());
        }
        if let Some(column) = &self.column {
            settings.company_column = Some(column.clone());
        }
        if let Some(delay) = self.delay_ms {
            settings.delay_ms = delay;
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logger::init(if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info });
    info!("Starting Report Finder...");

    let mut settings = FinderSettings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);

    // Blocking checks: nothing is fetched until credentials and input are usable.
    if let Err(e) = settings.validate() {
        error!("{}", e);
        return Err(e.into());
    }

    let column = CompanyColumn::from_setting(settings.company_column.as_deref());
    let companies = input_loader::load_companies(&cli.input, &column)?;
    if companies.is_empty() {
        error!("No company names found in {:?}", cli.input);
        return Err(FinderError::EmptyInput.into());
    }
    info!("Loaded {} companies", companies.len());

    let table = run_batch(&settings, &companies, |progress| {
        info!(
            "{} ({:.0}%)",
            progress.status_line,
            progress.fraction() * 100.0
        );
    })?;

    print!("{}", table.render_text());
    table.write_csv(&cli.output)?;

    let summary = table.summary();
    info!(
        "Done. {} companies: {} with report links, {} not found, {} errors. Results in {:?}",
        table.len(),
        summary.found,
        summary.not_found,
        summary.errors,
        cli.output
    );
    Ok(())
}
