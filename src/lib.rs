pub mod error;
pub mod settings;
pub mod input_loader;
pub mod search_engine;
pub mod report_scanner;
pub mod exporter;
pub mod progress;
pub mod pipeline;
pub mod delay_manager;
pub mod logger;

// Exporting types for convenience
pub use error::{FinderError, ScanError, SearchError};
pub use settings::{FinderSettings, ProviderKind};
pub use input_loader::{CompanyColumn, InputFormat};
pub use search_engine::{SearchProvider, SearchResult};
pub use report_scanner::{LinkScanner, ReportScanner, ScanOutcome};
pub use exporter::{CompanyRecord, LookupStatus, ResultTable};
pub use progress::BatchProgress;
pub use pipeline::{run_batch, Finder};
