pub mod cold_start;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod exporter;
pub mod exposition;
pub mod extractor;
pub mod load_result;
pub mod load_runner;
pub mod report;
pub mod scraper;
pub mod types;

pub use cold_start::ColdStartCorrelator;
pub use config::BenchmarkConfig;
pub use consolidate::{ConsolidationEngine, MergePolicy};
pub use error::{Error, Result};
pub use exporter::Exporter;
pub use exposition::ExpositionParser;
pub use extractor::MetricsExtractor;
pub use load_result::LoadResultParser;
pub use load_runner::LoadRunner;
pub use scraper::Scraper;
