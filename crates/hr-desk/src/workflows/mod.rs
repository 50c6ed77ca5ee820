pub mod catalog;
pub mod interviews;
pub mod queries;
pub mod reports;

pub use catalog::{Catalog, CatalogError, QueryDefinition, ReportDefinition};
pub use queries::{query_router, FilterDisplay, QueryResult, QueryRunner};
pub use reports::{report_router, ReportAction, ReportOutcome, ReportRunner};
