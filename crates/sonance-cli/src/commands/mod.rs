pub mod config;
pub mod delete;
pub mod ingest;
pub mod query;
pub mod status;

pub use delete::run_delete;
pub use ingest::run_ingest;
pub use query::run_query;
pub use status::show_status;
