pub mod download;
pub mod health;
pub mod runs;

pub use download::download_file;
pub use health::{health_check, metrics_endpoint};
pub use runs::{create_run, create_run_page, upload_page};
