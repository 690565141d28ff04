pub mod aggregator;
pub mod directory;
pub mod ledger;
pub mod pdf;
pub mod pipeline;
pub mod renderer;
pub mod sheet;
pub mod spreadsheet;
pub mod storage;

pub use ledger::{Ledger, LedgerStore};
pub use pdf::{PdfConverter, WkhtmltopdfConverter};
pub use pipeline::{BillingPipeline, RunRequest};
pub use renderer::InvoiceRenderer;
pub use storage::{LocalStorage, Storage};
