//! Domain models for traffic-billing-service.

mod invoice;
mod ledger;
mod profile;
mod report;
mod traffic;

pub use invoice::{
    AmountLine, BillingMode, InvoiceDocument, InvoiceTotals, LineItems, MinutesLine,
    TotalRounding,
};
pub use ledger::{LedgerEntry, LEDGER_DATE_FORMAT};
pub use profile::{BillingProfile, Directory, IncompleteProfile};
pub use report::{GeneratedInvoice, RunReport};
pub use traffic::{TrafficGroupKey, TrafficRow};
