//! Outcome of one invoice run, rendered as the HTML listing or returned as JSON.

use super::profile::IncompleteProfile;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedInvoice {
    pub account_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub mode: super::BillingMode,
    pub pdf: String,
    pub spreadsheet: Option<String>,
    /// False when the ledger already held this invoice (or is disabled).
    pub ledger_recorded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub invoices: Vec<GeneratedInvoice>,
    /// Traffic accounts with no directory profile, in first-seen order.
    pub missing_accounts: Vec<String>,
    pub missing_company_names: Vec<String>,
    pub incomplete_profiles: Vec<IncompleteProfile>,
    /// Accounts whose business-unit tag maps to no billing mode.
    pub unknown_business_units: Vec<String>,
    pub ledger_file: Option<String>,
    pub ledger_added: usize,
    pub ledger_skipped: usize,
}
