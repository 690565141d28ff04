//! Ledger rows recording invoices already produced.

use chrono::NaiveDate;
use serde::Serialize;

/// Ledger dates are kept as `YYYY-MM-DD` text, the format they are matched
/// and written in.
pub const LEDGER_DATE_FORMAT: &str = "%Y-%m-%d";

/// One produced invoice, as stored in the ledger workbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub account_id: String,
    pub period_start: String,
    pub period_end: String,
    pub invoice_date: String,
    pub date_produced: String,
    pub total_charges: String,
    /// Total minutes; `None` for amount-only invoices (written as `N/A`).
    pub minutes: Option<String>,
}

impl LedgerEntry {
    pub fn format_date(date: NaiveDate) -> String {
        date.format(LEDGER_DATE_FORMAT).to_string()
    }

    /// Same account, period and invoice date. Charges are compared only when
    /// `match_on_charges` is set.
    pub fn is_duplicate_of(&self, other: &LedgerEntry, match_on_charges: bool) -> bool {
        self.account_id == other.account_id
            && self.period_start == other.period_start
            && self.period_end == other.period_end
            && self.invoice_date == other.invoice_date
            && (!match_on_charges || self.total_charges == other.total_charges)
    }
}
