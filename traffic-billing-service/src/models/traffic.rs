//! Rows of the call-traffic export.

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Identifies one invoice: an account billed for one period.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrafficGroupKey {
    pub account_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

/// One parsed traffic row. Charges have already had thousands separators
/// stripped and been converted to a decimal.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficRow {
    pub account_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub area_name: String,
    pub duration_secs: Decimal,
    pub charges: Decimal,
    pub quality: Option<String>,
}

impl TrafficRow {
    pub fn group_key(&self) -> TrafficGroupKey {
        TrafficGroupKey {
            account_id: self.account_id.clone(),
            period_start: self.period_start,
            period_end: self.period_end,
        }
    }
}
