//! Invoice model for traffic-billing-service.

use super::profile::BillingProfile;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which line-item fields, template and arithmetic apply to an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    MinutesBased,
    AmountOnly,
}

impl BillingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingMode::MinutesBased => "minutes_based",
            BillingMode::AmountOnly => "amount_only",
        }
    }

    pub fn all() -> [BillingMode; 2] {
        [BillingMode::MinutesBased, BillingMode::AmountOnly]
    }
}

/// Rounding applied to invoice totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalRounding {
    /// Whole currency units (and whole minutes).
    Whole,
    /// Two decimal places.
    Cents,
}

impl TotalRounding {
    pub fn apply(&self, value: Decimal) -> Decimal {
        match self {
            TotalRounding::Whole => value.round_dp(0),
            TotalRounding::Cents => value.round_dp(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinutesLine {
    pub area_name: String,
    pub minutes: Decimal,
    /// Charges per minute, `None` when the line carries no minutes.
    pub rate: Option<Decimal>,
    pub quality: Option<String>,
    pub amount: Decimal,
}

impl MinutesLine {
    /// Rate with exactly four decimal places, or `N/A`.
    pub fn rate_display(&self) -> String {
        match self.rate {
            Some(rate) => format!("{:.4}", rate.round_dp(4)),
            None => "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmountLine {
    pub area_name: String,
    pub amount: Decimal,
}

/// Line items of one invoice; the variant fixes the billing mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "items", rename_all = "snake_case")]
pub enum LineItems {
    MinutesBased(Vec<MinutesLine>),
    AmountOnly(Vec<AmountLine>),
}

impl LineItems {
    pub fn mode(&self) -> BillingMode {
        match self {
            LineItems::MinutesBased(_) => BillingMode::MinutesBased,
            LineItems::AmountOnly(_) => BillingMode::AmountOnly,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            LineItems::MinutesBased(lines) => lines.len(),
            LineItems::AmountOnly(lines) => lines.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InvoiceTotals {
    pub amount: Decimal,
    pub minutes: Option<Decimal>,
}

/// One invoice, derived from a traffic group and its billing profile.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDocument {
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub account_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub lines: LineItems,
    pub profile: BillingProfile,
}

impl InvoiceDocument {
    /// Periods longer than ten days get fifteen days to pay, shorter ones seven.
    pub fn due_date_for(
        invoice_date: NaiveDate,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> NaiveDate {
        let period_days = (period_end - period_start).num_days();
        let window = if period_days > 10 { 15 } else { 7 };
        invoice_date + Duration::days(window)
    }

    pub fn mode(&self) -> BillingMode {
        self.lines.mode()
    }

    pub fn totals(&self, rounding: TotalRounding) -> InvoiceTotals {
        match &self.lines {
            LineItems::MinutesBased(lines) => InvoiceTotals {
                amount: rounding.apply(lines.iter().map(|l| l.amount).sum()),
                minutes: Some(rounding.apply(lines.iter().map(|l| l.minutes).sum())),
            },
            LineItems::AmountOnly(lines) => InvoiceTotals {
                amount: rounding.apply(lines.iter().map(|l| l.amount).sum()),
                minutes: None,
            },
        }
    }

    /// `{account}-{dd-Mon-yy}_to_{dd-Mon-yy}`, shared by every artifact of
    /// this invoice. The account part is escaped with [`file_name_part`].
    pub fn file_stem(&self) -> String {
        format!(
            "{}-{}_to_{}",
            file_name_part(&self.account_id),
            self.period_start.format("%d-%b-%y"),
            self.period_end.format("%d-%b-%y")
        )
    }

    pub fn pdf_name(&self) -> String {
        format!("{}.pdf", self.file_stem())
    }

    pub fn spreadsheet_name(&self) -> String {
        format!("{}.xlsx", self.file_stem())
    }
}

/// Escapes an account id for use inside a single file name. `%`, path
/// separators, control characters and any `.` followed by another `.` become
/// `%XX`. Distinct ids stay distinct and the result never contains `..`.
pub fn file_name_part(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        let escape = match ch {
            '%' | '/' | '\\' => true,
            '.' => chars.peek() == Some(&'.'),
            c => c.is_control(),
        };
        if escape {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        } else {
            out.push(ch);
        }
    }
    out
}
