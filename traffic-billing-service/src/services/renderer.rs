//! HTML invoice rendering.
//!
//! Templates receive pre-formatted text only; all arithmetic happens before
//! the view structs are built.

use crate::models::{InvoiceDocument, InvoiceTotals, LineItems, TotalRounding};
use askama::Template;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;

const DISPLAY_DATE: &str = "%d-%b-%Y";

struct Header {
    issuer_name: String,
    logo_url: Option<String>,
    company_name: String,
    company_address: String,
    account_id: String,
    invoice_code: String,
    invoice_date: String,
    due_date: String,
    period_start: String,
    period_end: String,
}

struct MinutesRow {
    area_name: String,
    minutes: String,
    rate: String,
    quality: String,
    amount: String,
}

struct AmountRow {
    area_name: String,
    amount: String,
}

#[derive(Template)]
#[template(path = "invoice_minutes.html")]
struct MinutesInvoiceTemplate {
    header: Header,
    rows: Vec<MinutesRow>,
    show_quality: bool,
    total_minutes: String,
    total_amount: String,
}

#[derive(Template)]
#[template(path = "invoice_amount.html")]
struct AmountInvoiceTemplate {
    header: Header,
    rows: Vec<AmountRow>,
    total_amount: String,
}

#[derive(Debug, Clone)]
pub struct InvoiceRenderer {
    issuer_name: String,
    logo_url: Option<String>,
    rounding: TotalRounding,
}

impl InvoiceRenderer {
    pub fn new(issuer_name: impl Into<String>, logo_url: Option<String>, rounding: TotalRounding) -> Self {
        Self {
            issuer_name: issuer_name.into(),
            logo_url,
            rounding,
        }
    }

    pub fn render_html(&self, doc: &InvoiceDocument) -> Result<String, AppError> {
        let totals = doc.totals(self.rounding);
        let header = self.header(doc);

        let rendered = match &doc.lines {
            LineItems::MinutesBased(lines) => MinutesInvoiceTemplate {
                header,
                show_quality: lines.iter().any(|l| l.quality.is_some()),
                rows: lines
                    .iter()
                    .map(|l| MinutesRow {
                        area_name: l.area_name.clone(),
                        minutes: format_decimal(l.minutes, 2),
                        rate: l.rate_display(),
                        quality: l.quality.clone().unwrap_or_default(),
                        amount: format_decimal(l.amount, 2),
                    })
                    .collect(),
                total_minutes: self.format_total(totals.minutes.unwrap_or_default()),
                total_amount: self.format_total(totals.amount),
            }
            .render(),
            LineItems::AmountOnly(lines) => AmountInvoiceTemplate {
                header,
                rows: lines
                    .iter()
                    .map(|l| AmountRow {
                        area_name: l.area_name.clone(),
                        amount: format_decimal(l.amount, 2),
                    })
                    .collect(),
                total_amount: self.format_total(totals.amount),
            }
            .render(),
        };

        rendered.map_err(|e| {
            AppError::InternalError(anyhow::anyhow!(
                "Failed to render invoice template for {}: {}",
                doc.account_id,
                e
            ))
        })
    }

    pub fn totals(&self, doc: &InvoiceDocument) -> InvoiceTotals {
        doc.totals(self.rounding)
    }

    fn header(&self, doc: &InvoiceDocument) -> Header {
        Header {
            issuer_name: self.issuer_name.clone(),
            logo_url: self.logo_url.clone(),
            company_name: doc.profile.company_name.clone(),
            company_address: doc.profile.company_address.clone(),
            account_id: doc.account_id.clone(),
            invoice_code: doc.profile.invoice_code.clone(),
            invoice_date: display_date(doc.invoice_date),
            due_date: display_date(doc.due_date),
            period_start: display_date(doc.period_start),
            period_end: display_date(doc.period_end),
        }
    }

    fn format_total(&self, value: Decimal) -> String {
        match self.rounding {
            TotalRounding::Whole => format_decimal(value, 0),
            TotalRounding::Cents => format_decimal(value, 2),
        }
    }
}

fn display_date(date: NaiveDate) -> String {
    date.format(DISPLAY_DATE).to_string()
}

/// Fixed decimal places with `,` grouping on the integer part.
pub fn format_decimal(value: Decimal, places: u32) -> String {
    let text = format!("{:.*}", places as usize, value.round_dp(places));
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}
