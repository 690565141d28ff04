//! Traffic aggregation: rows → one invoice per account and billing period.

use crate::config::BillingConfig;
use crate::models::{
    AmountLine, BillingMode, Directory, InvoiceDocument, LineItems, MinutesLine, TrafficGroupKey,
    TrafficRow,
};
use crate::services::sheet::{cell, cell_date, cell_decimal, cell_text, SheetTable};
use calamine::Data;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;

const ACCOUNT_ID: &[&str] = &["Account id", "account_id"];
const BEGIN_TIME: &[&str] = &["Begin time"];
const END_TIME: &[&str] = &["End time"];
const AREA_NAME: &[&str] = &["Area name"];
const DURATION: &[&str] = &["Total duration"];
const CHARGES: &[&str] = &["Call charges", "Total charges"];
const QUALITY: &[&str] = &["quality"];

/// Invoices ready to render, in the order their groups first appear in the
/// traffic sheet, plus the accounts that could not be billed.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub invoices: Vec<InvoiceDocument>,
    pub missing_accounts: Vec<String>,
    pub unknown_business_units: Vec<String>,
}

pub fn read_traffic(bytes: Vec<u8>) -> Result<Vec<TrafficRow>, AppError> {
    let table = SheetTable::from_upload(bytes, "traffic sheet")?;
    traffic_from_table(&table)
}

/// Parses every data row. Any malformed value aborts with the row number and
/// column so the operator can fix the export. Rows without an account id
/// (blank lines, footer totals) are skipped.
pub fn traffic_from_table(table: &SheetTable) -> Result<Vec<TrafficRow>, AppError> {
    let account_col = table.require_column(ACCOUNT_ID)?;
    let begin_col = table.require_column(BEGIN_TIME)?;
    let end_col = table.require_column(END_TIME)?;
    let area_col = table.require_column(AREA_NAME)?;
    let duration_col = table.require_column(DURATION)?;
    let charges_col = table.require_column(CHARGES)?;
    let quality_col = table.column(QUALITY);

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (row_number, row) in table.rows() {
        let Some(account_id) = cell_text(cell(row, Some(account_col))) else {
            if row.iter().any(|c| !matches!(c, Data::Empty)) {
                tracing::warn!(row = row_number, "Traffic row has no account id, skipping");
                skipped += 1;
            }
            continue;
        };

        let period_start = required(
            cell_date(cell(row, Some(begin_col))),
            table,
            row_number,
            begin_col,
        )?;
        let period_end = required(
            cell_date(cell(row, Some(end_col))),
            table,
            row_number,
            end_col,
        )?;
        let duration_secs = required(
            cell_decimal(cell(row, Some(duration_col))),
            table,
            row_number,
            duration_col,
        )?;
        let charges = required(
            cell_decimal(cell(row, Some(charges_col))),
            table,
            row_number,
            charges_col,
        )?;

        rows.push(TrafficRow {
            account_id,
            period_start,
            period_end,
            area_name: cell_text(cell(row, Some(area_col))).unwrap_or_default(),
            duration_secs,
            charges,
            quality: cell_text(cell(row, quality_col)),
        });
    }

    tracing::info!(rows = rows.len(), skipped, "Traffic sheet parsed");
    Ok(rows)
}

fn required<T>(
    value: Result<Option<T>, String>,
    table: &SheetTable,
    row_number: usize,
    col: usize,
) -> Result<T, AppError> {
    match value {
        Ok(Some(v)) => Ok(v),
        Ok(None) => Err(row_error(table, row_number, col, "value is blank")),
        Err(reason) => Err(row_error(table, row_number, col, &reason)),
    }
}

fn row_error(table: &SheetTable, row_number: usize, col: usize, reason: &str) -> AppError {
    AppError::bad_request(format!(
        "{} row {}, column '{}': {}",
        table.label(),
        row_number,
        table.header(col),
        reason
    ))
}

/// Groups rows by (account, period start, period end) and turns each group
/// into an invoice.
///
/// `requested_mode` is the operator's selector from the upload form; it only
/// applies to profiles without a business-unit tag.
pub fn aggregate(
    rows: &[TrafficRow],
    directory: &Directory,
    invoice_date: NaiveDate,
    requested_mode: Option<BillingMode>,
    billing: &BillingConfig,
) -> Aggregation {
    let mut order: Vec<TrafficGroupKey> = Vec::new();
    let mut groups: HashMap<TrafficGroupKey, Vec<&TrafficRow>> = HashMap::new();
    for row in rows {
        let key = row.group_key();
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row);
    }

    let mut aggregation = Aggregation::default();

    for key in order {
        let group = &groups[&key];

        let Some(profile) = directory.get(&key.account_id) else {
            tracing::warn!(account_id = %key.account_id, "No billing profile for traffic account");
            if !aggregation.missing_accounts.contains(&key.account_id) {
                aggregation.missing_accounts.push(key.account_id.clone());
            }
            continue;
        };

        let mode = match &profile.business_unit {
            Some(tag) => billing.mode_for_tag(tag),
            None => Some(requested_mode.unwrap_or(billing.default_mode)),
        };
        let Some(mode) = mode else {
            tracing::warn!(
                account_id = %key.account_id,
                business_unit = ?profile.business_unit,
                "Business unit maps to no billing mode"
            );
            if !aggregation.unknown_business_units.contains(&key.account_id) {
                aggregation.unknown_business_units.push(key.account_id.clone());
            }
            continue;
        };

        let lines = match mode {
            BillingMode::MinutesBased => {
                LineItems::MinutesBased(group.iter().map(|row| minutes_line(row)).collect())
            }
            BillingMode::AmountOnly => {
                LineItems::AmountOnly(group.iter().map(|row| amount_line(row)).collect())
            }
        };

        tracing::debug!(
            account_id = %key.account_id,
            period_start = %key.period_start,
            period_end = %key.period_end,
            mode = mode.as_str(),
            items = lines.len(),
            "Traffic group aggregated"
        );

        aggregation.invoices.push(InvoiceDocument {
            invoice_date,
            due_date: InvoiceDocument::due_date_for(invoice_date, key.period_start, key.period_end),
            account_id: key.account_id.clone(),
            period_start: key.period_start,
            period_end: key.period_end,
            lines,
            profile: profile.clone(),
        });
    }

    aggregation
}

/// Minutes rounded to two places; the rate is computed from those rounded
/// minutes, matching what the invoice shows.
fn minutes_line(row: &TrafficRow) -> MinutesLine {
    let minutes = (row.duration_secs / Decimal::from(60)).round_dp(2);
    let rate = if minutes.is_zero() {
        None
    } else {
        row.charges.checked_div(minutes).map(|r| r.round_dp(4))
    };

    MinutesLine {
        area_name: row.area_name.clone(),
        minutes,
        rate,
        quality: row.quality.clone(),
        amount: row.charges.round_dp(2),
    }
}

fn amount_line(row: &TrafficRow) -> AmountLine {
    AmountLine {
        area_name: row.area_name.clone(),
        amount: row.charges.round_dp(2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingProfile, TotalRounding};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn billing() -> BillingConfig {
        BillingConfig {
            minutes_units: vec!["Malaysia".to_string()],
            amount_units: vec!["USA".to_string()],
            default_mode: BillingMode::MinutesBased,
            total_rounding: TotalRounding::Whole,
            spreadsheet_output: false,
            issuer_name: "Billing".to_string(),
            logo_url: None,
        }
    }

    fn profile(account_id: &str, unit: Option<&str>) -> BillingProfile {
        BillingProfile {
            account_id: account_id.to_string(),
            company_name: format!("{} Ltd", account_id),
            company_address: "1 Main St".to_string(),
            invoice_code: format!("INV-{}", account_id),
            business_unit: unit.map(str::to_string),
        }
    }

    fn row(account_id: &str, start: NaiveDate, end: NaiveDate, secs: Decimal, charges: Decimal) -> TrafficRow {
        TrafficRow {
            account_id: account_id.to_string(),
            period_start: start,
            period_end: end,
            area_name: "Kuala Lumpur".to_string(),
            duration_secs: secs,
            charges,
            quality: None,
        }
    }

    #[test]
    fn minutes_mode_derives_minutes_rate_and_amount() {
        let mut directory = Directory::default();
        directory.insert(profile("A100", Some("Malaysia")));
        let rows = vec![row("A100", date(2023, 12, 1), date(2023, 12, 6), dec!(600), dec!(1200.50))];

        let aggregation = aggregate(&rows, &directory, date(2024, 1, 1), None, &billing());

        assert_eq!(aggregation.invoices.len(), 1);
        let invoice = &aggregation.invoices[0];
        assert_eq!(invoice.due_date, date(2024, 1, 8));
        let LineItems::MinutesBased(lines) = &invoice.lines else {
            panic!("expected minutes-based lines");
        };
        assert_eq!(lines[0].minutes, dec!(10.00));
        assert_eq!(lines[0].rate_display(), "120.0500");
        assert_eq!(lines[0].amount, dec!(1200.50));
    }

    #[test]
    fn amount_mode_carries_only_amounts() {
        let mut directory = Directory::default();
        directory.insert(profile("U1", Some("USA")));
        let rows = vec![row("U1", date(2024, 1, 1), date(2024, 1, 31), dec!(90), dec!(10.005))];

        let aggregation = aggregate(&rows, &directory, date(2024, 2, 1), None, &billing());

        let invoice = &aggregation.invoices[0];
        assert_eq!(invoice.due_date, date(2024, 2, 16));
        assert_eq!(
            invoice.lines,
            LineItems::AmountOnly(vec![AmountLine {
                area_name: "Kuala Lumpur".to_string(),
                amount: dec!(10.00),
            }])
        );
    }

    #[test]
    fn rows_group_by_account_and_period_in_first_seen_order() {
        let mut directory = Directory::default();
        directory.insert(profile("B", None));
        directory.insert(profile("A", None));
        let jan = (date(2024, 1, 1), date(2024, 1, 31));
        let feb = (date(2024, 2, 1), date(2024, 2, 29));
        let rows = vec![
            row("B", jan.0, jan.1, dec!(60), dec!(1)),
            row("A", jan.0, jan.1, dec!(60), dec!(1)),
            row("B", jan.0, jan.1, dec!(120), dec!(2)),
            row("B", feb.0, feb.1, dec!(60), dec!(1)),
            row("A", jan.0, jan.1, dec!(180), dec!(3)),
        ];

        let aggregation = aggregate(&rows, &directory, date(2024, 3, 1), None, &billing());

        let summary: Vec<(&str, NaiveDate, usize)> = aggregation
            .invoices
            .iter()
            .map(|i| (i.account_id.as_str(), i.period_start, i.lines.len()))
            .collect();
        assert_eq!(
            summary,
            vec![("B", jan.0, 2), ("A", jan.0, 2), ("B", feb.0, 1)]
        );
    }

    #[test]
    fn unknown_accounts_produce_no_invoice() {
        let mut directory = Directory::default();
        directory.insert(profile("A", None));
        let period = (date(2024, 1, 1), date(2024, 1, 5));
        let rows = vec![
            row("ZZZ", period.0, period.1, dec!(60), dec!(1)),
            row("A", period.0, period.1, dec!(60), dec!(1)),
            row("ZZZ", date(2024, 2, 1), date(2024, 2, 5), dec!(60), dec!(1)),
        ];

        let aggregation = aggregate(&rows, &directory, date(2024, 3, 1), None, &billing());

        assert_eq!(aggregation.invoices.len(), 1);
        assert!(aggregation.invoices.iter().all(|i| i.account_id != "ZZZ"));
        assert_eq!(aggregation.missing_accounts, vec!["ZZZ".to_string()]);
    }

    #[test]
    fn untagged_profiles_follow_requested_mode() {
        let mut directory = Directory::default();
        directory.insert(profile("A", None));
        let rows = vec![row("A", date(2024, 1, 1), date(2024, 1, 5), dec!(60), dec!(1))];

        let aggregation = aggregate(
            &rows,
            &directory,
            date(2024, 3, 1),
            Some(BillingMode::AmountOnly),
            &billing(),
        );
        assert_eq!(aggregation.invoices[0].mode(), BillingMode::AmountOnly);

        let aggregation = aggregate(&rows, &directory, date(2024, 3, 1), None, &billing());
        assert_eq!(aggregation.invoices[0].mode(), BillingMode::MinutesBased);
    }

    #[test]
    fn unmapped_business_unit_is_reported() {
        let mut directory = Directory::default();
        directory.insert(profile("M", Some("Mars")));
        let rows = vec![row("M", date(2024, 1, 1), date(2024, 1, 5), dec!(60), dec!(1))];

        let aggregation = aggregate(&rows, &directory, date(2024, 3, 1), None, &billing());

        assert!(aggregation.invoices.is_empty());
        assert_eq!(aggregation.unknown_business_units, vec!["M".to_string()]);
    }

    #[test]
    fn zero_duration_has_no_rate() {
        let line = minutes_line(&row("A", date(2024, 1, 1), date(2024, 1, 5), dec!(0), dec!(5)));
        assert_eq!(line.minutes, dec!(0));
        assert_eq!(line.rate, None);
        assert_eq!(line.amount, dec!(5));
    }

    #[test]
    fn parses_traffic_rows_with_text_charges() {
        use calamine::Range;

        let headers = [
            "Account id", "Begin time", "End time", "Area name", "Total duration", "Call charges", "quality",
        ];
        let mut range = Range::new((0, 0), (2, 6));
        for (c, h) in headers.iter().enumerate() {
            range.set_value((0, c as u32), Data::String(h.to_string()));
        }
        let values = [
            Data::String("A100".into()),
            Data::String("2024-01-01".into()),
            Data::String("2024-01-05".into()),
            Data::String("Penang".into()),
            Data::Float(600.0),
            Data::String("1,200.50".into()),
            Data::String("HD".into()),
        ];
        for (c, v) in values.iter().enumerate() {
            range.set_value((1, c as u32), v.clone());
        }
        let table = SheetTable::from_range(&range, "traffic sheet");

        let rows = traffic_from_table(&table).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].charges, dec!(1200.50));
        assert_eq!(rows[0].quality.as_deref(), Some("HD"));
        assert_eq!(rows[0].period_end, date(2024, 1, 5));
    }

    #[test]
    fn non_numeric_charges_abort_with_row_number() {
        use calamine::Range;

        let headers = ["Account id", "Begin time", "End time", "Area name", "Total duration", "Total charges"];
        let mut range = Range::new((0, 0), (1, 5));
        for (c, h) in headers.iter().enumerate() {
            range.set_value((0, c as u32), Data::String(h.to_string()));
        }
        let values = [
            Data::String("A100".into()),
            Data::String("2024-01-01".into()),
            Data::String("2024-01-05".into()),
            Data::String("Penang".into()),
            Data::Float(600.0),
            Data::String("n/a".into()),
        ];
        for (c, v) in values.iter().enumerate() {
            range.set_value((1, c as u32), v.clone());
        }
        let table = SheetTable::from_range(&range, "traffic sheet");

        let err = traffic_from_table(&table).unwrap_err().to_string();
        assert!(err.contains("row 2"), "{}", err);
        assert!(err.contains("'Total charges'"), "{}", err);
    }

    #[test]
    fn rows_without_account_are_skipped() {
        use calamine::Range;

        let headers = ["Account id", "Begin time", "End time", "Area name", "Total duration", "Call charges"];
        let mut range = Range::new((0, 0), (3, 5));
        for (c, h) in headers.iter().enumerate() {
            range.set_value((0, c as u32), Data::String(h.to_string()));
        }
        let first = [
            Data::String("A100".into()),
            Data::String("2024-01-01".into()),
            Data::String("2024-01-05".into()),
            Data::String("Penang".into()),
            Data::Float(600.0),
            Data::Float(12.5),
        ];
        for (c, v) in first.iter().enumerate() {
            range.set_value((1, c as u32), v.clone());
        }
        // row 3 left empty, row 4 is a footer total
        range.set_value((3, 3), Data::String("Total".into()));
        range.set_value((3, 4), Data::Float(600.0));
        range.set_value((3, 5), Data::Float(12.5));
        let table = SheetTable::from_range(&range, "traffic sheet");

        let rows = traffic_from_table(&table).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].account_id, "A100");
    }
}
