//! XLSX companion to the PDF invoice.

use crate::models::{InvoiceDocument, InvoiceTotals, LineItems};
use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{
    ExcelDateTime, Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError,
};
use service_core::error::AppError;

const AMOUNT_FORMAT: &str = "#,##0.00";
const RATE_FORMAT: &str = "0.0000";
const DATE_FORMAT: &str = "dd-mmm-yyyy";

struct Formats {
    title: Format,
    label: Format,
    date: Format,
    header: Format,
    text: Format,
    amount: Format,
    rate: Format,
    total_label: Format,
    total_amount: Format,
}

impl Formats {
    fn new() -> Self {
        let cell = Format::new().set_border(FormatBorder::Thin);
        Self {
            title: Format::new().set_bold().set_font_size(16),
            label: Format::new().set_bold(),
            date: Format::new()
                .set_num_format(DATE_FORMAT)
                .set_align(FormatAlign::Left),
            header: cell
                .clone()
                .set_bold()
                .set_background_color("#D9D9D9")
                .set_align(FormatAlign::Center),
            text: cell.clone(),
            amount: cell.clone().set_num_format(AMOUNT_FORMAT),
            rate: cell.clone().set_num_format(RATE_FORMAT),
            total_label: cell.clone().set_bold(),
            total_amount: cell.set_bold().set_num_format(AMOUNT_FORMAT),
        }
    }
}

/// Renders one invoice as a single-sheet workbook: title, metadata block,
/// bordered item table and a totals row.
pub fn render_spreadsheet(doc: &InvoiceDocument, totals: &InvoiceTotals) -> Result<Vec<u8>, AppError> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet().set_name("Invoice").map_err(xlsx_error)?;

    sheet
        .write_string_with_format(0, 0, format!("Invoice {}", doc.profile.invoice_code), &formats.title)
        .map_err(xlsx_error)?;

    let text_rows: [(&str, &str); 4] = [
        ("Bill To", doc.profile.company_name.as_str()),
        ("Address", doc.profile.company_address.as_str()),
        ("Account ID", doc.account_id.as_str()),
        ("Invoice Code", doc.profile.invoice_code.as_str()),
    ];
    let mut row: u32 = 2;
    for (label, value) in text_rows {
        sheet.write_string_with_format(row, 0, label, &formats.label).map_err(xlsx_error)?;
        sheet.write_string(row, 1, value).map_err(xlsx_error)?;
        row += 1;
    }

    let date_rows = [
        ("Invoice Date", doc.invoice_date),
        ("Due Date", doc.due_date),
        ("Period Start", doc.period_start),
        ("Period End", doc.period_end),
    ];
    for (label, date) in date_rows {
        sheet.write_string_with_format(row, 0, label, &formats.label).map_err(xlsx_error)?;
        write_date(sheet, row, 1, date, &formats.date)?;
        row += 1;
    }

    row += 1;
    match &doc.lines {
        LineItems::MinutesBased(lines) => {
            let headers = ["No.", "Area Name", "Quality", "Minutes", "Rate", "Amount"];
            write_headers(sheet, row, &headers, &formats.header)?;
            row += 1;

            for (i, line) in lines.iter().enumerate() {
                sheet
                    .write_number_with_format(row, 0, (i + 1) as f64, &formats.text)
                    .map_err(xlsx_error)?;
                sheet
                    .write_string_with_format(row, 1, &line.area_name, &formats.text)
                    .map_err(xlsx_error)?;
                sheet
                    .write_string_with_format(row, 2, line.quality.as_deref().unwrap_or(""), &formats.text)
                    .map_err(xlsx_error)?;
                sheet
                    .write_number_with_format(row, 3, to_f64(line.minutes), &formats.amount)
                    .map_err(xlsx_error)?;
                match line.rate {
                    Some(rate) => sheet.write_number_with_format(row, 4, to_f64(rate), &formats.rate),
                    None => sheet.write_string_with_format(row, 4, "N/A", &formats.text),
                }
                .map_err(xlsx_error)?;
                sheet
                    .write_number_with_format(row, 5, to_f64(line.amount), &formats.amount)
                    .map_err(xlsx_error)?;
                row += 1;
            }

            sheet
                .merge_range(row, 0, row, 2, "Total", &formats.total_label)
                .map_err(xlsx_error)?;
            sheet
                .write_number_with_format(
                    row,
                    3,
                    to_f64(totals.minutes.unwrap_or_default()),
                    &formats.total_amount,
                )
                .map_err(xlsx_error)?;
            sheet.write_blank(row, 4, &formats.total_label).map_err(xlsx_error)?;
            sheet
                .write_number_with_format(row, 5, to_f64(totals.amount), &formats.total_amount)
                .map_err(xlsx_error)?;

            set_widths(sheet, &[14.0, 28.0, 12.0, 14.0, 12.0, 16.0])?;
        }
        LineItems::AmountOnly(lines) => {
            let headers = ["No.", "Description", "Amount"];
            write_headers(sheet, row, &headers, &formats.header)?;
            row += 1;

            for (i, line) in lines.iter().enumerate() {
                sheet
                    .write_number_with_format(row, 0, (i + 1) as f64, &formats.text)
                    .map_err(xlsx_error)?;
                sheet
                    .write_string_with_format(row, 1, &line.area_name, &formats.text)
                    .map_err(xlsx_error)?;
                sheet
                    .write_number_with_format(row, 2, to_f64(line.amount), &formats.amount)
                    .map_err(xlsx_error)?;
                row += 1;
            }

            sheet
                .merge_range(row, 0, row, 1, "Total", &formats.total_label)
                .map_err(xlsx_error)?;
            sheet
                .write_number_with_format(row, 2, to_f64(totals.amount), &formats.total_amount)
                .map_err(xlsx_error)?;

            set_widths(sheet, &[14.0, 36.0, 16.0])?;
        }
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

fn write_headers(sheet: &mut Worksheet, row: u32, headers: &[&str], format: &Format) -> Result<(), AppError> {
    for (col, header) in headers.iter().enumerate() {
        sheet
            .write_string_with_format(row, col as u16, *header, format)
            .map_err(xlsx_error)?;
    }
    Ok(())
}

fn write_date(sheet: &mut Worksheet, row: u32, col: u16, date: NaiveDate, format: &Format) -> Result<(), AppError> {
    let value = ExcelDateTime::from_ymd(date.year() as u16, date.month() as u8, date.day() as u8)
        .map_err(xlsx_error)?;
    sheet
        .write_datetime_with_format(row, col, &value, format)
        .map_err(xlsx_error)?;
    Ok(())
}

fn set_widths(sheet: &mut Worksheet, widths: &[f64]) -> Result<(), AppError> {
    for (col, width) in widths.iter().enumerate() {
        sheet.set_column_width(col as u16, *width).map_err(xlsx_error)?;
    }
    Ok(())
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

fn xlsx_error(e: XlsxError) -> AppError {
    AppError::InternalError(anyhow::anyhow!("Failed to write invoice spreadsheet: {}", e))
}
