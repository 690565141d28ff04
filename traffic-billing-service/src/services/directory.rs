//! Customer directory loader.
//!
//! Builds the account → billing profile map for a run. The loader is
//! tolerant: a row with a blank required field is excluded and reported, it
//! never aborts the run. Only a missing column is fatal.

use crate::models::{BillingProfile, Directory, IncompleteProfile};
use crate::services::sheet::{cell, cell_text, SheetTable};
use service_core::error::AppError;

const ACCOUNT_ID: &[&str] = &["account_id", "account id"];
const COMPANY_NAME: &[&str] = &["Company Name"];
const COMPANY_ADDRESS: &[&str] = &["Company Address"];
const INVOICE_CODE: &[&str] = &["invoice account", "invoice account code"];
const BUSINESS_UNIT: &[&str] = &["BU", "business unit"];

pub fn load_directory(bytes: Vec<u8>) -> Result<Directory, AppError> {
    let table = SheetTable::from_upload(bytes, "customer directory")?;
    directory_from_table(&table)
}

pub fn directory_from_table(table: &SheetTable) -> Result<Directory, AppError> {
    let account_col = Some(table.require_column(ACCOUNT_ID)?);
    let name_col = Some(table.require_column(COMPANY_NAME)?);
    let address_col = Some(table.require_column(COMPANY_ADDRESS)?);
    let code_col = Some(table.require_column(INVOICE_CODE)?);
    let unit_col = table.column(BUSINESS_UNIT);

    let mut directory = Directory::default();

    for (row_number, row) in table.rows() {
        let Some(account_id) = cell_text(cell(row, account_col)) else {
            tracing::debug!(row = row_number, "Skipping directory row without account id");
            continue;
        };

        let Some(company_name) = cell_text(cell(row, name_col)) else {
            tracing::warn!(account_id = %account_id, row = row_number, "Directory row has no company name");
            directory.missing_company_names.push(account_id);
            continue;
        };

        let company_address = cell_text(cell(row, address_col));
        let invoice_code = cell_text(cell(row, code_col));
        let (Some(company_address), Some(invoice_code)) = (company_address, invoice_code) else {
            let field = if cell_text(cell(row, address_col)).is_none() {
                "Company Address"
            } else {
                "invoice account"
            };
            tracing::warn!(account_id = %account_id, row = row_number, field, "Directory row is incomplete");
            directory
                .incomplete_profiles
                .push(IncompleteProfile { account_id, field });
            continue;
        };

        directory.insert(BillingProfile {
            account_id,
            company_name,
            company_address,
            invoice_code,
            business_unit: cell_text(cell(row, unit_col)),
        });
    }

    tracing::info!(
        profiles = directory.len(),
        missing_company_names = directory.missing_company_names.len(),
        incomplete = directory.incomplete_profiles.len(),
        "Customer directory loaded"
    );

    Ok(directory)
}
