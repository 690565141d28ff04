use crate::models::{BillingMode, TotalRounding};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct TrafficBillingConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub ledger: LedgerConfig,
    pub billing: BillingConfig,
    pub pdf: PdfConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory rendered invoices and the ledger workbook are written to.
    pub output_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub enabled: bool,
    pub file_name: String,
    pub minutes_sheet: String,
    pub amount_sheet: String,
    /// Also require equal total charges before treating an entry as a duplicate.
    pub match_on_charges: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Business-unit tags billed on minutes of use.
    pub minutes_units: Vec<String>,
    /// Business-unit tags billed on amount only.
    pub amount_units: Vec<String>,
    /// Mode for profiles without a tag when the request names none either.
    pub default_mode: BillingMode,
    pub total_rounding: TotalRounding,
    pub spreadsheet_output: bool,
    pub issuer_name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PdfConfig {
    pub wkhtmltopdf_path: String,
    pub timeout_secs: u64,
}

impl TrafficBillingConfig {
    pub fn load() -> Result<Self, AppError> {
        let builder = config::Config::builder()
            .set_default("port", 8080)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.max_upload_bytes", 20 * 1024 * 1024)?
            .set_default("storage.output_dir", "invoices")?
            .set_default("ledger.enabled", true)?
            .set_default("ledger.file_name", "log.xlsx")?
            .set_default("ledger.minutes_sheet", "Malaysia")?
            .set_default("ledger.amount_sheet", "USA")?
            .set_default("ledger.match_on_charges", false)?
            .set_default("billing.minutes_units", vec!["Malaysia"])?
            .set_default("billing.amount_units", vec!["USA"])?
            .set_default("billing.default_mode", "minutes_based")?
            .set_default("billing.total_rounding", "whole")?
            .set_default("billing.spreadsheet_output", true)?
            .set_default("billing.issuer_name", "Billing")?
            .set_default("pdf.wkhtmltopdf_path", "wkhtmltopdf")?
            .set_default("pdf.timeout_secs", 60)?;

        core_config::load_layered(builder, &["billing.minutes_units", "billing.amount_units"])
    }
}

impl BillingConfig {
    /// Maps a business-unit tag to its billing mode, ignoring case and
    /// surrounding whitespace.
    pub fn mode_for_tag(&self, tag: &str) -> Option<BillingMode> {
        let tag = tag.trim();
        let matches = |units: &[String]| units.iter().any(|u| u.trim().eq_ignore_ascii_case(tag));

        if matches(&self.minutes_units) {
            Some(BillingMode::MinutesBased)
        } else if matches(&self.amount_units) {
            Some(BillingMode::AmountOnly)
        } else {
            None
        }
    }
}

impl LedgerConfig {
    pub fn sheet_for(&self, mode: BillingMode) -> &str {
        match mode {
            BillingMode::MinutesBased => &self.minutes_sheet,
            BillingMode::AmountOnly => &self.amount_sheet,
        }
    }
}
