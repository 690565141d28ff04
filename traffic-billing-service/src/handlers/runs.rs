use crate::config::BillingConfig;
use crate::models::{BillingMode, RunReport};
use crate::services::RunRequest;
use crate::startup::AppState;
use askama::Template;
use axum::{
    extract::{Multipart, State},
    response::IntoResponse,
    Json,
};
use chrono::{Local, NaiveDate};
use service_core::error::AppError;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub issuer_name: String,
    pub business_units: Vec<String>,
}

#[derive(Template)]
#[template(path = "run_report.html")]
pub struct RunReportTemplate {
    pub invoice_date: String,
    pub report: RunReport,
}

mod filters {
    /// Percent-encodes a file name for use as one URL path segment.
    pub fn path_segment<T: std::fmt::Display>(name: T) -> ::askama::Result<String> {
        Ok(urlencoding::encode(&name.to_string()).into_owned())
    }
}

pub async fn upload_page(State(state): State<AppState>) -> impl IntoResponse {
    let billing = &state.config.billing;
    IndexTemplate {
        issuer_name: billing.issuer_name.clone(),
        business_units: billing
            .minutes_units
            .iter()
            .chain(billing.amount_units.iter())
            .cloned()
            .collect(),
    }
}

/// Runs a batch and renders the download listing.
pub async fn create_run_page(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let request = read_run_request(multipart, &state.config.billing).await?;
    let invoice_date = request.invoice_date.format("%d-%b-%Y").to_string();
    let report = state.pipeline.run(request).await?;

    Ok(RunReportTemplate {
        invoice_date,
        report,
    })
}

/// Same intake as [`create_run_page`], answered with the report as JSON.
pub async fn create_run(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<RunReport>, AppError> {
    let request = read_run_request(multipart, &state.config.billing).await?;
    let report = state.pipeline.run(request).await?;
    Ok(Json(report))
}

/// Reads the form fields `invoice_date`, `directory` (or `excel1`),
/// `traffic` (or `excel2`) and the optional `business_unit`.
pub async fn read_run_request(
    mut multipart: Multipart,
    billing: &BillingConfig,
) -> Result<RunRequest, AppError> {
    let mut invoice_date: Option<String> = None;
    let mut directory: Option<Vec<u8>> = None;
    let mut traffic: Option<Vec<u8>> = None;
    let mut business_unit: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(format!("Failed to read field '{}': {}", name, e)))?;

        match name.as_str() {
            "invoice_date" => invoice_date = Some(text_field(&name, &data)?),
            "directory" | "excel1" => directory = Some(data.to_vec()),
            "traffic" | "excel2" => traffic = Some(data.to_vec()),
            "business_unit" => business_unit = Some(text_field(&name, &data)?),
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let invoice_date = invoice_date
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing field 'invoice_date'"))?;
    let invoice_date = NaiveDate::parse_from_str(&invoice_date, "%Y-%m-%d").map_err(|_| {
        AppError::bad_request(format!(
            "Field 'invoice_date' must be YYYY-MM-DD, got '{}'",
            invoice_date
        ))
    })?;

    let directory = directory
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing file 'directory'"))?;
    let traffic = traffic
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing file 'traffic'"))?;

    let business_unit = match business_unit.as_deref().filter(|v| !v.is_empty()) {
        None => None,
        Some(value) => Some(parse_mode(value, billing)?),
    };

    tracing::info!(
        invoice_date = %invoice_date,
        directory_bytes = directory.len(),
        traffic_bytes = traffic.len(),
        business_unit = business_unit.map(|m| m.as_str()),
        "Invoice run requested"
    );

    Ok(RunRequest {
        directory,
        traffic,
        invoice_date,
        business_unit,
        produced_on: Local::now().date_naive(),
    })
}

fn text_field(name: &str, data: &[u8]) -> Result<String, AppError> {
    std::str::from_utf8(data)
        .map(|s| s.trim().to_string())
        .map_err(|_| AppError::bad_request(format!("Field '{}' is not valid UTF-8", name)))
}

/// Accepts a mode name (`minutes_based`, `amount_only`) or a configured
/// business-unit tag.
fn parse_mode(value: &str, billing: &BillingConfig) -> Result<BillingMode, AppError> {
    BillingMode::all()
        .into_iter()
        .find(|mode| mode.as_str().eq_ignore_ascii_case(value))
        .or_else(|| billing.mode_for_tag(value))
        .ok_or_else(|| AppError::bad_request(format!("Unknown business unit '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TotalRounding;

    fn billing() -> BillingConfig {
        BillingConfig {
            minutes_units: vec!["Malaysia".to_string()],
            amount_units: vec!["USA".to_string()],
            default_mode: BillingMode::MinutesBased,
            total_rounding: TotalRounding::Whole,
            spreadsheet_output: true,
            issuer_name: "Billing".to_string(),
            logo_url: None,
        }
    }

    #[test]
    fn download_names_become_single_path_segments() {
        assert_eq!(
            filters::path_segment("R&D #7?%.pdf").unwrap(),
            "R%26D%20%237%3F%25.pdf"
        );
        assert_eq!(
            filters::path_segment("A100-01-Dec-23_to_05-Dec-23.pdf").unwrap(),
            "A100-01-Dec-23_to_05-Dec-23.pdf"
        );
    }

    #[test]
    fn mode_accepts_names_and_tags() {
        let billing = billing();
        assert_eq!(parse_mode("amount_only", &billing).unwrap(), BillingMode::AmountOnly);
        assert_eq!(parse_mode("Malaysia", &billing).unwrap(), BillingMode::MinutesBased);
        assert_eq!(parse_mode("usa", &billing).unwrap(), BillingMode::AmountOnly);
        assert!(matches!(parse_mode("Mars", &billing), Err(AppError::BadRequest(_))));
    }
}
