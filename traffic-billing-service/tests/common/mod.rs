#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::multipart;
use rust_xlsxwriter::Workbook;
use service_core::error::AppError;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use traffic_billing_service::config::TrafficBillingConfig;
use traffic_billing_service::services::PdfConverter;
use traffic_billing_service::startup::Application;

/// Stands in for wkhtmltopdf: keeps every HTML page it was handed and
/// returns a small PDF-looking payload.
#[derive(Default)]
pub struct RecordingConverter {
    pages: Mutex<Vec<String>>,
}

impl RecordingConverter {
    pub fn pages(&self) -> Vec<String> {
        self.pages.lock().unwrap().clone()
    }
}

#[async_trait]
impl PdfConverter for RecordingConverter {
    async fn convert(&self, html: &str) -> Result<Vec<u8>, AppError> {
        self.pages.lock().unwrap().push(html.to_string());
        Ok(format!("%PDF-1.4\n% {} bytes of html\n", html.len()).into_bytes())
    }
}

pub struct FailingConverter;

#[async_trait]
impl PdfConverter for FailingConverter {
    async fn convert(&self, _html: &str) -> Result<Vec<u8>, AppError> {
        Err(AppError::BadGateway("wkhtmltopdf exited with status 1".to_string()))
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub output_dir: PathBuf,
    pub converter: Arc<RecordingConverter>,
    pub client: reqwest::Client,
    _dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}, None).await
    }

    /// Spawns on a random port with its own output directory. `customize`
    /// runs on the loaded configuration before the app is built.
    pub async fn spawn_with(
        customize: impl FnOnce(&mut TrafficBillingConfig),
        converter: Option<Arc<dyn PdfConverter>>,
    ) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let output_dir = dir.path().join("invoices");

        let mut config = TrafficBillingConfig::load().expect("Failed to load configuration");
        config.common.port = 0;
        config.server.host = "127.0.0.1".to_string();
        config.storage.output_dir = output_dir.to_string_lossy().to_string();
        customize(&mut config);

        let recording = Arc::new(RecordingConverter::default());
        let converter = converter.unwrap_or_else(|| recording.clone() as Arc<dyn PdfConverter>);

        let app = Application::build_with(config, converter)
            .await
            .expect("Failed to build test application");
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client.get(format!("{}/health", address)).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            output_dir,
            converter: recording,
            client,
            _dir: dir,
        }
    }

    pub fn output_file(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.output_file(name).exists()
    }

    pub async fn post_run(&self, path: &str, form: multipart::Form) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request")
    }
}

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub fn run_form(invoice_date: &str, directory: Vec<u8>, traffic: Vec<u8>) -> multipart::Form {
    multipart::Form::new()
        .text("invoice_date", invoice_date.to_string())
        .part("directory", xlsx_part(directory, "directory.xlsx"))
        .part("traffic", xlsx_part(traffic, "traffic.xlsx"))
}

pub fn xlsx_part(data: Vec<u8>, file_name: &str) -> multipart::Part {
    multipart::Part::bytes(data)
        .file_name(file_name.to_string())
        .mime_str(XLSX_MIME)
        .unwrap()
}

/// `[account_id, company name, address, invoice account, BU]`
pub fn directory_workbook(rows: &[[&str; 5]]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let headers = ["account_id", "Company Name", "Company Address", "invoice account", "BU"];
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    for (i, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            if !value.is_empty() {
                sheet.write_string(i as u32 + 1, col as u16, *value).unwrap();
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

pub struct Traffic<'a> {
    pub account_id: &'a str,
    pub begin: &'a str,
    pub end: &'a str,
    pub area: &'a str,
    pub duration_secs: f64,
    pub charges: &'a str,
}

pub fn traffic_workbook(rows: &[Traffic<'_>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let headers = [
        "Account id",
        "Begin time",
        "End time",
        "Area name",
        "Total duration",
        "Call charges",
    ];
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    for (i, row) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        sheet.write_string(r, 0, row.account_id).unwrap();
        sheet.write_string(r, 1, row.begin).unwrap();
        sheet.write_string(r, 2, row.end).unwrap();
        sheet.write_string(r, 3, row.area).unwrap();
        sheet.write_number(r, 4, row.duration_secs).unwrap();
        sheet.write_string(r, 5, row.charges).unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

/// Two tagged accounts plus traffic for an account the directory lacks.
pub fn standard_directory() -> Vec<u8> {
    directory_workbook(&[
        ["A100", "Acme Telecom", "1 Main St", "INV-A100", "Malaysia"],
        ["B200", "Beta Voice", "2 Side St", "INV-B200", "USA"],
    ])
}

pub fn standard_traffic() -> Vec<u8> {
    traffic_workbook(&[
        Traffic {
            account_id: "A100",
            begin: "2023-12-01",
            end: "2023-12-05",
            area: "Kuala Lumpur",
            duration_secs: 600.0,
            charges: "1,200.50",
        },
        Traffic {
            account_id: "A100",
            begin: "2023-12-01",
            end: "2023-12-05",
            area: "Penang",
            duration_secs: 90.0,
            charges: "3.00",
        },
        Traffic {
            account_id: "B200",
            begin: "2023-12-01",
            end: "2023-12-31",
            area: "New York",
            duration_secs: 1200.0,
            charges: "250.75",
        },
        Traffic {
            account_id: "C300",
            begin: "2023-12-01",
            end: "2023-12-05",
            area: "Johor",
            duration_secs: 60.0,
            charges: "1.00",
        },
    ])
}
