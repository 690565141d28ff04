use crate::config::TrafficBillingConfig;
use crate::models::{BillingMode, GeneratedInvoice, InvoiceDocument, RunReport};
use crate::services::aggregator::{aggregate, read_traffic};
use crate::services::directory::load_directory;
use crate::services::ledger::{entry_for, LedgerSession, LedgerStore};
use crate::services::pdf::PdfConverter;
use crate::services::renderer::InvoiceRenderer;
use crate::services::spreadsheet::render_spreadsheet;
use crate::services::storage::Storage;
use chrono::NaiveDate;
use metrics::counter;
use service_core::error::AppError;
use std::sync::Arc;

/// Everything one invoice run needs from the operator.
#[derive(Debug)]
pub struct RunRequest {
    pub directory: Vec<u8>,
    pub traffic: Vec<u8>,
    pub invoice_date: NaiveDate,
    /// Selector applied to profiles without a business-unit tag.
    pub business_unit: Option<BillingMode>,
    /// Recorded as the ledger's "Date Produced".
    pub produced_on: NaiveDate,
}

/// read → aggregate → render → write, one invoice at a time.
pub struct BillingPipeline {
    config: Arc<TrafficBillingConfig>,
    storage: Arc<dyn Storage>,
    converter: Arc<dyn PdfConverter>,
    renderer: InvoiceRenderer,
    ledger: Option<LedgerStore>,
}

impl BillingPipeline {
    pub fn new(
        config: Arc<TrafficBillingConfig>,
        storage: Arc<dyn Storage>,
        converter: Arc<dyn PdfConverter>,
    ) -> Result<Self, AppError> {
        let renderer = InvoiceRenderer::new(
            config.billing.issuer_name.clone(),
            config.billing.logo_url.clone(),
            config.billing.total_rounding,
        );
        let ledger = if config.ledger.enabled {
            Some(LedgerStore::new(storage.clone(), config.ledger.clone())?)
        } else {
            None
        };

        Ok(Self {
            config,
            storage,
            converter,
            renderer,
            ledger,
        })
    }

    /// Runs one invoice batch. Input errors abort before anything is
    /// written; a later failure leaves already written documents in place
    /// and does not update the ledger.
    #[tracing::instrument(skip_all, fields(invoice_date = %request.invoice_date))]
    pub async fn run(&self, request: RunRequest) -> Result<RunReport, AppError> {
        let directory = load_directory(request.directory)?;
        let rows = read_traffic(request.traffic)?;
        let aggregation = aggregate(
            &rows,
            &directory,
            request.invoice_date,
            request.business_unit,
            &self.config.billing,
        );

        counter!("billing_missing_accounts_total").increment(aggregation.missing_accounts.len() as u64);

        let mut report = RunReport {
            missing_accounts: aggregation.missing_accounts,
            missing_company_names: directory.missing_company_names.clone(),
            incomplete_profiles: directory.incomplete_profiles.clone(),
            unknown_business_units: aggregation.unknown_business_units,
            ..RunReport::default()
        };

        let mut session = match &self.ledger {
            Some(store) => Some(store.acquire().await?),
            None => None,
        };

        for doc in &aggregation.invoices {
            let generated = self.produce(doc, request.produced_on, session.as_mut()).await?;
            report.invoices.push(generated);
        }

        if let Some(session) = session {
            report.ledger_added = session.added();
            report.ledger_skipped = session.skipped();
            counter!("billing_ledger_entries_total", "outcome" => "added")
                .increment(session.added() as u64);
            counter!("billing_ledger_entries_total", "outcome" => "skipped")
                .increment(session.skipped() as u64);
            session.commit().await?;
            report.ledger_file = self.ledger.as_ref().map(|s| s.file_name().to_string());
        }

        tracing::info!(
            invoices = report.invoices.len(),
            missing_accounts = report.missing_accounts.len(),
            ledger_added = report.ledger_added,
            ledger_skipped = report.ledger_skipped,
            "Invoice run completed"
        );

        Ok(report)
    }

    async fn produce(
        &self,
        doc: &InvoiceDocument,
        produced_on: NaiveDate,
        session: Option<&mut LedgerSession<'_>>,
    ) -> Result<GeneratedInvoice, AppError> {
        let totals = self.renderer.totals(doc);

        let html = self.renderer.render_html(doc)?;
        let pdf = self.converter.convert(&html).await?;
        let pdf_name = doc.pdf_name();
        self.storage.upload(&pdf_name, pdf).await?;

        let spreadsheet = if self.config.billing.spreadsheet_output {
            let name = doc.spreadsheet_name();
            self.storage
                .upload(&name, render_spreadsheet(doc, &totals)?)
                .await?;
            Some(name)
        } else {
            None
        };

        let ledger_recorded = match session {
            Some(session) => session.record(doc.mode(), entry_for(doc, &totals, produced_on)),
            None => false,
        };

        counter!("billing_invoices_generated_total", "mode" => doc.mode().as_str()).increment(1);
        tracing::info!(
            account_id = %doc.account_id,
            period_start = %doc.period_start,
            period_end = %doc.period_end,
            mode = doc.mode().as_str(),
            file = %pdf_name,
            "Invoice written"
        );

        Ok(GeneratedInvoice {
            account_id: doc.account_id.clone(),
            period_start: doc.period_start,
            period_end: doc.period_end,
            mode: doc.mode(),
            pdf: pdf_name,
            spreadsheet,
            ledger_recorded,
        })
    }
}
