//! Duplicate-log ledger.
//!
//! A workbook with one sheet per billing mode listing every invoice already
//! produced. It is loaded whole at the start of a run, mutated in memory and
//! rewritten whole at the end. A matching row suppresses only the ledger
//! write; the invoice documents are always regenerated.

use crate::config::LedgerConfig;
use crate::models::{BillingMode, InvoiceDocument, InvoiceTotals, LedgerEntry};
use crate::services::sheet::{cell, cell_text, SheetTable};
use crate::services::storage::Storage;
use calamine::{open_workbook_auto_from_rs, Reader};
use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use service_core::error::AppError;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

const HEADERS: [&str; 7] = [
    "Account ID",
    "Begin Time",
    "End Time",
    "Invoice Date",
    "Date Produced",
    "Total Charges",
    "MOU",
];
const NOT_APPLICABLE: &str = "N/A";

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: HashMap<BillingMode, Vec<LedgerEntry>>,
    sheet_names: HashMap<BillingMode, String>,
}

impl Ledger {
    pub fn empty(config: &LedgerConfig) -> Self {
        Self {
            entries: HashMap::new(),
            sheet_names: BillingMode::all()
                .into_iter()
                .map(|mode| (mode, config.sheet_for(mode).to_string()))
                .collect(),
        }
    }

    /// Loads every mode's sheet. A sheet that is not in the workbook yields
    /// an empty list for that mode.
    pub fn from_workbook(bytes: Vec<u8>, config: &LedgerConfig) -> Result<Self, AppError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Ledger workbook is unreadable: {}", e))
        })?;
        let available = workbook.sheet_names();
        let mut ledger = Self::empty(config);

        for mode in BillingMode::all() {
            let sheet = config.sheet_for(mode);
            if !available.iter().any(|name| name == sheet) {
                continue;
            }
            let range = workbook.worksheet_range(sheet).map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("Failed to read ledger sheet {}: {}", sheet, e))
            })?;
            let table = SheetTable::from_range(&range, sheet);
            let entries = entries_from_table(&table)?;
            tracing::debug!(sheet, entries = entries.len(), "Ledger sheet loaded");
            ledger.entries.insert(mode, entries);
        }

        Ok(ledger)
    }

    pub fn entries(&self, mode: BillingMode) -> &[LedgerEntry] {
        self.entries.get(&mode).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, mode: BillingMode, candidate: &LedgerEntry, match_on_charges: bool) -> bool {
        self.entries(mode)
            .iter()
            .any(|existing| existing.is_duplicate_of(candidate, match_on_charges))
    }

    /// Appends `entry` unless an equivalent row is already present. Returns
    /// whether it was appended.
    pub fn record(&mut self, mode: BillingMode, entry: LedgerEntry, match_on_charges: bool) -> bool {
        if self.contains(mode, &entry, match_on_charges) {
            return false;
        }
        self.entries.entry(mode).or_default().push(entry);
        true
    }

    pub fn to_workbook(&self) -> Result<Vec<u8>, AppError> {
        let header_format = Format::new().set_bold();
        let mut workbook = Workbook::new();

        for mode in BillingMode::all() {
            let name = self
                .sheet_names
                .get(&mode)
                .map(String::as_str)
                .unwrap_or_else(|| mode.as_str());
            let sheet = workbook.add_worksheet().set_name(name).map_err(xlsx_error)?;

            for (col, header) in HEADERS.iter().enumerate() {
                sheet
                    .write_string_with_format(0, col as u16, *header, &header_format)
                    .map_err(xlsx_error)?;
            }

            for (i, entry) in self.entries(mode).iter().enumerate() {
                let row = (i + 1) as u32;
                let values = [
                    entry.account_id.as_str(),
                    entry.period_start.as_str(),
                    entry.period_end.as_str(),
                    entry.invoice_date.as_str(),
                    entry.date_produced.as_str(),
                    entry.total_charges.as_str(),
                    entry.minutes.as_deref().unwrap_or(NOT_APPLICABLE),
                ];
                for (col, value) in values.iter().enumerate() {
                    sheet.write_string(row, col as u16, *value).map_err(xlsx_error)?;
                }
            }

            sheet.set_column_width(0, 16).map_err(xlsx_error)?;
            for col in 1..HEADERS.len() as u16 {
                sheet.set_column_width(col, 14).map_err(xlsx_error)?;
            }
        }

        workbook.save_to_buffer().map_err(xlsx_error)
    }
}

fn entries_from_table(table: &SheetTable) -> Result<Vec<LedgerEntry>, AppError> {
    let cols = HEADERS
        .iter()
        .map(|h| table.column(&[*h]))
        .collect::<Vec<_>>();
    if cols[0].is_none() && !table.is_empty() {
        return Err(AppError::InternalError(anyhow::anyhow!(
            "Ledger sheet {} has no '{}' column",
            table.label(),
            HEADERS[0]
        )));
    }

    let text = |row: &[calamine::Data], i: usize| cell_text(cell(row, cols[i])).unwrap_or_default();

    Ok(table
        .rows()
        .filter_map(|(_, row)| {
            let account_id = cell_text(cell(row, cols[0]))?;
            let minutes = text(row, 6);
            Some(LedgerEntry {
                account_id,
                period_start: text(row, 1),
                period_end: text(row, 2),
                invoice_date: text(row, 3),
                date_produced: text(row, 4),
                total_charges: text(row, 5),
                minutes: (!minutes.is_empty() && minutes != NOT_APPLICABLE).then_some(minutes),
            })
        })
        .collect())
}

/// The ledger row describing `doc`.
pub fn entry_for(doc: &InvoiceDocument, totals: &InvoiceTotals, produced_on: NaiveDate) -> LedgerEntry {
    LedgerEntry {
        account_id: doc.account_id.clone(),
        period_start: LedgerEntry::format_date(doc.period_start),
        period_end: LedgerEntry::format_date(doc.period_end),
        invoice_date: LedgerEntry::format_date(doc.invoice_date),
        date_produced: LedgerEntry::format_date(produced_on),
        total_charges: totals.amount.normalize().to_string(),
        minutes: totals.minutes.map(|m| m.normalize().to_string()),
    }
}

fn xlsx_error(e: XlsxError) -> AppError {
    AppError::InternalError(anyhow::anyhow!("Failed to write ledger workbook: {}", e))
}

/// Owns the ledger file in storage and serialises runs that update it.
pub struct LedgerStore {
    storage: Arc<dyn Storage>,
    config: LedgerConfig,
    lock: Mutex<()>,
}

impl LedgerStore {
    pub fn new(storage: Arc<dyn Storage>, config: LedgerConfig) -> Result<Self, AppError> {
        if config.minutes_sheet.eq_ignore_ascii_case(&config.amount_sheet) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ledger.minutes_sheet and ledger.amount_sheet must differ (both are '{}')",
                config.minutes_sheet
            )));
        }
        Ok(Self {
            storage,
            config,
            lock: Mutex::new(()),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.config.file_name
    }

    /// Waits for any other run to finish with the ledger, then loads it.
    pub async fn acquire(&self) -> Result<LedgerSession<'_>, AppError> {
        let guard = self.lock.lock().await;

        let ledger = if self.storage.exists(&self.config.file_name).await? {
            let bytes = self.storage.download(&self.config.file_name).await?;
            Ledger::from_workbook(bytes, &self.config)?
        } else {
            tracing::info!(file = %self.config.file_name, "No ledger yet, starting empty");
            Ledger::empty(&self.config)
        };

        Ok(LedgerSession {
            store: self,
            ledger,
            added: 0,
            skipped: 0,
            _guard: guard,
        })
    }
}

/// An open read-modify-write cycle on the ledger. Nothing is written unless
/// [`LedgerSession::commit`] is called.
pub struct LedgerSession<'a> {
    store: &'a LedgerStore,
    ledger: Ledger,
    added: usize,
    skipped: usize,
    _guard: MutexGuard<'a, ()>,
}

impl LedgerSession<'_> {
    pub fn record(&mut self, mode: BillingMode, entry: LedgerEntry) -> bool {
        let account_id = entry.account_id.clone();
        let recorded = self
            .ledger
            .record(mode, entry, self.store.config.match_on_charges);
        if recorded {
            self.added += 1;
        } else {
            self.skipped += 1;
            tracing::info!(account_id = %account_id, mode = mode.as_str(), "Invoice already in ledger, not logged again");
        }
        recorded
    }

    pub fn added(&self) -> usize {
        self.added
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub async fn commit(self) -> Result<(), AppError> {
        let bytes = self.ledger.to_workbook()?;
        self.store
            .storage
            .upload(&self.store.config.file_name, bytes)
            .await?;
        tracing::info!(
            file = %self.store.config.file_name,
            added = self.added,
            skipped = self.skipped,
            "Ledger written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::LocalStorage;

    fn config() -> LedgerConfig {
        LedgerConfig {
            enabled: true,
            file_name: "log.xlsx".to_string(),
            minutes_sheet: "Malaysia".to_string(),
            amount_sheet: "USA".to_string(),
            match_on_charges: false,
        }
    }

    fn entry(account: &str, charges: &str) -> LedgerEntry {
        LedgerEntry {
            account_id: account.to_string(),
            period_start: "2023-12-01".to_string(),
            period_end: "2023-12-05".to_string(),
            invoice_date: "2024-01-01".to_string(),
            date_produced: "2024-01-02".to_string(),
            total_charges: charges.to_string(),
            minutes: Some("10".to_string()),
        }
    }

    #[test]
    fn duplicate_is_not_recorded_twice() {
        let mut ledger = Ledger::empty(&config());
        assert!(ledger.record(BillingMode::MinutesBased, entry("A100", "1201"), false));
        assert!(!ledger.record(BillingMode::MinutesBased, entry("A100", "1201"), false));
        assert_eq!(ledger.entries(BillingMode::MinutesBased).len(), 1);
    }

    #[test]
    fn modes_are_tracked_separately() {
        let mut ledger = Ledger::empty(&config());
        assert!(ledger.record(BillingMode::MinutesBased, entry("A100", "1"), false));
        assert!(ledger.record(BillingMode::AmountOnly, entry("A100", "1"), false));
    }

    #[test]
    fn charges_only_matter_when_configured() {
        let mut ledger = Ledger::empty(&config());
        ledger.record(BillingMode::MinutesBased, entry("A100", "100"), false);

        assert!(ledger.contains(BillingMode::MinutesBased, &entry("A100", "999"), false));
        assert!(!ledger.contains(BillingMode::MinutesBased, &entry("A100", "999"), true));
    }

    #[test]
    fn workbook_reloads_with_sheet_per_mode() {
        let mut ledger = Ledger::empty(&config());
        ledger.record(BillingMode::MinutesBased, entry("A100", "1201"), false);
        let mut amount = entry("B200", "50");
        amount.minutes = None;
        ledger.record(BillingMode::AmountOnly, amount.clone(), false);

        let bytes = ledger.to_workbook().unwrap();
        let reloaded = Ledger::from_workbook(bytes, &config()).unwrap();

        assert_eq!(reloaded.entries(BillingMode::MinutesBased), &[entry("A100", "1201")]);
        assert_eq!(reloaded.entries(BillingMode::AmountOnly), &[amount]);
    }

    #[tokio::test]
    async fn uncommitted_session_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        let store = LedgerStore::new(storage.clone(), config()).unwrap();

        {
            let mut session = store.acquire().await.unwrap();
            session.record(BillingMode::MinutesBased, entry("A100", "1"));
        }
        assert!(!storage.exists("log.xlsx").await.unwrap());

        let mut session = store.acquire().await.unwrap();
        assert!(session.record(BillingMode::MinutesBased, entry("A100", "1")));
        session.commit().await.unwrap();

        let mut session = store.acquire().await.unwrap();
        assert!(!session.record(BillingMode::MinutesBased, entry("A100", "1")));
        assert_eq!(session.skipped(), 1);
    }

    #[test]
    fn identical_sheet_names_are_rejected() {
        let mut config = config();
        config.amount_sheet = "malaysia".to_string();
        let storage: Arc<dyn Storage> = Arc::new(NullStorage);
        assert!(matches!(
            LedgerStore::new(storage, config),
            Err(AppError::ConfigError(_))
        ));
    }

    struct NullStorage;

    #[async_trait::async_trait]
    impl Storage for NullStorage {
        async fn upload(&self, _key: &str, _data: Vec<u8>) -> Result<(), AppError> {
            Ok(())
        }
        async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
            Err(AppError::not_found(key))
        }
        async fn exists(&self, _key: &str) -> Result<bool, AppError> {
            Ok(false)
        }
    }
}
