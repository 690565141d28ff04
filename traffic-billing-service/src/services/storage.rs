use async_trait::async_trait;
use service_core::error::AppError;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// Flat store for rendered invoices and the ledger workbook. Keys are bare
/// file names.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError>;
    /// Fails with `NotFound` when no file has that key.
    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError>;
    async fn exists(&self, key: &str) -> Result<bool, AppError>;
}

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self { base_path })
    }

    /// Resolves a key inside the base directory. Anything that could name a
    /// path outside it is treated as unknown.
    fn resolve(&self, key: &str) -> Result<PathBuf, AppError> {
        if !is_plain_file_name(key) {
            return Err(AppError::not_found(format!("File not found: {}", key)));
        }
        Ok(self.base_path.join(key))
    }
}

/// A single path component: non-empty, no separators, not `.`/`..`.
pub fn is_plain_file_name(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains(['/', '\\', '\0'])
        && !key.contains("..")
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError> {
        let path = self.resolve(key)?;
        fs::write(path, data).await?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let path = self.resolve(key)?;
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AppError::not_found(format!("File not found: {}", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let Ok(path) = self.resolve(key) else {
            return Ok(false);
        };
        Ok(fs::try_exists(path).await?)
    }
}
