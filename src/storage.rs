use crate::models::Report;
use crate::remote::RemoteError;
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf};
use tokio::fs;
use tracing::error;

pub const DEFAULT_DATA_PATH: &str = "data/reports.json";

/// On-disk layout of the local table.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TableData {
    pub records: Vec<Report>,
}

pub fn resolve_data_path(value: Option<String>) -> PathBuf {
    match value {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_DATA_PATH),
    }
}

pub async fn load_records(path: &Path) -> TableData {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse data file: {err}");
                TableData::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => TableData::default(),
        Err(err) => {
            error!("failed to read data file: {err}");
            TableData::default()
        }
    }
}

pub async fn persist_records(path: &Path, data: &TableData) -> Result<(), RemoteError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(data)?;
    fs::write(path, payload).await?;
    Ok(())
}
