//! Where client credentials come from.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::Credentials;

/// A source of client credentials.
pub trait CredentialSource {
    /// Every valid record. Invalid ones are skipped.
    fn load(&self) -> Result<Vec<Credentials>>;

    /// Look a client up by name, ignoring case and surrounding whitespace.
    fn find(&self, client_name: &str) -> Result<Credentials> {
        let wanted = client_name.trim();
        self.load()?
            .into_iter()
            .find(|c| c.client_name.trim().eq_ignore_ascii_case(wanted))
            .with_context(|| format!("No client named '{}'", wanted))
    }

    fn client_names(&self) -> Result<Vec<String>> {
        Ok(self.load()?.into_iter().map(|c| c.client_name).collect())
    }
}

#[derive(Deserialize)]
struct Row {
    #[serde(alias = "Client Name")]
    client_name: String,
    #[serde(alias = "GST Username")]
    username: String,
    #[serde(alias = "GST Password")]
    password: String,
}

/// JSON array of `{client_name, username, password}` objects.
#[derive(Debug, Clone)]
pub struct JsonCredentialFile {
    path: PathBuf,
}

impl JsonCredentialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialSource for JsonCredentialFile {
    fn load(&self) -> Result<Vec<Credentials>> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read client file {}", self.path.display()))?;
        let rows: Vec<serde_json::Value> = serde_json::from_slice(&bytes).with_context(|| {
            format!(
                "Client file {} must be a JSON array of client records",
                self.path.display()
            )
        })?;

        let mut clients = Vec::with_capacity(rows.len());
        for (index, value) in rows.into_iter().enumerate() {
            let row: Row = match serde_json::from_value(value) {
                Ok(row) => row,
                Err(err) => {
                    tracing::warn!("Skipping malformed client at row {}: {}", index + 1, err);
                    continue;
                }
            };
            let credentials = Credentials::new(
                row.client_name.trim(),
                row.username.trim(),
                row.password.trim(),
            );
            if credentials.is_valid() {
                clients.push(credentials);
            } else {
                tracing::warn!(
                    "Skipping invalid client at row {}: {}",
                    index + 1,
                    row.client_name
                );
            }
        }

        tracing::info!("Successfully loaded {} clients.", clients.len());
        Ok(clients)
    }
}
