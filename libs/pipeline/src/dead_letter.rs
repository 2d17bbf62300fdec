use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use bridge_api::{Destination, Document, PluginError};

use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Dead-letter file — failed inserts as JSON lines
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct DeadLetter<'a> {
    database: &'a str,
    collection: &'a str,
    error: &'a str,
    document: &'a Document,
}

/// Append-only JSONL file for documents the store rejected.
///
/// Nothing reads it back; replay is an operator task.
pub struct DeadLetterFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl DeadLetterFile {
    /// Open (or create) the file for appending.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| PipelineError::DeadLetter { path: path.display().to_string(), source })?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line. Lines from concurrent handlers never interleave.
    pub async fn append(
        &self,
        destination: &Destination,
        document: &Document,
        error: &PluginError,
    ) -> Result<(), PluginError> {
        let entry = DeadLetter {
            database: &destination.database,
            collection: &destination.collection,
            error: error.message(),
            document,
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
