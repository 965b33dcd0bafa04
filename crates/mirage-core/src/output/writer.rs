//! Asynchronous batch writer: every finished batch becomes an independent
//! blocking task on the tokio runtime; `finish` drains them all.

use std::path::PathBuf;

use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{MirageError, Result};
use crate::output::text::{batch_path, write_batch};

/// One batch file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenBatch {
    pub table: String,
    pub batch: usize,
    pub rows: usize,
    pub bytes: u64,
    pub path: PathBuf,
}

pub struct BatchWriter {
    handle: Handle,
    root: PathBuf,
    tasks: JoinSet<Result<WrittenBatch>>,
}

impl BatchWriter {
    pub fn new(handle: Handle, root: impl Into<PathBuf>) -> Self {
        Self {
            handle,
            root: root.into(),
            tasks: JoinSet::new(),
        }
    }

    /// Queue one batch for writing. Never blocks on I/O.
    pub fn submit(&mut self, table: &str, batch: usize, lines: Vec<String>) {
        let path = batch_path(&self.root, table, batch);
        let table = table.to_string();
        self.tasks.spawn_blocking_on(
            move || {
                let bytes = write_batch(&path, &lines)?;
                Ok(WrittenBatch {
                    table,
                    batch,
                    rows: lines.len(),
                    bytes,
                    path,
                })
            },
            &self.handle,
        );
    }

    /// Wait for every queued write. Must not be called from inside an async
    /// context.
    pub fn finish(self) -> Result<Vec<WrittenBatch>> {
        let BatchWriter {
            handle, mut tasks, ..
        } = self;
        let mut written = handle.block_on(async move {
            let mut written = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                let batch = joined.map_err(|e| MirageError::Other(format!("write task failed: {}", e)))??;
                written.push(batch);
            }
            Ok::<_, MirageError>(written)
        })?;
        written.sort_by(|a, b| a.table.cmp(&b.table).then(a.batch.cmp(&b.batch)));
        debug!(files = written.len(), "Output drained");
        Ok(written)
    }
}
