use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::domain::email::NormalizedEmail;
use crate::error::StoreError;
use crate::store::repo::RecordStore;

/// JSON Lines file: one record per line, separated by `\n`, no trailing newline.
///
/// Prior lines are never rewritten. A newline is written *before* each record except the
/// first, so the file always ends with a complete JSON object.
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_record(&self, email: &NormalizedEmail) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;
        let start = file
            .metadata()
            .map_err(|e| StoreError::io(&self.path, e))?
            .len();

        let json = serde_json::to_string(email)?;
        let mut line = String::with_capacity(json.len() + 1);
        if start > 0 {
            line.push('\n');
        }
        line.push_str(&json);

        let written = file.write_all(line.as_bytes()).and_then(|_| file.sync_data());
        self.commit(&file, start, written)
    }

    /// Keep the file exactly as it was before a failed write, so the append can be repeated.
    fn commit(&self, file: &File, start: u64, written: io::Result<()>) -> Result<(), StoreError> {
        let Err(source) = written else {
            return Ok(());
        };
        match file.set_len(start).and_then(|_| file.sync_data()) {
            Ok(()) => Err(StoreError::io(&self.path, source)),
            Err(rollback) => {
                log::error!(
                    "could not truncate {} back to {start} bytes: {rollback}",
                    self.path.display()
                );
                Err(StoreError::Torn {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }
}

impl RecordStore for JsonlStore {
    fn append(&self, email: &NormalizedEmail) -> Result<(), StoreError> {
        match self.write_record(email) {
            Ok(()) => {
                log::info!("stored {:?} in {}", email.id, self.path.display());
                Ok(())
            }
            Err(e) => {
                log::error!("failed to store {}: {e}", email.label());
                Err(e)
            }
        }
    }

    fn recent(&self, count: usize) -> Result<Vec<NormalizedEmail>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let mut records: Vec<NormalizedEmail> = contents
            .lines()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(email) => Some(email),
                Err(e) => {
                    log::warn!("skipping unreadable line in {}: {e}", self.path.display());
                    None
                }
            })
            .take(count)
            .collect();
        records.reverse();
        Ok(records)
    }
}
