use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::Utc;

/// Directory of raw messages that could not be processed, one `.eml` file each.
pub struct DeadLetterBox {
    dir: PathBuf,
}

impl DeadLetterBox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `raw` to a fresh file and return its path.
    pub fn put(&self, raw: &[u8], reason: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");

        for n in 0u32.. {
            let name = if n == 0 {
                format!("{stamp}.eml")
            } else {
                format!("{stamp}-{n}.eml")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(raw)?;
                    file.sync_data()?;
                    log::warn!("dead-lettered message to {} ({reason})", path.display());
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::other("no free dead-letter file name"))
    }
}
