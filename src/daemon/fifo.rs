use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Named pipe that producers write one complete message into, then close.
#[derive(Debug, Clone)]
pub struct NamedPipe {
    path: PathBuf,
}

impl NamedPipe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the FIFO if nothing exists at the path yet.
    #[cfg(unix)]
    pub fn ensure(&self) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::stat::Mode;
        use std::os::unix::fs::FileTypeExt;

        match fs::metadata(&self.path) {
            Ok(meta) if meta.file_type().is_fifo() => return Ok(()),
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a FIFO", self.path.display()),
                ));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        match nix::unistd::mkfifo(self.path.as_path(), Mode::from_bits_truncate(0o666)) {
            Ok(()) => {
                log::info!("created FIFO at {}", self.path.display());
                Ok(())
            }
            // another process won the race
            Err(Errno::EEXIST) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    #[cfg(not(unix))]
    pub fn ensure(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "named pipes require a unix platform",
        ))
    }

    /// Block until a writer connects, then read everything it sends up to EOF.
    ///
    /// The pipe is closed again before returning; each call handles one message.
    pub fn read_message(&self) -> io::Result<Vec<u8>> {
        let mut fifo = File::open(&self.path)?;
        let mut buf = Vec::new();
        fifo.read_to_end(&mut buf)?;
        Ok(buf)
    }
}
