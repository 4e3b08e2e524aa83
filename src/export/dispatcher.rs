//! Dispatcher: delivers rendered artifacts to files or console streams.

use super::descriptor::{ConsoleStream, OutputTarget};
use crate::error::ExportError;
use parking_lot::Mutex;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Width of the separator line framing console output.
pub const SEPARATOR_WIDTH: usize = 80;

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Writes artifacts under `<export_root>/<host>/` or onto a console stream.
#[derive(Clone)]
pub struct Dispatcher {
    export_root: PathBuf,
    stdout: SharedWriter,
    stderr: SharedWriter,
}

impl Dispatcher {
    pub fn new(export_root: impl Into<PathBuf>) -> Self {
        Self::with_writers(
            export_root,
            Box::new(io::stdout()),
            Box::new(io::stderr()),
        )
    }

    /// Build a dispatcher with substitute console streams.
    pub fn with_writers(
        export_root: impl Into<PathBuf>,
        stdout: Box<dyn Write + Send>,
        stderr: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            export_root: export_root.into(),
            stdout: Arc::new(Mutex::new(stdout)),
            stderr: Arc::new(Mutex::new(stderr)),
        }
    }

    pub fn export_root(&self) -> &Path {
        &self.export_root
    }

    /// Directory holding the file artifacts of `host_label`.
    pub fn host_dir(&self, host_label: &str) -> PathBuf {
        self.export_root.join(host_label)
    }

    /// Deliver `text` to the target named by `descriptor`.
    ///
    /// Returns the written path for file targets.
    pub fn dispatch(
        &self,
        text: &str,
        host_label: &str,
        descriptor: &str,
    ) -> Result<Option<PathBuf>, ExportError> {
        match OutputTarget::parse(descriptor)? {
            OutputTarget::File(name) => self.write_file(text, host_label, &name).map(Some),
            OutputTarget::Console(stream) => {
                self.write_console(text, stream)?;
                Ok(None)
            }
        }
    }

    /// Print a response nobody was waiting for.
    pub fn passthrough(&self, text: &str) -> Result<(), ExportError> {
        let mut out = self.stdout.lock();
        writeln!(out, "{}", text)?;
        out.flush()?;
        Ok(())
    }

    fn write_file(&self, text: &str, host_label: &str, name: &str) -> Result<PathBuf, ExportError> {
        if !is_plain_label(host_label) {
            return Err(ExportError::IoError(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Host label \"{}\" cannot be used as a directory name", host_label),
            )));
        }

        let target = self.host_dir(host_label).join(name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ExportError::IoError(io::Error::new(
                    e.kind(),
                    format!("Unable to write to {}: {}", parent.display(), e),
                ))
            })?;
        }

        let temp = target.with_extension("tmp");
        fs::write(&temp, text.as_bytes()).map_err(|e| {
            ExportError::IoError(io::Error::new(
                e.kind(),
                format!("Failed to write {}: {}", temp.display(), e),
            ))
        })?;
        fs::rename(&temp, &target).map_err(|e| {
            let _ = fs::remove_file(&temp);
            ExportError::IoError(io::Error::new(
                e.kind(),
                format!("Failed to replace {}: {}", target.display(), e),
            ))
        })?;

        info!(path = %target.display(), bytes = text.len(), "Artifact written");
        Ok(target)
    }

    fn write_console(&self, text: &str, stream: ConsoleStream) -> Result<(), ExportError> {
        let writer = match stream {
            ConsoleStream::Stdout => &self.stdout,
            ConsoleStream::Stderr => &self.stderr,
        };
        let mut out = writer.lock();
        write!(out, "{}\n{}\n\n", "=".repeat(SEPARATOR_WIDTH), text)?;
        out.flush()?;
        debug!(?stream, bytes = text.len(), "Artifact printed");
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("export_root", &self.export_root)
            .finish()
    }
}

fn is_plain_label(label: &str) -> bool {
    let mut components = Path::new(label).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
