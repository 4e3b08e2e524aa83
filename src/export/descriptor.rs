//! Output descriptors: compact `"<media>:<target>"` strings naming where an
//! artifact goes.

use crate::error::ExportError;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

pub const MEDIA_FILE: &str = "file";
pub const MEDIA_CONSOLE: &str = "console";
pub const CONSOLE_STDOUT: &str = "stdout";
pub const CONSOLE_STDERR: &str = "stderr";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    Stdout,
    Stderr,
}

/// Parsed output descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A file inside the host's export directory
    File(String),
    /// A framed block on a console stream
    Console(ConsoleStream),
}

impl OutputTarget {
    pub fn parse(descriptor: &str) -> Result<Self, ExportError> {
        if descriptor.is_empty() {
            return Err(ExportError::bad_descriptor(
                descriptor,
                "descriptor of the destination cannot be empty",
            ));
        }

        let (media, target) = descriptor.split_once(':').ok_or_else(|| {
            ExportError::bad_descriptor(descriptor, "expected the form 'type:target'")
        })?;

        match media {
            MEDIA_FILE => {
                validate_file_name(descriptor, target)?;
                Ok(OutputTarget::File(target.to_string()))
            }
            MEDIA_CONSOLE => Ok(OutputTarget::Console(if target == CONSOLE_STDOUT {
                ConsoleStream::Stdout
            } else {
                ConsoleStream::Stderr
            })),
            other => Err(ExportError::bad_descriptor(
                descriptor,
                format!("unsupported media type '{}'", other),
            )),
        }
    }
}

/// File targets stay inside the host directory.
fn validate_file_name(descriptor: &str, target: &str) -> Result<(), ExportError> {
    if target.trim().is_empty() {
        return Err(ExportError::bad_descriptor(descriptor, "file name is empty"));
    }
    let path = Path::new(target);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(ExportError::bad_descriptor(
            descriptor,
            "file name must be relative to the export directory",
        ));
    }
    Ok(())
}

impl FromStr for OutputTarget {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputTarget::parse(s)
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::File(name) => write!(f, "{}:{}", MEDIA_FILE, name),
            OutputTarget::Console(ConsoleStream::Stdout) => {
                write!(f, "{}:{}", MEDIA_CONSOLE, CONSOLE_STDOUT)
            }
            OutputTarget::Console(ConsoleStream::Stderr) => {
                write!(f, "{}:{}", MEDIA_CONSOLE, CONSOLE_STDERR)
            }
        }
    }
}
