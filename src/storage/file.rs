//! Flat-file snapshot store: `<root>/<host>/<id>.lmx` (gzip) or `.xml`.

use super::{content_digest, MessageDiff, MessageStore, SnapshotMessage};
use crate::error::StorageError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::info;

pub const COMPRESSED_EXTENSION: &str = "lmx";
pub const PLAIN_EXTENSION: &str = "xml";

pub struct FileMessageStore {
    root: PathBuf,
    compression: bool,
}

impl FileMessageStore {
    pub fn new<P: AsRef<Path>>(root: P, compression: bool) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            StorageError::IoError(io::Error::new(
                e.kind(),
                format!("Unable to initialize storage at {}: {}", root.display(), e),
            ))
        })?;
        Ok(Self { root, compression })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of `message` under the store root.
    ///
    /// Host label and provider id must each be a single plain path component.
    pub fn message_path(&self, message: &SnapshotMessage) -> Result<PathBuf, StorageError> {
        let extension = if self.compression {
            COMPRESSED_EXTENSION
        } else {
            PLAIN_EXTENSION
        };
        let host = plain_component("host label", &message.host)?;
        let id = plain_component("provider id", &message.provider_id)?;
        Ok(self
            .root
            .join(host)
            .join(format!("{}.{}", id.to_lowercase(), extension)))
    }

    fn encode(&self, payload: &str) -> Result<Vec<u8>, StorageError> {
        if !self.compression {
            return Ok(payload.as_bytes().to_vec());
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload.as_bytes())?;
        Ok(encoder.finish()?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, StorageError> {
        let mut text = String::new();
        if self.compression {
            GzDecoder::new(bytes).read_to_string(&mut text)?;
        } else {
            text = String::from_utf8(bytes.to_vec())
                .map_err(|e| StorageError::Serialization(format!("Stored payload is not UTF-8: {}", e)))?;
        }
        Ok(text)
    }

    /// Payload currently stored for `message`'s key.
    pub fn load(&self, message: &SnapshotMessage) -> Result<Option<String>, StorageError> {
        let path = self.message_path(message)?;
        match fs::read(&path) {
            Ok(bytes) => self.decode(&bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn plain_component<'a>(what: &str, value: &'a str) -> Result<&'a str, StorageError> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(value),
        _ => Err(StorageError::Unsupported(format!(
            "{} \"{}\" is not a plain file name",
            what, value
        ))),
    }
}

impl MessageStore for FileMessageStore {
    fn name(&self) -> &'static str {
        "file"
    }

    fn store_message(&self, message: &SnapshotMessage) -> Result<(), StorageError> {
        let path = self.message_path(message)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = self.encode(&message.payload)?;
        let temp = path.with_extension("tmp");
        fs::write(&temp, &bytes)?;
        fs::rename(&temp, &path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            StorageError::IoError(io::Error::new(
                e.kind(),
                format!("Failed to rename temp file to {}: {}", path.display(), e),
            ))
        })?;

        info!(path = %path.display(), "Snapshot written");
        Ok(())
    }

    fn diff_message(&self, message: &SnapshotMessage) -> Result<MessageDiff, StorageError> {
        let previous = self.load(message)?.map(|p| content_digest(&p));
        Ok(MessageDiff::between(previous, message.digest()))
    }
}
