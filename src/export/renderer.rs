//! Renderer: applies a named stylesheet to a response document.

use crate::error::ExportError;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Stylesheet asset extension under the renderer root.
pub const STYLESHEET_EXTENSION: &str = "xsl";

/// Applies one stylesheet to one document.
pub trait StylesheetProcessor: Send + Sync {
    fn transform(&self, stylesheet: &Path, document: &str) -> Result<String, ExportError>;
}

/// Runs an external `xsltproc`-compatible command with the document on stdin.
#[derive(Debug, Clone)]
pub struct XsltProc {
    program: String,
}

impl XsltProc {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for XsltProc {
    fn default() -> Self {
        Self::new("xsltproc")
    }
}

impl StylesheetProcessor for XsltProc {
    fn transform(&self, stylesheet: &Path, document: &str) -> Result<String, ExportError> {
        let mut child = Command::new(&self.program)
            .arg(stylesheet)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ExportError::RenderFailed(format!("Unable to start {}: {}", self.program, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(document.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(ExportError::RenderFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        String::from_utf8(output.stdout).map_err(|e| {
            ExportError::RenderFailed(format!("{} produced non UTF-8 output: {}", self.program, e))
        })
    }
}

/// Resolves render ids to stylesheet assets and applies them.
#[derive(Clone)]
pub struct Renderer {
    root: PathBuf,
    processor: Arc<dyn StylesheetProcessor>,
}

impl Renderer {
    pub fn new(root: impl Into<PathBuf>, processor: Arc<dyn StylesheetProcessor>) -> Self {
        Self {
            root: root.into(),
            processor,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stylesheet_path(&self, render_id: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", render_id, STYLESHEET_EXTENSION))
    }

    /// Render `document`.
    ///
    /// Without a render id the document is checked for well-formedness and
    /// returned on a single line. With one, the stylesheet
    /// `<root>/<render_id>.xsl` is applied and its output returned untouched.
    #[instrument(skip(self, document), fields(bytes = document.len()))]
    pub fn render(&self, document: &str, render_id: Option<&str>) -> Result<String, ExportError> {
        match render_id {
            None => identity(document),
            Some(render_id) => {
                let path = self.stylesheet_path(render_id);
                if File::open(&path).is_err() || !path.is_file() {
                    return Err(ExportError::RenderNotFound {
                        render_id: render_id.to_string(),
                        path: path.display().to_string(),
                    });
                }
                debug!(stylesheet = %path.display(), "Applying stylesheet");
                self.processor.transform(&path, document)
            }
        }
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer").field("root", &self.root).finish()
    }
}

fn identity(document: &str) -> Result<String, ExportError> {
    roxmltree::Document::parse(document)
        .map_err(|e| ExportError::RenderFailed(format!("Response is not well-formed: {}", e)))?;
    Ok(document.chars().filter(|c| *c != '\n' && *c != '\r').collect())
}
