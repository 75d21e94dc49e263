//! Presentation-side export of the text buffer: clipboard and file download.
//!
//! Nothing here reaches back into the workflow. Failures are returned to the
//! caller and reported, never escalated.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

pub const DOWNLOAD_FILENAME: &str = "digitized-notes.txt";
pub const DOWNLOAD_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

pub const COPIED_MESSAGE: &str = "Text copied to clipboard!";
pub const COPY_FAILED_MESSAGE: &str = "Could not copy text to clipboard";
pub const DOWNLOADED_MESSAGE: &str = "Text file downloaded!";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no clipboard is available on this system")]
    ClipboardUnavailable,
    #[error("clipboard command '{program}' failed: {status}")]
    ClipboardCommand {
        program: String,
        status: std::process::ExitStatus,
    },
    #[error("clipboard i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A plain-text file ready to hand to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDownload {
    pub filename: &'static str,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// Serialize the buffer as a UTF-8 plain-text file. Lossless.
pub fn download_as_file(text: &str) -> TextDownload {
    TextDownload {
        filename: DOWNLOAD_FILENAME,
        content_type: DOWNLOAD_CONTENT_TYPE,
        body: text.as_bytes().to_vec(),
    }
}

/// Write access to the system clipboard.
#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn write_text(&self, text: &str) -> Result<(), ExportError>;
}

/// Clipboard written by piping text into a helper program
/// (`pbcopy`, `wl-copy`, `xclip`, `clip`).
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    program: String,
    args: Vec<String>,
}

impl CommandClipboard {
    /// Parse a whitespace-separated command line such as `xclip -selection clipboard`.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Best guess for the current platform.
    pub fn detect() -> Self {
        let (program, args): (&str, &[&str]) = if cfg!(target_os = "macos") {
            ("pbcopy", &[])
        } else if cfg!(target_os = "windows") {
            ("clip", &[])
        } else if std::env::var_os("WAYLAND_DISPLAY").is_some() {
            ("wl-copy", &[])
        } else {
            ("xclip", &["-selection", "clipboard"])
        };
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Clipboard for CommandClipboard {
    async fn write_text(&self, text: &str) -> Result<(), ExportError> {
        debug!("Clipboard: piping {} bytes into {}", text.len(), self.program);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ExportError::ClipboardUnavailable,
                _ => ExportError::Io(e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            // Closing stdin lets the helper see EOF.
            drop(stdin);
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(ExportError::ClipboardCommand {
                program: self.program.clone(),
                status,
            });
        }
        Ok(())
    }
}
