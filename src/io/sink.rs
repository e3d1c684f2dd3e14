//! Output side: where finished blocks go
//!
//! [`DataSink`] names a destination (a local path or standard output) and
//! opens it. [`BlockSink`] wraps the opened byte stream and is the only code
//! that writes to it: it runs the observation hook, appends the compressed
//! block, and counts what went out.
//!
//! # Example
//!
//! ```no_run
//! use ordered_bgzf::io::DataSink;
//!
//! // Write to local file
//! let sink = DataSink::from_path("output.vcf.gz");
//!
//! // Write to stdout
//! let sink = DataSink::stdout();
//! ```

use crate::error::{BgzfError, Result};
use crate::io::compression::BGZF_EOF;
use crate::io::observer::SharedObserver;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Stream name used for standard output
pub const STDOUT_NAME: &str = "<stdout>";

/// Stream name used when the caller supplies a bare writer
pub const UNNAMED_STREAM: &str = "<stream>";

/// Output destination for a BGZF stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSink {
    /// Write to a local file path (created or truncated)
    Local(PathBuf),

    /// Write to standard output
    ///
    /// Useful for streaming pipelines:
    /// ```bash
    /// produce_records | bgzf-tool > out.bgz
    /// ```
    Stdout,
}

impl DataSink {
    /// Create a sink from a file path
    ///
    /// # Example
    ///
    /// ```
    /// use ordered_bgzf::io::DataSink;
    ///
    /// let sink = DataSink::from_path("output.bam");
    /// ```
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self::Local(path.as_ref().to_path_buf())
    }

    /// Create a sink for standard output
    pub fn stdout() -> Self {
        Self::Stdout
    }

    /// Identifier used in error messages
    pub fn name(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Stdout => STDOUT_NAME.to_string(),
        }
    }

    /// Open the destination for writing
    ///
    /// # Errors
    ///
    /// [`BgzfError::Io`] if the file cannot be created.
    pub fn open(&self) -> Result<Box<dyn Write + Send>> {
        match self {
            Self::Local(path) => {
                let file = File::create(path).map_err(|e| BgzfError::io(&self.name(), "open", e))?;
                Ok(Box::new(file))
            }
            Self::Stdout => Ok(Box::new(io::stdout())),
        }
    }
}

/// Sole writer to the underlying byte stream
#[derive(Debug)]
pub struct BlockSink<W: Write> {
    inner: W,
    stream: String,
    blocks_written: u64,
    bytes_out: u64,
}

impl<W: Write> BlockSink<W> {
    /// Wrap `inner`, reporting errors against `stream`
    pub fn new(inner: W, stream: impl Into<String>) -> Self {
        Self {
            inner,
            stream: stream.into(),
            blocks_written: 0,
            bytes_out: 0,
        }
    }

    /// Stream identifier
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Data blocks written so far (the EOF marker is not counted)
    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// Compressed bytes written so far, i.e. the current file offset
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Notify the observer, then append the compressed block
    pub(crate) fn write_result(
        &mut self,
        raw: &[u8],
        compressed: &[u8],
        observer: Option<&SharedObserver>,
    ) -> Result<()> {
        if let Some(observer) = observer {
            observer.notify(raw, compressed);
        }

        self.write_bytes(compressed, "write block")?;
        self.blocks_written += 1;
        Ok(())
    }

    /// Append the fixed empty end-of-stream block
    pub fn write_eof(&mut self) -> Result<()> {
        self.write_bytes(&BGZF_EOF, "write EOF marker")
    }

    /// Flush the underlying stream
    pub fn flush(&mut self) -> Result<()> {
        let stream = &self.stream;
        self.inner
            .flush()
            .map_err(|e| BgzfError::io(stream, "flush", e))
    }

    /// Unwrap the underlying stream
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_bytes(&mut self, bytes: &[u8], context: &'static str) -> Result<()> {
        let stream = &self.stream;
        self.inner
            .write_all(bytes)
            .map_err(|e| BgzfError::io(stream, context, e))?;
        self.bytes_out += bytes.len() as u64;
        Ok(())
    }
}
