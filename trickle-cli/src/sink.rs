use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use indicatif::ProgressBar;
use trickle_engine::Consumer;

/// Writes dispatched windows at their stream offset in the output file.
pub struct FileSink {
    writer: BufWriter<File>,
    /// Stream offset written to file offset 0
    base: u64,
    /// Stream offset the writer is positioned at
    position: u64,
    written: u64,
    progress: ProgressBar,
    error: Option<io::Error>,
}

impl FileSink {
    pub fn create(path: &Path, base: u64, progress: ProgressBar) -> io::Result<Self> {
        let file = File::options()
            .create(true)
            .write(true)
            .truncate(base == 0)
            .open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            base,
            position: base,
            written: 0,
            progress,
            error: None,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// First write failure, if any. Writing stops after it.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    pub fn finish(&mut self) -> io::Result<u64> {
        self.writer.flush()?;
        self.progress.finish();
        Ok(self.written)
    }

    fn write_at(&mut self, chunk: &[u8], byte_start: u64) -> io::Result<()> {
        if byte_start < self.base {
            // before the requested start offset
            return Ok(());
        }
        if byte_start != self.position {
            self.writer.seek(SeekFrom::Start(byte_start - self.base))?;
        }
        self.writer.write_all(chunk)?;
        self.position = byte_start + chunk.len() as u64;
        self.written += chunk.len() as u64;
        self.progress.inc(chunk.len() as u64);
        Ok(())
    }
}

impl Consumer for FileSink {
    fn dispatch(&mut self, chunk: &[u8], byte_start: u64) -> usize {
        if self.error.is_none() {
            if let Err(e) = self.write_at(chunk, byte_start) {
                self.error = Some(e);
            }
        }
        chunk.len()
    }
}
