use std::{
    io::{Cursor, Seek, SeekFrom, Write},
    pin::Pin,
    task::{Context as TaskContext, Poll},
};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, ReadBuf};

/// Accumulates an artifact payload in memory, spilling to an unlinked temp
/// file once the configured threshold is crossed, so large exports never
/// hold their full contents in memory.
pub struct SpooledBuffer {
    threshold: usize,
    len: usize,
    backing: Backing,
}

enum Backing {
    Memory(Vec<u8>),
    Disk(std::fs::File),
}

impl SpooledBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            len: 0,
            backing: Backing::Memory(Vec::new()),
        }
    }

    pub fn write(&mut self, chunk: &[u8]) -> Result<()> {
        if let Backing::Memory(buf) = &mut self.backing {
            if self.len + chunk.len() > self.threshold {
                let mut file = tempfile::tempfile().context("Failed to create spool file")?;
                file.write_all(buf).context("Failed to spill spool buffer")?;
                self.backing = Backing::Disk(file);
            }
        }
        match &mut self.backing {
            Backing::Memory(buf) => buf.extend_from_slice(chunk),
            Backing::Disk(file) => file
                .write_all(chunk)
                .context("Failed to write spool chunk")?,
        }
        self.len += chunk.len();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self.backing, Backing::Disk(_))
    }

    pub fn into_reader(self) -> Result<SpoolReader> {
        match self.backing {
            Backing::Memory(buf) => Ok(SpoolReader::Memory(Cursor::new(buf))),
            Backing::Disk(mut file) => {
                file.flush().context("Failed to flush spool file")?;
                file.seek(SeekFrom::Start(0))
                    .context("Failed to rewind spool file")?;
                Ok(SpoolReader::Disk(tokio::fs::File::from_std(file)))
            }
        }
    }
}

pub enum SpoolReader {
    Memory(Cursor<Vec<u8>>),
    Disk(tokio::fs::File),
}

impl AsyncRead for SpoolReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SpoolReader::Memory(cursor) => Pin::new(cursor).poll_read(cx, buf),
            SpoolReader::Disk(file) => Pin::new(file).poll_read(cx, buf),
        }
    }
}
