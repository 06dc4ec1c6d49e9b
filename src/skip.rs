//! Deferred skipping over unread sample blocks.
//!
//! When a read materializes only some record sets, the blocks in between
//! are not consumed as they are passed; instead a single watermark
//! remembers the earliest unread offset, and the whole gap is skipped in
//! one coalesced motion right before the next block that IS wanted.

use std::io::{self, Read};

use crate::error::{OsdError, Result};
use crate::framer::CountingReader;

#[derive(Debug, Default)]
pub struct LazySkipReader {
    /// Earliest offset whose bytes have not been consumed yet.
    pending_from: Option<u64>,
}

impl LazySkipReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that the stream position fell behind at `offset`.  Later
    /// calls are ignored; only the first gap start matters.
    pub fn defer(&mut self, offset: u64) {
        if self.pending_from.is_none() {
            self.pending_from = Some(offset);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_from.is_some()
    }

    /// Consume the gap between the deferred offset and `target`.  A
    /// no-op when nothing was deferred.  Skipping is retried until the
    /// gap is closed; a read that makes no progress means the container
    /// ends before the descriptor-promised offset.
    pub fn catch_up<R: Read>(
        &mut self,
        reader: &mut CountingReader<R>,
        target: u64,
    ) -> Result<()> {
        let Some(pending) = self.pending_from.take() else {
            return Ok(());
        };
        debug_assert!(reader.offset() >= pending);

        while reader.offset() < target {
            let remaining = target - reader.offset();
            let skipped = io::copy(&mut reader.by_ref().take(remaining), &mut io::sink())?;
            if skipped == 0 {
                return Err(OsdError::TruncatedContainer(format!(
                    "stream ends at offset {} while skipping to {}",
                    reader.offset(),
                    target
                )));
            }
        }
        Ok(())
    }
}
