//! Line framer: reassembles a byte stream into CR LF-terminated records.
//!
//! # Wire Format
//!
//! Each record is an arbitrary run of bytes terminated by the two-byte
//! sequence `\r\n`. There is no length prefix and no escaping — a record
//! may legally be empty (an immediate `\r\n`).
//!
//! ```text
//! +----------------------------+------+
//! | record bytes (no \r\n)     | \r\n |
//! +----------------------------+------+
//! ```
//!
//! # Why line framing instead of length-prefixed binary?
//!
//! The protocol this framer feeds (see [`crate::protocol`]) is a
//! human-typeable `VERB REQ_ID k=v ...` text line, so a delimiter the
//! client can produce without first knowing the payload length is simpler
//! than counting bytes — the tradeoff is that any value containing
//! whitespace must be pre-encoded by the caller (the PM/GM content field
//! uses base64 for exactly this reason).

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum buffered record size: 64 KiB. A record (or unterminated prefix)
/// larger than this is rejected to bound memory use per connection.
pub const MAX_RECORD_BYTES: usize = 64 * 1024;

/// Errors surfaced by the framer.
#[derive(Debug, Error)]
pub enum FramerError {
    #[error("record exceeded {MAX_RECORD_BYTES} bytes without a terminator")]
    OversizeRecord,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accumulates bytes from a stream and yields CR LF-delimited records.
///
/// Holds an append-only buffer between calls; the framer itself has no
/// idea what the records mean (see [`crate::protocol`] for that).
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Appends bytes just read from the socket to the internal buffer.
    ///
    /// # Errors
    ///
    /// Returns [`FramerError::OversizeRecord`] if the buffer would exceed
    /// [`MAX_RECORD_BYTES`] without containing a `\r\n` terminator.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), FramerError> {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > MAX_RECORD_BYTES && find_crlf(&self.buf).is_none() {
            return Err(FramerError::OversizeRecord);
        }
        Ok(())
    }

    /// Pops one complete record from the buffer, if any is ready.
    ///
    /// Returns `None` if no `\r\n` has been seen yet (not an error — the
    /// caller should read more bytes and call `append` again).
    pub fn pop_record(&mut self) -> Option<Vec<u8>> {
        let at = find_crlf(&self.buf)?;
        let record: Vec<u8> = self.buf.drain(..at).collect();
        // Drop the \r\n terminator itself.
        self.buf.drain(..2);
        Some(record)
    }

    /// Blocking helper: alternates `pop_record` and a socket read until a
    /// full record is available.
    ///
    /// Returns the record's bytes on success, `None` on an orderly peer
    /// close (read returned 0 with no record pending), or an error on I/O
    /// failure or oversize record.
    pub async fn read_record<R: AsyncReadExt + Unpin>(
        &mut self,
        reader: &mut R,
    ) -> Result<Option<Vec<u8>>, FramerError> {
        loop {
            if let Some(record) = self.pop_record() {
                return Ok(Some(record));
            }

            let mut chunk = [0u8; 4096];
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.append(&chunk[..n])?;
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Writes one record to an async writer, appending the CR LF terminator.
///
/// A full record write is a single `write_all` call so it is atomic with
/// respect to any other task's writes to the same writer *provided* the
/// caller serializes access (see the per-connection write mutex in
/// `chat-server`'s worker).
pub async fn write_record<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    record: &[u8],
) -> Result<(), std::io::Error> {
    let mut framed = Vec::with_capacity(record.len() + 2);
    framed.extend_from_slice(record);
    framed.extend_from_slice(b"\r\n");
    writer.write_all(&framed).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_a_simple_record() {
        let mut f = LineFramer::new();
        f.append(b"PING 1\r\n").unwrap();
        assert_eq!(f.pop_record().unwrap(), b"PING 1");
        assert!(f.pop_record().is_none());
    }

    #[test]
    fn not_ready_without_terminator() {
        let mut f = LineFramer::new();
        f.append(b"PING 1").unwrap();
        assert!(f.pop_record().is_none());
    }

    #[test]
    fn pops_multiple_records_fed_across_calls() {
        let mut f = LineFramer::new();
        f.append(b"A 1\r\nB 2\r").unwrap();
        assert_eq!(f.pop_record().unwrap(), b"A 1");
        assert!(f.pop_record().is_none());
        f.append(b"\nC 3\r\n").unwrap();
        assert_eq!(f.pop_record().unwrap(), b"B 2");
        assert_eq!(f.pop_record().unwrap(), b"C 3");
    }

    #[test]
    fn empty_record_is_legal() {
        let mut f = LineFramer::new();
        f.append(b"\r\n").unwrap();
        assert_eq!(f.pop_record().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn oversize_without_terminator_is_rejected() {
        let mut f = LineFramer::new();
        let huge = vec![b'x'; MAX_RECORD_BYTES + 1];
        assert!(matches!(f.append(&huge), Err(FramerError::OversizeRecord)));
    }

    #[test]
    fn oversize_is_fine_once_terminated_before_the_bound() {
        // A record under the bound followed by a terminator is fine even
        // if later appends would have pushed the buffer temporarily large,
        // as long as the terminator already exists before the check fires.
        let mut f = LineFramer::new();
        let mut payload = vec![b'x'; MAX_RECORD_BYTES - 10];
        payload.extend_from_slice(b"\r\n");
        f.append(&payload).unwrap();
        assert!(f.pop_record().is_some());
    }

    #[tokio::test]
    async fn read_record_from_duplex_stream() {
        let (mut writer, mut reader) = tokio::io::duplex(1024);
        write_record(&mut writer, b"PING 1").await.unwrap();

        let mut framer = LineFramer::new();
        let record = framer.read_record(&mut reader).await.unwrap().unwrap();
        assert_eq!(record, b"PING 1");
    }

    #[tokio::test]
    async fn read_record_reports_orderly_close() {
        let (writer, mut reader) = tokio::io::duplex(1024);
        drop(writer);

        let mut framer = LineFramer::new();
        let record = framer.read_record(&mut reader).await.unwrap();
        assert!(record.is_none());
    }
}
