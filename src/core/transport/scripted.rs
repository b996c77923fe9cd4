//! Scripted transport
//!
//! Replies to known commands with canned bytes. Useful for exercising the
//! protocol and session layers without a serial port.

use super::{ByteTransport, TransportError};
use crate::core::cancel::CancellationToken;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Default)]
struct JournalInner {
    sent: Vec<Vec<u8>>,
    flushes: usize,
    closes: usize,
    discarded: usize,
}

/// Shared record of what a [`ScriptedTransport`] saw
///
/// Stays readable after the transport has been moved into a session.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<JournalInner>>);

impl Journal {
    /// Commands written, in order, lossily decoded
    pub fn sent(&self) -> Vec<String> {
        self.0
            .lock()
            .sent
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    /// Number of `flush_input` calls
    pub fn flush_count(&self) -> usize {
        self.0.lock().flushes
    }

    /// Number of closes that actually released the handle
    pub fn close_count(&self) -> usize {
        self.0.lock().closes
    }

    /// Bytes thrown away by `flush_input`
    pub fn discarded_bytes(&self) -> usize {
        self.0.lock().discarded
    }
}

/// Transport that answers commands from a script
#[derive(Default)]
pub struct ScriptedTransport {
    replies: HashMap<Vec<u8>, Vec<u8>>,
    failing_writes: HashSet<Vec<u8>>,
    inbound: VecDeque<u8>,
    pending: Option<u8>,
    cancel_after: Option<(usize, CancellationToken)>,
    bytes_read: usize,
    closed: bool,
    journal: Journal,
}

impl ScriptedTransport {
    /// Create an empty script: every read times out
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` each time exactly `command` is written
    #[must_use]
    pub fn reply(mut self, command: &str, response: &str) -> Self {
        self.replies
            .insert(command.as_bytes().to_vec(), response.as_bytes().to_vec());
        self
    }

    /// Accept only part of `command` when it is written
    #[must_use]
    pub fn fail_write(mut self, command: &str) -> Self {
        self.failing_writes.insert(command.as_bytes().to_vec());
        self
    }

    /// Bytes available before anything is written
    #[must_use]
    pub fn with_input(mut self, bytes: &[u8]) -> Self {
        self.inbound.extend(bytes);
        self
    }

    /// Set `token` once `bytes` bytes have been read, as an interrupt would
    #[must_use]
    pub fn cancel_after_bytes(mut self, bytes: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((bytes, token));
        self
    }

    /// Handle on the record of this transport's activity
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::NotConnected)
        } else {
            Ok(())
        }
    }
}

impl ByteTransport for ScriptedTransport {
    fn read_byte(&mut self) -> Result<u8, TransportError> {
        self.ensure_open()?;
        let byte = match self.pending.take() {
            Some(byte) => byte,
            None => self.inbound.pop_front().ok_or(TransportError::Timeout)?,
        };

        self.bytes_read += 1;
        if let Some((after, token)) = &self.cancel_after {
            if self.bytes_read >= *after {
                token.cancel();
            }
        }
        Ok(byte)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.ensure_open()?;
        if self.failing_writes.contains(data) {
            return Err(TransportError::ShortWrite {
                written: data.len().saturating_sub(1),
                requested: data.len(),
            });
        }

        self.journal.0.lock().sent.push(data.to_vec());
        if let Some(reply) = self.replies.get(data) {
            self.inbound.extend(reply);
        }
        Ok(data.len())
    }

    fn flush_input(&mut self) -> Result<(), TransportError> {
        self.ensure_open()?;
        let discarded = self.inbound.len() + usize::from(self.pending.take().is_some());
        self.inbound.clear();

        let mut journal = self.journal.0.lock();
        journal.flushes += 1;
        journal.discarded += discarded;
        Ok(())
    }

    fn probe(&mut self) -> Result<bool, TransportError> {
        self.ensure_open()?;
        if self.pending.is_none() {
            self.pending = self.inbound.pop_front();
        }
        Ok(self.pending.is_some())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            self.journal.0.lock().closes += 1;
        }
        Ok(())
    }

    fn connection_info(&self) -> String {
        "scripted transport".to_string()
    }
}
