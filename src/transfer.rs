//! Chunked file transfer sessions.
//!
//! Both directions follow the same shape: one init frame, then one data
//! frame per 128-byte chunk, strictly in order, each response checked
//! against what was sent before the next frame goes out. The index field
//! exists for verification only; ordering comes from the one-frame-in-flight
//! request discipline.
//!
//! A session is a one-shot state machine advanced with `step`; `run` drives
//! it to completion and reports progress per acknowledged chunk. A failed
//! chunk aborts the remainder of that transfer only. Bytes the device
//! already wrote for earlier upload chunks are not rolled back here; a
//! fresh upload of the same path truncates them.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::protocol::{CommandFrame, CHUNK_SIZE, FLAG_DATA, FLAG_INIT, MODULE_FILE};
use crate::{Error, Link, Transport};

/// Number of chunks needed for `len` bytes. Zero bytes take zero chunks.
pub fn chunk_count(len: usize) -> u32 {
    ((len + CHUNK_SIZE - 1) / CHUNK_SIZE) as u32
}

/// Where a failed transfer gave up.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Failure {
    /// The device rejected the init frame.
    InitRejected,
    /// Declared size and chunk count disagree.
    SizeMismatch,
    /// Chunk `i` was not acknowledged, or its echo was wrong.
    Chunk(u32),
}

/// Lifecycle of one transfer session.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TransferState {
    Idle,
    /// Init frame acknowledged, no data exchanged yet.
    Initiated,
    /// Next chunk to exchange (1-based).
    Transferring(u32),
    Completed,
    Failed(Failure),
}

/// Upload of one byte buffer to a device path.
pub struct UploadSession {
    path: String,
    data: Vec<u8>,
    total: u32,
    state: TransferState,
}

impl UploadSession {
    pub fn new<S: Into<String>>(path: S, data: Vec<u8>) -> Self {
        let total = chunk_count(data.len());
        Self {
            path: path.into(),
            data,
            total,
            state: TransferState::Idle,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn chunk_total(&self) -> u32 {
        self.total
    }

    /// Send the init frame. On success the device has created (or truncated)
    /// the target file and expects `chunk_total` data frames.
    pub fn start<T: Transport>(&mut self, link: &mut Link<T>) -> Result<(), Error<T::Error>> {
        debug_assert_eq!(self.state, TransferState::Idle);

        let cmd = CommandFrame::chunked(
            MODULE_FILE,
            "FILE write",
            FLAG_INIT,
            0,
            self.total,
            self.data.len() as u32,
        )
        .with_arg(&*self.path);

        match link.request(&cmd) {
            Ok(_) => {
                debug!("upload of {} initiated, {} chunks", self.path, self.total);
                self.state = TransferState::Initiated;
                Ok(())
            }
            Err(e) => {
                self.state = TransferState::Failed(Failure::InitRejected);
                Err(e)
            }
        }
    }

    /// Exchange the next data frame and return the new state.
    pub fn step<T: Transport>(
        &mut self,
        link: &mut Link<T>,
    ) -> Result<TransferState, Error<T::Error>> {
        let index = match self.state {
            TransferState::Initiated => {
                if self.total == 0 {
                    self.state = TransferState::Completed;
                    return Ok(self.state);
                }
                1
            }
            TransferState::Transferring(i) => i,
            _ => return Ok(self.state),
        };

        let lo = (index as usize - 1) * CHUNK_SIZE;
        let hi = (lo + CHUNK_SIZE).min(self.data.len());
        let encoded = BASE64.encode(&self.data[lo..hi]);

        let cmd = CommandFrame::chunked(
            MODULE_FILE,
            "FILE write",
            FLAG_DATA,
            index,
            self.total,
            self.data.len() as u32,
        )
        .with_arg(encoded);

        match link.request(&cmd).and_then(|rsp| {
            rsp.expect_field(0, "flag", FLAG_DATA)?;
            rsp.expect_field(1, "index", index)?;
            rsp.expect_field(2, "total", self.total)?;
            rsp.expect_field(3, "size", self.data.len() as u32)?;
            Ok(())
        }) {
            Ok(()) => {
                self.state = if index == self.total {
                    TransferState::Completed
                } else {
                    TransferState::Transferring(index + 1)
                };
                Ok(self.state)
            }
            Err(e) => {
                self.state = TransferState::Failed(Failure::Chunk(index));
                Err(e)
            }
        }
    }

    /// Drive the session to completion, calling `progress(i, total)` after
    /// every acknowledged chunk.
    pub fn run<T, F>(&mut self, link: &mut Link<T>, mut progress: F) -> Result<(), Error<T::Error>>
    where
        T: Transport,
        F: FnMut(u32, u32),
    {
        self.start(link)?;
        loop {
            match self.step(link)? {
                TransferState::Transferring(next) => progress(next - 1, self.total),
                TransferState::Completed => {
                    if self.total > 0 {
                        progress(self.total, self.total);
                    }
                    info!("uploaded {} bytes to {}", self.data.len(), self.path);
                    return Ok(());
                }
                state => {
                    // step only reports forward progress from a live session
                    debug_assert!(false, "unexpected upload state {:?}", state);
                    return Ok(());
                }
            }
        }
    }
}

/// Download of one device file into a byte buffer.
pub struct DownloadSession {
    path: String,
    total: u32,
    size: u32,
    buf: Vec<u8>,
    state: TransferState,
}

impl DownloadSession {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self {
            path: path.into(),
            total: 0,
            size: 0,
            buf: Vec::new(),
            state: TransferState::Idle,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Declared chunk count; valid after `start`.
    pub fn chunk_total(&self) -> u32 {
        self.total
    }

    /// Declared byte length; valid after `start`.
    pub fn file_size(&self) -> u32 {
        self.size
    }

    /// Send the init frame and learn chunk count and byte length from the
    /// echoed fields. A declaration violating
    /// `(total - 1) * 128 <= size <= total * 128` fails the session before
    /// any chunk is requested.
    pub fn start<T: Transport>(&mut self, link: &mut Link<T>) -> Result<(), Error<T::Error>> {
        debug_assert_eq!(self.state, TransferState::Idle);

        let cmd = CommandFrame::chunked(MODULE_FILE, "FILE read", FLAG_INIT, 0, 0, 0)
            .with_arg(&*self.path);

        let rsp = match link.request(&cmd) {
            Ok(rsp) => rsp,
            Err(e) => {
                self.state = TransferState::Failed(Failure::InitRejected);
                return Err(e);
            }
        };

        let checked = rsp
            .expect_field(0, "flag", FLAG_INIT)
            .and_then(|()| rsp.expect_field(1, "index", 0));
        if let Err(e) = checked {
            self.state = TransferState::Failed(Failure::InitRejected);
            return Err(e);
        }

        let total = match rsp.field(2) {
            Some(total) => total,
            None => {
                self.state = TransferState::Failed(Failure::InitRejected);
                return Err(Error::Malformed(
                    "read init response without chunk count".to_string(),
                ));
            }
        };
        let size = match rsp.field(3) {
            Some(size) => size,
            None => {
                self.state = TransferState::Failed(Failure::InitRejected);
                return Err(Error::Malformed(
                    "read init response without file size".to_string(),
                ));
            }
        };

        let max = total as u64 * CHUNK_SIZE as u64;
        let min = (total as u64).saturating_sub(1) * CHUNK_SIZE as u64;
        if (size as u64) > max || (size as u64) < min {
            self.state = TransferState::Failed(Failure::SizeMismatch);
            return Err(Error::SizeMismatch {
                chunks: total,
                size,
            });
        }

        debug!(
            "download of {} initiated, {} bytes in {} chunks",
            self.path, size, total
        );
        self.total = total;
        self.size = size;
        self.buf = Vec::with_capacity(size as usize);
        self.state = TransferState::Initiated;
        Ok(())
    }

    /// Request the next chunk, verify its echo and append its payload.
    pub fn step<T: Transport>(
        &mut self,
        link: &mut Link<T>,
    ) -> Result<TransferState, Error<T::Error>> {
        let index = match self.state {
            TransferState::Initiated => {
                if self.total == 0 {
                    self.state = TransferState::Completed;
                    return Ok(self.state);
                }
                1
            }
            TransferState::Transferring(i) => i,
            _ => return Ok(self.state),
        };

        let cmd = CommandFrame::chunked(
            MODULE_FILE,
            "FILE read",
            FLAG_DATA,
            index,
            self.total,
            self.size,
        )
        .with_arg(&*self.path);

        let bytes = match link.request(&cmd).and_then(|rsp| {
            rsp.expect_field(0, "flag", FLAG_DATA)?;
            rsp.expect_field(1, "index", index)?;
            rsp.expect_field(2, "total", self.total)?;
            rsp.expect_field(3, "size", self.size)?;
            let payload = rsp.payload.ok_or_else(|| {
                Error::Malformed(format!("chunk {} response without payload", index))
            })?;
            BASE64.decode(payload.as_bytes()).map_err(|e| {
                Error::Malformed(format!("chunk {} payload is not base64: {}", index, e))
            })
        }) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.state = TransferState::Failed(Failure::Chunk(index));
                return Err(e);
            }
        };

        self.buf.extend_from_slice(&bytes);

        if index == self.total {
            // the per-chunk echo checks should make this impossible
            if self.buf.len() != self.size as usize {
                self.state = TransferState::Failed(Failure::SizeMismatch);
                return Err(Error::SizeMismatch {
                    chunks: self.total,
                    size: self.size,
                });
            }
            self.state = TransferState::Completed;
        } else {
            self.state = TransferState::Transferring(index + 1);
        }
        Ok(self.state)
    }

    /// Drive the session to completion and hand out the reassembled bytes,
    /// calling `progress(i, total)` after every received chunk.
    pub fn run<T, F>(
        &mut self,
        link: &mut Link<T>,
        mut progress: F,
    ) -> Result<Vec<u8>, Error<T::Error>>
    where
        T: Transport,
        F: FnMut(u32, u32),
    {
        self.start(link)?;
        loop {
            match self.step(link)? {
                TransferState::Transferring(next) => progress(next - 1, self.total),
                TransferState::Completed => {
                    if self.total > 0 {
                        progress(self.total, self.total);
                    }
                    info!("downloaded {} bytes from {}", self.buf.len(), self.path);
                    return Ok(std::mem::take(&mut self.buf));
                }
                state => {
                    debug_assert!(false, "unexpected download state {:?}", state);
                    return Ok(Vec::new());
                }
            }
        }
    }

    /// Consume the session, yielding the bytes only if the transfer actually
    /// completed. A partial buffer is never handed out.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self.state {
            TransferState::Completed => Some(self.buf),
            _ => None,
        }
    }
}
