//! Host-side link to the RP2040 COM frame protocol.
//!
//! Commands and responses are single text frames terminated by a `#`
//! sentinel; file payloads travel as base64-encoded chunks of at most
//! 128 bytes against the device's LittleFS storage.

#[macro_use]
extern crate log;

#[macro_use(block)]
extern crate nb;

extern crate embedded_hal;

use thiserror::Error;

pub mod protocol;

pub mod listing;

pub mod transfer;

pub mod files;

pub mod query;

#[cfg(feature = "linux")]
extern crate linux_embedded_hal;

#[cfg(feature = "linux")]
pub mod linux;

use crate::protocol::{CommandFrame, ResponseFrame};

/// Blocking request/response channel to the device.
///
/// `send` must deliver one complete command frame and return the one
/// response the device answers with. Read timeouts are the transport's
/// concern, but they must surface as an error, never as an empty response.
pub trait Transport {
    type Error: core::fmt::Debug;

    fn send(&mut self, frame: &str) -> Result<String, Self::Error>;
}

#[derive(Clone, PartialEq, Debug, Error)]
pub enum Error<E: core::fmt::Debug> {
    /// Failure at the serial channel itself (I/O or timeout).
    #[error("transport failure: {0:?}")]
    Transport(E),

    /// Response text does not match the expected frame shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Frame was well formed but the device did not answer `OK`.
    #[error("device reported failure: {0}")]
    NotOk(String),

    /// An echoed numeric field disagrees with what the request sent.
    #[error("echo mismatch on {field}: sent 0x{sent:x}, device echoed 0x{echoed:x}")]
    FieldMismatch {
        field: &'static str,
        sent: u32,
        echoed: u32,
    },

    /// Declared file size is inconsistent with the declared chunk count.
    #[error("file size {size} inconsistent with {chunks} chunks")]
    SizeMismatch { chunks: u32, size: u32 },

    /// A payload marker is absent where the operation requires one.
    #[error("invalid answer: {0}")]
    InvalidAnswer(String),
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "structopt", derive(structopt::StructOpt))]
pub struct Options {
    /// Timeout to wait for a complete device response
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "2000"))]
    pub response_timeout_ms: u32,

    /// Period to poll the serial line for response bytes
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1"))]
    pub poll_delay_ms: u32,

    /// Quiet period after the closing sentinel before a response counts as complete
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "5"))]
    pub settle_delay_ms: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            response_timeout_ms: 2000,
            poll_delay_ms: 1,
            settle_delay_ms: 5,
        }
    }
}

/// One command/response channel to the device.
///
/// Owns the transport exclusively; every operation takes `&mut self`, so at
/// most one frame is ever in flight and chunk order is request order.
pub struct Link<T: Transport> {
    transport: T,
}

impl<T: Transport> Link<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Send one command frame and parse the device's answer.
    ///
    /// The echoed module tag and operation name must match the request;
    /// anything else cannot be the answer to this command. Numeric echo
    /// fields are the engines' business and are not checked here.
    pub fn request(&mut self, cmd: &CommandFrame) -> Result<ResponseFrame, Error<T::Error>> {
        if let Some(arg) = cmd.arg() {
            // The protocol defines no quote escaping, reject rather than
            // emit a frame the device would mis-split.
            if arg.contains('"') {
                return Err(Error::Malformed(format!(
                    "argument contains an unescapable '\"': {}",
                    arg
                )));
            }
        }

        let wire = cmd.encode();
        debug!("-> {}", wire);

        let raw = self.transport.send(&wire).map_err(Error::Transport)?;
        debug!("<- {}", raw.trim_end());

        let rsp = protocol::parse(&raw)?;
        if rsp.module != cmd.module || rsp.operation != cmd.operation {
            return Err(Error::Malformed(format!(
                "response for '{},{}' does not answer '{},{}'",
                rsp.module, rsp.operation, cmd.module, cmd.operation
            )));
        }

        Ok(rsp)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandFrame, MODULE_FILE};
    use crate::testutil::ScriptedPort;

    #[test]
    fn request_rejects_wrong_operation_echo() {
        let port = ScriptedPort::new(vec!["A:F0,FILE read#OK-#"]);
        let mut link = Link::new(port);

        let err = link
            .request(&CommandFrame::bare(MODULE_FILE, "FILE list"))
            .unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[test]
    fn request_rejects_unescapable_argument() {
        let port = ScriptedPort::new(Vec::<&str>::new());
        let mut link = Link::new(port);

        let cmd = CommandFrame::plain(MODULE_FILE, "FILE delete").with_arg("a\"b");
        let err = link.request(&cmd).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));

        // nothing went out on the wire
        assert!(link.into_inner().sent.is_empty());
    }

    #[test]
    fn request_surfaces_transport_failure() {
        let port = ScriptedPort::new(Vec::<&str>::new());
        let mut link = Link::new(port);

        let err = link
            .request(&CommandFrame::bare(MODULE_FILE, "FILE list"))
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
