use std::io::ErrorKind as IoErrorKind;
use std::path::Path;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::serial::{Read, Write};
use linux_embedded_hal::serial_core::{
    BaudRate, CharSize, Error as SerialError, FlowControl, Parity, SerialDevice as _,
    SerialPortSettings as _, StopBits,
};
use linux_embedded_hal::{Delay, Serial};

use crate::protocol::SENTINEL;
use crate::{Link, Options, Transport};

/// Serial transport error, timeouts kept apart from I/O failures.
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum SerialLinkError {
    #[error("serial I/O: {0:?}")]
    Io(IoErrorKind),

    #[error("response timeout")]
    Timeout,

    #[error("response is not valid UTF-8")]
    Encoding,
}

/// Line transport over a Linux serial device, 8N1, no flow control.
pub struct SerialLink {
    port: Serial,
    delay: Delay,
    options: Options,
}

impl SerialLink {
    /// Open `port` at `baud` and apply the line settings the device expects.
    pub fn open<P: AsRef<Path>>(
        port: P,
        baud: usize,
        options: Options,
    ) -> Result<Self, SerialError> {
        let mut port = Serial::open(port.as_ref())?;

        let mut settings = port.0.read_settings()?;

        settings.set_char_size(CharSize::Bits8);
        settings.set_stop_bits(StopBits::Stop1);
        settings.set_baud_rate(BaudRate::from_speed(baud))?;
        settings.set_flow_control(FlowControl::FlowNone);
        settings.set_parity(Parity::ParityNone);

        port.0.write_settings(&settings)?;

        Ok(Self {
            port,
            delay: Delay {},
            options,
        })
    }
}

impl Transport for SerialLink {
    type Error = SerialLinkError;

    fn send(&mut self, frame: &str) -> Result<String, Self::Error> {
        for b in frame.as_bytes() {
            block!(self.port.write(*b)).map_err(SerialLinkError::Io)?;
        }
        block!(self.port.flush()).map_err(SerialLinkError::Io)?;

        // Accumulate until the device has sent the closing sentinel and the
        // line has gone quiet, or the overall timeout elapses.
        let mut buf: Vec<u8> = Vec::new();
        let mut waited = 0u32;
        let mut quiet = 0u32;

        loop {
            match self.port.read() {
                Ok(b) => {
                    buf.push(b);
                    quiet = 0;
                }
                Err(nb::Error::WouldBlock) => {
                    if ends_with_sentinel(&buf) {
                        quiet += self.options.poll_delay_ms;
                        if quiet >= self.options.settle_delay_ms {
                            break;
                        }
                    }

                    self.delay.delay_ms(self.options.poll_delay_ms);
                    waited += self.options.poll_delay_ms;

                    if waited > self.options.response_timeout_ms {
                        error!("receive timeout after {} ms", waited);
                        return Err(SerialLinkError::Timeout);
                    }
                }
                Err(nb::Error::Other(e)) => return Err(SerialLinkError::Io(e)),
            }
        }

        String::from_utf8(buf).map_err(|_| SerialLinkError::Encoding)
    }
}

fn ends_with_sentinel(buf: &[u8]) -> bool {
    buf.iter()
        .rev()
        .find(|&&b| !b" \t\r\n".contains(&b))
        .map(|&b| b == SENTINEL as u8)
        .unwrap_or(false)
}

impl Link<SerialLink> {
    /// Open a link over a Linux serial port.
    pub fn serial<P: AsRef<Path>>(
        port: P,
        baud: usize,
        options: Options,
    ) -> Result<Self, SerialError> {
        Ok(Link::new(SerialLink::open(port, baud, options)?))
    }
}
