//! Frame encoding and parsing for the COM wire protocol.
//!
//! Request:  `S:<module>,<operation>[,<fields>...][,"<arg>"]#`
//!
//! Response: `A:<module>,<operation>[,<fields>...][,"<payload>"]#<STATUS>-<message>[#]`
//!
//! The status token is the literal `OK` prefix on success; anything else is a
//! protocol-level failure. Chunk-transfer commands render their four numeric
//! fields (flag, index, total, size) as `0x`-prefixed hexadecimal, the simple
//! maintenance and query commands use plain decimal literals. Response fields
//! are always parsed base-16, with an optional `0x` prefix accepted.

use crate::Error;

/// Frame sentinel terminating every command and response.
pub const SENTINEL: char = '#';

/// Success marker opening the status section of a response.
pub const STATUS_OK: &str = "OK-";

/// Module tag of the LittleFS file storage module.
pub const MODULE_FILE: &str = "F0";

/// Module tag of the display module.
pub const MODULE_DISPLAY: &str = "D0";

/// Module tag of the dump/diagnostics module.
pub const MODULE_DUMP: &str = "I0";

/// Fixed payload size of one file chunk, both directions.
pub const CHUNK_SIZE: usize = 128;

/// Flag field value of a transfer init frame.
pub const FLAG_INIT: u32 = 0x0;

/// Flag field value of a transfer data frame.
pub const FLAG_DATA: u32 = 0x0d;

#[derive(Copy, Clone, PartialEq, Debug)]
enum Radix {
    Dec,
    Hex,
}

#[derive(Copy, Clone, PartialEq, Debug)]
struct Field {
    value: u32,
    radix: Radix,
}

/// Outgoing command frame.
#[derive(Clone, PartialEq, Debug)]
pub struct CommandFrame {
    pub module: &'static str,
    pub operation: &'static str,
    fields: Vec<Field>,
    arg: Option<String>,
}

impl CommandFrame {
    /// Command without numeric fields (`FILE list`, dumper `list`).
    pub fn bare(module: &'static str, operation: &'static str) -> Self {
        Self {
            module,
            operation,
            fields: Vec::new(),
            arg: None,
        }
    }

    /// Command with a single decimal field (display page select).
    pub fn page(module: &'static str, operation: &'static str, page: u32) -> Self {
        Self {
            module,
            operation,
            fields: vec![Field {
                value: page,
                radix: Radix::Dec,
            }],
            arg: None,
        }
    }

    /// Maintenance command carrying the conventional four zero fields
    /// (`FILE delete`, `FILE mkdir`, `FILE rmdir`, dumper `dump`).
    pub fn plain(module: &'static str, operation: &'static str) -> Self {
        Self {
            module,
            operation,
            fields: vec![
                Field {
                    value: 0,
                    radix: Radix::Dec,
                };
                4
            ],
            arg: None,
        }
    }

    /// Chunk-transfer command: flag, index, total and size as hexadecimal.
    pub fn chunked(
        module: &'static str,
        operation: &'static str,
        flag: u32,
        index: u32,
        total: u32,
        size: u32,
    ) -> Self {
        let fields = [flag, index, total, size]
            .iter()
            .map(|&value| Field {
                value,
                radix: Radix::Hex,
            })
            .collect();
        Self {
            module,
            operation,
            fields,
            arg: None,
        }
    }

    /// Attach the quoted string argument (path, module name or payload).
    pub fn with_arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.arg = Some(arg.into());
        self
    }

    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }

    /// Render the frame as wire text.
    pub fn encode(&self) -> String {
        let mut s = String::with_capacity(32 + self.arg.as_ref().map_or(0, |a| a.len()));
        s.push_str("S:");
        s.push_str(self.module);
        s.push(',');
        s.push_str(self.operation);
        for f in &self.fields {
            match f.radix {
                Radix::Dec => s.push_str(&format!(",{}", f.value)),
                Radix::Hex => s.push_str(&format!(",0x{:x}", f.value)),
            }
        }
        if let Some(arg) = &self.arg {
            s.push_str(",\"");
            s.push_str(arg);
            s.push('"');
        }
        s.push(SENTINEL);
        s
    }
}

/// Parsed device response.
#[derive(Clone, PartialEq, Debug)]
pub struct ResponseFrame {
    pub module: String,
    pub operation: String,
    /// Echoed numeric fields in wire order (flag, index, total, size).
    pub fields: Vec<u32>,
    /// Quoted payload argument, quotes stripped.
    pub payload: Option<String>,
    /// Status text after the `OK-` marker, trailing sentinel stripped.
    pub message: String,
}

impl ResponseFrame {
    /// Echoed field by position.
    pub fn field(&self, i: usize) -> Option<u32> {
        self.fields.get(i).copied()
    }

    /// Verify one echoed field against the value the request sent.
    pub fn expect_field<E: core::fmt::Debug>(
        &self,
        i: usize,
        field: &'static str,
        sent: u32,
    ) -> Result<(), Error<E>> {
        match self.field(i) {
            Some(echoed) if echoed == sent => Ok(()),
            Some(echoed) => Err(Error::FieldMismatch {
                field,
                sent,
                echoed,
            }),
            None => Err(Error::Malformed(format!(
                "response is missing the echoed '{}' field",
                field
            ))),
        }
    }
}

/// Parse one response frame.
///
/// `Malformed` covers every shape violation: missing `A:` marker, missing
/// sentinel, unparseable numeric field, unterminated quoted payload. A well
/// shaped frame whose status section lacks the `OK` token is `NotOk` and
/// carries the device's status text.
pub fn parse<E: core::fmt::Debug>(raw: &str) -> Result<ResponseFrame, Error<E>> {
    let text = raw.trim();

    let text = text
        .strip_prefix("A:")
        .ok_or_else(|| Error::Malformed(format!("not an answer frame: {}", shorten(text))))?;

    let cut = text
        .find(SENTINEL)
        .ok_or_else(|| Error::Malformed("answer frame without sentinel".to_string()))?;
    let (echo, status) = text.split_at(cut);
    let status = &status[1..];

    // closing frame sentinel, if the transport captured it
    let status = status.strip_suffix(SENTINEL).unwrap_or(status);
    let message = match status.strip_prefix(STATUS_OK) {
        Some(m) => m.to_string(),
        None => return Err(Error::NotOk(status.trim().to_string())),
    };

    let mut parts = echo.split(',');
    let module = parts
        .next()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| Error::Malformed("answer frame without module tag".to_string()))?;
    let operation = parts
        .next()
        .filter(|o| !o.is_empty())
        .ok_or_else(|| Error::Malformed("answer frame without operation name".to_string()))?;

    let rest: Vec<&str> = parts.collect();
    let mut fields = Vec::new();
    let mut payload = None;
    for (i, part) in rest.iter().enumerate() {
        if let Some(quoted) = part.strip_prefix('"') {
            // the quoted payload is always the last field
            if i != rest.len() - 1 {
                return Err(Error::Malformed(
                    "quoted payload is not the last field".to_string(),
                ));
            }
            let inner = quoted.strip_suffix('"').ok_or_else(|| {
                Error::Malformed("unterminated quoted payload".to_string())
            })?;
            payload = Some(inner.to_string());
        } else {
            let value = parse_field(part).ok_or_else(|| {
                Error::Malformed(format!("unparseable numeric field '{}'", part))
            })?;
            fields.push(value);
        }
    }

    Ok(ResponseFrame {
        module: module.to_string(),
        operation: operation.to_string(),
        fields,
        payload,
        message,
    })
}

fn parse_field(s: &str) -> Option<u32> {
    let t = s.trim();
    let t = t
        .strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(t);
    u32::from_str_radix(t, 16).ok()
}

fn shorten(s: &str) -> String {
    match s.char_indices().nth(40) {
        Some((at, _)) => format!("{}...", &s[..at]),
        None => s.to_string(),
    }
}
