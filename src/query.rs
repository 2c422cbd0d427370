//! One-shot display and dumper queries.
//!
//! Each query is a single round trip whose answer splits into a metadata and
//! a content section at fixed textual markers. A response missing a marker
//! is an explicit `InvalidAnswer`, so callers can render a diagnostic
//! instead of crashing. Cyclic polling is the caller's scheduling concern;
//! the library only exposes the one-shot operation.

use crate::listing;
use crate::protocol::{CommandFrame, MODULE_DISPLAY, MODULE_DUMP};
use crate::{Error, Link, Transport};

/// Page number the device treats as "currently shown page".
pub const CURRENT_PAGE: u32 = 255;

/// Marker opening the display answer.
pub const DISPLAY_MARKER: &str = "Display Info:";

/// Marker separating display metadata from page content.
pub const CONTENT_MARKER: &str = "Content:";

/// Marker opening the dumper `dump` answer.
pub const DUMP_MARKER: &str = "Dumper dump:";

/// Metadata and content of one display page.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DisplayPage {
    pub page: u32,
    pub info: String,
    pub content: String,
}

impl<T: Transport> Link<T> {
    /// Fetch one display page ([`CURRENT_PAGE`] selects whatever is shown).
    pub fn display_read(&mut self, page: u32) -> Result<DisplayPage, Error<T::Error>> {
        let rsp = self.request(&CommandFrame::page(MODULE_DISPLAY, "read", page))?;

        let at = rsp.message.find(DISPLAY_MARKER).ok_or_else(|| {
            Error::InvalidAnswer(format!("display answer without '{}'", DISPLAY_MARKER))
        })?;
        let body = &rsp.message[at + DISPLAY_MARKER.len()..];

        let cut = body.find(CONTENT_MARKER).ok_or_else(|| {
            Error::InvalidAnswer(format!("display answer without '{}'", CONTENT_MARKER))
        })?;

        Ok(DisplayPage {
            page,
            info: body[..cut].to_string(),
            content: strip_sentinel(&body[cut + CONTENT_MARKER.len()..]).to_string(),
        })
    }

    /// List the installed dump-capable modules, device order preserved.
    pub fn dump_list(&mut self) -> Result<Vec<String>, Error<T::Error>> {
        let rsp = self.request(&CommandFrame::bare(MODULE_DUMP, "list"))?;
        listing::parse_module_list(&rsp.message)
    }

    /// Fetch one dump for `module`.
    pub fn dump(&mut self, module: &str) -> Result<String, Error<T::Error>> {
        let rsp = self.request(&CommandFrame::plain(MODULE_DUMP, "dump").with_arg(module))?;

        let at = rsp.message.find(DUMP_MARKER).ok_or_else(|| {
            Error::InvalidAnswer(format!("dump answer without '{}'", DUMP_MARKER))
        })?;
        Ok(strip_sentinel(&rsp.message[at + DUMP_MARKER.len()..]).to_string())
    }
}

fn strip_sentinel(s: &str) -> &str {
    let s = s.trim_end();
    s.strip_suffix('#').unwrap_or(s).trim_end()
}
