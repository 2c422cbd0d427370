//! Parsers for the device's flat LittleFS listing and the dumper module list.
//!
//! `FILE list` reports the whole tree as one newline-delimited sequence of
//! paths, directories carrying a trailing `/` and files optionally carrying
//! an inline `*size` suffix. There is no hierarchical listing command; a
//! directory view is a depth-1 projection filtered out of the flat list.

use crate::Error;

/// Marker opening the `FILE list` status message.
pub const LISTING_MARKER: &str = "directory of LittleFS:";

/// Marker opening the dumper `list` status message.
pub const DUMP_LIST_MARKER: &str = "Dumper list:";

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EntryKind {
    Directory,
    File,
}

/// One node of the remote tree, straight from the flat listing.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DirectoryEntry {
    pub path: String,
    pub kind: EntryKind,
    /// File size in bytes when the listing carried one; directories and
    /// size-less file entries have none.
    pub size: Option<u64>,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line == "#" {
            return None;
        }

        if line.ends_with('/') {
            return Some(Self {
                path: line.to_string(),
                kind: EntryKind::Directory,
                size: None,
            });
        }

        // files may carry an inline size after a `*` delimiter
        if let Some(at) = line.rfind('*') {
            if let Ok(size) = line[at + 1..].trim().parse::<u64>() {
                return Some(Self {
                    path: line[..at].to_string(),
                    kind: EntryKind::File,
                    size: Some(size),
                });
            }
        }

        Some(Self {
            path: line.to_string(),
            kind: EntryKind::File,
            size: None,
        })
    }
}

/// Parse the `FILE list` status message into the flat entry sequence.
///
/// The device reports every node of the tree below the root; `/` itself is
/// implicit and always included here.
pub fn parse_listing<E: core::fmt::Debug>(
    message: &str,
) -> Result<Vec<DirectoryEntry>, Error<E>> {
    let at = message.find(LISTING_MARKER).ok_or_else(|| {
        Error::InvalidAnswer(format!("listing without '{}' marker", LISTING_MARKER))
    })?;
    let body = &message[at + LISTING_MARKER.len()..];

    let mut entries = vec![DirectoryEntry {
        path: "/".to_string(),
        kind: EntryKind::Directory,
        size: None,
    }];
    for line in body.lines() {
        if let Some(entry) = DirectoryEntry::from_line(line) {
            if entry.path != "/" {
                entries.push(entry);
            }
        }
    }

    Ok(entries)
}

/// Depth-1 view of `base`: immediate children only, the base itself excluded.
///
/// Directories come first, both groups sorted lexicographically by path.
/// Deeper descendants stay reachable by re-selecting into a child directory.
pub fn dir_view<'a>(base: &str, entries: &'a [DirectoryEntry]) -> Vec<&'a DirectoryEntry> {
    let mut dirs: Vec<&DirectoryEntry> = Vec::new();
    let mut files: Vec<&DirectoryEntry> = Vec::new();

    for entry in entries {
        if entry.path == base {
            continue;
        }
        let rest = match entry.path.strip_prefix(base) {
            Some(rest) if !rest.is_empty() => rest,
            _ => continue,
        };
        let seps = rest.matches('/').count();
        if seps > 1 || (seps == 1 && !rest.ends_with('/')) {
            continue;
        }
        match entry.kind {
            EntryKind::Directory => dirs.push(entry),
            EntryKind::File => files.push(entry),
        }
    }

    dirs.sort_by(|a, b| a.path.cmp(&b.path));
    files.sort_by(|a, b| a.path.cmp(&b.path));
    dirs.into_iter().chain(files).collect()
}

/// Every directory of the tree, for base-directory selection.
pub fn directories(entries: &[DirectoryEntry]) -> Vec<&DirectoryEntry> {
    entries.iter().filter(|e| e.is_dir()).collect()
}

/// Parse the dumper `list` message into module names.
///
/// The payload is comma-and-space delimited with a trailing sentinel to
/// strip; device order is preserved, not re-sorted.
pub fn parse_module_list<E: core::fmt::Debug>(message: &str) -> Result<Vec<String>, Error<E>> {
    let at = message.find(DUMP_LIST_MARKER).ok_or_else(|| {
        Error::InvalidAnswer(format!("module list without '{}' marker", DUMP_LIST_MARKER))
    })?;
    let body = message[at + DUMP_LIST_MARKER.len()..].trim();
    let body = body.strip_suffix('#').unwrap_or(body);

    Ok(body
        .split(", ")
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect())
}
