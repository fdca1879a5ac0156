//! Directory listing parser.
//!
//! Turns the free-text payload of an FTP `LIST` request into typed entries.
//! The server speaks a fixed-column Unix dialect:
//!
//! ```text
//! -rwxr-xr-x 1 ftp ftp 1234 Jan 01 00:00 report.zip
//! drwxr-xr-x 2 ftp ftp 4096 Jan 01 00:00 2019
//! ```
//!
//! Lines that do not match the dialect are dropped silently. The dialect sits
//! behind [`ListingParser`] so the crawler never depends on it directly.

use std::sync::OnceLock;

use regex::Regex;

/// Kind of a listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// File or directory.
    pub kind: EntryKind,
    /// Entry name, the remainder of the listing line.
    pub name: String,
    /// Reported size in bytes. Always `None` for directories.
    pub size_bytes: Option<u64>,
}

impl RemoteEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>, size_bytes: Option<u64>) -> Self {
        Self {
            kind: EntryKind::File,
            name: name.into(),
            size_bytes,
        }
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Directory,
            name: name.into(),
            size_bytes: None,
        }
    }

    /// Returns true for directory entries.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Parses raw listing payloads into entries.
pub trait ListingParser: Send + Sync {
    /// Lazily parse `payload`, yielding one entry per recognised line.
    fn parse<'a>(&self, payload: &'a str) -> Box<dyn Iterator<Item = RemoteEntry> + 'a>;
}

/// Parser for the fixed-column Unix listing served by the RNCS FTPS host.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixListingParser;

impl ListingParser for UnixListingParser {
    fn parse<'a>(&self, payload: &'a str) -> Box<dyn Iterator<Item = RemoteEntry> + 'a> {
        Box::new(parse_listing(payload))
    }
}

/// Get the listing line pattern.
///
/// We capture:
/// - Group 1: type flag (`d` or `-`)
/// - Group 2: size digits (may be empty)
/// - Group 3: name (rest of the line after the 14-char date field)
fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // ([-d])       - type flag
        // [-rwxd]{9}   - permission bits
        // .*?ftp.*?ftp - owner and group markers
        // ([0-9]*)     - size
        // .{14}        - " Mon DD HH:MM " date/time field
        // (.*)         - name
        Regex::new(r"^([-d])[-rwxd]{9}.*?ftp.*?ftp *([0-9]*).{14}(.*)$").unwrap()
    })
}

/// Parse one listing line.
///
/// Returns `None` for lines outside the dialect and for the `.`/`..`
/// pseudo-entries some servers emit.
pub fn parse_line(line: &str) -> Option<RemoteEntry> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let caps = line_pattern().captures(line)?;

    let name = caps.get(3)?.as_str();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    match caps.get(1)?.as_str() {
        "d" => Some(RemoteEntry::directory(name)),
        _ => {
            // An empty or oversized size field leaves the entry usable.
            let size = caps.get(2).and_then(|m| m.as_str().parse::<u64>().ok());
            Some(RemoteEntry::file(name, size))
        }
    }
}

/// Parse a whole listing payload, one entry per matching line.
pub fn parse_listing(payload: &str) -> impl Iterator<Item = RemoteEntry> + '_ {
    payload.lines().filter_map(parse_line)
}
