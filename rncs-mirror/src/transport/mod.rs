//! Remote transport abstraction.
//!
//! The engine needs two things from the server: the raw text of a directory
//! listing, and the bytes of a named file streamed into a local sink. This
//! abstraction allows the crawler and file sync to be tested against
//! in-memory transports.

mod ftps;

use std::fmt;
use std::io::Write;

use url::Url;

use crate::error::MirrorResult;

pub use ftps::{FtpsTransport, TransportConfig};

/// Username/password pair passed through to the server.
///
/// Owned by the caller; the engine never persists it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Trait for remote file server operations.
///
/// Calls are blocking and made one at a time.
pub trait RemoteTransport: Send + Sync {
    /// Retrieve the raw listing of the directory at `url`.
    ///
    /// `url` ends with `/`.
    fn list(&self, url: &str, credentials: &Credentials) -> MirrorResult<String>;

    /// Stream the file at `url` into `sink`, chunk by chunk.
    ///
    /// Returns the number of bytes written. If `sink` fails, the transfer is
    /// aborted and a transport error is returned; the caller owning the sink
    /// knows the underlying cause.
    fn fetch(&self, url: &str, credentials: &Credentials, sink: &mut dyn Write)
        -> MirrorResult<u64>;
}

impl<T: RemoteTransport + ?Sized> RemoteTransport for &T {
    fn list(&self, url: &str, credentials: &Credentials) -> MirrorResult<String> {
        (**self).list(url, credentials)
    }

    fn fetch(
        &self,
        url: &str,
        credentials: &Credentials,
        sink: &mut dyn Write,
    ) -> MirrorResult<u64> {
        (**self).fetch(url, credentials, sink)
    }
}

/// Ensure a directory URL ends with exactly one `/`.
pub fn dir_url(url: &str) -> String {
    format!("{}/", url.trim_end_matches('/'))
}

/// URL of entry `name` inside the directory `parent`.
///
/// `name` is percent-encoded as one path segment, so `#`, `?`, `%` and spaces
/// reach the server as part of the file name.
pub fn child_url(parent: &str, name: &str) -> String {
    let parent = dir_url(parent);
    let Ok(mut url) = Url::parse(&parent) else {
        return format!("{}{}", parent, name);
    };
    match url.path_segments_mut() {
        Ok(mut segments) => {
            segments.pop_if_empty().push(name);
        }
        Err(()) => return format!("{}{}", parent, name),
    }
    String::from(url)
}

/// Swap the extension of the last path segment of `url`.
///
/// Returns `None` when the last segment has no extension.
pub fn with_url_extension(url: &str, extension: &str) -> Option<String> {
    let segment_start = url.rfind('/').map_or(0, |i| i + 1);
    let dot = url[segment_start..].rfind('.')? + segment_start;
    if dot == segment_start {
        return None;
    }
    Some(format!("{}.{}", &url[..dot], extension))
}
