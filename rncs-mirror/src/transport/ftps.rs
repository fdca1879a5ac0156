//! FTPS transport backed by libcurl.
//!
//! TLS is required on both the control and the data channel. `ftp://` URLs
//! upgrade with `AUTH TLS` (explicit FTPS) and fail if the server refuses;
//! `ftps://` URLs connect with implicit TLS. Each call opens its own easy
//! handle; calls are sequential.
//!
//! Listing lines that are not valid UTF-8 are skipped with a warning: a name
//! that cannot be represented cannot be requested back either.

use std::io::Write;
use std::time::Duration;

use curl::easy::Easy;
use tracing::{debug, warn};

use super::{Credentials, RemoteTransport};
use crate::error::{MirrorError, MirrorResult};

/// Default connect timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default stall detection: abort below 1 byte/s for 120s.
const DEFAULT_LOW_SPEED_LIMIT: u32 = 1;
const DEFAULT_LOW_SPEED_TIME_SECS: u64 = 120;

/// Deadlines and TLS settings for the FTPS transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Connection establishment deadline.
    pub connect_timeout: Duration,
    /// Whole-call deadline. `None` lets large archives take as long as they
    /// keep making progress.
    pub timeout: Option<Duration>,
    /// Abort when throughput stays below this many bytes/s ...
    pub low_speed_limit: u32,
    /// ... for this long.
    pub low_speed_time: Duration,
    /// Verify the server certificate and host name.
    pub verify_peer: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            timeout: None,
            low_speed_limit: DEFAULT_LOW_SPEED_LIMIT,
            low_speed_time: Duration::from_secs(DEFAULT_LOW_SPEED_TIME_SECS),
            verify_peer: true,
        }
    }
}

impl TransportConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_low_speed(mut self, limit: u32, time: Duration) -> Self {
        self.low_speed_limit = limit;
        self.low_speed_time = time;
        self
    }

    pub fn with_verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Seconds reported in timeout errors.
    fn deadline_secs(&self) -> u64 {
        self.timeout
            .unwrap_or(self.low_speed_time)
            .as_secs()
            .max(self.connect_timeout.as_secs())
    }
}

/// FTPS client over libcurl.
#[derive(Debug, Clone, Default)]
pub struct FtpsTransport {
    config: TransportConfig,
}

impl FtpsTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Build an easy handle with URL, credentials, TLS and deadlines set.
    fn handle(&self, url: &str, credentials: &Credentials) -> Result<Easy, curl::Error> {
        let mut easy = Easy::new();
        easy.url(url)?;
        easy.username(&credentials.user)?;
        easy.password(&credentials.password)?;
        require_tls(&mut easy)?;
        easy.ssl_verify_peer(self.config.verify_peer)?;
        easy.ssl_verify_host(self.config.verify_peer)?;
        easy.connect_timeout(self.config.connect_timeout)?;
        if let Some(timeout) = self.config.timeout {
            easy.timeout(timeout)?;
        }
        easy.low_speed_limit(self.config.low_speed_limit)?;
        easy.low_speed_time(self.config.low_speed_time)?;
        Ok(easy)
    }

    fn map_error(&self, url: &str, err: curl::Error) -> MirrorError {
        if err.is_operation_timedout() {
            MirrorError::Timeout {
                url: url.to_string(),
                timeout_secs: self.config.deadline_secs(),
            }
        } else if err.is_write_error() {
            MirrorError::Transport {
                url: url.to_string(),
                reason: "transfer aborted by local writer".to_string(),
            }
        } else {
            MirrorError::Transport {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Require TLS for the control and data connections.
///
/// The safe binding has no setter for `CURLOPT_USE_SSL`.
fn require_tls(easy: &mut Easy) -> Result<(), curl::Error> {
    // SAFETY: `easy.raw()` is a live handle owned by `easy`, and
    // CURLOPT_USE_SSL takes a long.
    let rc = unsafe {
        curl_sys::curl_easy_setopt(
            easy.raw(),
            curl_sys::CURLOPT_USE_SSL,
            curl_sys::CURLUSESSL_ALL as libc::c_long,
        )
    };
    if rc == curl_sys::CURLE_OK {
        Ok(())
    } else {
        Err(curl::Error::new(rc))
    }
}

/// Decode a listing payload line by line, dropping lines that are not UTF-8.
fn decode_listing(url: &str, payload: &[u8]) -> String {
    let mut text = String::with_capacity(payload.len());
    for line in payload.split_inclusive(|&b| b == b'\n') {
        match std::str::from_utf8(line) {
            Ok(line) => text.push_str(line),
            Err(_) => warn!(
                url,
                line = %String::from_utf8_lossy(line).trim_end(),
                "listing line is not UTF-8, skipping"
            ),
        }
    }
    text
}

impl RemoteTransport for FtpsTransport {
    fn list(&self, url: &str, credentials: &Credentials) -> MirrorResult<String> {
        debug!(url, "LIST");
        let mut easy = self
            .handle(url, credentials)
            .map_err(|e| self.map_error(url, e))?;

        // Buffer the whole payload; a line may straddle two chunks.
        let mut payload = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| {
                    payload.extend_from_slice(data);
                    Ok(data.len())
                })
                .map_err(|e| self.map_error(url, e))?;
            transfer.perform().map_err(|e| self.map_error(url, e))?;
        }

        Ok(decode_listing(url, &payload))
    }

    fn fetch(
        &self,
        url: &str,
        credentials: &Credentials,
        sink: &mut dyn Write,
    ) -> MirrorResult<u64> {
        debug!(url, "RETR");
        let mut easy = self
            .handle(url, credentials)
            .map_err(|e| self.map_error(url, e))?;

        let mut written = 0u64;
        {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| match sink.write_all(data) {
                    Ok(()) => {
                        written += data.len() as u64;
                        Ok(data.len())
                    }
                    // A short count makes libcurl abort with CURLE_WRITE_ERROR.
                    Err(_) => Ok(0),
                })
                .map_err(|e| self.map_error(url, e))?;
            transfer.perform().map_err(|e| self.map_error(url, e))?;
        }

        Ok(written)
    }
}
