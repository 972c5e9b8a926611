use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// FTP fetch
///
/// `ftp:` commands parse like any other transfer but no FTP client is wired in, so
/// every fetch reports the transport as unsupported.
pub fn fetch(url: &str, _dest_dir: &Path) -> Result<PathBuf> {
    warn!(url, "ftp transfer requested");
    Err(Error::NotSupported(format!("ftp transfers ({url})")))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ftp_is_reported_unsupported() {
        let err = fetch("ftp://example.com/book.zip", Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
        assert!(err.to_string().contains("ftp://example.com/book.zip"));
    }
}
