//! Utility functions for file operations and path manipulation

use reqwest::header::HeaderMap;
use std::path::Path;

/// Free and total size of a filesystem
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpaceInfo {
    /// Bytes available to unprivileged users
    pub available: u64,
    /// Total size of the filesystem in bytes
    pub total: u64,
}

impl SpaceInfo {
    /// Free space as a percentage of the filesystem size
    pub fn free_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.available as f64 * 100.0 / self.total as f64
    }
}

/// Get available and total disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Linux/macOS: statvfs
/// - Windows: GetDiskFreeSpaceExW
pub fn get_space_info(path: &Path) -> std::io::Result<SpaceInfo> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid, null-terminated C string, stat is zero-initialised,
        // and the struct is only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail is available blocks for unprivileged users,
            // f_frsize is the fragment size (preferred over f_bsize)
            let frsize = stat.f_frsize as u64;
            Ok(SpaceInfo {
                available: (stat.f_bavail as u64).saturating_mul(frsize),
                total: (stat.f_blocks as u64).saturating_mul(frsize),
            })
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is a valid, null-terminated wide string and all output
        // pointers refer to properly aligned u64 locals read only after success.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(SpaceInfo {
                available: free_bytes_available,
                total: total_bytes,
            })
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = path;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}

/// Whether two existing paths live on the same filesystem
///
/// A rename between them is then possible without copying. Returns `false` when
/// either path cannot be inspected or the platform offers no device ids.
pub fn same_filesystem(a: &Path, b: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        match (std::fs::metadata(a), std::fs::metadata(b)) {
            (Ok(ma), Ok(mb)) => ma.dev() == mb.dev(),
            _ => false,
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (a, b);
        false
    }
}

/// Whether a directory exists and this process may create entries in it
///
/// On unix the kernel answers via `access(2)`, so ownership and read-only mounts
/// count, not just the permission bits.
pub fn is_writable_dir(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
            return false;
        };
        // SAFETY: c_path is a valid, null-terminated C string that outlives the call.
        unsafe { libc::access(c_path.as_ptr(), libc::W_OK | libc::X_OK) == 0 }
    }

    #[cfg(not(unix))]
    {
        std::fs::metadata(path)
            .map(|meta| !meta.permissions().readonly())
            .unwrap_or(false)
    }
}

/// Whether the file extension matches one of `extensions` (case-insensitive, no dots)
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy();
            extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
        }
        None => false,
    }
}

/// Whether a path names a zip archive
pub fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Whether a directory entry name is hidden or one of our own temporary trees
pub fn is_ignored_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Extract the target filename of an HTTP download
///
/// Tries the Content-Disposition header first, falls back to the last URL path
/// segment, and finally to "download". Unlike a display name, the extension is kept
/// because the scanner relies on it to recognise audio files and archives.
pub fn extract_filename_from_headers(headers: &HeaderMap, url: &str) -> String {
    if let Some(content_disposition) = headers.get("content-disposition")
        && let Ok(value) = content_disposition.to_str()
    {
        // Format: attachment; filename="book.zip" or filename*=UTF-8''book.zip
        for part in value.split(';') {
            let part = part.trim();
            if let Some(name) = part.strip_prefix("filename=") {
                let name = name.trim_matches('"');
                if let Some(clean) = sanitize_filename(name) {
                    return clean;
                }
            } else if let Some(encoded) = part.strip_prefix("filename*=") {
                if let Some(idx) = encoded.rfind('\'')
                    && let Ok(decoded) = urlencoding::decode(&encoded[idx + 1..])
                    && let Some(clean) = sanitize_filename(&decoded)
                {
                    return clean;
                }
            }
        }
    }

    if let Ok(parsed_url) = url::Url::parse(url)
        && let Some(mut segments) = parsed_url.path_segments()
        && let Some(last_segment) = segments.next_back()
        && !last_segment.is_empty()
    {
        let decoded = urlencoding::decode(last_segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| last_segment.to_string());
        if let Some(clean) = sanitize_filename(&decoded) {
            return clean;
        }
    }

    "download".to_string()
}

/// Strip any directory components so a remote name cannot escape the staging dir
fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}
