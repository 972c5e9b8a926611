//! Transport adapters
//!
//! Each adapter performs one external transfer and reports success, failure and
//! byte counts. None of them knows about candidates or the library.

pub mod download_manager;
pub mod ftp;
pub mod http;
pub mod mail;

// Re-exports
pub use download_manager::{
    DownloadAttempt, DownloadManager, DownloadRequest, DownloadState, DownloadStatus,
    ManagedDownload, RequestId,
};
pub use http::HttpDownloader;
pub use mail::{
    Disposition, MailChannel, MailMessage, MailPart, MailRequest, MailSender, Mailbox,
    MemoryMailbox, MemoryOutbox, OutgoingMail,
};
