//! Mailbox-driven automation
//!
//! Several devices can share one mailbox. A request is a message whose subject
//! carries the configured marker and, optionally, device tags in brackets:
//!
//! ```text
//! AUDIOBOOKS [kitchen] [bedroom]
//! ```
//!
//! A device only runs requests that name it (or name nobody) and that it has not
//! seen yet. After running one it either deletes the message, when every other
//! tagged device has already marked it seen, or adds its own `seen-<device>` flag.
//! Untagged requests are deleted by the first device that runs them.

use crate::config::MailConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Identifier of a message in a mailbox
pub type MessageId = u64;

/// One body part of an inbound message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailPart {
    /// `text/plain`
    Plain(String),
    /// `text/html`
    Html(String),
}

/// An inbound message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailMessage {
    /// Mailbox id
    pub id: MessageId,
    /// Sender address
    pub from: String,
    /// Subject line
    pub subject: String,
    /// Arrival time
    pub received: DateTime<Utc>,
    /// Body parts in MIME order
    pub parts: Vec<MailPart>,
    /// Keyword flags set on the message
    pub flags: BTreeSet<String>,
}

/// Search criteria for automation requests
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailQuery {
    /// Text the subject must contain (case-insensitive)
    pub subject_marker: String,
    /// Oldest arrival time considered
    pub since: DateTime<Utc>,
}

/// An IMAP-like mailbox
pub trait Mailbox: Send + Sync {
    /// Messages matching `query`, oldest first
    fn search(&self, query: &MailQuery) -> Result<Vec<MailMessage>>;

    /// Add a keyword flag to a message
    fn add_flag(&self, id: MessageId, flag: &str) -> Result<()>;

    /// Permanently delete a message
    fn delete(&self, id: MessageId) -> Result<()>;
}

/// Outbound report
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMail {
    /// Recipient addresses
    pub to: Vec<String>,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
}

/// SMTP-like sender for reports
pub trait MailSender: Send + Sync {
    /// Deliver one message
    fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// Mailbox kept in memory, shared by every clone
#[derive(Clone, Debug, Default)]
pub struct MemoryMailbox {
    inner: Arc<Mutex<MemoryMailboxState>>,
}

#[derive(Debug, Default)]
struct MemoryMailboxState {
    next_id: MessageId,
    messages: Vec<MailMessage>,
}

impl MemoryMailbox {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message and return its id
    pub fn deliver(
        &self,
        from: &str,
        subject: &str,
        parts: Vec<MailPart>,
        received: DateTime<Utc>,
    ) -> MessageId {
        let mut state = self.inner.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.messages.push(MailMessage {
            id,
            from: from.to_string(),
            subject: subject.to_string(),
            received,
            parts,
            flags: BTreeSet::new(),
        });
        id
    }

    /// Snapshot of every message
    pub fn messages(&self) -> Vec<MailMessage> {
        self.inner.lock().messages.clone()
    }

    /// A single message, if still present
    pub fn get(&self, id: MessageId) -> Option<MailMessage> {
        self.inner.lock().messages.iter().find(|m| m.id == id).cloned()
    }
}

impl Mailbox for MemoryMailbox {
    fn search(&self, query: &MailQuery) -> Result<Vec<MailMessage>> {
        let marker = query.subject_marker.to_lowercase();
        let mut found: Vec<MailMessage> = self
            .inner
            .lock()
            .messages
            .iter()
            .filter(|m| m.received >= query.since && m.subject.to_lowercase().contains(&marker))
            .cloned()
            .collect();
        found.sort_by_key(|m| (m.received, m.id));
        Ok(found)
    }

    fn add_flag(&self, id: MessageId, flag: &str) -> Result<()> {
        let mut state = self.inner.lock();
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::Mail(format!("no message {id}")))?;
        message.flags.insert(flag.to_string());
        Ok(())
    }

    fn delete(&self, id: MessageId) -> Result<()> {
        let mut state = self.inner.lock();
        let before = state.messages.len();
        state.messages.retain(|m| m.id != id);
        if state.messages.len() == before {
            return Err(Error::Mail(format!("no message {id}")));
        }
        Ok(())
    }
}

/// Sender that keeps every message in memory
#[derive(Clone, Debug, Default)]
pub struct MemoryOutbox {
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl MemoryOutbox {
    /// Create an empty outbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().clone()
    }
}

impl MailSender for MemoryOutbox {
    fn send(&self, mail: &OutgoingMail) -> Result<()> {
        self.sent.lock().push(mail.clone());
        Ok(())
    }
}

/// A request this device should run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailRequest {
    /// Mailbox id of the message
    pub id: MessageId,
    /// Sender, who also receives the report
    pub from: String,
    /// Script text extracted from the body
    pub script: String,
    /// Devices named in the subject (lower-case)
    pub tags: BTreeSet<String>,
    /// Flags on the message when it was fetched
    pub flags: BTreeSet<String>,
}

/// What happened to a request after it ran
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Every tagged device has seen it; removed from the mailbox
    Deleted,
    /// Other devices still have to run it; this device's flag was added
    Marked,
}

/// Device tags in a subject line: every `[tag]`, lower-cased
pub fn subject_tags(subject: &str) -> BTreeSet<String> {
    static TAG: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = TAG.get_or_init(|| Regex::new(r"\[([^\[\]\s]+)\]").ok()) else {
        return BTreeSet::new();
    };
    re.captures_iter(subject)
        .map(|c| c[1].to_lowercase())
        .collect()
}

/// Flag recording that `device` has processed a message
pub fn seen_flag(device: &str) -> String {
    format!("seen-{}", device.to_lowercase())
}

/// Body text of a message: the HTML part flattened, else the plain part
pub fn message_text(message: &MailMessage) -> Option<String> {
    let html = message.parts.iter().find_map(|p| match p {
        MailPart::Html(h) => Some(flatten_html(h)),
        MailPart::Plain(_) => None,
    });
    html.or_else(|| {
        message.parts.iter().find_map(|p| match p {
            MailPart::Plain(t) => Some(t.clone()),
            MailPart::Html(_) => None,
        })
    })
}

struct HtmlPatterns {
    hidden: Regex,
    breaks: Regex,
    tags: Regex,
}

fn html_patterns() -> Option<&'static HtmlPatterns> {
    static PATTERNS: OnceLock<Option<HtmlPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(HtmlPatterns {
                hidden: Regex::new(r"(?is)<(script|style|head)\b.*?</(script|style|head)\s*>").ok()?,
                breaks: Regex::new(r"(?i)<br\s*/?>|</(p|div|li|tr|h[1-6])\s*>").ok()?,
                tags: Regex::new(r"<[^>]*>").ok()?,
            })
        })
        .as_ref()
}

/// Reduce an HTML body to the text a script author typed
///
/// Line breaks and block ends become newlines, other tags vanish and the common
/// entities are decoded.
pub fn flatten_html(html: &str) -> String {
    let Some(p) = html_patterns() else {
        return html.to_string();
    };
    // Source newlines carry no meaning in HTML
    let text = html.replace(['\r', '\n'], " ");
    let text = p.hidden.replace_all(&text, "");
    let text = p.breaks.replace_all(&text, "\n");
    let text = p.tags.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// This device's view of a shared automation mailbox
#[derive(Clone)]
pub struct MailChannel {
    mailbox: Arc<dyn Mailbox>,
    device: String,
    subject_marker: String,
    recency_window: std::time::Duration,
}

impl MailChannel {
    /// Create a channel for the device configured in `config`
    pub fn new(mailbox: Arc<dyn Mailbox>, config: &MailConfig) -> Self {
        Self {
            mailbox,
            device: config.device_tag.to_lowercase(),
            subject_marker: config.subject_marker.clone(),
            recency_window: config.recency_window,
        }
    }

    /// Requests addressed to this device that it has not run yet
    pub fn fetch_requests(&self, now: DateTime<Utc>) -> Result<Vec<MailRequest>> {
        let window = chrono::Duration::from_std(self.recency_window)
            .map_err(|e| Error::Mail(format!("invalid recency window: {e}")))?;
        let query = MailQuery {
            subject_marker: self.subject_marker.clone(),
            since: now - window,
        };
        let my_flag = seen_flag(&self.device);

        let mut requests = Vec::new();
        for message in self.mailbox.search(&query)? {
            let tags = subject_tags(&message.subject);
            if !tags.is_empty() && !tags.contains(&self.device) {
                debug!(id = message.id, "request addressed to other devices");
                continue;
            }
            if message.flags.contains(&my_flag) {
                debug!(id = message.id, "request already seen");
                continue;
            }
            let Some(script) = message_text(&message) else {
                debug!(id = message.id, "request without a text body");
                continue;
            };
            requests.push(MailRequest {
                id: message.id,
                from: message.from,
                script,
                tags,
                flags: message.flags,
            });
        }
        info!(count = requests.len(), "fetched mail requests");
        Ok(requests)
    }

    /// Record that this device ran `request`, deleting it once nobody else needs it
    pub fn finalize(&self, request: &MailRequest) -> Result<Disposition> {
        let others_done = request
            .tags
            .iter()
            .filter(|t| **t != self.device)
            .all(|t| request.flags.contains(&seen_flag(t)));

        if others_done {
            self.mailbox.delete(request.id)?;
            info!(id = request.id, "request complete on every device, deleted");
            Ok(Disposition::Deleted)
        } else {
            self.mailbox.add_flag(request.id, &seen_flag(&self.device))?;
            info!(id = request.id, "request marked seen");
            Ok(Disposition::Marked)
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn channel(mailbox: &MemoryMailbox, device: &str) -> MailChannel {
        let config = MailConfig {
            device_tag: device.to_string(),
            ..Default::default()
        };
        MailChannel::new(Arc::new(mailbox.clone()), &config)
    }

    fn request_mail(mailbox: &MemoryMailbox, subject: &str) -> MessageId {
        mailbox.deliver(
            "parent@example.com",
            subject,
            vec![MailPart::Plain("books:books".to_string())],
            Utc::now(),
        )
    }

    #[test]
    fn tags_are_parsed_lower_case() {
        let tags = subject_tags("AUDIOBOOKS [Kitchen] [bedroom] [not a tag]");
        assert_eq!(
            tags.into_iter().collect::<Vec<_>>(),
            vec!["bedroom".to_string(), "kitchen".to_string()]
        );
    }

    #[test]
    fn last_tagged_device_deletes() {
        let mailbox = MemoryMailbox::new();
        let id = request_mail(&mailbox, "AUDIOBOOKS [a] [b]");
        mailbox.add_flag(id, &seen_flag("a")).unwrap();

        let b = channel(&mailbox, "b");
        let requests = b.fetch_requests(Utc::now()).unwrap();
        assert_eq!(requests.len(), 1);

        assert_eq!(b.finalize(&requests[0]).unwrap(), Disposition::Deleted);
        assert!(mailbox.get(id).is_none());
    }

    #[test]
    fn first_tagged_device_only_marks() {
        let mailbox = MemoryMailbox::new();
        let id = request_mail(&mailbox, "AUDIOBOOKS [a] [b]");

        let a = channel(&mailbox, "a");
        let requests = a.fetch_requests(Utc::now()).unwrap();
        assert_eq!(a.finalize(&requests[0]).unwrap(), Disposition::Marked);

        let message = mailbox.get(id).unwrap();
        assert!(message.flags.contains("seen-a"));
        // Not offered to `a` again
        assert!(a.fetch_requests(Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn other_devices_and_stale_mail_are_ignored() {
        let mailbox = MemoryMailbox::new();
        request_mail(&mailbox, "AUDIOBOOKS [kitchen]");
        request_mail(&mailbox, "unrelated subject");
        mailbox.deliver(
            "parent@example.com",
            "AUDIOBOOKS",
            vec![MailPart::Plain("exit:".to_string())],
            Utc::now() - chrono::Duration::days(30),
        );

        let requests = channel(&mailbox, "bedroom")
            .fetch_requests(Utc::now())
            .unwrap();

        assert!(requests.is_empty());
    }

    #[test]
    fn untagged_request_is_deleted_after_running() {
        let mailbox = MemoryMailbox::new();
        let id = request_mail(&mailbox, "audiobooks please");

        let device = channel(&mailbox, "device");
        let requests = device.fetch_requests(Utc::now()).unwrap();

        assert_eq!(requests[0].script, "books:books");
        assert_eq!(device.finalize(&requests[0]).unwrap(), Disposition::Deleted);
        assert!(mailbox.get(id).is_none());
    }

    #[test]
    fn html_part_is_preferred_and_flattened() {
        let message = MailMessage {
            id: 1,
            from: "a@example.com".to_string(),
            subject: "AUDIOBOOKS".to_string(),
            received: Utc::now(),
            parts: vec![
                MailPart::Plain("ignored".to_string()),
                MailPart::Html(
                    "<html><head><style>p {}</style></head><body>\
                     <p>books:rename &quot;Alpha&quot; &quot;Beta&quot;</p>\
                     <div>exit:<br></div></body></html>"
                        .to_string(),
                ),
            ],
            flags: BTreeSet::new(),
        };

        assert_eq!(
            message_text(&message).unwrap(),
            "books:rename \"Alpha\" \"Beta\"\nexit:"
        );
    }
}
