//! Parse stage: one script line to one typed [`Command`]
//!
//! The first token up to and including its first colon is the dispatch key. Text
//! after the colon in that same token is the first operand, so `books:delete` and
//! `books: delete` read the same. Each command takes only the operands it knows;
//! anything left over is reported as an unrecognized operand before the command
//! runs.

use super::tokenizer::{Token, tokenize};
use crate::error::ScriptError;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

/// Transfer scheme of a fetch command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    /// Local file, directory or archive
    File,
    /// Plain HTTP
    Http,
    /// HTTPS
    Https,
    /// FTP (parsed, never supported)
    Ftp,
}

/// Books a command applies to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Every book or candidate
    All,
    /// The single item matching a partial title
    Matching(String),
}

/// Scope of `books:clean`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanScope {
    /// Every installed book
    All,
    /// Only the book loaded in the player
    Current,
}

/// Boolean settings scripts may change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Setting {
    /// Keep staged sources after install
    Retain,
    /// Zero-pad numbers in installed file names
    Rename,
}

impl Setting {
    /// Name used in scripts and reports
    pub fn name(self) -> &'static str {
        match self {
            Setting::Retain => "retain",
            Setting::Rename => "rename",
        }
    }
}

/// One parsed script line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `file:`, `http:`, `https:`, `ftp:`
    Fetch {
        /// Transfer scheme
        scheme: Scheme,
        /// Path or URL
        location: String,
        /// Stage only, do not install
        download_only: bool,
        /// Library name to install under
        new_title: Option<String>,
    },
    /// `books:books`
    ListBooks,
    /// `books:clean all|current`
    CleanBooks(CleanScope),
    /// `books:delete <partial>`
    DeleteBook(String),
    /// `books:rename <partial> <new>`
    RenameBook {
        /// Partial title of the book
        pattern: String,
        /// New directory name
        new_title: String,
    },
    /// `books:reset <all|partial> [duration]`
    ResetBooks {
        /// Books to reset
        target: Target,
        /// New playback position
        position: Duration,
    },
    /// `downloads:books`
    ListDownloads,
    /// `downloads:directory <path>`
    StagingDirectory(PathBuf),
    /// `downloads:install <all|partial> [new]`
    InstallDownloads {
        /// Candidates to install
        target: Target,
        /// Library name for a single candidate
        new_title: Option<String>,
    },
    /// `downloads:delete <all|partial>`
    DeleteDownloads(Target),
    /// `settings:<name> [value]`
    Setting {
        /// Which toggle
        setting: Setting,
        /// New value; `None` queries
        value: Option<bool>,
    },
    /// `mailto:<address>`
    MailTo(String),
    /// `exit:`
    Exit,
}

impl Command {
    /// Whether running this command can add, remove or rename books
    pub fn changes_library(&self) -> bool {
        match self {
            Command::Fetch { download_only, .. } => !download_only,
            Command::CleanBooks(_)
            | Command::DeleteBook(_)
            | Command::RenameBook { .. }
            | Command::InstallDownloads { .. } => true,
            _ => false,
        }
    }
}

/// Operands of one line, consumed front to back
#[derive(Debug)]
pub struct Operands {
    command: String,
    items: VecDeque<Token>,
}

impl Operands {
    fn new(command: &str, items: VecDeque<Token>) -> Self {
        Self {
            command: command.to_string(),
            items,
        }
    }

    /// Consume the next operand if it is the bare keyword `keyword` (any case)
    pub fn take_keyword(&mut self, keyword: &str) -> bool {
        match self.items.front() {
            Some(t) if !t.quoted && t.text.eq_ignore_ascii_case(keyword) => {
                self.items.pop_front();
                true
            }
            _ => false,
        }
    }

    /// Consume the bare keyword `keyword` wherever it appears
    pub fn take_flag(&mut self, keyword: &str) -> bool {
        let position = self
            .items
            .iter()
            .position(|t| !t.quoted && t.text.eq_ignore_ascii_case(keyword));
        match position {
            Some(i) => {
                self.items.remove(i);
                true
            }
            None => false,
        }
    }

    /// Consume the next operand if it is quoted
    pub fn take_quoted(&mut self) -> Option<String> {
        match self.items.front() {
            Some(t) if t.quoted => self.items.pop_front().map(|t| t.text),
            _ => None,
        }
    }

    /// Consume the next operand if it is bare
    pub fn take_bare(&mut self) -> Option<String> {
        match self.items.front() {
            Some(t) if !t.quoted => self.items.pop_front().map(|t| t.text),
            _ => None,
        }
    }

    /// Consume the next operand, quoted or not
    pub fn take_text(&mut self) -> Option<String> {
        self.items.pop_front().map(|t| t.text)
    }

    /// Consume the next operand or report it missing
    pub fn require_text(&mut self, expected: &str) -> Result<String, ScriptError> {
        self.take_text().ok_or_else(|| ScriptError::MissingOperand {
            command: self.command.clone(),
            expected: expected.to_string(),
        })
    }

    /// Fail on the first operand nobody consumed
    pub fn finish(mut self) -> Result<(), ScriptError> {
        match self.items.pop_front() {
            Some(t) => Err(ScriptError::UnrecognizedOperand(t.text)),
            None => Ok(()),
        }
    }
}

/// Parse one line; `None` for blank and comment-only lines
pub fn parse_line(line: &str) -> Result<Option<Command>, ScriptError> {
    let mut tokens: VecDeque<Token> = tokenize(line)?.into();
    let Some(first) = tokens.pop_front() else {
        return Ok(None);
    };

    let (key, rest) = match first.text.find(':') {
        Some(i) => (first.text[..=i].to_lowercase(), &first.text[i + 1..]),
        None => return Err(ScriptError::UnknownCommand(first.text)),
    };
    let carry = |text: String| Token {
        text,
        quoted: first.quoted,
    };

    // URLs keep their scheme; every other key's remainder is the first operand
    let scheme = match key.as_str() {
        "file:" => Some(Scheme::File),
        "http:" => Some(Scheme::Http),
        "https:" => Some(Scheme::Https),
        "ftp:" => Some(Scheme::Ftp),
        _ => None,
    };
    if let Some(scheme) = scheme {
        let location = match scheme {
            Scheme::File => rest.to_string(),
            _ => format!("{key}{rest}"),
        };
        if !rest.is_empty() {
            tokens.push_front(carry(location));
        }
        let ops = Operands::new(&key, tokens);
        return parse_fetch(scheme, ops).map(Some);
    }

    if !rest.is_empty() {
        tokens.push_front(carry(rest.to_string()));
    }
    let mut ops = Operands::new(&key, tokens);
    let command = match key.as_str() {
        "books:" => parse_books(&mut ops)?,
        "downloads:" => parse_downloads(&mut ops)?,
        "settings:" => parse_settings(&mut ops)?,
        "mailto:" => Command::MailTo(ops.require_text("an address")?),
        "exit:" => Command::Exit,
        _ => return Err(ScriptError::UnknownCommand(key)),
    };
    ops.finish()?;
    Ok(Some(command))
}

fn parse_fetch(scheme: Scheme, mut ops: Operands) -> Result<Command, ScriptError> {
    let location = ops.require_text("a location")?;
    let download_only = ops.take_flag("downloadonly");
    let new_title = ops.take_quoted();
    ops.finish()?;
    Ok(Command::Fetch {
        scheme,
        location,
        download_only,
        new_title,
    })
}

fn parse_target(ops: &mut Operands, expected: &str) -> Result<Target, ScriptError> {
    if ops.take_keyword("all") {
        return Ok(Target::All);
    }
    ops.require_text(expected).map(Target::Matching)
}

fn parse_books(ops: &mut Operands) -> Result<Command, ScriptError> {
    let verb = ops.take_bare().unwrap_or_default().to_lowercase();
    match verb.as_str() {
        "" | "books" | "list" => Ok(Command::ListBooks),
        "clean" => {
            if ops.take_keyword("all") {
                Ok(Command::CleanBooks(CleanScope::All))
            } else if ops.take_keyword("current") {
                Ok(Command::CleanBooks(CleanScope::Current))
            } else {
                Err(ScriptError::MissingOperand {
                    command: "books:clean".to_string(),
                    expected: "all or current".to_string(),
                })
            }
        }
        "delete" => Ok(Command::DeleteBook(ops.require_text("a partial title")?)),
        "rename" => {
            let pattern = ops.require_text("a partial title")?;
            let new_title = ops.require_text("a new title")?;
            Ok(Command::RenameBook { pattern, new_title })
        }
        "reset" => {
            let target = parse_target(ops, "all or a partial title")?;
            let position = match ops.take_bare() {
                Some(text) => parse_duration(&text).ok_or(ScriptError::InvalidOperand {
                    what: "duration".to_string(),
                    value: text,
                })?,
                None => Duration::ZERO,
            };
            Ok(Command::ResetBooks { target, position })
        }
        other => Err(ScriptError::UnknownCommand(format!("books:{other}"))),
    }
}

fn parse_downloads(ops: &mut Operands) -> Result<Command, ScriptError> {
    let verb = ops.take_bare().unwrap_or_default().to_lowercase();
    match verb.as_str() {
        "" | "books" | "list" => Ok(Command::ListDownloads),
        "directory" => Ok(Command::StagingDirectory(PathBuf::from(
            ops.require_text("a directory")?,
        ))),
        "install" => {
            let target = parse_target(ops, "all or a partial title")?;
            // A new title only makes sense for a single candidate
            let new_title = match target {
                Target::Matching(_) => ops.take_text(),
                Target::All => None,
            };
            Ok(Command::InstallDownloads { target, new_title })
        }
        "delete" => Ok(Command::DeleteDownloads(parse_target(
            ops,
            "all or a partial title",
        )?)),
        other => Err(ScriptError::UnknownCommand(format!("downloads:{other}"))),
    }
}

fn parse_settings(ops: &mut Operands) -> Result<Command, ScriptError> {
    let name = ops.require_text("a setting name")?.to_lowercase();
    let setting = match name.as_str() {
        "retain" => Setting::Retain,
        "rename" => Setting::Rename,
        _ => {
            return Err(ScriptError::InvalidOperand {
                what: "setting".to_string(),
                value: name,
            });
        }
    };
    let value = match ops.take_bare() {
        None => None,
        Some(text) => Some(parse_bool(&text).ok_or(ScriptError::InvalidOperand {
            what: "boolean".to_string(),
            value: text,
        })?),
    };
    Ok(Command::Setting { setting, value })
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

/// Parse `h:mm:ss`, `mm:ss`, plain seconds, or unit form such as `1h30m`, `90s`
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.contains(':') {
        let parts: Vec<u64> = text
            .split(':')
            .map(|p| p.parse::<u64>().ok())
            .collect::<Option<_>>()?;
        let secs = match parts.as_slice() {
            [m, s] if *s < 60 => m.checked_mul(60)?.checked_add(*s)?,
            [h, m, s] if *m < 60 && *s < 60 => h.checked_mul(3600)?.checked_add(m * 60 + s)?,
            _ => return None,
        };
        return Some(Duration::from_secs(secs));
    }

    if let Ok(secs) = text.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let unit = match ch.to_ascii_lowercase() {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        let value: u64 = digits.parse().ok()?;
        total = total.checked_add(value.checked_mul(unit)?)?;
        digits.clear();
    }
    if !digits.is_empty() {
        return None;
    }
    Some(Duration::from_secs(total))
}
