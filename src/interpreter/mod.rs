//! Remote command interpreter
//!
//! Runs a line-oriented script from the control file or a mail body. Each line is
//! parsed into a [`Command`] first, so a malformed line (unknown keyword, missing
//! or leftover operand) is reported without side effects. Commands then run in
//! order against a [`RunContext`]; every failure lands in the run's error log and
//! processing continues with the next line. `exit:` stops the script.
//!
//! ```text
//! // install everything staged, keeping the sources
//! settings:retain yes
//! downloads:install all
//! https://example.com/books/gruffalo.zip "The Gruffalo"
//! books:rename "bear hunt" "Going on a Bear Hunt"
//! mailto:parent@example.com
//! ```

mod books;
mod command;
mod context;
mod downloads;
mod matching;
mod settings;
mod tokenizer;
mod transfer;

pub use command::{CleanScope, Command, Scheme, Setting, Target, parse_duration, parse_line};
pub use context::{RunContext, Services};
pub use matching::unique_index;
pub use tokenizer::{Token, tokenize};

pub(crate) use downloads::override_name;

use crate::error::{Error, Result};
use tracing::{debug, info, warn};

/// Executes scripts against a set of [`Services`]
pub struct Interpreter<'a> {
    services: &'a Services,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }

    /// Run every line of `script`, stopping early at `exit:`
    pub fn run(&self, script: &str, ctx: &mut RunContext) {
        for (number, line) in script.lines().enumerate() {
            if ctx.stopped {
                debug!(line = number + 1, "script stopped, ignoring remaining lines");
                break;
            }
            let command = match parse_line(line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    warn!(line = number + 1, error = %e, "rejected script line");
                    ctx.log.record(&Error::from(e));
                    continue;
                }
            };
            debug!(line = number + 1, ?command, "running");
            if let Err(e) = self.execute(&command, ctx) {
                warn!(line = number + 1, error = %e, "command failed");
                ctx.log.record(&e);
            }
        }
        info!(
            entries = ctx.log.entries().len(),
            stopped = ctx.stopped,
            "script finished"
        );
    }

    /// Run one parsed command
    pub fn execute(&self, command: &Command, ctx: &mut RunContext) -> Result<()> {
        let services = self.services;
        match command {
            Command::Fetch {
                scheme,
                location,
                download_only,
                new_title,
            } => transfer::fetch(
                ctx,
                services,
                *scheme,
                location,
                *download_only,
                new_title.as_deref(),
            ),
            Command::ListBooks => books::list(ctx, services),
            Command::CleanBooks(scope) => books::clean(ctx, services, *scope),
            Command::DeleteBook(pattern) => books::delete(ctx, services, pattern),
            Command::RenameBook { pattern, new_title } => {
                books::rename(ctx, services, pattern, new_title)
            }
            Command::ResetBooks { target, position } => {
                books::reset(ctx, services, target, *position)
            }
            Command::ListDownloads => downloads::list(ctx, services),
            Command::StagingDirectory(path) => {
                downloads::set_directory(ctx, services, path.clone())
            }
            Command::InstallDownloads { target, new_title } => {
                downloads::install(ctx, services, target, new_title.as_deref())
            }
            Command::DeleteDownloads(target) => downloads::delete(ctx, services, target),
            Command::Setting { setting, value } => {
                settings::apply(ctx, services, *setting, *value);
                Ok(())
            }
            Command::MailTo(address) => {
                if !ctx.recipients.contains(address) {
                    ctx.recipients.push(address.clone());
                }
                ctx.log.info(format!("report will also go to {address}"));
                Ok(())
            }
            Command::Exit => {
                ctx.stopped = true;
                Ok(())
            }
        }
    }
}
