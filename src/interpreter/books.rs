//! `books:` handlers over the installed library

use super::command::{CleanScope, Target};
use super::context::{RunContext, Services};
use super::matching::unique_index;
use crate::error::Result;
use crate::library::LibraryEntry;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// One INFO line per installed book
pub(super) fn list(ctx: &mut RunContext, services: &Services) -> Result<()> {
    ctx.refresh_library(services);
    if ctx.library.entries().is_empty() {
        ctx.log.info("no books installed");
        return Ok(());
    }
    let lines: Vec<String> = ctx.library.entries().iter().map(describe).collect();
    for line in lines {
        ctx.log.info(line);
    }
    Ok(())
}

fn describe(entry: &LibraryEntry) -> String {
    let mut line = format!("{} ({})", entry.title, entry.book_dir.display());
    if entry.current {
        line.push_str(" [current]");
    }
    if entry.unwritable {
        line.push_str(" [read-only]");
    }
    line
}

/// Select books by scope, then delete them
pub(super) fn clean(ctx: &mut RunContext, services: &Services, scope: CleanScope) -> Result<()> {
    ctx.refresh_library(services);
    for entry in ctx.library.entries_mut() {
        entry.selected = match scope {
            CleanScope::All => true,
            CleanScope::Current => entry.current,
        };
    }
    let selected: Vec<LibraryEntry> = ctx
        .library
        .entries()
        .iter()
        .filter(|e| e.selected)
        .cloned()
        .collect();
    if selected.is_empty() {
        ctx.log.mild(match scope {
            CleanScope::All => "no books to delete",
            CleanScope::Current => "no book is loaded in the player",
        });
        return Ok(());
    }

    let mut deleted = 0;
    for entry in &selected {
        match ctx.library.delete_book(entry) {
            Ok(()) => {
                ctx.log.info(format!("deleted \"{}\"", entry.title));
                deleted += 1;
            }
            Err(e) => ctx.log.record(&e),
        }
    }
    info!(deleted, requested = selected.len(), "clean finished");
    if deleted > 0 {
        ctx.sync_library(services, &[]);
    }
    Ok(())
}

fn find(ctx: &mut RunContext, services: &Services, pattern: &str) -> Result<LibraryEntry> {
    ctx.refresh_library(services);
    let index = unique_index(ctx.library.entries(), pattern, LibraryEntry::matches)?;
    let entry = &mut ctx.library.entries_mut()[index];
    entry.selected = true;
    Ok(entry.clone())
}

/// Delete the one book matching `pattern`
pub(super) fn delete(ctx: &mut RunContext, services: &Services, pattern: &str) -> Result<()> {
    let entry = find(ctx, services, pattern)?;
    ctx.library.delete_book(&entry)?;
    ctx.log.info(format!("deleted \"{}\"", entry.title));
    ctx.sync_library(services, &[]);
    Ok(())
}

/// Rename the one book matching `pattern`
pub(super) fn rename(
    ctx: &mut RunContext,
    services: &Services,
    pattern: &str,
    new_title: &str,
) -> Result<()> {
    let entry = find(ctx, services, pattern)?;
    let dest = ctx.library.rename_book(&entry, new_title)?;
    ctx.log.info(format!(
        "renamed \"{}\" to \"{}\"",
        entry.title,
        new_title.trim()
    ));
    ctx.sync_library(services, &[dest]);
    Ok(())
}

/// Move the saved playback position of one book, or all of them
pub(super) fn reset(
    ctx: &mut RunContext,
    services: &Services,
    target: &Target,
    position: Duration,
) -> Result<()> {
    let books: Vec<(String, PathBuf)> = match target {
        Target::All => {
            ctx.refresh_library(services);
            ctx.library
                .entries()
                .iter()
                .map(|e| (e.title.clone(), e.book_dir.clone()))
                .collect()
        }
        Target::Matching(pattern) => {
            let entry = find(ctx, services, pattern)?;
            vec![(entry.title, entry.book_dir)]
        }
    };

    for (title, book_dir) in books {
        match services.host.reset_position(&book_dir, position) {
            Ok(()) => ctx.log.info(format!(
                "reset \"{title}\" to {}",
                format_position(position)
            )),
            Err(e) => ctx.log.record(&e),
        }
    }
    Ok(())
}

fn format_position(position: Duration) -> String {
    let secs = position.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}
