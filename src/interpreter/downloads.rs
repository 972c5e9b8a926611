//! `downloads:` handlers over the staged candidates

use super::command::Target;
use super::context::{RunContext, Services};
use super::matching::unique_index;
use crate::error::{Error, Result};
use crate::host::SETTING_STAGING_DIR;
use crate::library::valid_book_name;
use crate::tree::delete_tree;
use crate::types::Candidate;
use std::path::PathBuf;
use tracing::info;

/// One INFO line per staged candidate
pub(super) fn list(ctx: &mut RunContext, services: &Services) -> Result<()> {
    ctx.rescan(services);
    if ctx.pending.is_empty() {
        ctx.log.info(format!(
            "nothing staged in {}",
            ctx.staging_dir.display()
        ));
        return Ok(());
    }
    let lines: Vec<String> = ctx
        .pending
        .iter()
        .map(|c| {
            let mut line = format!("{} ({})", c.display_title, c.source.display());
            if c.collides {
                line.push_str(" [already installed]");
            }
            line
        })
        .collect();
    for line in lines {
        ctx.log.info(line);
    }
    Ok(())
}

/// Switch the staging directory for this run and later runs
pub(super) fn set_directory(
    ctx: &mut RunContext,
    services: &Services,
    path: PathBuf,
) -> Result<()> {
    if !path.is_dir() {
        return Err(Error::NotFound(format!(
            "staging directory {}",
            path.display()
        )));
    }
    services
        .settings
        .set_string(SETTING_STAGING_DIR, &path.to_string_lossy());
    ctx.staging_dir = path;
    ctx.rescan(services);
    ctx.log.info(format!(
        "staging directory is now {} ({} candidates)",
        ctx.staging_dir.display(),
        ctx.pending.len()
    ));
    Ok(())
}

/// Give a candidate a new library name and recompute its collision flag
pub(crate) fn override_name(
    candidate: &mut Candidate,
    new_name: &str,
    volumes: &[PathBuf],
) -> Result<()> {
    let name = valid_book_name(new_name)?;
    candidate.library_name = name.to_string();
    candidate.collides = volumes.iter().any(|v| v.join(name).exists());
    info!(name, collides = candidate.collides, "library name overridden");
    Ok(())
}

fn select(ctx: &mut RunContext, target: &Target) -> Result<Option<usize>> {
    match target {
        Target::All => {
            for candidate in &mut ctx.pending {
                candidate.selected = true;
            }
            Ok(None)
        }
        Target::Matching(pattern) => {
            let index = unique_index(&ctx.pending, pattern, Candidate::matches)?;
            for (i, candidate) in ctx.pending.iter_mut().enumerate() {
                candidate.selected = i == index;
            }
            Ok(Some(index))
        }
    }
}

/// Install one candidate (optionally under a new name) or all of them
pub(super) fn install(
    ctx: &mut RunContext,
    services: &Services,
    target: &Target,
    new_title: Option<&str>,
) -> Result<()> {
    ctx.rescan(services);
    if ctx.pending.is_empty() {
        ctx.log.info("nothing to install");
        return Ok(());
    }
    if let Some(index) = select(ctx, target)?
        && let Some(new_title) = new_title
    {
        override_name(&mut ctx.pending[index], new_title, &services.config.library.volumes)?;
    }
    let outcome = ctx.install_selected(services);
    info!(
        installed = outcome.installed.len(),
        filesystems_full = outcome.filesystems_full,
        "downloads:install finished"
    );
    Ok(())
}

/// Delete staged sources
pub(super) fn delete(ctx: &mut RunContext, services: &Services, target: &Target) -> Result<()> {
    ctx.rescan(services);
    if ctx.pending.is_empty() {
        ctx.log.info("nothing staged to delete");
        return Ok(());
    }
    select(ctx, target)?;

    let mut kept = Vec::with_capacity(ctx.pending.len());
    for candidate in std::mem::take(&mut ctx.pending) {
        if !candidate.selected {
            kept.push(candidate);
            continue;
        }
        match delete_tree(&candidate.source) {
            Ok(()) => ctx
                .log
                .info(format!("deleted staged \"{}\"", candidate.display_title)),
            Err(e) => {
                ctx.log.record(&e);
                kept.push(Candidate {
                    selected: false,
                    ..candidate
                });
            }
        }
    }
    ctx.pending = kept;
    Ok(())
}
