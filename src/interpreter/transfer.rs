//! Fetch commands: bring one item into staging, then install it

use super::command::Scheme;
use super::context::{RunContext, Services};
use super::downloads::override_name;
use crate::error::{Error, InstallError, Result};
use crate::transport::{DownloadRequest, HttpDownloader, ManagedDownload, ftp};
use crate::tree::{build_atomically, copy_file, copy_tree, discard, rename_no_replace, temp_sibling};
use crate::types::Event;
use crate::utils::extract_filename_from_headers;
use reqwest::header::HeaderMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fetch `location` into staging and, unless `download_only`, install it
pub(super) fn fetch(
    ctx: &mut RunContext,
    services: &Services,
    scheme: Scheme,
    location: &str,
    download_only: bool,
    new_title: Option<&str>,
) -> Result<()> {
    std::fs::create_dir_all(&ctx.staging_dir).map_err(|e| InstallError::CreateDirFailed {
        path: ctx.staging_dir.clone(),
        reason: e.to_string(),
    })?;

    let staged = match scheme {
        Scheme::Ftp => ftp::fetch(location, &ctx.staging_dir)?,
        Scheme::File => stage_local(Path::new(location), &ctx.staging_dir)?,
        Scheme::Http | Scheme::Https => download(services, location, &ctx.staging_dir)?,
    };
    info!(location, ?staged, "fetched into staging");

    if download_only {
        ctx.log
            .info(format!("downloaded {location} to {}", staged.display()));
        return Ok(());
    }

    ctx.rescan(services);
    let Some(index) = ctx.pending.iter().position(|c| c.source == staged) else {
        return Err(Error::NotFound(format!(
            "audio in {}",
            staged.display()
        )));
    };
    for (i, candidate) in ctx.pending.iter_mut().enumerate() {
        candidate.selected = i == index;
    }
    if let Some(new_title) = new_title {
        override_name(
            &mut ctx.pending[index],
            new_title,
            &services.config.library.volumes,
        )?;
    }
    ctx.install_selected(services);
    Ok(())
}

/// Copy a local file or tree into staging; items already staged are used in place
fn stage_local(source: &Path, staging: &Path) -> Result<PathBuf> {
    if !source.exists() {
        return Err(Error::NotFound(source.display().to_string()));
    }
    if source.parent() == Some(staging) {
        debug!(?source, "already in staging");
        return Ok(source.to_path_buf());
    }
    let name = source
        .file_name()
        .ok_or_else(|| Error::NotFound(source.display().to_string()))?;
    let dest = staging.join(name);
    if dest.exists() {
        return Err(InstallError::DestinationExists { path: dest }.into());
    }

    if source.is_dir() {
        build_atomically(&dest, |temp| copy_tree(source, temp).map(|_| ()))?;
    } else {
        let temp = temp_sibling(&dest);
        let copied = copy_file(source, &temp).and_then(|_| rename_no_replace(&temp, &dest));
        if let Err(e) = copied {
            discard(&temp);
            return Err(e);
        }
    }
    Ok(dest)
}

/// Download through the platform manager when there is one, else directly
fn download(services: &Services, url: &str, staging: &Path) -> Result<PathBuf> {
    let events = services.events.clone();
    let mut progress = move |transferred: u64, total: Option<u64>| {
        events.send(Event::DownloadProgress { transferred, total }).ok();
    };

    let download = &services.config.download;
    match &services.downloads {
        Some(manager) if download.use_download_manager => {
            let destination = staging.join(extract_filename_from_headers(&HeaderMap::new(), url));
            if destination.exists() {
                return Err(InstallError::DestinationExists { path: destination }.into());
            }
            ManagedDownload::new(
                manager.as_ref(),
                download.poll_interval,
                download.retries_max,
                download.cancels_max,
            )
            .with_cancellation(services.cancel.clone())
            .run(
                DownloadRequest {
                    uri: url.to_string(),
                    destination,
                },
                &mut progress,
            )
        }
        _ => HttpDownloader::new(download.retry.clone())?
            .with_cancellation(services.cancel.clone())
            .download(url, staging, &mut progress),
    }
}
