//! Installer images published on a download mirror
//!
//! The newest image matching the stage's `files` globs is downloaded into
//! the stage cache, mounted with `fuseiso`, and its package list read from
//! the live metadata.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::cache;
use crate::command::CommandRunner;
use crate::config::{CACHE_MAX_AGE, ImageMirrorStage, RETAINED_IMAGES};
use crate::error::StageError;
use crate::package::Package;
use crate::package::metadata::{image_metadata_path, read_package_list};
use crate::sources::fetch::{fetch_with_snapshot, find_matching_urls};
use crate::sources::{StageContext, StageOutcome};

const STAGE_KIND: &str = "mirrorcache";
const INDEX_SNAPSHOT: &str = "index.html";
const MOUNT_DIR: &str = "mnt";
const DEFAULT_IMAGE_EXTENSION: &str = "iso";

pub async fn collect(
    stage: &ImageMirrorStage,
    ctx: &StageContext<'_>,
) -> Result<StageOutcome, StageError> {
    info!("Processing image mirror: {}", stage.name);

    let dir = ctx.layout.stage_dir(STAGE_KIND, &stage.name);
    let max_age = if ctx.no_cache {
        Duration::ZERO
    } else {
        CACHE_MAX_AGE
    };
    let html = fetch_with_snapshot(ctx.fetcher, &stage.url, &dir.join(INDEX_SNAPSHOT), max_age)
        .await?;

    let latest = latest_image_url(&stage.url, &html, &stage.files).ok_or_else(|| {
        StageError::NoImages {
            url: stage.url.clone(),
            patterns: stage.files.clone(),
        }
    })?;
    debug!("Latest image: {}", latest);

    let mut outcome = StageOutcome {
        image_url: Some(latest.clone()),
        ..Default::default()
    };

    let image = match download_image(ctx.runner, &latest, &dir).await {
        Ok(image) => image,
        Err(e) => {
            error!("Failed to download {}: {}", latest, e);
            return Ok(outcome);
        }
    };

    let extension = image
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or(DEFAULT_IMAGE_EXTENSION);
    if let Err(e) = cache::prune_oldest(&dir, extension, RETAINED_IMAGES) {
        warn!("Failed to prune images in {}: {}", ctx.layout.display(&dir), e);
    }

    match with_mounted_image(ctx.runner, &image, &dir.join(MOUNT_DIR), read_image_packages).await {
        Ok(packages) => {
            info!("Found {} packages in {}", packages.len(), latest);
            outcome.packages = packages;
        }
        Err(e) => error!("Failed to read packages from {}: {}", latest, e),
    }

    Ok(outcome)
}

/// Lexicographically last matching link, which is the newest build for
/// the usual date/build-number naming
pub fn latest_image_url(base_url: &str, html: &str, patterns: &[String]) -> Option<String> {
    find_matching_urls(base_url, html, patterns).into_iter().max()
}

/// Downloads `url` into `dir` unless an image of the same name is present
///
/// The transfer goes to a `.part` file first so an interrupted download is
/// never mistaken for a cached image.
pub async fn download_image(
    runner: &dyn CommandRunner,
    url: &str,
    dir: &Path,
) -> Result<PathBuf, StageError> {
    let file_name = url
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| StageError::InvalidUrl {
            url: url.to_string(),
            reason: "no file name".to_string(),
        })?;
    let image = dir.join(cache::sanitize(file_name));

    if image.is_file() {
        info!("In cache: {}", file_name);
        return Ok(image);
    }

    fs::create_dir_all(dir)?;
    let partial = image.with_extension("part");
    let partial_arg = partial.to_string_lossy();

    info!("Downloading {}", url);
    let result = runner
        .run(&[
            "curl",
            "-L",
            "--fail",
            "--silent",
            "--show-error",
            "-o",
            &partial_arg,
            url,
        ])
        .await;

    if let Err(e) = result {
        // Drop the partial transfer
        let _ = fs::remove_file(&partial);
        return Err(e.into());
    }

    fs::rename(&partial, &image)?;
    Ok(image)
}

/// Mounts `image` on `mount_point`, runs `read` on the mounted tree and
/// unmounts again
///
/// The unmount and mount point removal run whatever `read` returns.
pub async fn with_mounted_image<T>(
    runner: &dyn CommandRunner,
    image: &Path,
    mount_point: &Path,
    read: impl FnOnce(&Path) -> Result<T, StageError>,
) -> Result<T, StageError> {
    let mount_arg = mount_point.to_string_lossy();

    if mount_point.exists() {
        // Left behind by an interrupted run; may still be mounted
        debug!("Releasing stale mount point {:?}", mount_point);
        let _ = runner.run(&["fusermount", "-u", &mount_arg]).await;
    }
    fs::create_dir_all(mount_point)?;

    let image_arg = image.to_string_lossy();
    if let Err(e) = runner.run(&["fuseiso", &image_arg, &mount_arg]).await {
        remove_mount_point(mount_point);
        return Err(e.into());
    }
    debug!("Mounted {:?} on {:?}", image, mount_point);

    let result = read(mount_point);

    if let Err(e) = runner.run(&["fusermount", "-u", &mount_arg]).await {
        error!("Failed to unmount {:?}: {}", mount_point, e);
    }
    remove_mount_point(mount_point);

    result
}

fn remove_mount_point(mount_point: &Path) {
    // Never recursive: a failed unmount must not delete image content
    if let Err(e) = fs::remove_dir(mount_point) {
        warn!("Failed to remove mount point {:?}: {}", mount_point, e);
    }
}

fn read_image_packages(root: &Path) -> Result<Vec<Package>, StageError> {
    let path = image_metadata_path(root)?;
    Ok(read_package_list(&path)?)
}
