//! Screenshot capture and tall-page partitioning
//!
//! Pages taller than `maxScreenshotHeight` are captured once as a full-page
//! raster, then cut into evenly sized horizontal bands, one file per band.

use crate::{artifact_filename, device_slug, url_slug, AuditError, PageDriver, PageJob};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One screenshot file produced for a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    /// 1-based band number, `None` for a single capture
    pub part_index: Option<u32>,
    pub part_count: Option<u32>,
}

/// A horizontal band `[start, end)` of the document, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    /// 1-based
    pub index: u32,
    pub start: u32,
    pub end: u32,
}

impl Band {
    pub fn height(&self) -> u32 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub total_height: u32,
    pub part_height: u32,
    pub bands: Vec<Band>,
}

impl PartitionPlan {
    pub fn part_count(&self) -> u32 {
        self.bands.len() as u32
    }

    pub fn is_split(&self) -> bool {
        self.bands.len() > 1
    }
}

/// Split `height` into `ceil(height / max_height)` contiguous bands of even height
///
/// Parts are evened out rather than filled to `max_height`, so the last band
/// is never a thin sliver. No band is taller than `max_height`.
///
/// # Examples
///
/// ```rust
/// use page_audit::plan_partition;
///
/// let plan = plan_partition(10_000, 4_000);
/// assert_eq!(plan.part_count(), 3);
/// assert_eq!(plan.part_height, 3_334);
/// assert_eq!(plan.bands.last().unwrap().end, 10_000);
/// ```
pub fn plan_partition(height: u32, max_height: u32) -> PartitionPlan {
    let max_height = max_height.max(1);
    if height <= max_height {
        return PartitionPlan {
            total_height: height,
            part_height: height,
            bands: vec![Band {
                index: 1,
                start: 0,
                end: height,
            }],
        };
    }

    let num_parts = height.div_ceil(max_height);
    let part_height = height.div_ceil(num_parts);

    let bands = (0..num_parts)
        .map(|i| Band {
            index: i + 1,
            start: i * part_height,
            end: ((i + 1) * part_height).min(height),
        })
        .filter(|band| band.start < band.end)
        .collect();

    PartitionPlan {
        total_height: height,
        part_height,
        bands,
    }
}

/// Removes the intermediate full-page raster when dropped
struct TransientRaster {
    path: PathBuf,
}

impl Drop for TransientRaster {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Capture one or more screenshot files for a loaded, settled page
pub async fn capture_screenshots(
    page: &dyn PageDriver,
    job: &PageJob,
    output_dir: &Path,
) -> Result<Vec<Artifact>, AuditError> {
    let config = &job.config;

    let plan = match (config.full_page, config.max_screenshot_height.pixels()) {
        (true, Some(max_height)) => {
            let height = page.document_height().await?;
            Some(plan_partition(height, max_height)).filter(PartitionPlan::is_split)
        }
        _ => None,
    };

    match plan {
        None => {
            let bytes = page.screenshot(config.full_page).await?;
            let filename = artifact_filename(&job.url, &job.device, None);
            tokio::fs::write(output_dir.join(&filename), bytes)
                .await
                .map_err(|e| AuditError::Capture(format!("{filename}: {e}")))?;

            Ok(vec![Artifact {
                filename,
                part_index: None,
                part_count: None,
            }])
        }
        Some(plan) => capture_parts(page, job, output_dir, plan).await,
    }
}

async fn capture_parts(
    page: &dyn PageDriver,
    job: &PageJob,
    output_dir: &Path,
    plan: PartitionPlan,
) -> Result<Vec<Artifact>, AuditError> {
    debug!(
        "Splitting {} [{}] into {} parts of {}px",
        job.url,
        job.device,
        plan.part_count(),
        plan.part_height
    );

    let bytes = page.screenshot(true).await?;

    let raster_path = output_dir.join(format!(
        "{}.{}.{}.full.png",
        url_slug(&job.url),
        device_slug(&job.device),
        uuid::Uuid::new_v4()
    ));
    let raster = TransientRaster { path: raster_path };
    tokio::fs::write(&raster.path, bytes)
        .await
        .map_err(|e| AuditError::Capture(format!("{}: {}", raster.path.display(), e)))?;

    let part_count = plan.part_count();
    let targets: Vec<(Band, Artifact)> = plan
        .bands
        .iter()
        .map(|band| {
            let artifact = Artifact {
                filename: artifact_filename(&job.url, &job.device, Some((band.index, part_count))),
                part_index: Some(band.index),
                part_count: Some(part_count),
            };
            (*band, artifact)
        })
        .collect();

    let output_dir = output_dir.to_path_buf();
    let total_height = plan.total_height;

    tokio::task::spawn_blocking(move || {
        // Owning the raster here deletes it on every exit path, panics included
        let raster = raster;
        crop_bands(&raster.path, &output_dir, total_height, &targets)?;
        Ok(targets.into_iter().map(|(_, artifact)| artifact).collect())
    })
    .await
    .map_err(|e| AuditError::Capture(e.to_string()))?
}

/// Cut the raster into the planned bands
///
/// Bands are planned in CSS pixels; the raster may be larger by the device
/// pixel ratio, so rows are scaled and the last band always ends at the
/// raster's bottom edge.
fn crop_bands(
    raster_path: &Path,
    output_dir: &Path,
    css_height: u32,
    targets: &[(Band, Artifact)],
) -> Result<(), AuditError> {
    let image = image::open(raster_path)?;
    let (width, raster_height) = (image.width(), image.height());
    let scale = raster_height as f64 / css_height.max(1) as f64;

    for (position, (band, artifact)) in targets.iter().enumerate() {
        let top = ((band.start as f64 * scale).round() as u32).min(raster_height);
        let bottom = if position + 1 == targets.len() {
            raster_height
        } else {
            ((band.end as f64 * scale).round() as u32).min(raster_height)
        };

        if bottom <= top {
            return Err(AuditError::Capture(format!(
                "raster is shorter than the measured page ({raster_height}px for {css_height}px)"
            )));
        }

        image
            .crop_imm(0, top, width, bottom - top)
            .save(output_dir.join(&artifact.filename))?;
    }

    Ok(())
}
