//! One-time binding of regions to tracker identities.
//!
//! Runs once per monitoring setup against a reference frame's detections.
//! Each region is bound to the identity of the detection that best overlaps
//! it; from then on the session follows identities only and geometry is
//! never re-checked.

use std::error::Error;
use std::fmt;

use crate::detect::{BoundingBox, Detection};
use crate::session::Target;
use crate::Region;

/// Label used when the winning detection carries no class label.
pub const DEFAULT_LABEL: &str = "object";

/// Setup-fatal resolution failure. Monitoring must not start on one of
/// these; the caller decides when to retry with a fresh reference frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveError {
    /// The reference frame had no detections at all.
    NoDetections,
    /// There were detections, but no region could be bound to one with a
    /// persistent tracker identity.
    NoTargets,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NoDetections => {
                write!(f, "no detections on the reference frame, nothing to bind")
            }
            ResolveError::NoTargets => {
                write!(f, "no region could be bound to a tracked detection")
            }
        }
    }
}

impl Error for ResolveError {}

/// Fraction of the detection box that falls inside the region.
///
/// Deliberately asymmetric (intersection over detection area, not IoU): a
/// small object fully inside a large region scores 1.0 regardless of how
/// much larger the region is. Degenerate detection boxes score 0.
pub fn overlap_ratio(region: &Region, bbox: &BoundingBox) -> f32 {
    let ix1 = region.x1.max(bbox.x1);
    let iy1 = region.y1.max(bbox.y1);
    let ix2 = region.x2.min(bbox.x2);
    let iy2 = region.y2.min(bbox.y2);
    if ix2 <= ix1 || iy2 <= iy1 {
        return 0.0;
    }
    let box_area = bbox.area();
    if box_area <= 0.0 {
        return 0.0;
    }
    (ix2 - ix1) * (iy2 - iy1) / box_area
}

/// Binds each region to the best-overlapping detection's identity.
///
/// Winner selection is strictly greatest ratio above zero, so on an exact
/// tie the first detection in enumeration order keeps the bind. A region
/// whose best match has no tracker identity yet is skipped with a warning,
/// as is a region nothing overlaps. Output order follows region order with
/// failed regions omitted; `region_index` keeps the original position.
pub fn resolve_targets(
    regions: &[Region],
    detections: &[Detection],
    alert_threshold: u32,
) -> Result<Vec<Target>, ResolveError> {
    if detections.is_empty() {
        return Err(ResolveError::NoDetections);
    }

    let mut targets = Vec::new();
    for (region_index, region) in regions.iter().enumerate() {
        let mut best: Option<&Detection> = None;
        let mut best_ratio = 0.0f32;
        for detection in detections {
            let ratio = overlap_ratio(region, &detection.bbox);
            if ratio > best_ratio {
                best_ratio = ratio;
                best = Some(detection);
            }
        }

        let Some(winner) = best else {
            log::warn!(
                "resolve: region {} has no overlapping detection",
                region_index + 1
            );
            continue;
        };
        let Some(track_id) = winner.track_id else {
            log::warn!(
                "resolve: region {} best match has no tracker identity yet",
                region_index + 1
            );
            continue;
        };

        let label = winner
            .label
            .clone()
            .unwrap_or_else(|| DEFAULT_LABEL.to_string());
        log::info!(
            "resolve: region {} bound to '{}' (id {}), overlap {:.2}",
            region_index + 1,
            label,
            track_id,
            best_ratio
        );
        targets.push(Target::new(
            *region,
            region_index,
            track_id,
            label,
            alert_threshold,
        ));
    }

    if targets.is_empty() {
        return Err(ResolveError::NoTargets);
    }
    Ok(targets)
}
