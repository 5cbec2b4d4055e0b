//! # Path stitching
//!
//! Merges a converted path with the band poses the conversion did not reach, giving a local plan
//! which always runs to the end of the band.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;

use super::conversion::ConversionResult;
use crate::{
    loc::{PoseTransformGateway, TransformError},
    path::Path,
};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StitchError {
    #[error("Cannot stitch onto an empty converted path")]
    EmptyConversion,

    #[error("Cannot stitch an empty band")]
    EmptyBand,

    #[error("Band pose {index} could not be transformed: {source}")]
    TransformFailed {
        index: usize,
        source: TransformError,
    },
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Append the band poses after the conversion's fail index to the converted path.
///
/// Each appended pose is expressed in the frame of the converted path's last pose and carries
/// the stamp of the band's first pose. If any pose cannot be transformed the whole merge fails.
pub fn stitch<G>(
    gateway: &G,
    conversion: &ConversionResult,
    band: &Path,
) -> Result<Path, StitchError>
where
    G: PoseTransformGateway,
{
    let target_frame = match conversion.path.back() {
        Some(p) => p.frame_id.as_str(),
        None => return Err(StitchError::EmptyConversion),
    };
    let stamp = match band.front() {
        Some(p) => p.stamp,
        None => return Err(StitchError::EmptyBand),
    };

    let mut merged = conversion.path.clone();

    for (index, pose) in band.iter().enumerate().skip(conversion.fail_index + 1) {
        let mut stamped = pose.clone();
        stamped.stamp = stamp;

        let local = gateway
            .transform_pose(&stamped, target_frame)
            .map_err(|source| StitchError::TransformFailed { index, source })?;

        merged.push(local);
    }

    trace!(
        "Stitched {} band poses onto {} converted poses",
        merged.len() - conversion.path.len(),
        conversion.path.len()
    );

    Ok(merged)
}
