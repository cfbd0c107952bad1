//! Region validation against media bounds
//!
//! Partially out-of-bounds regions are clamped to the media rectangle.
//! Zero-sized input regions and regions lying entirely outside the media
//! are rejected.

use crate::{
    error::{RemovalError, Result},
    types::Region,
};

/// Validator for watermark regions
pub struct RegionValidator;

impl RegionValidator {
    /// Validate `region` against a `media_width` x `media_height` frame
    ///
    /// Returns the clamped region that is safe to index into the media.
    ///
    /// # Errors
    /// - Width or height of zero
    /// - Empty media dimensions
    /// - Region entirely outside the media
    pub fn validate(region: Region, media_width: u32, media_height: u32) -> Result<Region> {
        if region.width == 0 || region.height == 0 {
            return Err(RemovalError::validation(format!(
                "Region {} must have a positive width and height",
                region
            )));
        }

        if media_width == 0 || media_height == 0 {
            return Err(RemovalError::validation(format!(
                "Media has empty dimensions {}x{}",
                media_width, media_height
            )));
        }

        if region.x >= media_width || region.y >= media_height {
            return Err(RemovalError::validation(format!(
                "Region {} lies outside the {}x{} media",
                region, media_width, media_height
            )));
        }

        let right = region.right().min(media_width);
        let bottom = region.bottom().min(media_height);
        let clamped = Region::new(region.x, region.y, right - region.x, bottom - region.y);

        if clamped != region {
            log::debug!(
                "Clamped region {} to {} for {}x{} media",
                region,
                clamped,
                media_width,
                media_height
            );
        }

        Ok(clamped)
    }
}
