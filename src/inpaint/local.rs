//! Deterministic local inpainting
//!
//! The watermark rectangle is turned into a mask, dilated with an elliptical
//! structuring element of size `2 * dilate + 1`, and then filled from its
//! boundary inward. Each layer of the fill takes a distance-weighted average
//! of the known pixels within `inpaint_radius`; once a layer is written it
//! becomes known for the next one. `NavierStokes` follows the fill with a
//! bounded number of diffusion sweeps over the masked pixels to smooth the
//! seams between layers.
//!
//! Only pixels inside the dilated mask are ever written, and all arithmetic
//! runs over a window around the mask, so cost scales with the region rather
//! than with the frame.

use super::{LocalInpaint, LocalParams};
use crate::{config::InpaintAlgorithm, error::InpaintError, types::Region};
use image::{DynamicImage, GenericImageView};

/// Upper bound on diffusion sweeps for `NavierStokes`
const MAX_DIFFUSION_SWEEPS: u32 = 24;

/// Minimum sampling radius; guarantees every boundary pixel sees its diagonal neighbours
const MIN_SAMPLE_RADIUS: f32 = 1.5;

/// Pure-Rust boundary-fill inpainter
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchInpainter;

impl PatchInpainter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LocalInpaint for PatchInpainter {
    fn name(&self) -> &'static str {
        "patch"
    }

    fn inpaint(
        &self,
        image: &DynamicImage,
        region: Region,
        params: &LocalParams,
    ) -> Result<DynamicImage, InpaintError> {
        let (width, height) = image.dimensions();
        let mask = Mask::build(width, height, region, params.dilate_pixels)?;

        let output = match image {
            DynamicImage::ImageRgb8(rgb) => {
                let mut buffer = rgb.clone();
                fill(&mut buffer, width, 3, &mask, params)?;
                DynamicImage::ImageRgb8(buffer)
            },
            DynamicImage::ImageRgba8(rgba) => {
                let mut buffer = rgba.clone();
                fill(&mut buffer, width, 4, &mask, params)?;
                DynamicImage::ImageRgba8(buffer)
            },
            other if other.color().has_alpha() => {
                let mut buffer = other.to_rgba8();
                fill(&mut buffer, width, 4, &mask, params)?;
                DynamicImage::ImageRgba8(buffer)
            },
            other => {
                let mut buffer = other.to_rgb8();
                fill(&mut buffer, width, 3, &mask, params)?;
                DynamicImage::ImageRgb8(buffer)
            },
        };

        Ok(output)
    }
}

/// Dilated rectangular mask, stored over the working window
struct Mask {
    /// Working window in image coordinates, exclusive upper bounds
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
    /// Row-major over the window
    cells: Vec<bool>,
    /// Whether any pixel of the window lies outside the mask
    has_known: bool,
}

impl Mask {
    fn build(width: u32, height: u32, region: Region, dilate: u32) -> Result<Self, InpaintError> {
        if region.width == 0 || region.height == 0 {
            return Err(InpaintError::local(format!("Region {} is empty", region)));
        }
        if region.x >= width || region.y >= height {
            return Err(InpaintError::local(format!(
                "Region {} is outside the {}x{} image",
                region, width, height
            )));
        }

        let rx0 = region.x;
        let ry0 = region.y;
        let rx1 = region.right().min(width);
        let ry1 = region.bottom().min(height);

        let x0 = rx0.saturating_sub(dilate);
        let y0 = ry0.saturating_sub(dilate);
        let x1 = rx1.saturating_add(dilate).min(width);
        let y1 = ry1.saturating_add(dilate).min(height);

        let window_width = (x1 - x0) as usize;
        let window_height = (y1 - y0) as usize;
        let mut cells = vec![false; window_width * window_height];
        let mut has_known = false;
        let limit = u64::from(dilate) * u64::from(dilate);

        for py in y0..y1 {
            let dy = axis_distance(py, ry0, ry1);
            for px in x0..x1 {
                let dx = axis_distance(px, rx0, rx1);
                let inside = if dilate == 0 {
                    dx == 0 && dy == 0
                } else {
                    dx * dx + dy * dy <= limit
                };
                if inside {
                    cells[(py - y0) as usize * window_width + (px - x0) as usize] = true;
                } else {
                    has_known = true;
                }
            }
        }

        Ok(Self {
            x0,
            y0,
            x1,
            y1,
            cells,
            has_known,
        })
    }

    fn width(&self) -> usize {
        (self.x1 - self.x0) as usize
    }

    fn height(&self) -> usize {
        (self.y1 - self.y0) as usize
    }

    /// Grow the window by `margin` pixels of context, clamped to the image
    fn with_margin(&self, margin: u32, image_width: u32, image_height: u32) -> Self {
        let x0 = self.x0.saturating_sub(margin);
        let y0 = self.y0.saturating_sub(margin);
        let x1 = self.x1.saturating_add(margin).min(image_width);
        let y1 = self.y1.saturating_add(margin).min(image_height);
        let width = (x1 - x0) as usize;
        let mut cells = vec![false; width * (y1 - y0) as usize];

        for y in 0..self.height() {
            for x in 0..self.width() {
                if self.cells[y * self.width() + x] {
                    let wx = x + (self.x0 - x0) as usize;
                    let wy = y + (self.y0 - y0) as usize;
                    cells[wy * width + wx] = true;
                }
            }
        }

        let has_known = self.has_known || cells.iter().any(|masked| !masked);
        Self {
            x0,
            y0,
            x1,
            y1,
            cells,
            has_known,
        }
    }
}

/// Distance from `p` to the half-open interval `[start, end)`
fn axis_distance(p: u32, start: u32, end: u32) -> u64 {
    if p < start {
        u64::from(start - p)
    } else if p >= end {
        u64::from(p - (end - 1))
    } else {
        0
    }
}

fn fill(
    pixels: &mut [u8],
    image_width: u32,
    channels: usize,
    mask: &Mask,
    params: &LocalParams,
) -> Result<(), InpaintError> {
    let image_height = (pixels.len() / (image_width as usize * channels)) as u32;
    let sample_radius = params.inpaint_radius.max(MIN_SAMPLE_RADIUS);
    let reach = sample_radius.ceil() as u32;
    let window = mask.with_margin(reach, image_width, image_height);

    if !window.has_known {
        return Err(InpaintError::local(
            "Region covers the whole image; no surrounding pixels to sample",
        ));
    }

    let ww = window.width();
    let wh = window.height();
    let stride = image_width as usize * channels;
    let offset = |x: usize, y: usize| {
        (window.y0 as usize + y) * stride + (window.x0 as usize + x) * channels
    };

    let mut values = vec![0.0_f32; ww * wh * channels];
    for y in 0..wh {
        for x in 0..ww {
            let src = offset(x, y);
            let dst = (y * ww + x) * channels;
            for c in 0..channels {
                values[dst + c] = f32::from(pixels[src + c]);
            }
        }
    }

    let mut known: Vec<bool> = window.cells.iter().map(|masked| !masked).collect();
    let masked: Vec<usize> = (0..ww * wh).filter(|&i| window.cells[i]).collect();
    let mut pending = masked.clone();
    let reach = reach as isize;
    let radius_sq = sample_radius * sample_radius;

    while !pending.is_empty() {
        let (front, rest): (Vec<usize>, Vec<usize>) = pending
            .iter()
            .partition(|&&i| has_known_neighbour(&known, ww, wh, i));

        if front.is_empty() {
            return Err(InpaintError::local("Mask has no reachable boundary"));
        }

        let mut layer = Vec::with_capacity(front.len() * channels);
        for &i in &front {
            let cx = (i % ww) as isize;
            let cy = (i / ww) as isize;
            let mut sum = [0.0_f32; 4];
            let mut weight_sum = 0.0_f32;

            for dy in -reach..=reach {
                let ny = cy + dy;
                if ny < 0 || ny >= wh as isize {
                    continue;
                }
                for dx in -reach..=reach {
                    let nx = cx + dx;
                    if nx < 0 || nx >= ww as isize {
                        continue;
                    }
                    let dist_sq = (dx * dx + dy * dy) as f32;
                    if dist_sq > radius_sq {
                        continue;
                    }
                    let n = ny as usize * ww + nx as usize;
                    if !known[n] {
                        continue;
                    }
                    let weight = 1.0 / dist_sq;
                    for c in 0..channels {
                        sum[c] += values[n * channels + c] * weight;
                    }
                    weight_sum += weight;
                }
            }

            for value in sum.iter().take(channels) {
                layer.push(value / weight_sum);
            }
        }

        for (k, &i) in front.iter().enumerate() {
            values[i * channels..(i + 1) * channels]
                .copy_from_slice(&layer[k * channels..(k + 1) * channels]);
            known[i] = true;
        }
        pending = rest;
    }

    if params.algorithm == InpaintAlgorithm::NavierStokes {
        let sweeps = ((params.inpaint_radius * 2.0).ceil() as u32).min(MAX_DIFFUSION_SWEEPS);
        diffuse(&mut values, ww, wh, channels, &masked, sweeps);
    }

    for &i in &masked {
        let dst = offset(i % ww, i / ww);
        for c in 0..channels {
            pixels[dst + c] = values[i * channels + c].round().clamp(0.0, 255.0) as u8;
        }
    }

    Ok(())
}

fn has_known_neighbour(known: &[bool], width: usize, height: usize, index: usize) -> bool {
    let x = (index % width) as isize;
    let y = (index / width) as isize;
    for dy in -1..=1_isize {
        for dx in -1..=1_isize {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = x + dx;
            let ny = y + dy;
            if nx >= 0
                && ny >= 0
                && (nx as usize) < width
                && (ny as usize) < height
                && known[ny as usize * width + nx as usize]
            {
                return true;
            }
        }
    }
    false
}

/// Jacobi sweeps of 4-neighbour averaging over the masked pixels
fn diffuse(
    values: &mut [f32],
    width: usize,
    height: usize,
    channels: usize,
    masked: &[usize],
    sweeps: u32,
) {
    let mut next = vec![0.0_f32; masked.len() * channels];
    for _ in 0..sweeps {
        for (k, &i) in masked.iter().enumerate() {
            let x = i % width;
            let y = i / width;
            let mut neighbours = [None; 4];
            if x > 0 {
                neighbours[0] = Some(i - 1);
            }
            if x + 1 < width {
                neighbours[1] = Some(i + 1);
            }
            if y > 0 {
                neighbours[2] = Some(i - width);
            }
            if y + 1 < height {
                neighbours[3] = Some(i + width);
            }
            let count = neighbours.iter().flatten().count() as f32;
            for c in 0..channels {
                let total: f32 = neighbours
                    .iter()
                    .flatten()
                    .map(|&n| values[n * channels + c])
                    .sum();
                next[k * channels + c] = total / count;
            }
        }
        for (k, &i) in masked.iter().enumerate() {
            values[i * channels..(i + 1) * channels]
                .copy_from_slice(&next[k * channels..(k + 1) * channels]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 4) as u8, (y * 4) as u8, 128])
        }))
    }

    fn params(algorithm: InpaintAlgorithm, dilate: u32, radius: f32) -> LocalParams {
        LocalParams {
            algorithm,
            dilate_pixels: dilate,
            inpaint_radius: radius,
        }
    }

    #[test]
    fn test_identical_inputs_give_identical_output() {
        let image = gradient(40, 30);
        let region = Region::new(10, 8, 12, 6);
        let p = params(InpaintAlgorithm::Telea, 3, 5.0);

        let first = PatchInpainter::new().inpaint(&image, region, &p).unwrap();
        let second = PatchInpainter::new().inpaint(&image, region, &p).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_dimensions_and_color_type_preserved() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 10, Rgba([1, 2, 3, 200])));
        let out = PatchInpainter::new()
            .inpaint(&rgba, Region::new(2, 2, 5, 5), &LocalParams::default())
            .unwrap();
        assert_eq!(out.dimensions(), (20, 10));
        assert!(matches!(out, DynamicImage::ImageRgba8(_)));

        let luma = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(8, 8, image::Luma([50])));
        let out = PatchInpainter::new()
            .inpaint(&luma, Region::new(2, 2, 2, 2), &LocalParams::default())
            .unwrap();
        assert!(matches!(out, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_uniform_background_fills_with_background() {
        let mut image = RgbImage::from_pixel(30, 30, Rgb([40, 90, 160]));
        for y in 10..15 {
            for x in 10..20 {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let out = PatchInpainter::new()
            .inpaint(
                &DynamicImage::ImageRgb8(image),
                Region::new(10, 10, 10, 5),
                &params(InpaintAlgorithm::Telea, 2, 3.0),
            )
            .unwrap()
            .to_rgb8();

        for y in 0..30 {
            for x in 0..30 {
                assert_eq!(*out.get_pixel(x, y), Rgb([40, 90, 160]), "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_pixels_outside_dilated_mask_unchanged() {
        let image = gradient(40, 40);
        let out = PatchInpainter::new()
            .inpaint(&image, Region::new(15, 15, 5, 5), &params(InpaintAlgorithm::NavierStokes, 2, 4.0))
            .unwrap();
        let before = image.to_rgb8();
        let after = out.to_rgb8();

        for y in 0..40 {
            for x in 0..40 {
                if !(13..22).contains(&x) || !(13..22).contains(&y) {
                    assert_eq!(before.get_pixel(x, y), after.get_pixel(x, y));
                }
            }
        }
    }

    #[test]
    fn test_fill_stays_within_surrounding_range() {
        let image = gradient(50, 50);
        let out = PatchInpainter::new()
            .inpaint(&image, Region::new(20, 20, 8, 8), &params(InpaintAlgorithm::Telea, 0, 5.0))
            .unwrap()
            .to_rgb8();
        for y in 20..28 {
            for x in 20..28 {
                let Rgb([r, g, b]) = *out.get_pixel(x, y);
                assert!((60..=140).contains(&r), "red {r} at ({x}, {y})");
                assert!((60..=140).contains(&g), "green {g} at ({x}, {y})");
                assert_eq!(b, 128);
            }
        }
    }

    #[test]
    fn test_region_at_image_edge() {
        let image = gradient(20, 20);
        let out = PatchInpainter::new()
            .inpaint(&image, Region::new(15, 0, 5, 5), &LocalParams::default())
            .unwrap();
        assert_eq!(out.dimensions(), (20, 20));
    }

    #[test]
    fn test_whole_image_region_fails() {
        let image = gradient(10, 10);
        let err = PatchInpainter::new()
            .inpaint(&image, Region::new(0, 0, 10, 10), &LocalParams::default())
            .unwrap_err();
        assert!(matches!(err, InpaintError::Local(_)));
    }

    #[test]
    fn test_region_outside_fails() {
        let image = gradient(10, 10);
        assert!(PatchInpainter::new()
            .inpaint(&image, Region::new(10, 0, 2, 2), &LocalParams::default())
            .is_err());
    }

    #[test]
    fn test_elliptical_dilation() {
        let mask = Mask::build(20, 20, Region::new(8, 8, 2, 2), 3).unwrap();
        let at = |x: u32, y: u32| mask.cells[((y - mask.y0) * (mask.x1 - mask.x0) + (x - mask.x0)) as usize];

        assert!(at(5, 8));
        assert!(at(8, 5));
        // corners of the square kernel fall outside the ellipse
        assert!(!at(5, 5));
        assert!(at(6, 6));
    }
}
