use std::fmt;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{ImageFormat, ImageReader, RgbaImage};
use thiserror::Error;

use crate::math::Vec2;

pub type Rgba = [u8; 4];

pub const TRANSPARENT: Rgba = [0, 0, 0, 0];
pub const BLACK: Rgba = [0, 0, 0, 255];
pub const WHITE: Rgba = [255, 255, 255, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Overwrite destination with source, alpha included.
    Replace,
    /// Source-over using source alpha.
    Alpha,
    /// `dst.rgb += src.rgb * src.a`, saturating. Destination alpha is untouched.
    Additive,
    /// `dst.rgb = lerp(dst.rgb, dst.rgb * src.rgb, src.a)`. Destination alpha is untouched.
    Multiply,
    /// Per-channel maximum, alpha included.
    Lighten,
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("failed to open image {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode image {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("pixel buffer of {len} bytes does not match {width}x{height}")]
    SizeMismatch { width: u32, height: u32, len: usize },
}

/// RGBA8 pixel surface, row-major, origin at the top-left.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Surface {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[inline]
fn blend_channel(src: u8, dst: u8, alpha: u16) -> u8 {
    let result = src as u16 * alpha + dst as u16 * (255 - alpha);
    ((result + 1 + (result >> 8)) >> 8) as u8
}

#[inline]
fn blend_into(dst: &mut [u8], src: Rgba, mode: BlendMode) {
    match mode {
        BlendMode::Replace => dst.copy_from_slice(&src),
        BlendMode::Alpha => {
            let alpha = src[3] as u16;
            if alpha == 0 {
                return;
            }
            if alpha == 255 {
                dst.copy_from_slice(&src);
                return;
            }
            for channel in 0..3 {
                dst[channel] = blend_channel(src[channel], dst[channel], alpha);
            }
            let covered = dst[3] as u16 * (255 - alpha) / 255;
            dst[3] = (alpha + covered).min(255) as u8;
        }
        BlendMode::Additive => {
            let alpha = src[3] as u16;
            if alpha == 0 {
                return;
            }
            for channel in 0..3 {
                let add = (src[channel] as u16 * alpha + 127) / 255;
                dst[channel] = dst[channel].saturating_add(add as u8);
            }
        }
        BlendMode::Multiply => {
            let alpha = src[3] as u16;
            if alpha == 0 {
                return;
            }
            for channel in 0..3 {
                let multiplied = (dst[channel] as u16 * src[channel] as u16 / 255) as u8;
                dst[channel] = blend_channel(multiplied, dst[channel], alpha);
            }
        }
        BlendMode::Lighten => {
            for channel in 0..4 {
                dst[channel] = dst[channel].max(src[channel]);
            }
        }
    }
}

impl Surface {
    /// Transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, TRANSPARENT)
    }

    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        let pixel_count = width as usize * height as usize;
        let mut rgba = Vec::with_capacity(pixel_count * 4);
        for _ in 0..pixel_count {
            rgba.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            rgba,
        }
    }

    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, SurfaceError> {
        if rgba.len() != width as usize * height as usize * 4 {
            return Err(SurfaceError::SizeMismatch {
                width,
                height,
                len: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.rgba
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.rgba
    }

    pub fn fill(&mut self, color: Rgba) {
        for chunk in self.rgba.chunks_exact_mut(4) {
            chunk.copy_from_slice(&color);
        }
    }

    /// Applies `color` to every pixel with `mode`.
    pub fn fill_blend(&mut self, color: Rgba, mode: BlendMode) {
        for chunk in self.rgba.chunks_exact_mut(4) {
            blend_into(chunk, color, mode);
        }
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * 4)
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba> {
        let offset = self.offset(x, y)?;
        let mut color = TRANSPARENT;
        color.copy_from_slice(&self.rgba[offset..offset + 4]);
        Some(color)
    }

    /// Blends one pixel; coordinates outside the surface are ignored.
    pub fn blend_pixel(&mut self, x: i32, y: i32, color: Rgba, mode: BlendMode) {
        if let Some(offset) = self.offset(x, y) {
            blend_into(&mut self.rgba[offset..offset + 4], color, mode);
        }
    }

    fn blend_span(&mut self, y: i32, x_start: i32, x_end: i32, color: Rgba, mode: BlendMode) {
        if y < 0 || y >= self.height as i32 {
            return;
        }
        let start = x_start.max(0);
        let end = x_end.min(self.width as i32);
        if start >= end {
            return;
        }
        let row = y as usize * self.width as usize;
        for x in start..end {
            let offset = (row + x as usize) * 4;
            blend_into(&mut self.rgba[offset..offset + 4], color, mode);
        }
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Rgba, mode: BlendMode) {
        let bottom = y.saturating_add(height.min(i32::MAX as u32) as i32);
        let right = x.saturating_add(width.min(i32::MAX as u32) as i32);
        for row in y.max(0)..bottom.min(self.height as i32) {
            self.blend_span(row, x, right, color, mode);
        }
    }

    /// Even-odd scanline fill. Pixels whose centers lie inside the polygon are covered.
    pub fn fill_polygon(&mut self, points: &[Vec2], color: Rgba, mode: BlendMode) {
        if points.len() < 3 || points.iter().any(|point| !point.is_finite()) {
            return;
        }
        let (min_y, max_y) = points
            .iter()
            .fold((f32::MAX, f32::MIN), |(low, high), point| {
                (low.min(point.y), high.max(point.y))
            });
        let first_row = (min_y.floor() as i32).max(0);
        let last_row = (max_y.ceil() as i32).min(self.height as i32 - 1);

        let mut crossings: Vec<f32> = Vec::with_capacity(points.len());
        for row in first_row..=last_row {
            crossings.clear();
            let scan_y = row as f32 + 0.5;
            for (index, a) in points.iter().enumerate() {
                let b = points[(index + 1) % points.len()];
                if (a.y <= scan_y && b.y > scan_y) || (b.y <= scan_y && a.y > scan_y) {
                    crossings.push(a.x + (scan_y - a.y) / (b.y - a.y) * (b.x - a.x));
                }
            }
            crossings.sort_unstable_by(f32::total_cmp);
            for pair in crossings.chunks_exact(2) {
                let start = (pair[0] - 0.5).ceil() as i32;
                let end = (pair[1] - 0.5).ceil() as i32;
                self.blend_span(row, start, end, color, mode);
            }
        }
    }

    /// Filled disc covering pixels whose centers are within `radius` of `center`.
    pub fn fill_circle(&mut self, center: Vec2, radius: f32, color: Rgba, mode: BlendMode) {
        if !center.is_finite() || !radius.is_finite() || radius <= 0.0 {
            return;
        }
        let radius_sq = radius * radius;
        let top = ((center.y - radius).floor() as i32).max(0);
        let bottom = ((center.y + radius).ceil() as i32).min(self.height as i32 - 1);
        for row in top..=bottom {
            let dy = row as f32 + 0.5 - center.y;
            let remaining = radius_sq - dy * dy;
            if remaining < 0.0 {
                continue;
            }
            let half_span = remaining.sqrt();
            let start = (center.x - half_span - 0.5).ceil() as i32;
            let end = (center.x + half_span - 0.5).floor() as i32 + 1;
            self.blend_span(row, start, end, color, mode);
        }
    }

    /// Thick closed outline. Joints are stamped with discs, so overlapping coverage
    /// blends more than once; use an idempotent mode (`Replace`, `Lighten`) for exact results.
    pub fn stroke_closed(&mut self, points: &[Vec2], width: f32, color: Rgba, mode: BlendMode) {
        if points.len() < 2 || !width.is_finite() || width <= 0.0 {
            return;
        }
        let half_width = width * 0.5;
        for (index, a) in points.iter().enumerate() {
            let b = points[(index + 1) % points.len()];
            let Some(direction) = (b - *a).normalized() else {
                continue;
            };
            let normal = Vec2::new(-direction.y, direction.x) * half_width;
            let quad = [*a + normal, b + normal, b - normal, *a - normal];
            self.fill_polygon(&quad, color, mode);
        }
        for point in points {
            self.fill_circle(*point, half_width, color, mode);
        }
    }

    /// Draws `src` with its top-left corner at `(x, y)`.
    pub fn blit(&mut self, src: &Surface, x: i32, y: i32, mode: BlendMode) {
        let start_x = x.max(0);
        let end_x = x.saturating_add(src.width as i32).min(self.width as i32);
        if start_x >= end_x {
            return;
        }
        for src_y in 0..src.height as i32 {
            let dst_y = y + src_y;
            if dst_y < 0 || dst_y >= self.height as i32 {
                continue;
            }
            for dst_x in start_x..end_x {
                let src_offset = (src_y as usize * src.width as usize + (dst_x - x) as usize) * 4;
                let mut color = TRANSPARENT;
                color.copy_from_slice(&src.rgba[src_offset..src_offset + 4]);
                let dst_offset = (dst_y as usize * self.width as usize + dst_x as usize) * 4;
                blend_into(&mut self.rgba[dst_offset..dst_offset + 4], color, mode);
            }
        }
    }

    /// Nearest-neighbour blit of `src` stretched to `target_width` x `target_height`.
    /// Fully transparent source pixels are skipped.
    pub fn blit_scaled(
        &mut self,
        src: &Surface,
        left: i32,
        top: i32,
        target_width: u32,
        target_height: u32,
        mode: BlendMode,
    ) {
        if src.is_empty() || target_width == 0 || target_height == 0 || self.is_empty() {
            return;
        }
        if target_width == src.width && target_height == src.height {
            self.blit(src, left, top, mode);
            return;
        }
        let right = left.saturating_add(target_width as i32);
        let bottom = top.saturating_add(target_height as i32);
        let draw_left = left.max(0);
        let draw_top = top.max(0);
        let draw_right = right.min(self.width as i32);
        let draw_bottom = bottom.min(self.height as i32);
        if draw_left >= draw_right || draw_top >= draw_bottom {
            return;
        }

        let x_ratio = src.width as f32 / target_width as f32;
        let y_ratio = src.height as f32 / target_height as f32;
        for out_y in draw_top..draw_bottom {
            let src_y = (((out_y - top) as f32 * y_ratio) as u32).min(src.height - 1) as usize;
            for out_x in draw_left..draw_right {
                let src_x = (((out_x - left) as f32 * x_ratio) as u32).min(src.width - 1) as usize;
                let src_offset = (src_y * src.width as usize + src_x) * 4;
                if src.rgba[src_offset + 3] == 0 {
                    continue;
                }
                let mut color = TRANSPARENT;
                color.copy_from_slice(&src.rgba[src_offset..src_offset + 4]);
                let dst_offset = (out_y as usize * self.width as usize + out_x as usize) * 4;
                blend_into(&mut self.rgba[dst_offset..dst_offset + 4], color, mode);
            }
        }
    }

    /// Bilinear (triangle filter) resample to a new size.
    pub fn resized(&self, width: u32, height: u32) -> Surface {
        if width == self.width && height == self.height {
            return self.clone();
        }
        if self.is_empty() || width == 0 || height == 0 {
            return Surface::new(width, height);
        }
        let Some(image) = RgbaImage::from_raw(self.width, self.height, self.rgba.clone()) else {
            return Surface::new(width, height);
        };
        let resized = imageops::resize(&image, width, height, FilterType::Triangle);
        Surface {
            width,
            height,
            rgba: resized.into_raw(),
        }
    }

    pub fn load_png(path: &Path) -> Result<Surface, SurfaceError> {
        let reader = ImageReader::open(path).map_err(|source| SurfaceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let decoded = reader.decode().map_err(|source| SurfaceError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let image = decoded.to_rgba8();
        Ok(Surface {
            width: image.width(),
            height: image.height(),
            rgba: image.into_raw(),
        })
    }

    pub fn save_png(&self, path: &Path) -> Result<(), SurfaceError> {
        let image = RgbaImage::from_raw(self.width, self.height, self.rgba.clone()).ok_or(
            SurfaceError::SizeMismatch {
                width: self.width,
                height: self.height,
                len: self.rgba.len(),
            },
        )?;
        image
            .save_with_format(path, ImageFormat::Png)
            .map_err(|source| SurfaceError::Encode {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn covered(surface: &Surface) -> usize {
        surface
            .as_bytes()
            .chunks_exact(4)
            .filter(|pixel| pixel[3] != 0)
            .count()
    }

    #[test]
    fn fill_polygon_covers_pixel_centers_inside() {
        let mut surface = Surface::new(10, 10);
        let square = [
            Vec2::new(2.0, 2.0),
            Vec2::new(6.0, 2.0),
            Vec2::new(6.0, 6.0),
            Vec2::new(2.0, 6.0),
        ];
        surface.fill_polygon(&square, WHITE, BlendMode::Replace);

        assert_eq!(covered(&surface), 16);
        assert_eq!(surface.pixel(2, 2), Some(WHITE));
        assert_eq!(surface.pixel(5, 5), Some(WHITE));
        assert_eq!(surface.pixel(6, 6), Some(TRANSPARENT));
    }

    #[test]
    fn polygon_outside_surface_is_clipped() {
        let mut surface = Surface::new(4, 4);
        let triangle = [
            Vec2::new(-10.0, -10.0),
            Vec2::new(20.0, -10.0),
            Vec2::new(-10.0, 20.0),
        ];
        surface.fill_polygon(&triangle, WHITE, BlendMode::Replace);
        assert_eq!(covered(&surface), 16);
    }

    #[test]
    fn additive_blend_saturates() {
        let mut surface = Surface::filled(1, 1, [200, 10, 0, 255]);
        surface.blend_pixel(0, 0, [100, 100, 100, 255], BlendMode::Additive);
        assert_eq!(surface.pixel(0, 0), Some([255, 110, 100, 255]));
    }

    #[test]
    fn additive_blend_scales_by_source_alpha() {
        let mut surface = Surface::filled(1, 1, [0, 0, 0, 255]);
        surface.blend_pixel(0, 0, [200, 100, 0, 128], BlendMode::Additive);
        let [r, g, b, a] = surface.pixel(0, 0).expect("pixel");
        assert_eq!((r, g, b, a), (100, 50, 0, 255));
    }

    #[test]
    fn multiply_by_black_darkens_fully() {
        let mut surface = Surface::filled(2, 1, [180, 90, 40, 255]);
        surface.blend_pixel(0, 0, BLACK, BlendMode::Multiply);
        surface.blend_pixel(1, 0, WHITE, BlendMode::Multiply);
        assert_eq!(surface.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(surface.pixel(1, 0), Some([180, 90, 40, 255]));
    }

    #[test]
    fn alpha_blend_mixes_halfway() {
        let mut surface = Surface::filled(1, 1, [0, 0, 0, 255]);
        surface.blend_pixel(0, 0, [200, 200, 200, 128], BlendMode::Alpha);
        let [r, _, _, a] = surface.pixel(0, 0).expect("pixel");
        assert!((99..=101).contains(&r), "r={r}");
        assert_eq!(a, 255);
    }

    #[test]
    fn blit_clips_against_destination() {
        let mut destination = Surface::new(4, 4);
        let source = Surface::filled(3, 3, WHITE);
        destination.blit(&source, 2, -1, BlendMode::Replace);
        assert_eq!(covered(&destination), 4);
        assert_eq!(destination.pixel(3, 1), Some(WHITE));
        assert_eq!(destination.pixel(1, 1), Some(TRANSPARENT));
    }

    #[test]
    fn scaled_blit_doubles_pixels() {
        let mut destination = Surface::new(8, 8);
        let source = Surface::filled(2, 2, WHITE);
        destination.blit_scaled(&source, 1, 1, 4, 4, BlendMode::Alpha);
        assert_eq!(covered(&destination), 16);
        assert_eq!(destination.pixel(4, 4), Some(WHITE));
        assert_eq!(destination.pixel(5, 5), Some(TRANSPARENT));
    }

    #[test]
    fn resize_of_uniform_surface_stays_uniform() {
        let source = Surface::filled(4, 3, [40, 80, 120, 255]);
        let upsampled = source.resized(8, 6);
        assert_eq!(upsampled.width(), 8);
        assert_eq!(upsampled.height(), 6);
        for pixel in upsampled.as_bytes().chunks_exact(4) {
            assert_eq!(pixel, &[40, 80, 120, 255]);
        }
    }

    #[test]
    fn circle_is_symmetric() {
        let mut surface = Surface::new(11, 11);
        surface.fill_circle(Vec2::new(5.5, 5.5), 3.0, WHITE, BlendMode::Replace);
        assert_eq!(surface.pixel(5, 5), Some(WHITE));
        assert_eq!(surface.pixel(2, 5), Some(WHITE));
        assert_eq!(surface.pixel(8, 5), Some(WHITE));
        assert_eq!(surface.pixel(1, 5), Some(TRANSPARENT));
        assert_eq!(surface.pixel(9, 5), Some(TRANSPARENT));
    }

    #[test]
    fn stroke_widens_outline_beyond_fill() {
        let square = [
            Vec2::new(4.0, 4.0),
            Vec2::new(12.0, 4.0),
            Vec2::new(12.0, 12.0),
            Vec2::new(4.0, 12.0),
        ];
        let mut filled = Surface::new(16, 16);
        filled.fill_polygon(&square, WHITE, BlendMode::Replace);
        let mut stroked = filled.clone();
        stroked.stroke_closed(&square, 4.0, WHITE, BlendMode::Lighten);

        assert!(covered(&stroked) > covered(&filled));
        assert_eq!(stroked.pixel(2, 8), Some(WHITE));
        assert_eq!(filled.pixel(2, 8), Some(TRANSPARENT));
    }

    #[test]
    fn png_round_trip_preserves_pixels() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("frame.png");
        let mut surface = Surface::new(3, 2);
        surface.blend_pixel(1, 1, [10, 20, 30, 255], BlendMode::Replace);

        surface.save_png(&path).expect("save");
        let loaded = Surface::load_png(&path).expect("load");
        assert_eq!(loaded, surface);
    }

    #[test]
    fn missing_png_reports_open_error() {
        let dir = TempDir::new().expect("temp dir");
        let error = Surface::load_png(&dir.path().join("absent.png")).expect_err("missing file");
        assert!(matches!(error, SurfaceError::Open { .. }));
    }

    #[test]
    fn from_rgba_rejects_wrong_length() {
        assert!(Surface::from_rgba(2, 2, vec![0; 15]).is_err());
        assert!(Surface::from_rgba(2, 2, vec![0; 16]).is_ok());
    }
}
