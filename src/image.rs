//! Image loading, saving, and annotation.
//!
//! This module provides:
//!
//! - The [`Image`] type, an owned RGBA image backed by [`image::RgbaImage`].
//! - Freestanding `draw_*` functions to annotate frames with predictions.
//! - [`Color`], the pixel color type used by the drawing functions.

mod draw;

use std::{fmt, ops::Index, path::Path};

use anyhow::bail;
use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{ImageBuffer, Rgba, RgbaImage};

use crate::resolution::Resolution;

pub use draw::*;

#[derive(Debug, Clone, Copy)]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => bail!(
                "invalid image path '{}' (must have one of the supported extensions)",
                path.display()
            ),
        }
    }
}

/// An 8-bit sRGB image with alpha channel.
#[derive(Clone)]
pub struct Image {
    buf: RgbaImage,
}

impl Image {
    /// Loads an image from the filesystem.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let format = ImageFormat::from_path(path)?;
        let data = std::fs::read(path)?;
        match format {
            ImageFormat::Jpeg => Self::decode_jpeg(&data),
            ImageFormat::Png => {
                let buf =
                    image::load_from_memory_with_format(&data, image::ImageFormat::Png)?.to_rgba8();
                Ok(Self { buf })
            }
        }
    }

    /// Decodes a JFIF JPEG or Motion JPEG frame from a byte slice.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        let buf = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8();
        Ok(Self { buf })
    }

    /// Saves an image to the file system.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        ImageFormat::from_path(path.as_ref())?;
        Ok(self.buf.save(path.as_ref())?)
    }

    /// Creates an empty image of a specified size.
    ///
    /// The image starts out black and fully opaque.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::from_pixel(width, height, Rgba([0, 0, 0, 255])),
        }
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Gets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    pub fn get(&self, x: u32, y: u32) -> Color {
        let rgba = &self.buf[(x, y)];
        Color(rgba.0)
    }

    /// Sets the image color at the given pixel coordinates.
    ///
    /// Writes outside the image bounds are ignored.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        if x < self.width() && y < self.height() {
            self.buf[(x, y)] = Rgba(color.0);
        }
    }

    /// Resizes this image to a new size, adding black bars to keep the original aspect ratio.
    ///
    /// Sampling is nearest neighbor; this runs on every camera frame, so it favors speed over
    /// output quality.
    pub fn aspect_aware_resize(&self, new_res: Resolution) -> Image {
        let ratio = match self.resolution().aspect_ratio() {
            Some(ratio) => ratio,
            None => return Image::new(new_res.width(), new_res.height()),
        };

        let (dest_x, dest_y, dest_w, dest_h) = new_res.fit_aspect_ratio(ratio);
        let mut out = Image::new(new_res.width(), new_res.height());
        for y in 0..dest_h {
            let src_y =
                (((y as f32 + 0.5) * self.height() as f32 / dest_h as f32) as u32).min(self.height() - 1);
            for x in 0..dest_w {
                let src_x =
                    (((x as f32 + 0.5) * self.width() as f32 / dest_w as f32) as u32).min(self.width() - 1);
                out.buf[(dest_x + x, dest_y + y)] = self.buf[(src_x, src_y)];
            }
        }
        out
    }

    /// Returns the raw RGBA pixel data of this image.
    pub(crate) fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);

    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }
}

/// Returns the color channel at `index` (R, G, B, A order).
impl Index<usize> for Color {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}

impl PixelColor for Color {
    type Raw = RawU32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_preserves_aspect_ratio() {
        // A 4x2 white image fitted into 4x4 gets letterboxed vertically.
        let mut image = Image::new(4, 2);
        for y in 0..2 {
            for x in 0..4 {
                image.set(x, y, Color::WHITE);
            }
        }

        let resized = image.aspect_aware_resize(Resolution::new(4, 4));
        assert_eq!(resized.resolution(), Resolution::new(4, 4));
        assert_eq!(resized.get(0, 0), Color::BLACK);
        assert_eq!(resized.get(0, 3), Color::BLACK);
        assert_eq!(resized.get(2, 2), Color::WHITE);
    }

    #[test]
    fn out_of_bounds_writes_are_ignored() {
        let mut image = Image::new(2, 2);
        image.set(5, 5, Color::RED);
        assert_eq!(image.get(1, 1), Color::BLACK);
    }
}
