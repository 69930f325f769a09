//! CPU-side pixel storage written by the tracer.

use crate::{color::Rgba8, math::UVec2, Error};
use rayon::prelude::*;
use std::ops::Range;

/// Something pixels can be written into at absolute image coordinates.
pub trait PixelTarget {
    /// Writes `colour` at `pos`; positions the target doesn't cover are
    /// silently ignored.
    fn put(&mut self, pos: UVec2, colour: Rgba8);
}

/// Row-major RGBA8 image with a fixed width and height.
///
/// A freshly created buffer is zero-filled (transparent black).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderBuffer {
    dimensions: UVec2,
    pixels: Vec<Rgba8>,
}

impl RenderBuffer {
    /// Creates a zero-filled buffer.
    pub fn new(dimensions: UVec2) -> Self {
        Self {
            dimensions,
            pixels: vec![Rgba8::TRANSPARENT; dimensions.x as usize * dimensions.y as usize],
        }
    }

    /// Wraps already existing pixels.
    pub fn from_pixels(dimensions: UVec2, pixels: Vec<Rgba8>) -> Result<Self, Error> {
        let expected = dimensions.x as usize * dimensions.y as usize;
        if pixels.len() != expected {
            return Err(Error::BufferSizeMismatch {
                width: dimensions.x,
                height: dimensions.y,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self { dimensions, pixels })
    }

    /// Returns the dimensions of the buffer in pixels.
    pub fn dimensions(&self) -> UVec2 { self.dimensions }

    /// Returns the width of the buffer in pixels.
    pub fn width(&self) -> u32 { self.dimensions.x }

    /// Returns the height of the buffer in pixels.
    pub fn height(&self) -> u32 { self.dimensions.y }

    /// Returns the number of pixels.
    pub fn len(&self) -> usize { self.pixels.len() }

    /// Whether the buffer holds no pixels at all.
    pub fn is_empty(&self) -> bool { self.pixels.is_empty() }

    /// Returns all pixels in row-major order.
    pub fn pixels(&self) -> &[Rgba8] { &self.pixels }

    /// Returns all pixels in row-major order, mutably.
    pub fn pixels_mut(&mut self) -> &mut [Rgba8] { &mut self.pixels }

    /// Returns the pixel at `(x, y)` if inside the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        if x >= self.dimensions.x || y >= self.dimensions.y {
            return None;
        }
        Some(self.pixels[y as usize * self.dimensions.x as usize + x as usize])
    }

    /// Returns the raw bytes of the buffer, 4 bytes per pixel.
    pub fn as_bytes(&self) -> &[u8] { bytemuck::cast_slice(&self.pixels) }

    /// Resets every pixel to transparent black.
    pub fn clear(&mut self) { self.pixels.fill(Rgba8::TRANSPARENT); }

    /// Splits the buffer into disjoint bands of `band_height` rows.
    ///
    /// The last band may be shorter when the height isn't a multiple of
    /// `band_height`.
    pub fn rows_mut(&mut self, band_height: u32) -> impl Iterator<Item = RowBand<'_>> {
        let width = self.dimensions.x.max(1);
        let band_height = band_height.max(1);
        self.pixels
            .chunks_mut((band_height * width) as usize)
            .enumerate()
            .map(move |(idx, pixels)| RowBand::new(idx as u32 * band_height, width, pixels))
    }

    /// Parallel version of [`RenderBuffer::rows_mut`].
    pub fn par_rows_mut(
        &mut self,
        band_height: u32,
    ) -> impl IndexedParallelIterator<Item = RowBand<'_>> {
        let width = self.dimensions.x.max(1);
        let band_height = band_height.max(1);
        self.pixels
            .par_chunks_mut((band_height * width) as usize)
            .enumerate()
            .map(move |(idx, pixels)| RowBand::new(idx as u32 * band_height, width, pixels))
    }

    /// Returns a mutable view over the pixels with row-major indices in
    /// `range`, clipped to the buffer.
    pub fn span_mut(&mut self, range: Range<usize>) -> PixelSpan<'_> {
        let end = range.end.min(self.pixels.len());
        let start = range.start.min(end);
        PixelSpan {
            start,
            width: self.dimensions.x.max(1),
            pixels: &mut self.pixels[start..end],
        }
    }
}

impl PixelTarget for RenderBuffer {
    fn put(&mut self, pos: UVec2, colour: Rgba8) {
        if pos.x < self.dimensions.x && pos.y < self.dimensions.y {
            self.pixels[pos.y as usize * self.dimensions.x as usize + pos.x as usize] = colour;
        }
    }
}

/// Mutable view over a contiguous band of full rows of a [`RenderBuffer`].
///
/// Bands handed out by the same split never overlap, so each can be given to
/// a different worker.
#[derive(Debug)]
pub struct RowBand<'a> {
    y: u32,
    width: u32,
    rows: u32,
    pixels: &'a mut [Rgba8],
}

impl<'a> RowBand<'a> {
    fn new(y: u32, width: u32, pixels: &'a mut [Rgba8]) -> Self {
        let rows = (pixels.len() / width as usize) as u32;
        Self {
            y,
            width,
            rows,
            pixels,
        }
    }

    /// Index of the first row of the band in the whole image.
    pub fn y(&self) -> u32 { self.y }

    /// Number of rows in the band.
    pub fn rows(&self) -> u32 { self.rows }

    /// Width of the band in pixels.
    pub fn width(&self) -> u32 { self.width }

    /// Whether the absolute position lies inside the band.
    pub fn contains(&self, pos: UVec2) -> bool {
        pos.x < self.width && pos.y >= self.y && pos.y < self.y + self.rows
    }
}

impl PixelTarget for RowBand<'_> {
    fn put(&mut self, pos: UVec2, colour: Rgba8) {
        if self.contains(pos) {
            let idx = (pos.y - self.y) as usize * self.width as usize + pos.x as usize;
            self.pixels[idx] = colour;
        }
    }
}

/// Mutable view over a contiguous range of row-major pixel indices.
#[derive(Debug)]
pub struct PixelSpan<'a> {
    start: usize,
    width: u32,
    pixels: &'a mut [Rgba8],
}

impl<'a> PixelSpan<'a> {
    /// Row-major index of the first pixel of the span.
    pub fn start(&self) -> usize { self.start }

    /// Number of pixels in the span.
    pub fn len(&self) -> usize { self.pixels.len() }

    /// Whether the span covers no pixel.
    pub fn is_empty(&self) -> bool { self.pixels.is_empty() }

    /// Iterates in parallel over the pixels of the span together with their
    /// absolute image position.
    pub fn par_pixels_mut(
        &mut self,
    ) -> impl IndexedParallelIterator<Item = (UVec2, &mut Rgba8)> + '_ {
        let start = self.start;
        let width = self.width as usize;
        self.pixels
            .par_iter_mut()
            .enumerate()
            .map(move |(offset, pixel)| {
                let idx = start + offset;
                (UVec2::new((idx % width) as u32, (idx / width) as u32), pixel)
            })
    }
}

impl PixelTarget for PixelSpan<'_> {
    fn put(&mut self, pos: UVec2, colour: Rgba8) {
        if pos.x >= self.width {
            return;
        }
        let idx = pos.y as usize * self.width as usize + pos.x as usize;
        if idx >= self.start && idx < self.start + self.pixels.len() {
            self.pixels[idx - self.start] = colour;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_buffer_is_zero_filled() {
        let buffer = RenderBuffer::new(UVec2::new(3, 2));
        assert_eq!(buffer.len(), 6);
        assert!(buffer.pixels().iter().all(|p| *p == Rgba8::TRANSPARENT));
        assert!(buffer.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn put_ignores_out_of_bounds_positions() {
        let mut buffer = RenderBuffer::new(UVec2::new(4, 4));
        buffer.put(UVec2::new(4, 0), Rgba8::BLACK);
        buffer.put(UVec2::new(0, 4), Rgba8::BLACK);
        assert!(buffer.pixels().iter().all(|p| *p == Rgba8::TRANSPARENT));
        buffer.put(UVec2::new(3, 3), Rgba8::BLACK);
        assert_eq!(buffer.pixel(3, 3), Some(Rgba8::BLACK));
    }

    #[test]
    fn row_bands_cover_the_image_once() {
        let mut buffer = RenderBuffer::new(UVec2::new(5, 7));
        let bands: Vec<(u32, u32)> = buffer.rows_mut(3).map(|b| (b.y(), b.rows())).collect();
        assert_eq!(bands, vec![(0, 3), (3, 3), (6, 1)]);
    }

    #[test]
    fn row_band_only_writes_its_own_rows() {
        let mut buffer = RenderBuffer::new(UVec2::new(4, 4));
        buffer.par_rows_mut(2).for_each(|mut band| {
            for y in 0..4 {
                for x in 0..4 {
                    let colour = Rgba8::opaque(band.y() as u8, 0, 0);
                    if band.contains(UVec2::new(x, y)) {
                        band.put(UVec2::new(x, y), colour);
                    }
                }
            }
        });
        assert_eq!(buffer.pixel(0, 1), Some(Rgba8::opaque(0, 0, 0)));
        assert_eq!(buffer.pixel(3, 2), Some(Rgba8::opaque(2, 0, 0)));
    }

    #[test]
    fn span_is_clipped_and_maps_positions() {
        let mut buffer = RenderBuffer::new(UVec2::new(4, 3));
        let mut span = buffer.span_mut(6..100);
        assert_eq!(span.start(), 6);
        assert_eq!(span.len(), 6);
        let positions: Vec<UVec2> = span.par_pixels_mut().map(|(pos, _)| pos).collect();
        assert_eq!(positions[0], UVec2::new(2, 1));
        assert_eq!(positions[5], UVec2::new(3, 2));
        span.put(UVec2::new(1, 0), Rgba8::BLACK);
        span.put(UVec2::new(2, 1), Rgba8::BLACK);
        assert_eq!(buffer.pixel(1, 0), Some(Rgba8::TRANSPARENT));
        assert_eq!(buffer.pixel(2, 1), Some(Rgba8::BLACK));
    }

    #[test]
    fn from_pixels_checks_size() {
        assert!(RenderBuffer::from_pixels(UVec2::new(2, 2), vec![Rgba8::BLACK; 3]).is_err());
        assert!(RenderBuffer::from_pixels(UVec2::new(2, 2), vec![Rgba8::BLACK; 4]).is_ok());
    }

    proptest! {
        #[test]
        fn row_bands_write_every_pixel_exactly_once(
            w in 1u32..64,
            h in 1u32..64,
            band in 1u32..32,
        ) {
            let mut buffer = RenderBuffer::new(UVec2::new(w, h));
            buffer.par_rows_mut(band).for_each(|mut b| {
                for y in b.y()..b.y() + b.rows() {
                    for x in 0..b.width() {
                        let pos = UVec2::new(x, y);
                        assert!(b.contains(pos));
                        b.put(pos, Rgba8::opaque(1, 0, 0));
                    }
                }
            });
            prop_assert!(buffer.pixels().iter().all(|p| *p == Rgba8::opaque(1, 0, 0)));
        }
    }
}
