//! Labeled images and the source abstraction that produces them.
//!
//! An [`Image`] is a pair of equally shaped 2-D planes: pixel data and
//! per-pixel class labels. Training never decodes images itself; it pulls
//! them from an [`ImageSource`], which hides where the planes come from
//! (files, network, memory). [`MemoryImageSource`] is the in-memory
//! implementation used by tests and small runs.

use std::sync::Arc;

use ndarray::Array2;

use crate::error::ImageError;

/// Pixel value type of the data plane.
pub type Pixel = i16;

/// Class label type of the label plane.
pub type Label = i16;

/// Signed pixel offset used by features.
pub type Offset = i16;

// ============================================================================
// Image
// ============================================================================

/// A single-channel image with per-pixel labels.
///
/// Both planes are indexed `[[x, y]]` with shape `(width, height)`.
/// Images are immutable after construction and shared read-only across
/// worker threads during training.
#[derive(Debug, Clone)]
pub struct Image {
    data: Array2<Pixel>,
    labels: Array2<Label>,
}

impl Image {
    /// Create an image from its data and label planes.
    ///
    /// Returns [`ImageError::ShapeMismatch`] if the planes differ in shape.
    pub fn new(data: Array2<Pixel>, labels: Array2<Label>) -> Result<Self, ImageError> {
        if data.dim() != labels.dim() {
            return Err(ImageError::ShapeMismatch {
                data: data.dim(),
                labels: labels.dim(),
            });
        }
        Ok(Self { data, labels })
    }

    /// Image width (extent of the `x` axis).
    #[inline]
    pub fn width(&self) -> usize {
        self.data.nrows()
    }

    /// Image height (extent of the `y` axis).
    #[inline]
    pub fn height(&self) -> usize {
        self.data.ncols()
    }

    /// Pixel value at `(x, y)`. Panics if out of bounds.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Pixel {
        self.data[[x, y]]
    }

    /// Label value at `(x, y)`. Panics if out of bounds.
    #[inline]
    pub fn label(&self, x: usize, y: usize) -> Label {
        self.labels[[x, y]]
    }

    /// Offset-addressed pixel read anchored at `(x, y)`.
    ///
    /// Reads outside the image yield `0`. This is a stable contract: the
    /// same rule applies when features are evaluated during training and
    /// when a serialized split point is replayed later.
    #[inline]
    pub fn pixel_at_offset(&self, x: u16, y: u16, dx: Offset, dy: Offset) -> Pixel {
        let xx = x as i64 + dx as i64;
        let yy = y as i64 + dy as i64;
        if xx < 0 || yy < 0 || xx >= self.width() as i64 || yy >= self.height() as i64 {
            0
        } else {
            self.data[[xx as usize, yy as usize]]
        }
    }
}

// ============================================================================
// ImageSource
// ============================================================================

/// Produces images on demand, keyed by index.
///
/// Implementations own decoding and I/O. The trainer only requires that
/// `load` returns an [`Image`] whose planes already passed the shape
/// check, and reports everything else as [`ImageError::Source`].
pub trait ImageSource {
    /// Total number of images this source can produce.
    fn num_images(&self) -> usize;

    /// Load the image at `index`.
    fn load(&mut self, index: usize) -> Result<Arc<Image>, ImageError>;
}

/// An [`ImageSource`] backed by images already resident in memory.
#[derive(Debug, Clone)]
pub struct MemoryImageSource {
    images: Vec<Arc<Image>>,
}

impl MemoryImageSource {
    /// Wrap a set of preloaded images.
    pub fn new(images: Vec<Arc<Image>>) -> Self {
        Self { images }
    }

    /// Build a source from owned images.
    pub fn from_images(images: Vec<Image>) -> Self {
        Self {
            images: images.into_iter().map(Arc::new).collect(),
        }
    }
}

impl ImageSource for MemoryImageSource {
    fn num_images(&self) -> usize {
        self.images.len()
    }

    fn load(&mut self, index: usize) -> Result<Arc<Image>, ImageError> {
        self.images
            .get(index)
            .cloned()
            .ok_or_else(|| ImageError::Source(format!("image index {} out of range", index)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn make_image() -> Image {
        let data = array![[1i16, 2], [3, 4]];
        let labels = array![[0i16, 0], [1, 1]];
        Image::new(data, labels).unwrap()
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let data = Array2::<Pixel>::zeros((2, 3));
        let labels = Array2::<Label>::zeros((3, 2));
        let err = Image::new(data, labels).unwrap_err();
        assert!(matches!(err, ImageError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_dimensions() {
        let image = make_image();
        assert_eq!(image.width(), 2);
        assert_eq!(image.height(), 2);
    }

    #[test]
    fn test_offset_read_in_bounds() {
        let image = make_image();
        assert_eq!(image.pixel_at_offset(0, 0, 1, 1), 4);
        assert_eq!(image.pixel_at_offset(1, 1, -1, -1), 1);
    }

    #[test]
    fn test_offset_read_out_of_bounds_is_zero() {
        let image = make_image();
        assert_eq!(image.pixel_at_offset(0, 0, -1, 0), 0);
        assert_eq!(image.pixel_at_offset(0, 0, 0, -1), 0);
        assert_eq!(image.pixel_at_offset(1, 1, 1, 0), 0);
        assert_eq!(image.pixel_at_offset(1, 1, 0, 1), 0);
        assert_eq!(image.pixel_at_offset(0, 0, 100, 100), 0);
    }

    #[test]
    fn test_memory_source() {
        let mut source = MemoryImageSource::from_images(vec![make_image()]);
        assert_eq!(source.num_images(), 1);
        assert!(source.load(0).is_ok());
        assert!(matches!(source.load(1), Err(ImageError::Source(_))));
    }
}
