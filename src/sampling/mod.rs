//! Bagging, per-image subsampling, and the image cache.
//!
//! The [`SampleProvider`] turns an [`ImageSource`] into flat batches of
//! pixel samples. For each tree it draws a bag of image indices (with
//! replacement), loads the bag in sequential sub-batches, and emits one
//! [`SampleSet`]: an arena of pinned images plus a shuffled list of
//! [`PixelSample`]s referencing them by slot.
//!
//! Samples are plain `(slot, x, y)` triples, so they are `Copy` and stay
//! valid exactly as long as the `SampleSet` that owns the arena. The
//! provider's cache is generational: loading a batch keeps the previous
//! batch's mapping around as a fallback, so images shared between
//! consecutive batches (or consecutive bags) are never reloaded.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;

use crate::error::{ImageError, TrainError};
use crate::image::{Image, ImageSource, Label};

// ============================================================================
// SampleParams
// ============================================================================

/// Configuration of bag formation and per-image subsampling.
#[derive(Debug, Clone)]
pub struct SampleParams {
    /// Fraction of all images drawn (with replacement) into one bag.
    pub bagging_fraction: f64,
    /// Fraction of in-image pixels kept after background filtering.
    pub samples_per_image_fraction: f64,
    /// Label value marking pixels that are never sampled.
    pub background_label: Label,
    /// Number of sequential sub-batches the bag is split into.
    pub num_batches: usize,
}

impl Default for SampleParams {
    fn default() -> Self {
        Self {
            bagging_fraction: 1.0,
            samples_per_image_fraction: 0.1,
            background_label: Label::MAX,
            num_batches: 1,
        }
    }
}

impl SampleParams {
    /// Check the parameters before training starts.
    pub fn validate(&self) -> Result<(), TrainError> {
        if !(self.bagging_fraction > 0.0 && self.bagging_fraction <= 1.0) {
            return Err(TrainError::Config(format!(
                "bagging_fraction must be in (0, 1], got {}",
                self.bagging_fraction
            )));
        }
        if !(self.samples_per_image_fraction > 0.0 && self.samples_per_image_fraction <= 1.0) {
            return Err(TrainError::Config(format!(
                "samples_per_image_fraction must be in (0, 1], got {}",
                self.samples_per_image_fraction
            )));
        }
        if self.num_batches == 0 {
            return Err(TrainError::Config(
                "num_batches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// PixelSample / SampleSet
// ============================================================================

/// One training sample: a pixel location in an arena-held image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSample {
    /// Arena slot of the image this sample is anchored in.
    pub image: u32,
    pub x: u16,
    pub y: u16,
}

/// The samples of one bag, together with the images they reference.
///
/// The arena pins every referenced image for the lifetime of the set, so
/// samples can be passed around freely while a tree trains.
#[derive(Debug, Clone)]
pub struct SampleSet {
    images: Vec<Arc<Image>>,
    samples: Vec<PixelSample>,
}

impl SampleSet {
    /// Assemble a set from an image arena and samples referencing it.
    pub fn from_parts(images: Vec<Arc<Image>>, samples: Vec<PixelSample>) -> Self {
        debug_assert!(samples.iter().all(|s| (s.image as usize) < images.len()));
        Self { images, samples }
    }

    /// Image pinned at `slot`.
    #[inline]
    pub fn image(&self, slot: u32) -> &Image {
        &self.images[slot as usize]
    }

    /// Label of a sample.
    #[inline]
    pub fn label(&self, sample: PixelSample) -> Label {
        self.images[sample.image as usize].label(sample.x as usize, sample.y as usize)
    }

    /// All samples of the bag.
    #[inline]
    pub fn samples(&self) -> &[PixelSample] {
        &self.samples
    }

    /// Number of samples.
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Number of distinct images pinned in the arena.
    #[inline]
    pub fn num_images(&self) -> usize {
        self.images.len()
    }
}

// ============================================================================
// SampleProvider
// ============================================================================

/// Produces one [`SampleSet`] per bag while keeping image loads bounded.
#[derive(Debug)]
pub struct SampleProvider<S: ImageSource> {
    source: S,
    params: SampleParams,
    cache: HashMap<usize, Arc<Image>>,
}

impl<S: ImageSource> SampleProvider<S> {
    /// Wrap an image source.
    pub fn new(source: S, params: SampleParams) -> Self {
        Self {
            source,
            params,
            cache: HashMap::new(),
        }
    }

    /// The sampling configuration.
    pub fn params(&self) -> &SampleParams {
        &self.params
    }

    /// Number of images available from the underlying source.
    pub fn num_images(&self) -> usize {
        self.source.num_images()
    }

    /// Drop all cached images.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Draw one bag of image indices and split it into batches.
    ///
    /// The bag holds `⌊bagging_fraction · num_images⌋` indices drawn with
    /// replacement and sorted ascending; batch `i` covers the slice
    /// `[⌊i·|bag|/B⌋, ⌊(i+1)·|bag|/B⌋)`.
    pub fn compute_bag_batches<R: Rng>(&self, rng: &mut R) -> Vec<Vec<usize>> {
        let num_images = self.source.num_images();
        let bag_size = (self.params.bagging_fraction * num_images as f64).floor() as usize;

        let mut bag: Vec<usize> = (0..bag_size)
            .map(|_| rng.gen_range(0..num_images))
            .collect();
        bag.sort_unstable();

        let num_batches = self.params.num_batches;
        (0..num_batches)
            .map(|i| {
                let start = i * bag_size / num_batches;
                let end = (i + 1) * bag_size / num_batches;
                bag[start..end].to_vec()
            })
            .collect()
    }

    /// Draw a bag and load its samples, batch by batch.
    ///
    /// Every loaded image is pinned in the returned set's arena; the
    /// provider's cache only controls which images need reloading.
    pub fn load_bag<R: Rng>(&mut self, rng: &mut R) -> Result<SampleSet, TrainError> {
        let batches = self.compute_bag_batches(rng);

        let mut images: Vec<Arc<Image>> = Vec::new();
        let mut slots: HashMap<usize, u32> = HashMap::new();
        let mut samples: Vec<PixelSample> = Vec::new();

        for batch in &batches {
            // Rotate the active cache into a one-generation fallback.
            let fallback = std::mem::take(&mut self.cache);
            for &index in batch {
                let image = self.fetch_image(index, &fallback)?;
                self.cache.insert(index, image.clone());

                let slot = match slots.get(&index) {
                    Some(&slot) => slot,
                    None => {
                        let slot = images.len() as u32;
                        images.push(image.clone());
                        slots.insert(index, slot);
                        slot
                    }
                };
                draw_image_samples(&image, slot, &self.params, rng, &mut samples);
            }
            // fallback generation dropped here
        }

        Ok(SampleSet::from_parts(images, samples))
    }

    /// Resolve an image: active cache, then fallback generation, then the
    /// source.
    fn fetch_image(
        &mut self,
        index: usize,
        fallback: &HashMap<usize, Arc<Image>>,
    ) -> Result<Arc<Image>, ImageError> {
        if let Some(image) = self.cache.get(&index) {
            return Ok(image.clone());
        }
        if let Some(image) = fallback.get(&index) {
            return Ok(image.clone());
        }
        self.source.load(index)
    }
}

/// Sample pixel locations from one image into `out`.
///
/// Background-labeled pixels are excluded up front. When the configured
/// fraction is below one, a uniform subset of `⌊fraction · W · H⌋` pixels
/// (capped by the non-background count) is retained via a partial
/// Fisher–Yates shuffle; otherwise all non-background pixels are kept.
fn draw_image_samples<R: Rng>(
    image: &Image,
    slot: u32,
    params: &SampleParams,
    rng: &mut R,
    out: &mut Vec<PixelSample>,
) {
    let width = image.width();
    let height = image.height();
    debug_assert!(width <= u16::MAX as usize && height <= u16::MAX as usize);

    let mut pool: Vec<PixelSample> = Vec::new();
    for x in 0..width {
        for y in 0..height {
            if image.label(x, y) != params.background_label {
                pool.push(PixelSample {
                    image: slot,
                    x: x as u16,
                    y: y as u16,
                });
            }
        }
    }

    if params.samples_per_image_fraction < 1.0 {
        let target =
            (params.samples_per_image_fraction * (width * height) as f64).floor() as usize;
        let keep = target.min(pool.len());
        for i in 0..keep {
            let j = rng.gen_range(i..pool.len());
            pool.swap(i, j);
        }
        out.extend_from_slice(&pool[..keep]);
    } else {
        out.append(&mut pool);
    }
}

// ============================================================================
// Tests
// ============================================================================
