//! Obscuring transforms applied to a region of interest.
//!
//! All filters treat the ROI as an isolated image and mirror it at its borders
//! (reflect-101: `dcb|abcd|cba`), so a stage never reads outside the ROI.
//! `imageops::blur` is not used: it takes only a sigma, not a kernel size.

use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::frame::CHANNELS;

/// Smallest kernel adaptive sizing will produce for kernel-based stages.
pub const MIN_ADAPTIVE_KERNEL: u32 = 3;
/// Smallest pixel block adaptive sizing will produce.
pub const MIN_ADAPTIVE_BLOCK: u32 = 2;

/// One step of the blur chain. Stages run in order, each on the previous output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlurStage {
    /// Separable Gaussian. Even kernels are bumped to the next odd size.
    /// `sigma <= 0` derives sigma from the kernel size.
    Gaussian {
        kernel: u32,
        #[serde(default)]
        sigma: f32,
    },
    /// Area-average down to `size`-pixel blocks, then nearest-neighbour back up.
    Pixelate { size: u32 },
    /// Horizontal 1-D box kernel.
    MotionBlur { kernel: u32 },
}

impl BlurStage {
    pub fn name(&self) -> &'static str {
        match self {
            BlurStage::Gaussian { .. } => "gaussian",
            BlurStage::Pixelate { .. } => "pixelate",
            BlurStage::MotionBlur { .. } => "motion_blur",
        }
    }

    /// Scale this stage to a `width` x `height` region.
    ///
    /// Sizes become `max(minimum, min(configured, width / 4, height / 4))` so
    /// small regions keep some structure and larger regions grow toward the
    /// configured strength. Kernel sizes stay odd.
    pub fn adapted_to(&self, width: u32, height: u32) -> BlurStage {
        let fit = |configured: u32, minimum: u32| {
            configured.min(width / 4).min(height / 4).max(minimum)
        };
        match *self {
            BlurStage::Gaussian { kernel, sigma } => BlurStage::Gaussian {
                kernel: force_odd(fit(kernel, MIN_ADAPTIVE_KERNEL)),
                sigma,
            },
            BlurStage::Pixelate { size } => BlurStage::Pixelate {
                size: fit(size, MIN_ADAPTIVE_BLOCK),
            },
            BlurStage::MotionBlur { kernel } => BlurStage::MotionBlur {
                kernel: force_odd(fit(kernel, MIN_ADAPTIVE_KERNEL)),
            },
        }
    }

    pub fn apply(&self, src: &RgbImage) -> RgbImage {
        match *self {
            BlurStage::Gaussian { kernel, sigma } => gaussian(src, kernel, sigma),
            BlurStage::Pixelate { size } => pixelate(src, size),
            BlurStage::MotionBlur { kernel } => motion_blur(src, kernel),
        }
    }
}

/// Run `stages` in order over `roi`.
///
/// With `adaptive = Some((w, h))` every stage is first sized for a `w` x `h`
/// region.
pub fn apply_stages(roi: &RgbImage, stages: &[BlurStage], adaptive: Option<(u32, u32)>) -> RgbImage {
    let mut current = roi.clone();
    for stage in stages {
        let stage = match adaptive {
            Some((w, h)) => stage.adapted_to(w, h),
            None => stage.clone(),
        };
        current = stage.apply(&current);
    }
    current
}

pub fn force_odd(size: u32) -> u32 {
    if size % 2 == 0 {
        size + 1
    } else {
        size
    }
}

pub fn gaussian(src: &RgbImage, kernel: u32, sigma: f32) -> RgbImage {
    let size = force_odd(kernel.max(1));
    if size == 1 {
        return src.clone();
    }
    let weights = gaussian_kernel(size as usize, sigma);
    separable_filter(src, &weights, &weights)
}

pub fn motion_blur(src: &RgbImage, kernel: u32) -> RgbImage {
    let size = force_odd(kernel.max(1));
    if size == 1 {
        return src.clone();
    }
    let weights = vec![1.0 / size as f32; size as usize];
    separable_filter(src, &weights, &[1.0])
}

/// Regions no larger than one block are left untouched.
pub fn pixelate(src: &RgbImage, block: u32) -> RgbImage {
    let (width, height) = src.dimensions();
    if block <= 1 || width <= block || height <= block {
        return src.clone();
    }
    let small = imageops::resize(src, width / block, height / block, FilterType::Triangle);
    nearest_upscale(&small, width, height)
}

fn nearest_upscale(small: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (sw, sh) = small.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let sx = ((x as u64 * sw as u64) / width as u64) as u32;
        let sy = ((y as u64 * sh as u64) / height as u64) as u32;
        *small.get_pixel(sx.min(sw - 1), sy.min(sh - 1))
    })
}

/// Normalized 1-D Gaussian weights.
fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let half = (size / 2) as isize;
    let denom = 2.0 * sigma * sigma;
    let mut weights: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

fn reflect_101(pos: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let mut p = pos.rem_euclid(period);
    if p >= len as isize {
        p = period - p;
    }
    p as usize
}

/// Horizontal pass with `kx`, then vertical pass with `ky`. Both kernels have odd length.
fn separable_filter(src: &RgbImage, kx: &[f32], ky: &[f32]) -> RgbImage {
    let (width, height) = src.dimensions();
    let (w, h) = (width as usize, height as usize);
    let raw = src.as_raw();
    let rx = (kx.len() / 2) as isize;
    let ry = (ky.len() / 2) as isize;

    let mut tmp = vec![0f32; w * h * CHANNELS];
    for y in 0..h {
        let row = y * w;
        for x in 0..w {
            for c in 0..CHANNELS {
                let mut acc = 0.0f32;
                for (i, weight) in kx.iter().enumerate() {
                    let sx = reflect_101(x as isize + i as isize - rx, w);
                    acc += weight * raw[(row + sx) * CHANNELS + c] as f32;
                }
                tmp[(row + x) * CHANNELS + c] = acc;
            }
        }
    }

    let mut out = RgbImage::new(width, height);
    let dst: &mut [u8] = &mut out;
    for y in 0..h {
        for x in 0..w {
            for c in 0..CHANNELS {
                let mut acc = 0.0f32;
                for (i, weight) in ky.iter().enumerate() {
                    let sy = reflect_101(y as isize + i as isize - ry, h);
                    acc += weight * tmp[(sy * w + x) * CHANNELS + c];
                }
                dst[(y * w + x) * CHANNELS + c] = acc.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}
