//! Blur compositor.
//!
//! For each selected region: pad the box, obscure the padded crop with the
//! configured blur chain, then alpha-blend it back through a soft-edge mask.
//! Pixels outside every padded region are never written.

mod blur;
mod mask;

use image::imageops;
use serde::{Deserialize, Serialize};

use crate::error::{RedactError, Result};
use crate::frame::{Frame, PixelRect, CHANNELS};
use crate::select::RedactionRegion;

pub use blur::{
    apply_stages, force_odd, gaussian, motion_blur, pixelate, BlurStage, MIN_ADAPTIVE_BLOCK,
    MIN_ADAPTIVE_KERNEL,
};

/// Blur chain and blending knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurSettings {
    pub stages: Vec<BlurStage>,
    /// Scale stage sizes to each region.
    pub adaptive: bool,
    /// Pixels added on every side before blurring, clamped to the frame.
    pub edge_padding: u32,
    /// Peak opacity of the blurred layer, in `[0, 1]`.
    pub blend_alpha: f32,
}

impl Default for BlurSettings {
    fn default() -> Self {
        Self {
            stages: vec![
                BlurStage::Gaussian {
                    kernel: 15,
                    sigma: 5.0,
                },
                BlurStage::Pixelate { size: 6 },
                BlurStage::MotionBlur { kernel: 7 },
            ],
            adaptive: true,
            edge_padding: 3,
            blend_alpha: 0.8,
        }
    }
}

impl BlurSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.blend_alpha.is_finite() && (0.0..=1.0).contains(&self.blend_alpha)) {
            return Err(RedactError::InvalidConfig(format!(
                "blend_alpha {} outside [0, 1]",
                self.blend_alpha
            )));
        }
        for stage in &self.stages {
            let size = match *stage {
                BlurStage::Gaussian { kernel, sigma } => {
                    if !sigma.is_finite() {
                        return Err(RedactError::InvalidConfig(
                            "gaussian sigma must be finite".into(),
                        ));
                    }
                    kernel
                }
                BlurStage::Pixelate { size } => size,
                BlurStage::MotionBlur { kernel } => kernel,
            };
            if size == 0 {
                return Err(RedactError::InvalidConfig(format!(
                    "{} stage size must be positive",
                    stage.name()
                )));
            }
        }
        Ok(())
    }
}

/// Obscure every region of `frame` in place.
///
/// Regions are applied sequentially in the given order; where padded boxes
/// overlap, later regions blur pixels already blended by earlier ones.
/// Zero-area regions are skipped.
pub fn composite(frame: &mut Frame, regions: &[RedactionRegion], settings: &BlurSettings) {
    let (width, height) = frame.dimensions();
    for region in regions {
        let inner = region.rect();
        if inner.is_empty() {
            log::debug!("skipping zero-area region for {}", region.class_name());
            continue;
        }
        let padded = inner.expand(settings.edge_padding, width, height);
        composite_region(frame, inner, padded, settings);
    }
}

fn composite_region(frame: &mut Frame, inner: PixelRect, padded: PixelRect, settings: &BlurSettings) {
    let roi = imageops::crop_imm(
        frame.as_image(),
        padded.x1,
        padded.y1,
        padded.width(),
        padded.height(),
    )
    .to_image();

    let adaptive = settings
        .adaptive
        .then(|| (inner.width(), inner.height()));
    let blurred = apply_stages(&roi, &settings.stages, adaptive);
    let mask = mask::EdgeMask::new(padded, inner);
    let alpha = settings.blend_alpha;

    let target = frame.as_image_mut();
    for y in 0..padded.height() {
        for x in 0..padded.width() {
            let a = mask.weight(x, y) * alpha;
            let src = roi.get_pixel(x, y).0;
            let blur = blurred.get_pixel(x, y).0;
            let mut out = [0u8; CHANNELS];
            for c in 0..CHANNELS {
                let orig = src[c] as f32;
                let mixed = orig + (blur[c] as f32 - orig) * a;
                out[c] = mixed.round().clamp(0.0, 255.0) as u8;
            }
            target.put_pixel(padded.x1 + x, padded.y1 + y, image::Rgb(out));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};
    use crate::labels::RedactSet;
    use crate::select::select;

    fn noisy_frame(width: u32, height: u32) -> Frame {
        let mut frame = Frame::new(width, height).unwrap();
        for y in 0..height {
            for x in 0..width {
                let v = ((x * 37 + y * 91) % 256) as u8;
                frame.put_pixel(x, y, [v, 255 - v, (x * y % 256) as u8]);
            }
        }
        frame
    }

    fn regions(boxes: &[(f32, f32, f32, f32)]) -> Vec<RedactionRegion> {
        let dets: Vec<Detection> = boxes
            .iter()
            .map(|&(x1, y1, x2, y2)| {
                Detection::new(2, "BUTTOCKS_EXPOSED", 0.9, BoundingBox::new(x1, y1, x2, y2))
            })
            .collect();
        select(&dets, &RedactSet::default(), 0.5)
    }

    #[test]
    fn only_padded_region_is_touched() {
        let original = noisy_frame(100, 100);
        let mut frame = original.clone();
        composite(
            &mut frame,
            &regions(&[(10.0, 10.0, 50.0, 50.0)]),
            &BlurSettings::default(),
        );

        let padded = PixelRect::new(7, 7, 53, 53);
        let mut changed_inside = 0;
        for y in 0..100 {
            for x in 0..100 {
                if padded.contains(x, y) {
                    if frame.pixel(x, y) != original.pixel(x, y) {
                        changed_inside += 1;
                    }
                } else {
                    assert_eq!(frame.pixel(x, y), original.pixel(x, y), "({}, {})", x, y);
                }
            }
        }
        assert!(changed_inside > 1000, "only {} pixels changed", changed_inside);
    }

    #[test]
    fn no_regions_leave_frame_untouched() {
        let original = noisy_frame(32, 24);
        let mut frame = original.clone();
        composite(&mut frame, &[], &BlurSettings::default());
        assert_eq!(frame, original);
    }

    #[test]
    fn zero_area_regions_are_skipped() {
        let original = noisy_frame(32, 32);
        let mut frame = original.clone();
        composite(
            &mut frame,
            &regions(&[(5.0, 5.0, 5.0, 20.0)]),
            &BlurSettings::default(),
        );
        assert_eq!(frame, original);
    }

    #[test]
    fn zero_alpha_is_a_no_op() {
        let original = noisy_frame(40, 40);
        let mut frame = original.clone();
        let settings = BlurSettings {
            blend_alpha: 0.0,
            ..BlurSettings::default()
        };
        composite(&mut frame, &regions(&[(4.0, 4.0, 30.0, 30.0)]), &settings);
        assert_eq!(frame, original);
    }

    #[test]
    fn region_at_frame_edge_stays_in_bounds() {
        let original = noisy_frame(20, 20);
        let mut frame = original.clone();
        composite(
            &mut frame,
            &regions(&[(0.0, 0.0, 20.0, 20.0), (15.0, 15.0, 20.0, 20.0)]),
            &BlurSettings::default(),
        );
        assert_ne!(frame, original);
    }

    #[test]
    fn overlapping_regions_composite_in_order() {
        let a = (4.0, 4.0, 30.0, 30.0);
        let b = (20.0, 20.0, 46.0, 46.0);
        let settings = BlurSettings::default();
        let original = noisy_frame(50, 50);

        let mut together = original.clone();
        composite(&mut together, &regions(&[a, b]), &settings);

        let mut one_by_one = original.clone();
        composite(&mut one_by_one, &regions(&[a]), &settings);
        composite(&mut one_by_one, &regions(&[b]), &settings);
        assert_eq!(together, one_by_one);

        let mut reversed = original.clone();
        composite(&mut reversed, &regions(&[b, a]), &settings);
        let overlap_differs = (20..30)
            .flat_map(|y| (20..30).map(move |x| (x, y)))
            .any(|(x, y)| together.pixel(x, y) != reversed.pixel(x, y));
        assert!(overlap_differs, "order had no effect on the overlap");
    }

    #[test]
    fn validate_rejects_bad_settings() {
        assert!(BlurSettings::default().validate().is_ok());

        let bad_alpha = BlurSettings {
            blend_alpha: 1.5,
            ..BlurSettings::default()
        };
        assert!(matches!(
            bad_alpha.validate(),
            Err(RedactError::InvalidConfig(_))
        ));

        let bad_stage = BlurSettings {
            stages: vec![BlurStage::Pixelate { size: 0 }],
            ..BlurSettings::default()
        };
        assert!(bad_stage.validate().is_err());
    }
}
