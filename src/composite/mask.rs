use crate::frame::PixelRect;

/// Soft-edge opacity over a padded region, as two precomputed 1-D ramps.
///
/// Inside the unpadded box the weight is 1.0. Across each padding strip it
/// falls linearly toward 0 at the outer edge: strip pixel `i` (counted from the
/// outside, 0-based) of a `p`-pixel strip weighs `(i + 1) / (p + 1)`. Sides
/// whose padding was clipped by the frame edge ramp over what remains. A pixel's
/// weight is the minimum of its column and row ramps.
pub(crate) struct EdgeMask {
    columns: Vec<f32>,
    rows: Vec<f32>,
}

impl EdgeMask {
    /// `inner` must lie within `padded`.
    pub(crate) fn new(padded: PixelRect, inner: PixelRect) -> Self {
        Self {
            columns: ramp(
                padded.width(),
                inner.x1 - padded.x1,
                padded.x2 - inner.x2,
            ),
            rows: ramp(
                padded.height(),
                inner.y1 - padded.y1,
                padded.y2 - inner.y2,
            ),
        }
    }

    /// Weight at `(x, y)` relative to the padded box origin.
    pub(crate) fn weight(&self, x: u32, y: u32) -> f32 {
        let column = self.columns.get(x as usize).copied().unwrap_or(0.0);
        let row = self.rows.get(y as usize).copied().unwrap_or(0.0);
        column.min(row)
    }
}

fn ramp(len: u32, lead: u32, trail: u32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            if i < lead {
                (i + 1) as f32 / (lead + 1) as f32
            } else if i >= len - trail {
                (len - i) as f32 / (trail + 1) as f32
            } else {
                1.0
            }
        })
        .collect()
}
