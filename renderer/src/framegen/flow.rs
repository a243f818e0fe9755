//! Block-matching motion estimation.

use retimer_common::gpu::{dispatch_pixels, load, luminance, Texels};

/// Edge length of one flow block in source pixels.
pub const BLOCK_SIZE: u32 = 8;

/// Spacing between candidate offsets, in pixels.
const SEARCH_STEP: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    /// Candidates per direction; offsets span `±radius * SEARCH_STEP`.
    pub radius: i64,
    /// Spacing of the 3x3 luma samples compared per candidate.
    pub sample_step: i64,
}

impl SearchParams {
    /// Larger frames search a sparser neighbourhood to bound the cost.
    pub fn for_size(width: u32, height: u32) -> Self {
        let area = u64::from(width) * u64::from(height);
        if area >= 2560 * 1440 {
            Self { radius: 2, sample_step: 3 }
        } else if area >= 1920 * 1080 {
            Self { radius: 2, sample_step: 2 }
        } else {
            Self { radius: 3, sample_step: 2 }
        }
    }
}

/// Flow field dimensions for a frame: one vector per block.
pub fn flow_size(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(BLOCK_SIZE), height.div_ceil(BLOCK_SIZE))
}

fn block_center(block: u32) -> i64 {
    i64::from(block * BLOCK_SIZE + BLOCK_SIZE / 2)
}

/// Write the best offset per block into `flow` (`r`,`g` in pixels). The
/// offset maps a point of `previous` to where it appears in `current`.
pub fn estimate_flow(previous: &Texels, current: &Texels, flow: &mut Texels) {
    let params = SearchParams::for_size(previous.width(), previous.height());
    let radius = params.radius;
    let step = params.sample_step.max(1);

    dispatch_pixels(flow, |bx, by| {
        let (cx, cy) = (block_center(bx), block_center(by));
        let mut best_error = f32::MAX;
        let mut best_offset = (0i64, 0i64);

        for oy in -radius..=radius {
            for ox in -radius..=radius {
                let (dx, dy) = (ox * SEARCH_STEP, oy * SEARCH_STEP);
                let mut error = 0.0;
                for sy in -1..=1 {
                    for sx in -1..=1 {
                        let (px, py) = (cx + sx * step, cy + sy * step);
                        let before = luminance(load(previous, px, py));
                        let after = luminance(load(current, px + dx, py + dy));
                        error += (before - after).abs();
                    }
                }
                if error < best_error {
                    best_error = error;
                    best_offset = (dx, dy);
                }
            }
        }

        [best_offset.0 as f32, best_offset.1 as f32, 0.0, 0.0]
    });
}

/// Build the flow field from externally supplied per-pixel motion by
/// averaging each block.
pub fn flow_from_motion(motion: &Texels, flow: &mut Texels) {
    let (width, height) = motion.dimensions();

    dispatch_pixels(flow, |bx, by| {
        let x0 = bx * BLOCK_SIZE;
        let y0 = by * BLOCK_SIZE;
        let x1 = (x0 + BLOCK_SIZE).min(width);
        let y1 = (y0 + BLOCK_SIZE).min(height);

        let mut sum = (0.0f32, 0.0f32);
        let mut count = 0u32;
        for y in y0..y1 {
            for x in x0..x1 {
                let texel = motion.get_pixel(x, y).0;
                sum.0 += texel[0];
                sum.1 += texel[1];
                count += 1;
            }
        }
        if count == 0 {
            return [0.0; 4];
        }
        [sum.0 / count as f32, sum.1 / count as f32, 0.0, 0.0]
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn pattern(x: f32, y: f32) -> f32 {
        0.5 + 0.25 * (0.9 * x + 0.3 * y).sin() + 0.2 * (0.5 * y - 0.7 * x).cos()
    }

    fn gray(width: u32, height: u32, f: impl Fn(f32, f32) -> f32) -> Texels {
        ImageBuffer::from_fn(width, height, |x, y| {
            let v = f(x as f32, y as f32);
            Rgba([v, v, v, 1.0])
        })
    }

    fn flow_for(width: u32, height: u32) -> Texels {
        let (w, h) = flow_size(width, height);
        ImageBuffer::new(w, h)
    }

    #[test]
    fn search_tiers_follow_pixel_area() {
        assert_eq!(SearchParams::for_size(2560, 1440), SearchParams { radius: 2, sample_step: 3 });
        assert_eq!(SearchParams::for_size(1440, 2560), SearchParams { radius: 2, sample_step: 3 });
        assert_eq!(SearchParams::for_size(1920, 1080), SearchParams { radius: 2, sample_step: 2 });
        assert_eq!(SearchParams::for_size(1280, 720), SearchParams { radius: 3, sample_step: 2 });
    }

    #[test]
    fn flow_size_rounds_up() {
        assert_eq!(flow_size(16, 16), (2, 2));
        assert_eq!(flow_size(17, 9), (3, 2));
        assert_eq!(flow_size(1, 1), (1, 1));
    }

    #[test]
    fn detects_horizontal_shift() {
        let previous = gray(32, 32, pattern);
        let current = gray(32, 32, |x, y| pattern(x - 2.0, y));
        let mut flow = flow_for(32, 32);
        estimate_flow(&previous, &current, &mut flow);

        for (bx, by) in [(1, 1), (2, 1), (1, 2)] {
            assert_eq!(flow.get_pixel(bx, by).0[..2], [2.0, 0.0]);
        }
    }

    #[test]
    fn detects_vertical_shift() {
        let previous = gray(32, 32, pattern);
        let current = gray(32, 32, |x, y| pattern(x, y + 4.0));
        let mut flow = flow_for(32, 32);
        estimate_flow(&previous, &current, &mut flow);
        assert_eq!(flow.get_pixel(1, 2).0[..2], [0.0, -4.0]);
    }

    #[test]
    fn motion_is_averaged_per_block() {
        let motion: Texels = ImageBuffer::from_fn(12, 8, |x, _| {
            if x < 8 {
                Rgba([4.0, -2.0, 0.0, 0.0])
            } else {
                Rgba([1.0, 3.0, 0.0, 0.0])
            }
        });
        let mut flow = flow_for(12, 8);
        flow_from_motion(&motion, &mut flow);
        assert_eq!(flow.dimensions(), (2, 1));
        assert_eq!(flow.get_pixel(0, 0).0[..2], [4.0, -2.0]);
        assert_eq!(flow.get_pixel(1, 0).0[..2], [1.0, 3.0]);
    }
}
