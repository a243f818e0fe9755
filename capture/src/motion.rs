use retimer_common::frame::MotionHint;
use retimer_common::gpu::{load, Texels};

const GRID_WIDTH: usize = 32;
const GRID_HEIGHT: usize = 18;
const MAX_SHIFT: i32 = 2;
/// Shift search runs on every Nth frame; frames in between reuse the last
/// smoothed estimate.
const ESTIMATE_INTERVAL: u64 = 3;
const SMOOTHING: f32 = 0.7;

/// Coarse whole-frame motion estimate used as the per-frame motion hint.
///
/// Each frame is reduced to a 32x18 luma grid; the integer grid shift with
/// the lowest absolute difference against the previous grid is scaled back
/// to source pixels and exponentially smoothed.
#[derive(Debug, Default)]
pub struct GlobalMotionEstimator {
    previous_grid: Option<Vec<u8>>,
    smoothed: MotionHint,
    frame_counter: u64,
}

impl GlobalMotionEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.previous_grid = None;
        self.smoothed = MotionHint::ZERO;
        self.frame_counter = 0;
    }

    pub fn estimate(&mut self, texels: &Texels) -> MotionHint {
        self.frame_counter = self.frame_counter.wrapping_add(1);

        let width = texels.width().max(1);
        let height = texels.height().max(1);
        let current = luma_grid(texels);
        let Some(previous) = self.previous_grid.replace(current.clone()) else {
            return MotionHint::ZERO;
        };

        if self.frame_counter % ESTIMATE_INTERVAL != 0 {
            return self.smoothed;
        }

        let (dx, dy) = best_shift(&previous, &current);
        let scale_x = width as f32 / GRID_WIDTH as f32;
        let scale_y = height as f32 / GRID_HEIGHT as f32;

        self.smoothed = MotionHint {
            x: self.smoothed.x * SMOOTHING + dx as f32 * scale_x * (1.0 - SMOOTHING),
            y: self.smoothed.y * SMOOTHING + dy as f32 * scale_y * (1.0 - SMOOTHING),
        };
        self.smoothed
    }
}

fn luma_grid(texels: &Texels) -> Vec<u8> {
    let width = texels.width().max(1) as usize;
    let height = texels.height().max(1) as usize;
    let mut grid = vec![0u8; GRID_WIDTH * GRID_HEIGHT];

    for sy in 0..GRID_HEIGHT {
        let y = ((sy * height) / GRID_HEIGHT).min(height - 1);
        for sx in 0..GRID_WIDTH {
            let x = ((sx * width) / GRID_WIDTH).min(width - 1);
            let [r, g, b, _] = load(texels, x as i64, y as i64);
            let luma = (29 * to_byte(b) + 150 * to_byte(g) + 77 * to_byte(r)) >> 8;
            grid[sy * GRID_WIDTH + sx] = luma.min(255) as u8;
        }
    }
    grid
}

fn to_byte(channel: f32) -> u32 {
    (channel.clamp(0.0, 1.0) * 255.0).round() as u32
}

fn best_shift(previous: &[u8], current: &[u8]) -> (i32, i32) {
    let width = GRID_WIDTH as i32;
    let height = GRID_HEIGHT as i32;
    let mut best = (0, 0);
    let mut best_error = u64::MAX;

    for dy in -MAX_SHIFT..=MAX_SHIFT {
        for dx in -MAX_SHIFT..=MAX_SHIFT {
            let x_range = (-dx).max(0)..width.min(width - dx);
            let y_range = (-dy).max(0)..height.min(height - dy);
            if x_range.is_empty() || y_range.is_empty() {
                continue;
            }

            let mut error = 0u64;
            for y in y_range {
                let prev_row = (y * width) as usize;
                let curr_row = ((y + dy) * width) as usize;
                for x in x_range.clone() {
                    let prev = previous[prev_row + x as usize];
                    let curr = current[curr_row + (x + dx) as usize];
                    error += u64::from(prev.abs_diff(curr));
                }
            }

            if error < best_error {
                best_error = error;
                best = (dx, dy);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    /// Gray pattern translated right by `offset` pixels.
    fn pattern(offset: i64) -> Texels {
        ImageBuffer::from_fn(64, 36, |x, y| {
            let sx = x as i64 - offset;
            let y = y as i64;
            let v = (sx * sx * 31 + y * 17 + sx * y * 7).rem_euclid(256) as f32 / 255.0;
            Rgba([v, v, v, 1.0])
        })
    }

    #[test]
    fn first_frames_report_no_motion() {
        let mut estimator = GlobalMotionEstimator::new();
        assert_eq!(estimator.estimate(&pattern(0)), MotionHint::ZERO);
        assert_eq!(estimator.estimate(&pattern(2)), MotionHint::ZERO);
    }

    #[test]
    fn detects_horizontal_pan_on_third_frame() {
        let mut estimator = GlobalMotionEstimator::new();
        estimator.estimate(&pattern(0));
        estimator.estimate(&pattern(2));
        let hint = estimator.estimate(&pattern(4));
        // One grid cell is two source pixels; first smoothed step keeps 30%.
        assert!((hint.x - 0.6).abs() < 1e-5, "hint = {hint:?}");
        assert!(hint.y.abs() < 1e-5);
    }

    #[test]
    fn reset_forgets_history() {
        let mut estimator = GlobalMotionEstimator::new();
        for offset in [0, 2, 4] {
            estimator.estimate(&pattern(offset));
        }
        estimator.reset();
        assert_eq!(estimator.estimate(&pattern(6)), MotionHint::ZERO);
    }

    #[test]
    fn static_content_has_zero_shift() {
        let grid = luma_grid(&pattern(0));
        assert_eq!(best_shift(&grid, &grid), (0, 0));
    }
}
