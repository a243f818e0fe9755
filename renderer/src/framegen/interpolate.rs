//! Flow-guided interpolation shading.

use retimer_common::frame::MotionHint;
use retimer_common::gpu::{dispatch_pixels, load, mix, saturate, Sampler, Texels};

/// Largest global motion bias, in UV units per axis.
const GLOBAL_MOTION_LIMIT: f32 = 0.08;
const DISAGREEMENT_GAIN: f32 = 2.25;
const DISAGREEMENT_WEIGHT: f32 = 0.45;

/// Producer motion hint converted to a clamped UV displacement.
pub fn global_motion_uv(hint: MotionHint, width: u32, height: u32) -> (f32, f32) {
    let u = hint.x / width.max(1) as f32;
    let v = hint.y / height.max(1) as f32;
    let clamp = |value: f32| {
        if value.is_finite() {
            value.clamp(-GLOBAL_MOTION_LIMIT, GLOBAL_MOTION_LIMIT)
        } else {
            0.0
        }
    };
    (clamp(u), clamp(v))
}

pub struct InterpolationInputs<'a> {
    pub previous: &'a Texels,
    pub current: &'a Texels,
    pub flow: &'a Texels,
    /// Drawn over the result without warping.
    pub overlay: Option<&'a Texels>,
    pub blend_factor: f32,
    pub global_motion: (f32, f32),
}

/// Warp both frames toward `blend_factor` along the flow field and fall back
/// to a plain cross-dissolve where the two warped samples disagree.
pub fn shade_interpolated(inputs: &InterpolationInputs<'_>, out: &mut Texels) {
    let width = out.width().max(1) as f32;
    let height = out.height().max(1) as f32;
    let inv_size = (1.0 / width, 1.0 / height);
    let blend = saturate(inputs.blend_factor);
    let sampler = Sampler::LINEAR;

    dispatch_pixels(out, |x, y| {
        let u = saturate((x as f32 + 0.5) / width);
        let v = saturate((y as f32 + 0.5) / height);

        let flow = sampler.sample(inputs.flow, u, v);
        let flow_u = flow[0] * inv_size.0 + inputs.global_motion.0;
        let flow_v = flow[1] * inv_size.1 + inputs.global_motion.1;

        let prev_warped = sampler.sample(
            inputs.previous,
            saturate(u - flow_u * blend),
            saturate(v - flow_v * blend),
        );
        let curr_warped = sampler.sample(
            inputs.current,
            saturate(u + flow_u * (1.0 - blend)),
            saturate(v + flow_v * (1.0 - blend)),
        );
        let warped = mix(prev_warped, curr_warped, blend);

        let fallback = mix(
            sampler.sample(inputs.previous, u, v),
            sampler.sample(inputs.current, u, v),
            blend,
        );

        let mismatch = (0..3)
            .map(|c| (prev_warped[c] - curr_warped[c]).powi(2))
            .sum::<f32>()
            .sqrt();
        let weight = (mismatch * DISAGREEMENT_GAIN).clamp(0.0, 1.0) * DISAGREEMENT_WEIGHT;
        let color = mix(warped, fallback, weight);

        let mut color = [color[0], color[1], color[2], 1.0];
        if let Some(overlay) = inputs.overlay {
            let ui = load(overlay, i64::from(x), i64::from(y));
            let alpha = saturate(ui[3]);
            for c in 0..3 {
                color[c] = ui[c] * alpha + color[c] * (1.0 - alpha);
            }
        }
        color
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn solid(width: u32, height: u32, value: [f32; 4]) -> Texels {
        ImageBuffer::from_pixel(width, height, Rgba(value))
    }

    #[test]
    fn global_motion_is_normalized_and_clamped() {
        let (u, v) = global_motion_uv(MotionHint::new(19.2, -10.8), 1920, 1080);
        assert!((u - 0.01).abs() < 1e-6);
        assert!((v + 0.01).abs() < 1e-6);

        let (u, v) = global_motion_uv(MotionHint::new(1000.0, -1000.0), 100, 100);
        assert_eq!((u, v), (0.08, -0.08));
        assert_eq!(global_motion_uv(MotionHint::new(f32::NAN, 0.0), 10, 10), (0.0, 0.0));
    }

    #[test]
    fn flat_frames_cross_dissolve() {
        let previous = solid(8, 8, [0.2, 0.2, 0.2, 1.0]);
        let current = solid(8, 8, [0.6, 0.6, 0.6, 1.0]);
        let flow = solid(1, 1, [2.0, -2.0, 0.0, 0.0]);
        let mut out = solid(8, 8, [0.0; 4]);
        shade_interpolated(
            &InterpolationInputs {
                previous: &previous,
                current: &current,
                flow: &flow,
                overlay: None,
                blend_factor: 0.25,
                global_motion: (0.0, 0.0),
            },
            &mut out,
        );
        let texel = out.get_pixel(3, 3).0;
        assert!((texel[0] - 0.3).abs() < 1e-5);
        assert_eq!(texel[3], 1.0);
    }

    #[test]
    fn warp_follows_flow_to_the_midpoint() {
        // A bright column moves from x=4 to x=8 between the two frames.
        let column = |at: u32| -> Texels {
            ImageBuffer::from_fn(16, 4, move |x, _| {
                let v = if x == at { 1.0 } else { 0.0 };
                Rgba([v, v, v, 1.0])
            })
        };
        let previous = column(4);
        let current = column(8);
        let flow = solid(2, 1, [4.0, 0.0, 0.0, 0.0]);
        let mut out = solid(16, 4, [0.0; 4]);
        shade_interpolated(
            &InterpolationInputs {
                previous: &previous,
                current: &current,
                flow: &flow,
                overlay: None,
                blend_factor: 0.5,
                global_motion: (0.0, 0.0),
            },
            &mut out,
        );

        assert!((out.get_pixel(6, 1).0[0] - 1.0).abs() < 1e-4);
        assert!(out.get_pixel(4, 1).0[0] < 0.5);
        assert!(out.get_pixel(8, 1).0[0] < 0.5);
    }

    #[test]
    fn overlay_is_composited_unwarped() {
        let frame = solid(4, 4, [0.5, 0.5, 0.5, 1.0]);
        let flow = solid(1, 1, [0.0; 4]);
        let overlay: Texels = ImageBuffer::from_fn(4, 4, |x, y| {
            if (x, y) == (1, 1) {
                Rgba([1.0, 0.0, 0.0, 1.0])
            } else {
                Rgba([0.0; 4])
            }
        });
        let mut out = solid(4, 4, [0.0; 4]);
        shade_interpolated(
            &InterpolationInputs {
                previous: &frame,
                current: &frame,
                flow: &flow,
                overlay: Some(&overlay),
                blend_factor: 0.5,
                global_motion: (0.0, 0.0),
            },
            &mut out,
        );
        assert_eq!(out.get_pixel(1, 1).0, [1.0, 0.0, 0.0, 1.0]);
        assert!((out.get_pixel(2, 2).0[0] - 0.5).abs() < 1e-6);
    }
}
