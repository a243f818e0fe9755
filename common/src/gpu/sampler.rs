use super::texture::Texels;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Texture sampler with clamp-to-edge addressing on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler {
    pub filter: FilterMode,
}

impl Sampler {
    pub const NEAREST: Sampler = Sampler {
        filter: FilterMode::Nearest,
    };
    pub const LINEAR: Sampler = Sampler {
        filter: FilterMode::Linear,
    };

    /// Sample at normalized coordinates, texel centres at `(i + 0.5) / size`.
    pub fn sample(&self, texels: &Texels, u: f32, v: f32) -> [f32; 4] {
        let width = texels.width() as f32;
        let height = texels.height() as f32;
        match self.filter {
            FilterMode::Nearest => {
                let x = (u * width).floor() as i64;
                let y = (v * height).floor() as i64;
                load(texels, x, y)
            }
            FilterMode::Linear => {
                let tx = u * width - 0.5;
                let ty = v * height - 0.5;
                let x0 = tx.floor();
                let y0 = ty.floor();
                let fx = tx - x0;
                let fy = ty - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);

                let top = mix(load(texels, x0, y0), load(texels, x0 + 1, y0), fx);
                let bottom = mix(load(texels, x0, y0 + 1), load(texels, x0 + 1, y0 + 1), fx);
                mix(top, bottom, fy)
            }
        }
    }
}

/// Fetch a texel, clamping the coordinate to the texture edge.
pub fn load(texels: &Texels, x: i64, y: i64) -> [f32; 4] {
    let max_x = texels.width().saturating_sub(1) as i64;
    let max_y = texels.height().saturating_sub(1) as i64;
    let x = x.clamp(0, max_x) as u32;
    let y = y.clamp(0, max_y) as u32;
    texels.get_pixel(x, y).0
}

/// Rec. 709 luma.
pub fn luminance(color: [f32; 4]) -> f32 {
    color[0] * 0.2126 + color[1] * 0.7152 + color[2] * 0.0722
}

pub fn mix(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

/// Clamp into `[0, 1]`; NaN maps to 0.
pub fn saturate(x: f32) -> f32 {
    if x.is_nan() {
        return 0.0;
    }
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn ramp() -> Texels {
        ImageBuffer::from_fn(4, 1, |x, _| Rgba([x as f32, 0.0, 0.0, 1.0]))
    }

    #[test]
    fn saturate_clamps_and_maps_nan_to_zero() {
        assert_eq!(saturate(-0.5), 0.0);
        assert_eq!(saturate(0.25), 0.25);
        assert_eq!(saturate(7.0), 1.0);
        assert_eq!(saturate(f32::INFINITY), 1.0);
        assert_eq!(saturate(f32::NAN), 0.0);
    }

    #[test]
    fn linear_at_texel_centre_returns_texel() {
        let texels = ramp();
        let value = Sampler::LINEAR.sample(&texels, 2.5 / 4.0, 0.5);
        assert!((value[0] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn linear_between_centres_interpolates() {
        let texels = ramp();
        let value = Sampler::LINEAR.sample(&texels, 2.0 / 4.0, 0.5);
        assert!((value[0] - 1.5).abs() < 1e-5);
    }

    #[test]
    fn sampling_clamps_to_edge() {
        let texels = ramp();
        assert_eq!(Sampler::NEAREST.sample(&texels, -1.0, 0.5)[0], 0.0);
        assert_eq!(Sampler::NEAREST.sample(&texels, 2.0, 0.5)[0], 3.0);
        assert_eq!(Sampler::LINEAR.sample(&texels, 1.0, 0.5)[0], 3.0);
    }
}
