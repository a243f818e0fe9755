use retimer_common::gpu::{
    dispatch_pixels, mix, saturate, CommandBuffer, GpuError, RenderDevice, RenderPipeline, Sampler,
    Texels, Texture,
};

/// Drawable colour when there is nothing to present.
pub const IDLE_CLEAR_COLOR: [f32; 4] = [0.06, 0.07, 0.08, 1.0];

const SHARPNESS_EPSILON: f32 = 0.001;
const SHARPEN_GAIN: f32 = 1.35;

#[derive(Debug, Clone, Copy)]
pub struct PresentParams {
    /// Weight of the secondary texture, 0 shows only the primary.
    pub blend_factor: f32,
    pub sharpness: f32,
    pub sampler: Sampler,
}

impl PresentParams {
    pub fn direct(sampler: Sampler, sharpness: f32) -> Self {
        Self {
            blend_factor: 0.0,
            sharpness,
            sampler,
        }
    }
}

/// Full-screen present/resample pass.
#[derive(Debug)]
pub struct Compositor {
    pipeline: RenderPipeline,
}

impl Compositor {
    pub fn new(device: &RenderDevice) -> Result<Self, GpuError> {
        Ok(Self {
            pipeline: device.make_render_pipeline("present")?,
        })
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    /// Aspect-fill `primary` (blended towards `secondary`) onto `target`,
    /// cropping the longer axis, with an optional unsharp mask.
    pub fn present(
        &self,
        cmd: &mut CommandBuffer,
        primary: &Texture,
        secondary: &Texture,
        target: &Texture,
        params: PresentParams,
    ) {
        let content_scale = presentation_scale(primary.size(), target.size());
        encode_present(cmd, primary, secondary, target, content_scale, params);
    }

    /// Stretch `source` over all of `target` with no crop, blend or sharpen.
    pub fn resample(
        &self,
        cmd: &mut CommandBuffer,
        source: &Texture,
        target: &Texture,
        sampler: Sampler,
    ) {
        encode_present(
            cmd,
            source,
            source,
            target,
            (1.0, 1.0),
            PresentParams::direct(sampler, 0.0),
        );
    }

    pub fn clear(&self, cmd: &mut CommandBuffer, target: &Texture) {
        cmd.clear_texture(target, IDLE_CLEAR_COLOR);
    }
}

/// Content scale that fills the drawable: the axis where the source is
/// relatively longer is scaled past the edge and cropped.
pub fn presentation_scale(source: (u32, u32), drawable: (u32, u32)) -> (f32, f32) {
    let source_aspect = source.0 as f32 / source.1.max(1) as f32;
    let drawable_aspect = drawable.0 as f32 / drawable.1.max(1) as f32;
    if source_aspect <= 0.0 || drawable_aspect <= 0.0 {
        return (1.0, 1.0);
    }

    if source_aspect > drawable_aspect {
        (source_aspect / drawable_aspect, 1.0)
    } else {
        (1.0, drawable_aspect / source_aspect)
    }
}

fn encode_present(
    cmd: &mut CommandBuffer,
    primary: &Texture,
    secondary: &Texture,
    target: &Texture,
    content_scale: (f32, f32),
    params: PresentParams,
) {
    let primary = primary.clone();
    let secondary = secondary.clone();
    let target = target.clone();

    cmd.encode_pass("present", move || {
        let a = primary.read();
        let b_guard = (!secondary.ptr_eq(&primary)).then(|| secondary.read());
        let b: &Texels = b_guard.as_deref().unwrap_or(&*a);
        let mut out = target.write();
        shade_present(&a, b, &mut out, content_scale, params);
    });
}

fn shade_present(
    a: &Texels,
    b: &Texels,
    out: &mut Texels,
    content_scale: (f32, f32),
    params: PresentParams,
) {
    let width = out.width().max(1) as f32;
    let height = out.height().max(1) as f32;
    let texel = (1.0 / a.width().max(1) as f32, 1.0 / a.height().max(1) as f32);
    let blend = saturate(params.blend_factor);
    let sharpness = saturate(params.sharpness);
    let sampler = params.sampler;

    let fetch = |u: f32, v: f32| {
        let (u, v) = (saturate(u), saturate(v));
        mix(sampler.sample(a, u, v), sampler.sample(b, u, v), blend)
    };

    dispatch_pixels(out, |x, y| {
        let ndc_x = (x as f32 + 0.5) / width * 2.0 - 1.0;
        let ndc_y = (y as f32 + 0.5) / height * 2.0 - 1.0;
        let u = 0.5 + ndc_x / content_scale.0 * 0.5;
        let v = 0.5 + ndc_y / content_scale.1 * 0.5;

        let center = fetch(u, v);
        if sharpness <= SHARPNESS_EPSILON {
            return [center[0], center[1], center[2], 1.0];
        }

        let north = fetch(u, v - texel.1);
        let south = fetch(u, v + texel.1);
        let east = fetch(u + texel.0, v);
        let west = fetch(u - texel.0, v);
        let amount = sharpness * SHARPEN_GAIN;

        let mut color = [0.0, 0.0, 0.0, 1.0];
        for c in 0..3 {
            let neighbors = (north[c] + south[c] + east[c] + west[c]) * 0.25;
            color[c] = saturate(center[c] + (center[c] - neighbors) * amount);
        }
        color
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{assert_texel_near, solid_texture, test_device, texture_from_fn};
    use retimer_common::gpu::{PixelFormat, TextureDescriptor};

    fn drawable(device: &RenderDevice, width: u32, height: u32) -> Texture {
        device
            .create_texture(TextureDescriptor::new(width, height, PixelFormat::Bgra8Unorm))
            .unwrap()
    }

    #[test]
    fn fill_scale_crops_longer_axis() {
        assert_eq!(presentation_scale((100, 100), (200, 200)), (1.0, 1.0));
        let (sx, sy) = presentation_scale((1920, 1080), (1000, 1000));
        assert!((sx - 1920.0 / 1080.0).abs() < 1e-5);
        assert_eq!(sy, 1.0);
        let (sx, sy) = presentation_scale((1000, 1000), (1920, 1080));
        assert_eq!(sx, 1.0);
        assert!((sy - 1920.0 / 1080.0).abs() < 1e-5);
    }

    #[test]
    fn blend_of_two_frames_is_their_mean() {
        let device = test_device();
        let compositor = Compositor::new(&device).unwrap();
        let a = solid_texture(&device, 8, 8, 0.2);
        let b = solid_texture(&device, 8, 8, 0.6);
        let out = drawable(&device, 8, 8);

        let mut cmd = device.command_buffer("test");
        compositor.present(
            &mut cmd,
            &a,
            &b,
            &out,
            PresentParams {
                blend_factor: 0.5,
                sharpness: 0.0,
                sampler: Sampler::LINEAR,
            },
        );
        cmd.commit();

        for (x, y) in [(0, 0), (4, 3), (7, 7)] {
            assert_texel_near(out.texel(x, y), [0.4, 0.4, 0.4, 1.0], 1e-5);
        }
    }

    #[test]
    fn wide_source_is_center_cropped() {
        let device = test_device();
        let compositor = Compositor::new(&device).unwrap();
        let source = texture_from_fn(&device, 4, 2, |x, _| {
            let v = x as f32 / 3.0;
            [v, v, v, 1.0]
        });
        let out = drawable(&device, 2, 2);

        let mut cmd = device.command_buffer("test");
        compositor.present(
            &mut cmd,
            &source,
            &source,
            &out,
            PresentParams::direct(Sampler::NEAREST, 0.0),
        );
        cmd.commit();

        // Only the two middle columns survive the crop.
        assert_texel_near(out.texel(0, 0), [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0, 1.0], 1e-5);
        assert_texel_near(out.texel(1, 1), [2.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0, 1.0], 1e-5);
    }

    #[test]
    fn sharpen_leaves_flat_regions_and_clamps_edges() {
        let device = test_device();
        let compositor = Compositor::new(&device).unwrap();
        let flat = solid_texture(&device, 6, 6, 0.5);
        let edge = texture_from_fn(&device, 6, 6, |x, _| {
            let v = if x < 3 { 0.1 } else { 0.9 };
            [v, v, v, 1.0]
        });
        let flat_out = drawable(&device, 6, 6);
        let edge_out = drawable(&device, 6, 6);

        let params = PresentParams::direct(Sampler::NEAREST, 1.0);
        let mut cmd = device.command_buffer("test");
        compositor.present(&mut cmd, &flat, &flat, &flat_out, params);
        compositor.present(&mut cmd, &edge, &edge, &edge_out, params);
        cmd.commit();

        assert_texel_near(flat_out.texel(2, 2), [0.5, 0.5, 0.5, 1.0], 1e-5);
        // Dark side of the edge is pushed down, bright side up, both clamped.
        assert!(edge_out.texel(2, 2)[0] < 0.1);
        assert!(edge_out.texel(3, 2)[0] > 0.9);
        for x in 0..6 {
            let value = edge_out.texel(x, 2)[0];
            assert!((0.0..=1.0).contains(&value));
        }
        assert_texel_near(edge_out.texel(0, 2), [0.1, 0.1, 0.1, 1.0], 1e-5);
    }

    #[test]
    fn nan_sharpness_presents_unsharpened() {
        let device = test_device();
        let compositor = Compositor::new(&device).unwrap();
        let source = solid_texture(&device, 4, 4, 0.3);
        let out = drawable(&device, 4, 4);
        let mut cmd = device.command_buffer("test");
        compositor.present(
            &mut cmd,
            &source,
            &source,
            &out,
            PresentParams {
                blend_factor: f32::NAN,
                sharpness: f32::NAN,
                sampler: Sampler::LINEAR,
            },
        );
        cmd.commit();
        for (x, y) in [(0, 0), (2, 1), (3, 3)] {
            assert_texel_near(out.texel(x, y), [0.3, 0.3, 0.3, 1.0], 1e-5);
        }
    }

    #[test]
    fn nearest_resample_replicates_texels() {
        let device = test_device();
        let compositor = Compositor::new(&device).unwrap();
        let source = texture_from_fn(&device, 2, 1, |x, _| {
            let v = x as f32;
            [v, v, v, 1.0]
        });
        let out = drawable(&device, 4, 2);
        let mut cmd = device.command_buffer("test");
        compositor.resample(&mut cmd, &source, &out, Sampler::NEAREST);
        cmd.commit();
        assert_eq!(out.texel(0, 0)[0], 0.0);
        assert_eq!(out.texel(1, 1)[0], 0.0);
        assert_eq!(out.texel(2, 0)[0], 1.0);
        assert_eq!(out.texel(3, 1)[0], 1.0);
    }

    #[test]
    fn clear_writes_idle_color() {
        let device = test_device();
        let compositor = Compositor::new(&device).unwrap();
        let out = drawable(&device, 3, 3);
        let mut cmd = device.command_buffer("test");
        compositor.clear(&mut cmd, &out);
        cmd.commit();
        assert_eq!(out.texel(1, 1), IDLE_CLEAR_COLOR);
    }
}
