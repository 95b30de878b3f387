//! Screen-space ambient obscurance and its depth-aware blur.
//!
//! Spiral-tap scalable ambient obscurance over the canonical scene depth
//! (McGuire & Mara lineage). The CPU side prepares the hemisphere sample
//! set, the spiral turn count, and the Gaussian blur kernel; the GPU side
//! reconstructs view positions and normals from depth and accumulates the
//! obscurance estimator. Large sampling radii step down the depth pyramid to
//! keep the access footprint bounded.

use rand::Rng;

use crate::gpu::pipeline_helpers::{
    create_screen_space_pipeline, nearest_sampler, non_filtering_sampler,
    texture_2d, uniform_buffer, ScreenSpacePipelineDef,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::render_target::RenderTarget;
use crate::gpu::shader_composer::{Shader, ShaderComposer, ShaderError};
use crate::options::OcclusionOptions;
use crate::view::EyeView;

/// Spiral turn counts per sample count; primes keep taps from lining up.
/// Indexed by `n_samples - 1`; sample counts beyond the table clamp to its
/// last entry.
const ROTATIONS: [u32; 98] = [
    1, 1, 2, 3, 2, 5, 2, 3, 2, 3, 3, 5, 5, 3, 4, 7, 5, 5, 7, 9, 8, 5, 5, 7,
    7, 7, 8, 5, 8, 11, 12, 7, 10, 13, 8, 11, 8, 7, 14, 11, 11, 13, 12, 13,
    19, 17, 13, 11, 18, 19, 11, 11, 14, 17, 21, 15, 16, 17, 18, 13, 17, 11,
    17, 19, 18, 25, 18, 19, 19, 29, 21, 19, 27, 31, 29, 21, 18, 17, 29, 31,
    31, 23, 18, 25, 26, 25, 23, 19, 34, 19, 27, 21, 25, 39, 29, 17, 21, 27,
];

/// Spiral turn count for `n_samples` taps.
pub(crate) fn spiral_turns(n_samples: u32) -> u32 {
    let index = (n_samples.max(1) as usize - 1).min(ROTATIONS.len() - 1);
    ROTATIONS[index]
}

/// Scale the raw hemisphere vectors for `n_samples` taps: later samples
/// reach further out, earlier ones cluster near the shading point.
pub(crate) fn scaled_samples(
    raw: &[[f32; 3]],
    n_samples: usize,
) -> Vec<[f32; 4]> {
    (0..n_samples)
        .map(|i| {
            let t = ((i * i + 2 * i + 1) as f32) / ((n_samples * n_samples) as f32);
            let scale = 0.1 + t * 0.9;
            let v = raw[i];
            [v[0] * scale, v[1] * scale, v[2] * scale, 0.0]
        })
        .collect()
}

/// Gaussian half-kernel for a full size of `kernel_size` taps (odd):
/// `floor((size + 1) / 2)` weights with `sigma = size / 3`.
pub(crate) fn blur_kernel(kernel_size: u32) -> Vec<f32> {
    let sigma = kernel_size as f32 / 3.0;
    let half = (kernel_size + 1) / 2;
    (0..half)
        .map(|x| {
            let x = x as f32;
            (1.0 / ((2.0 * std::f32::consts::PI).sqrt() * sigma))
                * (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect()
}

/// Obscurance contribution of one sample, mirrored from the shader for the
/// behavioral tests: zero outside the radius sphere or behind the tangent
/// plane bias.
pub(crate) fn obscurance_term(
    v: [f32; 3],
    normal: [f32; 3],
    radius: f32,
    bias: f32,
) -> f32 {
    let vv = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
    let vn = v[0] * normal[0] + v[1] * normal[1] + v[2] * normal[2];
    4.0 * (1.0 - vv / (radius * radius)).max(0.0) * (vn - bias).max(0.0)
}

const MAX_SAMPLES: usize = 256;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SsaoParams {
    inv_projection: [[f32; 4]; 4],
    viewport: [f32; 4],
    is_ortho: f32,
    radius: f32,
    intensity: f32,
    projection_scale: f32,
    bias: f32,
    n_samples: u32,
    spiral_turns: f32,
    max_mip_level: i32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurParams {
    viewport: [f32; 4],
    kernel: [[f32; 4]; 4],
    direction: [f32; 2],
    radius: i32,
    is_ortho: f32,
    near: f32,
    far: f32,
    max_view_z_diff: f32,
    _pad: f32,
}

/// The occlusion pass pair: estimator plus separable blur. The output packs
/// occlusion into RG and depth into BA of one RGBA8 target, so the blur can
/// stay depth-aware without a second texture fetch.
pub struct SsaoPass {
    output: RenderTarget,
    blur_proxy: RenderTarget,

    ssao_pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,

    ssao_layout: wgpu::BindGroupLayout,
    blur_layout: wgpu::BindGroupLayout,

    sampler: wgpu::Sampler,
    params: wgpu::Buffer,
    samples: wgpu::Buffer,
    blur_h_params: wgpu::Buffer,
    blur_v_params: wgpu::Buffer,

    ssao_bind_group: wgpu::BindGroup,
    blur_h_bind_group: wgpu::BindGroup,
    blur_v_bind_group: wgpu::BindGroup,

    hemisphere: Vec<[f32; 3]>,
    uploaded_samples: u32,
}

impl SsaoPass {
    /// Build the estimator and blur pipelines against the canonical depth.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError`] if an occlusion shader fails to compose.
    pub fn new(
        context: &RenderContext,
        composer: &mut ShaderComposer,
        scene_depth: &wgpu::TextureView,
        width: u32,
        height: u32,
    ) -> Result<Self, ShaderError> {
        let device = &context.device;

        let output = RenderTarget::new(
            device,
            "SSAO Output",
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        let blur_proxy = RenderTarget::new(
            device,
            "SSAO Blur Proxy",
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
        );

        let ssao_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("SSAO Layout"),
                entries: &[
                    texture_2d(0),
                    non_filtering_sampler(1),
                    uniform_buffer(2),
                    uniform_buffer(3),
                ],
            },
        );
        let blur_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("SSAO Blur Layout"),
                entries: &[
                    texture_2d(0),
                    non_filtering_sampler(1),
                    uniform_buffer(2),
                ],
            },
        );

        let ssao_shader = composer.compose(device, Shader::Ssao, &[])?;
        let blur_shader = composer.compose(device, Shader::SsaoBlur, &[])?;

        let ssao_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "SSAO",
                shader: &ssao_shader,
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                bind_group_layouts: &[&ssao_layout],
            },
        );
        let blur_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "SSAO Blur",
                shader: &blur_shader,
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                bind_group_layouts: &[&blur_layout],
            },
        );

        let sampler = nearest_sampler(device, "SSAO Sampler");
        let params = uniform(device, "SSAO Params", 112);
        let samples =
            uniform(device, "SSAO Samples", (MAX_SAMPLES * 16) as u64);
        let blur_h_params = uniform(device, "SSAO Blur H Params", 112);
        let blur_v_params = uniform(device, "SSAO Blur V Params", 112);

        let mut rng = rand::rng();
        let hemisphere: Vec<[f32; 3]> = (0..MAX_SAMPLES)
            .map(|_| {
                let v = [
                    rng.random::<f32>() * 2.0 - 1.0,
                    rng.random::<f32>() * 2.0 - 1.0,
                    rng.random::<f32>(),
                ];
                let len =
                    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt().max(1e-6);
                let r = rng.random::<f32>();
                [v[0] / len * r, v[1] / len * r, v[2] / len * r]
            })
            .collect();

        let (ssao_bind_group, blur_h_bind_group, blur_v_bind_group) =
            Self::make_bind_groups(
                device,
                &ssao_layout,
                &blur_layout,
                scene_depth,
                &output,
                &blur_proxy,
                &sampler,
                &params,
                &samples,
                &blur_h_params,
                &blur_v_params,
            );

        Ok(Self {
            output,
            blur_proxy,
            ssao_pipeline,
            blur_pipeline,
            ssao_layout,
            blur_layout,
            sampler,
            params,
            samples,
            blur_h_params,
            blur_v_params,
            ssao_bind_group,
            blur_h_bind_group,
            blur_v_bind_group,
            hemisphere,
            uploaded_samples: 0,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn make_bind_groups(
        device: &wgpu::Device,
        ssao_layout: &wgpu::BindGroupLayout,
        blur_layout: &wgpu::BindGroupLayout,
        scene_depth: &wgpu::TextureView,
        output: &RenderTarget,
        blur_proxy: &RenderTarget,
        sampler: &wgpu::Sampler,
        params: &wgpu::Buffer,
        samples: &wgpu::Buffer,
        blur_h_params: &wgpu::Buffer,
        blur_v_params: &wgpu::Buffer,
    ) -> (wgpu::BindGroup, wgpu::BindGroup, wgpu::BindGroup) {
        let ssao = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSAO Bind Group"),
            layout: ssao_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(scene_depth),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: samples.as_entire_binding(),
                },
            ],
        });

        let blur = |label, input: &RenderTarget, p: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: blur_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(
                            &input.view,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: p.as_entire_binding(),
                    },
                ],
            })
        };

        let blur_h = blur("SSAO Blur H Bind Group", output, blur_h_params);
        let blur_v = blur("SSAO Blur V Bind Group", blur_proxy, blur_v_params);
        (ssao, blur_h, blur_v)
    }

    /// The blurred occlusion texture (occlusion in RG, depth in BA).
    pub fn occlusion_view(&self) -> &wgpu::TextureView {
        &self.output.view
    }

    /// Run the estimator and both blur directions for one eye.
    pub fn render_eye(
        &mut self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        eye: &EyeView,
        options: &OcclusionOptions,
        max_mip_level: u32,
    ) {
        let viewport = eye.viewport;
        let target_w = self.output.width();
        let target_h = self.output.height();
        let radius = options.radius();
        let n_samples =
            (options.samples.max(1) as usize).min(MAX_SAMPLES) as u32;

        if self.uploaded_samples != n_samples {
            let scaled =
                scaled_samples(&self.hemisphere, n_samples as usize);
            context.queue.write_buffer(
                &self.samples,
                0,
                bytemuck::cast_slice(&scaled),
            );
            self.uploaded_samples = n_samples;
        }

        context.queue.write_buffer(
            &self.params,
            0,
            bytemuck::bytes_of(&SsaoParams {
                inv_projection: eye.inv_projection().to_cols_array_2d(),
                viewport: viewport.normalized(target_w, target_h),
                is_ortho: eye.is_ortho_uniform(),
                radius,
                intensity: options.intensity,
                projection_scale: eye.projection_scale(),
                bias: options.bias,
                n_samples,
                spiral_turns: spiral_turns(n_samples) as f32,
                max_mip_level: max_mip_level as i32,
            }),
        );

        // Tap skipping starts beyond the immediate neighbors; the tolerance
        // scales with the sampling radius.
        let max_view_z_diff = radius / 16.0;
        let kernel = blur_kernel(options.blur_kernel_size);
        let mut kernel_padded = [[0.0f32; 4]; 4];
        for (i, w) in kernel.iter().enumerate() {
            kernel_padded[i / 4][i % 4] = *w;
        }
        let blur_radius = (options.blur_kernel_size / 2) as i32;
        for (buffer, direction) in [
            (&self.blur_h_params, [1.0, 0.0]),
            (&self.blur_v_params, [0.0, 1.0]),
        ] {
            context.queue.write_buffer(
                buffer,
                0,
                bytemuck::bytes_of(&BlurParams {
                    viewport: viewport.normalized(target_w, target_h),
                    kernel: kernel_padded,
                    direction,
                    radius: blur_radius,
                    is_ortho: eye.is_ortho_uniform(),
                    near: eye.near,
                    far: eye.far,
                    max_view_z_diff,
                    _pad: 0.0,
                }),
            );
        }

        screen_pass(
            encoder,
            "SSAO Pass",
            &self.output.view,
            viewport,
            &self.ssao_pipeline,
            &self.ssao_bind_group,
        );
        screen_pass(
            encoder,
            "SSAO Blur H Pass",
            &self.blur_proxy.view,
            viewport,
            &self.blur_pipeline,
            &self.blur_h_bind_group,
        );
        screen_pass(
            encoder,
            "SSAO Blur V Pass",
            &self.output.view,
            viewport,
            &self.blur_pipeline,
            &self.blur_v_bind_group,
        );
    }

    /// Reallocate for a new size; bind groups follow the new canonical depth
    /// view. No-op on equal dimensions and an unchanged depth view.
    pub fn resize(
        &mut self,
        context: &RenderContext,
        width: u32,
        height: u32,
        scene_depth: &wgpu::TextureView,
        depth_changed: bool,
    ) {
        let device = &context.device;
        let a = self.output.resize(device, width, height);
        let b = self.blur_proxy.resize(device, width, height);
        if a || b || depth_changed {
            let (ssao, blur_h, blur_v) = Self::make_bind_groups(
                device,
                &self.ssao_layout,
                &self.blur_layout,
                scene_depth,
                &self.output,
                &self.blur_proxy,
                &self.sampler,
                &self.params,
                &self.samples,
                &self.blur_h_params,
                &self.blur_v_params,
            );
            self.ssao_bind_group = ssao;
            self.blur_h_bind_group = blur_h;
            self.blur_v_bind_group = blur_v;
        }
    }
}

fn screen_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    view: &wgpu::TextureView,
    viewport: crate::view::Viewport,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        ..Default::default()
    });
    pass.set_scissor_rect(
        viewport.x,
        viewport.y,
        viewport.width,
        viewport.height,
    );
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.draw(0..3, 0..1);
}

fn uniform(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spiral_turns_are_taken_from_the_prime_table() {
        assert_eq!(spiral_turns(1), 1);
        assert_eq!(spiral_turns(64), 19);
        assert_eq!(spiral_turns(98), 27);
        // Beyond the table, clamp to the last entry.
        assert_eq!(spiral_turns(256), 27);
    }

    #[test]
    fn sample_scales_grow_monotonically() {
        let raw = vec![[1.0, 0.0, 0.0]; 64];
        let scaled = scaled_samples(&raw, 64);
        assert_eq!(scaled.len(), 64);
        for pair in scaled.windows(2) {
            assert!(pair[1][0] > pair[0][0]);
        }
        // First sample sits near the shading point, last reaches the radius.
        assert!(scaled[0][0] < 0.11);
        assert!(scaled[63][0] > 0.99 && scaled[63][0] <= 1.0);
    }

    #[test]
    fn blur_kernel_shape() {
        let kernel = blur_kernel(25);
        assert_eq!(kernel.len(), 13);
        for pair in kernel.windows(2) {
            assert!(pair[1] < pair[0], "kernel is not decreasing");
        }
        let kernel = blur_kernel(1);
        assert_eq!(kernel.len(), 1);
        assert!(kernel[0] > 0.0);
    }

    #[test]
    fn flat_isolated_plane_is_unoccluded() {
        // Samples on the tangent plane of a flat surface have vn == 0, so
        // the obscurance sum is zero and the factor stays 1.0.
        let normal = [0.0, 0.0, 1.0];
        for x in [-0.4f32, -0.1, 0.2, 0.5] {
            let term =
                obscurance_term([x, 0.3, 0.0], normal, 1.0, 0.01);
            assert_eq!(term, 0.0);
        }
    }

    #[test]
    fn approaching_occluder_darkens_monotonically() {
        // A second plane in front of the shading point, moved closer along
        // the normal: the term must strictly increase inside the radius.
        let normal = [0.0, 0.0, 1.0];
        let mut previous = 0.0;
        for h in [0.9f32, 0.7, 0.5, 0.3] {
            let term = obscurance_term([0.0, 0.0, h], normal, 1.0, 0.01);
            assert!(
                term > previous,
                "occluder at {h} did not darken further"
            );
            previous = term;
        }
    }

    #[test]
    fn occluder_outside_the_radius_contributes_nothing() {
        let normal = [0.0, 0.0, 1.0];
        assert_eq!(
            obscurance_term([0.0, 0.0, 1.5], normal, 1.0, 0.01),
            0.0
        );
    }
}
