//! Outline generation, static- and dynamic-width variants.
//!
//! Both variants start from the same depth-discontinuity detection over the
//! canonical scene depth. The static variant expands the detected edges with
//! a fixed-pixel-radius disk kernel; the dynamic variant seeds the jump-flood
//! engine and propagates a view-space-constant radius, so outlines keep their
//! on-screen meaning under perspective. The variant is selected per frame
//! from the options — a strategy choice, not a type hierarchy.

use crate::gpu::capabilities::Capabilities;
use crate::gpu::pipeline_helpers::{
    create_screen_space_pipeline, nearest_sampler, non_filtering_sampler,
    texture_2d, texture_2d_unfilterable, uniform_buffer,
    uniform_buffer_dynamic, ScreenSpacePipelineDef,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::render_target::RenderTarget;
use crate::gpu::shader_composer::{Shader, ShaderComposer, ShaderError};
use crate::options::OutlineOptions;
use crate::renderer::jump_flood::{decay_schedule, JumpFlood, Slot, MAX_STEPS};
use crate::scene::SceneInfo;
use crate::view::EyeView;

/// Pixel radius of the static disk kernel for a configured width. Width 1 is
/// a single-pixel edge (radius 0).
pub(crate) fn static_kernel_radius(width: f32) -> i32 {
    (width - 1.0).ceil().max(0.0) as i32
}

/// First decay step of the dynamic variant: enough texels to cover the view
/// radius at the worst on-screen pixel size.
pub(crate) fn dynamic_start_step(
    view_radius: f32,
    max_pixel_view_radius: f32,
) -> u32 {
    (view_radius / max_pixel_view_radius).ceil() as u32 + 1
}

/// Which texture holds the outline result this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineOutput {
    /// Packed outline depth in the static expand target.
    Static,
    /// Jump-flood payload in the given slot.
    Dynamic(Slot),
}

impl OutlineOutput {
    /// Index into per-source bind group arrays (static, slot A, slot B).
    pub fn source_index(self) -> usize {
        match self {
            Self::Static => 0,
            Self::Dynamic(Slot::A) => 1,
            Self::Dynamic(Slot::B) => 2,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct OutlineParams {
    inv_projection: [[f32; 4]; 4],
    is_ortho: f32,
    near: f32,
    far: f32,
    max_view_z_diff: f32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct StaticParams {
    is_ortho: f32,
    near: f32,
    far: f32,
    max_view_z_diff: f32,
    width: i32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct JfaParams {
    viewport: [f32; 4],
    view_radius: f32,
    _pad: [f32; 3],
}

/// Outline generation over the canonical scene depth.
pub struct OutlinePass {
    seed_target: RenderTarget,
    expand_target: RenderTarget,
    jfa: JumpFlood,
    dynamic_supported: bool,

    seed_static_pipeline: wgpu::RenderPipeline,
    seed_dynamic_pipeline: wgpu::RenderPipeline,
    expand_pipeline: wgpu::RenderPipeline,
    jfa_pipeline: wgpu::RenderPipeline,

    seed_layout: wgpu::BindGroupLayout,
    expand_layout: wgpu::BindGroupLayout,
    jfa_layout: wgpu::BindGroupLayout,

    sampler: wgpu::Sampler,
    outline_params: wgpu::Buffer,
    static_params: wgpu::Buffer,
    jfa_params: wgpu::Buffer,

    seed_bind_group: wgpu::BindGroup,
    expand_bind_group: wgpu::BindGroup,
    jfa_bind_groups: [wgpu::BindGroup; 2],
}

impl OutlinePass {
    /// Build both strategies. Dynamic-width outlines silently fall back to
    /// static when float render targets are unsupported.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError`] if an outline shader fails to compose.
    pub fn new(
        context: &RenderContext,
        caps: &Capabilities,
        composer: &mut ShaderComposer,
        scene_depth: &wgpu::TextureView,
        width: u32,
        height: u32,
    ) -> Result<Self, ShaderError> {
        let device = &context.device;
        let dynamic_supported = caps.float_targets;
        if !dynamic_supported {
            log::debug!(
                "float render targets unsupported, dynamic-width outlines \
                 degrade to static"
            );
        }

        let seed_target = RenderTarget::new(
            device,
            "Outline Seeds",
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        let expand_target = RenderTarget::new(
            device,
            "Outline Expanded",
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        let jfa = JumpFlood::new(
            device,
            ["Outline JFA A", "Outline JFA B"],
            width,
            height,
        );

        let seed_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Outline Seed Layout"),
                entries: &[
                    texture_2d(0),
                    non_filtering_sampler(1),
                    uniform_buffer(2),
                ],
            },
        );
        let expand_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Outline Expand Layout"),
                entries: &[
                    texture_2d(0),
                    texture_2d(1),
                    non_filtering_sampler(2),
                    uniform_buffer(3),
                ],
            },
        );
        let jfa_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Outline JFA Layout"),
                entries: &[
                    texture_2d_unfilterable(0),
                    non_filtering_sampler(1),
                    uniform_buffer(2),
                    uniform_buffer_dynamic(3),
                ],
            },
        );

        let seed_static_shader =
            composer.compose(device, Shader::OutlineInit, &[])?;
        let seed_dynamic_shader = composer.compose(
            device,
            Shader::OutlineInit,
            &["DYNAMIC_WIDTH"],
        )?;
        let expand_shader =
            composer.compose(device, Shader::OutlineStatic, &[])?;
        let jfa_shader = composer.compose(device, Shader::OutlineJfa, &[])?;

        let seed_static_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "Outline Seed Static",
                shader: &seed_static_shader,
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                bind_group_layouts: &[&seed_layout],
            },
        );
        let seed_dynamic_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "Outline Seed Dynamic",
                shader: &seed_dynamic_shader,
                format: wgpu::TextureFormat::Rgba32Float,
                blend: None,
                bind_group_layouts: &[&seed_layout],
            },
        );
        let expand_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "Outline Expand",
                shader: &expand_shader,
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                bind_group_layouts: &[&expand_layout],
            },
        );
        let jfa_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "Outline JFA",
                shader: &jfa_shader,
                format: wgpu::TextureFormat::Rgba32Float,
                blend: None,
                bind_group_layouts: &[&jfa_layout],
            },
        );

        let sampler = nearest_sampler(device, "Outline Sampler");
        let outline_params = uniform(device, "Outline Params", 80);
        let static_params = uniform(device, "Outline Static Params", 32);
        let jfa_params = uniform(device, "Outline JFA Params", 32);

        let (seed_bind_group, expand_bind_group, jfa_bind_groups) =
            Self::make_bind_groups(
                device,
                &seed_layout,
                &expand_layout,
                &jfa_layout,
                scene_depth,
                &seed_target,
                &jfa,
                &sampler,
                &outline_params,
                &static_params,
                &jfa_params,
            );

        Ok(Self {
            seed_target,
            expand_target,
            jfa,
            dynamic_supported,
            seed_static_pipeline,
            seed_dynamic_pipeline,
            expand_pipeline,
            jfa_pipeline,
            seed_layout,
            expand_layout,
            jfa_layout,
            sampler,
            outline_params,
            static_params,
            jfa_params,
            seed_bind_group,
            expand_bind_group,
            jfa_bind_groups,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn make_bind_groups(
        device: &wgpu::Device,
        seed_layout: &wgpu::BindGroupLayout,
        expand_layout: &wgpu::BindGroupLayout,
        jfa_layout: &wgpu::BindGroupLayout,
        scene_depth: &wgpu::TextureView,
        seed_target: &RenderTarget,
        jfa: &JumpFlood,
        sampler: &wgpu::Sampler,
        outline_params: &wgpu::Buffer,
        static_params: &wgpu::Buffer,
        jfa_params: &wgpu::Buffer,
    ) -> (wgpu::BindGroup, wgpu::BindGroup, [wgpu::BindGroup; 2]) {
        let seed = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Outline Seed Bind Group"),
            layout: seed_layout,
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
                    resource: outline_params.as_entire_binding(),
                },
            ],
        });

        let expand = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Outline Expand Bind Group"),
            layout: expand_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(
                        &seed_target.view,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(scene_depth),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: static_params.as_entire_binding(),
                },
            ],
        });

        let jfa_groups = [Slot::A, Slot::B].map(|slot| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Outline JFA Bind Group"),
                layout: jfa_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(
                            &jfa.target(slot).view,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: jfa_params.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Buffer(
                            wgpu::BufferBinding {
                                buffer: jfa.step_buffer(),
                                offset: 0,
                                size: wgpu::BufferSize::new(16),
                            },
                        ),
                    },
                ],
            })
        });

        (seed, expand, jfa_groups)
    }

    /// The texture carrying this frame's outline result.
    pub fn output_view(&self, output: OutlineOutput) -> &wgpu::TextureView {
        match output {
            OutlineOutput::Static => &self.expand_target.view,
            OutlineOutput::Dynamic(slot) => &self.jfa.target(slot).view,
        }
    }

    /// The three possible output textures, indexed by
    /// [`OutlineOutput::source_index`]. Consumers precreate one bind group
    /// per source instead of rebuilding when the final jump-flood parity
    /// changes.
    pub fn source_views(&self) -> [&wgpu::TextureView; 3] {
        [
            &self.expand_target.view,
            &self.jfa.target(Slot::A).view,
            &self.jfa.target(Slot::B).view,
        ]
    }

    /// Generate outlines for one eye. `dynamic` requests the jump-flood
    /// variant, which silently degrades to static without float-target
    /// support.
    pub fn render_eye(
        &self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        scene: &SceneInfo,
        eye: &EyeView,
        options: &OutlineOptions,
        dynamic: bool,
    ) -> OutlineOutput {
        let max_view_z_diff = options.max_view_z_diff(eye.near, eye.far);

        context.queue.write_buffer(
            &self.outline_params,
            0,
            bytemuck::bytes_of(&OutlineParams {
                inv_projection: eye.inv_projection().to_cols_array_2d(),
                is_ortho: eye.is_ortho_uniform(),
                near: eye.near,
                far: eye.far,
                max_view_z_diff,
            }),
        );

        if dynamic && self.dynamic_supported {
            self.render_dynamic(context, encoder, scene, eye, options)
        } else {
            self.render_static(context, encoder, eye, options, max_view_z_diff)
        }
    }

    fn render_static(
        &self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        eye: &EyeView,
        options: &OutlineOptions,
        max_view_z_diff: f32,
    ) -> OutlineOutput {
        context.queue.write_buffer(
            &self.static_params,
            0,
            bytemuck::bytes_of(&StaticParams {
                is_ortho: eye.is_ortho_uniform(),
                near: eye.near,
                far: eye.far,
                max_view_z_diff,
                width: static_kernel_radius(options.width),
                _pad: [0.0; 3],
            }),
        );

        screen_pass(
            encoder,
            "Outline Seed Pass",
            &self.seed_target.view,
            eye.viewport,
            &self.seed_static_pipeline,
            &self.seed_bind_group,
        );
        screen_pass(
            encoder,
            "Outline Expand Pass",
            &self.expand_target.view,
            eye.viewport,
            &self.expand_pipeline,
            &self.expand_bind_group,
        );
        OutlineOutput::Static
    }

    fn render_dynamic(
        &self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        scene: &SceneInfo,
        eye: &EyeView,
        options: &OutlineOptions,
    ) -> OutlineOutput {
        let viewport = eye.viewport;
        let target_w = self.seed_target.width();
        let target_h = self.seed_target.height();
        let view_radius = options.dynamic_width * scene.bounding_radius;

        context.queue.write_buffer(
            &self.jfa_params,
            0,
            bytemuck::bytes_of(&JfaParams {
                viewport: viewport.normalized(target_w, target_h),
                view_radius,
                _pad: [0.0; 3],
            }),
        );

        // One unit step before and after the geometric decay smooths the
        // octagonal artifacts jump flooding produces along diagonals.
        let start =
            dynamic_start_step(view_radius, eye.max_pixel_view_radius());
        let unit = [1.0 / target_w as f32, 1.0 / target_h as f32];
        let mut steps: Vec<[f32; 2]> = Vec::new();
        steps.push(unit);
        for s in decay_schedule(start) {
            steps.push([
                s as f32 / target_w as f32,
                s as f32 / target_h as f32,
            ]);
            if steps.len() == MAX_STEPS - 1 {
                break;
            }
        }
        steps.push(unit);
        self.jfa.write_steps(&context.queue, &steps);

        screen_pass(
            encoder,
            "Outline Dynamic Seed Pass",
            &self.jfa.target(Slot::A).view,
            viewport,
            &self.seed_dynamic_pipeline,
            &self.seed_bind_group,
        );

        let final_slot = self.jfa.run(
            encoder,
            &self.jfa_pipeline,
            &self.jfa_bind_groups,
            viewport,
            steps.len(),
        );
        OutlineOutput::Dynamic(final_slot)
    }

    /// Reallocate targets for a new size; bind groups are recreated against
    /// the (possibly new) canonical depth view. No-op on equal dimensions
    /// and an unchanged depth view.
    pub fn resize(
        &mut self,
        context: &RenderContext,
        width: u32,
        height: u32,
        scene_depth: &wgpu::TextureView,
        depth_changed: bool,
    ) {
        let device = &context.device;
        let a = self.seed_target.resize(device, width, height);
        let b = self.expand_target.resize(device, width, height);
        let c = self.jfa.resize(device, width, height);
        if a || b || c || depth_changed {
            let (seed, expand, jfa_groups) = Self::make_bind_groups(
                device,
                &self.seed_layout,
                &self.expand_layout,
                &self.jfa_layout,
                scene_depth,
                &self.seed_target,
                &self.jfa,
                &self.sampler,
                &self.outline_params,
                &self.static_params,
                &self.jfa_params,
            );
            self.seed_bind_group = seed;
            self.expand_bind_group = expand;
            self.jfa_bind_groups = jfa_groups;
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
    fn kernel_radius_maps_width_one_to_a_bare_edge() {
        assert_eq!(static_kernel_radius(1.0), 0);
        assert_eq!(static_kernel_radius(2.0), 1);
        assert_eq!(static_kernel_radius(5.0), 4);
        assert_eq!(static_kernel_radius(0.5), 0);
    }

    #[test]
    fn dynamic_start_covers_the_view_radius() {
        assert_eq!(dynamic_start_step(0.1, 0.01), 11);
        assert_eq!(dynamic_start_step(0.005, 0.01), 2);
    }

    // CPU model of the seed + expand shaders on a synthetic scene of two
    // depth planes, orthographic with near=0, far=1 so view z equals depth.

    const W: usize = 24;
    const H: usize = 8;
    const NEAR_PLANE: f32 = 0.3;
    const FAR_PLANE: f32 = 0.6;
    const MAX_DIFF: f32 = 0.1;

    fn depth_at(x: i32, _y: i32) -> f32 {
        if x < (W / 2) as i32 {
            NEAR_PLANE
        } else {
            FAR_PLANE
        }
    }

    /// Mirror of the seed shader: (outline flag, best discontinuity depth).
    fn seed(x: i32, y: i32) -> (bool, f32) {
        let self_depth = depth_at(x, y);
        let mut outline = false;
        let mut best_depth = 1.0f32;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let sample_depth = depth_at(x + dx, y + dy);
                if (self_depth - sample_depth).abs() > MAX_DIFF
                    && self_depth > sample_depth
                    && sample_depth <= best_depth
                {
                    outline = true;
                    best_depth = sample_depth;
                }
            }
        }
        (outline, best_depth)
    }

    /// Mirror of the expand shader for pixel (x, y) at kernel radius `s`.
    fn expand(x: i32, y: i32, s: i32) -> f32 {
        let self_view_z = depth_at(x, y);
        let mut outline_depth = 1.0f32;
        for dy in (-s / 2 - 1)..=(s / 2) {
            for dx in (-s / 2 - 1)..=(s / 2) {
                if dx * dx + dy * dy > s * s {
                    continue;
                }
                let (sample_outline, sample_depth) = seed(x + dx, y + dy);
                if sample_outline
                    && sample_depth < outline_depth
                    && (self_view_z - sample_depth).abs() > MAX_DIFF
                {
                    outline_depth = sample_depth;
                }
            }
        }
        outline_depth
    }

    #[test]
    fn seeds_form_on_the_far_side_of_the_discontinuity() {
        for y in 1..(H as i32 - 1) {
            for x in 0..W as i32 {
                let (outline, best) = seed(x, y);
                if x == (W / 2) as i32 {
                    assert!(outline, "no seed at the discontinuity, x={x}");
                    assert_eq!(best, NEAR_PLANE);
                } else {
                    assert!(!outline, "stray seed at x={x}");
                }
            }
        }
    }

    #[test]
    fn static_ring_thickness_tracks_the_configured_width() {
        for width in 1..=5i32 {
            let s = static_kernel_radius(width as f32);
            let y = (H / 2) as i32;
            let thickness = (0..W as i32)
                .filter(|&x| expand(x, y, s) < 1.0)
                .count() as i32;
            assert!(
                (thickness - width).abs() <= 1,
                "width {width}: ring is {thickness} pixels"
            );
        }
    }

    #[test]
    fn outline_carries_the_near_side_depth_for_fog() {
        let s = static_kernel_radius(3.0);
        let y = (H / 2) as i32;
        for x in 0..W as i32 {
            let d = expand(x, y, s);
            if d < 1.0 {
                assert_eq!(d, NEAR_PLANE);
            }
        }
    }
}
