//! Adaptive cutaway pass.
//!
//! Carves a depth-dependent cone-shaped opening through opaque geometry
//! around the cutaway-eligible primitives (Burns & Finkelstein, "Adaptive
//! Cutaways for Comprehensible Rendering of Polygonal Scenes"). Renders the
//! eligible geometry's depth off-screen, seeds the jump-flood engine with
//! linearized depth, propagates with a cone-carving comparator, and resolves
//! to a packed boundary-depth texture that the shading stage samples to
//! discard fragments in front of the cut.
//!
//! Three states: *disabled* when the backend lacks float render targets
//! (construction yields an inert pass), *idle* when the scene has no
//! cutaway-flagged geometry (the boundary is cleared to background), and
//! *active*.

use crate::gpu::capabilities::Capabilities;
use crate::gpu::pipeline_helpers::{
    create_screen_space_pipeline, depth_texture_2d, nearest_sampler,
    non_filtering_sampler, texture_2d, texture_2d_unfilterable,
    uniform_buffer, uniform_buffer_dynamic, ScreenSpacePipelineDef,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::render_target::RenderTarget;
use crate::gpu::shader_composer::{Shader, ShaderComposer, ShaderError};
use crate::options::CutawayOptions;
use crate::renderer::jump_flood::{step_schedule, JumpFlood, Slot};
use crate::scene::{DrawIntent, GeometryGroup, GeometryRenderer, SceneInfo};
use crate::view::EyeView;

/// Carve slope at a seed: linear-depth units per unit of screen distance.
/// `pmsz` is 0 under orthographic projection and `(near+far)/(near-far)`
/// under perspective, which folds the projection's depth nonlinearity into
/// the cone so a fixed screen slope carves a fixed view-space cone.
pub(crate) fn carve_slope(tan_angle: f32, pmsz: f32, linear_z: f32) -> f32 {
    (pmsz + linear_z) / tan_angle
}

/// Boundary depth carved by a seed at screen distance `dist`.
pub(crate) fn carved_depth(
    seed_z: f32,
    dist: f32,
    slope: f32,
    slope_offset: f32,
) -> f32 {
    seed_z + slope_offset - dist * slope
}

/// Taper the half-angle smoothly to zero within `edge_region_size` of the
/// viewport edges so cutaways fade out instead of seaming.
pub(crate) fn angle_edge_compression(
    angle: f32,
    edge_region_size: f32,
    edge_distances: [f32; 2],
) -> f32 {
    if edge_region_size == 0.0 {
        return angle;
    }
    let tx = (edge_distances[0] / edge_region_size).clamp(0.0, 1.0);
    let ty = (edge_distances[1] / edge_region_size).clamp(0.0, 1.0);
    angle * tx * ty
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct InitParams {
    is_ortho: f32,
    near: f32,
    far: f32,
    _pad: f32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CarveParams {
    viewport: [f32; 4],
    aspect: [f32; 2],
    pmsz: f32,
    angle: f32,
    edge_region_size: f32,
    slope_offset: f32,
    _pad: [f32; 2],
}

/// How the eligible geometry's depth is captured, per the capability probe.
enum DepthCapture {
    /// Render into a depth texture and sample it directly.
    Native { target: RenderTarget },
    /// Extra packed-depth color draw; the scratch depth attachment only
    /// provides z-testing during the capture.
    Packed {
        packed: RenderTarget,
        scratch: RenderTarget,
    },
}

impl DepthCapture {
    fn new(device: &wgpu::Device, caps: &Capabilities, width: u32, height: u32) -> Self {
        if caps.native_depth {
            Self::Native {
                target: RenderTarget::new(
                    device,
                    "Cutaway Depth Capture",
                    width,
                    height,
                    wgpu::TextureFormat::Depth32Float,
                ),
            }
        } else {
            Self::Packed {
                packed: RenderTarget::new(
                    device,
                    "Cutaway Packed Depth",
                    width,
                    height,
                    wgpu::TextureFormat::Rgba8Unorm,
                ),
                scratch: RenderTarget::new(
                    device,
                    "Cutaway Capture Scratch Depth",
                    width,
                    height,
                    wgpu::TextureFormat::Depth32Float,
                ),
            }
        }
    }

    fn sampled_view(&self) -> &wgpu::TextureView {
        match self {
            Self::Native { target } => &target.view,
            Self::Packed { packed, .. } => &packed.view,
        }
    }

    fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> bool {
        match self {
            Self::Native { target } => target.resize(device, width, height),
            Self::Packed { packed, scratch } => {
                let a = packed.resize(device, width, height);
                let b = scratch.resize(device, width, height);
                a || b
            }
        }
    }
}

struct Inner {
    capture: DepthCapture,
    jfa: JumpFlood,
    target: RenderTarget,

    init_pipeline: wgpu::RenderPipeline,
    jfa_pipeline: wgpu::RenderPipeline,
    resolve_pipeline: wgpu::RenderPipeline,

    init_layout: wgpu::BindGroupLayout,
    jfa_layout: wgpu::BindGroupLayout,
    resolve_layout: wgpu::BindGroupLayout,

    sampler: wgpu::Sampler,
    init_params: wgpu::Buffer,
    carve_params: wgpu::Buffer,
    resolve_params: wgpu::Buffer,

    init_bind_group: wgpu::BindGroup,
    jfa_bind_groups: [wgpu::BindGroup; 2],
    resolve_bind_groups: [wgpu::BindGroup; 2],
}

/// The cutaway pass. Inert when the backend lacks float render targets.
pub struct CutawayPass {
    inner: Option<Inner>,
}

impl CutawayPass {
    /// Build the pass, or an inert one on missing capability.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError`] if a cutaway shader fails to compose.
    pub fn new(
        context: &RenderContext,
        caps: &Capabilities,
        composer: &mut ShaderComposer,
        width: u32,
        height: u32,
    ) -> Result<Self, ShaderError> {
        if !caps.float_targets {
            log::debug!(
                "float render targets unsupported, disabling the cutaway pass"
            );
            return Ok(Self { inner: None });
        }

        let device = &context.device;
        let capture = DepthCapture::new(device, caps, width, height);
        let jfa = JumpFlood::new(
            device,
            ["Cutaway JFA A", "Cutaway JFA B"],
            width,
            height,
        );
        let target = RenderTarget::new(
            device,
            "Cutaway Boundary",
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
        );

        let capture_entry = if caps.native_depth {
            depth_texture_2d(0)
        } else {
            texture_2d(0)
        };
        let init_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Cutaway Init Layout"),
                entries: &[
                    capture_entry,
                    non_filtering_sampler(1),
                    uniform_buffer(2),
                ],
            },
        );
        let jfa_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Cutaway JFA Layout"),
                entries: &[
                    texture_2d_unfilterable(0),
                    non_filtering_sampler(1),
                    uniform_buffer(2),
                    uniform_buffer_dynamic(3),
                ],
            },
        );
        let resolve_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Cutaway Resolve Layout"),
                entries: &[
                    texture_2d_unfilterable(0),
                    non_filtering_sampler(1),
                    uniform_buffer(2),
                ],
            },
        );

        let init_defs: &[&str] = if caps.native_depth {
            &[]
        } else {
            &["PACKED_DEPTH"]
        };
        let init_shader =
            composer.compose(device, Shader::CutawayInit, init_defs)?;
        let jfa_shader = composer.compose(device, Shader::CutawayJfa, &[])?;
        let resolve_shader =
            composer.compose(device, Shader::CutawayResolve, &[])?;

        let init_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "Cutaway Init",
                shader: &init_shader,
                format: wgpu::TextureFormat::Rgba32Float,
                blend: None,
                bind_group_layouts: &[&init_layout],
            },
        );
        let jfa_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "Cutaway JFA",
                shader: &jfa_shader,
                format: wgpu::TextureFormat::Rgba32Float,
                blend: None,
                bind_group_layouts: &[&jfa_layout],
            },
        );
        let resolve_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "Cutaway Resolve",
                shader: &resolve_shader,
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                bind_group_layouts: &[&resolve_layout],
            },
        );

        let sampler = nearest_sampler(device, "Cutaway Sampler");
        let init_params = uniform(device, "Cutaway Init Params", 16);
        let carve_params = uniform(device, "Cutaway Carve Params", 48);
        let resolve_params = uniform(device, "Cutaway Resolve Params", 16);

        let (init_bind_group, jfa_bind_groups, resolve_bind_groups) =
            make_bind_groups(&BindGroupParts {
                device,
                init_layout: &init_layout,
                jfa_layout: &jfa_layout,
                resolve_layout: &resolve_layout,
                capture_view: capture.sampled_view(),
                jfa: &jfa,
                sampler: &sampler,
                init_params: &init_params,
                carve_params: &carve_params,
                resolve_params: &resolve_params,
            });

        Ok(Self {
            inner: Some(Inner {
                capture,
                jfa,
                target,
                init_pipeline,
                jfa_pipeline,
                resolve_pipeline,
                init_layout,
                jfa_layout,
                resolve_layout,
                sampler,
                init_params,
                carve_params,
                resolve_params,
                init_bind_group,
                jfa_bind_groups,
                resolve_bind_groups,
            }),
        })
    }

    /// Whether the pass survived the capability probe.
    pub fn supported(&self) -> bool {
        self.inner.is_some()
    }

    /// The packed boundary-depth texture sampled by the shading stage, or
    /// `None` while disabled.
    pub fn boundary(&self) -> Option<&wgpu::TextureView> {
        self.inner.as_ref().map(|inner| &inner.target.view)
    }

    /// Idle state: no cutaway-flagged geometry this frame. Clears the
    /// boundary to background so consumers sample a no-op cut. Runs once per
    /// frame, not per eye — the cleared state is eye-independent.
    pub fn render_idle(&self, encoder: &mut wgpu::CommandEncoder) {
        let Some(inner) = &self.inner else {
            return;
        };
        let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Cutaway Idle Clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &inner.target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });
        drop(pass);
    }

    /// Active state, one eye: capture eligible depth, seed, propagate,
    /// resolve into the eye's region of the boundary texture.
    pub fn render_eye(
        &self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        geometry: &dyn GeometryRenderer,
        scene: &SceneInfo,
        eye: &EyeView,
        options: &CutawayOptions,
    ) {
        let Some(inner) = &self.inner else {
            return;
        };
        let viewport = eye.viewport;
        let target_w = inner.target.width();
        let target_h = inner.target.height();

        // Slope offset arrives as a fraction of the bounding radius and is
        // consumed in linear-depth units.
        let slope_offset = scene.bounding_radius * options.slope_offset
            / (eye.far - eye.near);

        context.queue.write_buffer(
            &inner.init_params,
            0,
            bytemuck::bytes_of(&InitParams {
                is_ortho: eye.is_ortho_uniform(),
                near: eye.near,
                far: eye.far,
                _pad: 0.0,
            }),
        );
        context.queue.write_buffer(
            &inner.carve_params,
            0,
            bytemuck::bytes_of(&CarveParams {
                viewport: viewport.normalized(target_w, target_h),
                aspect: [viewport.aspect(), 1.0],
                pmsz: eye.pmsz(),
                angle: options.angle(),
                edge_region_size: options.border_size,
                slope_offset,
                _pad: [0.0; 2],
            }),
        );
        context.queue.write_buffer(
            &inner.resolve_params,
            0,
            bytemuck::bytes_of(&InitParams {
                is_ortho: eye.is_ortho_uniform(),
                near: eye.near,
                far: eye.far,
                _pad: 0.0,
            }),
        );

        let schedule = step_schedule(target_w.max(target_h));
        let steps: Vec<[f32; 2]> = schedule
            .iter()
            .map(|&s| [s as f32 / target_w as f32, s as f32 / target_h as f32])
            .collect();
        inner.jfa.write_steps(&context.queue, &steps);

        inner.render_capture(encoder, geometry, eye);
        inner.render_seed(encoder, viewport);
        let final_slot = inner.jfa.run(
            encoder,
            &inner.jfa_pipeline,
            &inner.jfa_bind_groups,
            viewport,
            steps.len(),
        );
        inner.render_resolve(encoder, viewport, final_slot);
    }

    /// Reallocate everything for a new size; bind groups are recreated when
    /// any backing texture changed. No-op on equal dimensions.
    pub fn resize(&mut self, context: &RenderContext, width: u32, height: u32) {
        let Some(inner) = &mut self.inner else {
            return;
        };
        let device = &context.device;
        let a = inner.capture.resize(device, width, height);
        let b = inner.jfa.resize(device, width, height);
        let c = inner.target.resize(device, width, height);
        if a || b || c {
            inner.recreate_bind_groups(device);
        }
    }
}

struct BindGroupParts<'a> {
    device: &'a wgpu::Device,
    init_layout: &'a wgpu::BindGroupLayout,
    jfa_layout: &'a wgpu::BindGroupLayout,
    resolve_layout: &'a wgpu::BindGroupLayout,
    capture_view: &'a wgpu::TextureView,
    jfa: &'a JumpFlood,
    sampler: &'a wgpu::Sampler,
    init_params: &'a wgpu::Buffer,
    carve_params: &'a wgpu::Buffer,
    resolve_params: &'a wgpu::Buffer,
}

fn make_bind_groups(
    parts: &BindGroupParts<'_>,
) -> (wgpu::BindGroup, [wgpu::BindGroup; 2], [wgpu::BindGroup; 2]) {
    let device = parts.device;

    let init = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Cutaway Init Bind Group"),
        layout: parts.init_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(
                    parts.capture_view,
                ),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(parts.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: parts.init_params.as_entire_binding(),
            },
        ],
    });

    let jfa = [Slot::A, Slot::B].map(|slot| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cutaway JFA Bind Group"),
            layout: parts.jfa_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(
                        &parts.jfa.target(slot).view,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(parts.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: parts.carve_params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Buffer(
                        wgpu::BufferBinding {
                            buffer: parts.jfa.step_buffer(),
                            offset: 0,
                            size: wgpu::BufferSize::new(16),
                        },
                    ),
                },
            ],
        })
    });

    let resolve = [Slot::A, Slot::B].map(|slot| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cutaway Resolve Bind Group"),
            layout: parts.resolve_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(
                        &parts.jfa.target(slot).view,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(parts.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: parts.resolve_params.as_entire_binding(),
                },
            ],
        })
    });

    (init, jfa, resolve)
}

impl Inner {
    fn recreate_bind_groups(&mut self, device: &wgpu::Device) {
        let (init, jfa, resolve) = make_bind_groups(&BindGroupParts {
            device,
            init_layout: &self.init_layout,
            jfa_layout: &self.jfa_layout,
            resolve_layout: &self.resolve_layout,
            capture_view: self.capture.sampled_view(),
            jfa: &self.jfa,
            sampler: &self.sampler,
            init_params: &self.init_params,
            carve_params: &self.carve_params,
            resolve_params: &self.resolve_params,
        });
        self.init_bind_group = init;
        self.jfa_bind_groups = jfa;
        self.resolve_bind_groups = resolve;
    }

    fn render_capture(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        geometry: &dyn GeometryRenderer,
        eye: &EyeView,
    ) {
        let viewport = eye.viewport;
        match &self.capture {
            DepthCapture::Native { target } => {
                let mut pass =
                    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Cutaway Depth Capture"),
                        color_attachments: &[],
                        depth_stencil_attachment: Some(
                            wgpu::RenderPassDepthStencilAttachment {
                                view: &target.view,
                                depth_ops: Some(wgpu::Operations {
                                    load: wgpu::LoadOp::Clear(1.0),
                                    store: wgpu::StoreOp::Store,
                                }),
                                stencil_ops: None,
                            },
                        ),
                        ..Default::default()
                    });
                set_eye_rect(&mut pass, viewport);
                geometry.draw(
                    &mut pass,
                    GeometryGroup::CutawaySeeds,
                    DrawIntent::DepthOnly,
                    eye,
                );
            }
            DepthCapture::Packed { packed, scratch } => {
                let mut pass =
                    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Cutaway Packed Depth Capture"),
                        color_attachments: &[Some(
                            wgpu::RenderPassColorAttachment {
                                view: &packed.view,
                                resolve_target: None,
                                ops: wgpu::Operations {
                                    load: wgpu::LoadOp::Clear(
                                        wgpu::Color::WHITE,
                                    ),
                                    store: wgpu::StoreOp::Store,
                                },
                                depth_slice: None,
                            },
                        )],
                        depth_stencil_attachment: Some(
                            wgpu::RenderPassDepthStencilAttachment {
                                view: &scratch.view,
                                depth_ops: Some(wgpu::Operations {
                                    load: wgpu::LoadOp::Clear(1.0),
                                    store: wgpu::StoreOp::Store,
                                }),
                                stencil_ops: None,
                            },
                        ),
                        ..Default::default()
                    });
                set_eye_rect(&mut pass, viewport);
                geometry.draw(
                    &mut pass,
                    GeometryGroup::CutawaySeeds,
                    DrawIntent::PackedDepth,
                    eye,
                );
            }
        }
    }

    fn render_seed(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        viewport: crate::view::Viewport,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Cutaway Seed Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.jfa.target(Slot::A).view,
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
        pass.set_pipeline(&self.init_pipeline);
        pass.set_bind_group(0, &self.init_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    fn render_resolve(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        viewport: crate::view::Viewport,
        final_slot: Slot,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Cutaway Resolve Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.target.view,
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
        pass.set_pipeline(&self.resolve_pipeline);
        pass.set_bind_group(
            0,
            &self.resolve_bind_groups[final_slot.index()],
            &[],
        );
        pass.draw(0..3, 0..1);
    }
}

fn set_eye_rect(pass: &mut wgpu::RenderPass<'_>, viewport: crate::view::Viewport) {
    pass.set_viewport(
        viewport.x as f32,
        viewport.y as f32,
        viewport.width as f32,
        viewport.height as f32,
        0.0,
        1.0,
    );
    pass.set_scissor_rect(
        viewport.x,
        viewport.y,
        viewport.width,
        viewport.height,
    );
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
    fn widening_angle_deepens_the_carve() {
        // A deeper boundary discards more fragments in front of it, so the
        // carved region must widen monotonically with the half-angle.
        let (pmsz, seed_z, dist) = (0.0, 0.5, 0.1);
        let mut previous = f32::NEG_INFINITY;
        for deg in 1..90 {
            let angle = (deg as f32).to_radians();
            let carved = carved_depth(
                seed_z,
                dist,
                carve_slope(angle.tan(), pmsz, seed_z),
                0.0,
            );
            assert!(
                carved > previous,
                "carve shrank between {}° and {deg}°",
                deg - 1
            );
            previous = carved;
        }
    }

    #[test]
    fn carve_at_the_seed_is_the_seed_depth() {
        let slope = carve_slope(1.0, 0.0, 0.5);
        assert_eq!(carved_depth(0.5, 0.0, slope, 0.0), 0.5);
    }

    #[test]
    fn slope_offset_pushes_the_boundary_deeper() {
        let slope = carve_slope(1.0, 0.0, 0.5);
        let without = carved_depth(0.5, 0.1, slope, 0.0);
        let with = carved_depth(0.5, 0.1, slope, 0.05);
        assert!(with > without);
        assert!((with - without - 0.05).abs() < 1e-6);
    }

    #[test]
    fn edge_compression_tapers_to_zero_at_the_border() {
        let angle = 1.0;
        assert_eq!(angle_edge_compression(angle, 0.0, [0.001, 0.001]), angle);
        assert_eq!(angle_edge_compression(angle, 0.05, [0.0, 0.3]), 0.0);
        assert_eq!(angle_edge_compression(angle, 0.05, [0.5, 0.5]), angle);
        let tapered = angle_edge_compression(angle, 0.05, [0.025, 0.5]);
        assert!(tapered > 0.0 && tapered < angle);
    }

    #[test]
    fn carved_boundary_discards_only_nearer_fragments() {
        // One cutaway-eligible sphere seed in front of a non-eligible cube,
        // 45 degree half-angle, no border taper. Cube fragments nearer than
        // the carved boundary at their pixel are discarded; farther
        // fragments shade normally.
        let angle = std::f32::consts::FRAC_PI_4;
        let seed_z = 0.4;
        let cube_z = 0.3;
        let slope = carve_slope(angle.tan(), 0.0, seed_z);

        let discards: Vec<bool> = [0.0f32, 0.02, 0.05, 0.1, 0.2, 0.5]
            .iter()
            .map(|&dist| {
                let boundary =
                    carved_depth(seed_z, dist, slope, 0.0).clamp(0.0, 1.0);
                boundary < 0.99 && cube_z < boundary
            })
            .collect();

        // Above the seed the occluding cube is inside the cone and carved
        // away; far from the seed the cone has risen past the cube and
        // fragments shade normally again.
        assert!(discards[0], "occluder over the seed must be discarded");
        assert!(!discards[5], "cone should taper off far from the seed");

        // The discarded disk is contiguous: once fragments survive, more
        // distant ones never get discarded again.
        let first_kept = discards.iter().position(|d| !d);
        let first_kept = match first_kept {
            Some(i) => i,
            None => panic!("no fragment survived"),
        };
        assert!(discards[first_kept..].iter().all(|d| !d));
    }

    #[test]
    fn perspective_slope_term_is_negative_for_distant_far_planes() {
        // (near+far)/(near-far) ≈ -1 for near << far; the slope then flips
        // sign for shallow seeds, which the comparator's minimum absorbs.
        let pmsz = (0.1 + 1000.0) / (0.1 - 1000.0);
        assert!(pmsz < -0.99 && pmsz > -1.01);
        assert!(carve_slope(1.0, pmsz, 0.2) < 0.0);
    }
}
