//! Transparency compositors.
//!
//! Either classic back-to-front blending (the external renderer sorts and
//! blends against the opaque depth) or weighted-blended order-independent
//! transparency: draw-order-independent accumulation into a weighted color
//! sum plus a revealage product, resolved by one fullscreen pass. The
//! strategy is chosen per frame from the options; requesting WBOIT without
//! the capability is rejected before any submission.

use crate::gpu::pipeline_helpers::{
    create_screen_space_pipeline, nearest_sampler, non_filtering_sampler,
    texture_2d, ScreenSpacePipelineDef,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::render_target::RenderTarget;
use crate::gpu::shader_composer::{Shader, ShaderComposer, ShaderError};
use crate::scene::{DrawIntent, GeometryGroup, GeometryRenderer};
use crate::view::EyeView;

/// Blend state the external geometry pipelines must use on the weighted
/// accumulation target.
pub const WBOIT_ACCUM_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Blend state the external geometry pipelines must use on the revealage
/// target.
pub const WBOIT_REVEALAGE_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Zero,
        dst_factor: wgpu::BlendFactor::OneMinusSrc,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Zero,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Weighted accumulation target format.
pub const WBOIT_ACCUM_FORMAT: wgpu::TextureFormat =
    wgpu::TextureFormat::Rgba16Float;
/// Revealage target format.
pub const WBOIT_REVEALAGE_FORMAT: wgpu::TextureFormat =
    wgpu::TextureFormat::R16Float;

/// Owns the WBOIT attachments and resolve; drives both strategies.
pub struct TransparencyPass {
    accum: RenderTarget,
    revealage: RenderTarget,
    resolve_pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    bind_group: wgpu::BindGroup,
}

impl TransparencyPass {
    /// Build the accumulation targets and the resolve pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError`] if the resolve shader fails to compose.
    pub fn new(
        context: &RenderContext,
        composer: &mut ShaderComposer,
        width: u32,
        height: u32,
    ) -> Result<Self, ShaderError> {
        let device = &context.device;

        let accum = RenderTarget::new(
            device,
            "OIT Accum",
            width,
            height,
            WBOIT_ACCUM_FORMAT,
        );
        let revealage = RenderTarget::new(
            device,
            "OIT Revealage",
            width,
            height,
            WBOIT_REVEALAGE_FORMAT,
        );

        let layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("OIT Resolve Layout"),
                entries: &[
                    texture_2d(0),
                    texture_2d(1),
                    non_filtering_sampler(2),
                ],
            },
        );

        let shader = composer.compose(device, Shader::OitResolve, &[])?;
        let resolve_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "OIT Resolve",
                shader: &shader,
                format: context.format,
                // Composite through revealage: fully revealed pixels keep
                // the opaque color underneath.
                blend: Some(wgpu::BlendState {
                    color: wgpu::BlendComponent {
                        src_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                        dst_factor: wgpu::BlendFactor::SrcAlpha,
                        operation: wgpu::BlendOperation::Add,
                    },
                    alpha: wgpu::BlendComponent {
                        src_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                        dst_factor: wgpu::BlendFactor::SrcAlpha,
                        operation: wgpu::BlendOperation::Add,
                    },
                }),
                bind_group_layouts: &[&layout],
            },
        );

        let sampler = nearest_sampler(device, "OIT Sampler");
        let bind_group =
            Self::make_bind_group(device, &layout, &sampler, &accum, &revealage);

        Ok(Self {
            accum,
            revealage,
            resolve_pipeline,
            layout,
            sampler,
            bind_group,
        })
    }

    fn make_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        accum: &RenderTarget,
        revealage: &RenderTarget,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("OIT Resolve Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&accum.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(
                        &revealage.view,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Classic blended transparency: back-to-front draws straight into the
    /// composited color, depth-tested read-only against the opaque depth.
    pub fn render_blended_eye(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        geometry: &dyn GeometryRenderer,
        eye: &EyeView,
        color: &wgpu::TextureView,
        depth: &wgpu::TextureView,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Blended Transparency Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(
                wgpu::RenderPassDepthStencilAttachment {
                    view: depth,
                    depth_ops: None,
                    stencil_ops: None,
                },
            ),
            ..Default::default()
        });
        set_eye_rect(&mut pass, eye.viewport);
        geometry.draw(
            &mut pass,
            GeometryGroup::TransparentPrimitives,
            DrawIntent::Color,
            eye,
        );
        geometry.draw(
            &mut pass,
            GeometryGroup::TransparentVolumes,
            DrawIntent::Color,
            eye,
        );
    }

    /// WBOIT: accumulate both transparent groups order-independently, then
    /// resolve onto the composited color.
    pub fn render_wboit_eye(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        geometry: &dyn GeometryRenderer,
        eye: &EyeView,
        color: &wgpu::TextureView,
        depth: &wgpu::TextureView,
        first_eye: bool,
    ) {
        {
            let clear_or_load = |clear: wgpu::Color| {
                if first_eye {
                    wgpu::LoadOp::Clear(clear)
                } else {
                    wgpu::LoadOp::Load
                }
            };
            let mut pass =
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("OIT Accumulate Pass"),
                    color_attachments: &[
                        Some(wgpu::RenderPassColorAttachment {
                            view: &self.accum.view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: clear_or_load(
                                    wgpu::Color::TRANSPARENT,
                                ),
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        }),
                        Some(wgpu::RenderPassColorAttachment {
                            view: &self.revealage.view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: clear_or_load(wgpu::Color::WHITE),
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        }),
                    ],
                    depth_stencil_attachment: Some(
                        wgpu::RenderPassDepthStencilAttachment {
                            view: depth,
                            depth_ops: None,
                            stencil_ops: None,
                        },
                    ),
                    ..Default::default()
                });
            set_eye_rect(&mut pass, eye.viewport);
            geometry.draw(
                &mut pass,
                GeometryGroup::TransparentPrimitives,
                DrawIntent::OitAccumulate,
                eye,
            );
            geometry.draw(
                &mut pass,
                GeometryGroup::TransparentVolumes,
                DrawIntent::OitAccumulate,
                eye,
            );
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("OIT Resolve Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color,
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
            eye.viewport.x,
            eye.viewport.y,
            eye.viewport.width,
            eye.viewport.height,
        );
        pass.set_pipeline(&self.resolve_pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    /// Reallocate the accumulation targets. No-op on equal dimensions.
    pub fn resize(&mut self, context: &RenderContext, width: u32, height: u32) {
        let device = &context.device;
        let a = self.accum.resize(device, width, height);
        let b = self.revealage.resize(device, width, height);
        if a || b {
            self.bind_group = Self::make_bind_group(
                device,
                &self.layout,
                &self.sampler,
                &self.accum,
                &self.revealage,
            );
        }
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
