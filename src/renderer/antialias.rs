//! Antialiasing resolve boundary.
//!
//! The resolve filters are external collaborators: they consume the
//! composited color image and a viewport and produce a color image. FXAA
//! ships in-crate (it is a single fullscreen pipeline); SMAA resolves
//! through a filter the embedder registers. With no filter available the
//! stage degrades to a plain copy.

use crate::gpu::pipeline_helpers::{
    create_screen_space_pipeline, filtering_sampler, linear_sampler,
    texture_2d, uniform_buffer, ScreenSpacePipelineDef,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::{Shader, ShaderComposer, ShaderError};
use crate::options::AaMode;
use crate::view::Viewport;

/// An external antialiasing resolve filter (e.g. SMAA). Consumes the
/// composited color and writes the resolved image to the output view,
/// clipped to the viewport.
pub trait AaFilter {
    /// Resolve one eye's viewport from `input` into `output`.
    fn resolve(
        &mut self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        input: &wgpu::TextureView,
        viewport: Viewport,
        output: &wgpu::TextureView,
    );

    /// React to an output resize.
    fn resize(&mut self, context: &RenderContext, width: u32, height: u32);
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct FxaaParams {
    screen_size: [f32; 2],
    _pad: [f32; 2],
}

/// The resolve stage: FXAA, plain copy, or a registered external filter.
pub struct AaPass {
    fxaa_pipeline: wgpu::RenderPipeline,
    blit_pipeline: wgpu::RenderPipeline,
    fxaa_layout: wgpu::BindGroupLayout,
    blit_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    params: wgpu::Buffer,
    fxaa_bind_group: wgpu::BindGroup,
    blit_bind_group: wgpu::BindGroup,
    smaa: Option<Box<dyn AaFilter>>,
}

impl AaPass {
    /// Build the FXAA and copy pipelines against the combine output.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError`] if a resolve shader fails to compose.
    pub fn new(
        context: &RenderContext,
        composer: &mut ShaderComposer,
        input: &wgpu::TextureView,
        width: u32,
        height: u32,
    ) -> Result<Self, ShaderError> {
        let device = &context.device;

        let fxaa_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("FXAA Layout"),
                entries: &[
                    texture_2d(0),
                    filtering_sampler(1),
                    uniform_buffer(2),
                ],
            },
        );
        let blit_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Blit Layout"),
                entries: &[texture_2d(0), filtering_sampler(1)],
            },
        );

        let fxaa_shader = composer.compose(device, Shader::Fxaa, &[])?;
        let blit_shader = composer.compose(device, Shader::Blit, &[])?;

        let fxaa_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "FXAA",
                shader: &fxaa_shader,
                format: context.format,
                blend: None,
                bind_group_layouts: &[&fxaa_layout],
            },
        );
        let blit_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "Blit",
                shader: &blit_shader,
                format: context.format,
                blend: None,
                bind_group_layouts: &[&blit_layout],
            },
        );

        let sampler = linear_sampler(device, "AA Sampler");
        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FXAA Params"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        context.queue.write_buffer(
            &params,
            0,
            bytemuck::bytes_of(&FxaaParams {
                screen_size: [width as f32, height as f32],
                _pad: [0.0; 2],
            }),
        );

        let (fxaa_bind_group, blit_bind_group) = Self::make_bind_groups(
            device,
            &fxaa_layout,
            &blit_layout,
            &sampler,
            &params,
            input,
        );

        Ok(Self {
            fxaa_pipeline,
            blit_pipeline,
            fxaa_layout,
            blit_layout,
            sampler,
            params,
            fxaa_bind_group,
            blit_bind_group,
            smaa: None,
        })
    }

    fn make_bind_groups(
        device: &wgpu::Device,
        fxaa_layout: &wgpu::BindGroupLayout,
        blit_layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        params: &wgpu::Buffer,
        input: &wgpu::TextureView,
    ) -> (wgpu::BindGroup, wgpu::BindGroup) {
        let fxaa = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("FXAA Bind Group"),
            layout: fxaa_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
        });
        let blit = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit Bind Group"),
            layout: blit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        (fxaa, blit)
    }

    /// Register the external subpixel-morphological filter.
    pub fn set_smaa_filter(&mut self, filter: Box<dyn AaFilter>) {
        self.smaa = Some(filter);
    }

    /// Resolve one eye into the caller's output view.
    pub fn resolve_eye(
        &mut self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        mode: AaMode,
        input: &wgpu::TextureView,
        viewport: Viewport,
        output: &wgpu::TextureView,
        first_eye: bool,
    ) {
        if mode == AaMode::Smaa {
            if let Some(smaa) = self.smaa.as_mut() {
                smaa.resolve(context, encoder, input, viewport, output);
                return;
            }
            log::debug!("no SMAA filter registered, resolving unfiltered");
        }

        let (pipeline, bind_group) = if mode == AaMode::Fxaa {
            (&self.fxaa_pipeline, &self.fxaa_bind_group)
        } else {
            (&self.blit_pipeline, &self.blit_bind_group)
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("AA Resolve Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: if first_eye {
                        wgpu::LoadOp::Clear(wgpu::Color::BLACK)
                    } else {
                        wgpu::LoadOp::Load
                    },
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

    /// Refresh size-dependent state and rebind the (possibly reallocated)
    /// combine output.
    pub fn resize(
        &mut self,
        context: &RenderContext,
        width: u32,
        height: u32,
        input: &wgpu::TextureView,
    ) {
        context.queue.write_buffer(
            &self.params,
            0,
            bytemuck::bytes_of(&FxaaParams {
                screen_size: [width as f32, height as f32],
                _pad: [0.0; 2],
            }),
        );
        let (fxaa, blit) = Self::make_bind_groups(
            &context.device,
            &self.fxaa_layout,
            &self.blit_layout,
            &self.sampler,
            &self.params,
            input,
        );
        self.fxaa_bind_group = fxaa;
        self.blit_bind_group = blit;
        if let Some(smaa) = self.smaa.as_mut() {
            smaa.resize(context, width, height);
        }
    }
}
