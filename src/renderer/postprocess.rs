//! Final combine pass.
//!
//! Applies occlusion darkening (attenuated by fog) and then outlines over
//! the composited opaque color. The effect combination is a closed,
//! enumerable key — occlusion on/off crossed with the outline mode — and
//! every variant pipeline is compiled at construction; per-frame
//! configuration only selects one.

use crate::gpu::pipeline_helpers::{
    create_screen_space_pipeline, nearest_sampler, non_filtering_sampler,
    texture_2d, texture_2d_unfilterable, uniform_buffer,
    ScreenSpacePipelineDef,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::render_target::RenderTarget;
use crate::gpu::shader_composer::{Shader, ShaderComposer, ShaderError};
use crate::options::{Options, OutlineMode};
use crate::renderer::outline::OutlineOutput;
use crate::view::EyeView;

/// Variant index for (occlusion, outline mode). The pipeline array is
/// ordered off/static/dynamic × occlusion-off/on.
pub(crate) fn variant_index(occlusion: bool, outline: OutlineMode) -> usize {
    let outline_index = match outline {
        OutlineMode::Off => 0,
        OutlineMode::Static => 1,
        OutlineMode::Dynamic => 2,
    };
    outline_index * 2 + usize::from(occlusion)
}

fn variant_defs(occlusion: bool, outline: OutlineMode) -> Vec<&'static str> {
    let mut defs = Vec::new();
    if occlusion {
        defs.push("OCCLUSION_ENABLE");
    }
    match outline {
        OutlineMode::Off => {}
        OutlineMode::Static => defs.push("OUTLINE_ENABLE"),
        OutlineMode::Dynamic => {
            defs.push("OUTLINE_ENABLE");
            defs.push("OUTLINE_DYNAMIC");
        }
    }
    defs
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct PostParams {
    fog_color: [f32; 3],
    is_ortho: f32,
    near: f32,
    far: f32,
    fog_near: f32,
    fog_far: f32,
    transparent_background: u32,
    _pad: [f32; 3],
}

/// Inputs whose views the bind groups capture.
pub struct PostprocessInputs<'a> {
    /// Blurred occlusion (occlusion RG, depth BA).
    pub occlusion: &'a wgpu::TextureView,
    /// Composited opaque color.
    pub color: &'a wgpu::TextureView,
    /// Canonical scene depth.
    pub scene_depth: &'a wgpu::TextureView,
    /// The three possible outline sources, indexed by
    /// [`OutlineOutput::source_index`].
    pub outline_sources: [&'a wgpu::TextureView; 3],
}

/// The combine pass and its output target.
pub struct PostprocessPass {
    target: RenderTarget,
    pipelines: [wgpu::RenderPipeline; 6],
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    params: wgpu::Buffer,
    bind_groups: [wgpu::BindGroup; 3],
}

impl PostprocessPass {
    /// Compile the full variant set and allocate the output target.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError`] if a combine variant fails to compose.
    pub fn new(
        context: &RenderContext,
        composer: &mut ShaderComposer,
        inputs: &PostprocessInputs<'_>,
        width: u32,
        height: u32,
    ) -> Result<Self, ShaderError> {
        let device = &context.device;

        let target = RenderTarget::new(
            device,
            "Postprocess Output",
            width,
            height,
            context.format,
        );

        let layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Postprocess Layout"),
                entries: &[
                    texture_2d(0),
                    texture_2d(1),
                    texture_2d(2),
                    texture_2d_unfilterable(3),
                    non_filtering_sampler(4),
                    uniform_buffer(5),
                ],
            },
        );

        let mut pipelines = Vec::with_capacity(6);
        for outline in
            [OutlineMode::Off, OutlineMode::Static, OutlineMode::Dynamic]
        {
            for occlusion in [false, true] {
                let defs = variant_defs(occlusion, outline);
                let shader =
                    composer.compose(device, Shader::Postprocess, &defs)?;
                pipelines.push(create_screen_space_pipeline(
                    device,
                    &ScreenSpacePipelineDef {
                        label: "Postprocess",
                        shader: &shader,
                        format: context.format,
                        blend: None,
                        bind_group_layouts: &[&layout],
                    },
                ));
            }
        }
        let Ok(pipelines) = <[wgpu::RenderPipeline; 6]>::try_from(pipelines)
        else {
            unreachable!("variant loop builds exactly six pipelines");
        };

        let sampler = nearest_sampler(device, "Postprocess Sampler");
        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Postprocess Params"),
            size: 48,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_groups =
            Self::make_bind_groups(device, &layout, &sampler, &params, inputs);

        Ok(Self {
            target,
            pipelines,
            layout,
            sampler,
            params,
            bind_groups,
        })
    }

    fn make_bind_groups(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        params: &wgpu::Buffer,
        inputs: &PostprocessInputs<'_>,
    ) -> [wgpu::BindGroup; 3] {
        inputs.outline_sources.map(|outlines| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Postprocess Bind Group"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(
                            inputs.occlusion,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(
                            inputs.color,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(
                            inputs.scene_depth,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(outlines),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        })
    }

    /// The combined image, input to transparency/overlay/antialiasing.
    pub fn output_view(&self) -> &wgpu::TextureView {
        &self.target.view
    }

    /// Run the combine for one eye.
    pub fn render_eye(
        &self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        eye: &EyeView,
        options: &Options,
        outline_output: Option<OutlineOutput>,
    ) {
        context.queue.write_buffer(
            &self.params,
            0,
            bytemuck::bytes_of(&PostParams {
                fog_color: options.background_color,
                is_ortho: eye.is_ortho_uniform(),
                near: eye.near,
                far: eye.far,
                fog_near: eye.fog_near,
                fog_far: eye.fog_far,
                transparent_background: u32::from(
                    options.transparent_background,
                ),
                _pad: [0.0; 3],
            }),
        );

        let outline_mode = match outline_output {
            None => OutlineMode::Off,
            Some(OutlineOutput::Static) => OutlineMode::Static,
            Some(OutlineOutput::Dynamic(_)) => OutlineMode::Dynamic,
        };
        let pipeline = &self.pipelines
            [variant_index(options.occlusion.enabled, outline_mode)];
        let bind_group = &self.bind_groups
            [outline_output.map_or(0, OutlineOutput::source_index)];

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Postprocess Pass"),
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
            eye.viewport.x,
            eye.viewport.y,
            eye.viewport.width,
            eye.viewport.height,
        );
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    /// Reallocate the output and rebind inputs after upstream targets
    /// changed.
    pub fn resize(
        &mut self,
        context: &RenderContext,
        width: u32,
        height: u32,
        inputs: &PostprocessInputs<'_>,
    ) {
        let _ = self.target.resize(&context.device, width, height);
        self.bind_groups = Self::make_bind_groups(
            &context.device,
            &self.layout,
            &self.sampler,
            &self.params,
            inputs,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_indices_cover_the_closed_set_once() {
        let mut seen = [false; 6];
        for outline in
            [OutlineMode::Off, OutlineMode::Static, OutlineMode::Dynamic]
        {
            for occlusion in [false, true] {
                let index = variant_index(occlusion, outline);
                assert!(!seen[index], "duplicate variant index {index}");
                seen[index] = true;
            }
        }
        assert!(seen.iter().all(|v| *v));
    }

    #[test]
    fn variant_defs_match_the_shader_switches() {
        assert!(variant_defs(false, OutlineMode::Off).is_empty());
        assert_eq!(
            variant_defs(true, OutlineMode::Dynamic),
            vec!["OCCLUSION_ENABLE", "OUTLINE_ENABLE", "OUTLINE_DYNAMIC"]
        );
        assert_eq!(
            variant_defs(false, OutlineMode::Static),
            vec!["OUTLINE_ENABLE"]
        );
    }
}
