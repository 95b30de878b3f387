//! Depth unification passes.
//!
//! Primitive, volume, and outline depth are produced by separate draw
//! passes into separate buffers; postprocessing wants one authoritative
//! depth. Both merges write `min(depths)` pointwise into a packed RGBA8
//! target; the packed background (depth 1.0) never wins over a real surface.

use crate::gpu::pipeline_helpers::{
    create_screen_space_pipeline, depth_texture_2d, nearest_sampler,
    non_filtering_sampler, texture_2d, texture_2d_unfilterable,
    ScreenSpacePipelineDef,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::{Shader, ShaderComposer, ShaderError};
use crate::view::Viewport;

/// Pointwise minimum, mirrored for the tests.
pub(crate) fn merge_depths(depths: &[f32]) -> f32 {
    depths.iter().copied().fold(1.0, f32::min)
}

/// Merges the primitive and volume depth captures into the canonical scene
/// depth (level 0 of the pyramid texture).
pub struct SceneDepthMerge {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    bind_group: wgpu::BindGroup,
    native_depth: bool,
}

impl SceneDepthMerge {
    /// Build against the two capture views (native depth or packed color,
    /// per the capability probe).
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError`] if the merge shader fails to compose.
    pub fn new(
        context: &RenderContext,
        composer: &mut ShaderComposer,
        native_depth: bool,
        primitives: &wgpu::TextureView,
        volumes: &wgpu::TextureView,
    ) -> Result<Self, ShaderError> {
        let device = &context.device;

        let capture_entry = if native_depth {
            depth_texture_2d
        } else {
            texture_2d
        };
        let layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Scene Depth Merge Layout"),
                entries: &[
                    capture_entry(0),
                    capture_entry(1),
                    non_filtering_sampler(2),
                ],
            },
        );

        let defs: &[&str] = if native_depth { &[] } else { &["PACKED_DEPTH"] };
        let shader = composer.compose(device, Shader::DepthMergeScene, defs)?;
        let pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "Scene Depth Merge",
                shader: &shader,
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                bind_group_layouts: &[&layout],
            },
        );

        let sampler = nearest_sampler(device, "Depth Merge Sampler");
        let bind_group =
            Self::make_bind_group(device, &layout, &sampler, primitives, volumes);

        Ok(Self {
            pipeline,
            layout,
            sampler,
            bind_group,
            native_depth,
        })
    }

    fn make_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        primitives: &wgpu::TextureView,
        volumes: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Depth Merge Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(primitives),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(volumes),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Whether this merge was built for native depth captures.
    pub fn native_depth(&self) -> bool {
        self.native_depth
    }

    /// Merge into the canonical depth for one eye.
    pub fn render_eye(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        output: &wgpu::TextureView,
        viewport: Viewport,
    ) {
        merge_pass(
            encoder,
            "Scene Depth Merge Pass",
            output,
            viewport,
            &self.pipeline,
            &self.bind_group,
        );
    }

    /// Rebind after the capture targets reallocated.
    pub fn rebind(
        &mut self,
        context: &RenderContext,
        primitives: &wgpu::TextureView,
        volumes: &wgpu::TextureView,
    ) {
        self.bind_group = Self::make_bind_group(
            &context.device,
            &self.layout,
            &self.sampler,
            primitives,
            volumes,
        );
    }
}

/// Folds the outline depth into the canonical depth, producing the merged
/// buffer postprocessing reads.
pub struct OutlineDepthMerge {
    static_pipeline: wgpu::RenderPipeline,
    dynamic_pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    // One bind group per outline source: static target, JFA slot A, slot B.
    bind_groups: [wgpu::BindGroup; 3],
}

impl OutlineDepthMerge {
    /// Build both variants (static packed input, dynamic float input).
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError`] if the merge shader fails to compose.
    pub fn new(
        context: &RenderContext,
        composer: &mut ShaderComposer,
        scene_depth: &wgpu::TextureView,
        outline_sources: [&wgpu::TextureView; 3],
    ) -> Result<Self, ShaderError> {
        let device = &context.device;

        let layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Outline Depth Merge Layout"),
                entries: &[
                    texture_2d(0),
                    texture_2d_unfilterable(1),
                    non_filtering_sampler(2),
                ],
            },
        );

        let static_shader =
            composer.compose(device, Shader::DepthMergeOutline, &[])?;
        let dynamic_shader = composer.compose(
            device,
            Shader::DepthMergeOutline,
            &["OUTLINE_DYNAMIC"],
        )?;

        let static_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "Outline Depth Merge Static",
                shader: &static_shader,
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                bind_group_layouts: &[&layout],
            },
        );
        let dynamic_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "Outline Depth Merge Dynamic",
                shader: &dynamic_shader,
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                bind_group_layouts: &[&layout],
            },
        );

        let sampler = nearest_sampler(device, "Outline Merge Sampler");
        let bind_groups = Self::make_bind_groups(
            device,
            &layout,
            &sampler,
            scene_depth,
            outline_sources,
        );

        Ok(Self {
            static_pipeline,
            dynamic_pipeline,
            layout,
            sampler,
            bind_groups,
        })
    }

    fn make_bind_groups(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        scene_depth: &wgpu::TextureView,
        outline_sources: [&wgpu::TextureView; 3],
    ) -> [wgpu::BindGroup; 3] {
        outline_sources.map(|outlines| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Outline Depth Merge Bind Group"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(
                            scene_depth,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(outlines),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        })
    }

    /// Merge for one eye. `source_index` selects the outline texture (see
    /// [`crate::renderer::outline::OutlineOutput::source_index`]); dynamic
    /// sources use the float-payload variant.
    pub fn render_eye(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        output: &wgpu::TextureView,
        viewport: Viewport,
        source_index: usize,
        dynamic: bool,
    ) {
        let pipeline = if dynamic {
            &self.dynamic_pipeline
        } else {
            &self.static_pipeline
        };
        merge_pass(
            encoder,
            "Outline Depth Merge Pass",
            output,
            viewport,
            pipeline,
            &self.bind_groups[source_index],
        );
    }

    /// Rebind after the canonical depth or outline targets reallocated.
    pub fn rebind(
        &mut self,
        context: &RenderContext,
        scene_depth: &wgpu::TextureView,
        outline_sources: [&wgpu::TextureView; 3],
    ) {
        self.bind_groups = Self::make_bind_groups(
            &context.device,
            &self.layout,
            &self.sampler,
            scene_depth,
            outline_sources,
        );
    }
}

fn merge_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    output: &wgpu::TextureView,
    viewport: Viewport,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: output,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::depth::{
        pack_depth_to_rgba, quantize8, unpack_rgba_to_depth,
    };

    #[test]
    fn merge_is_the_pointwise_minimum() {
        assert_eq!(merge_depths(&[0.3, 0.7, 0.5]), 0.3);
        assert_eq!(merge_depths(&[0.9]), 0.9);
        assert_eq!(merge_depths(&[]), 1.0);
    }

    #[test]
    fn background_never_wins_over_a_surface() {
        // 1.0 is the packed background; any real surface depth must win.
        assert_eq!(merge_depths(&[1.0, 0.999, 1.0]), 0.999);
        assert_eq!(merge_depths(&[1.0, 1.0]), 1.0);
    }

    #[test]
    fn merge_of_packed_depths_survives_quantization() {
        for (d1, d2, d3) in
            [(0.25, 0.75, 0.5), (0.1, 0.1, 0.1), (1.0, 0.42, 0.77)]
        {
            let unpack = |d: f32| {
                unpack_rgba_to_depth(pack_depth_to_rgba(d).map(quantize8))
            };
            let merged = merge_depths(&[unpack(d1), unpack(d2), unpack(d3)]);
            let expected = merge_depths(&[d1, d2, d3]);
            // Depth 1.0 packs to 0 by construction, so exclude it from the
            // reconstruction comparison; it loses the min either way.
            if (d1.min(d2).min(d3) - 1.0).abs() > f32::EPSILON {
                assert!((merged - expected).abs() < 1e-5);
            }
        }
    }
}
