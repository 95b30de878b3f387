//! Hierarchical depth pyramid.
//!
//! Fills the mip chain of the canonical packed-depth texture, level by
//! level, each level a rotated-grid subsample of the one above: one source
//! texel per destination quadrant, offset on alternating rows and columns.
//! The occlusion pass selects a level from its screen-space sampling radius
//! so large radii touch a bounded number of cache lines.
//!
//! Each level renders straight into its own mip view while sampling the
//! previous level through a single-mip view; wgpu tracks usage per
//! subresource, so no intermediate proxy target is needed.

use crate::gpu::pipeline_helpers::{
    create_screen_space_pipeline, texture_2d, ScreenSpacePipelineDef,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::render_target::RenderTarget;
use crate::gpu::shader_composer::{Shader, ShaderComposer, ShaderError};

/// Extent of pyramid level `level` for a base extent.
pub(crate) fn level_extent(base: (u32, u32), level: u32) -> (u32, u32) {
    ((base.0 >> level).max(1), (base.1 >> level).max(1))
}

/// One bind group + attachment view per level below the base.
struct Level {
    bind_group: wgpu::BindGroup,
    attachment: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// Builds the depth pyramid over the canonical scene depth.
pub struct HizPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    levels: Vec<Level>,
}

impl HizPass {
    /// Build the pyramid pipeline and per-level resources.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError`] if the pyramid shader fails to compose.
    pub fn new(
        context: &RenderContext,
        composer: &mut ShaderComposer,
        scene_depth: &RenderTarget,
    ) -> Result<Self, ShaderError> {
        let device = &context.device;

        let layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Hi-Z Layout"),
                entries: &[texture_2d(0)],
            },
        );

        let shader = composer.compose(device, Shader::HizBuild, &[])?;
        let pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "Hi-Z Build",
                shader: &shader,
                format: scene_depth.format(),
                blend: None,
                bind_group_layouts: &[&layout],
            },
        );

        let levels = Self::make_levels(device, &layout, scene_depth);

        Ok(Self {
            pipeline,
            layout,
            levels,
        })
    }

    fn make_levels(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        scene_depth: &RenderTarget,
    ) -> Vec<Level> {
        let base = (scene_depth.width(), scene_depth.height());
        (1..scene_depth.mip_count())
            .map(|level| {
                let source = scene_depth.mip_view(level - 1);
                let bind_group =
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("Hi-Z Level Bind Group"),
                        layout,
                        entries: &[wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(
                                &source,
                            ),
                        }],
                    });
                let (width, height) = level_extent(base, level);
                Level {
                    bind_group,
                    attachment: scene_depth.mip_view(level),
                    width,
                    height,
                }
            })
            .collect()
    }

    /// Deepest pyramid level available to the occlusion pass.
    pub fn max_level(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Fill every level from the canonical depth at level 0. Runs once per
    /// frame after both eyes' depth merges.
    pub fn render(&self, encoder: &mut wgpu::CommandEncoder) {
        for level in &self.levels {
            let mut pass =
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Hi-Z Build Pass"),
                    color_attachments: &[Some(
                        wgpu::RenderPassColorAttachment {
                            view: &level.attachment,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        },
                    )],
                    depth_stencil_attachment: None,
                    ..Default::default()
                });
            pass.set_viewport(
                0.0,
                0.0,
                level.width as f32,
                level.height as f32,
                0.0,
                1.0,
            );
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &level.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
    }

    /// Rebuild per-level resources after the canonical depth reallocated.
    pub fn resize(&mut self, context: &RenderContext, scene_depth: &RenderTarget) {
        self.levels =
            Self::make_levels(&context.device, &self.layout, scene_depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_extents_halve_and_clamp() {
        assert_eq!(level_extent((1920, 1080), 0), (1920, 1080));
        assert_eq!(level_extent((1920, 1080), 1), (960, 540));
        assert_eq!(level_extent((1920, 1080), 10), (1, 1));
        assert_eq!(level_extent((5, 3), 1), (2, 1));
        assert_eq!(level_extent((5, 3), 2), (1, 1));
    }

    #[test]
    fn rotated_grid_offsets_alternate_per_row_and_column() {
        // Mirror of the shader's source-coordinate derivation.
        let src = |px: i32, py: i32| {
            (2 * px + ((py & 1) ^ 1), 2 * py + ((px & 1) ^ 1))
        };
        assert_eq!(src(0, 0), (1, 1));
        assert_eq!(src(1, 0), (3, 0));
        assert_eq!(src(0, 1), (0, 1));
        assert_eq!(src(1, 1), (2, 2));
        // Four destination pixels in a 2x2 block read four distinct source
        // texels, one per quadrant — a subsample, not a box average.
        let sources: std::collections::HashSet<_> =
            [(0, 0), (1, 0), (0, 1), (1, 1)]
                .into_iter()
                .map(|(x, y)| src(x, y))
                .collect();
        assert_eq!(sources.len(), 4);
    }
}
