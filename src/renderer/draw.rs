//! Frame orchestration.
//!
//! [`DrawPass`] owns every stage and sequences them per frame, per eye:
//! cutaway → opaque geometry (+ depth capture) → depth merge → depth
//! pyramid → outlines → occlusion → combine → transparency → overlays →
//! antialiasing resolve. All submission happens here, in program order; a
//! pass never samples a texture still bound as its write target, and a
//! frame that fails its preconditions is rejected before anything is
//! submitted.

use crate::error::{InciseError, RenderError};
use crate::gpu::capabilities::Capabilities;
use crate::gpu::render_context::RenderContext;
use crate::gpu::render_target::{needs_resize, RenderTarget};
use crate::gpu::shader_composer::ShaderComposer;
use crate::options::{Options, OutlineMode, TransparencyMode};
use crate::renderer::antialias::{AaFilter, AaPass};
use crate::renderer::cutaway::CutawayPass;
use crate::renderer::depth_merge::{OutlineDepthMerge, SceneDepthMerge};
use crate::renderer::hiz::HizPass;
use crate::renderer::outline::{OutlineOutput, OutlinePass};
use crate::renderer::postprocess::{PostprocessInputs, PostprocessPass};
use crate::renderer::ssao::SsaoPass;
use crate::renderer::transparency::TransparencyPass;
use crate::scene::{
    DrawIntent, FrameResources, GeometryGroup, GeometryRenderer, SceneInfo,
};
use crate::view::{EyeView, FrameView};

/// How per-group depth is captured alongside the color pass.
enum SceneCapture {
    /// Depth textures attached during the color passes and sampled directly.
    Native {
        primitives: RenderTarget,
        volumes: RenderTarget,
    },
    /// Hardware depth is attachment-only; each group gets an extra
    /// depth-only draw into a packed RGBA8 encoding.
    Packed {
        /// Main depth attachment; retains primitive depth for later
        /// depth-tested passes.
        attachment: RenderTarget,
        /// Scratch attachment for the packed re-draws.
        scratch: RenderTarget,
        primitives: RenderTarget,
        volumes: RenderTarget,
    },
}

impl SceneCapture {
    fn new(
        device: &wgpu::Device,
        caps: &Capabilities,
        width: u32,
        height: u32,
    ) -> Self {
        let depth = |label| {
            RenderTarget::new(
                device,
                label,
                width,
                height,
                wgpu::TextureFormat::Depth32Float,
            )
        };
        let packed = |label| {
            RenderTarget::new(
                device,
                label,
                width,
                height,
                wgpu::TextureFormat::Rgba8Unorm,
            )
        };
        if caps.native_depth {
            Self::Native {
                primitives: depth("Primitives Depth"),
                volumes: depth("Volumes Depth"),
            }
        } else {
            Self::Packed {
                attachment: depth("Scene Depth Attachment"),
                scratch: depth("Capture Scratch Depth"),
                primitives: packed("Primitives Packed Depth"),
                volumes: packed("Volumes Packed Depth"),
            }
        }
    }

    fn primitives_view(&self) -> &wgpu::TextureView {
        match self {
            Self::Native { primitives, .. }
            | Self::Packed { primitives, .. } => &primitives.view,
        }
    }

    fn volumes_view(&self) -> &wgpu::TextureView {
        match self {
            Self::Native { volumes, .. } | Self::Packed { volumes, .. } => {
                &volumes.view
            }
        }
    }

    /// Depth attachment carrying primitive depth for transparency and
    /// overlay z-testing.
    fn tested_depth_view(&self) -> &wgpu::TextureView {
        match self {
            Self::Native { primitives, .. } => &primitives.view,
            Self::Packed { attachment, .. } => &attachment.view,
        }
    }

    fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> bool {
        match self {
            Self::Native {
                primitives,
                volumes,
            } => {
                let a = primitives.resize(device, width, height);
                let b = volumes.resize(device, width, height);
                a || b
            }
            Self::Packed {
                attachment,
                scratch,
                primitives,
                volumes,
            } => {
                let a = attachment.resize(device, width, height);
                let b = scratch.resize(device, width, height);
                let c = primitives.resize(device, width, height);
                let d = volumes.resize(device, width, height);
                a || b || c || d
            }
        }
    }
}

/// The full pipeline: every stage pass, its targets, and the per-frame
/// sequencing. Resize cascades leaf to root so no pass transiently reads a
/// stale-sized texture.
pub struct DrawPass {
    caps: Capabilities,
    width: u32,
    height: u32,

    color_target: RenderTarget,
    capture: SceneCapture,
    scene_depth: RenderTarget,
    scene_depth_attach: wgpu::TextureView,
    merged_depth: RenderTarget,

    cutaway: CutawayPass,
    outline: OutlinePass,
    ssao: SsaoPass,
    hiz: HizPass,
    scene_merge: SceneDepthMerge,
    outline_merge: OutlineDepthMerge,
    postprocess: PostprocessPass,
    transparency: TransparencyPass,
    aa: AaPass,
}

impl DrawPass {
    /// Build the whole pipeline at the context's current size.
    ///
    /// # Errors
    ///
    /// Returns [`InciseError::Shader`] if any pass shader fails to compose.
    pub fn new(
        context: &RenderContext,
        caps: Capabilities,
    ) -> Result<Self, InciseError> {
        let device = &context.device;
        let (width, height) = (context.width(), context.height());
        let mut composer = ShaderComposer::new()?;

        let color_target = RenderTarget::new(
            device,
            "Scene Color",
            width,
            height,
            context.format,
        );
        let capture = SceneCapture::new(device, &caps, width, height);
        let scene_depth = RenderTarget::with_mip_chain(
            device,
            "Canonical Scene Depth",
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        let scene_depth_attach = scene_depth.mip_view(0);
        let merged_depth = RenderTarget::new(
            device,
            "Merged Depth",
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
        );

        let cutaway =
            CutawayPass::new(context, &caps, &mut composer, width, height)?;
        let outline = OutlinePass::new(
            context,
            &caps,
            &mut composer,
            &scene_depth.view,
            width,
            height,
        )?;
        let ssao = SsaoPass::new(
            context,
            &mut composer,
            &scene_depth.view,
            width,
            height,
        )?;
        let hiz = HizPass::new(context, &mut composer, &scene_depth)?;
        let scene_merge = SceneDepthMerge::new(
            context,
            &mut composer,
            caps.native_depth,
            capture.primitives_view(),
            capture.volumes_view(),
        )?;
        let outline_merge = OutlineDepthMerge::new(
            context,
            &mut composer,
            &scene_depth.view,
            outline.source_views(),
        )?;
        let postprocess = PostprocessPass::new(
            context,
            &mut composer,
            &PostprocessInputs {
                occlusion: ssao.occlusion_view(),
                color: &color_target.view,
                scene_depth: &scene_depth.view,
                outline_sources: outline.source_views(),
            },
            width,
            height,
        )?;
        let transparency =
            TransparencyPass::new(context, &mut composer, width, height)?;
        let aa = AaPass::new(
            context,
            &mut composer,
            postprocess.output_view(),
            width,
            height,
        )?;

        Ok(Self {
            caps,
            width,
            height,
            color_target,
            capture,
            scene_depth,
            scene_depth_attach,
            merged_depth,
            cutaway,
            outline,
            ssao,
            hiz,
            scene_merge,
            outline_merge,
            postprocess,
            transparency,
            aa,
        })
    }

    /// The capabilities this pipeline was built against.
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Packed cutaway boundary for the shading stage, if supported.
    pub fn cutaway_boundary(&self) -> Option<&wgpu::TextureView> {
        self.cutaway.boundary()
    }

    /// Canonical scene depth (primitives ∧ volumes), packed RGBA8 with the
    /// depth pyramid in its mip chain.
    pub fn scene_depth_view(&self) -> &wgpu::TextureView {
        &self.scene_depth.view
    }

    /// Scene depth with outline depth folded in — the authoritative depth
    /// after postprocessing.
    pub fn merged_depth_view(&self) -> &wgpu::TextureView {
        &self.merged_depth.view
    }

    /// Register the external subpixel-morphological antialiasing filter.
    pub fn set_smaa_filter(&mut self, filter: Box<dyn AaFilter>) {
        self.aa.set_smaa_filter(filter);
    }

    /// Render one frame into `output`. Mono renders once; stereo renders
    /// each half-viewport with the shared targets, relying on every pass
    /// scissoring to its eye.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::WboitUnsupported`] — before any submission —
    /// when weighted-blended transparency is requested against a probe that
    /// reported it unsupported. That is a programming error, not a runtime
    /// condition to recover from.
    pub fn render(
        &mut self,
        context: &RenderContext,
        geometry: &mut dyn GeometryRenderer,
        scene: &SceneInfo,
        view: &FrameView,
        options: &Options,
        output: &wgpu::TextureView,
    ) -> Result<(), RenderError> {
        if options.transparency == TransparencyMode::Wboit && !self.caps.wboit
        {
            return Err(RenderError::WboitUnsupported);
        }

        geometry.prepare(
            &context.device,
            &FrameResources {
                cutaway_boundary: self.cutaway.boundary(),
                primitives_depth: self
                    .caps
                    .native_depth
                    .then(|| self.capture.primitives_view()),
                primitives_depth_packed: (!self.caps.native_depth)
                    .then(|| self.capture.primitives_view()),
            },
        );

        let cutaway_active = self.cutaway.supported() && scene.has_cutaway;
        if self.cutaway.supported() && !scene.has_cutaway {
            let mut encoder = context.create_encoder();
            self.cutaway.render_idle(&mut encoder);
            context.submit(encoder);
        }

        // Geometry phase, per eye: cutaway, opaque color + depth capture,
        // scene depth merge.
        for (index, eye) in view.eyes().enumerate() {
            let first_eye = index == 0;
            let mut encoder = context.create_encoder();
            if cutaway_active {
                self.cutaway.render_eye(
                    context,
                    &mut encoder,
                    geometry,
                    scene,
                    eye,
                    &options.cutaway,
                );
            }
            self.render_opaque_eye(
                &mut encoder,
                geometry,
                scene,
                eye,
                options,
                first_eye,
            );
            self.scene_merge.render_eye(
                &mut encoder,
                &self.scene_depth_attach,
                eye.viewport,
            );
            context.submit(encoder);
        }

        // The depth pyramid spans both eyes; build it once, after every
        // eye's merge.
        if options.occlusion.enabled {
            let mut encoder = context.create_encoder();
            self.hiz.render(&mut encoder);
            context.submit(encoder);
        }

        // Effects phase, per eye: outlines, occlusion, combine,
        // transparency, overlays, resolve.
        for (index, eye) in view.eyes().enumerate() {
            let first_eye = index == 0;
            let mut encoder = context.create_encoder();

            let outline_output = if options.outline.mode == OutlineMode::Off {
                None
            } else {
                let outline_output = self.outline.render_eye(
                    context,
                    &mut encoder,
                    scene,
                    eye,
                    &options.outline,
                    options.outline.mode == OutlineMode::Dynamic,
                );
                self.outline_merge.render_eye(
                    &mut encoder,
                    &self.merged_depth.view,
                    eye.viewport,
                    outline_output.source_index(),
                    matches!(outline_output, OutlineOutput::Dynamic(_)),
                );
                Some(outline_output)
            };

            if options.occlusion.enabled {
                self.ssao.render_eye(
                    context,
                    &mut encoder,
                    eye,
                    &options.occlusion,
                    self.hiz.max_level(),
                );
            }

            self.postprocess.render_eye(
                context,
                &mut encoder,
                eye,
                options,
                outline_output,
            );

            if scene.has_transparent {
                let depth = self.capture.tested_depth_view();
                match options.transparency {
                    TransparencyMode::Blended => {
                        self.transparency.render_blended_eye(
                            &mut encoder,
                            geometry,
                            eye,
                            self.postprocess.output_view(),
                            depth,
                        );
                    }
                    TransparencyMode::Wboit => {
                        self.transparency.render_wboit_eye(
                            &mut encoder,
                            geometry,
                            eye,
                            self.postprocess.output_view(),
                            depth,
                            first_eye,
                        );
                    }
                }
            }

            self.render_overlays_eye(&mut encoder, geometry, eye);

            self.aa.resolve_eye(
                context,
                &mut encoder,
                options.antialias,
                self.postprocess.output_view(),
                eye.viewport,
                output,
                first_eye,
            );
            context.submit(encoder);
        }

        Ok(())
    }

    fn render_opaque_eye(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        geometry: &dyn GeometryRenderer,
        scene: &SceneInfo,
        eye: &EyeView,
        options: &Options,
        first_eye: bool,
    ) {
        let background = wgpu::Color {
            r: f64::from(options.background_color[0]),
            g: f64::from(options.background_color[1]),
            b: f64::from(options.background_color[2]),
            a: if options.transparent_background { 0.0 } else { 1.0 },
        };
        let color_load = if first_eye {
            wgpu::LoadOp::Clear(background)
        } else {
            wgpu::LoadOp::Load
        };
        let depth_load = |clear: f32| {
            if first_eye {
                wgpu::LoadOp::Clear(clear)
            } else {
                wgpu::LoadOp::Load
            }
        };

        // Under WBOIT the opaque primitives are split so the cutaway
        // discard and the plain depth test never touch the same fragments.
        let opaque_groups: &[GeometryGroup] =
            if options.transparency == TransparencyMode::Wboit {
                &[GeometryGroup::CutawaySeeds, GeometryGroup::CutawayAffected]
            } else {
                &[GeometryGroup::OpaquePrimitives]
            };

        match &self.capture {
            SceneCapture::Native {
                primitives,
                volumes,
            } => {
                {
                    let mut pass = geometry_pass(
                        encoder,
                        "Opaque Primitives Pass",
                        Some((&self.color_target.view, color_load)),
                        &primitives.view,
                        Some(depth_load(1.0)),
                        eye,
                    );
                    for &group in opaque_groups {
                        geometry.draw(
                            &mut pass,
                            group,
                            DrawIntent::Color,
                            eye,
                        );
                    }
                }

                if scene.has_volumes {
                    let mut pass = geometry_pass(
                        encoder,
                        "Volumes Pass",
                        Some((&self.color_target.view, wgpu::LoadOp::Load)),
                        &volumes.view,
                        Some(depth_load(1.0)),
                        eye,
                    );
                    geometry.draw(
                        &mut pass,
                        GeometryGroup::Volumes,
                        DrawIntent::Color,
                        eye,
                    );
                } else if first_eye {
                    clear_depth(encoder, &volumes.view);
                }
            }
            SceneCapture::Packed {
                attachment,
                scratch,
                primitives,
                volumes,
            } => {
                {
                    let mut pass = geometry_pass(
                        encoder,
                        "Opaque Primitives Pass",
                        Some((&self.color_target.view, color_load)),
                        &attachment.view,
                        Some(depth_load(1.0)),
                        eye,
                    );
                    for &group in opaque_groups {
                        geometry.draw(
                            &mut pass,
                            group,
                            DrawIntent::Color,
                            eye,
                        );
                    }
                }
                {
                    let mut pass = geometry_pass(
                        encoder,
                        "Primitives Packed Depth Pass",
                        Some((
                            &primitives.view,
                            if first_eye {
                                wgpu::LoadOp::Clear(wgpu::Color::WHITE)
                            } else {
                                wgpu::LoadOp::Load
                            },
                        )),
                        &scratch.view,
                        Some(wgpu::LoadOp::Clear(1.0)),
                        eye,
                    );
                    for &group in opaque_groups {
                        geometry.draw(
                            &mut pass,
                            group,
                            DrawIntent::PackedDepth,
                            eye,
                        );
                    }
                }

                if scene.has_volumes {
                    {
                        let mut pass = geometry_pass(
                            encoder,
                            "Volumes Pass",
                            Some((
                                &self.color_target.view,
                                wgpu::LoadOp::Load,
                            )),
                            &attachment.view,
                            None,
                            eye,
                        );
                        geometry.draw(
                            &mut pass,
                            GeometryGroup::Volumes,
                            DrawIntent::Color,
                            eye,
                        );
                    }
                    let mut pass = geometry_pass(
                        encoder,
                        "Volumes Packed Depth Pass",
                        Some((
                            &volumes.view,
                            if first_eye {
                                wgpu::LoadOp::Clear(wgpu::Color::WHITE)
                            } else {
                                wgpu::LoadOp::Load
                            },
                        )),
                        &scratch.view,
                        Some(wgpu::LoadOp::Clear(1.0)),
                        eye,
                    );
                    geometry.draw(
                        &mut pass,
                        GeometryGroup::Volumes,
                        DrawIntent::PackedDepth,
                        eye,
                    );
                } else if first_eye {
                    clear_color(encoder, &volumes.view, wgpu::Color::WHITE);
                }
            }
        }
    }

    fn render_overlays_eye(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        geometry: &dyn GeometryRenderer,
        eye: &EyeView,
    ) {
        let mut pass = geometry_pass(
            encoder,
            "Overlays Pass",
            Some((self.postprocess.output_view(), wgpu::LoadOp::Load)),
            self.capture.tested_depth_view(),
            None,
            eye,
        );
        geometry.draw(
            &mut pass,
            GeometryGroup::Overlays,
            DrawIntent::Color,
            eye,
        );
    }

    /// Resize every stage, leaf to root: backing targets first, then the
    /// propagation-owning passes, then their readers. A call with the
    /// current size is a no-op. Synchronous — the next `render` sees the
    /// new dimensions everywhere.
    pub fn resize(&mut self, context: &RenderContext, width: u32, height: u32) {
        if !needs_resize((self.width, self.height), width, height) {
            return;
        }
        log::debug!("resizing pipeline to {width}x{height}");
        self.width = width;
        self.height = height;
        let device = &context.device;

        let _ = self.color_target.resize(device, width, height);
        let captures_changed = self.capture.resize(device, width, height);
        let depth_changed = self.scene_depth.resize(device, width, height);
        if depth_changed {
            self.scene_depth_attach = self.scene_depth.mip_view(0);
        }
        let _ = self.merged_depth.resize(device, width, height);

        self.cutaway.resize(context, width, height);
        self.outline.resize(
            context,
            width,
            height,
            &self.scene_depth.view,
            depth_changed,
        );
        self.ssao.resize(
            context,
            width,
            height,
            &self.scene_depth.view,
            depth_changed,
        );
        if depth_changed {
            self.hiz.resize(context, &self.scene_depth);
        }
        if captures_changed {
            self.scene_merge.rebind(
                context,
                self.capture.primitives_view(),
                self.capture.volumes_view(),
            );
        }
        self.outline_merge.rebind(
            context,
            &self.scene_depth.view,
            self.outline.source_views(),
        );
        self.postprocess.resize(
            context,
            width,
            height,
            &PostprocessInputs {
                occlusion: self.ssao.occlusion_view(),
                color: &self.color_target.view,
                scene_depth: &self.scene_depth.view,
                outline_sources: self.outline.source_views(),
            },
        );
        self.transparency.resize(context, width, height);
        self.aa.resize(
            context,
            width,
            height,
            self.postprocess.output_view(),
        );
    }
}

/// Open a geometry pass with an optional color attachment and a depth
/// attachment. `depth_load: None` attaches depth read-write but preserves
/// its contents.
fn geometry_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    color: Option<(&wgpu::TextureView, wgpu::LoadOp<wgpu::Color>)>,
    depth: &wgpu::TextureView,
    depth_load: Option<wgpu::LoadOp<f32>>,
    eye: &EyeView,
) -> wgpu::RenderPass<'e> {
    let color_attachments = [color.map(|(view, load)| {
        wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        }
    })];
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &color_attachments,
        depth_stencil_attachment: Some(
            wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load.unwrap_or(wgpu::LoadOp::Load),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            },
        ),
        ..Default::default()
    });
    let viewport = eye.viewport;
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
    pass.forget_lifetime()
}

fn clear_depth(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Depth Clear Pass"),
        color_attachments: &[],
        depth_stencil_attachment: Some(
            wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            },
        ),
        ..Default::default()
    });
}

fn clear_color(
    encoder: &mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    color: wgpu::Color,
) {
    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Color Clear Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(color),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        ..Default::default()
    });
}
