//! The seam to the external scene/representation layer.
//!
//! The pipeline never walks a scene graph. It opens render passes in
//! dependency order and asks the embedder to emit draws for named geometry
//! groups; the embedder owns every geometry pipeline, vertex buffer, and
//! material. [`FrameResources`] hands the embedder the pipeline textures its
//! shaders must sample (cutaway boundary, primitive depth) before any pass is
//! encoded.

use crate::view::EyeView;

/// Which slice of the scene a draw call covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryGroup {
    /// All opaque primitive geometry.
    OpaquePrimitives,
    /// Opaque primitives flagged cutaway-eligible. Under WBOIT these are
    /// drawn separately from [`Self::CutawayAffected`] so the carve discard
    /// and the plain depth test apply to disjoint sets.
    CutawaySeeds,
    /// Opaque primitives subject to the cutaway discard test.
    CutawayAffected,
    /// Volumetric geometry, blended against primitive depth.
    Volumes,
    /// Transparent primitive geometry.
    TransparentPrimitives,
    /// Transparent volumetric geometry.
    TransparentVolumes,
    /// Debug/handle/camera-axis helper gizmos, drawn last before resolve.
    Overlays,
}

/// What a draw call must write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawIntent {
    /// Shaded color (the attachment formats are fixed by the open pass).
    Color,
    /// Depth-only render into a bare depth attachment (no color targets).
    DepthOnly,
    /// Projected depth packed into RGBA8 — the degraded capture path on
    /// backends without sampleable depth textures.
    PackedDepth,
    /// Weighted-blended OIT accumulation into the accum/revealage pair.
    OitAccumulate,
}

/// Scene facts the pipeline needs up front, supplied per frame.
#[derive(Debug, Clone, Copy)]
pub struct SceneInfo {
    /// Any cutaway-eligible geometry present? Gates the cutaway pass between
    /// idle and active.
    pub has_cutaway: bool,
    /// Any volumetric geometry present?
    pub has_volumes: bool,
    /// Any transparent geometry present?
    pub has_transparent: bool,
    /// Radius of the visible bounding sphere, in view-space units. Scales
    /// the cutaway slope offset and the dynamic outline width.
    pub bounding_radius: f32,
}

/// Pipeline-owned textures the embedder's shaders sample, refreshed before
/// each frame is encoded (views change on resize).
pub struct FrameResources<'a> {
    /// Packed cutaway boundary depth. `None` while the cutaway pass is
    /// disabled for lack of float-target support. Shading samples it to
    /// discard cutaway-affected fragments nearer than the boundary — guarded
    /// by `boundary < 0.99`, since an idle or unseeded boundary unpacks near
    /// 1.0 and must discard nothing — and to classify cutaway-eligible
    /// fragments as on-surface (within a packed depth epsilon of 0.01)
    /// versus interior.
    pub cutaway_boundary: Option<&'a wgpu::TextureView>,
    /// Primitive depth as sampled by the volume pass for blending. `None`
    /// on the packed-depth path, where the packed capture below applies.
    pub primitives_depth: Option<&'a wgpu::TextureView>,
    /// Packed primitive depth capture on the degraded path.
    pub primitives_depth_packed: Option<&'a wgpu::TextureView>,
}

/// Implemented by the scene layer to emit geometry draws into passes the
/// pipeline opens.
///
/// Contract: the pass is already scissored to the eye viewport; draws must
/// respect `intent`; for [`DrawIntent::OitAccumulate`] the color targets are
/// `Rgba16Float` (additive) and `R16Float` (zero, one-minus-src-alpha) and
/// fragment weight follows the weighted-blended OIT scheme; transparent
/// groups are drawn with depth writes disabled.
pub trait GeometryRenderer {
    /// Refresh bind groups against the pipeline textures for this frame.
    fn prepare(&mut self, device: &wgpu::Device, resources: &FrameResources<'_>);

    /// Record draws for `group` with `intent` into the open pass.
    fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        group: GeometryGroup,
        intent: DrawIntent,
        eye: &EyeView,
    );
}
