//! Backend capability negotiation.
//!
//! Probed once at pipeline construction and threaded through as a read-only
//! value; nothing in the crate caches capability state globally.

/// What the backend can do, probed once and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Four-channel 32-bit-float textures usable as render targets. Gates
    /// the cutaway pass and dynamic-width outlines; without it both degrade
    /// to "feature disabled", never to an error.
    pub float_targets: bool,
    /// Depth textures sampleable in shaders. Without it, every geometry pass
    /// is followed by an extra depth-only draw into a packed RGBA8 encoding.
    pub native_depth: bool,
    /// Blendable 16-bit-float attachments for weighted-blended OIT.
    pub wboit: bool,
}

impl Capabilities {
    /// Probe the adapter for the capabilities this pipeline cares about.
    pub fn probe(adapter: &wgpu::Adapter) -> Self {
        let float_targets = adapter
            .get_texture_format_features(wgpu::TextureFormat::Rgba32Float)
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT);

        let native_depth = adapter
            .get_texture_format_features(wgpu::TextureFormat::Depth32Float)
            .allowed_usages
            .contains(wgpu::TextureUsages::TEXTURE_BINDING);

        let wboit = adapter
            .get_texture_format_features(wgpu::TextureFormat::Rgba16Float)
            .flags
            .contains(wgpu::TextureFormatFeatureFlags::BLENDABLE);

        let caps = Self {
            float_targets,
            native_depth,
            wboit,
        };
        log::debug!("probed capabilities: {caps:?}");
        caps
    }

    /// Everything supported. For contexts constructed from an external
    /// device where the adapter is unavailable; core WebGPU guarantees all
    /// three.
    #[must_use]
    pub fn assume_full() -> Self {
        Self {
            float_targets: true,
            native_depth: true,
            wboit: true,
        }
    }

    /// Force the packed-depth capture path (testing the degraded strategy).
    #[must_use]
    pub fn with_packed_depth(mut self) -> Self {
        self.native_depth = false;
        self
    }

    /// Drop float-target support (testing cutaway/dynamic-outline
    /// degradation).
    #[must_use]
    pub fn without_float_targets(mut self) -> Self {
        self.float_targets = false;
        self
    }

    /// Drop WBOIT support (testing the state-precondition error path).
    #[must_use]
    pub fn without_wboit(mut self) -> Self {
        self.wboit = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_constructors_clear_single_flags() {
        let caps = Capabilities::assume_full();
        assert!(caps.float_targets && caps.native_depth && caps.wboit);

        let packed = caps.with_packed_depth();
        assert!(!packed.native_depth);
        assert!(packed.float_targets && packed.wboit);

        let no_float = caps.without_float_targets();
        assert!(!no_float.float_targets);
        assert!(no_float.native_depth && no_float.wboit);

        let no_wboit = caps.without_wboit();
        assert!(!no_wboit.wboit);
        assert!(no_wboit.float_targets && no_wboit.native_depth);
    }
}
