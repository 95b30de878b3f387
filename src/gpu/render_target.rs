//! Off-screen render targets with idempotent resize.

/// Mip layout of a target's backing texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MipMode {
    /// A single level.
    Single,
    /// A full chain down to 1x1 (the depth pyramid).
    FullChain,
}

/// Number of mip levels in a full chain for the given extent.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// True when a resize to `(width, height)` actually changes `current`.
/// Every pass applies this same rule so `resize` is a no-op on equal
/// dimensions — no reallocation, no content invalidation.
pub fn needs_resize(current: (u32, u32), width: u32, height: u32) -> bool {
    current != (width, height)
}

/// A GPU texture used as a draw destination and sampled by later passes.
///
/// Contents are invalidated on reallocation; nothing in the pipeline relies
/// on target contents surviving a real resize.
pub struct RenderTarget {
    label: &'static str,
    format: wgpu::TextureFormat,
    mip_mode: MipMode,
    /// The backing texture.
    pub texture: wgpu::Texture,
    /// Default full-texture view.
    pub view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl RenderTarget {
    /// Create a single-level target.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        Self::create(device, label, width, height, format, MipMode::Single)
    }

    /// Create a target with a full mip chain (depth pyramid).
    #[must_use]
    pub fn with_mip_chain(
        device: &wgpu::Device,
        label: &'static str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        Self::create(device, label, width, height, format, MipMode::FullChain)
    }

    fn create(
        device: &wgpu::Device,
        label: &'static str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        mip_mode: MipMode,
    ) -> Self {
        let mips = match mip_mode {
            MipMode::Single => 1,
            MipMode::FullChain => mip_level_count(width, height),
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mips,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            label,
            format,
            mip_mode,
            texture,
            view,
            width,
            height,
        }
    }

    /// A view restricted to one mip level.
    pub fn mip_view(&self, level: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(self.label),
            base_mip_level: level,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }

    /// Reallocate the backing texture for a new size. Returns `true` when a
    /// reallocation happened; a call with the current size is a no-op.
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> bool {
        if !needs_resize((self.width, self.height), width, height) {
            return false;
        }
        log::trace!("resizing '{}' to {width}x{height}", self.label);
        *self = Self::create(
            device,
            self.label,
            width,
            height,
            self.format,
            self.mip_mode,
        );
        true
    }

    /// Target width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Target height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Texel format.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Mip levels in the backing texture.
    pub fn mip_count(&self) -> u32 {
        self.texture.mip_level_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_rule_is_idempotent() {
        assert!(!needs_resize((640, 480), 640, 480));
        assert!(needs_resize((640, 480), 640, 481));
        assert!(needs_resize((640, 480), 1, 480));
    }

    #[test]
    fn mip_chain_depth() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(1024, 768), 11);
        assert_eq!(mip_level_count(1, 1024), 11);
        assert_eq!(mip_level_count(1920, 1080), 11);
    }
}
