//! Camera and viewport inputs consumed by the pipeline.

use glam::{Mat4, Vec4};

/// A pixel rectangle inside a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Viewport {
    /// Full-target viewport.
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Normalized `(x, y, w, h)` against a target extent, as the propagation
    /// shaders consume it.
    pub fn normalized(&self, target_width: u32, target_height: u32) -> [f32; 4] {
        let tw = target_width as f32;
        let th = target_height as f32;
        [
            self.x as f32 / tw,
            self.y as f32 / th,
            self.width as f32 / tw,
            self.height as f32 / th,
        ]
    }

    /// Width over height.
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Per-eye camera state. Stereo uses two of these over disjoint
/// half-viewports of one shared target.
#[derive(Debug, Clone, Copy)]
pub struct EyeView {
    /// Projection matrix.
    pub projection: Mat4,
    /// Orthographic (`true`) or perspective projection.
    pub is_orthographic: bool,
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
    /// Fog onset distance.
    pub fog_near: f32,
    /// Full-fog distance.
    pub fog_far: f32,
    /// The eye's viewport within the shared target.
    pub viewport: Viewport,
}

impl EyeView {
    /// Inverse projection, computed here so passes never invert per tap.
    pub fn inv_projection(&self) -> Mat4 {
        self.projection.inverse()
    }

    /// Projection slope term of the cutaway carve: 0 under orthographic,
    /// `(near + far) / (near - far)` under perspective.
    pub fn pmsz(&self) -> f32 {
        if self.is_orthographic {
            0.0
        } else {
            (self.near + self.far) / (self.near - self.far)
        }
    }

    /// Orthographic flag as the shaders consume it.
    pub fn is_ortho_uniform(&self) -> f32 {
        if self.is_orthographic {
            1.0
        } else {
            0.0
        }
    }

    /// Pixels per view-space unit at unit distance: scales the occlusion
    /// radius into a screen disk. Derived from the projection's y scale.
    pub fn projection_scale(&self) -> f32 {
        0.5 * self.viewport.height as f32 * self.projection.col(1).y
    }

    /// View-space width of the widest on-screen pixel, probed at the near
    /// plane by unprojecting two adjacent bottom-row pixels. Converts the
    /// dynamic outline's view radius into a jump-flood step count.
    pub fn max_pixel_view_radius(&self) -> f32 {
        let w = self.viewport.width as f32;
        let h = self.viewport.height as f32;
        let inv = self.inv_projection();

        let coord0 = inv * Vec4::new(-1.0, -1.0 + 1.0 / h, -1.0, 1.0);
        let coord1 = inv * Vec4::new(-1.0 + 2.0 / w, -1.0 + 1.0 / h, -1.0, 1.0);
        (coord0.x / coord0.w - coord1.x / coord1.w).abs()
    }
}

/// One frame's worth of eyes.
#[derive(Debug, Clone, Copy)]
pub enum FrameView {
    /// Single camera over the full target.
    Mono(EyeView),
    /// Two cameras over disjoint half-viewports of one shared target.
    Stereo {
        /// Left-half eye.
        left: EyeView,
        /// Right-half eye.
        right: EyeView,
    },
}

impl FrameView {
    /// The eyes in draw order.
    pub fn eyes(&self) -> impl Iterator<Item = &EyeView> {
        match self {
            Self::Mono(eye) => [Some(eye), None],
            Self::Stereo { left, right } => [Some(left), Some(right)],
        }
        .into_iter()
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eye(viewport: Viewport) -> EyeView {
        EyeView {
            projection: Mat4::perspective_rh(
                std::f32::consts::FRAC_PI_3,
                viewport.aspect(),
                0.1,
                100.0,
            ),
            is_orthographic: false,
            near: 0.1,
            far: 100.0,
            fog_near: 50.0,
            fog_far: 100.0,
            viewport,
        }
    }

    #[test]
    fn normalized_viewport_splits_stereo_halves() {
        let left = Viewport {
            x: 0,
            y: 0,
            width: 400,
            height: 600,
        };
        let right = Viewport {
            x: 400,
            y: 0,
            width: 400,
            height: 600,
        };
        assert_eq!(left.normalized(800, 600), [0.0, 0.0, 0.5, 1.0]);
        assert_eq!(right.normalized(800, 600), [0.5, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn pmsz_is_zero_under_orthographic() {
        let mut e = eye(Viewport::full(800, 600));
        assert!(e.pmsz() < 0.0);
        e.is_orthographic = true;
        assert_eq!(e.pmsz(), 0.0);
    }

    #[test]
    fn frame_view_eye_counts() {
        let e = eye(Viewport::full(800, 600));
        assert_eq!(FrameView::Mono(e).eyes().count(), 1);
        assert_eq!(
            FrameView::Stereo { left: e, right: e }.eyes().count(),
            2
        );
    }

    #[test]
    fn max_pixel_view_radius_shrinks_with_resolution() {
        let coarse = eye(Viewport::full(400, 300)).max_pixel_view_radius();
        let fine = eye(Viewport::full(1600, 1200)).max_pixel_view_radius();
        assert!(coarse > fine);
        assert!(fine > 0.0);
    }
}
