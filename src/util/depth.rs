//! CPU mirrors of the WGSL depth and packing helpers.
//!
//! The uniform-preparation code and the tests share these with the shaders in
//! `assets/shaders/modules/`, so the two sides of the pipeline agree on the
//! exact math. The external shading stage also needs them to interpret the
//! packed cutaway boundary.

use glam::{Mat4, Vec3, Vec4};

/// Pack a unit-interval depth into four 8-bit fixed-point channels.
pub fn pack_depth_to_rgba(depth: f32) -> [f32; 4] {
    let mut enc = [
        (depth).fract(),
        (depth * 255.0).fract(),
        (depth * 65025.0).fract(),
        (depth * 16_581_375.0).fract(),
    ];
    enc[0] -= enc[1] / 255.0;
    enc[1] -= enc[2] / 255.0;
    enc[2] -= enc[3] / 255.0;
    enc
}

/// Inverse of [`pack_depth_to_rgba`].
pub fn unpack_rgba_to_depth(packed: [f32; 4]) -> f32 {
    packed[0]
        + packed[1] / 255.0
        + packed[2] / 65025.0
        + packed[3] / 16_581_375.0
}

/// Pack a unit-interval value into two 8-bit fixed-point channels.
pub fn pack_unit_to_rg(value: f32) -> [f32; 2] {
    let mut enc = [value.fract(), (value * 255.0).fract()];
    enc[0] -= enc[1] / 255.0;
    enc
}

/// Inverse of [`pack_unit_to_rg`].
pub fn unpack_rg_to_unit(packed: [f32; 2]) -> f32 {
    packed[0] + packed[1] / 255.0
}

/// Quantize a channel to 8 bits, as storing into an `Rgba8Unorm` target does.
pub fn quantize8(value: f32) -> f32 {
    (value * 255.0).round() / 255.0
}

/// Projected depth to positive view-axis distance, perspective projection.
pub fn perspective_depth_to_view_dist(depth: f32, near: f32, far: f32) -> f32 {
    (near * far) / (far - (far - near) * depth)
}

/// Projected depth to positive view-axis distance, orthographic projection.
pub fn orthographic_depth_to_view_dist(depth: f32, near: f32, far: f32) -> f32 {
    near + depth * (far - near)
}

/// Positive view-axis distance to projected depth, perspective projection.
pub fn view_dist_to_perspective_depth(dist: f32, near: f32, far: f32) -> f32 {
    far * (dist - near) / (dist * (far - near))
}

/// Positive view-axis distance to projected depth, orthographic projection.
pub fn view_dist_to_orthographic_depth(dist: f32, near: f32, far: f32) -> f32 {
    (dist - near) / (far - near)
}

/// Unproject a screen-space point (xy in `[0, 1]`, z projected depth) into
/// view space.
pub fn screen_to_view(coords: Vec3, inv_projection: Mat4) -> Vec3 {
    let ndc = Vec4::new(
        coords.x * 2.0 - 1.0,
        coords.y * 2.0 - 1.0,
        coords.z * 2.0 - 1.0,
        1.0,
    );
    let view = inv_projection * ndc;
    view.truncate() / view.w
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_pack_round_trips_through_quantization() {
        for depth in [0.0, 0.125, 0.5, 0.733, 0.99, 0.999_99] {
            let packed = pack_depth_to_rgba(depth);
            let stored = packed.map(quantize8);
            let unpacked = unpack_rgba_to_depth(stored);
            assert!(
                (unpacked - depth).abs() < 1e-5,
                "depth {depth} unpacked as {unpacked}"
            );
        }
    }

    #[test]
    fn rg_pack_round_trips_through_quantization() {
        for value in [0.0, 0.25, 0.5, 0.875, 0.996] {
            let packed = pack_unit_to_rg(value);
            let stored = packed.map(quantize8);
            let unpacked = unpack_rg_to_unit(stored);
            assert!(
                (unpacked - value).abs() < 3e-3,
                "value {value} unpacked as {unpacked}"
            );
        }
    }

    #[test]
    fn depth_one_packs_to_zero() {
        // fract(1.0) == 0, so the background sentinel packs to black; the
        // boundary consumers treat an unpacked 0 as "nothing to carve".
        assert_eq!(pack_depth_to_rgba(1.0), [0.0; 4]);
    }

    #[test]
    fn perspective_depth_view_dist_round_trip() {
        let (near, far) = (0.1, 1000.0);
        for depth in [0.0, 0.4, 0.9, 1.0] {
            let dist = perspective_depth_to_view_dist(depth, near, far);
            assert!(dist >= near - 1e-4 && dist <= far + 1e-2);
            let back = view_dist_to_perspective_depth(dist, near, far);
            assert!((back - depth).abs() < 1e-4);
        }
        assert!(
            (perspective_depth_to_view_dist(0.0, near, far) - near).abs()
                < 1e-6
        );
        assert!(
            (perspective_depth_to_view_dist(1.0, near, far) - far).abs() < 1e-2
        );
    }

    #[test]
    fn orthographic_depth_view_dist_round_trip() {
        let (near, far) = (1.0, 100.0);
        for depth in [0.0, 0.3, 0.75, 1.0] {
            let dist = orthographic_depth_to_view_dist(depth, near, far);
            let back = view_dist_to_orthographic_depth(dist, near, far);
            assert!((back - depth).abs() < 1e-6);
        }
    }

    #[test]
    fn screen_center_unprojects_onto_view_axis() {
        let proj =
            Mat4::perspective_rh(std::f32::consts::FRAC_PI_3, 1.0, 0.1, 100.0);
        let view = screen_to_view(Vec3::new(0.5, 0.5, 0.5), proj.inverse());
        assert!(view.x.abs() < 1e-4 && view.y.abs() < 1e-4);
        assert!(view.z < 0.0);
    }
}
