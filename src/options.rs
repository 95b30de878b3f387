//! Hot-reconfigurable effect parameters.
//!
//! Every group is applied per frame without a pipeline rebuild. Numeric
//! ranges are declared here for the configuration surface; the core treats
//! out-of-range values as a precondition violation of the configuration
//! layer and does not re-validate them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Adaptive cutaway parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct CutawayOptions {
    /// Cutaway half-angle in degrees. Converted to radians at the uniform
    /// boundary; everything internal is radians.
    #[schemars(title = "Angle", range(min = 0.0, max = 90.0))]
    pub angle_deg: f32,
    /// Fraction of the viewport over which the angle tapers to zero near
    /// screen edges.
    #[schemars(title = "Border Size", range(min = 0.0, max = 0.1))]
    pub border_size: f32,
    /// Carve start offset as a fraction of the scene bounding radius.
    #[schemars(title = "Slope Offset", range(min = 0.0, max = 1.0))]
    pub slope_offset: f32,
}

impl Default for CutawayOptions {
    fn default() -> Self {
        Self {
            angle_deg: 45.0,
            border_size: 0.05,
            slope_offset: 0.0,
        }
    }
}

impl CutawayOptions {
    /// Half-angle in radians.
    pub fn angle(&self) -> f32 {
        self.angle_deg.to_radians()
    }
}

/// Which outline variant runs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum OutlineMode {
    /// No outlines.
    Off,
    /// Fixed pixel width.
    Static,
    /// View-space-constant width via jump-flood propagation.
    Dynamic,
}

/// Outline parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct OutlineOptions {
    /// Outline variant.
    #[schemars(title = "Mode")]
    pub mode: OutlineMode,
    /// Static-variant width in pixels.
    #[schemars(title = "Width", range(min = 1.0, max = 5.0))]
    pub width: f32,
    /// Dynamic-variant width as a fraction of the scene bounding radius.
    #[schemars(title = "Dynamic Width", range(min = 0.001, max = 0.05))]
    pub dynamic_width: f32,
    /// Depth-discontinuity sharpness. The view-z threshold is
    /// `(1000^t / 1000) * (far - near)`.
    #[schemars(title = "Threshold", range(min = 0.01, max = 1.0))]
    pub threshold: f32,
}

impl Default for OutlineOptions {
    fn default() -> Self {
        Self {
            mode: OutlineMode::Off,
            width: 1.0,
            dynamic_width: 0.005,
            threshold: 0.33,
        }
    }
}

impl OutlineOptions {
    /// Maximum view-z difference still considered one surface.
    pub fn max_view_z_diff(&self, near: f32, far: f32) -> f32 {
        let factor = 1000.0f32.powf(self.threshold) / 1000.0;
        factor * (far - near)
    }
}

/// Ambient occlusion parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct OcclusionOptions {
    /// Master switch.
    #[schemars(title = "Enabled")]
    pub enabled: bool,
    /// Spiral tap count per pixel.
    #[schemars(title = "Samples", range(min = 1, max = 256))]
    pub samples: u32,
    /// Radius exponent: the view-space radius is `2^x`.
    #[schemars(title = "Radius", range(min = 0.0, max = 10.0))]
    pub radius_exp: f32,
    /// Tangent-plane bias against self-occlusion.
    #[schemars(title = "Bias", range(min = 0.0, max = 3.0))]
    pub bias: f32,
    /// Obscurance strength.
    #[schemars(title = "Intensity", range(min = 0.0, max = 4.0))]
    pub intensity: f32,
    /// Depth-aware blur kernel size; odd, taps span the full size.
    #[schemars(title = "Blur Kernel", range(min = 1, max = 25))]
    pub blur_kernel_size: u32,
}

impl Default for OcclusionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            samples: 64,
            radius_exp: 5.0,
            bias: 0.8,
            intensity: 1.0,
            blur_kernel_size: 25,
        }
    }
}

impl OcclusionOptions {
    /// Effective view-space radius.
    pub fn radius(&self) -> f32 {
        2.0f32.powf(self.radius_exp)
    }
}

/// Antialiasing resolve selection. The filters themselves are external
/// collaborators; FXAA ships in-crate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AaMode {
    /// Straight copy to the output.
    Off,
    /// Fast approximate antialiasing.
    Fxaa,
    /// Subpixel morphological antialiasing, via a registered external
    /// filter. Degrades to off when none is registered.
    Smaa,
}

/// Transparency compositor selection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TransparencyMode {
    /// Classic back-to-front alpha blending.
    Blended,
    /// Weighted-blended order-independent transparency. Requires the wboit
    /// capability; selecting it without is a hard error.
    Wboit,
}

/// The full hot-reconfigurable surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct Options {
    /// Cutaway carving.
    pub cutaway: CutawayOptions,
    /// Outlining.
    pub outline: OutlineOptions,
    /// Ambient occlusion.
    pub occlusion: OcclusionOptions,
    /// Antialiasing resolve.
    pub antialias: AaMode,
    /// Transparency compositor.
    pub transparency: TransparencyMode,
    /// Composite onto a transparent background instead of the fog color.
    pub transparent_background: bool,
    /// Background color, doubling as the fog color.
    pub background_color: [f32; 3],
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cutaway: CutawayOptions::default(),
            outline: OutlineOptions::default(),
            occlusion: OcclusionOptions::default(),
            antialias: AaMode::Fxaa,
            transparency: TransparencyMode::Blended,
            transparent_background: false,
            background_color: [1.0, 1.0, 1.0],
        }
    }
}

impl Options {
    /// Parse options from TOML (preset files).
    ///
    /// # Errors
    ///
    /// Returns the TOML parse error verbatim.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize to TOML.
    ///
    /// # Errors
    ///
    /// Returns the TOML serialization error verbatim.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// JSON Schema for the whole option surface, for configuration UIs.
    ///
    /// # Errors
    ///
    /// Returns the JSON serialization error verbatim.
    pub fn schema_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&schemars::schema_for!(Options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let options = Options::default();
        let text = match options.to_toml_string() {
            Ok(t) => t,
            Err(e) => panic!("serialize failed: {e}"),
        };
        let back = match Options::from_toml_str(&text) {
            Ok(o) => o,
            Err(e) => panic!("parse failed: {e}"),
        };
        assert_eq!(options, back);
    }

    #[test]
    fn angle_converts_to_radians() {
        let cutaway = CutawayOptions {
            angle_deg: 90.0,
            ..Default::default()
        };
        assert!((cutaway.angle() - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn outline_threshold_mapping_matches_reference() {
        let outline = OutlineOptions {
            threshold: 1.0,
            ..Default::default()
        };
        // 1000^1 / 1000 == 1: the whole depth range counts as one surface.
        assert!((outline.max_view_z_diff(0.0, 10.0) - 10.0).abs() < 1e-4);

        let sharp = OutlineOptions {
            threshold: 0.01,
            ..Default::default()
        };
        assert!(sharp.max_view_z_diff(0.0, 10.0) < 0.02);
    }

    #[test]
    fn occlusion_radius_is_exponential() {
        let occlusion = OcclusionOptions {
            radius_exp: 5.0,
            ..Default::default()
        };
        assert_eq!(occlusion.radius(), 32.0);
    }

    #[test]
    fn schema_lists_every_option_group() {
        let schema = match Options::schema_json() {
            Ok(s) => s,
            Err(e) => panic!("schema serialization failed: {e}"),
        };
        for group in ["cutaway", "outline", "occlusion", "antialias"] {
            assert!(schema.contains(group), "schema is missing '{group}'");
        }
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed = match Options::from_toml_str(
            "[outline]\nmode = \"dynamic\"\ndynamic_width = 0.01\n",
        ) {
            Ok(o) => o,
            Err(e) => panic!("parse failed: {e}"),
        };
        assert_eq!(parsed.outline.mode, OutlineMode::Dynamic);
        assert_eq!(parsed.occlusion, OcclusionOptions::default());
    }
}
