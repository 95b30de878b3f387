//! WGSL composition with `#import` support via `naga_oil`.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use naga_oil::compose::{
    ComposableModuleDescriptor, Composer, NagaModuleDescriptor,
    ShaderDefValue, ShaderLanguage, ShaderType,
};

/// Every screen-space pass shader in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shader {
    /// Cutaway jump-flood seeding from the cutaway depth capture.
    CutawayInit,
    /// One cutaway jump-flood step (cone-carving comparator).
    CutawayJfa,
    /// Cutaway boundary resolve to packed depth.
    CutawayResolve,
    /// Depth-discontinuity detection (outline seeds).
    OutlineInit,
    /// Fixed-pixel-radius outline expansion.
    OutlineStatic,
    /// One dynamic-outline jump-flood step.
    OutlineJfa,
    /// Scalable ambient obscurance.
    Ssao,
    /// Depth-aware separable occlusion blur.
    SsaoBlur,
    /// One level of the depth pyramid (rotated-grid subsample).
    HizBuild,
    /// Primitive/volume depth unification.
    DepthMergeScene,
    /// Outline depth folded into the canonical depth.
    DepthMergeOutline,
    /// Final occlusion/outline/fog combine.
    Postprocess,
    /// Weighted-blended OIT resolve.
    OitResolve,
    /// Fast approximate antialiasing.
    Fxaa,
    /// Plain copy to the output (antialiasing off).
    Blit,
}

impl Shader {
    fn source(self) -> (&'static str, &'static str) {
        match self {
            Self::CutawayInit => (
                include_str!("../../assets/shaders/screen/cutaway_init.wgsl"),
                "cutaway_init.wgsl",
            ),
            Self::CutawayJfa => (
                include_str!("../../assets/shaders/screen/cutaway_jfa.wgsl"),
                "cutaway_jfa.wgsl",
            ),
            Self::CutawayResolve => (
                include_str!(
                    "../../assets/shaders/screen/cutaway_resolve.wgsl"
                ),
                "cutaway_resolve.wgsl",
            ),
            Self::OutlineInit => (
                include_str!("../../assets/shaders/screen/outline_init.wgsl"),
                "outline_init.wgsl",
            ),
            Self::OutlineStatic => (
                include_str!(
                    "../../assets/shaders/screen/outline_static.wgsl"
                ),
                "outline_static.wgsl",
            ),
            Self::OutlineJfa => (
                include_str!("../../assets/shaders/screen/outline_jfa.wgsl"),
                "outline_jfa.wgsl",
            ),
            Self::Ssao => (
                include_str!("../../assets/shaders/screen/ssao.wgsl"),
                "ssao.wgsl",
            ),
            Self::SsaoBlur => (
                include_str!("../../assets/shaders/screen/ssao_blur.wgsl"),
                "ssao_blur.wgsl",
            ),
            Self::HizBuild => (
                include_str!("../../assets/shaders/screen/hiz_build.wgsl"),
                "hiz_build.wgsl",
            ),
            Self::DepthMergeScene => (
                include_str!(
                    "../../assets/shaders/screen/depth_merge_scene.wgsl"
                ),
                "depth_merge_scene.wgsl",
            ),
            Self::DepthMergeOutline => (
                include_str!(
                    "../../assets/shaders/screen/depth_merge_outline.wgsl"
                ),
                "depth_merge_outline.wgsl",
            ),
            Self::Postprocess => (
                include_str!("../../assets/shaders/screen/postprocess.wgsl"),
                "postprocess.wgsl",
            ),
            Self::OitResolve => (
                include_str!("../../assets/shaders/screen/oit_resolve.wgsl"),
                "oit_resolve.wgsl",
            ),
            Self::Fxaa => (
                include_str!("../../assets/shaders/screen/fxaa.wgsl"),
                "fxaa.wgsl",
            ),
            Self::Blit => (
                include_str!("../../assets/shaders/screen/blit.wgsl"),
                "blit.wgsl",
            ),
        }
    }

    /// Human-readable label used for the wgpu shader module.
    pub fn label(self) -> &'static str {
        self.source().1
    }
}

/// Shader composition failure.
#[derive(Debug)]
pub enum ShaderError {
    /// A shared `#import` module failed to register.
    Register {
        /// Module file path.
        module: &'static str,
        /// Composer diagnostic.
        message: String,
    },
    /// A pass shader failed to compose.
    Compose {
        /// Shader file path.
        shader: &'static str,
        /// Composer diagnostic.
        message: String,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register { module, message } => write!(
                f,
                "failed to register shader module '{module}': {message}"
            ),
            Self::Compose { shader, message } => {
                write!(f, "failed to compose shader '{shader}': {message}")
            }
        }
    }
}

impl std::error::Error for ShaderError {}

/// Shared module definition: source plus its import path.
struct ModuleDef {
    source: &'static str,
    file_path: &'static str,
}

/// Wraps [`naga_oil::compose::Composer`] with the crate's shared WGSL modules
/// pre-loaded. Pass shaders pull them in with `#import incise::module_name`.
/// Composition produces `naga::Module` IR directly, skipping a WGSL re-parse
/// at pipeline creation.
pub struct ShaderComposer {
    composer: Composer,
}

impl ShaderComposer {
    /// Register the shared modules in dependency order.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::Register`] if a shared module fails to parse —
    /// a build defect, not a runtime condition.
    pub fn new() -> Result<Self, ShaderError> {
        let mut composer = Composer::default();

        let modules: &[ModuleDef] = &[
            ModuleDef {
                source: include_str!(
                    "../../assets/shaders/modules/fullscreen.wgsl"
                ),
                file_path: "modules/fullscreen.wgsl",
            },
            ModuleDef {
                source: include_str!(
                    "../../assets/shaders/modules/packing.wgsl"
                ),
                file_path: "modules/packing.wgsl",
            },
            ModuleDef {
                source: include_str!("../../assets/shaders/modules/view.wgsl"),
                file_path: "modules/view.wgsl",
            },
        ];

        for m in modules {
            let _ = composer
                .add_composable_module(ComposableModuleDescriptor {
                    source: m.source,
                    file_path: m.file_path,
                    language: ShaderLanguage::Wgsl,
                    ..Default::default()
                })
                .map_err(|e| ShaderError::Register {
                    module: m.file_path,
                    message: e.to_string(),
                })?;
        }

        Ok(Self { composer })
    }

    /// Compose a pass shader into a `wgpu::ShaderModule`, activating the
    /// given boolean shader defs.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::Compose`] on a composition failure.
    pub fn compose(
        &mut self,
        device: &wgpu::Device,
        shader: Shader,
        defs: &[&str],
    ) -> Result<wgpu::ShaderModule, ShaderError> {
        let naga_module = self.compose_naga(shader, defs)?;
        Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(shader.label()),
            source: wgpu::ShaderSource::Naga(Cow::Owned(naga_module)),
        }))
    }

    /// Compose into `naga::Module` IR without a device. Used by tests to
    /// validate every shader variant on CPU.
    ///
    /// # Errors
    ///
    /// Returns [`ShaderError::Compose`] on a composition failure.
    pub fn compose_naga(
        &mut self,
        shader: Shader,
        defs: &[&str],
    ) -> Result<naga::Module, ShaderError> {
        let (source, file_path) = shader.source();
        let shader_defs: HashMap<String, ShaderDefValue> = defs
            .iter()
            .map(|name| ((*name).to_owned(), ShaderDefValue::Bool(true)))
            .collect();

        self.composer
            .make_naga_module(NagaModuleDescriptor {
                source,
                file_path,
                shader_type: ShaderType::Wgsl,
                shader_defs,
                ..Default::default()
            })
            .map_err(|e| ShaderError::Compose {
                shader: file_path,
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compose(shader: Shader, defs: &[&str]) {
        let mut composer = match ShaderComposer::new() {
            Ok(c) => c,
            Err(e) => panic!("shared modules failed to register: {e}"),
        };
        if let Err(e) = composer.compose_naga(shader, defs) {
            panic!("{shader:?} with defs {defs:?} failed to compose: {e}");
        }
    }

    #[test]
    fn cutaway_shaders_compose() {
        compose(Shader::CutawayInit, &[]);
        compose(Shader::CutawayInit, &["PACKED_DEPTH"]);
        compose(Shader::CutawayJfa, &[]);
        compose(Shader::CutawayResolve, &[]);
    }

    #[test]
    fn outline_shaders_compose() {
        compose(Shader::OutlineInit, &[]);
        compose(Shader::OutlineInit, &["DYNAMIC_WIDTH"]);
        compose(Shader::OutlineStatic, &[]);
        compose(Shader::OutlineJfa, &[]);
    }

    #[test]
    fn occlusion_shaders_compose() {
        compose(Shader::Ssao, &[]);
        compose(Shader::SsaoBlur, &[]);
        compose(Shader::HizBuild, &[]);
    }

    #[test]
    fn merge_shaders_compose() {
        compose(Shader::DepthMergeScene, &[]);
        compose(Shader::DepthMergeScene, &["PACKED_DEPTH"]);
        compose(Shader::DepthMergeOutline, &[]);
        compose(Shader::DepthMergeOutline, &["OUTLINE_DYNAMIC"]);
    }

    #[test]
    fn postprocess_variants_compose() {
        compose(Shader::Postprocess, &[]);
        compose(Shader::Postprocess, &["OCCLUSION_ENABLE"]);
        compose(Shader::Postprocess, &["OUTLINE_ENABLE"]);
        compose(Shader::Postprocess, &["OUTLINE_ENABLE", "OUTLINE_DYNAMIC"]);
        compose(Shader::Postprocess, &["OCCLUSION_ENABLE", "OUTLINE_ENABLE"]);
        compose(
            Shader::Postprocess,
            &["OCCLUSION_ENABLE", "OUTLINE_ENABLE", "OUTLINE_DYNAMIC"],
        );
    }

    #[test]
    fn composite_shaders_compose() {
        compose(Shader::OitResolve, &[]);
        compose(Shader::Fxaa, &[]);
        compose(Shader::Blit, &[]);
    }
}
