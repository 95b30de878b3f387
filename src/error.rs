//! Crate-level error types.

use std::fmt;

use crate::gpu::render_context::RenderContextError;
use crate::gpu::shader_composer::ShaderError;

/// Errors produced while constructing or driving the pipeline.
#[derive(Debug)]
pub enum InciseError {
    /// GPU context initialization failure.
    Gpu(RenderContextError),
    /// Shader composition failure.
    Shader(ShaderError),
    /// A frame request violated a construction-time precondition.
    Render(RenderError),
}

impl fmt::Display for InciseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu(e) => write!(f, "GPU error: {e}"),
            Self::Shader(e) => write!(f, "shader error: {e}"),
            Self::Render(e) => write!(f, "render error: {e}"),
        }
    }
}

impl std::error::Error for InciseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gpu(e) => Some(e),
            Self::Shader(e) => Some(e),
            Self::Render(e) => Some(e),
        }
    }
}

impl From<RenderContextError> for InciseError {
    fn from(e: RenderContextError) -> Self {
        Self::Gpu(e)
    }
}

impl From<ShaderError> for InciseError {
    fn from(e: ShaderError) -> Self {
        Self::Shader(e)
    }
}

impl From<RenderError> for InciseError {
    fn from(e: RenderError) -> Self {
        Self::Render(e)
    }
}

/// Per-frame hard failures. These are programming errors surfaced before any
/// GPU submission; the frame is simply not rendered. There is no partial
/// recovery and no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    /// Weighted-blended OIT was requested although the capability probe
    /// reported it unsupported.
    WboitUnsupported,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WboitUnsupported => write!(
                f,
                "weighted-blended transparency requested without backend \
                 support"
            ),
        }
    }
}

impl std::error::Error for RenderError {}
