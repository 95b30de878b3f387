//! Device plumbing: context, capability probe, render targets, shader
//! composition, and pipeline boilerplate.

pub mod capabilities;
pub mod pipeline_helpers;
pub mod render_context;
pub mod render_target;
pub mod shader_composer;
