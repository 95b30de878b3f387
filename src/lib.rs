// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
// Documentation
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Unused / redundant code
#![deny(unused_results)]
#![deny(unused_qualifications)]
// Cast hygiene
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
// GPU / graphics allowances — casts are intentional and safe
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_lossless)]
// Float comparison: graphics math frequently compares against 0.0, 1.0, etc.
#![allow(clippy::float_cmp)]
// Pedantic allowances
#![allow(clippy::similar_names)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::too_many_lines)]

//! Multi-pass GPU compositing pipeline for molecular-style visualization,
//! built on wgpu.
//!
//! Incise composites opaque, volumetric, and transparent geometry into a
//! final color image while applying screen-space effects: an adaptive
//! "cutaway" that carves cone-shaped openings around flagged geometry, edge
//! outlining (fixed pixel width or view-space-constant width), spiral-tap
//! ambient occlusion with a depth-aware blur, and order-independent
//! transparency. The heavy lifting is a reusable jump-flood propagation
//! engine used by three passes with different payload semantics.
//!
//! # Key entry points
//!
//! - [`renderer::draw::DrawPass`] - the frame orchestrator
//! - [`scene::GeometryRenderer`] - the seam the scene layer implements
//! - [`options::Options`] - the hot-reconfigurable effect surface
//! - [`gpu::capabilities::Capabilities`] - the one-shot backend probe
//!
//! # Architecture
//!
//! All passes are issued from one control thread in program order; buffer
//! ordering comes from pass sequencing, never from locks. Stereo renders
//! each eye into a disjoint half-viewport of shared targets; the propagation
//! engine skips neighbors outside the logical viewport so eyes never bleed
//! into each other. Backend capabilities are probed once at construction
//! and select fixed strategies (native versus packed depth capture,
//! cutaway/dynamic-outline availability, WBOIT); per-frame configuration
//! only picks among precompiled pass variants.

pub mod error;
pub mod gpu;
pub mod options;
pub mod renderer;
pub mod scene;
pub mod util;
pub mod view;

pub use error::{InciseError, RenderError};
