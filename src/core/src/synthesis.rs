//! Synthesis subsystem.
//!
//! Runs the image-synthesis step of a try-on session: either the external
//! collaborator process or, in simulation mode, local placeholder generation.
//! Every run is bounded by a timeout and a cancellation token, and runs that
//! share the collaborator's fixed output directory are serialized.
//!
//! Re-exports:
//! - [`SynthesisManager`]: main entry point.
//! - [`GenerationParams`], [`SynthesisJob`], [`SynthesisRuntime`], [`SynthesisStats`]: core types.

pub mod placeholder;
pub mod synthesis_manager;
pub mod types;

pub use synthesis_manager::{format_scale, SynthesisManager};
pub use types::{GenerationParams, SynthesisJob, SynthesisRuntime, SynthesisStats};
