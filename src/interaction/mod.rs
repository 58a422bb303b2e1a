//! Human-in-the-loop interaction checkpoints.
//!
//! - `model`: request/response wire types
//! - `broker`: per-slot pending-request registry with abort handling
//! - `hooks`: the handle an agent engine uses to ask for input

pub mod broker;
pub mod hooks;
pub mod model;

pub use broker::{ExecutionRef, InteractionBroker, ReplyKey};
pub use hooks::InteractionHooks;
pub use model::{
    InteractType, InteractionPayload, InteractionRequest, InteractionResponse, RespondOutcome,
};
