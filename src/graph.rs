//! Conversation graph
//!
//! A thread is driven by a small directed graph with two node kinds: a
//! chat node (`LlmRequesting`) and a tools node (`ToolExecuting`). The
//! single conditional edge lives in the transition function: an LLM
//! response that carries tool calls routes to the tools node, whose
//! results route back to the chat node; a response without tool calls
//! ends the turn.
//!
//! Transitions are pure: `(state, event) -> (new state, effects)`, with
//! all I/O expressed as effects executed by the runtime.

pub mod effect;
pub mod event;
pub mod state;
pub mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{ThreadContext, ThreadState, ToolCall, ToolInput};
pub use transition::{transition, TransitionError, TransitionResult};
