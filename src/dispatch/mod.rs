//! Server response handling
//!
//! The dispatcher applies each received message to the shared response
//! state, feeds audio to playback and owns the receive loop with its
//! termination rules (AI_END grace window, non-progress valve, abort).

pub mod dispatcher;

pub use dispatcher::{DispatchSettings, Dispatcher, ResponseEvent, Step, Termination};
