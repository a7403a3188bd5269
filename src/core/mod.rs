/*!
 * Core Module
 * Fundamental power service types, configuration and error handling
 */

pub mod config;
pub mod errors;
pub mod id;
pub mod limits;
pub mod state_machine;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use config::PowerConfig;
pub use errors::*;
pub use id::{ClientHandle, HandleAllocator};
pub use state_machine::StandaloneStateMachine;
pub use traits::*;
pub use types::*;
