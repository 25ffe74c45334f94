//! Joey AI Core
//!
//! Shared building blocks for the Joey AI chat client:
//!
//! - Conversation, message, payload and health types
//! - Typed error taxonomy for transport and send failures
//! - Environment-driven client configuration
//! - Retry with exponential backoff
//! - The delta stream contract and the backend traits
//!
//! # Example
//!
//! ```no_run
//! use joey_core::*;
//!
//! fn main() -> Result<()> {
//!     load_env()?;
//!     init_logging();
//!     let config = ClientConfig::from_env();
//!     config.validate()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod resilience;
pub mod streaming;
pub mod transport;
pub mod types;
pub mod utils;

pub use config::{
    get_env_bool, get_env_float, get_env_int, get_env_or, load_env, load_env_from_path,
    validate_model_name, validate_url, ClientConfig,
};
pub use error::{JoeyError, Result, TerminalFailure, TransportStatus};
pub use resilience::{retry_with_backoff, RetryConfig};
pub use streaming::{collect_stream, create_delta_stream, DeltaStream, StreamEvent, StreamHandler};
pub use transport::{ChatTransport, ConversationStore, HealthProbe};
pub use types::*;
pub use utils::init_logging;
