//! Core type definitions for Joey AI

pub mod conversation;
pub mod health;
pub mod message;
pub mod payload;

// Re-export commonly used types
pub use conversation::*;
pub use health::*;
pub use message::*;
pub use payload::*;
