//! Core building blocks for SketchSync: the event dispatcher, the command
//! envelope wire protocol, configuration, and shared error types.

pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
