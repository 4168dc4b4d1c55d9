//! API handlers.

pub mod commands;
pub mod devices;
pub mod discovery;
pub mod events;
pub mod version;
