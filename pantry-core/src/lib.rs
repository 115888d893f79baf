//! Pantry core library exports

pub mod config;
pub mod error;
pub mod index;
pub mod manifest;
pub mod publisher;
pub mod registry;
pub mod service;
pub mod source;
pub mod sync;
