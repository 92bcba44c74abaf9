//! Shared types, configuration and persistence plumbing for fairpush.

pub mod config;
pub mod db;
pub mod error;
pub mod types;
