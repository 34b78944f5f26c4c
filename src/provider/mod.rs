//! HTTP plumbing for the Ark REST endpoints (chat, images).

pub mod ark;
pub mod http;

pub use ark::{ArkClient, DEFAULT_BASE_URL};
