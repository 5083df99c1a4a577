//! JSON HTTP surface over the analytics engine.

pub mod rest;
pub mod server;

pub use rest::AppState;
pub use server::{router, ApiServer};
