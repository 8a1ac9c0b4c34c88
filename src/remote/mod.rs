//! Remote country and university sources.

pub mod api_types;
mod client;

pub use api_types::{ApiCountry, ApiUniversity};
pub use client::{RemoteClient, RemoteSource};
