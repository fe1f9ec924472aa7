//! Authentication
//!
//! - [`JwtService`] - token issue and validation
//! - [`CurrentUser`] - validated request identity
//! - [`extractor`] - axum extractor wiring

pub mod extractor;
pub mod jwt;

pub use jwt::{Claims, CurrentUser, JwtError, JwtService};
