//! Order lifecycle
//!
//! - [`machine`] - allowed-edge table for status transitions
//! - [`manager`] - atomic transition operations over the store

pub mod machine;
pub mod manager;

pub use manager::{Actor, CreateOrder, OrderError, OrderManager};
