//! Shared types for the Mishwar dispatch platform
//!
//! Domain types, stream message definitions and the unified error system
//! used by the server and by clients.

pub mod error;
pub mod message;
pub mod types;
pub mod util;

pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
pub use message::StreamMessage;
pub use types::{
    GeoPoint, LedgerEntry, LedgerReason, Order, OrderStatus, OrderType, PlatformSettings, Rating,
    StatusHistoryRecord, User, UserRole, WalletAccount,
};
