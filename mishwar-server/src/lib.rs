//! Mishwar dispatch server
//!
//! # Module structure
//!
//! ```text
//! mishwar-server/src/
//! ├── core/      # configuration, shared state
//! ├── store/     # redb storage layer
//! ├── ledger/    # driver wallet ledger
//! ├── orders/    # order state machine and manager
//! ├── dispatch/  # new-order fan-out, driver eligibility
//! ├── live/      # presence registry and event routing
//! ├── ratings/   # one rating per completed order
//! ├── audit/     # read-only reporting projections
//! ├── auth/      # JWT validation, request identity
//! └── api/       # HTTP routes and handlers
//! ```
//!
//! Every multi-record invariant (order acceptance plus the commission
//! debit plus the history record) commits in a single storage
//! transaction; the live layer only ever observes committed state.

pub mod api;
pub mod audit;
pub mod auth;
pub mod core;
pub mod dispatch;
pub mod ledger;
pub mod live;
pub mod orders;
pub mod ratings;
pub mod store;

pub use auth::{CurrentUser, JwtService};
pub use core::{AppState, Config};
pub use dispatch::Dispatch;
pub use ledger::Ledger;
pub use live::EventHub;
pub use orders::OrderManager;
pub use store::Store;
