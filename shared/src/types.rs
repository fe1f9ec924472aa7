//! Domain types shared between server and clients
//!
//! All monetary amounts are signed integers in minor currency units.
//! All timestamps are Unix milliseconds (UTC).

use serde::{Deserialize, Serialize};

/// Timestamp type (Unix milliseconds)
pub type Timestamp = i64;

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    Driver,
    Admin,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Customer => write!(f, "customer"),
            UserRole::Driver => write!(f, "driver"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(UserRole::Customer),
            "driver" => Ok(UserRole::Driver),
            "admin" => Ok(UserRole::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Platform user (identity minted externally, managed here for
/// activation state and role checks)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: Timestamp,
}

/// WGS-84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Order kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Taxi,
    Delivery,
}

/// Order lifecycle status
///
/// Transitions are enforced by the server-side state machine; clients
/// only ever observe these values, never set them directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Accepted,
    EnRoute,
    Arrived,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Whether the order has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::EnRoute => "en_route",
            OrderStatus::Arrived => "arrived",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A ride or delivery request, tracked through its lifecycle
///
/// Mutated only through the order manager's transition operations;
/// `commission_amount` is snapshotted from platform settings at creation
/// and never re-read afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub customer_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<i64>,

    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropoff_address: Option<String>,

    pub commission_amount: i64,

    // Delivery extras
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_description: Option<String>,

    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
}

/// Driver prepaid wallet
///
/// `balance` is the sum of all committed ledger entries for the driver.
/// A deactivated wallet blocks new debits but preserves history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletAccount {
    pub driver_id: i64,
    pub balance: i64,
    pub is_active: bool,
    pub updated_at: Timestamp,
}

/// Reason for a ledger movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    Commission,
    Refund,
    Topup,
    Adjustment,
}

/// Append-only wallet movement record
///
/// `balance_after` is the authoritative snapshot immediately after this
/// entry; entries for one driver form a causally ordered chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: u64,
    pub driver_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<u64>,
    pub delta: i64,
    pub balance_after: i64,
    pub reason: LedgerReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: Timestamp,
}

/// One record per status transition, written in the same atomic unit as
/// the transition itself. `from_status` is `None` for the creation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryRecord {
    pub order_id: u64,
    pub seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub actor_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub timestamp: Timestamp,
}

/// Customer rating for a completed order (one per order)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub order_id: u64,
    pub customer_id: i64,
    pub driver_id: i64,
    pub stars: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: Timestamp,
}

/// Platform settings, admin-mutable
///
/// Read at order creation (commission snapshot) and by the dispatch
/// eligibility filter; changes are never retroactive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSettings {
    pub commission_amount: i64,
    pub min_wallet_floor: i64,
    pub updated_at: Timestamp,
}
