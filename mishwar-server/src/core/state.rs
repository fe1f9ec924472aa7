//! Shared application state

use shared::types::PlatformSettings;
use shared::util::now_millis;

use crate::audit::Audit;
use crate::auth::JwtService;
use crate::core::Config;
use crate::dispatch::Dispatch;
use crate::ledger::Ledger;
use crate::live::EventHub;
use crate::orders::OrderManager;
use crate::ratings::Ratings;
use crate::store::Store;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub ledger: Ledger,
    pub orders: OrderManager,
    pub dispatch: Dispatch,
    pub ratings: Ratings,
    pub audit: Audit,
    pub hub: EventHub,
    pub jwt: JwtService,
}

impl AppState {
    /// Open storage and wire up all services
    pub fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = Store::open(config.db_path())?;
        Self::with_store(config, store)
    }

    /// Build state over an existing store (tests use an in-memory one)
    pub fn with_store(config: Config, store: Store) -> anyhow::Result<Self> {
        let defaults = PlatformSettings {
            commission_amount: config.default_commission_amount,
            min_wallet_floor: config.default_min_wallet_floor,
            updated_at: now_millis(),
        };

        let ledger = Ledger::new(store.clone(), defaults.clone());
        let orders = OrderManager::new(store.clone(), ledger.clone(), defaults);
        let hub = EventHub::new();
        let dispatch = Dispatch::new(store.clone(), ledger.clone(), hub.clone());
        let ratings = Ratings::new(store.clone());
        let audit = Audit::new(store.clone());
        let jwt = JwtService::new(&config.jwt_secret, config.jwt_expiration_minutes);

        Ok(Self {
            config,
            store,
            ledger,
            orders,
            dispatch,
            ratings,
            audit,
            hub,
            jwt,
        })
    }
}
