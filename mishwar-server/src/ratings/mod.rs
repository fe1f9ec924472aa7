//! Ratings
//!
//! One rating per completed order, written by the order's customer.
//! Stored keyed by order id so the one-per-order rule is a plain
//! existence check inside the write transaction.

use shared::types::{OrderStatus, Rating};
use shared::util::now_millis;
use thiserror::Error;

use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum RatingError {
    #[error("Order not found: {0}")]
    OrderNotFound(u64),

    #[error("Order is not completed")]
    NotCompleted,

    #[error("Only the order's customer may rate it")]
    NotYourOrder,

    #[error("Order already rated")]
    AlreadyRated,

    #[error("Stars must be between 1 and 5, got {0}")]
    InvalidStars(u8),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct Ratings {
    store: Store,
}

impl Ratings {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Rate a completed order. Rejected unless the caller is the order's
    /// customer, the order is completed and no rating exists yet.
    pub fn rate(
        &self,
        order_id: u64,
        customer_id: i64,
        stars: u8,
        comment: Option<String>,
    ) -> Result<Rating, RatingError> {
        if !(1..=5).contains(&stars) {
            return Err(RatingError::InvalidStars(stars));
        }

        let txn = self.store.begin_write()?;
        let order = self
            .store
            .get_order_txn(&txn, order_id)?
            .ok_or(RatingError::OrderNotFound(order_id))?;

        if order.customer_id != customer_id {
            return Err(RatingError::NotYourOrder);
        }
        if order.status != OrderStatus::Completed {
            return Err(RatingError::NotCompleted);
        }
        if self.store.get_rating_txn(&txn, order_id)?.is_some() {
            return Err(RatingError::AlreadyRated);
        }

        let rating = Rating {
            order_id,
            customer_id,
            // A completed order always has a driver
            driver_id: order.driver_id.unwrap_or_default(),
            stars,
            comment,
            created_at: now_millis(),
        };
        self.store.put_rating(&txn, &rating)?;
        txn.commit().map_err(StoreError::from)?;

        tracing::info!(order_id, customer_id, stars, "Order rated");
        Ok(rating)
    }

    pub fn for_order(&self, order_id: u64) -> Result<Option<Rating>, RatingError> {
        Ok(self.store.get_rating(order_id)?)
    }

    /// All ratings received by a driver, newest first
    pub fn for_driver(&self, driver_id: i64) -> Result<Vec<Rating>, RatingError> {
        Ok(self.store.list_ratings_where(|r| r.driver_id == driver_id)?)
    }

    /// All ratings written by a customer, newest first
    pub fn by_customer(&self, customer_id: i64) -> Result<Vec<Rating>, RatingError> {
        Ok(self
            .store
            .list_ratings_where(|r| r.customer_id == customer_id)?)
    }
}
