//! Repository ports. Implementations only translate entities to statements
//! and rows back to entities; no business rule lives below this line.

mod flat;
mod house;
mod notification;
mod user;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Flat, FlatStatus, House, NewHouse, Notification, OneTimeCode, User};
use crate::store::Deadline;

pub use flat::PgFlatRepo;
pub use house::PgHouseRepo;
pub use notification::PgNotificationRepo;
pub use user::PgUserRepo;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HouseRepo: Send + Sync {
    async fn create(&self, deadline: &Deadline, house: &NewHouse) -> Result<House, StoreError>;

    async fn get_by_id(
        &self,
        deadline: &Deadline,
        house_id: i64,
    ) -> Result<Option<House>, StoreError>;

    /// Stamps the house's last-flat-update time.
    async fn touch_flat_update(
        &self,
        deadline: &Deadline,
        house_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Flats of a house, optionally restricted to one status.
    async fn list_flats(
        &self,
        deadline: &Deadline,
        house_id: i64,
        status: Option<FlatStatus>,
    ) -> Result<Vec<Flat>, StoreError>;

    async fn subscribe(
        &self,
        deadline: &Deadline,
        house_id: i64,
        user_id: Uuid,
    ) -> Result<(), StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FlatRepo: Send + Sync {
    async fn create(&self, deadline: &Deadline, flat: &Flat) -> Result<Flat, StoreError>;

    async fn get_by_id(
        &self,
        deadline: &Deadline,
        flat_id: i64,
        house_id: i64,
    ) -> Result<Option<Flat>, StoreError>;

    /// Rewrites price and rooms if the flat is still in `expected` status.
    /// `None` means no row matched.
    async fn update_details(
        &self,
        deadline: &Deadline,
        flat_id: i64,
        house_id: i64,
        expected: FlatStatus,
        price: i64,
        rooms: i64,
    ) -> Result<Option<Flat>, StoreError>;

    /// Compare-and-swap on the status column. `None` means the flat was not
    /// in `expected` status (or does not exist) when the write landed.
    async fn transition(
        &self,
        deadline: &Deadline,
        flat_id: i64,
        house_id: i64,
        expected: FlatStatus,
        next: FlatStatus,
        moderator_id: Option<Uuid>,
    ) -> Result<Option<Flat>, StoreError>;

    async fn count_by_status(
        &self,
        deadline: &Deadline,
        house_id: i64,
        status: FlatStatus,
    ) -> Result<i64, StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create(&self, deadline: &Deadline, user: &User) -> Result<(), StoreError>;

    async fn get_by_id(&self, deadline: &Deadline, user_id: Uuid)
        -> Result<Option<User>, StoreError>;

    /// Upserts the user's live code hash; the latest write wins.
    async fn store_code(
        &self,
        deadline: &Deadline,
        user_id: Uuid,
        code_hash: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn get_code(
        &self,
        deadline: &Deadline,
        user_id: Uuid,
    ) -> Result<Option<OneTimeCode>, StoreError>;

    async fn delete_code(&self, deadline: &Deadline, user_id: Uuid) -> Result<(), StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepo: Send + Sync {
    /// Creates one pending notification per current subscriber of the house.
    async fn enqueue_for_house(
        &self,
        deadline: &Deadline,
        house_id: i64,
        payload: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Every notification not yet sent, in store order.
    async fn pending(&self, deadline: &Deadline) -> Result<Vec<Notification>, StoreError>;

    /// Marks a pending notification sent. Returns `false` if it was not
    /// pending anymore.
    async fn mark_sent(
        &self,
        deadline: &Deadline,
        notification_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

/// Maps an empty single-row result to `None`.
pub(crate) fn optional<T>(result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NoRows) => Ok(None),
        Err(e) => Err(e),
    }
}
