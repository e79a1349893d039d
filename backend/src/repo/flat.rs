use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use super::{optional, FlatRepo};
use crate::error::StoreError;
use crate::models::{Flat, FlatStatus};
use crate::store::{Deadline, Statement, Store};

const INSERT_FLAT: &str = "insert into flats(flat_id, house_id, user_id, price, rooms, status, moderator_id) \
     values ($1, $2, $3, $4, $5, $6, $7) \
     returning flat_id, house_id, user_id, price, rooms, status, moderator_id";

const SELECT_FLAT: &str = "select flat_id, house_id, user_id, price, rooms, status, moderator_id \
     from flats where flat_id = $1 and house_id = $2";

const UPDATE_DETAILS: &str = "update flats set price = $4, rooms = $5 \
     where flat_id = $1 and house_id = $2 and status = $3 \
     returning flat_id, house_id, user_id, price, rooms, status, moderator_id";

const TRANSITION: &str = "update flats set status = $4, moderator_id = coalesce($5, moderator_id) \
     where flat_id = $1 and house_id = $2 and status = $3 \
     returning flat_id, house_id, user_id, price, rooms, status, moderator_id";

const COUNT_BY_STATUS: &str = "select count(*) as total from flats where house_id = $1 and status = $2";

#[derive(Deserialize)]
struct Count {
    total: i64,
}

pub struct PgFlatRepo {
    store: Arc<dyn Store>,
}

impl PgFlatRepo {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FlatRepo for PgFlatRepo {
    async fn create(&self, deadline: &Deadline, flat: &Flat) -> Result<Flat, StoreError> {
        log::info!("flat repo: create flat {} in house {}", flat.flat_id, flat.house_id);
        let stmt = Statement::new(INSERT_FLAT)
            .bind(flat.flat_id)
            .bind(flat.house_id)
            .bind(flat.user_id)
            .bind(flat.price)
            .bind(flat.rooms)
            .bind(flat.status.as_str())
            .bind(flat.moderator_id);
        self.store.query_one(deadline, &stmt).await?.decode()
    }

    async fn get_by_id(
        &self,
        deadline: &Deadline,
        flat_id: i64,
        house_id: i64,
    ) -> Result<Option<Flat>, StoreError> {
        let stmt = Statement::new(SELECT_FLAT).bind(flat_id).bind(house_id);
        optional(self.store.query_one(deadline, &stmt).await)?
            .map(|row| row.decode())
            .transpose()
    }

    async fn update_details(
        &self,
        deadline: &Deadline,
        flat_id: i64,
        house_id: i64,
        expected: FlatStatus,
        price: i64,
        rooms: i64,
    ) -> Result<Option<Flat>, StoreError> {
        let stmt = Statement::new(UPDATE_DETAILS)
            .bind(flat_id)
            .bind(house_id)
            .bind(expected.as_str())
            .bind(price)
            .bind(rooms);
        optional(self.store.query_one(deadline, &stmt).await)?
            .map(|row| row.decode())
            .transpose()
    }

    async fn transition(
        &self,
        deadline: &Deadline,
        flat_id: i64,
        house_id: i64,
        expected: FlatStatus,
        next: FlatStatus,
        moderator_id: Option<Uuid>,
    ) -> Result<Option<Flat>, StoreError> {
        log::info!(
            "flat repo: flat {} in house {}: {} -> {}",
            flat_id,
            house_id,
            expected,
            next
        );
        let stmt = Statement::new(TRANSITION)
            .bind(flat_id)
            .bind(house_id)
            .bind(expected.as_str())
            .bind(next.as_str())
            .bind(moderator_id);
        optional(self.store.query_one(deadline, &stmt).await)?
            .map(|row| row.decode())
            .transpose()
    }

    async fn count_by_status(
        &self,
        deadline: &Deadline,
        house_id: i64,
        status: FlatStatus,
    ) -> Result<i64, StoreError> {
        let stmt = Statement::new(COUNT_BY_STATUS)
            .bind(house_id)
            .bind(status.as_str());
        let count: Count = self.store.query_one(deadline, &stmt).await?.decode()?;
        Ok(count.total)
    }
}
