use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{optional, HouseRepo};
use crate::error::StoreError;
use crate::models::{Flat, FlatStatus, House, NewHouse};
use crate::store::{Deadline, Statement, Store};

const INSERT_HOUSE: &str = "insert into houses(address, construct_year, developer, created_at, update_flat_date) \
     values ($1, $2, $3, $4, $4) \
     returning house_id, address, construct_year, developer, created_at, update_flat_date";

const SELECT_HOUSE: &str = "select house_id, address, construct_year, developer, created_at, update_flat_date \
     from houses where house_id = $1";

const TOUCH_HOUSE: &str = "update houses set update_flat_date = $2 where house_id = $1";

const SELECT_FLATS: &str = "select flat_id, house_id, user_id, price, rooms, status, moderator_id \
     from flats where house_id = $1 order by flat_id";

const SELECT_FLATS_BY_STATUS: &str = "select flat_id, house_id, user_id, price, rooms, status, moderator_id \
     from flats where house_id = $1 and status = $2 order by flat_id";

const INSERT_SUBSCRIBER: &str = "insert into subscribers(user_id, house_id) values ($1, $2) \
     on conflict do nothing";

pub struct PgHouseRepo {
    store: Arc<dyn Store>,
}

impl PgHouseRepo {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HouseRepo for PgHouseRepo {
    async fn create(&self, deadline: &Deadline, house: &NewHouse) -> Result<House, StoreError> {
        log::info!("house repo: create house at {:?}", house.address);
        let stmt = Statement::new(INSERT_HOUSE)
            .bind(house.address.as_str())
            .bind(house.construct_year)
            .bind(house.developer.as_str())
            .bind(house.created_at);
        self.store.query_one(deadline, &stmt).await?.decode()
    }

    async fn get_by_id(
        &self,
        deadline: &Deadline,
        house_id: i64,
    ) -> Result<Option<House>, StoreError> {
        let stmt = Statement::new(SELECT_HOUSE).bind(house_id);
        optional(self.store.query_one(deadline, &stmt).await)?
            .map(|row| row.decode())
            .transpose()
    }

    async fn touch_flat_update(
        &self,
        deadline: &Deadline,
        house_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let stmt = Statement::new(TOUCH_HOUSE).bind(house_id).bind(at);
        self.store.execute(deadline, &stmt).await.map(|_| ())
    }

    async fn list_flats(
        &self,
        deadline: &Deadline,
        house_id: i64,
        status: Option<FlatStatus>,
    ) -> Result<Vec<Flat>, StoreError> {
        let stmt = match status {
            Some(status) => Statement::new(SELECT_FLATS_BY_STATUS)
                .bind(house_id)
                .bind(status.as_str()),
            None => Statement::new(SELECT_FLATS).bind(house_id),
        };
        self.store.query_many(deadline, &stmt).await?.decode_all()
    }

    async fn subscribe(
        &self,
        deadline: &Deadline,
        house_id: i64,
        user_id: Uuid,
    ) -> Result<(), StoreError> {
        log::info!("house repo: subscribe {} to house {}", user_id, house_id);
        let stmt = Statement::new(INSERT_SUBSCRIBER).bind(user_id).bind(house_id);
        self.store.execute(deadline, &stmt).await.map(|_| ())
    }
}
