use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{optional, UserRepo};
use crate::error::StoreError;
use crate::models::{OneTimeCode, User};
use crate::store::{Deadline, Statement, Store};

const INSERT_USER: &str = "insert into users(user_id, mail, password, role) values ($1, $2, $3, $4)";

const SELECT_USER: &str = "select user_id, mail, password, role from users where user_id = $1";

const UPSERT_CODE: &str = "insert into codes(user_id, code, issued_at) values ($1, $2, $3) \
     on conflict (user_id) do update set code = excluded.code, issued_at = excluded.issued_at";

const SELECT_CODE: &str = "select user_id, code, issued_at from codes where user_id = $1";

const DELETE_CODE: &str = "delete from codes where user_id = $1";

pub struct PgUserRepo {
    store: Arc<dyn Store>,
}

impl PgUserRepo {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn create(&self, deadline: &Deadline, user: &User) -> Result<(), StoreError> {
        log::info!("user repo: create user {}", user.user_id);
        let stmt = Statement::new(INSERT_USER)
            .bind(user.user_id)
            .bind(user.mail.as_str())
            .bind(user.password.as_str())
            .bind(user.role.as_str());
        self.store.execute(deadline, &stmt).await.map(|_| ())
    }

    async fn get_by_id(
        &self,
        deadline: &Deadline,
        user_id: Uuid,
    ) -> Result<Option<User>, StoreError> {
        let stmt = Statement::new(SELECT_USER).bind(user_id);
        optional(self.store.query_one(deadline, &stmt).await)?
            .map(|row| row.decode())
            .transpose()
    }

    async fn store_code(
        &self,
        deadline: &Deadline,
        user_id: Uuid,
        code_hash: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        log::info!("user repo: store code for user {}", user_id);
        let stmt = Statement::new(UPSERT_CODE)
            .bind(user_id)
            .bind(code_hash)
            .bind(issued_at);
        self.store.execute(deadline, &stmt).await.map(|_| ())
    }

    async fn get_code(
        &self,
        deadline: &Deadline,
        user_id: Uuid,
    ) -> Result<Option<OneTimeCode>, StoreError> {
        let stmt = Statement::new(SELECT_CODE).bind(user_id);
        optional(self.store.query_one(deadline, &stmt).await)?
            .map(|row| row.decode())
            .transpose()
    }

    async fn delete_code(&self, deadline: &Deadline, user_id: Uuid) -> Result<(), StoreError> {
        let stmt = Statement::new(DELETE_CODE).bind(user_id);
        self.store.execute(deadline, &stmt).await.map(|_| ())
    }
}
