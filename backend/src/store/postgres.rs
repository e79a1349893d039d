//! Postgres-backed raw store on a diesel r2d2 pool.
//!
//! Row-returning statements are wrapped so that every row comes back as one
//! JSON object; `INSERT/UPDATE ... RETURNING` and plain `SELECT` share the
//! same decoding path.

use async_trait::async_trait;
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sql_types;

use super::{Deadline, Row, Rows, SqlArg, Statement, Store};
use crate::error::StoreError;

type PgPool = Pool<ConnectionManager<PgConnection>>;

#[derive(QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = sql_types::Text)]
    row: String,
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn connect(database_url: &str, pool_size: u32) -> Result<Self, StoreError> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        log::info!("Database pool established (max size {})", pool_size);
        Ok(Self { pool })
    }

    /// Round-trips `select 1` to prove the pool can reach the database.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            diesel::select(diesel::dsl::sql::<sql_types::Integer>("1"))
                .get_result::<i32>(conn)
                .map(|_| ())
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PooledConnection<ConnectionManager<PgConnection>>) -> Result<T, StoreError>
            + Send
            + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| StoreError::Pool(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

fn bind_all(sql: String, args: Vec<SqlArg>) -> BoxedSqlQuery<'static, Pg, SqlQuery> {
    let mut query = diesel::sql_query(sql).into_boxed::<Pg>();
    for arg in args {
        query = match arg {
            SqlArg::Int(v) => query.bind::<sql_types::BigInt, _>(v),
            SqlArg::Text(v) => query.bind::<sql_types::Text, _>(v),
            SqlArg::Uuid(v) => query.bind::<sql_types::Uuid, _>(v),
            SqlArg::Timestamp(v) => query.bind::<sql_types::Timestamptz, _>(v),
            SqlArg::NullUuid => {
                query.bind::<sql_types::Nullable<sql_types::Uuid>, _>(None::<uuid::Uuid>)
            }
            SqlArg::NullTimestamp => query
                .bind::<sql_types::Nullable<sql_types::Timestamptz>, _>(
                    None::<chrono::DateTime<chrono::Utc>>,
                ),
        };
    }
    query
}

fn as_json_rows(sql: &str) -> String {
    format!("WITH q AS ({sql}) SELECT row_to_json(q)::text AS row FROM q")
}

#[async_trait]
impl Store for PgStore {
    async fn execute(&self, _deadline: &Deadline, stmt: &Statement) -> Result<u64, StoreError> {
        let sql = stmt.sql.to_string();
        let args = stmt.args.clone();
        self.with_conn(move |conn| {
            bind_all(sql, args)
                .execute(conn)
                .map(|n| n as u64)
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await
    }

    async fn query_many(&self, _deadline: &Deadline, stmt: &Statement) -> Result<Rows, StoreError> {
        let sql = as_json_rows(stmt.sql);
        let args = stmt.args.clone();
        self.with_conn(move |conn| {
            let raw = bind_all(sql, args)
                .load::<JsonRow>(conn)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            raw.iter()
                .map(|r| Row::from_json(&r.row))
                .collect::<Result<Vec<_>, _>>()
                .map(Rows::from)
        })
        .await
    }
}
