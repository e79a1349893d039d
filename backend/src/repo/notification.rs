use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::NotificationRepo;
use crate::error::StoreError;
use crate::models::Notification;
use crate::store::{Deadline, Statement, Store};

const ENQUEUE_FOR_HOUSE: &str = "insert into notifications(user_id, house_id, payload, is_sent, created_at) \
     select user_id, house_id, $2, false, $3 from subscribers where house_id = $1";

const SELECT_PENDING: &str = "select n.notification_id, n.user_id, u.mail, n.house_id, n.payload, n.is_sent, n.sent_at \
     from notifications n join users u on u.user_id = n.user_id \
     where n.is_sent = false order by n.notification_id";

const MARK_SENT: &str = "update notifications set is_sent = true, sent_at = $2 \
     where notification_id = $1 and is_sent = false";

pub struct PgNotificationRepo {
    store: Arc<dyn Store>,
}

impl PgNotificationRepo {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NotificationRepo for PgNotificationRepo {
    async fn enqueue_for_house(
        &self,
        deadline: &Deadline,
        house_id: i64,
        payload: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let stmt = Statement::new(ENQUEUE_FOR_HOUSE)
            .bind(house_id)
            .bind(payload)
            .bind(at);
        let queued = self.store.execute(deadline, &stmt).await?;
        log::info!("notification repo: queued {} notification(s) for house {}", queued, house_id);
        Ok(queued)
    }

    async fn pending(&self, deadline: &Deadline) -> Result<Vec<Notification>, StoreError> {
        self.store
            .query_many(deadline, &Statement::new(SELECT_PENDING))
            .await?
            .decode_all()
    }

    async fn mark_sent(
        &self,
        deadline: &Deadline,
        notification_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let stmt = Statement::new(MARK_SENT).bind(notification_id).bind(at);
        Ok(self.store.execute(deadline, &stmt).await? > 0)
    }
}
