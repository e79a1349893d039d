//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use estate_moderation::error::{SendError, StoreError};
use estate_moderation::models::{
    Flat, FlatStatus, House, NewHouse, Notification, OneTimeCode, Role, User,
};
use estate_moderation::repo::{FlatRepo, HouseRepo, NotificationRepo, UserRepo};
use estate_moderation::sender::Sender;
use estate_moderation::store::Deadline;

#[derive(Default)]
pub struct MemoryState {
    pub houses: BTreeMap<i64, House>,
    pub flats: BTreeMap<(i64, i64), Flat>,
    pub users: HashMap<Uuid, User>,
    pub codes: HashMap<Uuid, OneTimeCode>,
    pub subscribers: BTreeSet<(i64, Uuid)>,
    pub notifications: BTreeMap<i64, Notification>,
    pub writes: usize,
    pub transitions: usize,
    next_house: i64,
    next_notification: i64,
}

/// One shared in-memory database implementing every repository port.
#[derive(Default, Clone)]
pub struct MemoryDb {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn add_user(&self, role: Role) -> Uuid {
        let user_id = Uuid::new_v4();
        self.state().users.insert(
            user_id,
            User {
                user_id,
                mail: format!("{user_id}@test.local"),
                password: "unused".into(),
                role,
            },
        );
        user_id
    }

    pub fn add_house(&self, house_id: i64) {
        let now = Utc::now();
        let mut state = self.state();
        state.houses.insert(
            house_id,
            House {
                house_id,
                address: format!("Lenina {house_id}"),
                construct_year: 2000,
                developer: "Mr. Builder".into(),
                created_at: now,
                update_flat_date: now,
            },
        );
        state.next_house = state.next_house.max(house_id);
    }

    pub fn add_notification(&self, user_id: Uuid, house_id: i64, payload: &str) -> i64 {
        let mut state = self.state();
        state.next_notification += 1;
        let notification_id = state.next_notification;
        state.notifications.insert(
            notification_id,
            Notification {
                notification_id,
                user_id,
                mail: String::new(),
                house_id,
                payload: payload.into(),
                is_sent: false,
                sent_at: None,
            },
        );
        notification_id
    }

    pub fn flat(&self, flat_id: i64, house_id: i64) -> Option<Flat> {
        self.state().flats.get(&(flat_id, house_id)).cloned()
    }

    pub fn is_sent(&self, notification_id: i64) -> bool {
        self.state()
            .notifications
            .get(&notification_id)
            .is_some_and(|n| n.is_sent)
    }
}

#[async_trait]
impl HouseRepo for MemoryDb {
    async fn create(&self, _: &Deadline, house: &NewHouse) -> Result<House, StoreError> {
        let mut state = self.state();
        state.writes += 1;
        state.next_house += 1;
        let created = House {
            house_id: state.next_house,
            address: house.address.clone(),
            construct_year: house.construct_year,
            developer: house.developer.clone(),
            created_at: house.created_at,
            update_flat_date: house.created_at,
        };
        state.houses.insert(created.house_id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, _: &Deadline, house_id: i64) -> Result<Option<House>, StoreError> {
        Ok(self.state().houses.get(&house_id).cloned())
    }

    async fn touch_flat_update(
        &self,
        _: &Deadline,
        house_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.writes += 1;
        if let Some(house) = state.houses.get_mut(&house_id) {
            house.update_flat_date = at;
        }
        Ok(())
    }

    async fn list_flats(
        &self,
        _: &Deadline,
        house_id: i64,
        status: Option<FlatStatus>,
    ) -> Result<Vec<Flat>, StoreError> {
        Ok(self
            .state()
            .flats
            .values()
            .filter(|f| f.house_id == house_id && status.map_or(true, |s| f.status == s))
            .cloned()
            .collect())
    }

    async fn subscribe(
        &self,
        _: &Deadline,
        house_id: i64,
        user_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.writes += 1;
        state.subscribers.insert((house_id, user_id));
        Ok(())
    }
}

#[async_trait]
impl FlatRepo for MemoryDb {
    async fn create(&self, _: &Deadline, flat: &Flat) -> Result<Flat, StoreError> {
        let mut state = self.state();
        let key = (flat.flat_id, flat.house_id);
        if state.flats.contains_key(&key) {
            return Err(StoreError::Backend(
                "duplicate key value violates unique constraint".into(),
            ));
        }
        state.writes += 1;
        state.flats.insert(key, flat.clone());
        Ok(flat.clone())
    }

    async fn get_by_id(
        &self,
        _: &Deadline,
        flat_id: i64,
        house_id: i64,
    ) -> Result<Option<Flat>, StoreError> {
        // Lets concurrent callers interleave between their reads and writes.
        tokio::task::yield_now().await;
        Ok(self.flat(flat_id, house_id))
    }

    async fn update_details(
        &self,
        _: &Deadline,
        flat_id: i64,
        house_id: i64,
        expected: FlatStatus,
        price: i64,
        rooms: i64,
    ) -> Result<Option<Flat>, StoreError> {
        let mut state = self.state();
        let updated = match state.flats.get_mut(&(flat_id, house_id)) {
            Some(flat) if flat.status == expected => {
                flat.price = price;
                flat.rooms = rooms;
                Some(flat.clone())
            }
            _ => None,
        };
        if updated.is_some() {
            state.writes += 1;
        }
        Ok(updated)
    }

    async fn transition(
        &self,
        _: &Deadline,
        flat_id: i64,
        house_id: i64,
        expected: FlatStatus,
        next: FlatStatus,
        moderator_id: Option<Uuid>,
    ) -> Result<Option<Flat>, StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.transitions += 1;
        let updated = match state.flats.get_mut(&(flat_id, house_id)) {
            Some(flat) if flat.status == expected => {
                flat.status = next;
                if moderator_id.is_some() {
                    flat.moderator_id = moderator_id;
                }
                Some(flat.clone())
            }
            _ => None,
        };
        if updated.is_some() {
            state.writes += 1;
        }
        Ok(updated)
    }

    async fn count_by_status(
        &self,
        _: &Deadline,
        house_id: i64,
        status: FlatStatus,
    ) -> Result<i64, StoreError> {
        let count = self
            .state()
            .flats
            .values()
            .filter(|f| f.house_id == house_id && f.status == status)
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl UserRepo for MemoryDb {
    async fn create(&self, _: &Deadline, user: &User) -> Result<(), StoreError> {
        let mut state = self.state();
        state.writes += 1;
        state.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn get_by_id(&self, _: &Deadline, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state().users.get(&user_id).cloned())
    }

    async fn store_code(
        &self,
        _: &Deadline,
        user_id: Uuid,
        code_hash: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.writes += 1;
        state.codes.insert(
            user_id,
            OneTimeCode {
                user_id,
                code: code_hash.into(),
                issued_at,
            },
        );
        Ok(())
    }

    async fn get_code(
        &self,
        _: &Deadline,
        user_id: Uuid,
    ) -> Result<Option<OneTimeCode>, StoreError> {
        Ok(self.state().codes.get(&user_id).cloned())
    }

    async fn delete_code(&self, _: &Deadline, user_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state();
        state.writes += 1;
        state.codes.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl NotificationRepo for MemoryDb {
    async fn enqueue_for_house(
        &self,
        _: &Deadline,
        house_id: i64,
        payload: &str,
        _at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let subscribers: Vec<Uuid> = self
            .state()
            .subscribers
            .iter()
            .filter(|(h, _)| *h == house_id)
            .map(|(_, user_id)| *user_id)
            .collect();
        for user_id in &subscribers {
            self.add_notification(*user_id, house_id, payload);
        }
        Ok(subscribers.len() as u64)
    }

    async fn pending(&self, _: &Deadline) -> Result<Vec<Notification>, StoreError> {
        let state = self.state();
        Ok(state
            .notifications
            .values()
            .filter(|n| !n.is_sent)
            .filter_map(|n| {
                state.users.get(&n.user_id).map(|user| Notification {
                    mail: user.mail.clone(),
                    ..n.clone()
                })
            })
            .collect())
    }

    async fn mark_sent(
        &self,
        _: &Deadline,
        notification_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut guard = self.state();
        let state = &mut *guard;
        match state.notifications.get_mut(&notification_id) {
            Some(n) if !n.is_sent => {
                n.is_sent = true;
                n.sent_at = Some(at);
                state.writes += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Records every delivery; payloads listed in `failing` are rejected.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    attempts: Mutex<usize>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, payload: &str) {
        self.failing.lock().unwrap().insert(payload.to_string());
    }

    pub fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_payload_for(&self, recipient: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == recipient)
            .map(|(_, payload)| payload.clone())
    }
}

#[async_trait]
impl Sender for RecordingSender {
    async fn send(&self, _: &Deadline, recipient: &str, payload: &str) -> Result<(), SendError> {
        *self.attempts.lock().unwrap() += 1;
        if self.failing.lock().unwrap().contains(payload) {
            return Err(SendError::Rejected(format!("refusing {payload:?}")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), payload.to_string()));
        Ok(())
    }
}
