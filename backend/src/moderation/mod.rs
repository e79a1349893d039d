//! Flat moderation workflow.
//!
//! `created -> on moderation -> {approved, declined}`, plus the owner's
//! price/rooms correction while a flat is still `created`. Every status write
//! is a compare-and-swap on the status the workflow just validated, so a
//! decision racing on stale state fails with `InvalidTransition` instead of
//! overwriting the other writer.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    CreateFlatRequest, EditFlatRequest, Flat, FlatStatus, FlatView, Role, UpdateFlatRequest,
};
use crate::repo::{FlatRepo, HouseRepo, NotificationRepo, UserRepo};
use crate::store::Deadline;

fn check_ids(flat_id: i64, house_id: i64) -> Result<()> {
    if flat_id <= 0 {
        return Err(Error::validation(format!("bad flat id {flat_id}")));
    }
    if house_id <= 0 {
        return Err(Error::validation(format!("bad house id {house_id}")));
    }
    Ok(())
}

fn check_positive(field: &str, value: i64) -> Result<()> {
    if value <= 0 {
        return Err(Error::validation(format!("bad {field} {value}")));
    }
    Ok(())
}

fn approval_payload(flat: &Flat) -> String {
    format!(
        "new flat {} in house {}: {} rooms for {}",
        flat.flat_id, flat.house_id, flat.rooms, flat.price
    )
}

pub struct FlatWorkflow {
    flats: Arc<dyn FlatRepo>,
    houses: Arc<dyn HouseRepo>,
    users: Arc<dyn UserRepo>,
    notifications: Arc<dyn NotificationRepo>,
    flat_threshold: i64,
}

impl FlatWorkflow {
    pub fn new(
        flats: Arc<dyn FlatRepo>,
        houses: Arc<dyn HouseRepo>,
        users: Arc<dyn UserRepo>,
        notifications: Arc<dyn NotificationRepo>,
        flat_threshold: i64,
    ) -> Self {
        Self {
            flats,
            houses,
            users,
            notifications,
            flat_threshold,
        }
    }

    pub async fn create(
        &self,
        deadline: &Deadline,
        creator: Uuid,
        req: &CreateFlatRequest,
    ) -> Result<FlatView> {
        log::info!("flat service: create flat {} in house {}", req.flat_id, req.house_id);

        check_ids(req.flat_id, req.house_id)?;
        check_positive("price", req.price)?;
        check_positive("rooms", req.rooms)?;

        let flat = Flat {
            flat_id: req.flat_id,
            house_id: req.house_id,
            user_id: creator,
            price: req.price,
            rooms: req.rooms,
            status: FlatStatus::Created,
            moderator_id: None,
        };
        let created = self.flats.create(deadline, &flat).await.map_err(|e| {
            Error::store(
                format!("flat service: create flat {} in house {}", req.flat_id, req.house_id),
                e,
            )
        })?;
        self.touch_house(deadline, created.house_id).await;
        Ok(created.into())
    }

    pub async fn get(&self, deadline: &Deadline, flat_id: i64, house_id: i64) -> Result<FlatView> {
        self.fetch_flat(deadline, flat_id, house_id).await.map(Into::into)
    }

    /// Applies an update request from either role. The status field selects
    /// the edge: empty leaves the flat alone, `on moderation` submits it,
    /// `approved`/`declined` decide it. Unknown statuses are rejected before
    /// anything is read.
    pub async fn decide(
        &self,
        deadline: &Deadline,
        caller: Uuid,
        req: &UpdateFlatRequest,
    ) -> Result<FlatView> {
        log::info!(
            "flat service: update flat {} in house {} to {:?}",
            req.id,
            req.house_id,
            req.status
        );

        let next = FlatStatus::parse_optional(&req.status)?;
        check_ids(req.id, req.house_id)?;

        match next {
            None => self.get(deadline, req.id, req.house_id).await,
            Some(FlatStatus::OnModeration) => {
                self.submit_for_moderation(deadline, caller, req.id, req.house_id)
                    .await
            }
            Some(status @ (FlatStatus::Approved | FlatStatus::Declined)) => {
                self.moderate(deadline, caller, req.id, req.house_id, status)
                    .await
            }
            Some(FlatStatus::Created) => Err(Error::BadStatus(FlatStatus::Created.to_string())),
        }
    }

    pub async fn submit_for_moderation(
        &self,
        deadline: &Deadline,
        caller: Uuid,
        flat_id: i64,
        house_id: i64,
    ) -> Result<FlatView> {
        let role = self.caller_role(deadline, caller).await?;
        let flat = self.fetch_flat(deadline, flat_id, house_id).await?;
        if role != Some(Role::Moderator) && flat.user_id != caller {
            log::warn!(
                "flat service: {} may not submit flat {} in house {}",
                caller,
                flat_id,
                house_id
            );
            return Err(Error::NotAuthorized(format!(
                "flat {flat_id} in house {house_id} belongs to another user"
            )));
        }
        if flat.status != FlatStatus::Created {
            return Err(Error::InvalidTransition {
                from: flat.status,
                to: FlatStatus::OnModeration,
            });
        }

        self.houses
            .get_by_id(deadline, house_id)
            .await
            .map_err(|e| Error::store(format!("flat service: get house {house_id}"), e))?
            .ok_or_else(|| Error::NotFound(format!("house {house_id}")))?;
        let approved = self
            .flats
            .count_by_status(deadline, house_id, FlatStatus::Approved)
            .await
            .map_err(|e| {
                Error::store(format!("flat service: count approved in house {house_id}"), e)
            })?;
        if approved >= self.flat_threshold {
            log::warn!("flat service: house {} is full ({} approved)", house_id, approved);
            return Err(Error::CapacityExceeded {
                house_id,
                threshold: self.flat_threshold,
            });
        }

        let updated = self
            .swap_status(deadline, &flat, FlatStatus::OnModeration, None)
            .await?;
        self.touch_house(deadline, house_id).await;
        Ok(updated.into())
    }

    /// Moves a flat out of `on moderation` and records who decided.
    pub async fn moderate(
        &self,
        deadline: &Deadline,
        moderator_id: Uuid,
        flat_id: i64,
        house_id: i64,
        next: FlatStatus,
    ) -> Result<FlatView> {
        if !matches!(next, FlatStatus::Approved | FlatStatus::Declined) {
            return Err(Error::BadStatus(next.to_string()));
        }
        if self.caller_role(deadline, moderator_id).await? != Some(Role::Moderator) {
            log::warn!("flat service: {} is not a moderator", moderator_id);
            return Err(Error::NotAuthorized(format!("user {moderator_id} is not a moderator")));
        }

        let flat = self.fetch_flat(deadline, flat_id, house_id).await?;
        if flat.user_id == moderator_id {
            log::warn!("flat service: {} tried to moderate own flat {}", moderator_id, flat_id);
            return Err(Error::NotAuthorized(format!(
                "user {moderator_id} owns flat {flat_id} in house {house_id}"
            )));
        }
        if flat.status != FlatStatus::OnModeration {
            return Err(Error::InvalidTransition {
                from: flat.status,
                to: next,
            });
        }

        let updated = self
            .swap_status(deadline, &flat, next, Some(moderator_id))
            .await?;
        self.touch_house(deadline, house_id).await;

        if next == FlatStatus::Approved {
            match self
                .notifications
                .enqueue_for_house(deadline, house_id, &approval_payload(&updated), Utc::now())
                .await
            {
                Ok(queued) => log::info!(
                    "flat service: queued {} notifications for house {}",
                    queued,
                    house_id
                ),
                Err(e) => log::warn!(
                    "flat service: could not queue notifications for house {}: {}",
                    house_id,
                    e
                ),
            }
        }
        Ok(updated.into())
    }

    /// The owner's price/rooms correction. Only allowed while `created`.
    pub async fn update_details(
        &self,
        deadline: &Deadline,
        caller: Uuid,
        req: &EditFlatRequest,
    ) -> Result<FlatView> {
        log::info!("flat service: edit flat {} in house {}", req.id, req.house_id);

        check_ids(req.id, req.house_id)?;
        if req.price.is_none() && req.rooms.is_none() {
            return Err(Error::validation("nothing to update"));
        }
        if let Some(price) = req.price {
            check_positive("price", price)?;
        }
        if let Some(rooms) = req.rooms {
            check_positive("rooms", rooms)?;
        }

        let flat = self.fetch_flat(deadline, req.id, req.house_id).await?;
        if flat.user_id != caller {
            return Err(Error::NotAuthorized(format!(
                "flat {} in house {} belongs to another user",
                req.id, req.house_id
            )));
        }
        if flat.status != FlatStatus::Created {
            return Err(Error::InvalidTransition {
                from: flat.status,
                to: FlatStatus::Created,
            });
        }

        let updated = self
            .flats
            .update_details(
                deadline,
                flat.flat_id,
                flat.house_id,
                FlatStatus::Created,
                req.price.unwrap_or(flat.price),
                req.rooms.unwrap_or(flat.rooms),
            )
            .await
            .map_err(|e| {
                Error::store(
                    format!("flat service: edit flat {} in house {}", req.id, req.house_id),
                    e,
                )
            })?;
        let updated = match updated {
            Some(updated) => updated,
            None => return Err(self.lost_race(deadline, &flat, FlatStatus::Created).await),
        };
        self.touch_house(deadline, req.house_id).await;
        Ok(updated.into())
    }

    async fn swap_status(
        &self,
        deadline: &Deadline,
        flat: &Flat,
        next: FlatStatus,
        moderator_id: Option<Uuid>,
    ) -> Result<Flat> {
        let swapped = self
            .flats
            .transition(deadline, flat.flat_id, flat.house_id, flat.status, next, moderator_id)
            .await
            .map_err(|e| {
                Error::store(
                    format!(
                        "flat service: move flat {} in house {} to {}",
                        flat.flat_id, flat.house_id, next
                    ),
                    e,
                )
            })?;
        match swapped {
            Some(updated) => Ok(updated),
            None => Err(self.lost_race(deadline, flat, next).await),
        }
    }

    /// Builds the error for a conditional write that matched no row: the flat
    /// either changed status under us or disappeared.
    async fn lost_race(&self, deadline: &Deadline, flat: &Flat, to: FlatStatus) -> Error {
        log::warn!(
            "flat service: flat {} in house {} changed concurrently",
            flat.flat_id,
            flat.house_id
        );
        match self.fetch_flat(deadline, flat.flat_id, flat.house_id).await {
            Ok(current) => Error::InvalidTransition {
                from: current.status,
                to,
            },
            Err(e) => e,
        }
    }

    async fn fetch_flat(&self, deadline: &Deadline, flat_id: i64, house_id: i64) -> Result<Flat> {
        self.flats
            .get_by_id(deadline, flat_id, house_id)
            .await
            .map_err(|e| {
                Error::store(format!("flat service: get flat {flat_id} in house {house_id}"), e)
            })?
            .ok_or_else(|| Error::NotFound(format!("flat {flat_id} in house {house_id}")))
    }

    async fn caller_role(&self, deadline: &Deadline, user_id: Uuid) -> Result<Option<Role>> {
        let user = self
            .users
            .get_by_id(deadline, user_id)
            .await
            .map_err(|e| Error::store(format!("flat service: get user {user_id}"), e))?;
        Ok(user.map(|u| u.role))
    }

    async fn touch_house(&self, deadline: &Deadline, house_id: i64) {
        if let Err(e) = self
            .houses
            .touch_flat_update(deadline, house_id, Utc::now())
            .await
        {
            log::warn!("flat service: could not stamp house {}: {}", house_id, e);
        }
    }
}
