use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{CreateHouseRequest, FlatStatus, FlatView, HouseView, NewHouse, Role};
use crate::repo::HouseRepo;
use crate::store::Deadline;

pub struct HouseService {
    houses: Arc<dyn HouseRepo>,
}

impl HouseService {
    pub fn new(houses: Arc<dyn HouseRepo>) -> Self {
        Self { houses }
    }

    pub async fn create_house(
        &self,
        deadline: &Deadline,
        req: &CreateHouseRequest,
    ) -> Result<HouseView> {
        log::info!("house service: create house at {:?}", req.address);

        if req.address.trim().is_empty() {
            return Err(Error::validation("empty address"));
        }
        if req.developer.trim().is_empty() {
            return Err(Error::validation("empty developer"));
        }
        if req.year <= 0 {
            return Err(Error::validation(format!("bad year {}", req.year)));
        }

        let house = NewHouse {
            address: req.address.clone(),
            construct_year: req.year,
            developer: req.developer.clone(),
            created_at: Utc::now(),
        };
        let created = self
            .houses
            .create(deadline, &house)
            .await
            .map_err(|e| {
                Error::store(format!("house service: create house at {:?}", req.address), e)
            })?;
        Ok(created.into())
    }

    /// Flats of a house as the caller may see them: moderators get every
    /// flat, clients only approved ones.
    pub async fn list_flats(
        &self,
        deadline: &Deadline,
        house_id: i64,
        role: Role,
    ) -> Result<Vec<FlatView>> {
        log::info!("house service: list flats of house {} for {}", house_id, role);

        self.ensure_exists(deadline, house_id).await?;
        let filter = match role {
            Role::Moderator => None,
            Role::Client => Some(FlatStatus::Approved),
        };
        let flats = self
            .houses
            .list_flats(deadline, house_id, filter)
            .await
            .map_err(|e| {
                Error::store(format!("house service: list flats of house {house_id}"), e)
            })?;
        Ok(flats.into_iter().map(FlatView::from).collect())
    }

    pub async fn subscribe(&self, deadline: &Deadline, house_id: i64, user_id: Uuid) -> Result<()> {
        log::info!("house service: subscribe {} to house {}", user_id, house_id);

        self.ensure_exists(deadline, house_id).await?;
        self.houses
            .subscribe(deadline, house_id, user_id)
            .await
            .map_err(|e| {
                Error::store(format!("house service: subscribe {user_id} to house {house_id}"), e)
            })
    }

    async fn ensure_exists(&self, deadline: &Deadline, house_id: i64) -> Result<()> {
        if house_id <= 0 {
            return Err(Error::validation(format!("bad house id {house_id}")));
        }
        self.houses
            .get_by_id(deadline, house_id)
            .await
            .map_err(|e| Error::store(format!("house service: get house {house_id}"), e))?
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("house {house_id}")))
    }
}
