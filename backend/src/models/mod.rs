use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Moderator => "moderator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "moderator" => Ok(Role::Moderator),
            other => Err(Error::validation(format!("bad user type {other:?}"))),
        }
    }
}

/// Moderation status of a flat. Persisted as its lowercase display string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlatStatus {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "on moderation")]
    OnModeration,
    #[serde(rename = "approved")]
    Approved,
    #[serde(rename = "declined")]
    Declined,
}

impl FlatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlatStatus::Created => "created",
            FlatStatus::OnModeration => "on moderation",
            FlatStatus::Approved => "approved",
            FlatStatus::Declined => "declined",
        }
    }

    /// Parses a status field from an update request. An empty field means
    /// "leave the status alone"; anything unrecognised is `BadStatus`.
    pub fn parse_optional(raw: &str) -> Result<Option<Self>, Error> {
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some)
    }
}

impl fmt::Display for FlatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlatStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(FlatStatus::Created),
            "on moderation" => Ok(FlatStatus::OnModeration),
            "approved" => Ok(FlatStatus::Approved),
            "declined" => Ok(FlatStatus::Declined),
            other => Err(Error::BadStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct House {
    pub house_id: i64,
    pub address: String,
    pub construct_year: i64,
    pub developer: String,
    pub created_at: DateTime<Utc>,
    pub update_flat_date: DateTime<Utc>,
}

/// A house before the store has assigned its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHouse {
    pub address: String,
    pub construct_year: i64,
    pub developer: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flat {
    pub flat_id: i64,
    pub house_id: i64,
    pub user_id: Uuid,
    pub price: i64,
    pub rooms: i64,
    pub status: FlatStatus,
    pub moderator_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub mail: String,
    pub password: String,
    pub role: Role,
}

/// Stored second-factor code. Only the hash is ever persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimeCode {
    pub user_id: Uuid,
    pub code: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: i64,
    pub user_id: Uuid,
    pub mail: String,
    pub house_id: i64,
    pub payload: String,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

// Requests and views handed across the delivery boundary.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateHouseRequest {
    pub address: String,
    pub year: i64,
    pub developer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseView {
    pub id: i64,
    pub address: String,
    pub year: i64,
    pub developer: String,
    pub created_at: DateTime<Utc>,
    pub update_at: DateTime<Utc>,
}

impl From<House> for HouseView {
    fn from(house: House) -> Self {
        Self {
            id: house.house_id,
            address: house.address,
            year: house.construct_year,
            developer: house.developer,
            created_at: house.created_at,
            update_at: house.update_flat_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFlatRequest {
    pub flat_id: i64,
    pub house_id: i64,
    pub price: i64,
    pub rooms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFlatRequest {
    pub id: i64,
    pub house_id: i64,
    #[serde(default)]
    pub status: String,
}

/// Client-side correction of a flat still awaiting moderation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditFlatRequest {
    pub id: i64,
    pub house_id: i64,
    pub price: Option<i64>,
    pub rooms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatView {
    pub id: i64,
    pub house_id: i64,
    pub price: i64,
    pub rooms: i64,
    pub status: FlatStatus,
}

impl From<Flat> for FlatView {
    fn from(flat: Flat) -> Self {
        Self {
            id: flat.flat_id,
            house_id: flat.house_id,
            price: flat.price,
            rooms: flat.rooms,
            status: flat.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub user_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub id: Uuid,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmLoginRequest {
    pub id: Uuid,
    pub code: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
}

/// Acknowledgement of a started login. Never carries the code itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAck {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}
