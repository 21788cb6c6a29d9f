use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod roles {
    pub const ADMIN: &str = "ADMIN";
    pub const MANAGER: &str = "MANAGER";
    pub const FREELANCER: &str = "FREELANCER";
    pub const ALL: [&str; 3] = [ADMIN, MANAGER, FREELANCER];
}

pub mod order_status {
    pub const NEW: &str = "NEW";
    pub const INPROGRESS: &str = "INPROGRESS";
    pub const REJECTED: &str = "REJECTED";
    pub const DONE: &str = "DONE";
    pub const ALL: [&str; 4] = [NEW, INPROGRESS, REJECTED, DONE];
}

pub mod order_category {
    pub const DEVELOPMENT: &str = "DEVELOPMENT";
    pub const DESIGN: &str = "DESIGN";
    pub const MARKETING: &str = "MARKETING";
    pub const COPYWRITING: &str = "COPYWRITING";
    pub const OTHER: &str = "OTHER";
    pub const ALL: [&str; 5] = [DEVELOPMENT, DESIGN, MARKETING, COPYWRITING, OTHER];
}

/// API-facing user. The password hash never leaves the entity layer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub country: Option<String>,
    pub is_email_verified: Option<bool>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub category: String,
    pub status: String,
    pub user_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Customer {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub telegram: Option<String>,
    pub company: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
