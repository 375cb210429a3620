use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{auth::repo_types::User, payments::repo_types::Purchase};

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: ProfileUser,
    pub purchases: Vec<PurchaseView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseView {
    pub id: Uuid,
    pub course_id: String,
    pub course_name: String,
    pub course_image: String,
    pub amount: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub purchased_at: OffsetDateTime,
}

impl From<User> for ProfileUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            created_at: u.created_at,
        }
    }
}

impl From<Purchase> for PurchaseView {
    fn from(p: Purchase) -> Self {
        Self {
            id: p.id,
            course_id: p.course_id,
            course_name: p.course_name,
            course_image: p.course_image,
            amount: p.amount,
            purchased_at: p.purchased_at,
        }
    }
}
