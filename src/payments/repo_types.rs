use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// One completed purchase granting `user_id` access to `course_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: String,
    pub course_name: String,  // copied at purchase time
    pub course_image: String, // copied at purchase time
    pub amount: f64,          // major currency units
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub purchased_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub user_id: Uuid,
    pub course_id: String,
    pub course_name: String,
    pub course_image: String,
    pub amount: f64,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
}
