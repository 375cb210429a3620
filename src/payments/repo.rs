use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::StoreError;
use crate::payments::repo_types::{NewPurchase, Purchase};

/// Append-only record of course grants.
#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    async fn find_by_user_and_course(
        &self,
        user_id: Uuid,
        course_id: &str,
    ) -> Result<Option<Purchase>, StoreError>;

    /// Fails with [`StoreError::DuplicateKey`] if the (user, course) pair or the
    /// gateway payment id is already recorded.
    async fn create(&self, purchase: NewPurchase) -> Result<Purchase, StoreError>;

    /// Newest first.
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Purchase>, StoreError>;
}

#[derive(Clone)]
pub struct PgPurchaseLedger {
    db: PgPool,
}

impl PgPurchaseLedger {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PurchaseLedger for PgPurchaseLedger {
    async fn find_by_user_and_course(
        &self,
        user_id: Uuid,
        course_id: &str,
    ) -> Result<Option<Purchase>, StoreError> {
        let row = sqlx::query_as::<_, Purchase>(
            r#"
            SELECT id, user_id, course_id, course_name, course_image, amount,
                   gateway_order_id, gateway_payment_id, purchased_at
            FROM purchases
            WHERE user_id = $1 AND course_id = $2
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn create(&self, p: NewPurchase) -> Result<Purchase, StoreError> {
        let row = sqlx::query_as::<_, Purchase>(
            r#"
            INSERT INTO purchases (user_id, course_id, course_name, course_image, amount,
                                   gateway_order_id, gateway_payment_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            RETURNING id, user_id, course_id, course_name, course_image, amount,
                      gateway_order_id, gateway_payment_id, purchased_at
            "#,
        )
        .bind(p.user_id)
        .bind(&p.course_id)
        .bind(&p.course_name)
        .bind(&p.course_image)
        .bind(p.amount)
        .bind(&p.gateway_order_id)
        .bind(&p.gateway_payment_id)
        .fetch_optional(&self.db)
        .await?;
        row.ok_or(StoreError::DuplicateKey)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Purchase>, StoreError> {
        let rows = sqlx::query_as::<_, Purchase>(
            r#"
            SELECT id, user_id, course_id, course_name, course_image, amount,
                   gateway_order_id, gateway_payment_id, purchased_at
            FROM purchases
            WHERE user_id = $1
            ORDER BY purchased_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
