//! Payment processor boundary: order creation over the gateway's REST API and
//! verification of the signed completion callback.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::GatewayConfig;

type HmacSha256 = Hmac<Sha256>;

/// Longest receipt the gateway accepts.
const MAX_RECEIPT_LEN: usize = 40;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway rejected order ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Order as requested by the checkout, amount still in major units.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub amount: f64,
    pub currency: String,
    pub receipt: String,
    pub course_id: String,
    pub course_name: String,
}

/// Order as acknowledged by the gateway; `amount` is in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, order: NewOrder) -> Result<GatewayOrder, GatewayError>;

    /// `false` on any mismatch; never errors.
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;
}

pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// `course_<courseId>_<millis>`, shortening the course id so the timestamp
/// always survives the gateway's length cap.
pub fn receipt_id(course_id: &str, unix_millis: i128) -> String {
    let suffix = format!("_{unix_millis}");
    let budget = MAX_RECEIPT_LEN.saturating_sub("course_".len() + suffix.len());
    let course: String = course_id.chars().take(budget).collect();
    format!("course_{course}{suffix}")
}

/// Constant-time check of a hex HMAC-SHA256 over `order_id|payment_id`.
pub fn signature_matches(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    let expected = mac.finalize().into_bytes();

    let Ok(given) = hex::decode(signature) else {
        return false;
    };
    expected.as_slice().ct_eq(given.as_slice()).into()
}

#[derive(Debug, Serialize)]
struct OrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: OrderNotes<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderNotes<'a> {
    course_id: &'a str,
    course_name: &'a str,
}

/// Razorpay Orders API client.
#[derive(Clone)]
pub struct RazorpayClient {
    http: reqwest::Client,
    api_base: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(cfg: &GatewayConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build gateway http client")?;
        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            key_id: cfg.key_id.clone(),
            key_secret: cfg.key_secret.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(&self, order: NewOrder) -> Result<GatewayOrder, GatewayError> {
        let body = OrderBody {
            amount: to_minor_units(order.amount),
            currency: &order.currency,
            receipt: &order.receipt,
            notes: OrderNotes {
                course_id: &order.course_id,
                course_name: &order.course_name,
            },
        };

        let res = self
            .http
            .post(format!("{}/orders", self.api_base))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "gateway rejected order");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let created = res.json::<GatewayOrder>().await?;
        debug!(order_id = %created.id, amount = created.amount, "gateway order created");
        Ok(created)
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        signature_matches(&self.key_secret, order_id, payment_id, signature)
    }
}
