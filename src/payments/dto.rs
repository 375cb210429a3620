use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub amount: Option<f64>,
    pub course_id: Option<String>,
    pub course_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub amount: i64, // minor units, as echoed by the gateway
    pub currency: String,
}

/// Completion callback relayed by the client, plus the buyer's account and
/// the course being bought.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[serde(rename = "razorpay_order_id")]
    pub order_id: Option<String>,
    #[serde(rename = "razorpay_payment_id")]
    pub payment_id: Option<String>,
    #[serde(rename = "razorpay_signature")]
    pub signature: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub course_id: Option<String>,
    pub course_name: Option<String>,
    pub course_image: Option<String>,
    pub amount: Option<f64>,
}
