//! Checkout orchestration.
//!
//! A checkout moves through
//! `OrderRequested -> OrderCreated` (one call) and later
//! `PaymentClaimed -> SignatureVerified -> AccountResolved -> PurchaseRecorded -> SessionIssued`
//! (a second call). Nothing is written locally until the signature checks out,
//! and the purchase insert itself is the authoritative duplicate guard.

use std::fmt;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::{
    auth::{
        dto::PublicUser,
        password::{hash_password, verify_password},
        repo_types::{NewUser, User},
        services::{checked_email, issue_session, present, present_secret, BAD_CREDENTIALS},
    },
    db::StoreError,
    error::AppError,
    payments::{
        dto::{CreateOrderRequest, VerifyPaymentRequest},
        gateway::{receipt_id, GatewayError, GatewayOrder, NewOrder},
        repo_types::{NewPurchase, Purchase},
    },
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStage {
    OrderRequested,
    OrderCreated,
    PaymentClaimed,
    SignatureVerified,
    AccountResolved,
    PurchaseRecorded,
    SessionIssued,
}

impl fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    Invalid(&'static str),

    #[error("order creation failed")]
    OrderCreationFailed(#[source] GatewayError),

    #[error("payment signature invalid")]
    SignatureInvalid,

    #[error("returning buyer failed authentication")]
    ReturningBuyerUnauthenticated,

    #[error("course already purchased")]
    AlreadyPurchased,

    #[error("provisioning failed after {stage}")]
    ProvisioningFailed {
        stage: CheckoutStage,
        #[source]
        source: anyhow::Error,
    },
}

impl From<CheckoutError> for AppError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::Invalid(msg) => AppError::Validation(msg.into()),
            CheckoutError::OrderCreationFailed(source) => AppError::Gateway(source.into()),
            CheckoutError::SignatureInvalid => {
                AppError::PaymentRejected("Payment verification failed".into())
            }
            CheckoutError::ReturningBuyerUnauthenticated => {
                AppError::Unauthorized(BAD_CREDENTIALS.into())
            }
            CheckoutError::AlreadyPurchased => {
                AppError::Conflict("Course already purchased".into())
            }
            e @ CheckoutError::ProvisioningFailed { .. } => AppError::Internal {
                public: "Payment verification failed",
                source: e.into(),
            },
        }
    }
}

fn failed_after(stage: CheckoutStage) -> impl FnOnce(StoreError) -> CheckoutError {
    move |e| CheckoutError::ProvisioningFailed {
        stage,
        source: e.into(),
    }
}

/// Gateway identifiers are signed as sent, so only blankness is rejected.
fn verbatim(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn positive_amount(amount: Option<f64>) -> Option<f64> {
    amount.filter(|a| a.is_finite() && *a > 0.0)
}

/// Validated completion callback.
#[derive(Debug, Clone)]
pub struct PaymentClaim {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub email: String,
    pub password: String,
    pub name: String,
    pub course_id: String,
    pub course_name: String,
    pub course_image: String,
    pub amount: f64,
}

impl TryFrom<VerifyPaymentRequest> for PaymentClaim {
    type Error = CheckoutError;

    fn try_from(req: VerifyPaymentRequest) -> Result<Self, Self::Error> {
        const MISSING: &str = "All payment, account and course fields are required";
        let (
            Some(order_id),
            Some(payment_id),
            Some(signature),
            Some(email),
            Some(password),
            Some(name),
            Some(course_id),
            Some(course_name),
            Some(course_image),
            Some(amount),
        ) = (
            verbatim(req.order_id),
            verbatim(req.payment_id),
            verbatim(req.signature),
            present(req.email),
            present_secret(req.password),
            present(req.name),
            present(req.course_id),
            present(req.course_name),
            present(req.course_image),
            positive_amount(req.amount),
        )
        else {
            return Err(CheckoutError::Invalid(MISSING));
        };
        Ok(Self {
            order_id,
            payment_id,
            signature,
            email,
            password,
            name,
            course_id,
            course_name,
            course_image,
            amount,
        })
    }
}

/// Outcome of a successful verification.
#[derive(Debug)]
pub struct Provisioned {
    pub token: String,
    pub user: PublicUser,
    pub purchase: Purchase,
}

pub async fn create_order(
    st: &AppState,
    req: CreateOrderRequest,
) -> Result<GatewayOrder, CheckoutError> {
    let (Some(amount), Some(course_id), Some(course_name)) = (
        positive_amount(req.amount),
        present(req.course_id),
        present(req.course_name),
    ) else {
        return Err(CheckoutError::Invalid(
            "Amount, courseId, and courseName are required",
        ));
    };
    debug!(stage = %CheckoutStage::OrderRequested, %course_id, amount);

    let now_millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let order = st
        .gateway
        .create_order(NewOrder {
            amount,
            currency: st.config.gateway.currency.clone(),
            receipt: receipt_id(&course_id, now_millis),
            course_id: course_id.clone(),
            course_name,
        })
        .await
        .map_err(|e| {
            error!(error = %e, %course_id, "gateway order creation failed");
            CheckoutError::OrderCreationFailed(e)
        })?;

    debug!(stage = %CheckoutStage::OrderCreated, order_id = %order.id, %course_id);
    Ok(order)
}

pub async fn verify_and_provision(
    st: &AppState,
    claim: PaymentClaim,
) -> Result<Provisioned, CheckoutError> {
    debug!(
        stage = %CheckoutStage::PaymentClaimed,
        order_id = %claim.order_id,
        payment_id = %claim.payment_id,
        course_id = %claim.course_id,
    );

    if !st
        .gateway
        .verify_signature(&claim.order_id, &claim.payment_id, &claim.signature)
    {
        warn!(
            order_id = %claim.order_id,
            payment_id = %claim.payment_id,
            "payment signature mismatch"
        );
        return Err(CheckoutError::SignatureInvalid);
    }
    debug!(stage = %CheckoutStage::SignatureVerified, order_id = %claim.order_id);

    let email = checked_email(claim.email.clone())
        .map_err(|_| CheckoutError::Invalid("Invalid email"))?;
    let user = resolve_account(st, &email, &claim).await?;
    debug!(stage = %CheckoutStage::AccountResolved, user_id = %user.id);

    let purchase = record_purchase(st, &user, &claim).await?;
    debug!(stage = %CheckoutStage::PurchaseRecorded, purchase_id = %purchase.id);

    let (token, public) =
        issue_session(st, &user).map_err(|e| CheckoutError::ProvisioningFailed {
            stage: CheckoutStage::PurchaseRecorded,
            source: e.into(),
        })?;
    debug!(stage = %CheckoutStage::SessionIssued, user_id = %user.id);

    info!(
        user_id = %user.id,
        course_id = %purchase.course_id,
        order_id = %purchase.gateway_order_id,
        payment_id = %purchase.gateway_payment_id,
        "course purchased"
    );
    Ok(Provisioned {
        token,
        user: public,
        purchase,
    })
}

/// Existing account for `email`, or a fresh one bootstrapped from the claim.
async fn resolve_account(
    st: &AppState,
    email: &str,
    claim: &PaymentClaim,
) -> Result<User, CheckoutError> {
    let after = CheckoutStage::SignatureVerified;

    if let Some(existing) = st
        .users
        .find_by_email(email)
        .await
        .map_err(failed_after(after))?
    {
        return admit_returning_buyer(st, existing, &claim.password);
    }

    let password_hash = hash_password(&claim.password).map_err(|source| {
        CheckoutError::ProvisioningFailed {
            stage: after,
            source,
        }
    })?;
    match st
        .users
        .create(NewUser {
            email: email.to_string(),
            password_hash,
            name: claim.name.clone(),
        })
        .await
    {
        Ok(user) => {
            info!(user_id = %user.id, email = %user.email, "account created at checkout");
            Ok(user)
        }
        Err(StoreError::DuplicateKey) => {
            // A concurrent checkout or signup for the same email won the insert.
            let winner = st
                .users
                .find_by_email(email)
                .await
                .map_err(failed_after(after))?
                .ok_or_else(|| CheckoutError::ProvisioningFailed {
                    stage: after,
                    source: anyhow::anyhow!("user missing after duplicate email"),
                })?;
            admit_returning_buyer(st, winner, &claim.password)
        }
        Err(e) => Err(failed_after(after)(e)),
    }
}

fn admit_returning_buyer(
    st: &AppState,
    user: User,
    password: &str,
) -> Result<User, CheckoutError> {
    if !st.config.checkout.verify_returning_buyer {
        warn!(user_id = %user.id, "reusing existing account without re-authentication");
        return Ok(user);
    }

    let ok = verify_password(password, &user.password_hash).map_err(|source| {
        CheckoutError::ProvisioningFailed {
            stage: CheckoutStage::SignatureVerified,
            source,
        }
    })?;
    if ok {
        Ok(user)
    } else {
        warn!(user_id = %user.id, "checkout for existing account with wrong password");
        Err(CheckoutError::ReturningBuyerUnauthenticated)
    }
}

async fn record_purchase(
    st: &AppState,
    user: &User,
    claim: &PaymentClaim,
) -> Result<Purchase, CheckoutError> {
    let after = CheckoutStage::AccountResolved;

    if st
        .purchases
        .find_by_user_and_course(user.id, &claim.course_id)
        .await
        .map_err(failed_after(after))?
        .is_some()
    {
        warn!(user_id = %user.id, course_id = %claim.course_id, "course already purchased");
        return Err(CheckoutError::AlreadyPurchased);
    }

    match st
        .purchases
        .create(NewPurchase {
            user_id: user.id,
            course_id: claim.course_id.clone(),
            course_name: claim.course_name.clone(),
            course_image: claim.course_image.clone(),
            amount: claim.amount,
            gateway_order_id: claim.order_id.clone(),
            gateway_payment_id: claim.payment_id.clone(),
        })
        .await
    {
        Ok(p) => Ok(p),
        Err(StoreError::DuplicateKey) => {
            warn!(
                user_id = %user.id,
                course_id = %claim.course_id,
                payment_id = %claim.payment_id,
                "purchase rejected by uniqueness constraint"
            );
            Err(CheckoutError::AlreadyPurchased)
        }
        Err(e) => Err(failed_after(after)(e)),
    }
}
