use crate::auth::jwt::JwtKeys;
use crate::auth::repo::{CredentialStore, PgCredentialStore};
use crate::config::AppConfig;
use crate::db;
use crate::payments::gateway::{PaymentGateway, RazorpayClient};
use crate::payments::repo::{PgPurchaseLedger, PurchaseLedger};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtKeys>,
    pub users: Arc<dyn CredentialStore>,
    pub purchases: Arc<dyn PurchaseLedger>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let pool = db::connect(&config).await?;
        let gateway = Arc::new(RazorpayClient::new(&config.gateway)?) as Arc<dyn PaymentGateway>;

        Ok(Self::from_parts(
            config,
            Arc::new(PgCredentialStore::new(pool.clone())),
            Arc::new(PgPurchaseLedger::new(pool)),
            gateway,
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn CredentialStore>,
        purchases: Arc<dyn PurchaseLedger>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let jwt = Arc::new(JwtKeys::new(&config.jwt));
        Self {
            config,
            jwt,
            users,
            purchases,
            gateway,
        }
    }
}
