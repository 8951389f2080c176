use crate::{config::AppConfig, errors::ServiceError};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Payment notification delivered by the gateway to the callback endpoint.
///
/// Field names follow the gateway wire format. `sign` covers every other
/// field and is checked before the notification is acted on.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentNotification {
    pub merchant_id: i64,
    pub pos_id: i64,
    /// Our transaction id, echoed back by the gateway.
    pub session_id: String,
    /// Amount in minor units (grosz).
    pub amount: i64,
    pub origin_amount: i64,
    pub currency: String,
    /// Gateway-side numeric order id.
    pub order_id: i64,
    pub method_id: i64,
    pub statement: String,
    pub sign: String,
}

/// Outcome of registering an order with the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRedirect {
    /// The remote transaction token.
    pub gateway_order_id: String,
    /// Where the customer is sent to pay.
    pub redirect_url: String,
}

/// Order data handed to the gateway adapter by the orchestrator.
#[derive(Debug, Clone)]
pub struct RegisterOrder {
    pub session_id: Uuid,
    /// Amount in minor units (grosz).
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub email: String,
}

/// Digest strategy for gateway sign fields.
///
/// Production uses HMAC-SHA256 keyed with the merchant CRC key; tests plug
/// in their own signer.
pub trait OrderSigner: Send + Sync {
    /// Digest for the order registration request.
    fn register_digest(
        &self,
        session_id: &str,
        merchant_id: i64,
        amount: i64,
        currency: &str,
    ) -> String;

    /// Digest for an incoming payment notification (excluding `sign`).
    fn callback_digest(&self, notification: &PaymentNotification) -> String;
}

/// HMAC-SHA256 signer keyed by the gateway CRC key.
pub struct HmacOrderSigner {
    crc_key: String,
}

impl HmacOrderSigner {
    pub fn new(crc_key: String) -> Self {
        Self { crc_key }
    }

    fn hmac_hex(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.crc_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl OrderSigner for HmacOrderSigner {
    fn register_digest(
        &self,
        session_id: &str,
        merchant_id: i64,
        amount: i64,
        currency: &str,
    ) -> String {
        // sign string per gateway contract: compact JSON, fixed field order
        let payload = format!(
            r#"{{"sessionId":"{}","merchantId":{},"amount":{},"currency":"{}"}}"#,
            session_id, merchant_id, amount, currency
        );
        self.hmac_hex(&payload)
    }

    fn callback_digest(&self, n: &PaymentNotification) -> String {
        let payload = format!(
            concat!(
                r#"{{"merchantId":{},"posId":{},"sessionId":"{}","amount":{},"#,
                r#""originAmount":{},"currency":"{}","orderId":{},"methodId":{},"#,
                r#""statement":"{}"}}"#
            ),
            n.merchant_id,
            n.pos_id,
            n.session_id,
            n.amount,
            n.origin_amount,
            n.currency,
            n.order_id,
            n.method_id,
            n.statement
        );
        self.hmac_hex(&payload)
    }
}

/// Checks a notification's `sign` against the expected digest.
///
/// Comparison is constant time; a mismatch maps to `InvalidSignature` so the
/// callback handler answers 401 without touching any state.
pub fn verify_callback(
    signer: &dyn OrderSigner,
    notification: &PaymentNotification,
) -> Result<(), ServiceError> {
    let expected = signer.callback_digest(notification);
    if !constant_time_eq(&expected, &notification.sign) {
        warn!(
            "Rejecting gateway callback with bad signature for session {}",
            notification.session_id
        );
        return Err(ServiceError::InvalidSignature);
    }
    Ok(())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Client for the payment gateway's order registration API.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn register_order(&self, order: &RegisterOrder) -> Result<GatewayRedirect, ServiceError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterOrderWire<'a> {
    merchant_id: i64,
    pos_id: i64,
    session_id: String,
    amount: i64,
    currency: &'a str,
    description: &'a str,
    email: &'a str,
    country: &'a str,
    language: &'a str,
    url_return: &'a str,
    url_status: &'a str,
    sign: String,
}

#[derive(Deserialize)]
struct RegisterOrderResponse {
    data: Option<RegisterOrderData>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct RegisterOrderData {
    token: String,
}

/// Gateway client over HTTP with Basic auth (`pos_id:api_key`).
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    merchant_id: i64,
    pos_id: i64,
    api_key: String,
    return_url: String,
    status_url: String,
    signer: Arc<dyn OrderSigner>,
}

impl HttpPaymentGateway {
    pub fn from_config(cfg: &AppConfig, signer: Arc<dyn OrderSigner>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client init failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: cfg.gateway_base_url.trim_end_matches('/').to_string(),
            merchant_id: cfg.gateway_merchant_id,
            pos_id: cfg.gateway_pos_id(),
            api_key: cfg.gateway_api_key.clone(),
            return_url: cfg.gateway_return_url.clone(),
            status_url: cfg.gateway_status_url.clone(),
            signer,
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self))]
    async fn register_order(&self, order: &RegisterOrder) -> Result<GatewayRedirect, ServiceError> {
        let session_id = order.session_id.to_string();
        let sign = self.signer.register_digest(
            &session_id,
            self.merchant_id,
            order.amount,
            &order.currency,
        );

        let wire = RegisterOrderWire {
            merchant_id: self.merchant_id,
            pos_id: self.pos_id,
            session_id,
            amount: order.amount,
            currency: &order.currency,
            description: &order.description,
            email: &order.email,
            country: "PL",
            language: "pl",
            url_return: &self.return_url,
            url_status: &self.status_url,
            sign,
        };

        let url = format!("{}/api/v1/transaction/register", self.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(self.pos_id.to_string(), Some(&self.api_key))
            .json(&wire)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("register request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Gateway register returned {}: {}", status, body);
            counter!("edupay_gateway.register_failures", 1);
            return Err(ServiceError::GatewayError(format!(
                "register returned {}",
                status
            )));
        }

        let parsed: RegisterOrderResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("invalid register response: {}", e)))?;

        if let Some(error) = parsed.error.filter(|e| !e.is_empty()) {
            return Err(ServiceError::GatewayError(format!(
                "register rejected: {}",
                error
            )));
        }

        let token = parsed
            .data
            .map(|d| d.token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ServiceError::GatewayError("register response carried no token".to_string())
            })?;

        let redirect_url = format!("{}/trnRequest/{}", self.base_url, token);
        info!("Gateway order registered, token {}", token);
        counter!("edupay_gateway.orders_registered", 1);

        Ok(GatewayRedirect {
            gateway_order_id: token,
            redirect_url,
        })
    }
}
