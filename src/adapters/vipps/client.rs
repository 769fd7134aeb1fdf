//! Vipps/MobilePay ePayment API client.
//!
//! Implements the `PaymentGateway` port over reqwest. Every call goes
//! through the same pipeline:
//!
//! 1. Local sliding-window rate limit for the API host
//! 2. Circuit breaker for the API host
//! 3. Cached bearer token (refreshed when close to expiry)
//! 4. The HTTP request itself, with a per-request timeout
//!
//! Retryable failures (5xx, 429, timeouts, network errors) are retried with
//! exponential backoff and jitter, reusing the caller's idempotency key.
//!
//! # Configuration
//!
//! ```ignore
//! let config = VippsConfig::new(client_id, client_secret, subscription_key, msn)
//!     .with_base_url(ProviderEnvironment::Test.api_base_url());
//! let client = VippsClient::new(config, limiter, breaker)?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::foundation::{IdempotencyKey, Money, PaymentReference};
use crate::domain::payment::WebhookSubscription;
use crate::domain::webhook::ProviderEnvironment;
use crate::ports::{
    ApiError, CircuitBreaker, CreatePaymentRequest, CreatedPayment, PaymentDetails,
    PaymentGateway, RateLimitKey, RateLimitResult, RateLimiter, RegisterWebhookRequest,
    WebhookInfo,
};

use super::retry::RetryPolicy;
use super::token_cache::{TokenCache, DEFAULT_REFRESH_MARGIN};
use super::wire_types::{
    AccessTokenResponse, CreatePaymentBody, CreatePaymentResponse, ModificationBody,
    PaymentResponse, ProblemDetails, RegisterWebhookBody, RegisterWebhookResponse, VippsAmount,
    WebhookListResponse,
};

const PAYMENTS_PATH: &str = "/epayment/v1/payments";
const WEBHOOKS_PATH: &str = "/webhooks/v1/webhooks";
const TOKEN_PATH: &str = "/accesstoken/get";

/// Identifies this integration to the provider in `Vipps-System-*` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub name: String,
    pub version: String,
    pub plugin_name: String,
    pub plugin_version: String,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            name: "vipps-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            plugin_name: "vipps-gateway".to_string(),
            plugin_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Vipps API configuration.
#[derive(Clone)]
pub struct VippsConfig {
    client_id: String,
    client_secret: SecretString,
    subscription_key: SecretString,
    merchant_serial_number: String,

    /// Base URL for the API (default: test environment).
    base_url: String,

    system: SystemInfo,
    request_timeout: Duration,
    retry: RetryPolicy,
    token_refresh_margin: Duration,
}

impl VippsConfig {
    /// Create a new configuration against the test environment.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        subscription_key: impl Into<String>,
        merchant_serial_number: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            subscription_key: SecretString::new(subscription_key.into()),
            merchant_serial_number: merchant_serial_number.into(),
            base_url: ProviderEnvironment::Test.api_base_url().to_string(),
            system: SystemInfo::default(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            token_refresh_margin: DEFAULT_REFRESH_MARGIN,
        }
    }

    /// Use the API base URL of `environment`.
    pub fn for_environment(mut self, environment: ProviderEnvironment) -> Self {
        self.base_url = environment.api_base_url().to_string();
        self
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_system_info(mut self, system: SystemInfo) -> Self {
        self.system = system;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_token_refresh_margin(mut self, margin: Duration) -> Self {
        self.token_refresh_margin = margin;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn merchant_serial_number(&self) -> &str {
        &self.merchant_serial_number
    }
}

/// Vipps ePayment adapter.
///
/// Implements `PaymentGateway` for the ePayment and webhooks APIs.
pub struct VippsClient {
    config: VippsConfig,
    http_client: reqwest::Client,
    host: String,
    tokens: TokenCache,
    limiter: Arc<dyn RateLimiter>,
    breaker: Arc<dyn CircuitBreaker>,
}

impl VippsClient {
    /// Create a client. The limiter and breaker are keyed on the host of
    /// the configured base URL.
    pub fn new(
        config: VippsConfig,
        limiter: Arc<dyn RateLimiter>,
        breaker: Arc<dyn CircuitBreaker>,
    ) -> Result<Self, ApiError> {
        let host = reqwest::Url::parse(&config.base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .ok_or_else(|| {
                ApiError::Network(format!("invalid API base URL: {}", config.base_url))
            })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            tokens: TokenCache::new(config.token_refresh_margin),
            config,
            http_client,
            host,
            limiter,
            breaker,
        })
    }

    /// Host the limiter and breaker are keyed on.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Drop the cached access token.
    pub async fn invalidate_token(&self) {
        self.tokens.invalidate().await;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Headers every request carries, token request included.
    fn with_common_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let system = &self.config.system;
        request
            .header(
                "Ocp-Apim-Subscription-Key",
                self.config.subscription_key.expose_secret(),
            )
            .header("Merchant-Serial-Number", &self.config.merchant_serial_number)
            .header("Vipps-System-Name", &system.name)
            .header("Vipps-System-Version", &system.version)
            .header("Vipps-System-Plugin-Name", &system.plugin_name)
            .header("Vipps-System-Plugin-Version", &system.plugin_version)
    }

    fn transport_error(error: reqwest::Error, started: Instant) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout {
                elapsed: started.elapsed(),
            }
        } else {
            ApiError::Network(error.to_string())
        }
    }

    /// Sends a request and returns the body text of a 2xx response.
    async fn read_response(
        request: reqwest::RequestBuilder,
        started: Instant,
    ) -> Result<String, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| Self::transport_error(e, started))?;

        let status = response.status().as_u16();
        let trace_header = response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| Self::transport_error(e, started))?;

        if (200..300).contains(&status) {
            Ok(body)
        } else {
            Err(ProblemDetails::into_api_error(status, &body, trace_header))
        }
    }

    async fn fetch_token(&self) -> Result<(SecretString, Duration), ApiError> {
        let request = self
            .with_common_headers(self.http_client.post(self.url(TOKEN_PATH)))
            .header("client_id", &self.config.client_id)
            .header("client_secret", self.config.client_secret.expose_secret())
            .header(reqwest::header::CONTENT_LENGTH, "0");

        let body = Self::read_response(request, Instant::now()).await?;
        let token: AccessTokenResponse = parse_json(&body)?;

        Ok((
            SecretString::new(token.access_token),
            Duration::from_secs(token.expires_in.max(0) as u64),
        ))
    }

    async fn access_token(&self) -> Result<SecretString, ApiError> {
        self.tokens.get_or_refresh(|| self.fetch_token()).await
    }

    /// One attempt: limiter, breaker, token, request.
    async fn send_once(
        &self,
        method: &Method,
        path: &str,
        body: Option<&serde_json::Value>,
        idempotency_key: Option<&IdempotencyKey>,
    ) -> Result<String, ApiError> {
        match self.limiter.check(RateLimitKey::upstream_host(&self.host)).await {
            Ok(RateLimitResult::Denied(denied)) => {
                return Err(ApiError::RateLimited {
                    host: self.host.clone(),
                    retry_after: Duration::from_secs(u64::from(denied.retry_after_secs)),
                });
            }
            Ok(RateLimitResult::Allowed(_)) => {}
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "Rate limiter unavailable, sending anyway");
            }
        }

        if !self.breaker.should_allow() {
            return Err(ApiError::CircuitOpen {
                host: self.host.clone(),
            });
        }

        let result = self.dispatch(method, path, body, idempotency_key).await;
        match &result {
            Err(e) if e.trips_breaker() => self.breaker.record_failure(),
            // A 4xx still proves the provider is reachable.
            _ => self.breaker.record_success(),
        }
        result
    }

    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        body: Option<&serde_json::Value>,
        idempotency_key: Option<&IdempotencyKey>,
    ) -> Result<String, ApiError> {
        let token = self.access_token().await?;

        let mut request = self
            .with_common_headers(self.http_client.request(method.clone(), self.url(path)))
            .bearer_auth(token.expose_secret());
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key.as_str());
        }
        request = match body {
            Some(body) => request.json(body),
            None if *method == Method::POST => request.header(reqwest::header::CONTENT_LENGTH, "0"),
            None => request,
        };

        Self::read_response(request, Instant::now()).await
    }

    /// Runs one logical call with retries.
    async fn execute<B: Serialize>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: Option<&B>,
        idempotency_key: Option<&IdempotencyKey>,
    ) -> Result<String, ApiError> {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ApiError::InvalidResponse(format!("failed to encode request: {}", e)))?;

        let mut attempt = 0;
        let mut token_renewed = false;
        loop {
            attempt += 1;
            let err = match self
                .send_once(&method, path, body.as_ref(), idempotency_key)
                .await
            {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if err.is_unauthorized() && !token_renewed {
                tracing::info!(operation, "Access token rejected, renewing");
                self.invalidate_token().await;
                token_renewed = true;
                attempt -= 1;
                continue;
            }

            if !self.config.retry.should_retry(attempt, &err) {
                tracing::warn!(
                    operation,
                    attempt,
                    status = err.status(),
                    error = %err,
                    "Vipps request failed"
                );
                return Err(err);
            }

            let delay = self.config.retry.backoff(attempt);
            tracing::warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Vipps request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body)
        .map_err(|e| ApiError::InvalidResponse(format!("failed to parse response: {}", e)))
}

fn modification_body(amount: &Money) -> ModificationBody {
    ModificationBody {
        modification_amount: VippsAmount {
            currency: amount.currency.to_string(),
            value: amount.value,
        },
    }
}

#[async_trait]
impl PaymentGateway for VippsClient {
    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
        idempotency_key: &IdempotencyKey,
    ) -> Result<CreatedPayment, ApiError> {
        let body = CreatePaymentBody::from(&request);
        let response = self
            .execute(
                "create_payment",
                Method::POST,
                PAYMENTS_PATH,
                Some(&body),
                Some(idempotency_key),
            )
            .await?;

        let created: CreatePaymentResponse = parse_json(&response)?;
        tracing::info!(reference = %request.reference, "Payment created at Vipps");
        Ok(created.into())
    }

    async fn get_payment(&self, reference: &PaymentReference) -> Result<PaymentDetails, ApiError> {
        let path = format!("{}/{}", PAYMENTS_PATH, reference);
        let response = self
            .execute::<()>("get_payment", Method::GET, &path, None, None)
            .await?;
        parse_json::<PaymentResponse>(&response)?.try_into()
    }

    async fn capture_payment(
        &self,
        reference: &PaymentReference,
        amount: &Money,
        idempotency_key: &IdempotencyKey,
    ) -> Result<PaymentDetails, ApiError> {
        let path = format!("{}/{}/capture", PAYMENTS_PATH, reference);
        let response = self
            .execute(
                "capture_payment",
                Method::POST,
                &path,
                Some(&modification_body(amount)),
                Some(idempotency_key),
            )
            .await?;
        parse_json::<PaymentResponse>(&response)?.try_into()
    }

    async fn cancel_payment(
        &self,
        reference: &PaymentReference,
        idempotency_key: &IdempotencyKey,
    ) -> Result<PaymentDetails, ApiError> {
        let path = format!("{}/{}/cancel", PAYMENTS_PATH, reference);
        let response = self
            .execute::<()>(
                "cancel_payment",
                Method::POST,
                &path,
                None,
                Some(idempotency_key),
            )
            .await?;
        parse_json::<PaymentResponse>(&response)?.try_into()
    }

    async fn refund_payment(
        &self,
        reference: &PaymentReference,
        amount: &Money,
        idempotency_key: &IdempotencyKey,
    ) -> Result<PaymentDetails, ApiError> {
        let path = format!("{}/{}/refund", PAYMENTS_PATH, reference);
        let response = self
            .execute(
                "refund_payment",
                Method::POST,
                &path,
                Some(&modification_body(amount)),
                Some(idempotency_key),
            )
            .await?;
        parse_json::<PaymentResponse>(&response)?.try_into()
    }

    async fn register_webhook(
        &self,
        request: RegisterWebhookRequest,
        idempotency_key: &IdempotencyKey,
    ) -> Result<WebhookSubscription, ApiError> {
        let body = RegisterWebhookBody {
            url: request.url,
            events: request.events,
        };
        let response = self
            .execute(
                "register_webhook",
                Method::POST,
                WEBHOOKS_PATH,
                Some(&body),
                Some(idempotency_key),
            )
            .await?;

        let registered: RegisterWebhookResponse = parse_json(&response)?;
        tracing::info!(webhook_id = %registered.id, "Webhook registered at Vipps");
        Ok(WebhookSubscription::new(registered.id, registered.secret))
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookInfo>, ApiError> {
        let response = self
            .execute::<()>("list_webhooks", Method::GET, WEBHOOKS_PATH, None, None)
            .await?;
        let list: WebhookListResponse = parse_json(&response)?;
        Ok(list.webhooks.into_iter().map(WebhookInfo::from).collect())
    }

    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), ApiError> {
        let path = format!("{}/{}", WEBHOOKS_PATH, webhook_id);
        self.execute::<()>("delete_webhook", Method::DELETE, &path, None, None)
            .await?;
        tracing::info!(webhook_id, "Webhook deleted at Vipps");
        Ok(())
    }
}
