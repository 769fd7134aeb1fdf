//! WebhookValidator - authenticates and deduplicates inbound deliveries.
//!
//! Runs the checks in a fixed order and stops at the first failure:
//!
//! 1. payload well-formedness
//! 2. header presence
//! 3. content hash
//! 4. timestamp freshness
//! 5. HMAC signature with the transaction's secret
//! 6. source address against the environment's callback hosts
//! 7. deduplication against the event store
//!
//! A delivery that passes is recorded in the event store before it is
//! returned, so concurrent copies of the same event see exactly one
//! `duplicate = false`.

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use secrecy::ExposeSecret;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::payment::Transaction;
use crate::domain::webhook::signature::{verify_content_hash, verify_freshness, verify_signature};
use crate::domain::webhook::{
    ProviderEnvironment, WebhookEventRecord, WebhookHeaderNames, WebhookHeaders, WebhookPayload,
    WebhookRejection, DEFAULT_TOLERANCE_SECS,
};
use crate::ports::{
    EventStore, HostResolver, RateLimitKey, RateLimitResult, RateLimiter, TransactionRepository,
};

/// Validator settings.
#[derive(Debug, Clone)]
pub struct WebhookValidatorConfig {
    pub environment: ProviderEnvironment,
    pub header_names: WebhookHeaderNames,
    /// Maximum clock skew accepted on the date header, in seconds.
    pub tolerance_secs: i64,
    /// Reject untrusted sources even outside production.
    pub enforce_source_check: bool,
}

impl Default for WebhookValidatorConfig {
    fn default() -> Self {
        Self {
            environment: ProviderEnvironment::default(),
            header_names: WebhookHeaderNames::default(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            enforce_source_check: false,
        }
    }
}

impl WebhookValidatorConfig {
    pub fn for_environment(environment: ProviderEnvironment) -> Self {
        Self {
            environment,
            ..Self::default()
        }
    }

    pub fn with_header_names(mut self, names: WebhookHeaderNames) -> Self {
        self.header_names = names;
        self
    }

    pub fn with_tolerance_secs(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    pub fn with_enforced_source_check(mut self, enforce: bool) -> Self {
        self.enforce_source_check = enforce;
        self
    }

    fn source_check_is_fatal(&self) -> bool {
        self.enforce_source_check || self.environment.enforces_source_check()
    }
}

/// One inbound delivery as received by the HTTP layer.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Peer address of the connection, after any trusted proxy header.
    pub peer: Option<IpAddr>,
}

/// A delivery that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedWebhook {
    pub payload: WebhookPayload,
    /// Transaction as loaded for signature verification.
    pub transaction: Transaction,
    pub record: WebhookEventRecord,
    /// True if this event was seen before with the same body.
    pub duplicate: bool,
    /// Parsed date header.
    pub sent_at: Timestamp,
}

pub struct WebhookValidator {
    transactions: Arc<dyn TransactionRepository>,
    events: Arc<dyn EventStore>,
    resolver: Arc<dyn HostResolver>,
    peer_limiter: Option<Arc<dyn RateLimiter>>,
    config: WebhookValidatorConfig,
}

impl WebhookValidator {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        events: Arc<dyn EventStore>,
        resolver: Arc<dyn HostResolver>,
        config: WebhookValidatorConfig,
    ) -> Self {
        Self {
            transactions,
            events,
            resolver,
            peer_limiter: None,
            config,
        }
    }

    /// Limits deliveries per peer address before any other check runs.
    pub fn with_peer_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.peer_limiter = Some(limiter);
        self
    }

    pub fn config(&self) -> &WebhookValidatorConfig {
        &self.config
    }

    /// Validates one delivery at `now`.
    ///
    /// Rejections are logged here, with the payload's identifiers once it parses.
    pub async fn validate(
        &self,
        request: &WebhookRequest,
        now: Timestamp,
    ) -> Result<ValidatedWebhook, WebhookRejection> {
        let mut seen = DeliveryIds::default();
        let result = self.run_checks(request, now, &mut seen).await;

        if let Err(rejection) = &result {
            tracing::warn!(
                kind = rejection.kind(),
                peer = ?request.peer,
                reference = %seen.reference.as_deref().unwrap_or("-"),
                event_id = %seen.event_id.as_deref().unwrap_or("-"),
                idempotency_key = %seen.idempotency_key.as_deref().unwrap_or("-"),
                error = %rejection,
                "Webhook rejected"
            );
        }
        result
    }

    async fn run_checks(
        &self,
        request: &WebhookRequest,
        now: Timestamp,
        seen: &mut DeliveryIds,
    ) -> Result<ValidatedWebhook, WebhookRejection> {
        self.check_peer_rate(request.peer).await?;

        // 1. Payload
        let payload = WebhookPayload::parse(&request.body)?;
        *seen = DeliveryIds::from(&payload);

        // 2. Headers
        let headers = WebhookHeaders::extract(&request.headers, &self.config.header_names)?;

        // 3. Content hash
        verify_content_hash(&request.body, &headers.content_hash)?;

        // 4. Freshness
        let sent_at = verify_freshness(&headers.date, now, self.config.tolerance_secs)?;

        // 5. Signature
        let transaction = self
            .transactions
            .find_by_reference(&payload.reference)
            .await
            .map_err(storage)?
            .ok_or_else(|| WebhookRejection::UnknownTransaction(payload.reference.to_string()))?;
        let secret = transaction
            .webhook()
            .map(|w| w.secret.expose_secret().as_bytes().to_vec())
            .ok_or(WebhookRejection::InvalidSignature)?;
        verify_signature(&secret, &headers, &self.config.header_names)?;

        // 6. Source
        self.check_source(request.peer).await?;

        // 7. Deduplication
        let record = WebhookEventRecord::from_payload(&payload, &headers.content_hash, now);
        let duplicate = self.deduplicate(&record).await?;

        Ok(ValidatedWebhook {
            payload,
            transaction,
            record,
            duplicate,
            sent_at,
        })
    }

    async fn check_peer_rate(&self, peer: Option<IpAddr>) -> Result<(), WebhookRejection> {
        let (limiter, peer) = match (&self.peer_limiter, peer) {
            (Some(limiter), Some(peer)) => (limiter, peer),
            _ => return Ok(()),
        };

        match limiter.check(RateLimitKey::webhook_peer(&peer.to_string())).await {
            Ok(RateLimitResult::Allowed(_)) => Ok(()),
            Ok(RateLimitResult::Denied(denied)) => Err(WebhookRejection::RateLimited {
                retry_after_secs: u64::from(denied.retry_after_secs),
            }),
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "Peer rate limiter unavailable, allowing delivery");
                Ok(())
            }
        }
    }

    async fn check_source(&self, peer: Option<IpAddr>) -> Result<(), WebhookRejection> {
        let failure = match peer {
            None => Some("peer address unknown".to_string()),
            Some(ip) => {
                if self.is_callback_address(ip).await {
                    None
                } else {
                    Some(ip.to_string())
                }
            }
        };

        match failure {
            None => Ok(()),
            Some(reason) if self.config.source_check_is_fatal() => {
                Err(WebhookRejection::UntrustedSource(reason))
            }
            Some(reason) => {
                tracing::warn!(
                    environment = %self.config.environment,
                    source = %reason,
                    "Webhook source not in callback hosts, accepting outside production"
                );
                Ok(())
            }
        }
    }

    /// Resolves the callback hosts now; a host that fails to resolve is skipped.
    async fn is_callback_address(&self, ip: IpAddr) -> bool {
        for host in self.config.environment.callback_hosts() {
            match self.resolver.resolve(host).await {
                Ok(addresses) if addresses.contains(&ip) => return true,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "Callback host lookup failed");
                }
            }
        }
        false
    }

    /// Returns `true` for a redelivery of an event already recorded.
    async fn deduplicate(&self, record: &WebhookEventRecord) -> Result<bool, WebhookRejection> {
        if let Some(existing) = self.events.find_matching(record).await.map_err(storage)? {
            return compare(&existing, record);
        }

        let outcome = self.events.insert(record).await.map_err(storage)?;
        if outcome.inserted {
            return Ok(false);
        }

        // Lost the insert race to a concurrent delivery.
        match self.events.find_matching(record).await.map_err(storage)? {
            Some(existing) => compare(&existing, record),
            None => Err(WebhookRejection::Storage(format!(
                "event {} reported present but not found",
                record.dedup_key
            ))),
        }
    }
}

fn compare(existing: &WebhookEventRecord, incoming: &WebhookEventRecord) -> Result<bool, WebhookRejection> {
    if incoming.is_redelivery_of(existing) {
        Ok(true)
    } else {
        Err(WebhookRejection::ConflictingDuplicate(incoming.dedup_key.clone()))
    }
}

/// Identifiers of a delivery whose payload parsed.
#[derive(Debug, Default)]
struct DeliveryIds {
    reference: Option<String>,
    event_id: Option<String>,
    idempotency_key: Option<String>,
}

impl From<&WebhookPayload> for DeliveryIds {
    fn from(payload: &WebhookPayload) -> Self {
        Self {
            reference: Some(payload.reference.to_string()),
            event_id: payload.event_id.clone(),
            idempotency_key: payload.idempotency_key.clone(),
        }
    }
}

fn storage(err: DomainError) -> WebhookRejection {
    WebhookRejection::Storage(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::dns::StaticHostResolver;
    use crate::adapters::memory::{InMemoryEventStore, InMemoryTransactionRepository};
    use crate::adapters::rate_limiter::{InMemoryRateLimiter, RateLimitConfig, WindowLimit};
    use crate::domain::foundation::{Currency, Money, PaymentReference};
    use crate::domain::payment::{CapturePolicy, WebhookSubscription};
    use crate::domain::webhook::WebhookSigner;
    use axum::http::{HeaderName, HeaderValue};

    const SECRET: &str = "per-transaction-secret";
    const HOST: &str = "merchant.example";

    struct Fixture {
        transactions: Arc<InMemoryTransactionRepository>,
        events: Arc<InMemoryEventStore>,
    }

    impl Fixture {
        async fn new() -> Self {
            let transactions = Arc::new(InMemoryTransactionRepository::new());
            let mut tx = Transaction::create(
                PaymentReference::new("order-1").unwrap(),
                Money::new(1000, Currency::nok()).unwrap(),
                CapturePolicy::Manual,
                None,
            );
            tx.attach_webhook(WebhookSubscription::new("wh-1", SECRET)).unwrap();
            transactions.insert(&tx).await.unwrap();

            Self {
                transactions,
                events: Arc::new(InMemoryEventStore::new()),
            }
        }

        fn validator(&self, config: WebhookValidatorConfig) -> WebhookValidator {
            let resolver = StaticHostResolver::new()
                .with_host("callback-mt-1.vipps.no", vec!["10.0.0.1".parse().unwrap()]);
            WebhookValidator::new(
                self.transactions.clone(),
                self.events.clone(),
                Arc::new(resolver),
                config,
            )
        }
    }

    fn body(event_id: &str, value: i64) -> Vec<u8> {
        format!(
            r#"{{"msn":"123456","reference":"order-1","pspReference":"psp-1",
                "name":"epayments.payment.authorized.v1",
                "amount":{{"currency":"NOK","value":{}}},"eventId":"{}","success":true}}"#,
            value, event_id
        )
        .into_bytes()
    }

    fn body_with_key(event_id: &str, idempotency_key: &str) -> Vec<u8> {
        format!(
            r#"{{"msn":"123456","reference":"order-1","pspReference":"psp-1",
                "name":"epayments.payment.authorized.v1",
                "amount":{{"currency":"NOK","value":1000}},"eventId":"{}",
                "idempotencyKey":"{}","success":true}}"#,
            event_id, idempotency_key
        )
        .into_bytes()
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn signed(body: Vec<u8>, secret: &str, date: Timestamp, peer: &str) -> WebhookRequest {
        let mut headers = HeaderMap::new();
        for (name, value) in WebhookSigner::new(secret)
            .sign_request(&body, HOST, date)
            .unwrap()
        {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(&value).unwrap(),
            );
        }
        WebhookRequest {
            headers,
            body,
            peer: Some(peer.parse().unwrap()),
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Happy Path
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn accepts_correctly_signed_delivery_and_records_it() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator(WebhookValidatorConfig::default());
        let now = Timestamp::now();

        let validated = validator
            .validate(&signed(body("evt-1", 1000), SECRET, now, "10.0.0.1"), now)
            .await
            .unwrap();

        assert!(!validated.duplicate);
        assert_eq!(validated.record.dedup_key, "event:evt-1");
        assert_eq!(validated.payload.value, 1000);
        assert!(fixture.events.exists("event:evt-1").await.unwrap());
    }

    #[tokio::test]
    async fn identical_redelivery_is_flagged_duplicate() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator(WebhookValidatorConfig::default());
        let now = Timestamp::now();
        let request = signed(body("evt-1", 1000), SECRET, now, "10.0.0.1");

        validator.validate(&request, now).await.unwrap();
        let second = validator.validate(&request, now).await.unwrap();

        assert!(second.duplicate);
        assert_eq!(fixture.events.len().await, 1);
    }

    #[tokio::test]
    async fn new_event_id_under_same_idempotency_key_is_duplicate() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator(WebhookValidatorConfig::default());
        let now = Timestamp::now();

        let first = validator
            .validate(&signed(body_with_key("evt-A", "IK-1"), SECRET, now, "10.0.0.1"), now)
            .await
            .unwrap();
        let second = validator
            .validate(&signed(body_with_key("evt-B", "IK-1"), SECRET, now, "10.0.0.1"), now)
            .await
            .unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(fixture.events.len().await, 1);
    }

    // ══════════════════════════════════════════════════════════════
    // Rejections
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn rejection_log_names_reference_and_event_id() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator(WebhookValidatorConfig::default());
        let now = Timestamp::now();
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let err = validator
            .validate(&signed(body("evt-9", 1000), "other-secret", now, "10.0.0.1"), now)
            .await
            .unwrap_err();

        assert_eq!(err, WebhookRejection::InvalidSignature);
        let output = logs.contents();
        assert!(output.contains("Webhook rejected"), "log was: {}", output);
        assert!(output.contains("reference=order-1"), "log was: {}", output);
        assert!(output.contains("event_id=evt-9"), "log was: {}", output);
        assert!(output.contains("invalid_signature"), "log was: {}", output);
    }

    #[tokio::test]
    async fn same_event_id_with_different_body_conflicts() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator(WebhookValidatorConfig::default());
        let now = Timestamp::now();

        validator
            .validate(&signed(body("evt-1", 1000), SECRET, now, "10.0.0.1"), now)
            .await
            .unwrap();
        let err = validator
            .validate(&signed(body("evt-1", 500), SECRET, now, "10.0.0.1"), now)
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookRejection::ConflictingDuplicate(_)));
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid_signature() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator(WebhookValidatorConfig::default());
        let now = Timestamp::now();

        let err = validator
            .validate(&signed(body("evt-1", 1000), "other-secret", now, "10.0.0.1"), now)
            .await
            .unwrap_err();

        assert_eq!(err, WebhookRejection::InvalidSignature);
        assert!(fixture.events.is_empty().await);
    }

    #[tokio::test]
    async fn tampered_body_fails_content_hash() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator(WebhookValidatorConfig::default());
        let now = Timestamp::now();

        let mut request = signed(body("evt-1", 1000), SECRET, now, "10.0.0.1");
        request.body = body("evt-1", 9000);

        let err = validator.validate(&request, now).await.unwrap_err();
        assert_eq!(err, WebhookRejection::ContentHashMismatch);
    }

    #[tokio::test]
    async fn stale_date_is_rejected() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator(WebhookValidatorConfig::default());
        let now = Timestamp::now();
        let sent = now.minus_secs(600);

        let err = validator
            .validate(&signed(body("evt-1", 1000), SECRET, sent, "10.0.0.1"), now)
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookRejection::StaleOrFutureTimestamp(_)));
    }

    #[tokio::test]
    async fn unknown_reference_is_reported() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator(WebhookValidatorConfig::default());
        let now = Timestamp::now();
        let other = String::from_utf8(body("evt-1", 1000))
            .unwrap()
            .replace("order-1", "order-404")
            .into_bytes();

        let err = validator
            .validate(&signed(other, SECRET, now, "10.0.0.1"), now)
            .await
            .unwrap_err();

        assert_eq!(err, WebhookRejection::UnknownTransaction("order-404".to_string()));
    }

    #[tokio::test]
    async fn missing_headers_are_named() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator(WebhookValidatorConfig::default());
        let request = WebhookRequest {
            headers: HeaderMap::new(),
            body: body("evt-1", 1000),
            peer: None,
        };

        let err = validator.validate(&request, Timestamp::now()).await.unwrap_err();
        match err {
            WebhookRejection::MissingHeaders(names) => assert!(names.contains("x-ms-date")),
            other => panic!("unexpected rejection: {:?}", other),
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Source Check
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn untrusted_source_is_soft_fail_in_test_environment() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator(WebhookValidatorConfig::default());
        let now = Timestamp::now();

        let result = validator
            .validate(&signed(body("evt-1", 1000), SECRET, now, "192.0.2.7"), now)
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn untrusted_source_is_rejected_when_enforced() {
        let fixture = Fixture::new().await;
        let validator =
            fixture.validator(WebhookValidatorConfig::default().with_enforced_source_check(true));
        let now = Timestamp::now();

        let err = validator
            .validate(&signed(body("evt-1", 1000), SECRET, now, "192.0.2.7"), now)
            .await
            .unwrap_err();

        assert_eq!(err, WebhookRejection::UntrustedSource("192.0.2.7".to_string()));
        assert!(fixture.events.is_empty().await);
    }

    #[tokio::test]
    async fn production_rejects_peers_outside_production_hosts() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator(WebhookValidatorConfig::for_environment(
            ProviderEnvironment::Production,
        ));
        let now = Timestamp::now();

        // 10.0.0.1 only resolves for a test-environment host.
        let err = validator
            .validate(&signed(body("evt-1", 1000), SECRET, now, "10.0.0.1"), now)
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookRejection::UntrustedSource(_)));
    }

    // ══════════════════════════════════════════════════════════════
    // Peer Rate Limit
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn peer_over_limit_is_rate_limited() {
        let fixture = Fixture::new().await;
        let limiter = InMemoryRateLimiter::new(RateLimitConfig {
            upstream: WindowLimit::new(100, 60),
            webhook_peer: WindowLimit::new(1, 60),
        });
        let validator = fixture
            .validator(WebhookValidatorConfig::default())
            .with_peer_limiter(Arc::new(limiter));
        let now = Timestamp::now();

        validator
            .validate(&signed(body("evt-1", 1000), SECRET, now, "10.0.0.1"), now)
            .await
            .unwrap();
        let err = validator
            .validate(&signed(body("evt-2", 1000), SECRET, now, "10.0.0.1"), now)
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookRejection::RateLimited { .. }));
    }
}
