//! Integration tests for the webhook endpoint and payment lifecycle.
//!
//! These tests drive the axum router with signed deliveries while payment
//! commands run against the mock gateway:
//! 1. Happy path from creation to full refund
//! 2. Partial refunds reported by webhook
//! 3. Out-of-order and replayed deliveries
//! 4. Authentication failures and unknown references
//! 5. Expiry of abandoned payments

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tower::ServiceExt;

use vipps_gateway::adapters::dns::StaticHostResolver;
use vipps_gateway::adapters::http::webhook::WebhookAckResponse;
use vipps_gateway::adapters::http::{webhook_router, WebhookAppState};
use vipps_gateway::adapters::memory::{InMemoryEventStore, InMemoryTransactionRepository};
use vipps_gateway::adapters::notify::ChannelNotifier;
use vipps_gateway::adapters::vipps::MockPaymentGateway;
use vipps_gateway::application::{
    CapturePaymentCommand, CapturePaymentHandler, CreatePaymentCommand, CreatePaymentConfig,
    CreatePaymentHandler, ExpireStaleHandler, HandleWebhookHandler, RefundPaymentCommand,
    RefundPaymentHandler, SideEffectRunner, TransactionLocks, WebhookValidator,
    WebhookValidatorConfig,
};
use vipps_gateway::domain::foundation::{Currency, Money, PaymentReference, Timestamp};
use vipps_gateway::domain::payment::{CapturePolicy, Transaction, TransactionState};
use vipps_gateway::domain::webhook::WebhookSigner;
use vipps_gateway::ports::{TransactionNotification, TransactionRepository, UserFlow};

// =============================================================================
// Test Infrastructure
// =============================================================================

const CALLBACK_HOST: &str = "gateway.example";

struct TestGateway {
    router: Router,
    transactions: Arc<InMemoryTransactionRepository>,
    gateway: Arc<MockPaymentGateway>,
    notifications: mpsc::Receiver<TransactionNotification>,
    create: CreatePaymentHandler,
    capture: CapturePaymentHandler,
    refund: RefundPaymentHandler,
    expire: ExpireStaleHandler,
}

impl TestGateway {
    fn new() -> Self {
        let transactions = Arc::new(InMemoryTransactionRepository::new());
        let events = Arc::new(InMemoryEventStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let locks = Arc::new(TransactionLocks::new());
        let (notifier, notifications) = ChannelNotifier::new(64);
        let effects = Arc::new(SideEffectRunner::new(
            gateway.clone(),
            transactions.clone(),
            Arc::new(notifier),
        ));

        let resolver = StaticHostResolver::new()
            .with_host("callback-mt-1.vipps.no", vec!["10.0.0.1".parse().unwrap()]);
        let validator = WebhookValidator::new(
            transactions.clone(),
            events,
            Arc::new(resolver),
            WebhookValidatorConfig::default(),
        );
        let webhook_handler = Arc::new(HandleWebhookHandler::new(
            Arc::new(validator),
            transactions.clone(),
            locks.clone(),
            effects.clone(),
        ));

        let router = webhook_router()
            .with_state(WebhookAppState::new(webhook_handler))
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 1], 443))));

        Self {
            router,
            create: CreatePaymentHandler::new(
                transactions.clone(),
                gateway.clone(),
                CreatePaymentConfig::new(format!("https://{}/webhooks/vipps", CALLBACK_HOST)),
            ),
            capture: CapturePaymentHandler::new(
                transactions.clone(),
                gateway.clone(),
                locks.clone(),
                effects.clone(),
            ),
            refund: RefundPaymentHandler::new(
                transactions.clone(),
                gateway.clone(),
                locks.clone(),
                effects.clone(),
            ),
            expire: ExpireStaleHandler::new(transactions.clone(), locks, effects),
            transactions,
            gateway,
            notifications,
        }
    }

    async fn create_payment(&self, reference: &str, policy: CapturePolicy) -> Transaction {
        self.create
            .handle(CreatePaymentCommand {
                reference: reference_of(reference),
                amount: Money::new(1000, Currency::nok()).unwrap(),
                capture_policy: policy,
                user_flow: UserFlow::WebRedirect,
                return_url: "https://shop.example/return".to_string(),
                customer_phone_number: None,
                description: Some("Order".to_string()),
                expires_in_minutes: None,
            })
            .await
            .unwrap();
        self.stored(reference).await
    }

    async fn stored(&self, reference: &str) -> Transaction {
        self.transactions
            .find_by_reference(&reference_of(reference))
            .await
            .unwrap()
            .unwrap()
    }

    /// Posts `body` signed with the transaction's webhook secret.
    async fn deliver(
        &self,
        tx: &Transaction,
        body: &[u8],
        date: Timestamp,
    ) -> (StatusCode, WebhookAckResponse) {
        let secret = tx.webhook().unwrap().secret.expose_secret().clone();
        self.deliver_signed(&secret, body, date).await
    }

    async fn deliver_signed(
        &self,
        secret: &str,
        body: &[u8],
        date: Timestamp,
    ) -> (StatusCode, WebhookAckResponse) {
        let mut request = Request::builder()
            .method("POST")
            .uri("/webhooks/vipps")
            .header("content-type", "application/json");
        for (name, value) in WebhookSigner::new(secret)
            .sign_request(body, CALLBACK_HOST, date)
            .unwrap()
        {
            request = request.header(name, value);
        }

        let response = self
            .router
            .clone()
            .oneshot(request.body(Body::from(body.to_vec())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn drain_notifications(&mut self) -> Vec<TransactionState> {
        let mut states = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            states.push(notification.state);
        }
        states
    }
}

fn reference_of(reference: &str) -> PaymentReference {
    PaymentReference::new(reference).unwrap()
}

fn event_body(reference: &str, event_id: &str, event: &str, value: i64) -> Vec<u8> {
    serde_json::json!({
        "msn": "123456",
        "reference": reference,
        "pspReference": format!("psp-{}", reference),
        "name": format!("epayments.payment.{}.v1", event),
        "amount": { "currency": "NOK", "value": value },
        "eventId": event_id,
        "timestamp": "2026-01-01T12:00:00Z",
        "success": true,
    })
    .to_string()
    .into_bytes()
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn authorize_capture_and_refund_in_full() {
    let mut app = TestGateway::new();
    let tx = app.create_payment("order-1", CapturePolicy::Manual).await;
    assert_eq!(tx.state(), TransactionState::Created);
    assert_eq!(app.gateway.registered_webhooks().len(), 1);

    let (status, ack) = app
        .deliver(
            &tx,
            &event_body("order-1", "ev-1", "authorized", 1000),
            Timestamp::now(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack.status, "accepted");
    assert_eq!(ack.outcome, "transitioned");
    assert_eq!(app.stored("order-1").await.state(), TransactionState::Authorized);
    assert_eq!(app.drain_notifications(), vec![TransactionState::Authorized]);

    app.gateway.authorize("order-1");
    let captured = app
        .capture
        .handle(CapturePaymentCommand {
            reference: reference_of("order-1"),
            amount: None,
            idempotency_key: None,
        })
        .await
        .unwrap();
    assert_eq!(captured.state, TransactionState::Captured);
    assert_eq!(captured.captured_amount, 1000);

    // The provider confirms the capture the gateway already recorded.
    let (status, ack) = app
        .deliver(
            &tx,
            &event_body("order-1", "ev-2", "captured", 1000),
            Timestamp::now(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack.outcome, "unchanged");

    let refunded = app
        .refund
        .handle(RefundPaymentCommand {
            reference: reference_of("order-1"),
            amount: None,
            idempotency_key: None,
        })
        .await
        .unwrap();
    assert_eq!(refunded.state, TransactionState::Refunded);

    let stored = app.stored("order-1").await;
    assert_eq!(stored.captured_amount(), 1000);
    assert_eq!(stored.refunded_amount(), 1000);
    assert_eq!(app.gateway.calls_to("delete_webhook").len(), 1);
    assert_eq!(app.drain_notifications(), vec![TransactionState::Refunded]);
}

#[tokio::test]
async fn auto_capture_policy_captures_on_authorization() {
    let app = TestGateway::new();
    let tx = app.create_payment("order-auto", CapturePolicy::Auto).await;
    app.gateway.authorize("order-auto");

    let (status, ack) = app
        .deliver(
            &tx,
            &event_body("order-auto", "ev-1", "authorized", 1000),
            Timestamp::now(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack.outcome, "transitioned");
    let stored = app.stored("order-auto").await;
    assert_eq!(stored.state(), TransactionState::Captured);
    assert_eq!(stored.captured_amount(), 1000);
    assert_eq!(app.gateway.calls_to("capture_payment").len(), 1);
}

#[tokio::test]
async fn partial_refunds_accumulate_until_fully_refunded() {
    let app = TestGateway::new();
    let tx = app.create_payment("order-2", CapturePolicy::Manual).await;

    for (id, event, value) in [("ev-1", "authorized", 1000), ("ev-2", "captured", 1000)] {
        let (status, _) = app
            .deliver(&tx, &event_body("order-2", id, event, value), Timestamp::now())
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, ack) = app
        .deliver(
            &tx,
            &event_body("order-2", "ev-3", "refunded", 300),
            Timestamp::now(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack.outcome, "updated");
    let stored = app.stored("order-2").await;
    assert_eq!(stored.state(), TransactionState::Captured);
    assert_eq!(stored.refunded_amount(), 300);

    // Amounts are cumulative; the second refund reports the running total.
    let (_, ack) = app
        .deliver(
            &tx,
            &event_body("order-2", "ev-4", "refunded", 1000),
            Timestamp::now(),
        )
        .await;
    assert_eq!(ack.outcome, "transitioned");
    assert_eq!(app.stored("order-2").await.state(), TransactionState::Refunded);
}

// =============================================================================
// Ordering and Replay
// =============================================================================

#[tokio::test]
async fn capture_before_authorization_is_acknowledged_but_ignored() {
    let app = TestGateway::new();
    let tx = app.create_payment("order-3", CapturePolicy::Manual).await;

    let (status, ack) = app
        .deliver(
            &tx,
            &event_body("order-3", "ev-cap", "captured", 1000),
            Timestamp::now(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack.outcome, "ignored");
    assert_eq!(app.stored("order-3").await.state(), TransactionState::Created);

    app.deliver(
        &tx,
        &event_body("order-3", "ev-auth", "authorized", 1000),
        Timestamp::now(),
    )
    .await;
    let (_, ack) = app
        .deliver(
            &tx,
            &event_body("order-3", "ev-cap-2", "captured", 1000),
            Timestamp::now(),
        )
        .await;
    assert_eq!(ack.outcome, "transitioned");
    assert_eq!(app.stored("order-3").await.state(), TransactionState::Captured);
}

#[tokio::test]
async fn replayed_delivery_is_a_duplicate() {
    let mut app = TestGateway::new();
    let tx = app.create_payment("order-4", CapturePolicy::Manual).await;
    let body = event_body("order-4", "ev-1", "authorized", 1000);

    let (first, _) = app.deliver(&tx, &body, Timestamp::now()).await;
    let (second, ack) = app.deliver(&tx, &body, Timestamp::now()).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(ack.status, "duplicate");
    assert_eq!(app.drain_notifications(), vec![TransactionState::Authorized]);
}

#[tokio::test]
async fn reused_event_id_with_different_payload_conflicts() {
    let app = TestGateway::new();
    let tx = app.create_payment("order-5", CapturePolicy::Manual).await;
    app.deliver(
        &tx,
        &event_body("order-5", "ev-1", "authorized", 1000),
        Timestamp::now(),
    )
    .await;

    let (status, ack) = app
        .deliver(
            &tx,
            &event_body("order-5", "ev-1", "authorized", 999),
            Timestamp::now(),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(ack.outcome, "conflicting_duplicate");
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn stale_delivery_is_rejected() {
    let app = TestGateway::new();
    let tx = app.create_payment("order-6", CapturePolicy::Manual).await;

    let (status, ack) = app
        .deliver(
            &tx,
            &event_body("order-6", "ev-1", "authorized", 1000),
            Timestamp::now().minus_secs(900),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(ack.status, "rejected");
    assert_eq!(ack.outcome, "stale_or_future_timestamp");
    assert_eq!(app.stored("order-6").await.state(), TransactionState::Created);
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let app = TestGateway::new();
    app.create_payment("order-7", CapturePolicy::Manual).await;

    let (status, ack) = app
        .deliver_signed(
            "not-the-secret",
            &event_body("order-7", "ev-1", "authorized", 1000),
            Timestamp::now(),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(ack.outcome, "invalid_signature");
}

#[tokio::test]
async fn unknown_reference_is_not_found() {
    let app = TestGateway::new();

    let (status, ack) = app
        .deliver_signed(
            "any-secret",
            &event_body("no-such-order", "ev-1", "authorized", 1000),
            Timestamp::now(),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(ack.outcome, "unknown_transaction");
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = TestGateway::new();

    let (status, ack) = app
        .deliver_signed("any-secret", b"{\"not\": \"an event\"}", Timestamp::now())
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(ack.outcome, "malformed_payload");
}

// =============================================================================
// Expiry
// =============================================================================

#[tokio::test]
async fn abandoned_payment_expires_and_late_authorization_is_ignored() {
    let mut app = TestGateway::new();
    let tx = app.create_payment("order-8", CapturePolicy::Manual).await;

    let result = app
        .expire
        .handle(Timestamp::now().plus_minutes(61))
        .await
        .unwrap();
    assert_eq!(result.expired, vec![reference_of("order-8")]);
    assert_eq!(app.stored("order-8").await.state(), TransactionState::Expired);
    assert_eq!(app.gateway.calls_to("delete_webhook").len(), 1);
    assert_eq!(app.drain_notifications(), vec![TransactionState::Expired]);

    let (status, ack) = app
        .deliver(
            &tx,
            &event_body("order-8", "ev-1", "authorized", 1000),
            Timestamp::now(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack.outcome, "ignored");
    assert_eq!(app.stored("order-8").await.state(), TransactionState::Expired);
}

#[tokio::test]
async fn health_endpoint_responds() {
    let app = TestGateway::new();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
