//! Transaction aggregate.
//!
//! One payment attempt, from creation to capture/refund/cancellation.
//!
//! # Design Decisions
//!
//! - **Money in minor units**: all amounts are `i64` øre/cents
//! - **Totals, not deltas**: `captured`/`refunded` events are compared against
//!   running totals with `max`, so redelivery never double-counts
//! - **Rejections are values**: out-of-order events produce
//!   `ApplyOutcome::Rejected`, never a panic or early return to the caller
//! - **Provider-issued secrets only**: the webhook secret is stored exactly as
//!   returned by the subscription endpoint

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Money, PaymentReference, StateMachine, Timestamp};

use super::{PaymentError, PaymentEvent, PaymentEventKind, TransactionState};

/// Whether authorization should immediately trigger a capture.
///
/// Chosen by the host per sales context; never inferred from payment data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePolicy {
    /// Ship-then-capture. Host calls capture explicitly.
    #[default]
    Manual,

    /// Goods delivered immediately. Capture the full remainder on authorization.
    Auto,
}

impl CapturePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapturePolicy::Manual => "manual",
            CapturePolicy::Auto => "auto",
        }
    }
}

impl fmt::Display for CapturePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CapturePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(CapturePolicy::Manual),
            "auto" => Ok(CapturePolicy::Auto),
            other => Err(format!("unknown capture policy '{}'", other)),
        }
    }
}

/// Per-transaction webhook registration returned by the provider.
#[derive(Debug, Clone)]
pub struct WebhookSubscription {
    pub id: String,
    pub secret: SecretString,
}

impl WebhookSubscription {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: SecretString::new(secret.into()),
        }
    }
}

/// Work the caller must perform after a transition is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Auto-capture policy: capture this amount upstream.
    CaptureRequested { amount: i64 },

    /// Tell the host the transaction reached a terminal or capture-eligible state.
    NotifyHost { state: TransactionState },

    /// Delete the per-transaction webhook subscription upstream.
    ReleaseWebhook { webhook_id: String },
}

/// Result of applying an event or command to a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// State changed.
    Transitioned {
        from: TransactionState,
        to: TransactionState,
        side_effects: Vec<SideEffect>,
    },

    /// State unchanged, but totals or the provider reference moved.
    Updated {
        captured_amount: i64,
        refunded_amount: i64,
    },

    /// Nothing to do: redelivery or same-state event.
    Unchanged,

    /// No edge from the current state. Logged and dropped.
    Rejected(PaymentError),

    /// Unknown or unsuccessful event. Logged and dropped.
    Ignored { reason: String },
}

impl ApplyOutcome {
    /// Returns true if the transaction must be persisted.
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            ApplyOutcome::Transitioned { .. } | ApplyOutcome::Updated { .. }
        )
    }

    pub fn side_effects(&self) -> &[SideEffect] {
        match self {
            ApplyOutcome::Transitioned { side_effects, .. } => side_effects,
            _ => &[],
        }
    }

    /// Short label used in logs and webhook responses.
    pub fn label(&self) -> &'static str {
        match self {
            ApplyOutcome::Transitioned { .. } => "transitioned",
            ApplyOutcome::Updated { .. } => "updated",
            ApplyOutcome::Unchanged => "unchanged",
            ApplyOutcome::Rejected(_) | ApplyOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// Raw field values for rebuilding a transaction from storage.
#[derive(Debug, Clone)]
pub struct TransactionParts {
    pub reference: PaymentReference,
    pub provider_reference: Option<String>,
    pub amount: Money,
    pub state: TransactionState,
    pub capture_policy: CapturePolicy,
    pub webhook: Option<WebhookSubscription>,
    pub captured_amount: i64,
    pub refunded_amount: i64,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Transaction aggregate - one payment attempt.
///
/// # Invariants
///
/// - `0 <= refunded_amount <= captured_amount <= amount.value`
/// - `state` only changes along `TransactionState` edges
/// - `provider_reference` is set at most once
/// - terminal states are never left
#[derive(Debug, Clone)]
pub struct Transaction {
    reference: PaymentReference,
    provider_reference: Option<String>,
    amount: Money,
    state: TransactionState,
    capture_policy: CapturePolicy,
    webhook: Option<WebhookSubscription>,
    captured_amount: i64,
    refunded_amount: i64,
    expires_at: Option<Timestamp>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Transaction {
    /// Creates a new transaction in `CREATED`.
    pub fn create(
        reference: PaymentReference,
        amount: Money,
        capture_policy: CapturePolicy,
        expires_at: Option<Timestamp>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            reference,
            provider_reference: None,
            amount,
            state: TransactionState::Created,
            capture_policy,
            webhook: None,
            captured_amount: 0,
            refunded_amount: 0,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a transaction from stored values, checking the amount invariant.
    pub fn from_parts(parts: TransactionParts) -> Result<Self, PaymentError> {
        let total = parts.amount.value;
        if parts.refunded_amount < 0
            || parts.captured_amount < parts.refunded_amount
            || parts.captured_amount > total
        {
            return Err(PaymentError::invalid_amount(
                parts.captured_amount,
                format!(
                    "stored totals violate refunded ({}) <= captured ({}) <= amount ({})",
                    parts.refunded_amount, parts.captured_amount, total
                ),
            ));
        }
        Ok(Self {
            reference: parts.reference,
            provider_reference: parts.provider_reference,
            amount: parts.amount,
            state: parts.state,
            capture_policy: parts.capture_policy,
            webhook: parts.webhook,
            captured_amount: parts.captured_amount,
            refunded_amount: parts.refunded_amount,
            expires_at: parts.expires_at,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        })
    }

    // ────────────────────────────────────────────────────────────────
    // Accessors
    // ────────────────────────────────────────────────────────────────

    pub fn reference(&self) -> &PaymentReference {
        &self.reference
    }

    pub fn provider_reference(&self) -> Option<&str> {
        self.provider_reference.as_deref()
    }

    pub fn amount(&self) -> &Money {
        &self.amount
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn capture_policy(&self) -> CapturePolicy {
        self.capture_policy
    }

    pub fn webhook(&self) -> Option<&WebhookSubscription> {
        self.webhook.as_ref()
    }

    pub fn captured_amount(&self) -> i64 {
        self.captured_amount
    }

    pub fn refunded_amount(&self) -> i64 {
        self.refunded_amount
    }

    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Amount still available for capture.
    pub fn capturable_amount(&self) -> i64 {
        self.amount.value - self.captured_amount
    }

    /// Amount still available for refund.
    pub fn refundable_amount(&self) -> i64 {
        self.captured_amount - self.refunded_amount
    }

    /// True if still `CREATED` and past its deadline.
    pub fn is_stale(&self, now: Timestamp) -> bool {
        self.state == TransactionState::Created
            && self.expires_at.map(|deadline| now.is_after(&deadline)).unwrap_or(false)
    }

    // ────────────────────────────────────────────────────────────────
    // Registration
    // ────────────────────────────────────────────────────────────────

    /// Stores the provider-issued webhook subscription verbatim.
    pub fn attach_webhook(&mut self, subscription: WebhookSubscription) -> Result<(), PaymentError> {
        if let Some(existing) = &self.webhook {
            return Err(PaymentError::WebhookAlreadyAttached {
                existing: existing.id.clone(),
            });
        }
        self.webhook = Some(subscription);
        self.touch();
        Ok(())
    }

    /// Records the PSP reference returned by an API call.
    ///
    /// Returns `Ok(true)` if newly set, `Ok(false)` if already equal.
    pub fn assign_provider_reference(&mut self, psp_reference: &str) -> Result<bool, PaymentError> {
        match &self.provider_reference {
            Some(existing) if existing == psp_reference => Ok(false),
            Some(existing) => Err(PaymentError::ProviderReferenceConflict {
                existing: existing.clone(),
                received: psp_reference.to_string(),
            }),
            None => {
                self.provider_reference = Some(psp_reference.to_string());
                self.touch();
                Ok(true)
            }
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Event application
    // ────────────────────────────────────────────────────────────────

    /// Applies a provider event.
    ///
    /// Never fails: invalid transitions come back as `ApplyOutcome::Rejected`
    /// and leave the transaction untouched. Applying the same event twice has
    /// the same effect as applying it once.
    pub fn apply(&mut self, event: &PaymentEvent) -> ApplyOutcome {
        let kind = match event.kind() {
            Some(kind) => kind,
            None => {
                return ApplyOutcome::Ignored {
                    reason: format!("unknown event '{}'", event.name),
                }
            }
        };

        if !event.success {
            return ApplyOutcome::Ignored {
                reason: format!("provider reported '{}' as unsuccessful", kind.short_name()),
            };
        }

        if let Some(currency) = &event.currency {
            if !self.amount.same_currency(currency) {
                return ApplyOutcome::Rejected(PaymentError::CurrencyMismatch {
                    expected: self.amount.currency.to_string(),
                    actual: currency.to_string(),
                });
            }
        }

        let outcome = match kind {
            PaymentEventKind::Captured => self.apply_captured(event.amount),
            PaymentEventKind::Refunded => self.apply_refunded(event.amount),
            other => self.apply_transition(other.target_state()),
        };

        let frozen = outcome == ApplyOutcome::Unchanged && self.state.is_terminal();
        if frozen
            || matches!(
                outcome,
                ApplyOutcome::Rejected(_) | ApplyOutcome::Ignored { .. }
            )
        {
            return outcome;
        }

        // Every operation gets its own PSP reference upstream, so only the
        // first one seen is kept.
        let adopted = match (&self.provider_reference, &event.psp_reference) {
            (None, Some(psp)) => {
                self.provider_reference = Some(psp.clone());
                true
            }
            _ => false,
        };

        match outcome {
            ApplyOutcome::Unchanged if adopted => {
                self.touch();
                ApplyOutcome::Updated {
                    captured_amount: self.captured_amount,
                    refunded_amount: self.refunded_amount,
                }
            }
            other => other,
        }
    }

    fn apply_transition(&mut self, target: TransactionState) -> ApplyOutcome {
        if self.state == target {
            return ApplyOutcome::Unchanged;
        }
        if !self.state.can_transition_to(&target) {
            return ApplyOutcome::Rejected(PaymentError::invalid_transition(
                self.state,
                target,
                "no edge from current state",
            ));
        }
        self.move_to(target)
    }

    fn apply_captured(&mut self, reported: Option<i64>) -> ApplyOutcome {
        let total = self.amount.value;
        let reported = reported.unwrap_or(total).min(total);
        let next = self.captured_amount.max(reported);

        match self.state {
            TransactionState::Authorized => {
                if next <= 0 {
                    return ApplyOutcome::Rejected(PaymentError::invalid_amount(
                        reported,
                        "captured event without a positive amount",
                    ));
                }
                self.captured_amount = next;
                self.move_to(TransactionState::Captured)
            }
            TransactionState::Captured => {
                if next == self.captured_amount {
                    return ApplyOutcome::Unchanged;
                }
                self.captured_amount = next;
                self.touch();
                ApplyOutcome::Updated {
                    captured_amount: self.captured_amount,
                    refunded_amount: self.refunded_amount,
                }
            }
            current => ApplyOutcome::Rejected(PaymentError::invalid_transition(
                current,
                TransactionState::Captured,
                "capture requires AUTHORIZED",
            )),
        }
    }

    fn apply_refunded(&mut self, reported: Option<i64>) -> ApplyOutcome {
        match self.state {
            TransactionState::Captured => {
                let ceiling = self.captured_amount;
                let reported = reported.unwrap_or(ceiling).min(ceiling);
                let next = self.refunded_amount.max(reported);
                if next == self.refunded_amount {
                    return ApplyOutcome::Unchanged;
                }
                self.refunded_amount = next;
                self.settle_refund()
            }
            TransactionState::Refunded => ApplyOutcome::Unchanged,
            current => ApplyOutcome::Rejected(PaymentError::invalid_transition(
                current,
                TransactionState::Refunded,
                "refund requires CAPTURED",
            )),
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Commands (validated before any API call, recorded after success)
    // ────────────────────────────────────────────────────────────────

    /// Checks that `amount` may be captured now.
    pub fn check_capture(&self, amount: i64) -> Result<(), PaymentError> {
        if amount <= 0 {
            return Err(PaymentError::invalid_amount(amount, "capture amount must be positive"));
        }
        if self.state != TransactionState::Authorized {
            return Err(PaymentError::invalid_transition(
                self.state,
                TransactionState::Captured,
                "capture requires AUTHORIZED",
            ));
        }
        let capturable = self.capturable_amount();
        if amount > capturable {
            return Err(PaymentError::invalid_transition(
                self.state,
                TransactionState::Captured,
                format!("capture of {} exceeds capturable {}", amount, capturable),
            ));
        }
        Ok(())
    }

    /// Records a capture the provider accepted.
    pub fn record_capture(&mut self, amount: i64) -> Result<ApplyOutcome, PaymentError> {
        self.check_capture(amount)?;
        self.captured_amount += amount;
        Ok(self.move_to(TransactionState::Captured))
    }

    /// Checks that `amount` may be refunded now.
    pub fn check_refund(&self, amount: i64) -> Result<(), PaymentError> {
        if amount <= 0 {
            return Err(PaymentError::invalid_amount(amount, "refund amount must be positive"));
        }
        if self.state != TransactionState::Captured || self.refundable_amount() <= 0 {
            return Err(PaymentError::invalid_transition(
                self.state,
                TransactionState::Refunded,
                "refund requires CAPTURED with an unrefunded balance",
            ));
        }
        let refundable = self.refundable_amount();
        if amount > refundable {
            return Err(PaymentError::invalid_transition(
                self.state,
                TransactionState::Refunded,
                format!("refund of {} exceeds refundable {}", amount, refundable),
            ));
        }
        Ok(())
    }

    /// Records a refund the provider accepted.
    pub fn record_refund(&mut self, amount: i64) -> Result<ApplyOutcome, PaymentError> {
        self.check_refund(amount)?;
        self.refunded_amount += amount;
        Ok(self.settle_refund())
    }

    /// Checks that the transaction may be cancelled now.
    pub fn check_cancel(&self) -> Result<(), PaymentError> {
        match self.state {
            TransactionState::Created | TransactionState::Authorized => Ok(()),
            current => Err(PaymentError::invalid_transition(
                current,
                TransactionState::Cancelled,
                "cancel requires CREATED or AUTHORIZED",
            )),
        }
    }

    /// Records a cancellation the provider accepted.
    pub fn record_cancel(&mut self) -> Result<ApplyOutcome, PaymentError> {
        self.check_cancel()?;
        Ok(self.move_to(TransactionState::Cancelled))
    }

    /// Moves `CREATED -> EXPIRED` iff `now > expires_at`.
    pub fn expire_if_stale(&mut self, now: Timestamp) -> ApplyOutcome {
        if !self.is_stale(now) {
            return ApplyOutcome::Unchanged;
        }
        self.move_to(TransactionState::Expired)
    }

    // ────────────────────────────────────────────────────────────────
    // Internals
    // ────────────────────────────────────────────────────────────────

    fn settle_refund(&mut self) -> ApplyOutcome {
        if self.refunded_amount == self.captured_amount {
            return self.move_to(TransactionState::Refunded);
        }
        self.touch();
        ApplyOutcome::Updated {
            captured_amount: self.captured_amount,
            refunded_amount: self.refunded_amount,
        }
    }

    fn move_to(&mut self, target: TransactionState) -> ApplyOutcome {
        let from = self.state;
        self.state = target;
        self.touch();

        let mut side_effects = Vec::new();
        if target == TransactionState::Authorized && self.capture_policy == CapturePolicy::Auto {
            let remaining = self.capturable_amount();
            if remaining > 0 {
                side_effects.push(SideEffect::CaptureRequested { amount: remaining });
            }
        }
        if target.is_notifiable() {
            side_effects.push(SideEffect::NotifyHost { state: target });
        }
        if target.is_terminal() {
            if let Some(subscription) = &self.webhook {
                side_effects.push(SideEffect::ReleaseWebhook {
                    webhook_id: subscription.id.clone(),
                });
            }
        }

        ApplyOutcome::Transitioned {
            from,
            to: target,
            side_effects,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}
