//! Vipps ePayment API wire types.
//!
//! These structs map the JSON shapes of the access token, ePayment and
//! webhooks APIs. Only fields the gateway uses are declared; unknown fields
//! are ignored.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::foundation::Currency;
use crate::ports::{
    ApiError, CreatePaymentRequest, CreatedPayment, PaymentAggregate, PaymentDetails, UserFlow,
    WebhookInfo,
};

/// `POST /accesstoken/get` response.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,

    /// Seconds until expiry. Sent as a string by some environments.
    #[serde(deserialize_with = "number_or_string")]
    pub expires_in: i64,

    #[serde(default)]
    pub token_type: Option<String>,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Amount in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VippsAmount {
    pub currency: String,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethod {
    #[serde(rename = "type")]
    pub method_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerBody {
    pub phone_number: String,
}

/// `POST /epayment/v1/payments` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentBody {
    pub amount: VippsAmount,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerBody>,
    pub reference: String,
    pub return_url: String,
    pub user_flow: UserFlow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_description: Option<String>,
}

impl From<&CreatePaymentRequest> for CreatePaymentBody {
    fn from(request: &CreatePaymentRequest) -> Self {
        Self {
            amount: VippsAmount {
                currency: request.amount.currency.to_string(),
                value: request.amount.value,
            },
            payment_method: PaymentMethod { method_type: "WALLET" },
            customer: request
                .customer_phone_number
                .as_ref()
                .map(|phone| CustomerBody {
                    phone_number: phone.clone(),
                }),
            reference: request.reference.to_string(),
            return_url: request.return_url.clone(),
            user_flow: request.user_flow,
            payment_description: request.description.clone(),
        }
    }
}

/// `POST /epayment/v1/payments` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub reference: String,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub psp_reference: Option<String>,
}

impl From<CreatePaymentResponse> for CreatedPayment {
    fn from(response: CreatePaymentResponse) -> Self {
        Self {
            reference: response.reference,
            redirect_url: response.redirect_url,
            psp_reference: response.psp_reference,
        }
    }
}

/// Body for capture and refund.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationBody {
    pub modification_amount: VippsAmount,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateBody {
    #[serde(default)]
    pub authorized_amount: Option<VippsAmount>,
    #[serde(default)]
    pub captured_amount: Option<VippsAmount>,
    #[serde(default)]
    pub refunded_amount: Option<VippsAmount>,
    #[serde(default)]
    pub cancelled_amount: Option<VippsAmount>,
}

/// Payment resource as returned by get, capture, cancel and refund.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub reference: String,
    pub state: String,
    #[serde(default)]
    pub psp_reference: Option<String>,
    #[serde(default)]
    pub amount: Option<VippsAmount>,
    #[serde(default)]
    pub aggregate: AggregateBody,
}

impl TryFrom<PaymentResponse> for PaymentDetails {
    type Error = ApiError;

    fn try_from(response: PaymentResponse) -> Result<Self, Self::Error> {
        let aggregate = &response.aggregate;
        let currency_code = response
            .amount
            .as_ref()
            .or(aggregate.authorized_amount.as_ref())
            .or(aggregate.captured_amount.as_ref())
            .map(|amount| amount.currency.clone())
            .ok_or_else(|| ApiError::InvalidResponse("payment without currency".to_string()))?;
        let currency = Currency::new(currency_code)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        let value = |amount: &Option<VippsAmount>| amount.as_ref().map_or(0, |a| a.value);

        Ok(PaymentDetails {
            aggregate: PaymentAggregate {
                currency,
                authorized: value(&aggregate.authorized_amount),
                captured: value(&aggregate.captured_amount),
                refunded: value(&aggregate.refunded_amount),
                cancelled: value(&aggregate.cancelled_amount),
            },
            reference: response.reference,
            state: response.state,
            psp_reference: response.psp_reference,
        })
    }
}

/// `POST /webhooks/v1/webhooks` body.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterWebhookBody {
    pub url: String,
    pub events: Vec<String>,
}

/// `POST /webhooks/v1/webhooks` response. The secret is shown only here.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterWebhookResponse {
    pub id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookListResponse {
    #[serde(default)]
    pub webhooks: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEntry {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
}

impl From<WebhookEntry> for WebhookInfo {
    fn from(entry: WebhookEntry) -> Self {
        Self {
            id: entry.id,
            url: entry.url,
            events: entry.events,
        }
    }
}

/// Error body. Newer endpoints send RFC 7807 problem details, older ones
/// `errorCode`/`errorMessage`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    #[serde(rename = "type", default)]
    pub problem_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ProblemDetails {
    /// Builds the upstream error for a non-2xx response.
    ///
    /// Bodies that aren't JSON fall back to the raw text as message.
    pub fn into_api_error(status: u16, body: &str, trace_header: Option<String>) -> ApiError {
        let problem: ProblemDetails = serde_json::from_str(body).unwrap_or_default();

        let message = problem
            .detail
            .clone()
            .or(problem.error_message.clone())
            .or(problem.title.clone())
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    trimmed.chars().take(512).collect()
                }
            });

        ApiError::Upstream {
            status,
            provider_code: problem.error_code.or(problem.problem_type),
            trace_id: problem.trace_id.or(trace_header),
            message,
        }
    }
}
