//! Venmo payment gateway.

use crate::core::account::AccountId;
use crate::core::payment::PendingPayment;
use crate::error::GatewayError;
use crate::services::{api_error, PaymentGateway};
use log::{debug, info, warn};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::cell::OnceCell;
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "https://api.venmo.com/v1";
const USER_AGENT: &str = "Venmo/7.44.0 (iPhone; iOS 13.0; Scale/2.0)";
const PAGE_LIMIT: u32 = 50;
const UNRESOLVED_STATUSES: [&str; 2] = ["pending", "held"];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct VenmoUser {
    id: String,
    username: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    user: VenmoUser,
}

#[derive(Debug, Deserialize)]
struct PaymentTarget {
    #[serde(default)]
    user: Option<VenmoUser>,
}

#[derive(Debug, Deserialize)]
struct VenmoPayment {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    target: Option<PaymentTarget>,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentsPage {
    data: Vec<VenmoPayment>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

/// Blocking client for the Venmo REST API.
pub struct VenmoClient {
    http: Client,
    base_url: String,
    access_token: String,
    device_id: String,
    own_id: OnceCell<String>,
}

impl VenmoClient {
    pub fn new(http: Client, access_token: impl Into<String>) -> Self {
        Self::with_base_url(http, access_token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        http: Client,
        access_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            access_token: access_token.into(),
            device_id: Uuid::new_v4().to_string().to_uppercase(),
            own_id: OnceCell::new(),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.access_token)
            .header("device-id", &self.device_id)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, GatewayError> {
        let response = self.authorized(self.http.get(url)).send()?;
        if !response.status().is_success() {
            let (status, message) = api_error(response);
            return Err(GatewayError::Api { status, message });
        }
        response
            .json::<T>()
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    /// Id of the account the access token belongs to.
    fn own_id(&self) -> Result<&str, GatewayError> {
        if let Some(id) = self.own_id.get() {
            return Ok(id.as_str());
        }
        let account: Envelope<AccountData> = self.get_json(&format!("{}/account", self.base_url))?;
        debug!("authenticated as @{}", account.data.user.username);
        Ok(self.own_id.get_or_init(|| account.data.user.id).as_str())
    }
}

/// Body of a money request: requests are negative payments.
fn request_body(account_id: &AccountId, amount: Decimal, memo: &str) -> Result<serde_json::Value, GatewayError> {
    let amount = amount
        .to_f64()
        .ok_or_else(|| GatewayError::Decode(format!("amount {} is not representable", amount)))?;
    Ok(json!({
        "user_id": account_id.as_str(),
        "audience": "private",
        "amount": -amount,
        "note": memo,
    }))
}

/// Keep unresolved charges that have a user counterparty.
fn pending_from_page(page: PaymentsPage) -> (Vec<PendingPayment>, Option<String>) {
    let next = page.pagination.and_then(|p| p.next);
    let pending = page
        .data
        .into_iter()
        .filter(|p| {
            p.status
                .as_deref()
                .map_or(true, |s| UNRESOLVED_STATUSES.contains(&s))
        })
        .filter_map(|p| {
            let user = p.target.and_then(|t| t.user)?;
            Some(PendingPayment {
                memo: p.note.unwrap_or_default(),
                counterparty_id: AccountId::new(user.id),
                counterparty_name: user.display_name.unwrap_or_else(|| user.username.clone()),
                counterparty_handle: user.username,
            })
        })
        .collect();
    (pending, next)
}

impl PaymentGateway for VenmoClient {
    fn request_payment(
        &self,
        account_id: &AccountId,
        amount: Decimal,
        memo: &str,
    ) -> Result<(), GatewayError> {
        let body = request_body(account_id, amount, memo)?;
        let url = format!("{}/payments", self.base_url);
        let response = self.authorized(self.http.post(&url)).json(&body).send()?;
        if !response.status().is_success() {
            let (status, message) = api_error(response);
            return Err(GatewayError::Api { status, message });
        }
        info!("requested {} from account {}", amount, account_id);
        Ok(())
    }

    fn list_pending_payments(&self) -> Result<Vec<PendingPayment>, GatewayError> {
        let actor = self.own_id()?.to_string();
        let mut url = format!(
            "{}/payments?action=charge&actor={}&limit={}",
            self.base_url, actor, PAGE_LIMIT
        );
        let mut all = Vec::new();
        loop {
            let page: PaymentsPage = self.get_json(&url)?;
            let (mut pending, next) = pending_from_page(page);
            all.append(&mut pending);
            match next {
                Some(next) if next != url => url = next,
                _ => break,
            }
        }
        info!("found {} pending charges", all.len());
        Ok(all)
    }

    fn resolve_account_id(&self, username: &str) -> Result<Option<AccountId>, GatewayError> {
        let url = format!("{}/users/{}", self.base_url, username);
        let response = self.authorized(self.http.get(&url)).send()?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                warn!("user @{} did not come back, check the username", username);
                Ok(None)
            }
            status if status.is_success() => {
                let user: Envelope<VenmoUser> = response
                    .json()
                    .map_err(|e| GatewayError::Decode(e.to_string()))?;
                Ok(Some(AccountId::new(user.data.id)))
            }
            _ => {
                let (status, message) = api_error(response);
                Err(GatewayError::Api { status, message })
            }
        }
    }
}
