//! Raw HTTP client for the Client Portal endpoints.

use crate::dto::{
    AuthStatusResponse, ConfirmBody, OrdersEnvelope, OrderRow, PlaceOrderBody, PlaceOrderRow,
    PositionRow, SwitchAccountBody, SwitchAccountResponse,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE};
use reqwest::{redirect, Client, StatusCode};
use riskguard_core::{BrokerError, BrokerResult};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the Client Portal REST API.
///
/// Every request carries `Accept: */*` and the configured session cookie.
/// Redirects are not followed: the gateway answers auth probes with HTTP 302
/// when the session is gone, and that status must stay observable.
pub struct PortalClient {
    http: Client,
    base_url: String,
}

impl PortalClient {
    /// Build a client for the given base URL (e.g. `https://localhost:5000/v1/api`).
    ///
    /// `accept_invalid_certs` covers the gateway's self-signed localhost
    /// certificate.
    pub fn new(
        base_url: impl Into<String>,
        session_cookie: Option<&str>,
        accept_invalid_certs: bool,
    ) -> BrokerResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        if let Some(cookie) = session_cookie.filter(|c| !c.trim().is_empty()) {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| BrokerError::BadRequest(format!("invalid session cookie: {e}")))?;
            headers.insert(COOKIE, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(accept_invalid_certs)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BrokerError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `POST /iserver/auth/status`: the session probe.
    pub async fn auth_status(&self) -> BrokerResult<AuthStatusResponse> {
        let response = self
            .http
            .post(self.url("/iserver/auth/status"))
            .send()
            .await
            .map_err(send_error)?;

        if response.status() == StatusCode::FOUND {
            return Err(BrokerError::Auth(
                "session not authenticated (HTTP 302)".to_string(),
            ));
        }
        let response = check_status(response, "auth status")?;
        response
            .json()
            .await
            .map_err(|e| BrokerError::Protocol(format!("malformed auth status: {e}")))
    }

    /// `POST /tickle`: session keep-alive.
    pub async fn tickle(&self) -> BrokerResult<()> {
        let response = self
            .http
            .post(self.url("/tickle"))
            .send()
            .await
            .map_err(send_error)?;
        check_status(response, "tickle")?;
        Ok(())
    }

    /// `POST /iserver/account`: select the current account.
    pub async fn switch_account(&self, account_id: &str) -> BrokerResult<SwitchAccountResponse> {
        let body = SwitchAccountBody {
            acct_id: account_id.to_string(),
        };
        let response = self
            .http
            .post(self.url("/iserver/account"))
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;
        let response = check_status(response, "account switch")?;
        response
            .json()
            .await
            .map_err(|e| BrokerError::Protocol(format!("malformed switch response: {e}")))
    }

    /// `GET /portfolio/{accountId}/positions/0`: first page of positions.
    pub async fn positions(&self, account_id: &str) -> BrokerResult<Vec<PositionRow>> {
        let response = self
            .http
            .get(self.url(&format!("/portfolio/{account_id}/positions/0")))
            .send()
            .await
            .map_err(send_error)?;
        let response = check_status(response, "positions")?;

        let rows: Option<Vec<PositionRow>> = response
            .json()
            .await
            .map_err(|e| BrokerError::Protocol(format!("malformed positions: {e}")))?;
        Ok(rows.unwrap_or_default())
    }

    /// `GET /iserver/account/orders`: the live orders list.
    ///
    /// With `force_refresh` the server is told to rebuild its cached list;
    /// the rebuilt data only shows up on a later plain read.
    pub async fn orders(&self, force_refresh: bool) -> BrokerResult<Vec<OrderRow>> {
        let mut request = self.http.get(self.url("/iserver/account/orders"));
        if force_refresh {
            request = request.query(&[("force", "true")]);
        }
        let response = request.send().await.map_err(send_error)?;
        let response = check_status(response, "orders")?;

        let envelope: OrdersEnvelope = response
            .json()
            .await
            .map_err(|e| BrokerError::Protocol(format!("malformed orders: {e}")))?;
        let rows = envelope.orders.unwrap_or_default();
        debug!(count = rows.len(), force_refresh, "fetched orders page");
        Ok(rows)
    }

    /// `POST /iserver/account/{accountId}/orders`: submit orders.
    pub async fn place_order(
        &self,
        account_id: &str,
        body: &PlaceOrderBody,
    ) -> BrokerResult<Vec<PlaceOrderRow>> {
        let response = self
            .http
            .post(self.url(&format!("/iserver/account/{account_id}/orders")))
            .json(body)
            .send()
            .await
            .map_err(send_error)?;
        let response = check_status(response, "order placement")?;
        response
            .json()
            .await
            .map_err(|e| BrokerError::Protocol(format!("malformed placement response: {e}")))
    }

    /// `POST /iserver/reply/{replyId}`: confirm a broker risk warning.
    pub async fn confirm_order(&self, reply_id: &str) -> BrokerResult<Vec<PlaceOrderRow>> {
        let response = self
            .http
            .post(self.url(&format!("/iserver/reply/{reply_id}")))
            .json(&ConfirmBody { confirmed: true })
            .send()
            .await
            .map_err(send_error)?;
        let response = check_status(response, "order confirmation")?;
        response
            .json()
            .await
            .map_err(|e| BrokerError::Protocol(format!("malformed confirmation response: {e}")))
    }
}

fn send_error(error: reqwest::Error) -> BrokerError {
    if error.is_timeout() {
        BrokerError::Timeout(error.to_string())
    } else {
        BrokerError::Transport(error.to_string())
    }
}

fn check_status(response: reqwest::Response, context: &str) -> BrokerResult<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(BrokerError::Auth(format!("{context} returned {status}")));
    }
    if !status.is_success() {
        return Err(BrokerError::Protocol(format!("{context} returned {status}")));
    }
    Ok(response)
}
