use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use crate::core::api::{ApiError, ApiResult, FinanceApi};
use crate::core::date::format_api_date;
use crate::core::movement::{BalanceSnapshot, Movement, NewMovement, RecordId};
use crate::core::session::{TokenProvider, User};

const USER_AGENT: &str = concat!("financas/", env!("CARGO_PKG_VERSION"));

/// `FinanceApi` over the tracker's REST endpoints.
pub struct HttpFinanceApi {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpFinanceApi {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> ApiResult<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attaches the bearer token. A failing token source is logged and the
    /// request goes out unauthenticated.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.token() {
            Ok(Some(token)) => request.bearer_auth(token),
            Ok(None) => request,
            Err(e) => {
                error!(error = %e, "Failed to read token");
                request
            }
        }
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = self.authorize(request).send().await?;
        debug!(status = %response.status(), url = %response.url(), "Received response");

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        error!(%url, status = status.as_u16(), body = %body, "Request failed");

        if status == StatusCode::UNAUTHORIZED {
            warn!("Session expired, please sign in again");
            return Err(ApiError::SessionExpired);
        }

        Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, date: NaiveDate) -> ApiResult<T> {
        let request = self
            .client
            .get(self.url(path))
            .query(&[("date", format_api_date(date))]);
        let response = self.send(request).await?;
        decode(response).await
    }
}

/// Pulls `message` out of a JSON error payload.
fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        error!(error = ?e, response = %text, "Failed to parse response");
        ApiError::Decode(e.to_string())
    })
}

/// Reads a create response leniently. The server may answer with an empty or
/// non-object body even though the record was saved.
fn created_record(body: &str) -> serde_json::Map<String, serde_json::Value> {
    if body.trim().is_empty() {
        warn!("Create response had no body");
        return serde_json::Map::new();
    }
    match serde_json::from_str(body) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => {
            warn!(response = %other, "Create response was not an object");
            serde_json::Map::new()
        }
        Err(e) => {
            warn!(error = ?e, response = %body, "Failed to parse create response");
            serde_json::Map::new()
        }
    }
}

/// Server record overlaid with the submitted fields, which take precedence.
/// A record without an id keeps an empty placeholder until the next fetch.
fn merge_created(
    mut record: serde_json::Map<String, serde_json::Value>,
    submitted: &NewMovement,
) -> ApiResult<Movement> {
    let submitted = serde_json::to_value(submitted).map_err(|e| ApiError::Decode(e.to_string()))?;
    if let serde_json::Value::Object(fields) = submitted {
        record.extend(fields);
    }
    if record.get("id").is_none_or(serde_json::Value::is_null) {
        warn!("Created movement has no id");
        record.insert("id".to_string(), serde_json::Value::String(String::new()));
    }
    serde_json::from_value(serde_json::Value::Object(record))
        .map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl FinanceApi for HttpFinanceApi {
    #[instrument(name = "BalanceFetch", skip(self), fields(date = %date))]
    async fn fetch_balance(&self, date: NaiveDate) -> ApiResult<BalanceSnapshot> {
        self.get_json("/balance", date).await
    }

    #[instrument(name = "MovementsFetch", skip(self), fields(date = %date))]
    async fn fetch_movements(&self, date: NaiveDate) -> ApiResult<Vec<Movement>> {
        self.get_json("/receives", date).await
    }

    #[instrument(name = "MovementCreate", skip(self, movement))]
    async fn create_movement(&self, movement: &NewMovement) -> ApiResult<Movement> {
        let request = self.client.post(self.url("/receive")).json(movement);
        let response = self.send(request).await?;
        let body = response.text().await?;
        merge_created(created_record(&body), movement)
    }

    #[instrument(name = "MovementDelete", skip(self), fields(id = %id))]
    async fn delete_movement(&self, id: &RecordId) -> ApiResult<()> {
        let request = self
            .client
            .delete(self.url("/receives/delete"))
            .query(&[("item_id", id.as_str())]);
        self.send(request).await?;
        Ok(())
    }

    #[instrument(name = "ProfileFetch", skip(self))]
    async fn fetch_profile(&self) -> ApiResult<User> {
        let request = self.client.get(self.url("/me"));
        let response = self.send(request).await?;
        decode(response).await
    }
}
