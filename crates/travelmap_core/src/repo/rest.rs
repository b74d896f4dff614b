//! Hosted destination backend over the PostgREST dialect.
//!
//! # Responsibility
//! - Translate the four repository verbs into JSON-over-HTTPS requests.
//! - Attach the project key and the caller's bearer token.
//!
//! # Invariants
//! - Every request carries an `owner_id=eq.<identity>` filter or column.
//! - Writes request `return=representation` so callers always get server rows.
//! - No timeouts or retries are layered on top of the HTTP client.

use crate::config::ClientConfig;
use crate::identity::Identity;
use crate::model::destination::{
    Destination, DestinationChanges, DestinationId, NewDestination, OwnerId,
};
use crate::repo::destination_repo::{check_owned_row, DestinationRepository, RepoError, RepoResult};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::IgnoredAny;
use serde::Serialize;

const HEADER_API_KEY: &str = "apikey";
const HEADER_PREFER: &str = "Prefer";
const PREFER_REPRESENTATION: &str = "return=representation";
const MAX_ERROR_MESSAGE_CHARS: usize = 200;

type QueryPairs = Vec<(&'static str, String)>;

/// Remote destination repository for the hosted table.
pub struct RestDestinationRepository {
    client: Client,
    config: ClientConfig,
}

#[derive(Serialize)]
struct InsertRow<'a> {
    owner_id: OwnerId,
    #[serde(flatten)]
    destination: &'a NewDestination,
}

#[derive(Serialize)]
struct UpdateRow<'a> {
    #[serde(flatten)]
    changes: &'a DestinationChanges,
    updated_at: DateTime<Utc>,
}

impl RestDestinationRepository {
    /// Builds a repository with its own HTTP client.
    pub fn new(config: ClientConfig) -> RepoResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("travelmap_core/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Builds a repository sharing an existing HTTP client.
    pub fn with_client(client: Client, config: ClientConfig) -> Self {
        Self { client, config }
    }

    fn request(&self, method: Method, identity: &Identity, query: &QueryPairs) -> RequestBuilder {
        // Without a user session the project key doubles as bearer token.
        let bearer = if identity.access_token.is_empty() {
            self.config.anon_key.as_str()
        } else {
            identity.access_token.as_str()
        };

        self.client
            .request(method, self.config.table_url())
            .query(query)
            .header(HEADER_API_KEY, self.config.anon_key.as_str())
            .header(ACCEPT, "application/json")
            .bearer_auth(bearer)
    }

    /// Sends `request` and returns the success body; non-2xx becomes `Status`.
    async fn send(&self, verb: &'static str, request: RequestBuilder) -> RepoResult<String> {
        let body = read_body(request.send().await?).await;
        body.inspect_err(|err| {
            warn!("event=destination_{verb} module=repo backend=rest status=error error={err}");
        })
    }

    async fn send_for_rows(
        &self,
        verb: &'static str,
        identity: &Identity,
        request: RequestBuilder,
    ) -> RepoResult<Vec<Destination>> {
        let body = self.send(verb, request).await?;
        let rows = parse_rows(&body).inspect_err(|err| {
            warn!("event=destination_{verb} module=repo backend=rest status=error error={err}");
        })?;
        debug!(
            "event=destination_{verb} module=repo backend=rest status=ok rows={}",
            rows.len()
        );
        rows.into_iter()
            .map(|row| check_owned_row(identity, row))
            .collect()
    }
}

impl DestinationRepository for RestDestinationRepository {
    async fn select_where(&self, identity: &Identity) -> RepoResult<Vec<Destination>> {
        let request = self.request(Method::GET, identity, &select_query(identity.user_id));
        self.send_for_rows("select", identity, request).await
    }

    async fn insert(&self, identity: &Identity, input: &NewDestination) -> RepoResult<Destination> {
        let body = [InsertRow {
            owner_id: identity.user_id,
            destination: input,
        }];
        let request = self
            .request(Method::POST, identity, &vec![("select", "*".to_string())])
            .header(HEADER_PREFER, PREFER_REPRESENTATION)
            .header(CONTENT_TYPE, "application/json")
            .json(&body);

        self.send_for_rows("insert", identity, request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::InvalidData("insert returned no row".to_string()))
    }

    async fn update_where(
        &self,
        identity: &Identity,
        id: DestinationId,
        changes: &DestinationChanges,
    ) -> RepoResult<Option<Destination>> {
        let body = UpdateRow {
            changes,
            updated_at: Utc::now(),
        };
        let mut query = row_filter(id, identity.user_id);
        query.push(("select", "*".to_string()));
        let request = self
            .request(Method::PATCH, identity, &query)
            .header(HEADER_PREFER, PREFER_REPRESENTATION)
            .header(CONTENT_TYPE, "application/json")
            .json(&body);

        Ok(self
            .send_for_rows("update", identity, request)
            .await?
            .into_iter()
            .next())
    }

    async fn delete_where(&self, identity: &Identity, id: DestinationId) -> RepoResult<u64> {
        let request = self
            .request(Method::DELETE, identity, &row_filter(id, identity.user_id))
            .header(HEADER_PREFER, PREFER_REPRESENTATION);
        // Removed rows are only counted; a malformed one is still gone.
        let body = self.send("delete", request).await?;
        let removed = count_rows(&body)?;
        debug!("event=destination_delete module=repo backend=rest status=ok rows={removed}");
        Ok(removed)
    }
}

pub(crate) fn select_query(owner: OwnerId) -> QueryPairs {
    // The hosted table has no insertion sequence; equal created_at values keep backend order.
    vec![
        ("select", "*".to_string()),
        ("owner_id", format!("eq.{owner}")),
        ("order", "created_at.desc".to_string()),
    ]
}

pub(crate) fn row_filter(id: DestinationId, owner: OwnerId) -> QueryPairs {
    vec![
        ("id", format!("eq.{id}")),
        ("owner_id", format!("eq.{owner}")),
    ]
}

async fn read_body(response: Response) -> RepoResult<String> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(RepoError::Status {
            status: status.as_u16(),
            message: backend_message(&body),
        });
    }
    Ok(body)
}

pub(crate) fn parse_rows(body: &str) -> RepoResult<Vec<Destination>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(body)
        .map_err(|err| RepoError::InvalidData(format!("malformed destination rows: {err}")))
}

pub(crate) fn count_rows(body: &str) -> RepoResult<u64> {
    if body.trim().is_empty() {
        return Ok(0);
    }
    serde_json::from_str::<Vec<IgnoredAny>>(body)
        .map(|rows| rows.len() as u64)
        .map_err(|err| RepoError::InvalidData(format!("malformed delete response: {err}")))
}

/// Extracts the `message` field of a PostgREST error body, else the raw text.
pub(crate) fn backend_message(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}
