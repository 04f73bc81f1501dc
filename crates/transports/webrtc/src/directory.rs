//! Registration and directory HTTP client
//!
//! Used to pick caller and callee identifiers before a call; the negotiation
//! core does not depend on it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A user listed by the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub username: String,

    /// Any other fields the server returns
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Servers list users either by name or as records
#[derive(Deserialize)]
#[serde(untagged)]
enum UserEntry {
    Name(String),
    Record(DirectoryUser),
}

impl From<UserEntry> for DirectoryUser {
    fn from(entry: UserEntry) -> Self {
        match entry {
            UserEntry::Name(username) => DirectoryUser {
                username,
                extra: serde_json::Map::new(),
            },
            UserEntry::Record(user) => user,
        }
    }
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
}

/// Client for `POST {base}/register` and `GET {base}/available`
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    base_url: String,
    http: reqwest::Client,
}

impl DirectoryClient {
    /// Create a client for the API rooted at `base_url`
    ///
    /// # Errors
    ///
    /// Fails if `base_url` is not an http(s) URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| Error::InvalidConfig(format!("invalid directory URL {}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidConfig(format!(
                "directory URL must be http:// or https://, got {}",
                base_url
            )));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register `username`; returns the server's response body
    pub async fn register(&self, username: &str) -> Result<serde_json::Value> {
        let url = format!("{}/register", self.base_url);
        debug!(%url, username, "Registering with directory");

        let response = self
            .http
            .post(&url)
            .json(&RegisterRequest { username })
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&body).or_else(|_| {
            Ok(serde_json::Value::String(
                String::from_utf8_lossy(&body).into_owned(),
            ))
        })
    }

    /// Users currently available to call
    pub async fn available_users(&self) -> Result<Vec<DirectoryUser>> {
        let url = format!("{}/available", self.base_url);
        debug!(%url, "Fetching available users");

        let entries: Vec<UserEntry> = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(entries.into_iter().map(DirectoryUser::from).collect())
    }
}
