//! REST client for the hosted backend
//!
//! Speaks the PostgREST dialect exposed under `/rest/v1`:
//! - read every row of a table
//! - filter a table on one column
//! - upsert rows keyed by a conflict column

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::RemoteConfig;
use crate::error::{MirrorError, MirrorResult};

/// The table operations the mirror needs from a backend.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn select_all(&self, table: &str) -> MirrorResult<Vec<Value>>;

    /// Rows whose `column` equals `value`.
    async fn select_eq(&self, table: &str, column: &str, value: &str) -> MirrorResult<Vec<Value>>;

    /// Insert or update `rows`, matching existing rows on `on_conflict`.
    async fn upsert(&self, table: &str, rows: Vec<Value>, on_conflict: &str) -> MirrorResult<()>;
}

/// Backend client over blocking `ureq` requests, each run on the blocking
/// pool so callers stay async.
#[derive(Clone)]
pub struct PostgrestClient {
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
}

impl PostgrestClient {
    pub fn new(config: &RemoteConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .build();
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.key.clone(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: &str, table: &str) -> ureq::Request {
        self.agent
            .request(method, &self.table_url(table))
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.api_key))
    }
}

async fn run_blocking<T, F>(call: F) -> MirrorResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> MirrorResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| MirrorError::Join(format!("spawn_blocking failed: {e}")))?
}

fn map_ureq_error(err: ureq::Error) -> MirrorError {
    match err {
        ureq::Error::Status(status, response) => MirrorError::Api {
            status,
            message: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => MirrorError::Network(transport.to_string()),
    }
}

fn read_rows(response: ureq::Response) -> MirrorResult<Vec<Value>> {
    response
        .into_json::<Vec<Value>>()
        .map_err(|e| MirrorError::Decode(format!("Failed to read response: {e}")))
}

#[async_trait]
impl RemoteBackend for PostgrestClient {
    async fn select_all(&self, table: &str) -> MirrorResult<Vec<Value>> {
        let request = self.request("GET", table).query("select", "*");
        run_blocking(move || {
            let response = request.call().map_err(map_ureq_error)?;
            read_rows(response)
        })
        .await
    }

    async fn select_eq(&self, table: &str, column: &str, value: &str) -> MirrorResult<Vec<Value>> {
        let request = self
            .request("GET", table)
            .query("select", "*")
            .query(column, &format!("eq.{value}"));
        run_blocking(move || {
            let response = request.call().map_err(map_ureq_error)?;
            read_rows(response)
        })
        .await
    }

    async fn upsert(&self, table: &str, rows: Vec<Value>, on_conflict: &str) -> MirrorResult<()> {
        let request = self
            .request("POST", table)
            .query("on_conflict", on_conflict)
            .set("Prefer", "resolution=merge-duplicates,return=minimal");
        run_blocking(move || {
            request
                .send_json(Value::Array(rows))
                .map_err(map_ureq_error)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation_trims_trailing_slash() {
        let config = RemoteConfig {
            url: "https://abc.supabase.co/".to_string(),
            key: "anon-key".to_string(),
        };

        let client = PostgrestClient::new(&config);
        assert_eq!(client.base_url(), "https://abc.supabase.co");
        assert_eq!(client.api_key, "anon-key");
        assert_eq!(
            client.table_url("bt_entries"),
            "https://abc.supabase.co/rest/v1/bt_entries"
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        let config = RemoteConfig {
            url: "http://127.0.0.1:9".to_string(),
            key: "anon-key".to_string(),
        };
        let client = PostgrestClient::new(&config);
        let err = client.select_all("bt_teams").await.unwrap_err();
        assert!(matches!(err, MirrorError::Network(_)), "got {err:?}");
        assert!(err.is_transient());
    }
}
