//! Redis-backed seen-set store and search registry mirror.
//!
//! ## Layout
//!
//! - `jobwatch:seen:{search_key}`: hash, field = posting id, value = RFC 3339
//!   first-seen timestamp. One hash per search identity.
//! - `jobwatch:searches`: hash, field = search key, value = JSON definition.
//!
//! `mark_seen` uses `HSETNX`, so re-marking an id keeps its first timestamp.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use jobwatch_core::defaults::{SEARCHES_KEY, SEEN_KEY_PREFIX};
use jobwatch_core::{Error, Result, SearchDefinition, SearchKey, SearchRepository, SeenStore};

/// Redis store shared by every search worker.
///
/// Cloning is cheap: the underlying [`ConnectionManager`] multiplexes one
/// connection and reconnects on its own after failures.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    seen_prefix: String,
    searches_key: String,
}

impl RedisStore {
    /// Connect to Redis and verify the connection.
    ///
    /// An unparseable URL is a configuration error; an unreachable server is
    /// reported as `StoreUnavailable`. Both are fatal at startup.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let start = Instant::now();
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Config(format!("Invalid Redis URL: {e}")))?;

        let connection = ConnectionManager::new(client).await?;

        let store = Self {
            connection,
            seen_prefix: SEEN_KEY_PREFIX.to_string(),
            searches_key: SEARCHES_KEY.to_string(),
        };
        store.ping().await?;

        info!(
            subsystem = "store",
            component = "redis",
            url = %redact_url(redis_url),
            duration_ms = start.elapsed().as_millis() as u64,
            "Connected to Redis"
        );
        Ok(store)
    }

    /// Override the key namespace (used to isolate test runs).
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.seen_prefix = format!("{namespace}:seen:");
        self.searches_key = format!("{namespace}:searches");
        self
    }

    /// Redis key of the seen-set hash for a search.
    pub fn seen_key(&self, search: &SearchKey) -> String {
        format!("{}{}", self.seen_prefix, search)
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

#[async_trait]
impl SeenStore for RedisStore {
    async fn has(&self, search: &SearchKey, posting_id: &str) -> Result<bool> {
        let exists: bool = self
            .conn()
            .hexists(self.seen_key(search), posting_id)
            .await?;
        Ok(exists)
    }

    async fn mark_seen(&self, search: &SearchKey, posting_id: &str) -> Result<()> {
        let inserted: bool = self
            .conn()
            .hset_nx(self.seen_key(search), posting_id, Utc::now().to_rfc3339())
            .await?;
        if inserted {
            debug!(search = %search, posting_id, "Marked posting as seen");
        } else {
            debug!(search = %search, posting_id, "Posting already marked, keeping first-seen");
        }
        Ok(())
    }

    async fn first_seen(
        &self,
        search: &SearchKey,
        posting_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn()
            .hget(self.seen_key(search), posting_id)
            .await?;
        Ok(raw.as_deref().and_then(parse_timestamp))
    }

    async fn count(&self, search: &SearchKey) -> Result<u64> {
        let len: u64 = self.conn().hlen(self.seen_key(search)).await?;
        Ok(len)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        let pong = redis::cmd("PING").query_async::<String>(&mut conn).await?;
        if pong != "PONG" {
            return Err(Error::StoreUnavailable(format!(
                "Unexpected PING reply: {pong}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchRepository for RedisStore {
    async fn load_all(&self) -> Result<Vec<SearchDefinition>> {
        let entries: HashMap<String, String> = self.conn().hgetall(&self.searches_key).await?;

        let mut searches = Vec::with_capacity(entries.len());
        for (key, raw) in entries {
            match serde_json::from_str::<SearchDefinition>(&raw) {
                Ok(search) => searches.push(search),
                Err(e) => {
                    warn!(search = %key, error = %e, "Skipping unreadable persisted search");
                }
            }
        }
        searches.sort_by_key(|s| s.key());
        Ok(searches)
    }

    async fn save(&self, search: &SearchDefinition) -> Result<()> {
        let value = serde_json::to_string(search)?;
        let _: bool = self
            .conn()
            .hset_nx(&self.searches_key, search.key().as_str(), value)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &SearchKey) -> Result<bool> {
        let removed: u64 = self.conn().hdel(&self.searches_key, key.as_str()).await?;
        Ok(removed > 0)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Hide credentials embedded in a connection URL before logging it.
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
