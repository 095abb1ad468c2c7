use super::RemoteStore;
use crate::cache::TtlRemaining;
use crate::error::{RemoteError, RemoteResult};
use parking_lot::Mutex;
use redis::{Connection, RedisError, Script};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

const COMPARE_AND_EXPIRE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

const SCAN_BATCH: usize = 500;

/// Connection settings of a [`RedisStore`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisStoreConfig {
    pub url: String,
    /// Bounds connect, read and write of every command.
    pub timeout: Duration,
    /// Idle connections kept for reuse.
    pub max_idle: usize,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            timeout: Duration::from_millis(500),
            max_idle: 8,
        }
    }
}

/// [`RemoteStore`] backed by a Redis server.
///
/// Uses blocking connections from a small idle pool. A connection that
/// fails a command is dropped rather than returned to the pool.
pub struct RedisStore {
    client: redis::Client,
    config: RedisStoreConfig,
    idle: Mutex<Vec<Connection>>,
    compare_and_delete: Script,
    compare_and_expire: Script,
}

impl RedisStore {
    /// Validates the URL. No connection is opened until the first command.
    pub fn open(config: RedisStoreConfig) -> RemoteResult<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| RemoteError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            config,
            idle: Mutex::new(Vec::new()),
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
            compare_and_expire: Script::new(COMPARE_AND_EXPIRE),
        })
    }

    fn connection(&self, operation: &'static str) -> RemoteResult<Connection> {
        if let Some(con) = self.idle.lock().pop() {
            return Ok(con);
        }
        let con = self
            .client
            .get_connection_with_timeout(self.config.timeout)
            .map_err(|e| self.map_error(operation, e))?;
        con.set_read_timeout(Some(self.config.timeout))
            .map_err(|e| self.map_error(operation, e))?;
        con.set_write_timeout(Some(self.config.timeout))
            .map_err(|e| self.map_error(operation, e))?;
        debug!(url = %self.config.url, "opened redis connection");
        Ok(con)
    }

    fn run<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Connection) -> redis::RedisResult<T>,
    ) -> RemoteResult<T> {
        let mut con = self.connection(operation)?;
        match f(&mut con) {
            Ok(value) => {
                let mut idle = self.idle.lock();
                if idle.len() < self.config.max_idle {
                    idle.push(con);
                }
                Ok(value)
            }
            Err(e) => Err(self.map_error(operation, e)),
        }
    }

    fn map_error(&self, operation: &'static str, e: RedisError) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout {
                operation,
                after: self.config.timeout,
            }
        } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
            RemoteError::Connection(e.to_string())
        } else {
            RemoteError::Response(e.to_string())
        }
    }

    fn scan_prefix(&self, prefix: &str) -> RemoteResult<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = self.run("scan", |con| {
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query(con)
            })?;
            keys.extend(batch);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }
}

fn millis(ttl: Duration) -> u64 {
    // PX rejects zero; sub-millisecond TTLs round up.
    (ttl.as_millis() as u64).max(1)
}

fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl RemoteStore for RedisStore {
    fn get(&self, key: &str) -> RemoteResult<Option<Vec<u8>>> {
        self.run("get", |con| redis::cmd("GET").arg(key).query(con))
    }

    fn mget(&self, keys: &[String]) -> RemoteResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.run("mget", |con| redis::cmd("MGET").arg(keys).query(con))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> RemoteResult<()> {
        self.run("set", |con| {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(millis(ttl));
            }
            cmd.query::<()>(con)
        })
    }

    fn set_nx(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> RemoteResult<bool> {
        let reply: Option<String> = self.run("set_nx", |con| {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value).arg("NX");
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(millis(ttl));
            }
            cmd.query(con)
        })?;
        Ok(reply.is_some())
    }

    fn delete(&self, key: &str) -> RemoteResult<bool> {
        let removed: i64 = self.run("delete", |con| redis::cmd("DEL").arg(key).query(con))?;
        Ok(removed > 0)
    }

    fn delete_prefix(&self, prefix: &str) -> RemoteResult<u64> {
        let keys = self.scan_prefix(prefix)?;
        let mut removed = 0u64;
        for chunk in keys.chunks(SCAN_BATCH) {
            let n: i64 = self.run("delete_prefix", |con| redis::cmd("DEL").arg(chunk).query(con))?;
            removed += n.max(0) as u64;
        }
        Ok(removed)
    }

    fn exists(&self, key: &str) -> RemoteResult<bool> {
        let n: i64 = self.run("exists", |con| redis::cmd("EXISTS").arg(key).query(con))?;
        Ok(n > 0)
    }

    fn ttl(&self, key: &str) -> RemoteResult<TtlRemaining> {
        let pttl: i64 = self.run("ttl", |con| redis::cmd("PTTL").arg(key).query(con))?;
        Ok(match pttl {
            -2 => TtlRemaining::Missing,
            -1 => TtlRemaining::NoExpiry,
            ms if ms >= 0 => TtlRemaining::Expires(Duration::from_millis(ms as u64)),
            other => {
                return Err(RemoteError::Response(format!(
                    "unexpected PTTL reply {}",
                    other
                )))
            }
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> RemoteResult<bool> {
        let n: i64 = self.run("expire", |con| {
            redis::cmd("PEXPIRE").arg(key).arg(millis(ttl)).query(con)
        })?;
        Ok(n == 1)
    }

    fn persist(&self, key: &str) -> RemoteResult<bool> {
        let n: i64 = self.run("persist", |con| redis::cmd("PERSIST").arg(key).query(con))?;
        // PERSIST answers 0 both for missing keys and keys without expiry.
        if n == 1 {
            Ok(true)
        } else {
            self.exists(key)
        }
    }

    fn count_prefix(&self, prefix: &str) -> RemoteResult<u64> {
        Ok(self.scan_prefix(prefix)?.len() as u64)
    }

    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> RemoteResult<bool> {
        let n: i64 = self.run("compare_and_delete", |con| {
            self.compare_and_delete.key(key).arg(expected).invoke(con)
        })?;
        Ok(n == 1)
    }

    fn compare_and_expire(&self, key: &str, expected: &[u8], ttl: Duration) -> RemoteResult<bool> {
        let n: i64 = self.run("compare_and_expire", |con| {
            self.compare_and_expire
                .key(key)
                .arg(expected)
                .arg(millis(ttl))
                .invoke(con)
        })?;
        Ok(n == 1)
    }
}
