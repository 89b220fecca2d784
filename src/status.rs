//! Ephemeral job status for poll loops; entries read as absent after their TTL.

use crate::config::Config;
use crate::job::validate_job_id;
use crate::report::StatusRecord;
use crate::util::{ensure_dir, now_unix_millis, write_atomic};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub trait StatusSink: Send + Sync {
    fn publish(&self, job_id: &str, record: &StatusRecord, ttl: Duration) -> Result<()>;
    fn read(&self, job_id: &str) -> Result<Option<StatusRecord>>;
    fn delete(&self, job_id: &str) -> Result<()>;

    fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub fn status_key(prefix: &str, job_id: &str) -> String {
    format!("{prefix}{job_id}")
}

pub fn from_config(cfg: &Config) -> Result<Arc<dyn StatusSink>> {
    let prefix = cfg.status.key_prefix.as_str();
    match cfg.status.backend.as_str() {
        "memory" => {
            warn!("memory status backend is only visible inside this process");
            Ok(Arc::new(MemoryStatusSink::new(prefix)))
        }
        "file" => Ok(Arc::new(FileStatusSink::new(&cfg.paths.status_dir, prefix)?)),
        "redis" => redis_sink(cfg),
        other => bail!("unknown status.backend: {other}"),
    }
}

#[cfg(feature = "redis-status")]
fn redis_sink(cfg: &Config) -> Result<Arc<dyn StatusSink>> {
    Ok(Arc::new(RedisStatusSink::connect(
        &cfg.status.redis_url,
        &cfg.status.key_prefix,
    )?))
}

#[cfg(not(feature = "redis-status"))]
fn redis_sink(_cfg: &Config) -> Result<Arc<dyn StatusSink>> {
    bail!("status.backend = \"redis\" needs the `redis-status` cargo feature")
}

/// A TTL too large for `Instant` never expires.
pub struct MemoryStatusSink {
    prefix: String,
    entries: Mutex<HashMap<String, (StatusRecord, Option<Instant>)>>,
}

fn alive(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.is_none_or(|d| d > now)
}

impl MemoryStatusSink {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, (StatusRecord, Option<Instant>)>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("status map lock poisoned"))
    }
}

impl Default for MemoryStatusSink {
    fn default() -> Self {
        Self::new("stegmage:job:")
    }
}

impl StatusSink for MemoryStatusSink {
    fn publish(&self, job_id: &str, record: &StatusRecord, ttl: Duration) -> Result<()> {
        let key = status_key(&self.prefix, job_id);
        let mut entries = self.lock()?;
        let now = Instant::now();
        entries.retain(|_, (_, deadline)| alive(*deadline, now));
        entries.insert(key, (record.clone(), now.checked_add(ttl)));
        Ok(())
    }

    fn read(&self, job_id: &str) -> Result<Option<StatusRecord>> {
        let key = status_key(&self.prefix, job_id);
        let mut entries = self.lock()?;
        let now = Instant::now();
        let live = entries
            .get(&key)
            .map(|(record, deadline)| alive(*deadline, now).then(|| record.clone()));
        match live {
            Some(Some(record)) => Ok(Some(record)),
            Some(None) => {
                entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn delete(&self, job_id: &str) -> Result<()> {
        let key = status_key(&self.prefix, job_id);
        self.lock()?.remove(&key);
        Ok(())
    }
}

/// `now_ms + ttl`, saturating at `i64::MAX`.
pub fn expiry_millis(now_ms: i64, ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_add(ttl_ms)
}

#[derive(Serialize, Deserialize)]
struct FileEntry {
    key: String,
    record: StatusRecord,
    expires_at_ms: i64,
}

/// `<dir>/<job_id>.json`, shared between worker and poller processes.
pub struct FileStatusSink {
    dir: PathBuf,
    prefix: String,
}

impl FileStatusSink {
    pub fn new(dir: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        ensure_dir(&dir)?;
        Ok(Self {
            dir,
            prefix: prefix.to_string(),
        })
    }

    fn path(&self, job_id: &str) -> Result<PathBuf> {
        validate_job_id(job_id)?;
        Ok(self.dir.join(format!("{job_id}.json")))
    }

    /// Returns how many expired entries were removed.
    pub fn sweep(&self) -> Result<usize> {
        let now = now_unix_millis();
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("read_dir {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let expired = match std::fs::read(&path)
                .ok()
                .and_then(|raw| serde_json::from_slice::<FileEntry>(&raw).ok())
            {
                Some(e) => e.expires_at_ms <= now,
                None => true,
            };
            if expired && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        debug!("status sweep removed {removed} entries");
        Ok(removed)
    }
}

impl StatusSink for FileStatusSink {
    fn publish(&self, job_id: &str, record: &StatusRecord, ttl: Duration) -> Result<()> {
        let entry = FileEntry {
            key: status_key(&self.prefix, job_id),
            record: record.clone(),
            expires_at_ms: expiry_millis(now_unix_millis(), ttl),
        };
        write_atomic(&self.path(job_id)?, &serde_json::to_vec(&entry)?)
    }

    fn read(&self, job_id: &str) -> Result<Option<StatusRecord>> {
        let path = self.path(job_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let entry: FileEntry = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing status entry {}", path.display()))?;
        if entry.expires_at_ms <= now_unix_millis() {
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(entry.record))
    }

    fn delete(&self, job_id: &str) -> Result<()> {
        let path = self.path(job_id)?;
        if path.exists() {
            std::fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        }
        Ok(())
    }

    fn ping(&self) -> Result<()> {
        let probe = self.dir.join(".stegmage_write_probe");
        std::fs::write(&probe, b"ok")
            .with_context(|| format!("status dir not writable: {}", self.dir.display()))?;
        let _ = std::fs::remove_file(&probe);
        Ok(())
    }
}

#[cfg(feature = "redis-status")]
pub use redis_backend::RedisStatusSink;

#[cfg(feature = "redis-status")]
mod redis_backend {
    use super::{status_key, StatusSink};
    use crate::report::StatusRecord;
    use anyhow::{anyhow, Context, Result};
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing::debug;

    /// Redis rejects expiry times that overflow its millisecond clock.
    const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 3600;

    /// `SET .. EX`-backed sink, key layout `<prefix><job_id>`.
    pub struct RedisStatusSink {
        conn: Mutex<redis::Connection>,
        prefix: String,
    }

    impl RedisStatusSink {
        pub fn connect(url: &str, prefix: &str) -> Result<Self> {
            let client = redis::Client::open(url).with_context(|| format!("redis url {url}"))?;
            let conn = client
                .get_connection()
                .with_context(|| format!("connecting to redis at {url}"))?;
            debug!("connected to redis at {url}");
            Ok(Self {
                conn: Mutex::new(conn),
                prefix: prefix.to_string(),
            })
        }

        fn conn(&self) -> Result<std::sync::MutexGuard<'_, redis::Connection>> {
            self.conn.lock().map_err(|_| anyhow!("redis connection lock poisoned"))
        }
    }

    impl StatusSink for RedisStatusSink {
        fn publish(&self, job_id: &str, record: &StatusRecord, ttl: Duration) -> Result<()> {
            let key = status_key(&self.prefix, job_id);
            let value = serde_json::to_string(record)?;
            let seconds = ttl.as_secs().clamp(1, MAX_TTL_SECS);
            redis::cmd("SET")
                .arg(&key)
                .arg(value)
                .arg("EX")
                .arg(seconds)
                .query::<()>(&mut *self.conn()?)
                .with_context(|| format!("SET {key}"))
        }

        fn read(&self, job_id: &str) -> Result<Option<StatusRecord>> {
            let key = status_key(&self.prefix, job_id);
            let raw: Option<String> = redis::cmd("GET")
                .arg(&key)
                .query(&mut *self.conn()?)
                .with_context(|| format!("GET {key}"))?;
            match raw {
                Some(raw) => Ok(Some(
                    serde_json::from_str(&raw).with_context(|| format!("parsing {key}"))?,
                )),
                None => Ok(None),
            }
        }

        fn delete(&self, job_id: &str) -> Result<()> {
            let key = status_key(&self.prefix, job_id);
            redis::cmd("DEL")
                .arg(&key)
                .query::<i64>(&mut *self.conn()?)
                .with_context(|| format!("DEL {key}"))?;
            Ok(())
        }

        fn ping(&self) -> Result<()> {
            let mut conn = self.conn()?;
            redis::cmd("PING")
                .query::<String>(&mut *conn)
                .with_context(|| "redis PING")?;
            Ok(())
        }
    }
}
