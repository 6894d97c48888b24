//! Persistent key-value scope for client-side state that must survive
//! restarts: the per-operator batch cache. Modeled as a capability trait so
//! the core never depends on where the bytes live; the shipped
//! implementation is one JSON file per key under a configurable directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: &Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating kv directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

/// Keys carry emails and colons; encode anything outside a filename-safe
/// alphabet so distinct keys map to distinct files.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Write to a sibling temp file, then rename. A crash mid-write leaves the
/// previous value intact.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

impl KvStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let value = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(&self.path_for(key), &bytes)
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn scratch_store() -> FileKv {
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let dir = std::env::temp_dir().join(format!(
            "timeclock-kv-{}-{}",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        FileKv::new(dir).unwrap()
    }

    #[test]
    fn get_of_a_missing_key_is_none() {
        let kv = scratch_store();
        assert!(kv.get("batch-actions:nobody").unwrap().is_none());
    }

    #[test]
    fn set_then_get_round_trips() {
        let kv = scratch_store();
        let value = json!({"bob@x": {"checkIn": {"timestamp": "2026-03-02T08:00:00Z", "label": "Bob"}}});
        kv.set("batch-actions:gatekeeper", &value).unwrap();
        assert_eq!(kv.get("batch-actions:gatekeeper").unwrap(), Some(value));
    }

    #[test]
    fn remove_is_idempotent() {
        let kv = scratch_store();
        kv.set("batch-actions:gatekeeper", &json!({})).unwrap();
        kv.remove("batch-actions:gatekeeper").unwrap();
        kv.remove("batch-actions:gatekeeper").unwrap();
        assert!(kv.get("batch-actions:gatekeeper").unwrap().is_none());
    }

    #[test]
    fn distinct_keys_map_to_distinct_files() {
        let kv = scratch_store();
        kv.set("batch-actions:a@x", &json!(1)).unwrap();
        kv.set("batch-actions:a_x", &json!(2)).unwrap();
        assert_eq!(kv.get("batch-actions:a@x").unwrap(), Some(json!(1)));
        assert_eq!(kv.get("batch-actions:a_x").unwrap(), Some(json!(2)));
    }
}
