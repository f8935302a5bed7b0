// ===============================
// src/cache.rs (open-order recovery)
// ===============================
//
// Write-through store for non-terminal orders so a restart can rebuild the
// open-order table. The order manager saves on every state change and removes
// on terminal states; `load_all` rebuilds the table at startup.
//
use std::path::PathBuf;
use std::sync::Mutex;

use ahash::AHashMap as HashMap;
use tracing::{info, warn};

use crate::domain::Order;
use crate::error::EngineError;

pub trait OrderCache: Send + Sync {
    fn save(&self, order: &Order);
    fn remove(&self, client_order_id: &str);
    fn load_all(&self) -> Vec<Order>;
}

/// JSON-file implementation: one map of client_order_id -> order, rewritten
/// on every change. Open orders are few, so the full rewrite stays cheap.
pub struct FileOrderCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, Order>>,
}

impl FileOrderCache {
    /// Unreadable existing cache is fatal; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();
        let entries = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| EngineError::Fatal(format!("order cache {}: {e}", path.display())))?;
            serde_json::from_str::<HashMap<String, Order>>(&text)
                .map_err(|e| EngineError::Fatal(format!("order cache {}: {e}", path.display())))?
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| EngineError::Fatal(format!("order cache dir: {e}")))?;
                }
            }
            HashMap::new()
        };
        info!(path = %path.display(), entries = entries.len(), "order cache ready");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, Order>) {
        match serde_json::to_string(entries) {
            Ok(text) => {
                if let Err(e) = std::fs::write(&self.path, text) {
                    warn!(path = %self.path.display(), ?e, "order cache write failed");
                }
            }
            Err(e) => warn!(?e, "order cache serialize failed"),
        }
    }
}

impl OrderCache for FileOrderCache {
    fn save(&self, order: &Order) {
        let mut entries = self.entries.lock().expect("cache lock");
        entries.insert(order.client_order_id.clone(), order.clone());
        self.persist(&entries);
    }

    fn remove(&self, client_order_id: &str) {
        let mut entries = self.entries.lock().expect("cache lock");
        if entries.remove(client_order_id).is_some() {
            self.persist(&entries);
        }
    }

    fn load_all(&self) -> Vec<Order> {
        self.entries.lock().expect("cache lock").values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use rust_decimal_macros::dec;

    fn tmp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mmbot_cache_{name}.json"))
    }

    fn order(id: &str) -> Order {
        Order::new(id.to_string(), "ETH-USD".to_string(), Side::Buy, dec!(100.00), dec!(0.001))
    }

    #[test]
    fn survives_reopen() {
        let path = tmp_path("reopen");
        let _ = std::fs::remove_file(&path);

        {
            let cache = FileOrderCache::open(&path).unwrap();
            cache.save(&order("a"));
            cache.save(&order("b"));
            cache.remove("a");
        }

        let cache = FileOrderCache::open(&path).unwrap();
        let orders = cache.load_all();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].client_order_id, "b");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn corrupt_cache_is_fatal() {
        let path = tmp_path("corrupt");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(FileOrderCache::open(&path), Err(EngineError::Fatal(_))));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_starts_empty() {
        let path = tmp_path("fresh");
        let _ = std::fs::remove_file(&path);
        let cache = FileOrderCache::open(&path).unwrap();
        assert!(cache.load_all().is_empty());
        let _ = std::fs::remove_file(&path);
    }
}
