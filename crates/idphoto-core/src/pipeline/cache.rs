//! Content-addressed result cache with single-flight computation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::ImageInfo;
use crate::error::Result;

/// SHA-256 cache key.
pub type Fingerprint = [u8; 32];

/// Fingerprint of an image's identity, decoded pixels and the format it
/// is validated against.
///
/// Detectors may resolve landmarks by path, so equal pixels under
/// different paths are different keys.
#[must_use]
pub fn fingerprint(image: &ImageInfo, format: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(image.path.as_bytes());
    hasher.update([0]);
    hasher.update(image.width.to_le_bytes());
    hasher.update(image.height.to_le_bytes());
    hasher.update(format!("{:?}", image.image.color()).as_bytes());
    hasher.update(image.image.as_bytes());
    hasher.update([0]);
    hasher.update(format.as_bytes());
    hasher.finalize().into()
}

type Slot<V> = Arc<OnceLock<Result<V>>>;

struct Entries<V> {
    slots: HashMap<Fingerprint, Slot<V>>,
    order: VecDeque<Fingerprint>,
}

/// Bounded cache where concurrent requests for the same key run the
/// computation once and share its result.
///
/// Failed computations are not retained; the next request recomputes.
pub struct ResultCache<V> {
    entries: Mutex<Entries<V>>,
    capacity: usize,
}

impl<V> std::fmt::Debug for ResultCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<V> ResultCache<V> {
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                slots: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Number of entries, including in-flight ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.slots.clear();
        entries.order.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Entries<V>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<V: Clone> ResultCache<V> {
    /// Returns the cached value for `key`, computing it with `compute` if
    /// absent. The flag is true when the value was not computed by this
    /// call.
    pub fn get_or_compute(
        &self,
        key: Fingerprint,
        compute: impl FnOnce() -> Result<V>,
    ) -> (Result<V>, bool) {
        let slot = self.slot(key);
        let mut computed = false;
        let value = slot
            .get_or_init(|| {
                computed = true;
                compute()
            })
            .clone();

        if value.is_err() && computed {
            let mut entries = self.lock();
            if entries
                .slots
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &slot))
            {
                entries.slots.remove(&key);
                entries.order.retain(|k| *k != key);
            }
        }
        (value, !computed)
    }

    fn slot(&self, key: Fingerprint) -> Slot<V> {
        let mut entries = self.lock();
        if let Some(slot) = entries.slots.get(&key) {
            return Arc::clone(slot);
        }
        while entries.slots.len() >= self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.slots.remove(&oldest);
            debug!("evicted cache entry {:02x}{:02x}..", oldest[0], oldest[1]);
        }
        let slot: Slot<V> = Arc::new(OnceLock::new());
        entries.slots.insert(key, Arc::clone(&slot));
        entries.order.push_back(key);
        slot
    }
}
