//! Active anti-entropy: a background sweep of everything a backend holds,
//! re-verifying each object's hash and triggering repair/rebalance hooks.
//!
//! The walker only knows about [`Backend`] and [`AaeHooks`] — it has no
//! notion of `Cluster` or `Site` — so this crate stays below `cask-cluster`
//! in the dependency graph. `cask-cluster::Site` is the concrete `AaeHooks`
//! implementation plugged in by the CLI.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cask_core::{Key, Result};
use rand::seq::SliceRandom;
use tokio::fs;
use tracing::{error, info, warn};

use crate::backend::Backend;

/// Callbacks the AAE walker invokes for each object it visits. Implemented
/// by `cask-cluster::Site`.
#[async_trait]
pub trait AaeHooks: Send + Sync {
    /// Re-verify `key` against its freshly computed hash, repairing from a
    /// peer on mismatch.
    async fn verify(&self, key: &Key, observed_hash: &str) -> Result<()>;

    /// Reconcile local replica count against the read ring.
    async fn rebalance(&self, key: &Key) -> Result<()>;
}

/// Runs forever, walking `backend`'s root directory tree in shuffled order
/// and sleeping `interval + jitter` seconds between full sweeps.
///
/// A random offset in `[0, 10000)` is chosen once at startup; per-file visits
/// below that count are skipped (no verify, no rebalance) rather than
/// processed, so a freshly started node doesn't immediately pile onto its
/// peers at the same moment every other node in the cluster does. Until that
/// warm-up is done, sweeps also run back-to-back with no inter-sweep sleep,
/// so the skip count is burned through quickly rather than over many
/// `interval`-length sweeps.
///
/// Exits the process (non-zero) if the backend's root becomes unreadable:
/// fail fast on mount loss rather than silently idling.
pub async fn run(backend: Arc<dyn Backend>, hooks: Arc<dyn AaeHooks>, interval: Duration) -> ! {
    let skip_offset = rand::random::<u64>() % 10_000;
    let skipped = AtomicU64::new(0);

    loop {
        if let Err(e) = backend.health_check().await {
            error!(error = %e, "active anti-entropy: backend root unreadable, failing fast");
            std::process::exit(1);
        }

        if skipped.load(Ordering::Relaxed) >= skip_offset {
            let jitter = rand::random::<u64>() % 5;
            tokio::time::sleep(Duration::from_secs(interval.as_secs() + jitter)).await;
            info!("AAE starting at the top");
        }

        if let Err(e) = walk_root(backend.as_ref(), hooks.as_ref(), &skipped, skip_offset).await {
            warn!(error = %e, "active anti-entropy walk ended early");
        }
    }
}

async fn walk_root(
    backend: &dyn Backend,
    hooks: &dyn AaeHooks,
    skipped: &AtomicU64,
    skip_offset: u64,
) -> Result<()> {
    let root = match backend_root(backend) {
        Some(root) => root,
        None => return Ok(()),
    };
    walk_dir(&root, hooks, skipped, skip_offset).await
}

/// `LocalBackend` is the only concrete backend this workspace carries, so the
/// walker downcasts to reach its filesystem root. A future non-filesystem
/// backend would need its own sweep strategy behind the same `Backend`
/// boundary.
fn backend_root(backend: &dyn Backend) -> Option<PathBuf> {
    backend
        .as_any()
        .downcast_ref::<crate::backend::LocalBackend>()
        .map(|b| b.root().to_path_buf())
}

async fn walk_dir(
    dir: &Path,
    hooks: &dyn AaeHooks,
    skipped: &AtomicU64,
    skip_offset: u64,
) -> Result<()> {
    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        entries.push(entry);
    }
    entries.shuffle(&mut rand::thread_rng());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            Box::pin(walk_dir(&path, hooks, skipped, skip_offset)).await?;
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()) != Some("data") {
            continue;
        }
        visit(&path, hooks, skipped, skip_offset).await;
    }
    Ok(())
}

async fn visit(path: &Path, hooks: &dyn AaeHooks, skipped: &AtomicU64, skip_offset: u64) {
    if skipped.load(Ordering::Relaxed) < skip_offset {
        skipped.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let path_str = path.to_string_lossy();
    let key = match Key::from_path(&path_str) {
        Ok(k) => k,
        Err(e) => {
            warn!(path = %path_str, error = %e, "couldn't derive key from path");
            return;
        }
    };

    let data = match fs::read(path).await {
        Ok(d) => d,
        Err(e) => {
            warn!(path = %path_str, error = %e, "error opening file during AAE sweep");
            return;
        }
    };
    let observed = Key::from_bytes(&data);

    if let Err(e) = hooks.verify(&key, observed.value()).await {
        warn!(key = %key, error = %e, "verify failed during AAE sweep");
    }
    if let Err(e) = hooks.rebalance(&key).await {
        warn!(key = %key, error = %e, "rebalance failed during AAE sweep");
    }

    // slow things down a little to keep server load down
    let jitter = rand::random::<u64>() % 5;
    tokio::time::sleep(Duration::from_secs(10 + jitter)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHooks {
        verified: AtomicUsize,
        rebalanced: AtomicUsize,
    }

    #[async_trait]
    impl AaeHooks for CountingHooks {
        async fn verify(&self, _key: &Key, _observed_hash: &str) -> Result<()> {
            self.verified.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn rebalance(&self, _key: &Key) -> Result<()> {
            self.rebalanced.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn walk_visits_each_stored_object_once() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        for data in [&b"a"[..], &b"bb"[..], &b"ccc"[..]] {
            let key = Key::from_bytes(data);
            backend.write(&key, Bytes::copy_from_slice(data)).await.unwrap();
        }

        let hooks = Arc::new(CountingHooks {
            verified: AtomicUsize::new(0),
            rebalanced: AtomicUsize::new(0),
        });
        let skipped = AtomicU64::new(0);
        walk_root(&backend, hooks.as_ref(), &skipped, 0).await.unwrap();

        assert_eq!(hooks.verified.load(Ordering::SeqCst), 3);
        assert_eq!(hooks.rebalanced.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn skip_offset_suppresses_early_visits() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        for data in [&b"a"[..], &b"bb"[..], &b"ccc"[..]] {
            let key = Key::from_bytes(data);
            backend.write(&key, Bytes::copy_from_slice(data)).await.unwrap();
        }

        let hooks = Arc::new(CountingHooks {
            verified: AtomicUsize::new(0),
            rebalanced: AtomicUsize::new(0),
        });
        let skipped = AtomicU64::new(0);
        walk_root(&backend, hooks.as_ref(), &skipped, 3).await.unwrap();

        assert_eq!(hooks.verified.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.rebalanced.load(Ordering::SeqCst), 0);
        assert_eq!(skipped.load(Ordering::Relaxed), 3);
    }
}
