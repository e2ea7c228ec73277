//! Process-wide serialization of reconciliation passes.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{GamutError, Result};
use crate::reconcile::{PassReport, Reconciler};

/// Exclusive lock around the manifest and output directory pair.
///
/// A pass holds the lock from manifest load to manifest persist. Callers that
/// arrive while a pass runs wait for it instead of being dropped.
#[derive(Clone, Default)]
pub struct PassGuard {
    lock: Arc<Mutex<()>>,
}

impl fmt::Debug for PassGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassGuard")
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl PassGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the blocking `pass` on the blocking pool while holding the lock.
    ///
    /// The lock travels into the blocking task, so it is released when the
    /// pass ends even if it panics or the awaiting future is dropped.
    pub async fn run<F, T>(&self, pass: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.lock).lock_owned().await;
        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            pass()
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(join_err) => Err(GamutError::Internal(format!(
                "reconciliation pass panicked: {join_err}"
            ))),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

/// Something that can run one complete reconciliation pass.
#[async_trait]
pub trait PassRunner: Send + Sync {
    async fn run_pass(&self) -> Result<PassReport>;
}

/// [`Reconciler`] behind a [`PassGuard`].
#[derive(Debug, Clone)]
pub struct GuardedReconciler {
    guard: PassGuard,
    reconciler: Arc<Reconciler>,
}

impl GuardedReconciler {
    pub fn new(guard: PassGuard, reconciler: Arc<Reconciler>) -> Self {
        Self { guard, reconciler }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}

#[async_trait]
impl PassRunner for GuardedReconciler {
    async fn run_pass(&self) -> Result<PassReport> {
        let reconciler = Arc::clone(&self.reconciler);
        self.guard.run(move || reconciler.run_pass()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn passes_never_overlap() {
        let guard = PassGuard::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let guard = guard.clone();
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let completed = Arc::clone(&completed);
            handles.push(tokio::spawn(async move {
                guard
                    .run(move || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(30));
                        active.fetch_sub(1, Ordering::SeqCst);
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 4);
        assert!(!guard.is_busy());
    }

    #[tokio::test]
    async fn lock_is_released_after_errors_and_panics() {
        let guard = PassGuard::new();

        let failed: Result<()> = guard
            .run(|| Err(GamutError::Internal("boom".to_string())))
            .await;
        assert!(failed.is_err());
        assert!(!guard.is_busy());

        let panicked: Result<()> = guard.run(|| panic!("pass blew up")).await;
        assert!(matches!(panicked, Err(GamutError::Internal(_))));
        assert!(!guard.is_busy());

        let value = guard.run(|| Ok(7)).await.unwrap();
        assert_eq!(value, 7);
    }
}
