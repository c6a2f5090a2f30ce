// Cancellation scopes: one lineage of background work per session attempt.
//
// Every timer and request a controller starts is registered under the
// current scope. Cancelling the scope stops the sleeping timers and drops
// in-flight request futures. Results that were already queued when the
// scope died are rejected by comparing the generation they were issued
// under with `ScopeLineage::is_current` at the callback boundary.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Identifies one scope within a controller's lifetime.
pub type Generation = u64;

/// A cancellable set of background operations bound to one session attempt.
#[derive(Debug, Clone)]
pub struct CancellationScope {
    generation: Generation,
    token: CancellationToken,
}

impl CancellationScope {
    /// A fresh, live scope.
    pub fn create(generation: Generation) -> Self {
        CancellationScope {
            generation,
            token: CancellationToken::new(),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Invalidate everything registered under this scope. Idempotent.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!("Cancelling scope (gen: {})", self.generation);
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the scope is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Run `operation` until it finishes or the scope is cancelled,
    /// whichever comes first. Returns `false` without spawning anything if
    /// the scope is already cancelled.
    pub fn spawn<F>(&self, operation: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.token.is_cancelled() {
            debug!(
                "Ignoring registration on cancelled scope (gen: {})",
                self.generation
            );
            return false;
        }
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = operation => {}
            }
        });
        true
    }

    /// Like [`spawn`](Self::spawn), but waits `delay` first. The timer is
    /// owned by the scope: cancelling it before `delay` elapses means
    /// `operation` never starts.
    pub fn spawn_after<F>(&self, delay: Duration, operation: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            operation.await;
        })
    }
}

/// The chain of scopes a controller has created. Exactly one is current;
/// every predecessor has been cancelled.
#[derive(Debug)]
pub struct ScopeLineage {
    current: CancellationScope,
}

impl ScopeLineage {
    pub fn new() -> Self {
        ScopeLineage {
            current: CancellationScope::create(0),
        }
    }

    pub fn current(&self) -> &CancellationScope {
        &self.current
    }

    pub fn generation(&self) -> Generation {
        self.current.generation
    }

    /// Cancel the current scope and replace it with a fresh one. Used by
    /// every start, restart and supersede.
    pub fn renew(&mut self) -> &CancellationScope {
        self.current.cancel();
        self.current = CancellationScope::create(self.current.generation + 1);
        &self.current
    }

    /// Cancel the current scope without creating a successor.
    pub fn cancel(&self) {
        self.current.cancel();
    }

    /// Whether work issued under `generation` may still act on the
    /// controller's state.
    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.current.generation && !self.current.is_cancelled()
    }
}

impl Default for ScopeLineage {
    fn default() -> Self {
        Self::new()
    }
}
