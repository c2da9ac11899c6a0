use super::SecretStore;
use crate::config::VaultConfig;
use crate::error::WarehouseError;
use backon::{ConstantBuilder, Retryable};
use std::cell::Cell;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of polling the secret store before first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready { attempts: u32 },
    Unavailable { attempts: u32 },
}

impl Readiness {
    /// `Unavailable` is fatal: nothing may touch the store or the database after it.
    pub fn into_result(self) -> Result<u32, WarehouseError> {
        match self {
            Readiness::Ready { attempts } => Ok(attempts),
            Readiness::Unavailable { attempts } => {
                Err(WarehouseError::SecretStoreUnavailable { attempts })
            }
        }
    }
}

/// Fixed-interval, bounded health polling. No backoff growth, no jitter.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessGate {
    max_attempts: u32,
    interval: Duration,
}

enum NotReady {
    Unhealthy,
    Unreachable(String),
}

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReady::Unhealthy => f.write_str("health check reported not ready"),
            NotReady::Unreachable(e) => write!(f, "health check failed: {e}"),
        }
    }
}

impl ReadinessGate {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    pub fn from_config(cfg: &VaultConfig) -> Self {
        Self::new(cfg.health_max_attempts, cfg.health_interval())
    }

    pub async fn await_ready<S: SecretStore>(&self, store: &S) -> Readiness {
        let max_attempts = self.max_attempts;
        let attempts = Cell::new(0u32);

        let policy = ConstantBuilder::default()
            .with_delay(self.interval)
            .with_max_times((max_attempts - 1) as usize);

        let outcome = (|| async {
            attempts.set(attempts.get() + 1);
            match store.is_healthy().await {
                Ok(true) => Ok(()),
                Ok(false) => Err(NotReady::Unhealthy),
                Err(e) => Err(NotReady::Unreachable(e.to_string())),
            }
        })
        .retry(policy)
        .notify(|reason: &NotReady, _dur: Duration| {
            info!(
                attempt = attempts.get(),
                max_attempts, "Waiting for secret store to be ready: {reason}"
            );
        })
        .await;

        let attempts = attempts.get();
        match outcome {
            Ok(()) => {
                info!(attempts, "Secret store is ready");
                Readiness::Ready { attempts }
            }
            Err(reason) => {
                warn!(attempts, "Secret store is not available: {reason}");
                Readiness::Unavailable { attempts }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecretStore;

    #[tokio::test]
    async fn ready_on_first_healthy_response() {
        let store = MemorySecretStore::new();
        store.script_health([false, false]);

        let gate = ReadinessGate::new(5, Duration::ZERO);
        assert_eq!(
            gate.await_ready(&store).await,
            Readiness::Ready { attempts: 3 }
        );
        assert_eq!(store.health_checks(), 3);
    }

    #[tokio::test]
    async fn unavailable_after_max_consecutive_failures() {
        let store = MemorySecretStore::new();
        store.script_health([false; 6]);

        let gate = ReadinessGate::new(5, Duration::ZERO);
        let readiness = gate.await_ready(&store).await;
        assert_eq!(readiness, Readiness::Unavailable { attempts: 5 });
        assert_eq!(store.health_checks(), 5);
        assert!(matches!(
            readiness.into_result(),
            Err(WarehouseError::SecretStoreUnavailable { attempts: 5 })
        ));
    }

    #[tokio::test]
    async fn zero_attempts_still_polls_once() {
        let store = MemorySecretStore::new();
        let gate = ReadinessGate::new(0, Duration::ZERO);
        assert_eq!(
            gate.await_ready(&store).await,
            Readiness::Ready { attempts: 1 }
        );
    }

    #[tokio::test]
    async fn waits_fixed_interval_between_attempts() {
        let store = MemorySecretStore::new();
        store.script_health([false, false]);

        let gate = ReadinessGate::new(3, Duration::from_millis(20));
        let started = std::time::Instant::now();
        assert_eq!(
            gate.await_ready(&store).await,
            Readiness::Ready { attempts: 3 }
        );
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
