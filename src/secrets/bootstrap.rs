use super::{Credentials, SecretStore};
use crate::error::WarehouseError;
use tracing::{info, warn};

pub const ENV_SEED_USER: &str = "POSTGRES_USER";
pub const ENV_SEED_PASSWORD: &str = "POSTGRES_PASSWORD";
pub const ENV_SEED_DB: &str = "POSTGRES_DB";

/// Result of credential acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapResult {
    /// Steady state: the document exists and was read.
    Ready(Credentials),
    /// First run: the document was just written. The caller must not use it in
    /// this run; the next invocation reads it back from the store.
    SeededAwaitingRerun,
}

/// Values used to seed the store on first run. Empty values count as absent.
#[derive(Debug, Clone, Default)]
pub struct FirstRunSeed {
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_name: Option<String>,
}

impl FirstRunSeed {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            db_user: var(ENV_SEED_USER),
            db_password: var(ENV_SEED_PASSWORD),
            db_name: var(ENV_SEED_DB),
        }
    }

    fn into_credentials(self) -> Result<Credentials, WarehouseError> {
        let present = |v: Option<String>| v.filter(|s| !s.is_empty());
        match (
            present(self.db_user),
            present(self.db_password),
            present(self.db_name),
        ) {
            (Some(db_user), Some(db_password), Some(db_name)) => Ok(Credentials {
                db_user,
                db_password,
                db_name,
            }),
            (user, password, name) => {
                let missing = [
                    (user.is_none(), ENV_SEED_USER),
                    (password.is_none(), ENV_SEED_PASSWORD),
                    (name.is_none(), ENV_SEED_DB),
                ]
                .into_iter()
                .filter_map(|(absent, var)| absent.then_some(var))
                .collect();
                Err(WarehouseError::MissingFirstRunConfig { missing })
            }
        }
    }
}

/// Lookup, and on a missing document, one-shot first-run initialization.
pub struct CredentialBootstrapper<'a, S> {
    store: &'a S,
    path: &'a str,
    seed: FirstRunSeed,
}

impl<'a, S: SecretStore> CredentialBootstrapper<'a, S> {
    pub fn new(store: &'a S, path: &'a str, seed: FirstRunSeed) -> Self {
        Self { store, path, seed }
    }

    /// Read failures other than not-found propagate unchanged without retry.
    pub async fn get_credentials(self) -> Result<BootstrapResult, WarehouseError> {
        if let Some(creds) = self.store.read_credentials(self.path).await? {
            info!(path = self.path, "Database credentials loaded from secret store");
            return Ok(BootstrapResult::Ready(creds));
        }

        warn!(
            path = self.path,
            "Secrets not found in secret store; this appears to be the first run"
        );
        let creds = self.seed.into_credentials()?;

        info!(path = self.path, "Writing initial credentials to secret store");
        self.store.write_credentials(self.path, &creds).await?;
        info!(
            path = self.path,
            "Secrets successfully written to secret store; re-run the command"
        );
        Ok(BootstrapResult::SeededAwaitingRerun)
    }
}

/// Lookup-only resolution for read paths: a missing document is fatal and
/// never triggers seeding.
pub async fn resolve_existing<S: SecretStore>(
    store: &S,
    path: &str,
) -> Result<Credentials, WarehouseError> {
    store
        .read_credentials(path)
        .await?
        .ok_or_else(|| WarehouseError::CredentialsNotInitialized {
            path: path.to_string(),
        })
}
