//! Secret store access and the credential bootstrap protocol.
//!
//! Layout:
//! - `vault.rs`: HashiCorp Vault KV v2 client over HTTP
//! - `memory.rs`: in-process store with scriptable health and failures
//! - `readiness.rs`: bounded health polling before first use
//! - `bootstrap.rs`: first-run seeding vs. steady-state lookup

pub mod bootstrap;
pub mod memory;
pub mod readiness;
pub mod vault;

pub use bootstrap::{BootstrapResult, CredentialBootstrapper, FirstRunSeed, resolve_existing};
pub use memory::MemorySecretStore;
pub use readiness::{Readiness, ReadinessGate};
pub use vault::VaultClient;

use crate::error::WarehouseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Database credentials held in the secret store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(alias = "POSTGRES_USER")]
    pub db_user: String,
    #[serde(alias = "POSTGRES_PASSWORD")]
    pub db_password: String,
    #[serde(alias = "POSTGRES_DB")]
    pub db_name: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("db_user", &self.db_user)
            .field("db_password", &"<redacted>")
            .field("db_name", &self.db_name)
            .finish()
    }
}

/// Request/response operations of a key-value secret service.
///
/// A missing document is `Ok(None)`, never an error.
#[allow(async_fn_in_trait)]
pub trait SecretStore {
    async fn is_healthy(&self) -> Result<bool, WarehouseError>;

    async fn read_credentials(&self, path: &str) -> Result<Option<Credentials>, WarehouseError>;

    async fn write_credentials(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> Result<(), WarehouseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_password() {
        let creds = Credentials {
            db_user: "cryo".into(),
            db_password: "hunter2".into(),
            db_name: "cryoet".into(),
        };
        let shown = format!("{creds:?}");
        assert!(shown.contains("cryo"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn accepts_upper_case_document_keys() {
        let creds: Credentials = serde_json::from_str(
            r#"{"POSTGRES_USER":"u","POSTGRES_PASSWORD":"p","POSTGRES_DB":"d"}"#,
        )
        .expect("aliases parse");
        assert_eq!(creds.db_user, "u");
        assert_eq!(creds.db_password, "p");
        assert_eq!(creds.db_name, "d");
    }
}
