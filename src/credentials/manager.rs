//! Monitoring credential lifecycle.

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Configured password meaning "generate one for me".
pub const SENTINEL_PASSWORD: &str = "changeme";

/// Length of generated passwords.
pub const GENERATED_PASSWORD_LEN: usize = 20;

/// Username/password pair rendered into the monitoring block.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Result of one credential resolution.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub credentials: Credentials,
    /// True only on the call that generated a fresh password.
    pub generated: bool,
}

/// Owns the generated monitoring password across reconciliation passes.
#[derive(Default)]
pub struct CredentialManager {
    generated: Option<String>,
}

impl CredentialManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a manager from a previously persisted password.
    pub fn with_generated(password: Option<String>) -> Self {
        Self {
            generated: password.filter(|p| !p.is_empty() && p != SENTINEL_PASSWORD),
        }
    }

    /// The password generated in an earlier pass, if any.
    pub fn generated(&self) -> Option<&str> {
        self.generated.as_deref()
    }

    /// Resolve the credentials to render.
    ///
    /// A sentinel password is replaced by a generated one, generated at most
    /// once and reused afterwards. Any other configured password is used
    /// verbatim and discards the generated value.
    pub fn resolve(&mut self, username: &str, configured_password: &str) -> Resolved {
        if configured_password != SENTINEL_PASSWORD {
            if self.generated.take().is_some() {
                tracing::info!("Configured monitoring password replaces the generated one");
            }
            return Resolved {
                credentials: Credentials::new(username, configured_password),
                generated: false,
            };
        }

        if let Some(existing) = &self.generated {
            return Resolved {
                credentials: Credentials::new(username, existing.clone()),
                generated: false,
            };
        }

        let password = generate_password(GENERATED_PASSWORD_LEN);
        self.generated = Some(password.clone());

        // One-time disclosure: this is the only place the value is ever logged.
        tracing::warn!(
            username = %username,
            password = %password,
            "Generated monitoring password"
        );

        Resolved {
            credentials: Credentials::new(username, password),
            generated: true,
        }
    }
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("generated", &self.generated.is_some())
            .finish()
    }
}

/// Generate an alphanumeric password from the thread-local CSPRNG.
pub fn generate_password(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_password_of_requested_length() {
        assert_eq!(generate_password(20).len(), 20);
        assert_eq!(generate_password(15).len(), 15);
        assert!(generate_password(20).chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_password(20), generate_password(20));
    }

    #[test]
    fn test_sentinel_generates_once_and_is_stable() {
        let mut manager = CredentialManager::new();

        let first = manager.resolve("admin", SENTINEL_PASSWORD);
        assert!(first.generated);
        assert_ne!(first.credentials.password(), SENTINEL_PASSWORD);
        assert_eq!(first.credentials.password().len(), GENERATED_PASSWORD_LEN);

        let second = manager.resolve("admin", SENTINEL_PASSWORD);
        assert!(!second.generated);
        assert_eq!(first.credentials, second.credentials);
    }

    #[test]
    fn test_configured_password_used_verbatim_and_drops_generated() {
        let mut manager = CredentialManager::new();
        let generated = manager.resolve("admin", SENTINEL_PASSWORD);

        let explicit = manager.resolve("admin", "s3cret");
        assert_eq!(explicit.credentials.password(), "s3cret");
        assert!(manager.generated().is_none());

        // Going back to the sentinel generates a fresh value.
        let regenerated = manager.resolve("admin", SENTINEL_PASSWORD);
        assert!(regenerated.generated);
        assert_ne!(regenerated.credentials, generated.credentials);
    }

    #[test]
    fn test_restored_password_is_reused() {
        let mut manager = CredentialManager::with_generated(Some("restoredpassword0001".into()));
        let resolved = manager.resolve("admin", SENTINEL_PASSWORD);
        assert!(!resolved.generated);
        assert_eq!(resolved.credentials.password(), "restoredpassword0001");

        assert!(CredentialManager::with_generated(Some(SENTINEL_PASSWORD.into()))
            .generated()
            .is_none());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("admin", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
