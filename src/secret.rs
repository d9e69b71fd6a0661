//! Random per-session secrets.

use rand::Rng;
use rand::distr::Alphanumeric;

/// Length of the held-back HMAC signing secrets.
pub const SIGNING_SECRET_LENGTH: usize = 64;

/// Length of the correlation handle embedded in token claims.
pub const SECRET_HANDLE_LENGTH: usize = 32;

/// The three independent values generated for every new session.
#[derive(Clone)]
pub struct SessionSecrets {
    pub auth_signing_secret: String,
    pub refresh_signing_secret: String,
    pub secret_handle: String,
}

impl SessionSecrets {
    pub fn generate() -> Self {
        Self {
            auth_signing_secret: random_string(SIGNING_SECRET_LENGTH),
            refresh_signing_secret: random_string(SIGNING_SECRET_LENGTH),
            secret_handle: random_string(SECRET_HANDLE_LENGTH),
        }
    }
}

impl std::fmt::Debug for SessionSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionSecrets { .. }")
    }
}

/// Alphanumeric string drawn from the thread-local CSPRNG.
pub fn random_string(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_string_format() {
        let s = random_string(48);
        assert_eq!(s.len(), 48);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_session_secrets_are_independent() {
        let secrets = SessionSecrets::generate();
        assert_eq!(secrets.auth_signing_secret.len(), SIGNING_SECRET_LENGTH);
        assert_eq!(secrets.refresh_signing_secret.len(), SIGNING_SECRET_LENGTH);
        assert_eq!(secrets.secret_handle.len(), SECRET_HANDLE_LENGTH);
        assert_ne!(secrets.auth_signing_secret, secrets.refresh_signing_secret);
        assert_ne!(secrets.auth_signing_secret, secrets.secret_handle);
    }

    #[test]
    fn test_debug_does_not_leak() {
        let secrets = SessionSecrets::generate();
        let printed = format!("{:?}", secrets);
        assert!(!printed.contains(&secrets.auth_signing_secret));
    }
}
