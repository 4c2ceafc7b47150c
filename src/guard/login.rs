//! Login flow wiring the admission guard around a credential check.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info};

use super::limiter::AdmissionGuard;

/// Verifies a username/password pair.
///
/// The guard never sees credentials; this is the seam where the user store
/// plugs in.
pub trait CredentialCheck {
    fn verify(&self, username: &str, password: &str) -> bool;
}

impl<F> CredentialCheck for F
where
    F: Fn(&str, &str) -> bool,
{
    fn verify(&self, username: &str, password: &str) -> bool {
        self(username, password)
    }
}

/// Hex-encoded SHA-256 digest of a password.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// In-memory credential store holding password hashes.
#[derive(Debug, Clone, Default)]
pub struct HashedCredentials {
    hashes: HashMap<String, String>,
}

impl HashedCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user, hashing the plain-text password.
    pub fn insert(&mut self, username: &str, password: &str) {
        self.hashes
            .insert(username.to_string(), hash_password(password));
    }
}

impl CredentialCheck for HashedCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        self.hashes
            .get(username)
            .is_some_and(|stored| *stored == hash_password(password))
    }
}

/// Result of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Credentials accepted; the client's history was cleared
    Authenticated,
    /// Credentials rejected; the failure was recorded
    Rejected {
        remaining_attempts: u32,
        message: String,
    },
    /// The guard refused the attempt before credentials were checked
    Blocked { message: String },
}

/// Runs the check → verify → record sequence for each login submission.
pub struct LoginGate<'a, C> {
    guard: &'a AdmissionGuard,
    credentials: C,
}

impl<'a, C: CredentialCheck> LoginGate<'a, C> {
    pub fn new(guard: &'a AdmissionGuard, credentials: C) -> Self {
        Self { guard, credentials }
    }

    /// Attempt to log `username` in on behalf of `client_id`.
    pub fn attempt(&self, client_id: &str, username: &str, password: &str) -> LoginOutcome {
        let admission = self.guard.check(client_id);
        if !admission.allowed {
            debug!(client_id = %client_id, "Login refused by admission guard");
            return LoginOutcome::Blocked {
                message: admission.message,
            };
        }

        let success = self.credentials.verify(username, password);
        self.guard.record(client_id, success);

        if success {
            info!(client_id = %client_id, username = %username, "Login succeeded");
            return LoginOutcome::Authenticated;
        }

        let remaining_attempts = self.guard.status(client_id).remaining_attempts;
        debug!(
            client_id = %client_id,
            remaining_attempts = remaining_attempts,
            "Login failed"
        );
        LoginOutcome::Rejected {
            remaining_attempts,
            message: format!(
                "Invalid username or password. {} attempt(s) remaining",
                remaining_attempts
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_credentials() -> HashedCredentials {
        let mut credentials = HashedCredentials::new();
        credentials.insert("admin", "s3cret");
        credentials
    }

    #[test]
    fn test_hash_password_is_stable_hex() {
        let hash = hash_password("s3cret");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_password("s3cret"));
        assert_ne!(hash, hash_password("S3cret"));
    }

    #[test]
    fn test_hashed_credentials_verify() {
        let credentials = create_test_credentials();
        assert!(credentials.verify("admin", "s3cret"));
        assert!(!credentials.verify("admin", "wrong"));
        assert!(!credentials.verify("nobody", "s3cret"));
    }

    #[test]
    fn test_successful_login() {
        let guard = AdmissionGuard::default();
        let gate = LoginGate::new(&guard, create_test_credentials());

        assert_eq!(
            gate.attempt("session-1", "admin", "s3cret"),
            LoginOutcome::Authenticated
        );
    }

    #[test]
    fn test_rejected_login_counts_down() {
        let guard = AdmissionGuard::default();
        let gate = LoginGate::new(&guard, create_test_credentials());

        match gate.attempt("session-1", "admin", "nope") {
            LoginOutcome::Rejected {
                remaining_attempts, ..
            } => assert_eq!(remaining_attempts, 4),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_blocked_after_repeated_failures() {
        let guard = AdmissionGuard::default();
        let gate = LoginGate::new(&guard, create_test_credentials());

        for _ in 0..5 {
            assert!(matches!(
                gate.attempt("session-1", "admin", "nope"),
                LoginOutcome::Rejected { .. }
            ));
        }

        // Correct credentials are not even checked while blocked
        assert!(matches!(
            gate.attempt("session-1", "admin", "s3cret"),
            LoginOutcome::Blocked { .. }
        ));
    }

    #[test]
    fn test_success_resets_failures() {
        let guard = AdmissionGuard::default();
        let gate = LoginGate::new(&guard, create_test_credentials());

        for _ in 0..4 {
            gate.attempt("session-1", "admin", "nope");
        }
        assert_eq!(
            gate.attempt("session-1", "admin", "s3cret"),
            LoginOutcome::Authenticated
        );
        assert_eq!(guard.status("session-1").remaining_attempts, 5);
    }

    #[test]
    fn test_closure_credential_check() {
        let guard = AdmissionGuard::default();
        let gate = LoginGate::new(&guard, |user: &str, pass: &str| user == pass);

        assert_eq!(gate.attempt("c", "x", "x"), LoginOutcome::Authenticated);
    }
}
