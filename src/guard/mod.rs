//! Login admission control.

mod limiter;
mod login;
mod record;
mod security;

pub use limiter::{Admission, AdmissionGuard, AttemptStatus};
pub use login::{hash_password, CredentialCheck, HashedCredentials, LoginGate, LoginOutcome};
pub use record::{ClientAttemptRecord, GuardPolicy};
pub use security::{SecurityEvent, SecurityLog, Severity, TracingSecurityLog};
