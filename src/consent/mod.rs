//! Consent (opt-in/opt-out) engine.
//!
//! Pure logic deciding whether a message may legally be sent: the consent
//! state machine with its audit trail, record validation, and time-based
//! expiry. Storage of the records belongs to the embedding service.

mod types;
mod validate;

pub use types::{
    AuditEntry, ConsentRecord, ConsentSource, ConsentStatus, ConsentType,
    InvalidConsentTransition, LegalBasis, VerificationMethod,
};
pub use validate::{
    allows_marketing, allows_transactional, is_expired, validate_record, ValidationReport,
    DEFAULT_VALIDITY_MONTHS, EXPIRES_AT_KEY,
};
