//! Consent records and the opt-in/opt-out state machine.
//!
//! A [`ConsentRecord`] is a legal document: it is never deleted, every
//! accepted transition bumps its version by exactly one and appends exactly
//! one audit entry. Concurrent writers are expected to guard on the version
//! field upstream; this module only guarantees the per-record invariants.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consent state for a (phone number, consent type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    /// No consent event recorded yet (initial state only)
    Unknown,
    /// Opt-in initiated, not yet confirmed
    Pending,
    /// Active consent
    OptedIn,
    /// Consent withdrawn
    OptedOut,
}

impl ConsentStatus {
    /// Every status, for totality checks.
    pub const ALL: [ConsentStatus; 4] = [
        ConsentStatus::Unknown,
        ConsentStatus::Pending,
        ConsentStatus::OptedIn,
        ConsentStatus::OptedOut,
    ];

    /// Get the string name of this status.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::OptedIn => "opted_in",
            Self::OptedOut => "opted_out",
        }
    }

    /// Allowed destination statuses. `Unknown` is initial-only: no status
    /// leads back to it, and no status leads to itself.
    pub fn valid_destinations(&self) -> &'static [ConsentStatus] {
        match self {
            Self::Unknown => &[
                ConsentStatus::Pending,
                ConsentStatus::OptedIn,
                ConsentStatus::OptedOut,
            ],
            Self::Pending => &[ConsentStatus::OptedIn, ConsentStatus::OptedOut],
            Self::OptedIn => &[ConsentStatus::OptedOut],
            Self::OptedOut => &[ConsentStatus::OptedIn],
        }
    }

    /// Check whether a transition to `to` is allowed.
    pub fn can_transition_to(&self, to: ConsentStatus) -> bool {
        self.valid_destinations().contains(&to)
    }
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the consent covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentType {
    Marketing,
    Transactional,
    Informational,
    All,
}

impl ConsentType {
    /// Get the string name of this type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Marketing => "marketing",
            Self::Transactional => "transactional",
            Self::Informational => "informational",
            Self::All => "all",
        }
    }

    /// True when this type covers marketing sends.
    pub fn covers_marketing(&self) -> bool {
        matches!(self, Self::Marketing | Self::All)
    }

    /// True when this type covers transactional sends.
    pub fn covers_transactional(&self) -> bool {
        matches!(self, Self::Transactional | Self::All)
    }
}

/// Channel through which the consent event was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentSource {
    WebForm,
    Sms,
    Api,
    Import,
    Support,
    Unknown,
}

impl ConsentSource {
    /// Get the string name of this source.
    pub fn name(&self) -> &'static str {
        match self {
            Self::WebForm => "web_form",
            Self::Sms => "sms",
            Self::Api => "api",
            Self::Import => "import",
            Self::Support => "support",
            Self::Unknown => "unknown",
        }
    }
}

/// How the opt-in was verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    DoubleOptIn,
    SingleOptIn,
    Written,
    Verbal,
}

/// Legal basis for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalBasis {
    Consent,
    LegitimateInterest,
    Contract,
    LegalObligation,
}

/// One entry in the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// What happened, e.g. "opted_in"
    pub action: String,
    /// Channel that triggered it
    pub source: ConsentSource,
    /// Free-form context (campaign id, keyword, agent note)
    pub context: Option<String>,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Create an audit entry stamped with the current time.
    pub fn new(
        action: impl Into<String>,
        source: ConsentSource,
        context: Option<String>,
    ) -> Self {
        Self {
            action: action.into(),
            source,
            context,
            timestamp: Utc::now(),
        }
    }
}

/// Rejected consent transition.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid consent transition: {from} -> {to}")]
pub struct InvalidConsentTransition {
    pub from: ConsentStatus,
    pub to: ConsentStatus,
}

/// Per (phone number, consent type) legal permission state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// E.164 phone number
    pub phone_number: String,
    /// Current consent state
    pub status: ConsentStatus,
    /// Channel of the most recent consent event
    pub source: ConsentSource,
    /// What the consent covers
    pub consent_type: ConsentType,
    /// How the opt-in was verified, when it was
    pub verification_method: Option<VerificationMethod>,
    /// Legal basis for processing
    pub legal_basis: LegalBasis,
    /// When the subject opted in
    pub opt_in_date: Option<DateTime<Utc>>,
    /// When the subject opted out
    pub opt_out_date: Option<DateTime<Utc>>,
    /// Monotonic version, +1 per accepted transition
    pub version: u64,
    /// Append-only history of consent events
    pub audit_trail: Vec<AuditEntry>,
    /// Free-form key/value metadata (may carry an explicit expiry)
    pub metadata: HashMap<String, String>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record was last updated
    pub updated_at: DateTime<Utc>,
}

impl ConsentRecord {
    /// Create a fresh record in `Unknown`, as written on first contact.
    pub fn new(
        phone_number: impl Into<String>,
        consent_type: ConsentType,
        source: ConsentSource,
    ) -> Self {
        let now = Utc::now();
        Self {
            phone_number: phone_number.into(),
            status: ConsentStatus::Unknown,
            source,
            consent_type,
            verification_method: None,
            legal_basis: LegalBasis::Consent,
            opt_in_date: None,
            opt_out_date: None,
            version: 1,
            audit_trail: vec![AuditEntry::new("created", source, None)],
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the verification method.
    pub fn with_verification(mut self, method: VerificationMethod) -> Self {
        self.verification_method = Some(method);
        self
    }

    /// Set the legal basis.
    pub fn with_legal_basis(mut self, basis: LegalBasis) -> Self {
        self.legal_basis = basis;
        self
    }

    /// Apply a validated status transition.
    ///
    /// Maintains the date fields for the new status, bumps the version by
    /// exactly one and appends exactly one audit entry:
    ///
    /// - to `OptedIn`: stamps `opt_in_date`, clears `opt_out_date` (a
    ///   re-opt-in starts a fresh consent period)
    /// - to `OptedOut`: stamps `opt_out_date`, keeps `opt_in_date`
    /// - to `Pending`: clears both dates
    pub fn apply_transition(
        &mut self,
        to: ConsentStatus,
        source: ConsentSource,
        context: Option<String>,
    ) -> Result<(), InvalidConsentTransition> {
        if !self.status.can_transition_to(to) {
            return Err(InvalidConsentTransition {
                from: self.status,
                to,
            });
        }

        let now = Utc::now();
        match to {
            ConsentStatus::OptedIn => {
                self.opt_in_date = Some(now);
                self.opt_out_date = None;
            }
            ConsentStatus::OptedOut => {
                self.opt_out_date = Some(now);
            }
            ConsentStatus::Pending => {
                self.opt_in_date = None;
                self.opt_out_date = None;
            }
            ConsentStatus::Unknown => unreachable!("no transition leads to unknown"),
        }

        self.status = to;
        self.source = source;
        self.version += 1;
        self.updated_at = now;
        self.audit_trail
            .push(AuditEntry::new(to.name(), source, context));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_self_transitions() {
        for status in ConsentStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_unknown_is_initial_only() {
        for status in ConsentStatus::ALL {
            assert!(!status.can_transition_to(ConsentStatus::Unknown));
        }
    }

    #[test]
    fn test_transition_table() {
        assert!(ConsentStatus::Unknown.can_transition_to(ConsentStatus::Pending));
        assert!(ConsentStatus::Unknown.can_transition_to(ConsentStatus::OptedIn));
        assert!(ConsentStatus::Unknown.can_transition_to(ConsentStatus::OptedOut));
        assert!(ConsentStatus::Pending.can_transition_to(ConsentStatus::OptedIn));
        assert!(ConsentStatus::Pending.can_transition_to(ConsentStatus::OptedOut));
        assert!(ConsentStatus::OptedIn.can_transition_to(ConsentStatus::OptedOut));
        assert!(ConsentStatus::OptedOut.can_transition_to(ConsentStatus::OptedIn));

        assert!(!ConsentStatus::OptedIn.can_transition_to(ConsentStatus::Pending));
        assert!(!ConsentStatus::OptedOut.can_transition_to(ConsentStatus::Pending));
    }

    #[test]
    fn test_transition_bumps_version_and_audits() {
        let mut record =
            ConsentRecord::new("+14155552671", ConsentType::Marketing, ConsentSource::WebForm);
        assert_eq!(record.version, 1);
        assert_eq!(record.audit_trail.len(), 1);

        record
            .apply_transition(ConsentStatus::Pending, ConsentSource::WebForm, None)
            .unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.audit_trail.len(), 2);
        assert_eq!(record.audit_trail.last().unwrap().action, "pending");

        record
            .apply_transition(
                ConsentStatus::OptedIn,
                ConsentSource::Sms,
                Some("keyword JOIN".to_string()),
            )
            .unwrap();
        assert_eq!(record.version, 3);
        assert_eq!(record.audit_trail.len(), 3);
    }

    #[test]
    fn test_opt_in_then_out_keeps_date_order() {
        let mut record =
            ConsentRecord::new("+14155552671", ConsentType::All, ConsentSource::Api);
        record
            .apply_transition(ConsentStatus::OptedIn, ConsentSource::Api, None)
            .unwrap();
        record
            .apply_transition(ConsentStatus::OptedOut, ConsentSource::Sms, None)
            .unwrap();

        let opt_in = record.opt_in_date.unwrap();
        let opt_out = record.opt_out_date.unwrap();
        assert!(opt_out > opt_in);
    }

    #[test]
    fn test_re_opt_in_clears_opt_out() {
        let mut record =
            ConsentRecord::new("+14155552671", ConsentType::Marketing, ConsentSource::Sms);
        record
            .apply_transition(ConsentStatus::OptedOut, ConsentSource::Sms, None)
            .unwrap();
        record
            .apply_transition(ConsentStatus::OptedIn, ConsentSource::Sms, None)
            .unwrap();

        assert!(record.opt_in_date.is_some());
        assert!(record.opt_out_date.is_none());
        assert_eq!(record.version, 3);
    }

    #[test]
    fn test_rejected_transition_leaves_record_untouched() {
        let mut record =
            ConsentRecord::new("+14155552671", ConsentType::Marketing, ConsentSource::Sms);
        record
            .apply_transition(ConsentStatus::OptedIn, ConsentSource::Sms, None)
            .unwrap();

        let err = record
            .apply_transition(ConsentStatus::Pending, ConsentSource::Api, None)
            .unwrap_err();
        assert_eq!(err.from, ConsentStatus::OptedIn);
        assert_eq!(record.version, 2);
        assert_eq!(record.audit_trail.len(), 2);
    }
}
