//! Consent record validation, expiry and allowance checks.

use std::collections::HashMap;

use chrono::{DateTime, Months, Utc};
use tracing::debug;

use crate::phone;

use super::types::{ConsentRecord, ConsentSource, ConsentStatus, ConsentType};

/// Months an opt-in stays valid when no explicit expiry is recorded.
pub const DEFAULT_VALIDITY_MONTHS: u32 = 18;

/// Metadata key carrying an explicit RFC 3339 expiry instant.
pub const EXPIRES_AT_KEY: &str = "expires_at";

/// Outcome of validating a consent record.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Fatal problems; the record must not be acted on
    pub errors: Vec<String>,
    /// Non-fatal observations worth surfacing
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// True when no errors were found (warnings do not count).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Validate a consent record's structural and legal invariants.
pub fn validate_record(record: &ConsentRecord) -> ValidationReport {
    let mut report = ValidationReport::default();
    let now = Utc::now();

    if !phone::is_valid_e164(&record.phone_number) {
        report.error("phone number format is invalid");
    }

    // Status/date consistency.
    match record.status {
        ConsentStatus::OptedIn if record.opt_in_date.is_none() => {
            report.error("status opted_in requires an opt-in date");
        }
        ConsentStatus::OptedOut if record.opt_out_date.is_none() => {
            report.error("status opted_out requires an opt-out date");
        }
        ConsentStatus::Pending
            if record.opt_in_date.is_some() || record.opt_out_date.is_some() =>
        {
            report.error("status pending must not carry consent dates");
        }
        _ => {}
    }

    // Date ordering.
    if let (Some(opt_in), Some(opt_out)) = (record.opt_in_date, record.opt_out_date) {
        if opt_out <= opt_in {
            report.error("opt-out date must be strictly after opt-in date");
        }
    }
    if record.opt_in_date.is_some_and(|d| d > now) {
        report.error("opt-in date is in the future");
    }
    if record.opt_out_date.is_some_and(|d| d > now) {
        report.error("opt-out date is in the future");
    }
    if record.updated_at < record.created_at {
        report.error("updated_at precedes created_at");
    }

    // Advisory checks.
    if record.status == ConsentStatus::OptedIn
        && record.consent_type.covers_marketing()
        && record.verification_method.is_none()
    {
        report.warn("opted-in marketing consent has no verification method");
    }
    if record.source == ConsentSource::Unknown {
        report.warn("consent source is unknown");
    }

    report
}

/// Check whether an opt-in has expired.
///
/// An explicit `expires_at` in the metadata wins; otherwise the default
/// validity window applies from the opt-in date. A missing opt-in date is
/// never expired - absent consent is a different failure mode.
pub fn is_expired(
    opt_in_date: Option<DateTime<Utc>>,
    metadata: Option<&HashMap<String, String>>,
) -> bool {
    let Some(opt_in) = opt_in_date else {
        return false;
    };
    let now = Utc::now();

    if let Some(raw) = metadata.and_then(|m| m.get(EXPIRES_AT_KEY)) {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(expires_at) => return expires_at.with_timezone(&Utc) <= now,
            Err(e) => {
                debug!(value = %raw, error = %e, "unparseable consent expiry, using default window");
            }
        }
    }

    match opt_in.checked_add_months(Months::new(DEFAULT_VALIDITY_MONTHS)) {
        Some(deadline) => deadline <= now,
        None => false,
    }
}

/// Check whether a record's state permits a marketing send.
///
/// Uses the date-only expiry form deliberately: callers that track explicit
/// expiry metadata must consult [`is_expired`] with it separately, so this
/// check stays usable before any metadata is loaded.
pub fn allows_marketing(
    status: ConsentStatus,
    consent_type: ConsentType,
    opt_in_date: Option<DateTime<Utc>>,
) -> bool {
    status == ConsentStatus::OptedIn
        && consent_type.covers_marketing()
        && !is_expired(opt_in_date, None)
}

/// Check whether a record's state permits a transactional send.
///
/// No expiry check: transactional messages are not marketing-consent-gated
/// under the governing legal basis.
pub fn allows_transactional(status: ConsentStatus, consent_type: ConsentType) -> bool {
    status == ConsentStatus::OptedIn && consent_type.covers_transactional()
}
