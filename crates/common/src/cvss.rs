//! CVSS 3.1-flavored severity enrichment.
//!
//! Not the primary severity model — [`crate::model::Severity`] (plain
//! low/medium/high/critical) drives scoring and ban decisions. This module
//! only decorates a [`crate::model::ThreatEvent`]'s `details` map with a
//! reference CVSS vector and score for operator-facing audit richness.

use crate::model::ThreatType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvssReference {
    pub base_score: f32,
    pub vector_string: String,
    pub explanation: String,
}

impl CvssReference {
    fn new(base_score: f32, vector_string: &str, explanation: &str) -> Self {
        Self {
            base_score,
            vector_string: vector_string.to_string(),
            explanation: explanation.to_string(),
        }
    }
}

/// Reference CVSS vector for each detector finding type. These are fixed
/// lookup values, not live computations against request parameters.
pub fn reference_for(threat_type: ThreatType) -> CvssReference {
    match threat_type {
        ThreatType::SqlInjection => CvssReference::new(
            9.8,
            "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H",
            "Network-accessible SQL injection with no authentication required.",
        ),
        ThreatType::Xss => CvssReference::new(
            6.1,
            "CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:C/C:L/I:L/A:N",
            "Network-accessible cross-site scripting requiring user interaction.",
        ),
        ThreatType::RateLimit => CvssReference::new(
            5.3,
            "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:L",
            "Elevated request volume consistent with automated abuse.",
        ),
        ThreatType::PathScan => CvssReference::new(
            5.3,
            "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:L/I:N/A:N",
            "Sequential 404s consistent with directory/endpoint enumeration.",
        ),
        ThreatType::SensitivePath => CvssReference::new(
            7.5,
            "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N",
            "Access attempt against a path known to hold sensitive configuration.",
        ),
        ThreatType::BadUserAgent => CvssReference::new(
            5.3,
            "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:L/I:N/A:N",
            "Client identifies as a known scanning/exploitation tool.",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_injection_reference_is_critical() {
        let r = reference_for(ThreatType::SqlInjection);
        assert!(r.base_score >= 9.0);
    }
}
