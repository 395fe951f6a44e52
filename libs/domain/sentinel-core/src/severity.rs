use serde::{Deserialize, Serialize};

/// Asset criticality, assigned by connectors or operators. Distinct from
/// [`Severity`] (which scores a vulnerability, not an asset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

/// Vulnerability severity, derived from `cvss_score` via [`severity_for_cvss`].
/// Declared once here and referenced by value everywhere else (design note:
/// no duplicate runtime-vs-static copies of this enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Maps a CVSS score onto a [`Severity`] per the declared bucket boundaries:
/// `>=9 critical, >=7 high, >=4 medium, >0 low, 0 none`. A missing score has
/// no opinion here; callers decide how to treat `None` (most record it as
/// the score simply being unresolved yet, not as severity `none`).
pub fn severity_for_cvss(cvss_score: Option<f64>) -> Severity {
    match cvss_score {
        Some(score) if score >= 9.0 => Severity::Critical,
        Some(score) if score >= 7.0 => Severity::High,
        Some(score) if score >= 4.0 => Severity::Medium,
        Some(score) if score > 0.0 => Severity::Low,
        Some(_) => Severity::None,
        None => Severity::None,
    }
}

/// `in_kev ∨ epss_score >= 0.5 ∨ cvss_score >= 9.0`. A pure function of
/// already-stored attributes — never itself issues an intel lookup.
pub fn is_actionable_for_remediation(
    in_kev: bool,
    epss_score: Option<f64>,
    cvss_score: Option<f64>,
) -> bool {
    in_kev || epss_score.is_some_and(|s| s >= 0.5) || cvss_score.is_some_and(|s| s >= 9.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bucket_edges() {
        assert_eq!(severity_for_cvss(Some(0.0)), Severity::None);
        assert_eq!(severity_for_cvss(Some(3.9)), Severity::Low);
        assert_eq!(severity_for_cvss(Some(4.0)), Severity::Medium);
        assert_eq!(severity_for_cvss(Some(6.9)), Severity::Medium);
        assert_eq!(severity_for_cvss(Some(7.0)), Severity::High);
        assert_eq!(severity_for_cvss(Some(8.9)), Severity::High);
        assert_eq!(severity_for_cvss(Some(9.0)), Severity::Critical);
        assert_eq!(severity_for_cvss(Some(10.0)), Severity::Critical);
    }

    #[test]
    fn actionability_flips_at_epss_half() {
        assert!(!is_actionable_for_remediation(false, Some(0.49), None));
        assert!(is_actionable_for_remediation(false, Some(0.5), None));
        assert!(is_actionable_for_remediation(false, Some(1.0), None));
    }

    #[test]
    fn actionability_any_single_condition_suffices() {
        assert!(is_actionable_for_remediation(true, None, None));
        assert!(is_actionable_for_remediation(false, None, Some(9.0)));
        assert!(!is_actionable_for_remediation(false, None, Some(8.9)));
    }
}
