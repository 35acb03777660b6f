//! Custom Rule Engine: admin-defined additive score deltas evaluated against
//! each record/finding pair, grounded in
//! `original_source/core/rule_engine.py::RuleEngine`/`CustomRule`. Scoped to
//! the condition vocabulary the pipeline actually needs (threat type,
//! severity, path, user-agent, status, method) rather than the original's
//! full time-range/regex condition bag.

use security_common::model::{Finding, Record};

/// One clause of a rule condition: `key=value`, ANDed together.
fn condition_matches(clause: &str, record: &Record, finding: &Finding) -> bool {
    let Some((key, value)) = clause.split_once('=') else {
        return false;
    };
    let key = key.trim();
    let value = value.trim();

    match key {
        "threat_type" => finding.threat_type.as_str() == value,
        "severity" => finding.severity.as_str() == value,
        "path_contains" => record.path.contains(value),
        "user_agent_contains" => record.user_agent.to_lowercase().contains(&value.to_lowercase()),
        "status_code" => record.status.to_string() == value,
        "method" => record.method.eq_ignore_ascii_case(value),
        _ => false,
    }
}

/// A rule's `condition` string is a `&&`-joined list of clauses; every
/// clause must match (original's "AND relationship" across conditions).
fn rule_matches(condition: &str, record: &Record, finding: &Finding) -> bool {
    condition
        .split("&&")
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .all(|clause| condition_matches(clause, record, finding))
}

/// Sum of `score_delta` across every enabled rule whose condition matches.
/// Additive-only: never produces a negative total beyond what the rules
/// themselves specify, and never drives a ban on its own.
pub fn evaluate(rules: &[security_common::model::ScoringRule], record: &Record, finding: &Finding) -> i32 {
    rules
        .iter()
        .filter(|rule| rule.enabled)
        .filter(|rule| rule_matches(&rule.condition, record, finding))
        .map(|rule| rule.score_delta)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use security_common::model::{Severity, ThreatType};

    fn record() -> Record {
        Record {
            timestamp: Utc::now(),
            address: "203.0.113.9".to_string(),
            user_agent: "sqlmap/1.6".to_string(),
            method: "GET".to_string(),
            path: "/admin/login".to_string(),
            query_string: String::new(),
            status: 403,
            response_size: 0,
            referer: String::new(),
            request_duration: None,
            raw_line: String::new(),
            base_hash: None,
            behavior_hash: None,
        }
    }

    fn finding() -> Finding {
        Finding {
            threat_type: ThreatType::SqlInjection,
            severity: Severity::Critical,
            description: "test".to_string(),
            details: Default::default(),
        }
    }

    fn rule(condition: &str, score_delta: i32) -> security_common::model::ScoringRule {
        security_common::model::ScoringRule {
            id: 1,
            name: "test-rule".to_string(),
            condition: condition.to_string(),
            score_delta,
            enabled: true,
        }
    }

    #[test]
    fn single_clause_matches_threat_type() {
        let rules = vec![rule("threat_type=sql_injection", 15)];
        assert_eq!(evaluate(&rules, &record(), &finding()), 15);
    }

    #[test]
    fn all_clauses_must_match() {
        let rules = vec![rule("threat_type=sql_injection && user_agent_contains=curl", 15)];
        assert_eq!(evaluate(&rules, &record(), &finding()), 0);
    }

    #[test]
    fn disabled_rule_contributes_nothing() {
        let mut r = rule("threat_type=sql_injection", 15);
        r.enabled = false;
        assert_eq!(evaluate(&[r], &record(), &finding()), 0);
    }

    #[test]
    fn multiple_matching_rules_sum() {
        let rules = vec![
            rule("threat_type=sql_injection", 10),
            rule("user_agent_contains=sqlmap", 5),
        ];
        assert_eq!(evaluate(&rules, &record(), &finding()), 15);
    }
}
