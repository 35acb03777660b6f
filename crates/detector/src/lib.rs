//! Threat detector: six pattern/rate detectors run per [`Record`], grounded
//! in `original_source/core/threat_detector.py` and
//! `crates/common/src/parsers/apache.rs::ApacheLog::analyze`
//! ("check these regex/substring families in priority order").
//!
//! Per-address sliding windows are bounded `VecDeque`s, exactly as the
//! original uses `collections.deque(maxlen=...)`. This type is not
//! `Sync`-shared: work is sharded by address to one worker, so a single
//! `&mut Detector` per worker needs no internal locking.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use regex::Regex;

use security_common::config::DetectorConfig;
use security_common::model::{Finding, Record, Severity, ThreatType};

/// A regex that failed to compile at startup is logged and skipped, never
/// fatal. Compilation happens once; invalid expressions are dropped rather
/// than aborting the process.
fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!(pattern = %p, error = %err, "skipping invalid detector pattern");
                None
            }
        })
        .collect()
}

pub struct Detector {
    cfg: DetectorConfig,
    sql_patterns: Vec<Regex>,
    xss_patterns: Vec<Regex>,
    bad_ua_patterns: Vec<Regex>,
    request_windows: HashMap<String, VecDeque<DateTime<Utc>>>,
    status_404_windows: HashMap<String, VecDeque<DateTime<Utc>>>,
}

impl Detector {
    pub fn new(cfg: DetectorConfig) -> Self {
        let sql_patterns = compile_patterns(&cfg.sql_injection_patterns);
        let xss_patterns = compile_patterns(&cfg.xss_patterns);
        let bad_ua_patterns = compile_patterns(&cfg.bad_user_agent_patterns);
        Self {
            cfg,
            sql_patterns,
            xss_patterns,
            bad_ua_patterns,
            request_windows: HashMap::new(),
            status_404_windows: HashMap::new(),
        }
    }

    /// Hot-reload the compiled rule sets from a fresh config. Regex lists
    /// and window parameters can be updated without restarting the
    /// process; sliding windows already in flight are left untouched.
    pub fn reload_patterns(&mut self, cfg: DetectorConfig) {
        self.sql_patterns = compile_patterns(&cfg.sql_injection_patterns);
        self.xss_patterns = compile_patterns(&cfg.xss_patterns);
        self.bad_ua_patterns = compile_patterns(&cfg.bad_user_agent_patterns);
        self.cfg = cfg;
    }

    /// Run all six detectors in §4.5 table order on `record`, returning
    /// every finding (zero or more).
    pub fn detect(&mut self, record: &Record) -> Vec<Finding> {
        let mut findings = Vec::new();
        if let Some(f) = self.check_rate_limit(record) {
            findings.push(f);
        }
        if let Some(f) = self.check_path_scan(record) {
            findings.push(f);
        }
        if let Some(f) = self.check_sql_injection(record) {
            findings.push(f);
        }
        if let Some(f) = self.check_xss(record) {
            findings.push(f);
        }
        if let Some(f) = self.check_sensitive_path(record) {
            findings.push(f);
        }
        if let Some(f) = self.check_bad_user_agent(record) {
            findings.push(f);
        }
        findings
    }

    fn check_rate_limit(&mut self, record: &Record) -> Option<Finding> {
        let window = self
            .request_windows
            .entry(record.address.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.cfg.request_window_capacity));
        push_bounded(window, record.timestamp, self.cfg.request_window_capacity);

        let cutoff = record.timestamp - chrono::Duration::seconds(self.cfg.rate_limit_window_seconds);
        let recent = window.iter().filter(|t| **t >= cutoff).count();

        if recent as u32 > self.cfg.rate_limit_max_requests {
            let mut details = HashMap::new();
            details.insert("request_count".to_string(), recent.into());
            details.insert(
                "window_seconds".to_string(),
                self.cfg.rate_limit_window_seconds.into(),
            );
            details.insert(
                "max_allowed".to_string(),
                self.cfg.rate_limit_max_requests.into(),
            );
            return Some(Finding {
                threat_type: ThreatType::RateLimit,
                severity: Severity::High,
                description: format!(
                    "request rate exceeded: {recent} requests in {}s",
                    self.cfg.rate_limit_window_seconds
                ),
                details,
            });
        }
        None
    }

    fn check_path_scan(&mut self, record: &Record) -> Option<Finding> {
        if record.status != 404 {
            return None;
        }
        let window = self
            .status_404_windows
            .entry(record.address.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.cfg.status_404_window_capacity));
        push_bounded(window, record.timestamp, self.cfg.status_404_window_capacity);

        let cutoff = record.timestamp - chrono::Duration::seconds(self.cfg.path_scan_window_seconds);
        let recent = window.iter().filter(|t| **t >= cutoff).count();

        if recent as u32 > self.cfg.path_scan_max_404s {
            let mut details = HashMap::new();
            details.insert("404_count".to_string(), recent.into());
            details.insert(
                "window_seconds".to_string(),
                self.cfg.path_scan_window_seconds.into(),
            );
            details.insert(
                "max_allowed".to_string(),
                self.cfg.path_scan_max_404s.into(),
            );
            return Some(Finding {
                threat_type: ThreatType::PathScan,
                severity: Severity::High,
                description: format!("suspected path scan: {recent} 404s"),
                details,
            });
        }
        None
    }

    fn check_sql_injection(&self, record: &Record) -> Option<Finding> {
        first_regex_match(&self.sql_patterns, &record.path, &record.query_string).map(
            |(pattern, matched_in)| {
                let mut details = HashMap::new();
                details.insert("matched_pattern".to_string(), pattern.into());
                details.insert("request_path".to_string(), record.path.clone().into());
                details.insert("matched_in".to_string(), matched_in.into());
                Finding {
                    threat_type: ThreatType::SqlInjection,
                    severity: Severity::Critical,
                    description: "SQL injection signature matched".to_string(),
                    details,
                }
            },
        )
    }

    fn check_xss(&self, record: &Record) -> Option<Finding> {
        first_regex_match(&self.xss_patterns, &record.path, &record.query_string).map(
            |(pattern, matched_in)| {
                let mut details = HashMap::new();
                details.insert("matched_pattern".to_string(), pattern.into());
                details.insert("request_path".to_string(), record.path.clone().into());
                details.insert("matched_in".to_string(), matched_in.into());
                Finding {
                    threat_type: ThreatType::Xss,
                    severity: Severity::High,
                    description: "XSS signature matched".to_string(),
                    details,
                }
            },
        )
    }

    fn check_sensitive_path(&self, record: &Record) -> Option<Finding> {
        self.cfg
            .sensitive_paths
            .iter()
            .find(|sensitive| record.path.contains(sensitive.as_str()))
            .map(|sensitive| {
                let mut details = HashMap::new();
                details.insert("sensitive_path".to_string(), sensitive.clone().into());
                details.insert("full_path".to_string(), record.path.clone().into());
                Finding {
                    threat_type: ThreatType::SensitivePath,
                    severity: Severity::Medium,
                    description: format!("access to sensitive path: {sensitive}"),
                    details,
                }
            })
    }

    fn check_bad_user_agent(&self, record: &Record) -> Option<Finding> {
        let ua_lower = record.user_agent.to_lowercase();
        self.bad_ua_patterns
            .iter()
            .find(|re| re.is_match(&ua_lower))
            .map(|re| {
                let mut details = HashMap::new();
                details.insert("matched_pattern".to_string(), re.as_str().into());
                details.insert("user_agent".to_string(), ua_lower.clone().into());
                Finding {
                    threat_type: ThreatType::BadUserAgent,
                    severity: Severity::Medium,
                    description: "known scanning/exploitation tool user-agent".to_string(),
                    details,
                }
            })
    }
}

fn push_bounded(window: &mut VecDeque<DateTime<Utc>>, value: DateTime<Utc>, cap: usize) {
    window.push_back(value);
    while window.len() > cap {
        window.pop_front();
    }
}

/// First matching pattern wins, checked against path then query string.
fn first_regex_match<'a>(
    patterns: &'a [Regex],
    path: &str,
    query_string: &str,
) -> Option<(&'a str, String)> {
    for candidate in [path, query_string] {
        for pattern in patterns {
            if pattern.is_match(candidate) {
                return Some((pattern.as_str(), candidate.chars().take(200).collect()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_record(address: &str, status: u16, path: &str) -> Record {
        Record {
            timestamp: Utc::now(),
            address: address.to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            method: "GET".to_string(),
            path: path.to_string(),
            query_string: String::new(),
            status,
            response_size: 0,
            referer: String::new(),
            request_duration: None,
            raw_line: String::new(),
            base_hash: None,
            behavior_hash: None,
        }
    }

    #[test]
    fn scenario_1_rate_limit_boundary() {
        let mut detector = Detector::new(DetectorConfig::default());
        let mut findings_at_100 = Vec::new();
        let mut findings_at_101 = Vec::new();
        let start = Utc::now();
        for i in 0..101u32 {
            let mut record = base_record("203.0.113.10", 200, "/");
            record.timestamp = start + Duration::milliseconds(i as i64);
            let found = detector.detect(&record);
            if i == 99 {
                findings_at_100 = found;
            } else if i == 100 {
                findings_at_101 = found;
            }
        }
        assert!(findings_at_100.is_empty(), "request 100 must not trip rate limit");
        assert_eq!(findings_at_101.len(), 1, "request 101 must trip exactly one finding");
        assert_eq!(findings_at_101[0].threat_type, ThreatType::RateLimit);
        assert_eq!(findings_at_101[0].severity, Severity::High);
    }

    #[test]
    fn scenario_2_path_scan_boundary() {
        let mut detector = Detector::new(DetectorConfig::default());
        let start = Utc::now();
        let mut last_findings = Vec::new();
        for i in 0..21u32 {
            let mut record = base_record("198.51.100.20", 404, "/admin");
            record.timestamp = start + Duration::seconds(i as i64);
            last_findings = detector.detect(&record);
        }
        assert_eq!(last_findings.len(), 1);
        assert_eq!(last_findings[0].threat_type, ThreatType::PathScan);
    }

    #[test]
    fn sql_injection_detected_case_insensitively() {
        let mut detector = Detector::new(DetectorConfig::default());
        let mut record = base_record("203.0.113.10", 200, "/search");
        record.query_string = "id=1 UNION SELECT password FROM users".to_string();
        let findings = detector.detect(&record);
        assert!(findings.iter().any(|f| f.threat_type == ThreatType::SqlInjection));
    }

    #[test]
    fn sensitive_path_matches_substring() {
        let mut detector = Detector::new(DetectorConfig::default());
        let record = base_record("203.0.113.10", 200, "/.env");
        let findings = detector.detect(&record);
        assert!(findings.iter().any(|f| f.threat_type == ThreatType::SensitivePath));
    }

    #[test]
    fn bad_user_agent_matches_lowercased() {
        let mut detector = Detector::new(DetectorConfig::default());
        let mut record = base_record("203.0.113.10", 200, "/");
        record.user_agent = "sqlmap/1.7.2".to_string();
        let findings = detector.detect(&record);
        assert!(findings.iter().any(|f| f.threat_type == ThreatType::BadUserAgent));
    }

    #[test]
    fn invalid_pattern_is_skipped_not_fatal() {
        let mut cfg = DetectorConfig::default();
        cfg.sql_injection_patterns = vec!["(unterminated".to_string()];
        let mut detector = Detector::new(cfg);
        let record = base_record("203.0.113.10", 200, "/");
        // Must not panic; with no valid patterns nothing ever matches.
        assert!(detector.check_sql_injection(&record).is_none());
    }
}
