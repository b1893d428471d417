use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// An expected postcondition did not hold
    Assertion,
    /// A polled operation did not reach a terminal state in time
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub check: String,
    pub detail: String,
}

/// A resource teardown could not release. Never changes the scenario's
/// pass/fail outcome, but may leave billable resources behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub resource: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub passed_checks: Vec<String>,
    pub failures: Vec<Failure>,
    pub cleanup: Vec<CleanupFailure>,
}

impl ScenarioReport {
    pub fn new(scenario: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            passed_checks: Vec::new(),
            failures: Vec::new(),
            cleanup: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn pass(&mut self, check: &str) {
        debug!("{}: ok - {}", self.scenario, check);
        self.passed_checks.push(check.to_string());
    }

    pub fn fail(&mut self, check: &str, detail: String) {
        warn!("{}: FAILED - {}: {}", self.scenario, check, detail);
        self.failures.push(Failure {
            kind: FailureKind::Assertion,
            check: check.to_string(),
            detail,
        });
    }

    pub fn timeout(&mut self, check: &str, detail: String) {
        warn!("{}: TIMED OUT - {}: {}", self.scenario, check, detail);
        self.failures.push(Failure {
            kind: FailureKind::Timeout,
            check: check.to_string(),
            detail,
        });
    }

    /// Records `check` as passed if `ok`, otherwise as failed with the
    /// lazily built `detail`. Returns `ok`.
    pub fn check(&mut self, check: &str, ok: bool, detail: impl FnOnce() -> String) -> bool {
        if ok {
            self.pass(check);
        } else {
            self.fail(check, detail());
        }
        ok
    }

    pub fn check_eq<T: PartialEq + Debug + ?Sized>(&mut self, check: &str, actual: &T, expected: &T) -> bool {
        self.check(check, actual == expected, || {
            format!("expected {:?}, got {:?}", expected, actual)
        })
    }

    /// Byte comparison that reports length, CRC32 and first differing offset
    /// instead of dumping both buffers
    pub fn check_bytes(&mut self, check: &str, actual: &[u8], expected: &[u8]) -> bool {
        self.check(check, actual == expected, || {
            let first_diff = actual
                .iter()
                .zip(expected.iter())
                .position(|(a, e)| a != e)
                .unwrap_or_else(|| actual.len().min(expected.len()));
            format!(
                "expected {} bytes (crc32 {:08x}), got {} bytes (crc32 {:08x}), first difference at offset {}",
                expected.len(),
                crc32fast::hash(expected),
                actual.len(),
                crc32fast::hash(actual),
                first_diff
            )
        })
    }

    pub fn cleanup_failed(&mut self, resource: String, error: String) {
        self.cleanup.push(CleanupFailure { resource, error });
    }

    /// One-line description of the failures, or of the passed checks
    pub fn summary(&self) -> String {
        let mut summary = if self.passed() {
            format!("{} check(s) passed", self.passed_checks.len())
        } else {
            self.failures
                .iter()
                .map(|failure| match failure.kind {
                    FailureKind::Assertion => format!("{}: {}", failure.check, failure.detail),
                    FailureKind::Timeout => format!("{} (timeout): {}", failure.check, failure.detail),
                })
                .collect::<Vec<_>>()
                .join("; ")
        };
        summary.push_str(&self.cleanup_note());
        summary
    }

    /// ` [cleanup failed for ...]`, or empty when teardown released everything
    pub fn cleanup_note(&self) -> String {
        if self.cleanup.is_empty() {
            return String::new();
        }
        let leaked: Vec<&str> = self.cleanup.iter().map(|c| c.resource.as_str()).collect();
        format!(" [cleanup failed for {}]", leaked.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checks_accumulate() {
        let mut report = ScenarioReport::new("demo");
        assert!(report.check_eq("acl", &"container", &"container"));
        assert!(!report.check_eq("metadata", &1, &2));
        report.timeout("copy", "still pending".into());

        assert!(!report.passed());
        assert_eq!(report.passed_checks, vec!["acl"]);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[1].kind, FailureKind::Timeout);
        assert_eq!(
            report.summary(),
            "metadata: expected 2, got 1; copy (timeout): still pending"
        );
    }

    #[test]
    fn test_check_bytes_reports_first_difference() {
        let mut report = ScenarioReport::new("demo");
        assert!(!report.check_bytes("content", b"hellO", b"hello"));
        let detail = &report.failures[0].detail;
        assert!(detail.contains("first difference at offset 4"), "{detail}");
        assert!(detail.contains(&format!("{:08x}", crc32fast::hash(b"hello"))));
    }

    #[test]
    fn test_cleanup_does_not_change_outcome() {
        let mut report = ScenarioReport::new("demo");
        report.pass("created");
        report.cleanup_failed("container blobcontainerabcdefgh".into(), "timeout".into());

        assert!(report.passed());
        assert_eq!(
            report.summary(),
            "1 check(s) passed [cleanup failed for container blobcontainerabcdefgh]"
        );
    }
}
