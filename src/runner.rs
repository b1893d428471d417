/// ScenarioRunner: runs scenarios one after another and collects a RunReport
///
/// Scenarios run strictly in sequence because several of them mutate the
/// account-wide service properties. A scenario that errors is recorded and
/// the run moves on to the next one.

use serde::Serialize;
use std::fmt;
use std::process::ExitCode;
use tracing::{info, warn};

use crate::gateway::StorageGateway;
use crate::names::NameGenerator;
use crate::scenario::{LifecycleScenario, ScenarioReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Every check held
    Passed,
    /// The scenario ran to completion but some checks failed or timed out
    Failed,
    /// The scenario was aborted by a gateway error
    Errored,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunEntry {
    pub scenario: String,
    pub outcome: Outcome,
    pub detail: String,
    /// For an errored scenario, the checks made before the error and the
    /// teardown result
    pub report: Option<ScenarioReport>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub entries: Vec<RunEntry>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|entry| entry.outcome == Outcome::Passed)
    }

    pub fn failed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome != Outcome::Passed)
            .count()
    }

    /// Resources teardown could not release, across all scenarios
    pub fn cleanup_failures(&self) -> usize {
        self.entries
            .iter()
            .filter_map(|entry| entry.report.as_ref())
            .map(|report| report.cleanup.len())
            .sum()
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            let mark = match entry.outcome {
                Outcome::Passed => "✓",
                Outcome::Failed | Outcome::Errored => "✗",
            };
            writeln!(f, "  {} {:<36} {}", mark, entry.scenario, entry.detail)?;
        }
        write!(
            f,
            "{} scenario(s), {} passed, {} failed",
            self.entries.len(),
            self.entries.len() - self.failed_count(),
            self.failed_count()
        )
    }
}

pub struct ScenarioRunner {
    names: NameGenerator,
}

impl ScenarioRunner {
    pub fn new() -> Self {
        Self::with_names(NameGenerator::new())
    }

    pub fn with_names(names: NameGenerator) -> Self {
        Self { names }
    }

    pub async fn run_all(
        &self,
        scenarios: &[Box<dyn LifecycleScenario>],
        gateway: &dyn StorageGateway,
    ) -> RunReport {
        let mut run = RunReport::default();

        for scenario in scenarios {
            let entry = match scenario.run(gateway, &self.names).await {
                Ok(report) => RunEntry {
                    scenario: scenario.name().to_string(),
                    outcome: if report.passed() {
                        Outcome::Passed
                    } else {
                        Outcome::Failed
                    },
                    detail: report.summary(),
                    report: Some(report),
                },
                Err(aborted) => {
                    warn!("Scenario {} errored, continuing with the next one", scenario.name());
                    RunEntry {
                        scenario: scenario.name().to_string(),
                        outcome: Outcome::Errored,
                        detail: format!("{}{}", aborted.error, aborted.report.cleanup_note()),
                        report: Some(aborted.report),
                    }
                }
            };
            run.entries.push(entry);
        }

        info!(
            "Run finished: {} of {} scenario(s) passed",
            run.entries.len() - run.failed_count(),
            run.entries.len()
        );
        run
    }
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::{AccessLevel, MockStorageGateway};
    use crate::scenario::{ContainerAccessControl, CorsRulesRoundTrip};

    fn scenarios() -> Vec<Box<dyn LifecycleScenario>> {
        vec![Box::new(ContainerAccessControl), Box::new(CorsRulesRoundTrip)]
    }

    #[tokio::test]
    async fn test_errored_scenario_does_not_stop_the_run() {
        let mut gateway = MockStorageGateway::new();
        gateway
            .expect_create_container()
            .times(1)
            .returning(|_| Err(GatewayError::Transport("connection refused".into())));
        gateway
            .expect_get_service_properties()
            .returning(|| Ok(Default::default()));
        gateway
            .expect_set_service_properties()
            .times(2)
            .returning(|_| Ok(()));

        let run = ScenarioRunner::with_names(NameGenerator::seeded(1))
            .run_all(&scenarios(), &gateway)
            .await;

        assert_eq!(run.entries.len(), 2);
        assert_eq!(run.entries[0].outcome, Outcome::Errored);
        assert_eq!(
            run.entries[0].detail,
            "create container failed: Transport error: connection refused"
        );
        assert_eq!(run.entries[1].outcome, Outcome::Failed);
        assert!(!run.is_success());
        assert_eq!(run.failed_count(), 2);
    }

    #[tokio::test]
    async fn test_wrong_acl_is_a_failure_and_container_is_deleted() {
        let mut gateway = MockStorageGateway::new();
        gateway.expect_create_container().times(1).returning(|_| Ok(()));
        gateway.expect_set_container_acl().times(3).returning(|_, _| Ok(()));
        gateway
            .expect_get_container_acl()
            .times(3)
            .returning(|_| Ok(AccessLevel::Private));
        gateway.expect_delete_container().times(1).returning(|_| Ok(()));

        let scenarios: Vec<Box<dyn LifecycleScenario>> = vec![Box::new(ContainerAccessControl)];
        let run = ScenarioRunner::with_names(NameGenerator::seeded(2))
            .run_all(&scenarios, &gateway)
            .await;

        let entry = &run.entries[0];
        assert_eq!(entry.outcome, Outcome::Failed);
        let report = entry.report.as_ref().unwrap();
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.passed_checks, vec!["access level private reads back"]);
        assert_eq!(run.cleanup_failures(), 0);
    }

    #[tokio::test]
    async fn test_errored_scenario_keeps_partial_report_and_cleanup_failures() {
        let mut gateway = MockStorageGateway::new();
        gateway.expect_create_container().times(1).returning(|_| Ok(()));
        gateway.expect_set_container_acl().times(2).returning(|_, _| Ok(()));
        let mut reads = 0;
        gateway.expect_get_container_acl().times(2).returning(move |_| {
            reads += 1;
            if reads == 1 {
                Ok(AccessLevel::Container)
            } else {
                Err(GatewayError::Transport("timeout".into()))
            }
        });
        gateway
            .expect_delete_container()
            .times(1)
            .returning(|_| Err(GatewayError::Transport("connection reset".into())));

        let scenarios: Vec<Box<dyn LifecycleScenario>> = vec![Box::new(ContainerAccessControl)];
        let run = ScenarioRunner::with_names(NameGenerator::seeded(3))
            .run_all(&scenarios, &gateway)
            .await;

        let entry = &run.entries[0];
        assert_eq!(entry.outcome, Outcome::Errored);
        assert!(
            entry
                .detail
                .starts_with("get container acl failed: Transport error: timeout [cleanup failed for container blobcontainer"),
            "{}",
            entry.detail
        );
        let report = entry.report.as_ref().unwrap();
        assert_eq!(report.passed_checks, vec!["access level container reads back"]);
        assert_eq!(report.cleanup.len(), 1);
        assert_eq!(run.cleanup_failures(), 1);
    }

    #[test]
    fn test_display_and_json() {
        let mut passed = ScenarioReport::new("container_acl");
        passed.pass("access level container reads back");
        let run = RunReport {
            entries: vec![
                RunEntry {
                    scenario: "container_acl".into(),
                    outcome: Outcome::Passed,
                    detail: passed.summary(),
                    report: Some(passed),
                },
                RunEntry {
                    scenario: "blob_copy".into(),
                    outcome: Outcome::Errored,
                    detail: "start copy failed: Transport error: reset".into(),
                    report: None,
                },
            ],
        };

        let text = run.to_string();
        assert!(text.contains("✓ container_acl"));
        assert!(text.contains("✗ blob_copy"));
        assert!(text.ends_with("2 scenario(s), 1 passed, 1 failed"));
        assert!(!run.is_success());

        let json: serde_json::Value = serde_json::from_str(&run.to_json().unwrap()).unwrap();
        assert_eq!(json["entries"][0]["outcome"], "passed");
        assert_eq!(json["entries"][1]["report"], serde_json::Value::Null);
    }
}
