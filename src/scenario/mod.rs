/// Lifecycle scenarios
///
/// A scenario is one self-contained exercised behaviour: it names its own
/// resources, drives the gateway, checks postconditions and releases what it
/// acquired. Checks that fail are recorded in the `ScenarioReport`; only a
/// gateway failure the scenario cannot work around escapes, as a
/// `ScenarioAborted` that still carries the report. Teardown runs in both
/// cases.

pub mod blobs;
pub mod containers;
pub mod report;
pub mod scope;
pub mod service;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::{error, info};

use crate::error::{GatewayError, ScenarioError, StepExt};
use crate::gateway::{ServiceProperties, StorageGateway};
use crate::names::NameGenerator;

pub use blobs::{AppendBlobRoundTrip, BlobCopy, BlobPropertiesAndMetadata, BlockBlobRoundTrip, PageBlobRangeWrite, SnapshotRoundTrip};
pub use containers::{ContainerAccessControl, ContainerListing, ContainerMetadataAndProperties};
pub use report::{CleanupFailure, Failure, FailureKind, ScenarioReport};
pub use scope::ResourceScope;
pub use service::{CorsRulesRoundTrip, ServicePropertiesRoundTrip};

/// Tunables shared by the scenarios
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioSettings {
    /// Upper bound for a staged block
    pub block_size: usize,
    pub copy_poll_interval: Duration,
    /// A copy still pending after this long is aborted and reported
    pub copy_timeout: Duration,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            block_size: 1024,
            copy_poll_interval: Duration::from_secs(1),
            copy_timeout: Duration::from_secs(30),
        }
    }
}

/// What a scenario works with while it runs
pub struct ScenarioContext<'a> {
    pub gateway: &'a dyn StorageGateway,
    pub names: &'a NameGenerator,
    pub report: ScenarioReport,
    scope: ResourceScope,
}

impl<'a> ScenarioContext<'a> {
    pub fn new(scenario: &str, gateway: &'a dyn StorageGateway, names: &'a NameGenerator) -> Self {
        Self {
            gateway,
            names,
            report: ScenarioReport::new(scenario),
            scope: ResourceScope::new(),
        }
    }

    /// Creates a container named `prefix` + random suffix and registers it
    /// for teardown
    pub async fn create_container(&mut self, prefix: &str) -> Result<String, ScenarioError> {
        let container = self.names.generate(prefix);
        self.create_named_container(&container).await?;
        Ok(container)
    }

    pub async fn create_named_container(&mut self, container: &str) -> Result<(), ScenarioError> {
        info!("Creating container {}", container);
        self.gateway
            .create_container(container)
            .await
            .step("create container")?;
        self.scope.track_container(container);
        Ok(())
    }

    /// Deletes a container ahead of teardown
    pub async fn delete_container(&mut self, container: &str) -> Result<(), ScenarioError> {
        info!("Deleting container {}", container);
        self.gateway
            .delete_container(container)
            .await
            .step("delete container")?;
        self.scope.forget_container(container);
        Ok(())
    }

    /// Reads the account-wide service properties and schedules their
    /// restoration for teardown
    pub async fn capture_service_properties(&mut self) -> Result<ServiceProperties, ScenarioError> {
        let prior = self
            .gateway
            .get_service_properties()
            .await
            .step("get service properties")?;
        self.scope.track_service_properties(prior.clone());
        Ok(prior)
    }

    pub async fn teardown(&mut self) {
        self.scope.release(self.gateway, &mut self.report).await;
    }

    pub fn into_report(self) -> ScenarioReport {
        self.report
    }
}

/// A scenario stopped by a gateway error. `report` holds the checks made
/// before the error and whatever teardown could not release.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ScenarioAborted {
    #[source]
    pub error: ScenarioError,
    pub report: ScenarioReport,
}

#[async_trait]
pub trait LifecycleScenario: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prefixes of the containers this scenario creates
    fn container_prefixes(&self) -> &'static [&'static str] {
        &[]
    }

    /// The scenario body. Resources acquired through `ctx` are released
    /// after it returns, whatever it returns.
    async fn exercise(&self, ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError>;

    async fn run(
        &self,
        gateway: &dyn StorageGateway,
        names: &NameGenerator,
    ) -> Result<ScenarioReport, ScenarioAborted> {
        info!("Scenario {} starting", self.name());
        let mut ctx = ScenarioContext::new(self.name(), gateway, names);

        let outcome = self.exercise(&mut ctx).await;
        ctx.teardown().await;
        let report = ctx.into_report();

        match outcome {
            Ok(()) => {
                info!("Scenario {} finished: {}", self.name(), report.summary());
                Ok(report)
            }
            Err(error) => {
                error!("Scenario {} aborted: {}{}", self.name(), error, report.cleanup_note());
                Err(ScenarioAborted { error, report })
            }
        }
    }
}

/// Every scenario, in walkthrough order: basic blob kinds first, then the
/// advanced container, copy and service samples
pub fn catalog(settings: &ScenarioSettings) -> Vec<Box<dyn LifecycleScenario>> {
    vec![
        Box::new(BlockBlobRoundTrip::new(settings.block_size)),
        Box::new(AppendBlobRoundTrip),
        Box::new(PageBlobRangeWrite),
        Box::new(SnapshotRoundTrip),
        Box::new(ContainerListing),
        Box::new(CorsRulesRoundTrip),
        Box::new(BlobCopy::new(settings.copy_poll_interval, settings.copy_timeout)),
        Box::new(ServicePropertiesRoundTrip),
        Box::new(ContainerMetadataAndProperties),
        Box::new(ContainerAccessControl),
        Box::new(BlobPropertiesAndMetadata),
    ]
}

/// Keeps the scenarios named in `names`, in catalog order. An empty list
/// keeps everything.
pub fn select(
    catalog: Vec<Box<dyn LifecycleScenario>>,
    names: &[String],
) -> Result<Vec<Box<dyn LifecycleScenario>>, GatewayError> {
    if names.is_empty() {
        return Ok(catalog);
    }
    if let Some(unknown) = names
        .iter()
        .find(|name| !catalog.iter().any(|scenario| scenario.name() == name.as_str()))
    {
        return Err(GatewayError::ConfigError(format!("unknown scenario {unknown}")));
    }
    Ok(catalog
        .into_iter()
        .filter(|scenario| names.iter().any(|name| name == scenario.name()))
        .collect())
}

/// Distinct container prefixes used by `scenarios`
pub fn container_prefixes(scenarios: &[Box<dyn LifecycleScenario>]) -> Vec<&'static str> {
    let mut prefixes: Vec<&'static str> = scenarios
        .iter()
        .flat_map(|scenario| scenario.container_prefixes().iter().copied())
        .collect();
    prefixes.sort_unstable();
    prefixes.dedup();
    prefixes
}

/// Deterministic, non-repeating-looking payload
pub(crate) fn sample_content(len: usize, salt: u8) -> Bytes {
    (0..len)
        .map(|i| ((i as u32).wrapping_mul(2_654_435_761) >> 24) as u8 ^ salt)
        .collect::<Vec<u8>>()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_unique() {
        let scenarios = catalog(&ScenarioSettings::default());
        let mut names: Vec<&str> = scenarios.iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), 11);
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 11);
    }

    #[test]
    fn test_select_keeps_catalog_order() {
        let wanted = vec!["container_acl".to_string(), "block_blob_round_trip".to_string()];
        let selected = select(catalog(&ScenarioSettings::default()), &wanted).unwrap();
        let names: Vec<&str> = selected.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["block_blob_round_trip", "container_acl"]);
    }

    #[test]
    fn test_select_rejects_unknown_names() {
        let wanted = vec!["defragment_disk".to_string()];
        assert!(matches!(
            select(catalog(&ScenarioSettings::default()), &wanted),
            Err(GatewayError::ConfigError(_))
        ));
    }

    #[test]
    fn test_container_prefixes() {
        let prefixes = container_prefixes(&catalog(&ScenarioSettings::default()));
        assert_eq!(
            prefixes,
            vec![
                "appendblobs",
                "blobcontainer",
                "blockblobcontainer",
                "blockblobs",
                "containersample",
                "pageblobs"
            ]
        );
    }

    #[test]
    fn test_sample_content_is_deterministic() {
        assert_eq!(sample_content(64, 3), sample_content(64, 3));
        assert_ne!(sample_content(64, 3), sample_content(64, 4));
    }
}
