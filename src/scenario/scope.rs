/// ResourceScope: everything a scenario acquired, released on every exit path
///
/// Containers are deleted (which takes their blobs and snapshots with them);
/// account-wide service properties are restored to the value captured before
/// the scenario changed them. Release runs in reverse acquisition order.

use tracing::{debug, error, info};

use crate::gateway::{ServiceProperties, StorageGateway};
use crate::scenario::report::ScenarioReport;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Resource {
    Container(String),
    ServiceProperties(ServiceProperties),
}

#[derive(Debug, Default)]
pub struct ResourceScope {
    resources: Vec<Resource>,
}

impl ResourceScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_container(&mut self, container: &str) {
        self.resources.push(Resource::Container(container.to_string()));
    }

    /// Stops tracking a container the scenario already deleted itself
    pub fn forget_container(&mut self, container: &str) {
        self.resources
            .retain(|resource| !matches!(resource, Resource::Container(name) if name == container));
    }

    pub fn track_service_properties(&mut self, prior: ServiceProperties) {
        self.resources.push(Resource::ServiceProperties(prior));
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Releases every tracked resource. Failures are recorded in `report` and
    /// logged, never returned: release always runs to completion.
    pub async fn release(&mut self, gateway: &dyn StorageGateway, report: &mut ScenarioReport) {
        while let Some(resource) = self.resources.pop() {
            match resource {
                Resource::Container(container) => match gateway.delete_container(&container).await {
                    Ok(()) => info!("Deleted container {}", container),
                    Err(e) if e.is_not_found() => debug!("Container {} already gone", container),
                    Err(e) => {
                        error!(
                            "CLEANUP FAILED: container {} was not deleted and may leak: {}",
                            container, e
                        );
                        report.cleanup_failed(format!("container {}", container), e.to_string());
                    }
                },
                Resource::ServiceProperties(prior) => {
                    if let Err(e) = gateway.set_service_properties(&prior).await {
                        error!("CLEANUP FAILED: service properties were not restored: {}", e);
                        report.cleanup_failed("service properties".to_string(), e.to_string());
                        continue;
                    }
                    match gateway.get_service_properties().await {
                        Ok(current) => {
                            report.check_eq("service properties restored", &current, &prior);
                        }
                        Err(e) => {
                            error!("CLEANUP FAILED: restored service properties could not be read back: {}", e);
                            report.cleanup_failed("service properties".to_string(), e.to_string());
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::CorsRule;
    use crate::memory::{Fault, InMemoryGateway};

    #[tokio::test]
    async fn test_release_deletes_in_reverse_order() {
        let gateway = InMemoryGateway::new();
        let mut scope = ResourceScope::new();
        let mut report = ScenarioReport::new("scope");

        for name in ["first", "second"] {
            gateway.create_container(name).await.unwrap();
            scope.track_container(name);
        }
        scope.release(&gateway, &mut report).await;

        assert!(scope.is_empty());
        assert_eq!(gateway.container_count(), 0);
        assert!(report.cleanup.is_empty());
    }

    #[tokio::test]
    async fn test_forgotten_and_missing_containers_are_not_failures() {
        let gateway = InMemoryGateway::new();
        let mut scope = ResourceScope::new();
        let mut report = ScenarioReport::new("scope");

        gateway.create_container("kept").await.unwrap();
        scope.track_container("kept");
        scope.forget_container("kept");
        scope.track_container("never-created");
        scope.release(&gateway, &mut report).await;

        assert_eq!(gateway.container_count(), 1);
        assert!(report.cleanup.is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_is_recorded_and_release_continues() {
        let gateway = InMemoryGateway::new();
        let mut scope = ResourceScope::new();
        let mut report = ScenarioReport::new("scope");

        let prior = gateway.get_service_properties().await.unwrap();
        scope.track_service_properties(prior.clone());
        gateway.create_container("stuck").await.unwrap();
        scope.track_container("stuck");

        let mut changed = prior.clone();
        changed.cors.push(CorsRule {
            allowed_origins: vec!["*".into()],
            ..Default::default()
        });
        gateway.set_service_properties(&changed).await.unwrap();

        gateway.inject("delete_container", Fault::Fail);
        scope.release(&gateway, &mut report).await;

        assert_eq!(report.cleanup.len(), 1);
        assert_eq!(report.cleanup[0].resource, "container stuck");
        assert_eq!(gateway.get_service_properties().await.unwrap(), prior);
        assert_eq!(report.passed_checks, vec!["service properties restored"]);
    }
}
