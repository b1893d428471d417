/// Account-wide service property scenarios
///
/// Both scenarios capture the current properties before touching them; the
/// capture is restored and verified at teardown whatever the outcome.

use async_trait::async_trait;

use super::{LifecycleScenario, ScenarioContext};
use crate::error::{ScenarioError, StepExt};
use crate::gateway::{CorsRule, LoggingSettings, RetentionPolicy};

/// Turns on analytics logging with a ten day retention
pub struct ServicePropertiesRoundTrip;

#[async_trait]
impl LifecycleScenario for ServicePropertiesRoundTrip {
    fn name(&self) -> &'static str {
        "service_properties_round_trip"
    }

    async fn exercise(&self, ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
        let gateway = ctx.gateway;
        let mut properties = ctx.capture_service_properties().await?;

        properties.logging = LoggingSettings {
            delete: true,
            read: true,
            write: true,
            retention_policy: RetentionPolicy {
                enabled: true,
                days: Some(10),
            },
            ..Default::default()
        };
        gateway
            .set_service_properties(&properties)
            .await
            .step("set service properties")?;

        let current = gateway
            .get_service_properties()
            .await
            .step("get service properties")?;
        ctx.report
            .check_eq("logging settings read back as set", &current.logging, &properties.logging);
        ctx.report
            .check_eq("cors rules are left untouched", &current.cors, &properties.cors);
        Ok(())
    }
}

/// Replaces the CORS rules with a single permissive rule
pub struct CorsRulesRoundTrip;

#[async_trait]
impl LifecycleScenario for CorsRulesRoundTrip {
    fn name(&self) -> &'static str {
        "cors_rules_round_trip"
    }

    async fn exercise(&self, ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
        let gateway = ctx.gateway;
        let mut properties = ctx.capture_service_properties().await?;

        properties.cors = vec![CorsRule {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["POST".to_string(), "GET".to_string()],
            allowed_headers: vec!["*".to_string()],
            exposed_headers: vec!["*".to_string()],
            max_age_in_seconds: 3600,
        }];
        gateway
            .set_service_properties(&properties)
            .await
            .step("set service properties")?;

        let current = gateway
            .get_service_properties()
            .await
            .step("get service properties")?;
        ctx.report
            .check_eq("cors rules read back as set", &current.cors, &properties.cors);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::StorageGateway;
    use crate::memory::InMemoryGateway;
    use crate::names::NameGenerator;

    #[tokio::test]
    async fn test_cors_rules_are_restored() {
        let gateway = InMemoryGateway::new();
        let names = NameGenerator::seeded(7);
        let before = gateway.get_service_properties().await.unwrap();

        let report = CorsRulesRoundTrip.run(&gateway, &names).await.unwrap();

        assert!(report.passed(), "{}", report.summary());
        assert!(report
            .passed_checks
            .contains(&"service properties restored".to_string()));
        assert_eq!(gateway.get_service_properties().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_logging_is_restored() {
        let gateway = InMemoryGateway::new();
        let names = NameGenerator::seeded(7);

        let report = ServicePropertiesRoundTrip.run(&gateway, &names).await.unwrap();

        assert!(report.passed(), "{}", report.summary());
        let after = gateway.get_service_properties().await.unwrap();
        assert!(!after.logging.read);
        assert!(!after.logging.retention_policy.enabled);
    }
}
