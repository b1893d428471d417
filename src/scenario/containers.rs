/// Container scenarios: listing by prefix, metadata and properties, access level

use async_trait::async_trait;

use super::{LifecycleScenario, ScenarioContext};
use crate::error::{ScenarioError, StepExt};
use crate::gateway::{AccessLevel, Metadata};

const CONTAINER_PREFIX: &str = "blobcontainer";

/// Creates five containers sharing a generated stem, lists them by prefix and
/// deletes them one by one
pub struct ContainerListing;

impl ContainerListing {
    const COUNT: usize = 5;
}

#[async_trait]
impl LifecycleScenario for ContainerListing {
    fn name(&self) -> &'static str {
        "container_listing"
    }

    fn container_prefixes(&self) -> &'static [&'static str] {
        &["containersample"]
    }

    async fn exercise(&self, ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
        let gateway = ctx.gateway;
        let stem = ctx.names.generate("containersample");

        let mut expected: Vec<String> = (0..Self::COUNT).map(|i| format!("{stem}{i}")).collect();
        for container in &expected {
            ctx.create_named_container(container).await?;
        }

        let mut listed = gateway.list_containers(&stem).await.step("list containers")?;
        listed.sort();
        expected.sort();
        ctx.report
            .check_eq("prefix listing returns exactly the created containers", &listed, &expected);

        for container in &expected {
            ctx.delete_container(container).await?;
        }
        let listed = gateway.list_containers(&stem).await.step("list containers")?;
        ctx.report.check(
            "deleted containers are no longer listed",
            listed.is_empty(),
            || format!("still listed: {:?}", listed),
        );
        Ok(())
    }
}

/// Sets container metadata twice, overwrites it with a disjoint set, and reads
/// the system properties of a fresh container
pub struct ContainerMetadataAndProperties;

#[async_trait]
impl LifecycleScenario for ContainerMetadataAndProperties {
    fn name(&self) -> &'static str {
        "container_metadata_and_properties"
    }

    fn container_prefixes(&self) -> &'static [&'static str] {
        &[CONTAINER_PREFIX]
    }

    async fn exercise(&self, ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
        let gateway = ctx.gateway;
        let container = ctx.create_container(CONTAINER_PREFIX).await?;

        // keys are lowercase: the service does not preserve key case
        let first: Metadata = [
            ("metadatakey1".to_string(), "MetaDataValue1".to_string()),
            ("metadatakey2".to_string(), "MetaDataValue2".to_string()),
        ]
        .into_iter()
        .collect();
        for check in ["container metadata reads back as set", "container metadata set is idempotent"] {
            gateway
                .set_container_metadata(&container, &first)
                .await
                .step("set container metadata")?;
            let current = gateway
                .get_container_metadata(&container)
                .await
                .step("get container metadata")?;
            ctx.report.check_eq(check, &current, &first);
        }

        let second: Metadata = [("metadatakey3".to_string(), "MetaDataValue3".to_string())]
            .into_iter()
            .collect();
        gateway
            .set_container_metadata(&container, &second)
            .await
            .step("set container metadata")?;
        let current = gateway
            .get_container_metadata(&container)
            .await
            .step("get container metadata")?;
        ctx.report
            .check_eq("setting metadata replaces every key", &current, &second);

        let properties = gateway
            .get_container_properties(&container)
            .await
            .step("get container properties")?;
        ctx.report.check(
            "container reports last-modified and etag",
            properties.last_modified.is_some() && properties.etag.is_some(),
            || format!("properties were {:?}", properties),
        );
        ctx.report
            .check_eq("new container is private", &properties.access, &AccessLevel::Private);
        Ok(())
    }
}

/// Walks the container through each public access level and back to private
pub struct ContainerAccessControl;

#[async_trait]
impl LifecycleScenario for ContainerAccessControl {
    fn name(&self) -> &'static str {
        "container_acl"
    }

    fn container_prefixes(&self) -> &'static [&'static str] {
        &[CONTAINER_PREFIX]
    }

    async fn exercise(&self, ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
        let gateway = ctx.gateway;
        let container = ctx.create_container(CONTAINER_PREFIX).await?;

        for access in [AccessLevel::Container, AccessLevel::Blob, AccessLevel::Private] {
            gateway
                .set_container_acl(&container, access)
                .await
                .step("set container acl")?;
            let current = gateway
                .get_container_acl(&container)
                .await
                .step("get container acl")?;
            ctx.report
                .check_eq(&format!("access level {} reads back", access), &current, &access);
        }
        Ok(())
    }
}
