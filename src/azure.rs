/// AzureGateway: StorageGateway over the Azure Blob Storage SDK
///
/// Built only with the `azure` cargo feature. Works against a storage
/// account (connection string) or the Azurite emulator.
///
/// Snapshot tokens and copy ids are the service's own strings, so they are
/// parsed back into SDK types on the way in. Abort copy, container metadata
/// updates and service property updates have no SDK client method; they are
/// sent as signed REST requests through a pipeline built from the same
/// credentials.

use async_trait::async_trait;
use azure_core::headers::{HeaderName, Headers, CONTENT_TYPE};
use azure_core::request_options::{Metadata as SdkMetadata, Range as SdkRange};
use azure_core::{Body, ClientOptions, Context, Method, Pipeline, Url};
use azure_storage::clients::{finalize_request, new_pipeline_from_options, ServiceType};
use azure_storage::{CloudLocation, ConnectionString, CopyId, EndpointProtocol, StorageCredentials};
use azure_storage_blobs::blob::{BlobBlockType, BlobType, BlockList, BlockListType, CopyStatus as SdkCopyStatus};
use azure_storage_blobs::prelude::{
    BA512Range, BlobClient, BlobServiceClient, BlockId, ClientBuilder, ContainerClient, CorsRule as SdkCorsRule,
    DeleteSnapshotsMethod, Logging as SdkLogging, PublicAccess, Snapshot,
};
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, info};

use crate::config::ExerciserConfig;
use crate::error::{GatewayError, Result};
use crate::gateway::{
    AccessLevel, BlobInfo, BlobItem, BlobKind, BlobProperties, BlockInfo, BlockListFilter, BlockListing, ByteRange,
    ContainerProperties, CopyOperation, CopyStatus, CorsRule, DeleteSnapshots, LoggingSettings, Metadata,
    ReadOptions, RetentionPolicy, ServiceProperties, StorageGateway,
};

const EMULATOR_ADDRESS: &str = "127.0.0.1";
const EMULATOR_PORT: u16 = 10000;
const COPY_ACTION: HeaderName = HeaderName::from_static("x-ms-copy-action");

pub struct AzureGateway {
    service: BlobServiceClient,
    /// Signs the requests the SDK clients cannot build
    pipeline: Pipeline,
}

impl AzureGateway {
    pub fn from_config(config: &ExerciserConfig) -> Result<Self> {
        if config.use_emulator {
            info!("Connecting to the storage emulator on {}:{}", EMULATOR_ADDRESS, EMULATOR_PORT);
            return Ok(Self::with_location(emulator_location(), StorageCredentials::emulator()));
        }
        let raw = config
            .connection_string
            .as_deref()
            .ok_or_else(|| GatewayError::ConfigError("AZURE_STORAGE_CONNECTION_STRING not set".to_string()))?;
        let connection_string = ConnectionString::new(raw)
            .map_err(|e| GatewayError::ConfigError(format!("invalid connection string: {e}")))?;
        let (location, credentials) = location_from(&connection_string)?;

        info!("Connecting to storage account {}", location.account());
        Ok(Self::with_location(location, credentials))
    }

    pub fn with_location(location: CloudLocation, credentials: StorageCredentials) -> Self {
        let pipeline = new_pipeline_from_options(ClientOptions::default(), credentials.clone());
        let service = ClientBuilder::with_location(location, credentials).blob_service_client();
        Self { service, pipeline }
    }

    fn container_client(&self, container: &str) -> ContainerClient {
        self.service.container_client(container)
    }

    fn blob_client(&self, container: &str, blob: &str) -> BlobClient {
        self.container_client(container).blob_client(blob)
    }

    async fn put_raw(&self, url: Url, headers: Headers, body: Option<Bytes>) -> azure_core::Result<()> {
        let mut request = finalize_request(url, Method::Put, headers, body.map(Body::from))?;
        let mut context = Context::new();
        context.insert(ServiceType::Blob);
        self.pipeline.send(&context, &mut request).await?;
        Ok(())
    }
}

fn emulator_location() -> CloudLocation {
    CloudLocation::Emulator {
        address: EMULATOR_ADDRESS.to_string(),
        port: EMULATOR_PORT,
    }
}

/// Resolves the endpoint and credentials a connection string names
fn location_from(connection_string: &ConnectionString) -> Result<(CloudLocation, StorageCredentials)> {
    if connection_string.use_development_storage == Some(true) {
        return Ok((emulator_location(), StorageCredentials::emulator()));
    }

    let credentials = connection_string
        .storage_credentials()
        .map_err(|e| GatewayError::ConfigError(format!("invalid connection string: {e}")))?;
    let account = connection_string.account_name.unwrap_or_default().to_string();

    let location = match (connection_string.blob_endpoint, connection_string.endpoint_suffix) {
        (Some(endpoint), _) => CloudLocation::Custom {
            account,
            uri: endpoint.trim_end_matches('/').to_string(),
        },
        (None, _) if account.is_empty() => {
            return Err(GatewayError::ConfigError(
                "Invalid connection string: missing AccountName or BlobEndpoint".to_string(),
            ))
        }
        (None, Some(suffix)) => {
            let protocol = connection_string
                .default_endpoints_protocol
                .as_ref()
                .unwrap_or(&EndpointProtocol::Https);
            CloudLocation::Custom {
                uri: format!("{protocol}://{account}.blob.{suffix}"),
                account,
            }
        }
        (None, None) => CloudLocation::Public { account },
    };
    Ok((location, credentials))
}

/// Maps an SDK failure to the gateway error the in-memory gateway would
/// report for the same condition
fn classify(err: azure_core::Error, container: &str, blob: Option<&str>) -> GatewayError {
    let code = err
        .as_http_error()
        .and_then(|http| http.error_code())
        .map(str::to_string);
    let blob_name = || blob.unwrap_or_default().to_string();

    match code.as_deref() {
        Some("ContainerNotFound") => GatewayError::ContainerNotFound {
            container: container.to_string(),
        },
        Some("ContainerAlreadyExists") => GatewayError::ContainerAlreadyExists {
            container: container.to_string(),
        },
        Some("BlobNotFound") => GatewayError::BlobNotFound {
            container: container.to_string(),
            blob: blob_name(),
        },
        Some("SnapshotsPresent") => GatewayError::SnapshotsExist {
            container: container.to_string(),
            blob: blob_name(),
            count: 1,
        },
        Some("InvalidBlobType") => GatewayError::InvalidBlobType {
            blob: blob_name(),
            expected: "matching".to_string(),
            actual: "other".to_string(),
        },
        Some("InvalidPageRange") | Some("InvalidRange") => GatewayError::InvalidRange {
            reason: err.to_string(),
        },
        Some("InvalidBlockList") => GatewayError::InvalidBlockList {
            blob: blob_name(),
            block_id: "unknown".to_string(),
        },
        Some("PendingCopyOperation") => GatewayError::CopyPending { blob: blob_name() },
        Some("NoPendingCopyOperation") => GatewayError::NoPendingCopy { blob: blob_name() },
        Some("CopyIdMismatch") => GatewayError::CopyIdMismatch {
            blob: blob_name(),
            given: String::new(),
        },
        _ => GatewayError::from(err),
    }
}

fn blob_kind(blob_type: BlobType) -> BlobKind {
    match blob_type {
        BlobType::BlockBlob => BlobKind::Block,
        BlobType::PageBlob => BlobKind::Page,
        BlobType::AppendBlob => BlobKind::Append,
    }
}

fn copy_status(status: SdkCopyStatus) -> CopyStatus {
    match status {
        SdkCopyStatus::Pending => CopyStatus::Pending,
        SdkCopyStatus::Success => CopyStatus::Success,
        SdkCopyStatus::Aborted => CopyStatus::Aborted,
        SdkCopyStatus::Failed => CopyStatus::Failed,
    }
}

fn access_level(access: PublicAccess) -> AccessLevel {
    match access {
        PublicAccess::Container => AccessLevel::Container,
        PublicAccess::Blob => AccessLevel::Blob,
        PublicAccess::None => AccessLevel::Private,
    }
}

fn public_access(access: AccessLevel) -> PublicAccess {
    match access {
        AccessLevel::Container => PublicAccess::Container,
        AccessLevel::Blob => PublicAccess::Blob,
        AccessLevel::Private => PublicAccess::None,
    }
}

fn block_id_string(id: &BlockId) -> String {
    String::from_utf8_lossy(id.as_ref()).into_owned()
}

/// The opaque snapshot timestamp the service returned
fn snapshot_token(snapshot: &Snapshot) -> Result<String> {
    match serde_json::to_value(snapshot)? {
        serde_json::Value::String(token) => Ok(token),
        other => Err(GatewayError::AzureError(format!("unexpected snapshot value {other}"))),
    }
}

fn metadata_from_sdk(mut metadata: SdkMetadata) -> Metadata {
    metadata
        .as_mut()
        .drain()
        .map(|(key, value)| (key, String::from_utf8_lossy(&value).into_owned()))
        .collect()
}

/// Page ranges come back with inclusive ends; only ranges overlapping
/// `bounds` are kept, clipped to it
fn clip_page_ranges(ranges: &[SdkRange], bounds: Option<ByteRange>) -> Vec<ByteRange> {
    ranges
        .iter()
        .filter_map(|written| {
            let SdkRange::Range(written) = written else {
                return None;
            };
            let (mut start, mut end) = (written.start, written.end);
            if let Some(bounds) = bounds {
                start = start.max(bounds.start);
                end = end.min(bounds.end);
            }
            (start <= end).then(|| ByteRange::new(start, end))
        })
        .collect()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn logging_settings(logging: &SdkLogging) -> LoggingSettings {
    LoggingSettings {
        version: logging.version.clone(),
        delete: logging.delete,
        read: logging.read,
        write: logging.write,
        retention_policy: RetentionPolicy {
            enabled: logging.retention_policy.enabled,
            days: logging.retention_policy.days.and_then(|days| u32::try_from(days).ok()),
        },
    }
}

fn cors_rule(rule: &SdkCorsRule) -> CorsRule {
    CorsRule {
        allowed_origins: split_list(&rule.allowed_origins),
        allowed_methods: split_list(&rule.allowed_methods),
        allowed_headers: split_list(&rule.allowed_headers),
        exposed_headers: split_list(&rule.exposed_headers),
        max_age_in_seconds: u32::try_from(rule.max_age_in_seconds).unwrap_or(0),
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Request body for Set Blob Service Properties. Only logging and CORS are
/// sent; the service keeps every element the body leaves out.
fn service_properties_xml(properties: &ServiceProperties) -> String {
    let logging = &properties.logging;
    let retention = &logging.retention_policy;
    let days = match retention.days {
        Some(days) if retention.enabled => format!("<Days>{days}</Days>"),
        _ => String::new(),
    };

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><StorageServiceProperties>");
    xml.push_str(&format!(
        "<Logging><Version>{}</Version><Delete>{}</Delete><Read>{}</Read><Write>{}</Write>\
         <RetentionPolicy><Enabled>{}</Enabled>{}</RetentionPolicy></Logging>",
        escape_xml(&logging.version),
        logging.delete,
        logging.read,
        logging.write,
        retention.enabled,
        days
    ));
    xml.push_str("<Cors>");
    for rule in &properties.cors {
        xml.push_str(&format!(
            "<CorsRule><AllowedOrigins>{}</AllowedOrigins><AllowedMethods>{}</AllowedMethods>\
             <AllowedHeaders>{}</AllowedHeaders><ExposedHeaders>{}</ExposedHeaders>\
             <MaxAgeInSeconds>{}</MaxAgeInSeconds></CorsRule>",
            escape_xml(&rule.allowed_origins.join(",")),
            escape_xml(&rule.allowed_methods.join(",")),
            escape_xml(&rule.allowed_headers.join(",")),
            escape_xml(&rule.exposed_headers.join(",")),
            rule.max_age_in_seconds
        ));
    }
    xml.push_str("</Cors></StorageServiceProperties>");
    xml
}

#[async_trait]
impl StorageGateway for AzureGateway {
    async fn create_container(&self, container: &str) -> Result<()> {
        self.container_client(container)
            .create()
            .public_access(PublicAccess::None)
            .await
            .map_err(|e| classify(e, container, None))?;
        debug!("azure: created container {}", container);
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<()> {
        self.container_client(container)
            .delete()
            .await
            .map_err(|e| classify(e, container, None))?;
        Ok(())
    }

    async fn list_containers(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut stream = self.service.list_containers().prefix(prefix.to_string()).into_stream();
        while let Some(page) = stream.next().await {
            names.extend(page?.containers.into_iter().map(|c| c.name));
        }
        names.sort();
        Ok(names)
    }

    async fn get_container_metadata(&self, container: &str) -> Result<Metadata> {
        let response = self
            .container_client(container)
            .get_properties()
            .await
            .map_err(|e| classify(e, container, None))?;
        Ok(response.container.metadata.into_iter().collect())
    }

    async fn set_container_metadata(&self, container: &str, metadata: &Metadata) -> Result<()> {
        let mut url = self.container_client(container).url()?;
        url.query_pairs_mut()
            .append_pair("restype", "container")
            .append_pair("comp", "metadata");
        let mut headers = Headers::new();
        for (key, value) in metadata {
            headers.insert(format!("x-ms-meta-{key}"), value.clone());
        }
        self.put_raw(url, headers, None)
            .await
            .map_err(|e| classify(e, container, None))
    }

    async fn get_container_properties(&self, container: &str) -> Result<ContainerProperties> {
        let response = self
            .container_client(container)
            .get_properties()
            .await
            .map_err(|e| classify(e, container, None))?;
        Ok(ContainerProperties {
            last_modified: Some(azure_core::date::to_rfc1123(&response.container.last_modified)),
            etag: Some(response.container.e_tag.clone()),
            access: access_level(response.container.public_access),
        })
    }

    async fn get_container_acl(&self, container: &str) -> Result<AccessLevel> {
        let response = self
            .container_client(container)
            .get_acl()
            .await
            .map_err(|e| classify(e, container, None))?;
        Ok(access_level(response.public_access))
    }

    async fn set_container_acl(&self, container: &str, access: AccessLevel) -> Result<()> {
        self.container_client(container)
            .set_acl(public_access(access))
            .await
            .map_err(|e| classify(e, container, None))?;
        Ok(())
    }

    async fn list_blobs(&self, container: &str, include_snapshots: bool) -> Result<Vec<BlobItem>> {
        let mut items = Vec::new();
        let mut stream = self
            .container_client(container)
            .list_blobs()
            .include_snapshots(include_snapshots)
            .into_stream();
        while let Some(page) = stream.next().await {
            let page = page.map_err(|e| classify(e, container, None))?;
            for blob in page.blobs.blobs() {
                let snapshot = blob.snapshot.as_ref().map(snapshot_token).transpose()?;
                items.push(BlobItem {
                    name: blob.name.clone(),
                    kind: blob_kind(blob.properties.blob_type),
                    snapshot,
                });
            }
        }
        Ok(items)
    }

    async fn get_blob(&self, container: &str, blob: &str, options: &ReadOptions) -> Result<Bytes> {
        let mut request = self.blob_client(container, blob).get();
        if let Some(range) = options.range {
            request = request.range(range.start..range.end + 1);
        }
        if let Some(token) = &options.snapshot {
            request = request.blob_versioning(Snapshot::new(token.clone()));
        }
        let not_found = |e: azure_core::Error| match (classify(e, container, Some(blob)), &options.snapshot) {
            (GatewayError::BlobNotFound { .. }, Some(token)) => GatewayError::SnapshotNotFound {
                container: container.to_string(),
                blob: blob.to_string(),
                snapshot: token.clone(),
            },
            (other, _) => other,
        };

        let mut data = Vec::new();
        let mut stream = request.into_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(not_found)?;
            data.extend_from_slice(&chunk.data.collect().await?);
        }
        Ok(Bytes::from(data))
    }

    async fn delete_blob(&self, container: &str, blob: &str, snapshots: DeleteSnapshots) -> Result<()> {
        let request = self.blob_client(container, blob).delete();
        let request = match snapshots {
            DeleteSnapshots::None => request,
            DeleteSnapshots::Include => request.delete_snapshots_method(DeleteSnapshotsMethod::Include),
            DeleteSnapshots::Only => request.delete_snapshots_method(DeleteSnapshotsMethod::Only),
        };
        request.await.map_err(|e| classify(e, container, Some(blob)))?;
        Ok(())
    }

    async fn get_blob_metadata(&self, container: &str, blob: &str) -> Result<Metadata> {
        let response = self
            .blob_client(container, blob)
            .get_metadata()
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        Ok(metadata_from_sdk(response.metadata))
    }

    async fn set_blob_metadata(&self, container: &str, blob: &str, metadata: &Metadata) -> Result<()> {
        let mut sdk_metadata = SdkMetadata::new();
        for (key, value) in metadata {
            sdk_metadata.insert(key.clone(), value.clone());
        }
        self.blob_client(container, blob)
            .set_metadata()
            .metadata(sdk_metadata)
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        Ok(())
    }

    async fn get_blob_properties(&self, container: &str, blob: &str) -> Result<BlobInfo> {
        let response = self
            .blob_client(container, blob)
            .get_properties()
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        let properties = response.blob.properties;
        let copy = match (&properties.copy_id, properties.copy_status) {
            (Some(id), Some(status)) => Some(CopyOperation {
                id: id.to_string(),
                status: copy_status(status),
            }),
            _ => None,
        };
        Ok(BlobInfo {
            kind: blob_kind(properties.blob_type),
            content_length: properties.content_length,
            properties: BlobProperties {
                content_type: Some(properties.content_type.clone()),
                content_encoding: properties.content_encoding.clone(),
                content_language: properties.content_language.clone(),
                cache_control: properties.cache_control.clone(),
            },
            copy,
        })
    }

    async fn set_blob_properties(&self, container: &str, blob: &str, update: &BlobProperties) -> Result<()> {
        // the service clears every header missing from the request, so the
        // current values are read and merged first
        let client = self.blob_client(container, blob);
        let mut properties = client
            .get_properties()
            .await
            .map_err(|e| classify(e, container, Some(blob)))?
            .blob
            .properties;
        if let Some(value) = &update.content_type {
            properties.content_type = value.clone();
        }
        if let Some(value) = &update.content_encoding {
            properties.content_encoding = Some(value.clone());
        }
        if let Some(value) = &update.content_language {
            properties.content_language = Some(value.clone());
        }
        if let Some(value) = &update.cache_control {
            properties.cache_control = Some(value.clone());
        }
        client
            .set_properties()
            .set_from_blob_properties(properties)
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        Ok(())
    }

    async fn upload_block_blob(&self, container: &str, blob: &str, content: Bytes, content_type: &str) -> Result<()> {
        self.blob_client(container, blob)
            .put_block_blob(content)
            .content_type(content_type.to_string())
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        Ok(())
    }

    async fn stage_block(&self, container: &str, blob: &str, block_id: &str, content: Bytes) -> Result<()> {
        self.blob_client(container, blob)
            .put_block(BlockId::new(block_id.to_string()), content)
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        Ok(())
    }

    async fn commit_block_list(&self, container: &str, blob: &str, block_ids: &[String]) -> Result<()> {
        let block_list = BlockList {
            blocks: block_ids
                .iter()
                .map(|id| BlobBlockType::Latest(BlockId::new(id.clone())))
                .collect(),
        };
        self.blob_client(container, blob)
            .put_block_list(block_list)
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        Ok(())
    }

    async fn list_blocks(&self, container: &str, blob: &str, filter: BlockListFilter) -> Result<BlockListing> {
        let list_type = match filter {
            BlockListFilter::Committed => BlockListType::Committed,
            BlockListFilter::Uncommitted => BlockListType::Uncommitted,
            BlockListFilter::All => BlockListType::All,
        };
        let response = self
            .blob_client(container, blob)
            .get_block_list()
            .block_list_type(list_type)
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;

        let mut listing = BlockListing::default();
        for block in response.block_with_size_list.blocks {
            match &block.block_list_type {
                BlobBlockType::Committed(id) => listing.committed.push(BlockInfo {
                    id: block_id_string(id),
                    size: block.size_in_bytes,
                }),
                BlobBlockType::Uncommitted(id) => listing.uncommitted.push(BlockInfo {
                    id: block_id_string(id),
                    size: block.size_in_bytes,
                }),
                BlobBlockType::Latest(_) => {}
            }
        }
        Ok(listing)
    }

    async fn create_append_blob(&self, container: &str, blob: &str) -> Result<()> {
        self.blob_client(container, blob)
            .put_append_blob()
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        Ok(())
    }

    async fn append_block(&self, container: &str, blob: &str, content: Bytes) -> Result<u64> {
        let client = self.blob_client(container, blob);
        client
            .append_block(content)
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        let properties = client
            .get_properties()
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        Ok(properties.blob.properties.content_length)
    }

    async fn create_page_blob(&self, container: &str, blob: &str, capacity: u64) -> Result<()> {
        self.blob_client(container, blob)
            .put_page_blob(capacity as u128)
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        Ok(())
    }

    async fn write_pages(&self, container: &str, blob: &str, range: ByteRange, content: Bytes) -> Result<()> {
        let pages = BA512Range::new(range.start, range.end).map_err(|e| GatewayError::InvalidRange {
            reason: e.to_string(),
        })?;
        self.blob_client(container, blob)
            .put_page(pages, content)
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        Ok(())
    }

    async fn list_page_ranges(&self, container: &str, blob: &str, bounds: Option<ByteRange>) -> Result<Vec<ByteRange>> {
        let response = self
            .blob_client(container, blob)
            .get_page_ranges()
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        Ok(clip_page_ranges(&response.page_list.ranges, bounds))
    }

    async fn create_snapshot(&self, container: &str, blob: &str) -> Result<String> {
        let response = self
            .blob_client(container, blob)
            .snapshot()
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        snapshot_token(&response.snapshot)
    }

    async fn start_copy(
        &self,
        dest_container: &str,
        dest_blob: &str,
        source_container: &str,
        source_blob: &str,
    ) -> Result<CopyOperation> {
        let source_url = self.blob_client(source_container, source_blob).url()?;
        let response = self
            .blob_client(dest_container, dest_blob)
            .copy(source_url)
            .await
            .map_err(|e| classify(e, dest_container, Some(dest_blob)))?;
        Ok(CopyOperation {
            id: response.copy_id.to_string(),
            status: copy_status(response.copy_status),
        })
    }

    async fn get_copy_status(&self, container: &str, blob: &str) -> Result<Option<CopyOperation>> {
        Ok(self.get_blob_properties(container, blob).await?.copy)
    }

    async fn abort_copy(&self, container: &str, blob: &str, copy_id: &str) -> Result<()> {
        let copy_id: CopyId = copy_id.parse().map_err(|_| GatewayError::CopyIdMismatch {
            blob: blob.to_string(),
            given: copy_id.to_string(),
        })?;
        let mut url = self.blob_client(container, blob).url()?;
        url.query_pairs_mut()
            .append_pair("comp", "copy")
            .append_pair("copyid", &copy_id.to_string());
        let mut headers = Headers::new();
        headers.insert(COPY_ACTION, "abort");
        self.put_raw(url, headers, None)
            .await
            .map_err(|e| classify(e, container, Some(blob)))?;
        debug!("azure: aborted copy {} into {}/{}", copy_id, container, blob);
        Ok(())
    }

    async fn get_service_properties(&self) -> Result<ServiceProperties> {
        let response = self.service.get_properties().await?;
        let properties = response.properties;
        Ok(ServiceProperties {
            logging: properties.logging.as_ref().map(logging_settings).unwrap_or_default(),
            cors: properties
                .cors
                .map(|cors| cors.items.iter().map(cors_rule).collect())
                .unwrap_or_default(),
        })
    }

    async fn set_service_properties(&self, properties: &ServiceProperties) -> Result<()> {
        let mut url = self.service.url()?;
        url.query_pairs_mut()
            .append_pair("restype", "service")
            .append_pair("comp", "properties");
        let mut headers = Headers::new();
        headers.insert(CONTENT_TYPE, "application/xml");
        let body = Bytes::from(service_properties_xml(properties));
        self.put_raw(url, headers, Some(body)).await?;
        Ok(())
    }
}
