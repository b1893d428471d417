/// StorageGateway: the blob service capability set the exerciser drives
///
/// The exerciser never talks to a storage engine directly. Everything goes
/// through this trait, implemented by `InMemoryGateway` for local runs and
/// by `AzureGateway` (feature `azure`) for a real account or Azurite.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;

/// Page blob capacity and write alignment
pub const PAGE_ALIGNMENT: u64 = 512;

pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Private,
    Blob,
    Container,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessLevel::Private => write!(f, "private"),
            AccessLevel::Blob => write!(f, "blob"),
            AccessLevel::Container => write!(f, "container"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobKind {
    Block,
    Append,
    Page,
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobKind::Block => write!(f, "block"),
            BlobKind::Append => write!(f, "append"),
            BlobKind::Page => write!(f, "page"),
        }
    }
}

/// Derived, read-only container attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerProperties {
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub access: AccessLevel,
}

/// The settable blob headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub cache_control: Option<String>,
}

impl BlobProperties {
    /// Applies `update` on top of `self`; fields the update leaves unset keep
    /// their current value.
    pub fn merged(&self, update: &BlobProperties) -> BlobProperties {
        BlobProperties {
            content_type: update.content_type.clone().or_else(|| self.content_type.clone()),
            content_encoding: update
                .content_encoding
                .clone()
                .or_else(|| self.content_encoding.clone()),
            content_language: update
                .content_language
                .clone()
                .or_else(|| self.content_language.clone()),
            cache_control: update.cache_control.clone().or_else(|| self.cache_control.clone()),
        }
    }
}

/// Read-back of a blob's properties, including copy state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub kind: BlobKind,
    pub content_length: u64,
    pub properties: BlobProperties,
    pub copy: Option<CopyOperation>,
}

/// One entry of a container listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobItem {
    pub name: String,
    pub kind: BlobKind,
    /// Set for snapshot entries, `None` for the base blob
    pub snapshot: Option<String>,
}

/// Inclusive byte range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn is_page_aligned(&self) -> bool {
        self.start % PAGE_ALIGNMENT == 0 && (self.end + 1) % PAGE_ALIGNMENT == 0
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Options for a content read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub range: Option<ByteRange>,
    pub snapshot: Option<String>,
}

impl ReadOptions {
    pub fn range(range: ByteRange) -> Self {
        Self {
            range: Some(range),
            snapshot: None,
        }
    }

    pub fn snapshot(token: impl Into<String>) -> Self {
        Self {
            range: None,
            snapshot: Some(token.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteSnapshots {
    /// Fail with `SnapshotsExist` if the blob has snapshots
    None,
    /// Delete the blob and all its snapshots
    Include,
    /// Delete only the snapshots, keep the base blob
    Only,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockListFilter {
    Committed,
    Uncommitted,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub id: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockListing {
    /// Committed blocks, in commit order
    pub committed: Vec<BlockInfo>,
    pub uncommitted: Vec<BlockInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Pending,
    Success,
    Failed,
    Aborted,
}

impl CopyStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CopyStatus::Pending)
    }
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyStatus::Pending => write!(f, "pending"),
            CopyStatus::Success => write!(f, "success"),
            CopyStatus::Failed => write!(f, "failed"),
            CopyStatus::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOperation {
    pub id: String,
    pub status: CopyStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsRule {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub max_age_in_seconds: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub enabled: bool,
    pub days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub version: String,
    pub delete: bool,
    pub read: bool,
    pub write: bool,
    pub retention_policy: RetentionPolicy,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            delete: false,
            read: false,
            write: false,
            retention_policy: RetentionPolicy::default(),
        }
    }
}

/// Account-wide blob service settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProperties {
    pub logging: LoggingSettings,
    pub cors: Vec<CorsRule>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageGateway: Send + Sync {
    // Containers
    async fn create_container(&self, container: &str) -> Result<()>;
    async fn delete_container(&self, container: &str) -> Result<()>;
    async fn list_containers(&self, prefix: &str) -> Result<Vec<String>>;
    async fn get_container_metadata(&self, container: &str) -> Result<Metadata>;
    async fn set_container_metadata(&self, container: &str, metadata: &Metadata) -> Result<()>;
    async fn get_container_properties(&self, container: &str) -> Result<ContainerProperties>;
    async fn get_container_acl(&self, container: &str) -> Result<AccessLevel>;
    async fn set_container_acl(&self, container: &str, access: AccessLevel) -> Result<()>;

    // Blobs, any kind
    async fn list_blobs(&self, container: &str, include_snapshots: bool) -> Result<Vec<BlobItem>>;
    async fn get_blob(&self, container: &str, blob: &str, options: &ReadOptions) -> Result<Bytes>;
    async fn delete_blob(&self, container: &str, blob: &str, snapshots: DeleteSnapshots) -> Result<()>;
    async fn get_blob_metadata(&self, container: &str, blob: &str) -> Result<Metadata>;
    async fn set_blob_metadata(&self, container: &str, blob: &str, metadata: &Metadata) -> Result<()>;
    async fn get_blob_properties(&self, container: &str, blob: &str) -> Result<BlobInfo>;
    /// Partial update: `None` fields keep their current value
    async fn set_blob_properties(
        &self,
        container: &str,
        blob: &str,
        update: &BlobProperties,
    ) -> Result<()>;

    // Block blobs
    async fn upload_block_blob(
        &self,
        container: &str,
        blob: &str,
        content: Bytes,
        content_type: &str,
    ) -> Result<()>;
    async fn stage_block(&self, container: &str, blob: &str, block_id: &str, content: Bytes) -> Result<()>;
    async fn commit_block_list(&self, container: &str, blob: &str, block_ids: &[String]) -> Result<()>;
    async fn list_blocks(&self, container: &str, blob: &str, filter: BlockListFilter) -> Result<BlockListing>;

    // Append blobs
    async fn create_append_blob(&self, container: &str, blob: &str) -> Result<()>;
    /// Returns the blob length after the append
    async fn append_block(&self, container: &str, blob: &str, content: Bytes) -> Result<u64>;

    // Page blobs
    async fn create_page_blob(&self, container: &str, blob: &str, capacity: u64) -> Result<()>;
    async fn write_pages(&self, container: &str, blob: &str, range: ByteRange, content: Bytes) -> Result<()>;
    async fn list_page_ranges(
        &self,
        container: &str,
        blob: &str,
        bounds: Option<ByteRange>,
    ) -> Result<Vec<ByteRange>>;

    // Snapshots and copies
    async fn create_snapshot(&self, container: &str, blob: &str) -> Result<String>;
    async fn start_copy(
        &self,
        dest_container: &str,
        dest_blob: &str,
        source_container: &str,
        source_blob: &str,
    ) -> Result<CopyOperation>;
    async fn get_copy_status(&self, container: &str, blob: &str) -> Result<Option<CopyOperation>>;
    async fn abort_copy(&self, container: &str, blob: &str, copy_id: &str) -> Result<()>;

    // Account-wide service settings
    async fn get_service_properties(&self) -> Result<ServiceProperties>;
    async fn set_service_properties(&self, properties: &ServiceProperties) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_properties_keep_unset_fields() {
        let current = BlobProperties {
            content_type: Some("application/my-special-format".into()),
            content_encoding: Some("utf-16".into()),
            content_language: Some("klingon".into()),
            cache_control: Some("max-age=1296000".into()),
        };
        let update = BlobProperties {
            cache_control: Some("no-cache".into()),
            ..Default::default()
        };

        let merged = current.merged(&update);
        assert_eq!(merged.cache_control.as_deref(), Some("no-cache"));
        assert_eq!(merged.content_type, current.content_type);
        assert_eq!(merged.content_encoding, current.content_encoding);
        assert_eq!(merged.content_language, current.content_language);
    }

    #[test]
    fn test_page_alignment() {
        assert!(ByteRange::new(0, 511).is_page_aligned());
        assert!(ByteRange::new(1024, 1535).is_page_aligned());
        assert!(!ByteRange::new(0, 510).is_page_aligned());
        assert!(!ByteRange::new(100, 611).is_page_aligned());
        assert_eq!(ByteRange::new(1024, 1535).len(), 512);
    }

    #[test]
    fn test_copy_status_terminal() {
        assert!(!CopyStatus::Pending.is_terminal());
        assert!(CopyStatus::Success.is_terminal());
        assert!(CopyStatus::Aborted.is_terminal());
        assert!(CopyStatus::Failed.is_terminal());
    }
}
