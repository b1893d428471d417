/// InMemoryGateway: a process-local blob service
///
/// Implements the full `StorageGateway` contract in memory: block staging and
/// commit, append-only blobs, sparse page blobs, snapshots, asynchronous
/// copies and account-wide service properties. Used for emulated runs and as
/// the backing store of the test suite.
///
/// Faults can be injected per operation name (the trait method name, e.g.
/// `"delete_container"`) to drive transport errors and corrupted reads.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::mapref::one::{Ref, RefMut};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::gateway::*;

/// Azure's limit for a single append block
pub const MAX_APPEND_BLOCK_SIZE: usize = 4 * 1024 * 1024;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const SNAPSHOT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

/// How long a started copy stays pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyLatency {
    /// Copies complete synchronously inside `start_copy`
    Immediate,
    /// The first `n` status polls report pending, the next one completes it
    AfterPolls(u32),
    /// Copies never leave the pending state unless aborted
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The operation fails with a transport error
    Fail,
    /// Reads return wrong data (`get_blob` flips its first byte,
    /// `get_container_acl` always reports private access)
    Corrupt,
}

#[derive(Debug, Clone)]
struct SnapshotState {
    content: Vec<u8>,
}

#[derive(Debug, Clone)]
struct CopyState {
    id: String,
    status: CopyStatus,
    pending_content: Vec<u8>,
    /// `None` never completes
    polls_remaining: Option<u32>,
}

#[derive(Debug, Clone)]
struct BlobState {
    kind: BlobKind,
    /// A block blob with only staged blocks is not visible yet
    committed: bool,
    content: Vec<u8>,
    pages: Vec<ByteRange>,
    staged: Vec<(String, Bytes)>,
    committed_blocks: Vec<(String, Bytes)>,
    metadata: Metadata,
    properties: BlobProperties,
    snapshots: BTreeMap<String, SnapshotState>,
    copy: Option<CopyState>,
}

impl BlobState {
    fn new(kind: BlobKind) -> Self {
        Self {
            kind,
            committed: true,
            content: Vec::new(),
            pages: Vec::new(),
            staged: Vec::new(),
            committed_blocks: Vec::new(),
            metadata: Metadata::new(),
            properties: BlobProperties {
                content_type: Some(DEFAULT_CONTENT_TYPE.to_string()),
                ..Default::default()
            },
            snapshots: BTreeMap::new(),
            copy: None,
        }
    }

    fn expect_kind(&self, blob: &str, expected: BlobKind) -> Result<()> {
        if self.kind != expected {
            return Err(GatewayError::InvalidBlobType {
                blob: blob.to_string(),
                expected: expected.to_string(),
                actual: self.kind.to_string(),
            });
        }
        Ok(())
    }

    fn copy_pending(&self) -> bool {
        matches!(&self.copy, Some(copy) if copy.status == CopyStatus::Pending)
    }

    /// Inserts `range` into the written-page set, merging neighbours
    fn mark_written(&mut self, range: ByteRange) {
        self.pages.push(range);
        self.pages.sort();

        let mut merged: Vec<ByteRange> = Vec::with_capacity(self.pages.len());
        for next in self.pages.drain(..) {
            match merged.last_mut() {
                Some(last) if next.start <= last.end + 1 => last.end = last.end.max(next.end),
                _ => merged.push(next),
            }
        }
        self.pages = merged;
    }
}

#[derive(Debug)]
struct ContainerState {
    metadata: Metadata,
    access: AccessLevel,
    last_modified: String,
    etag: String,
    blobs: BTreeMap<String, BlobState>,
}

pub struct InMemoryGateway {
    containers: DashMap<String, ContainerState>,
    service: RwLock<ServiceProperties>,
    faults: RwLock<HashMap<&'static str, Fault>>,
    copy_latency: CopyLatency,
    sequence: AtomicU64,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            containers: DashMap::new(),
            service: RwLock::new(ServiceProperties::default()),
            faults: RwLock::new(HashMap::new()),
            copy_latency: CopyLatency::Immediate,
            sequence: AtomicU64::new(1),
        }
    }

    pub fn with_copy_latency(mut self, latency: CopyLatency) -> Self {
        self.copy_latency = latency;
        self
    }

    pub fn with_service_properties(self, properties: ServiceProperties) -> Self {
        *self.service.write() = properties;
        self
    }

    /// Injects `fault` into every later call of `operation`
    pub fn inject(&self, operation: &'static str, fault: Fault) {
        self.faults.write().insert(operation, fault);
    }

    pub fn clear_faults(&self) {
        self.faults.write().clear();
    }

    /// Number of containers currently held, whatever their name
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        match self.faults.read().get(operation) {
            Some(Fault::Fail) => Err(GatewayError::Transport(format!(
                "injected failure in {operation}"
            ))),
            _ => Ok(()),
        }
    }

    fn corrupted(&self, operation: &'static str) -> bool {
        matches!(self.faults.read().get(operation), Some(Fault::Corrupt))
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn touch(&self, state: &mut ContainerState) {
        state.last_modified = Utc::now().to_rfc2822();
        state.etag = format!("\"0x{:016X}\"", self.next_sequence());
    }

    fn container(&self, container: &str) -> Result<Ref<'_, String, ContainerState>> {
        self.containers
            .get(container)
            .ok_or_else(|| GatewayError::ContainerNotFound {
                container: container.to_string(),
            })
    }

    fn container_mut(&self, container: &str) -> Result<RefMut<'_, String, ContainerState>> {
        self.containers
            .get_mut(container)
            .ok_or_else(|| GatewayError::ContainerNotFound {
                container: container.to_string(),
            })
    }

    /// Runs `f` against a visible blob
    fn with_blob<T>(&self, container: &str, blob: &str, f: impl FnOnce(&BlobState) -> Result<T>) -> Result<T> {
        let state = self.container(container)?;
        let found = state
            .blobs
            .get(blob)
            .filter(|found| found.committed)
            .ok_or_else(|| blob_not_found(container, blob))?;
        f(found)
    }

    /// Runs `f` against a visible blob, mutably
    fn with_blob_mut<T>(
        &self,
        container: &str,
        blob: &str,
        f: impl FnOnce(&mut BlobState) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.container_mut(container)?;
        let found = state
            .blobs
            .get_mut(blob)
            .filter(|found| found.committed)
            .ok_or_else(|| blob_not_found(container, blob))?;
        f(found)
    }

    /// Creates `blob` as `kind`, replacing an existing blob of the same kind.
    /// Snapshots of the replaced blob survive.
    fn put_blob(&self, container: &str, blob: &str, fresh: BlobState) -> Result<()> {
        let mut state = self.container_mut(container)?;
        let fresh = match state.blobs.remove(blob) {
            Some(existing) if existing.committed && existing.kind != fresh.kind => {
                let err = GatewayError::InvalidBlobType {
                    blob: blob.to_string(),
                    expected: existing.kind.to_string(),
                    actual: fresh.kind.to_string(),
                };
                state.blobs.insert(blob.to_string(), existing);
                return Err(err);
            }
            Some(existing) => BlobState {
                snapshots: existing.snapshots,
                ..fresh
            },
            None => fresh,
        };
        state.blobs.insert(blob.to_string(), fresh);
        Ok(())
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn blob_not_found(container: &str, blob: &str) -> GatewayError {
    GatewayError::BlobNotFound {
        container: container.to_string(),
        blob: blob.to_string(),
    }
}

fn read_range(content: &[u8], range: Option<ByteRange>) -> Result<Vec<u8>> {
    let Some(range) = range else {
        return Ok(content.to_vec());
    };
    if range.is_empty() || range.start >= content.len() as u64 {
        return Err(GatewayError::InvalidRange {
            reason: format!("{} is outside a blob of {} bytes", range, content.len()),
        });
    }
    let end = range.end.min(content.len() as u64 - 1);
    Ok(content[range.start as usize..=end as usize].to_vec())
}

#[async_trait]
impl StorageGateway for InMemoryGateway {
    async fn create_container(&self, container: &str) -> Result<()> {
        self.check("create_container")?;
        if self.containers.contains_key(container) {
            return Err(GatewayError::ContainerAlreadyExists {
                container: container.to_string(),
            });
        }
        let mut state = ContainerState {
            metadata: Metadata::new(),
            access: AccessLevel::Private,
            last_modified: String::new(),
            etag: String::new(),
            blobs: BTreeMap::new(),
        };
        self.touch(&mut state);
        self.containers.insert(container.to_string(), state);
        debug!("memory: created container {}", container);
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<()> {
        self.check("delete_container")?;
        self.containers
            .remove(container)
            .map(|_| debug!("memory: deleted container {}", container))
            .ok_or_else(|| GatewayError::ContainerNotFound {
                container: container.to_string(),
            })
    }

    async fn list_containers(&self, prefix: &str) -> Result<Vec<String>> {
        self.check("list_containers")?;
        let mut names: Vec<String> = self
            .containers
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn get_container_metadata(&self, container: &str) -> Result<Metadata> {
        self.check("get_container_metadata")?;
        Ok(self.container(container)?.metadata.clone())
    }

    async fn set_container_metadata(&self, container: &str, metadata: &Metadata) -> Result<()> {
        self.check("set_container_metadata")?;
        let mut state = self.container_mut(container)?;
        state.metadata = metadata.clone();
        self.touch(&mut state);
        Ok(())
    }

    async fn get_container_properties(&self, container: &str) -> Result<ContainerProperties> {
        self.check("get_container_properties")?;
        let state = self.container(container)?;
        Ok(ContainerProperties {
            last_modified: Some(state.last_modified.clone()),
            etag: Some(state.etag.clone()),
            access: state.access,
        })
    }

    async fn get_container_acl(&self, container: &str) -> Result<AccessLevel> {
        self.check("get_container_acl")?;
        let access = self.container(container)?.access;
        if self.corrupted("get_container_acl") {
            return Ok(AccessLevel::Private);
        }
        Ok(access)
    }

    async fn set_container_acl(&self, container: &str, access: AccessLevel) -> Result<()> {
        self.check("set_container_acl")?;
        let mut state = self.container_mut(container)?;
        state.access = access;
        self.touch(&mut state);
        Ok(())
    }

    async fn list_blobs(&self, container: &str, include_snapshots: bool) -> Result<Vec<BlobItem>> {
        self.check("list_blobs")?;
        let state = self.container(container)?;
        let mut items = Vec::new();
        for (name, blob) in state.blobs.iter() {
            if include_snapshots {
                items.extend(blob.snapshots.keys().map(|token| BlobItem {
                    name: name.clone(),
                    kind: blob.kind,
                    snapshot: Some(token.clone()),
                }));
            }
            if blob.committed {
                items.push(BlobItem {
                    name: name.clone(),
                    kind: blob.kind,
                    snapshot: None,
                });
            }
        }
        Ok(items)
    }

    async fn get_blob(&self, container: &str, blob: &str, options: &ReadOptions) -> Result<Bytes> {
        self.check("get_blob")?;
        let mut data = self.with_blob(container, blob, |state| {
            let content = match &options.snapshot {
                Some(token) => {
                    &state
                        .snapshots
                        .get(token)
                        .ok_or_else(|| GatewayError::SnapshotNotFound {
                            container: container.to_string(),
                            blob: blob.to_string(),
                            snapshot: token.clone(),
                        })?
                        .content
                }
                None if state.copy_pending() => {
                    return Err(GatewayError::CopyPending {
                        blob: blob.to_string(),
                    })
                }
                None => &state.content,
            };
            read_range(content, options.range)
        })?;

        if self.corrupted("get_blob") {
            if let Some(first) = data.first_mut() {
                *first ^= 0xFF;
            }
        }
        Ok(Bytes::from(data))
    }

    async fn delete_blob(&self, container: &str, blob: &str, snapshots: DeleteSnapshots) -> Result<()> {
        self.check("delete_blob")?;
        let mut state = self.container_mut(container)?;
        let Some(found) = state.blobs.get_mut(blob).filter(|found| found.committed) else {
            return Err(blob_not_found(container, blob));
        };

        match snapshots {
            DeleteSnapshots::None if !found.snapshots.is_empty() => Err(GatewayError::SnapshotsExist {
                container: container.to_string(),
                blob: blob.to_string(),
                count: found.snapshots.len(),
            }),
            DeleteSnapshots::Only => {
                found.snapshots.clear();
                Ok(())
            }
            DeleteSnapshots::None | DeleteSnapshots::Include => {
                state.blobs.remove(blob);
                Ok(())
            }
        }
    }

    async fn get_blob_metadata(&self, container: &str, blob: &str) -> Result<Metadata> {
        self.check("get_blob_metadata")?;
        self.with_blob(container, blob, |state| Ok(state.metadata.clone()))
    }

    async fn set_blob_metadata(&self, container: &str, blob: &str, metadata: &Metadata) -> Result<()> {
        self.check("set_blob_metadata")?;
        self.with_blob_mut(container, blob, |state| {
            state.metadata = metadata.clone();
            Ok(())
        })
    }

    async fn get_blob_properties(&self, container: &str, blob: &str) -> Result<BlobInfo> {
        self.check("get_blob_properties")?;
        self.with_blob(container, blob, |state| {
            Ok(BlobInfo {
                kind: state.kind,
                content_length: state.content.len() as u64,
                properties: state.properties.clone(),
                copy: state.copy.as_ref().map(|copy| CopyOperation {
                    id: copy.id.clone(),
                    status: copy.status,
                }),
            })
        })
    }

    async fn set_blob_properties(&self, container: &str, blob: &str, update: &BlobProperties) -> Result<()> {
        self.check("set_blob_properties")?;
        self.with_blob_mut(container, blob, |state| {
            state.properties = state.properties.merged(update);
            Ok(())
        })
    }

    async fn upload_block_blob(&self, container: &str, blob: &str, content: Bytes, content_type: &str) -> Result<()> {
        self.check("upload_block_blob")?;
        let mut fresh = BlobState::new(BlobKind::Block);
        fresh.content = content.to_vec();
        fresh.properties.content_type = Some(content_type.to_string());
        self.put_blob(container, blob, fresh)
    }

    async fn stage_block(&self, container: &str, blob: &str, block_id: &str, content: Bytes) -> Result<()> {
        self.check("stage_block")?;
        let mut state = self.container_mut(container)?;
        let target = state.blobs.entry(blob.to_string()).or_insert_with(|| BlobState {
            committed: false,
            ..BlobState::new(BlobKind::Block)
        });
        target.expect_kind(blob, BlobKind::Block)?;

        match target.staged.iter_mut().find(|(id, _)| id == block_id) {
            Some(existing) => existing.1 = content,
            None => target.staged.push((block_id.to_string(), content)),
        }
        Ok(())
    }

    async fn commit_block_list(&self, container: &str, blob: &str, block_ids: &[String]) -> Result<()> {
        self.check("commit_block_list")?;
        let mut state = self.container_mut(container)?;
        let target = state.blobs.entry(blob.to_string()).or_insert_with(|| BlobState {
            committed: false,
            ..BlobState::new(BlobKind::Block)
        });
        target.expect_kind(blob, BlobKind::Block)?;

        let mut blocks = Vec::with_capacity(block_ids.len());
        for id in block_ids {
            let data = target
                .staged
                .iter()
                .chain(target.committed_blocks.iter())
                .find(|(candidate, _)| candidate == id)
                .map(|(_, data)| data.clone())
                .ok_or_else(|| GatewayError::InvalidBlockList {
                    blob: blob.to_string(),
                    block_id: id.clone(),
                })?;
            blocks.push((id.clone(), data));
        }

        target.content = blocks.iter().flat_map(|(_, data)| data.iter().copied()).collect();
        target.committed_blocks = blocks;
        target.staged.clear();
        target.committed = true;
        debug!("memory: committed {} block(s) to {}/{}", block_ids.len(), container, blob);
        Ok(())
    }

    async fn list_blocks(&self, container: &str, blob: &str, filter: BlockListFilter) -> Result<BlockListing> {
        self.check("list_blocks")?;
        let state = self.container(container)?;
        let target = state.blobs.get(blob).ok_or_else(|| blob_not_found(container, blob))?;
        target.expect_kind(blob, BlobKind::Block)?;

        let describe = |blocks: &[(String, Bytes)]| {
            blocks
                .iter()
                .map(|(id, data)| BlockInfo {
                    id: id.clone(),
                    size: data.len() as u64,
                })
                .collect::<Vec<_>>()
        };

        let mut listing = BlockListing::default();
        if matches!(filter, BlockListFilter::Committed | BlockListFilter::All) {
            listing.committed = describe(target.committed_blocks.as_slice());
        }
        if matches!(filter, BlockListFilter::Uncommitted | BlockListFilter::All) {
            listing.uncommitted = describe(target.staged.as_slice());
        }
        Ok(listing)
    }

    async fn create_append_blob(&self, container: &str, blob: &str) -> Result<()> {
        self.check("create_append_blob")?;
        self.put_blob(container, blob, BlobState::new(BlobKind::Append))
    }

    async fn append_block(&self, container: &str, blob: &str, content: Bytes) -> Result<u64> {
        self.check("append_block")?;
        if content.len() > MAX_APPEND_BLOCK_SIZE {
            return Err(GatewayError::InvalidRange {
                reason: format!(
                    "append block of {} bytes exceeds {} bytes",
                    content.len(),
                    MAX_APPEND_BLOCK_SIZE
                ),
            });
        }
        self.with_blob_mut(container, blob, |state| {
            state.expect_kind(blob, BlobKind::Append)?;
            state.content.extend_from_slice(&content);
            Ok(state.content.len() as u64)
        })
    }

    async fn create_page_blob(&self, container: &str, blob: &str, capacity: u64) -> Result<()> {
        self.check("create_page_blob")?;
        if capacity == 0 || capacity % PAGE_ALIGNMENT != 0 {
            return Err(GatewayError::InvalidRange {
                reason: format!("page blob capacity {} is not a positive multiple of {}", capacity, PAGE_ALIGNMENT),
            });
        }
        let mut fresh = BlobState::new(BlobKind::Page);
        fresh.content = vec![0u8; capacity as usize];
        self.put_blob(container, blob, fresh)
    }

    async fn write_pages(&self, container: &str, blob: &str, range: ByteRange, content: Bytes) -> Result<()> {
        self.check("write_pages")?;
        self.with_blob_mut(container, blob, |state| {
            state.expect_kind(blob, BlobKind::Page)?;
            if range.is_empty() || !range.is_page_aligned() {
                return Err(GatewayError::InvalidRange {
                    reason: format!("{} is not aligned to {}-byte pages", range, PAGE_ALIGNMENT),
                });
            }
            if range.end >= state.content.len() as u64 {
                return Err(GatewayError::InvalidRange {
                    reason: format!("{} exceeds capacity {}", range, state.content.len()),
                });
            }
            if content.len() as u64 != range.len() {
                return Err(GatewayError::InvalidRange {
                    reason: format!("{} bytes supplied for {} ({} bytes)", content.len(), range, range.len()),
                });
            }

            state.content[range.start as usize..=range.end as usize].copy_from_slice(&content);
            state.mark_written(range);
            Ok(())
        })
    }

    async fn list_page_ranges(&self, container: &str, blob: &str, bounds: Option<ByteRange>) -> Result<Vec<ByteRange>> {
        self.check("list_page_ranges")?;
        self.with_blob(container, blob, |state| {
            state.expect_kind(blob, BlobKind::Page)?;
            let ranges = match bounds {
                None => state.pages.clone(),
                Some(bounds) => state
                    .pages
                    .iter()
                    .filter_map(|written| {
                        let start = written.start.max(bounds.start);
                        let end = written.end.min(bounds.end);
                        (start <= end).then(|| ByteRange::new(start, end))
                    })
                    .collect(),
            };
            Ok(ranges)
        })
    }

    async fn create_snapshot(&self, container: &str, blob: &str) -> Result<String> {
        self.check("create_snapshot")?;
        self.with_blob_mut(container, blob, |state| {
            let mut at = Utc::now();
            let token = loop {
                let candidate = at.format(SNAPSHOT_FORMAT).to_string();
                if !state.snapshots.contains_key(&candidate) {
                    break candidate;
                }
                at = at + chrono::Duration::nanoseconds(1);
            };
            state.snapshots.insert(
                token.clone(),
                SnapshotState {
                    content: state.content.clone(),
                },
            );
            debug!("memory: snapshot {} of {}/{}", token, container, blob);
            Ok(token)
        })
    }

    async fn start_copy(
        &self,
        dest_container: &str,
        dest_blob: &str,
        source_container: &str,
        source_blob: &str,
    ) -> Result<CopyOperation> {
        self.check("start_copy")?;
        // Source and destination may share a container: read first, release
        // the shard lock, then write.
        let source = self.with_blob(source_container, source_blob, |state| {
            if state.copy_pending() {
                return Err(GatewayError::CopyPending {
                    blob: source_blob.to_string(),
                });
            }
            Ok(state.clone())
        })?;

        let id = format!("copy-{:08}", self.next_sequence());
        let (status, polls_remaining) = match self.copy_latency {
            CopyLatency::Immediate => (CopyStatus::Success, Some(0)),
            CopyLatency::AfterPolls(polls) => (CopyStatus::Pending, Some(polls)),
            CopyLatency::Never => (CopyStatus::Pending, None),
        };

        let mut fresh = BlobState::new(source.kind);
        fresh.properties = source.properties.clone();
        fresh.metadata = source.metadata.clone();
        fresh.pages = source.pages.clone();
        fresh.committed_blocks = source.committed_blocks.clone();
        if status == CopyStatus::Success {
            fresh.content = source.content.clone();
        }
        fresh.copy = Some(CopyState {
            id: id.clone(),
            status,
            pending_content: source.content,
            polls_remaining,
        });

        // a copy never changes the kind of an existing destination
        self.put_blob(dest_container, dest_blob, fresh)?;

        Ok(CopyOperation { id, status })
    }

    async fn get_copy_status(&self, container: &str, blob: &str) -> Result<Option<CopyOperation>> {
        self.check("get_copy_status")?;
        self.with_blob_mut(container, blob, |state| {
            let Some(copy) = state.copy.as_mut() else {
                return Ok(None);
            };
            if copy.status == CopyStatus::Pending {
                match copy.polls_remaining {
                    Some(0) => {
                        copy.status = CopyStatus::Success;
                        state.content = std::mem::take(&mut copy.pending_content);
                    }
                    Some(ref mut remaining) => *remaining -= 1,
                    None => {}
                }
            }
            Ok(state.copy.as_ref().map(|copy| CopyOperation {
                id: copy.id.clone(),
                status: copy.status,
            }))
        })
    }

    async fn abort_copy(&self, container: &str, blob: &str, copy_id: &str) -> Result<()> {
        self.check("abort_copy")?;
        self.with_blob_mut(container, blob, |state| {
            let copy = match state.copy.as_mut() {
                Some(copy) if copy.status == CopyStatus::Pending => copy,
                _ => {
                    return Err(GatewayError::NoPendingCopy {
                        blob: blob.to_string(),
                    })
                }
            };
            if copy.id != copy_id {
                return Err(GatewayError::CopyIdMismatch {
                    blob: blob.to_string(),
                    given: copy_id.to_string(),
                });
            }
            copy.status = CopyStatus::Aborted;
            copy.pending_content.clear();
            state.content.clear();
            Ok(())
        })
    }

    async fn get_service_properties(&self) -> Result<ServiceProperties> {
        self.check("get_service_properties")?;
        Ok(self.service.read().clone())
    }

    async fn set_service_properties(&self, properties: &ServiceProperties) -> Result<()> {
        self.check("set_service_properties")?;
        *self.service.write() = properties.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    fn gateway_with_container(name: &str) -> InMemoryGateway {
        let gateway = InMemoryGateway::new();
        block_on(gateway.create_container(name)).unwrap();
        gateway
    }

    #[test]
    fn test_container_lifecycle() {
        let gateway = gateway_with_container("alpha1");
        block_on(gateway.create_container("alpha2")).unwrap();
        block_on(gateway.create_container("beta1")).unwrap();

        assert!(matches!(
            block_on(gateway.create_container("alpha1")),
            Err(GatewayError::ContainerAlreadyExists { .. })
        ));
        assert_eq!(block_on(gateway.list_containers("alpha")).unwrap(), vec!["alpha1", "alpha2"]);

        block_on(gateway.delete_container("alpha1")).unwrap();
        assert!(block_on(gateway.delete_container("alpha1")).unwrap_err().is_not_found());
        assert_eq!(gateway.container_count(), 2);
    }

    #[test]
    fn test_container_etag_changes_on_metadata_write() {
        let gateway = gateway_with_container("c");
        let before = block_on(gateway.get_container_properties("c")).unwrap();

        let mut metadata = Metadata::new();
        metadata.insert("k".into(), "v".into());
        block_on(gateway.set_container_metadata("c", &metadata)).unwrap();

        let after = block_on(gateway.get_container_properties("c")).unwrap();
        assert_ne!(before.etag, after.etag);
        assert_eq!(block_on(gateway.get_container_metadata("c")).unwrap(), metadata);
    }

    #[test]
    fn test_uncommitted_blocks_are_discarded() {
        let gateway = gateway_with_container("c");
        block_on(gateway.stage_block("c", "b", "aaaa", Bytes::from_static(b"hello "))).unwrap();
        block_on(gateway.stage_block("c", "b", "bbbb", Bytes::from_static(b"world"))).unwrap();
        block_on(gateway.stage_block("c", "b", "zzzz", Bytes::from_static(b"orphan"))).unwrap();

        // Staged-only blobs are invisible
        assert!(block_on(gateway.list_blobs("c", false)).unwrap().is_empty());
        assert!(block_on(gateway.get_blob("c", "b", &ReadOptions::default())).is_err());

        let ids = vec!["aaaa".to_string(), "bbbb".to_string()];
        block_on(gateway.commit_block_list("c", "b", &ids)).unwrap();

        let listing = block_on(gateway.list_blocks("c", "b", BlockListFilter::All)).unwrap();
        let committed: Vec<&str> = listing.committed.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(committed, vec!["aaaa", "bbbb"]);
        assert!(listing.uncommitted.is_empty());

        let content = block_on(gateway.get_blob("c", "b", &ReadOptions::default())).unwrap();
        assert_eq!(&content[..], b"hello world");
    }

    #[test]
    fn test_commit_unknown_block_fails() {
        let gateway = gateway_with_container("c");
        block_on(gateway.stage_block("c", "b", "aaaa", Bytes::from_static(b"x"))).unwrap();
        let ids = vec!["aaaa".to_string(), "nope".to_string()];
        assert!(matches!(
            block_on(gateway.commit_block_list("c", "b", &ids)),
            Err(GatewayError::InvalidBlockList { .. })
        ));
    }

    #[test]
    fn test_append_only_extends() {
        let gateway = gateway_with_container("c");
        block_on(gateway.create_append_blob("c", "log")).unwrap();
        assert_eq!(block_on(gateway.append_block("c", "log", Bytes::from_static(b"one;"))).unwrap(), 4);
        assert_eq!(block_on(gateway.append_block("c", "log", Bytes::from_static(b"two"))).unwrap(), 7);

        let content = block_on(gateway.get_blob("c", "log", &ReadOptions::default())).unwrap();
        assert_eq!(&content[..], b"one;two");
    }

    #[test]
    fn test_blob_kind_is_fixed() {
        let gateway = gateway_with_container("c");
        block_on(gateway.create_append_blob("c", "log")).unwrap();

        assert!(matches!(
            block_on(gateway.write_pages("c", "log", ByteRange::new(0, 511), Bytes::from(vec![0u8; 512]))),
            Err(GatewayError::InvalidBlobType { .. })
        ));
        assert!(matches!(
            block_on(gateway.upload_block_blob("c", "log", Bytes::from_static(b"x"), "text/plain")),
            Err(GatewayError::InvalidBlobType { .. })
        ));
        let info = block_on(gateway.get_blob_properties("c", "log")).unwrap();
        assert_eq!(info.kind, BlobKind::Append);
    }

    #[test]
    fn test_page_blob_ranges_and_zero_fill() {
        let gateway = gateway_with_container("pageblobs");
        block_on(gateway.create_page_blob("pageblobs", "pageblob", 2560)).unwrap();

        let c1 = Bytes::from(vec![b'a'; 512]);
        let c2 = Bytes::from(vec![b'b'; 512]);
        block_on(gateway.write_pages("pageblobs", "pageblob", ByteRange::new(0, 511), c1.clone())).unwrap();
        block_on(gateway.write_pages("pageblobs", "pageblob", ByteRange::new(1024, 1535), c2.clone())).unwrap();

        let ranges =
            block_on(gateway.list_page_ranges("pageblobs", "pageblob", Some(ByteRange::new(0, 1536)))).unwrap();
        assert_eq!(ranges, vec![ByteRange::new(0, 511), ByteRange::new(1024, 1535)]);

        let hole = block_on(gateway.get_blob(
            "pageblobs",
            "pageblob",
            &ReadOptions::range(ByteRange::new(512, 1023)),
        ))
        .unwrap();
        assert_eq!(hole.len(), 512);
        assert!(hole.iter().all(|b| *b == 0));

        let full = block_on(gateway.get_blob("pageblobs", "pageblob", &ReadOptions::default())).unwrap();
        assert_eq!(full.len(), 2560);
        assert_eq!(&full[..512], &c1[..]);
        assert_eq!(&full[1024..1536], &c2[..]);
    }

    #[test]
    fn test_adjacent_pages_merge() {
        let gateway = gateway_with_container("c");
        block_on(gateway.create_page_blob("c", "p", 2048)).unwrap();
        block_on(gateway.write_pages("c", "p", ByteRange::new(512, 1023), Bytes::from(vec![1u8; 512]))).unwrap();
        block_on(gateway.write_pages("c", "p", ByteRange::new(0, 511), Bytes::from(vec![2u8; 512]))).unwrap();

        let ranges = block_on(gateway.list_page_ranges("c", "p", None)).unwrap();
        assert_eq!(ranges, vec![ByteRange::new(0, 1023)]);
    }

    #[test]
    fn test_page_writes_are_validated() {
        let gateway = gateway_with_container("c");
        assert!(block_on(gateway.create_page_blob("c", "p", 1000)).is_err());
        block_on(gateway.create_page_blob("c", "p", 1024)).unwrap();

        let page = Bytes::from(vec![0u8; 512]);
        // misaligned
        assert!(block_on(gateway.write_pages("c", "p", ByteRange::new(100, 611), page.clone())).is_err());
        // beyond capacity
        assert!(block_on(gateway.write_pages("c", "p", ByteRange::new(1024, 1535), page.clone())).is_err());
        // length mismatch
        assert!(block_on(gateway.write_pages("c", "p", ByteRange::new(0, 1023), page)).is_err());
    }

    #[test]
    fn test_snapshot_isolation_and_delete_rules() {
        let gateway = gateway_with_container("c");
        block_on(gateway.upload_block_blob("c", "b", Bytes::from_static(b"v1"), "text/plain")).unwrap();
        let token = block_on(gateway.create_snapshot("c", "b")).unwrap();
        block_on(gateway.upload_block_blob("c", "b", Bytes::from_static(b"v2"), "text/plain")).unwrap();

        let old = block_on(gateway.get_blob("c", "b", &ReadOptions::snapshot(token.clone()))).unwrap();
        assert_eq!(&old[..], b"v1");

        assert!(matches!(
            block_on(gateway.delete_blob("c", "b", DeleteSnapshots::None)),
            Err(GatewayError::SnapshotsExist { count: 1, .. })
        ));
        block_on(gateway.delete_blob("c", "b", DeleteSnapshots::Include)).unwrap();
        assert!(block_on(gateway.list_blobs("c", true)).unwrap().is_empty());
    }

    #[test]
    fn test_delete_only_snapshots() {
        let gateway = gateway_with_container("c");
        block_on(gateway.upload_block_blob("c", "b", Bytes::from_static(b"v1"), "text/plain")).unwrap();
        let first = block_on(gateway.create_snapshot("c", "b")).unwrap();
        let second = block_on(gateway.create_snapshot("c", "b")).unwrap();
        assert_ne!(first, second);

        block_on(gateway.delete_blob("c", "b", DeleteSnapshots::Only)).unwrap();
        let items = block_on(gateway.list_blobs("c", true)).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].snapshot, None);
    }

    #[test]
    fn test_copy_after_polls() {
        let gateway = InMemoryGateway::new().with_copy_latency(CopyLatency::AfterPolls(2));
        block_on(gateway.create_container("c")).unwrap();
        block_on(gateway.upload_block_blob("c", "src", Bytes::from_static(b"payload"), "text/plain")).unwrap();

        let copy = block_on(gateway.start_copy("c", "dst", "c", "src")).unwrap();
        assert_eq!(copy.status, CopyStatus::Pending);
        assert!(matches!(
            block_on(gateway.get_blob("c", "dst", &ReadOptions::default())),
            Err(GatewayError::CopyPending { .. })
        ));

        let statuses: Vec<CopyStatus> = (0..3)
            .map(|_| block_on(gateway.get_copy_status("c", "dst")).unwrap().unwrap().status)
            .collect();
        assert_eq!(statuses, vec![CopyStatus::Pending, CopyStatus::Pending, CopyStatus::Success]);

        let content = block_on(gateway.get_blob("c", "dst", &ReadOptions::default())).unwrap();
        assert_eq!(&content[..], b"payload");
    }

    #[test]
    fn test_copy_cannot_change_destination_kind() {
        let gateway = gateway_with_container("c");
        block_on(gateway.upload_block_blob("c", "src", Bytes::from_static(b"payload"), "text/plain")).unwrap();
        block_on(gateway.create_page_blob("c", "dst", 1024)).unwrap();
        block_on(gateway.write_pages("c", "dst", ByteRange::new(0, 511), Bytes::from(vec![7u8; 512]))).unwrap();

        assert!(matches!(
            block_on(gateway.start_copy("c", "dst", "c", "src")),
            Err(GatewayError::InvalidBlobType { .. })
        ));
        let info = block_on(gateway.get_blob_properties("c", "dst")).unwrap();
        assert_eq!(info.kind, BlobKind::Page);
        assert_eq!(info.copy, None);
        let ranges = block_on(gateway.list_page_ranges("c", "dst", None)).unwrap();
        assert_eq!(ranges, vec![ByteRange::new(0, 511)]);
    }

    #[test]
    fn test_abort_requires_matching_copy_id() {
        let gateway = InMemoryGateway::new().with_copy_latency(CopyLatency::Never);
        block_on(gateway.create_container("c")).unwrap();
        block_on(gateway.upload_block_blob("c", "src", Bytes::from_static(b"payload"), "text/plain")).unwrap();
        let copy = block_on(gateway.start_copy("c", "dst", "c", "src")).unwrap();

        assert!(matches!(
            block_on(gateway.abort_copy("c", "dst", "copy-bogus")),
            Err(GatewayError::CopyIdMismatch { .. })
        ));
        block_on(gateway.abort_copy("c", "dst", &copy.id)).unwrap();

        let status = block_on(gateway.get_copy_status("c", "dst")).unwrap().unwrap();
        assert_eq!(status.status, CopyStatus::Aborted);
        assert!(matches!(
            block_on(gateway.abort_copy("c", "dst", &copy.id)),
            Err(GatewayError::NoPendingCopy { .. })
        ));
        let info = block_on(gateway.get_blob_properties("c", "dst")).unwrap();
        assert_eq!(info.content_length, 0);
    }

    #[test]
    fn test_injected_faults() {
        let gateway = gateway_with_container("c");
        block_on(gateway.upload_block_blob("c", "b", Bytes::from_static(b"abc"), "text/plain")).unwrap();

        gateway.inject("get_blob", Fault::Corrupt);
        let content = block_on(gateway.get_blob("c", "b", &ReadOptions::default())).unwrap();
        assert_ne!(&content[..], b"abc");

        gateway.inject("delete_container", Fault::Fail);
        assert!(matches!(
            block_on(gateway.delete_container("c")),
            Err(GatewayError::Transport(_))
        ));

        gateway.clear_faults();
        block_on(gateway.delete_container("c")).unwrap();
    }
}
