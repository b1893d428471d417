/// Blob scenarios: block, append and page round trips, snapshots, copies,
/// blob properties and metadata

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use super::{sample_content, LifecycleScenario, ScenarioContext};
use crate::error::{GatewayError, ScenarioError, StepExt};
use crate::gateway::*;

const BLOCK_CONTAINER_PREFIX: &str = "blockblobcontainer";
const IMAGE_BLOB: &str = "HelloWorld.png";

/// Stages content as blocks of at most `block_size` bytes plus one block that
/// is never committed, commits the rest and checks the committed list and
/// the downloaded content.
pub struct BlockBlobRoundTrip {
    block_size: usize,
}

impl BlockBlobRoundTrip {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }
}

#[async_trait]
impl LifecycleScenario for BlockBlobRoundTrip {
    fn name(&self) -> &'static str {
        "block_blob_round_trip"
    }

    fn container_prefixes(&self) -> &'static [&'static str] {
        &[BLOCK_CONTAINER_PREFIX]
    }

    async fn exercise(&self, ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
        let gateway = ctx.gateway;
        let container = ctx.create_container(BLOCK_CONTAINER_PREFIX).await?;

        // three and a half blocks, so the last block is short
        let content = sample_content(self.block_size * 3 + self.block_size / 2, 0x5A);
        let mut block_ids = Vec::new();
        for chunk in content.chunks(self.block_size) {
            let block_id = ctx.names.suffix();
            gateway
                .stage_block(&container, IMAGE_BLOB, &block_id, Bytes::copy_from_slice(chunk))
                .await
                .step("stage block")?;
            block_ids.push(block_id);
        }
        let orphan = ctx.names.suffix();
        gateway
            .stage_block(&container, IMAGE_BLOB, &orphan, sample_content(64, 0xA5))
            .await
            .step("stage uncommitted block")?;

        info!("Committing {} blocks to {}/{}", block_ids.len(), container, IMAGE_BLOB);
        gateway
            .commit_block_list(&container, IMAGE_BLOB, &block_ids)
            .await
            .step("commit block list")?;

        let listing = gateway
            .list_blocks(&container, IMAGE_BLOB, BlockListFilter::All)
            .await
            .step("list blocks")?;
        let committed: Vec<String> = listing.committed.iter().map(|block| block.id.clone()).collect();
        ctx.report
            .check_eq("committed blocks listed in commit order", &committed, &block_ids);
        ctx.report.check(
            "blocks left out of the commit are discarded",
            listing.uncommitted.is_empty(),
            || format!("{} uncommitted block(s) remain", listing.uncommitted.len()),
        );
        ctx.report.check(
            "committed blocks respect the block size",
            listing.committed.iter().all(|block| block.size as usize <= self.block_size),
            || format!("a block exceeds {} bytes", self.block_size),
        );

        let blobs = gateway.list_blobs(&container, false).await.step("list blobs")?;
        ctx.report.check(
            "block blob is listed",
            blobs.iter().any(|blob| blob.name == IMAGE_BLOB && blob.kind == BlobKind::Block),
            || format!("listing was {:?}", blobs),
        );

        let downloaded = gateway
            .get_blob(&container, IMAGE_BLOB, &ReadOptions::default())
            .await
            .step("download blob")?;
        ctx.report
            .check_bytes("committed content round-trips", &downloaded, &content);

        gateway
            .delete_blob(&container, IMAGE_BLOB, DeleteSnapshots::None)
            .await
            .step("delete blob")?;
        let blobs = gateway.list_blobs(&container, false).await.step("list blobs")?;
        ctx.report
            .check("deleted blob is gone", blobs.is_empty(), || format!("listing was {:?}", blobs));
        Ok(())
    }
}

/// Appends chunks one by one, checking after each that the blob only grew
pub struct AppendBlobRoundTrip;

#[async_trait]
impl LifecycleScenario for AppendBlobRoundTrip {
    fn name(&self) -> &'static str {
        "append_blob_round_trip"
    }

    fn container_prefixes(&self) -> &'static [&'static str] {
        &["appendblobs"]
    }

    async fn exercise(&self, ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
        const BLOB: &str = "HelloAppendBlobWorld.txt";
        const CHUNKS: [&str; 2] = ["Hello Append Blob world!;", "Hello Again Append Blob world!"];

        let gateway = ctx.gateway;
        let container = ctx.create_container("appendblobs").await?;
        gateway
            .create_append_blob(&container, BLOB)
            .await
            .step("create append blob")?;

        let mut expected: Vec<u8> = Vec::new();
        for chunk in CHUNKS {
            let length = gateway
                .append_block(&container, BLOB, Bytes::from_static(chunk.as_bytes()))
                .await
                .step("append block")?;
            let previous = expected.len();
            expected.extend_from_slice(chunk.as_bytes());
            ctx.report
                .check_eq("append reports the new length", &length, &(expected.len() as u64));

            let current = gateway
                .get_blob(&container, BLOB, &ReadOptions::default())
                .await
                .step("read append blob")?;
            ctx.report.check_bytes(
                "earlier appends are unchanged",
                &current[..previous.min(current.len())],
                &expected[..previous],
            );
        }

        let blobs = gateway.list_blobs(&container, false).await.step("list blobs")?;
        ctx.report.check(
            "append blob is listed",
            blobs.iter().any(|blob| blob.name == BLOB && blob.kind == BlobKind::Append),
            || format!("listing was {:?}", blobs),
        );

        let content = gateway
            .get_blob(&container, BLOB, &ReadOptions::default())
            .await
            .step("read append blob")?;
        ctx.report
            .check_bytes("content is the appends in order", &content, &expected);

        gateway
            .delete_blob(&container, BLOB, DeleteSnapshots::None)
            .await
            .step("delete blob")?;
        Ok(())
    }
}

/// Writes two separated pages into a 2560-byte page blob, checks the written
/// ranges, the zero-filled hole between them, and a deliberate overwrite
pub struct PageBlobRangeWrite;

#[async_trait]
impl LifecycleScenario for PageBlobRangeWrite {
    fn name(&self) -> &'static str {
        "page_blob_range_write"
    }

    fn container_prefixes(&self) -> &'static [&'static str] {
        &["pageblobs"]
    }

    async fn exercise(&self, ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
        const BLOB: &str = "pageblob";
        const CAPACITY: u64 = 2560;

        let gateway = ctx.gateway;
        let container = ctx.create_container("pageblobs").await?;
        gateway
            .create_page_blob(&container, BLOB, CAPACITY)
            .await
            .step("create page blob")?;

        let first = ByteRange::new(0, 511);
        let second = ByteRange::new(1024, 1535);
        let c1 = sample_content(PAGE_ALIGNMENT as usize, 0x11);
        let c2 = sample_content(PAGE_ALIGNMENT as usize, 0x22);
        gateway
            .write_pages(&container, BLOB, first, c1.clone())
            .await
            .step("write pages")?;
        gateway
            .write_pages(&container, BLOB, second, c2.clone())
            .await
            .step("write pages")?;

        let ranges = gateway
            .list_page_ranges(&container, BLOB, Some(ByteRange::new(0, 1536)))
            .await
            .step("list page ranges")?;
        ctx.report
            .check_eq("only written ranges are listed", &ranges, &vec![first, second]);

        for (range, written) in [(first, &c1), (second, &c2)] {
            let data = gateway
                .get_blob(&container, BLOB, &ReadOptions::range(range))
                .await
                .step("read page range")?;
            ctx.report
                .check_bytes(&format!("range {} reads back", range), &data, written);
        }

        let hole = gateway
            .get_blob(&container, BLOB, &ReadOptions::range(ByteRange::new(512, 1023)))
            .await
            .step("read unwritten range")?;
        ctx.report
            .check_bytes("unwritten pages read as zeros", &hole, &[0u8; PAGE_ALIGNMENT as usize]);

        let mut expected = vec![0u8; CAPACITY as usize];
        expected[..512].copy_from_slice(&c1);
        expected[1024..1536].copy_from_slice(&c2);
        let full = gateway
            .get_blob(&container, BLOB, &ReadOptions::default())
            .await
            .step("read page blob")?;
        ctx.report
            .check_bytes("full read places pages at their offsets", &full, &expected);

        // overwrite the second page in place
        let c3 = sample_content(PAGE_ALIGNMENT as usize, 0x33);
        gateway
            .write_pages(&container, BLOB, second, c3.clone())
            .await
            .step("overwrite pages")?;
        let ranges = gateway
            .list_page_ranges(&container, BLOB, None)
            .await
            .step("list page ranges")?;
        ctx.report
            .check_eq("overwrite keeps the range set", &ranges, &vec![first, second]);
        let data = gateway
            .get_blob(&container, BLOB, &ReadOptions::range(second))
            .await
            .step("read page range")?;
        ctx.report
            .check_bytes("overwritten range holds the latest write", &data, &c3);

        gateway
            .delete_blob(&container, BLOB, DeleteSnapshots::None)
            .await
            .step("delete blob")?;
        Ok(())
    }
}

/// Takes a snapshot, rewrites the base blob and checks the snapshot kept the
/// old content; then checks the snapshot-aware delete rules
pub struct SnapshotRoundTrip;

#[async_trait]
impl LifecycleScenario for SnapshotRoundTrip {
    fn name(&self) -> &'static str {
        "snapshot_round_trip"
    }

    fn container_prefixes(&self) -> &'static [&'static str] {
        &["blockblobs"]
    }

    async fn exercise(&self, ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
        let gateway = ctx.gateway;
        let container = ctx.create_container("blockblobs").await?;

        let original = sample_content(2048, 0x01);
        let rewritten = sample_content(1024, 0x02);
        gateway
            .upload_block_blob(&container, IMAGE_BLOB, original.clone(), "image/png")
            .await
            .step("upload blob")?;

        let snapshot = gateway
            .create_snapshot(&container, IMAGE_BLOB)
            .await
            .step("create snapshot")?;
        info!("Created snapshot {} of {}/{}", snapshot, container, IMAGE_BLOB);

        gateway
            .upload_block_blob(&container, IMAGE_BLOB, rewritten.clone(), "image/png")
            .await
            .step("rewrite blob")?;

        let from_snapshot = gateway
            .get_blob(&container, IMAGE_BLOB, &ReadOptions::snapshot(snapshot.clone()))
            .await
            .step("read snapshot")?;
        ctx.report
            .check_bytes("snapshot keeps the content it captured", &from_snapshot, &original);
        let current = gateway
            .get_blob(&container, IMAGE_BLOB, &ReadOptions::default())
            .await
            .step("read blob")?;
        ctx.report
            .check_bytes("base blob has the rewritten content", &current, &rewritten);

        let listed = gateway.list_blobs(&container, true).await.step("list blobs")?;
        ctx.report.check(
            "snapshot is listed",
            listed.iter().any(|item| item.snapshot.as_deref() == Some(snapshot.as_str())),
            || format!("listing was {:?}", listed),
        );

        match gateway
            .delete_blob(&container, IMAGE_BLOB, DeleteSnapshots::None)
            .await
        {
            Err(GatewayError::SnapshotsExist { .. }) => {
                ctx.report.pass("delete without snapshots is refused")
            }
            Ok(()) => {
                ctx.report.fail(
                    "delete without snapshots is refused",
                    "blob was deleted while a snapshot existed".to_string(),
                );
                return Ok(());
            }
            Err(e) => return Err(e).step("delete blob without snapshots"),
        }

        gateway
            .delete_blob(&container, IMAGE_BLOB, DeleteSnapshots::Include)
            .await
            .step("delete blob with snapshots")?;
        let listed = gateway.list_blobs(&container, true).await.step("list blobs")?;
        ctx.report.check(
            "cascade delete leaves no snapshots",
            !listed.iter().any(|item| item.name == IMAGE_BLOB),
            || format!("listing was {:?}", listed),
        );
        Ok(())
    }
}

/// Copies a blob within a container, polling the copy until it is terminal.
/// A copy still pending at the deadline is aborted and reported as a timeout.
pub struct BlobCopy {
    poll_interval: Duration,
    timeout: Duration,
}

impl BlobCopy {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }
}

#[async_trait]
impl LifecycleScenario for BlobCopy {
    fn name(&self) -> &'static str {
        "blob_copy"
    }

    fn container_prefixes(&self) -> &'static [&'static str] {
        &[BLOCK_CONTAINER_PREFIX]
    }

    async fn exercise(&self, ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
        const TARGET: &str = "target.png";

        let gateway = ctx.gateway;
        let container = ctx.create_container(BLOCK_CONTAINER_PREFIX).await?;
        let content = sample_content(4096, 0x44);
        gateway
            .upload_block_blob(&container, IMAGE_BLOB, content.clone(), "image/png")
            .await
            .step("upload source blob")?;

        let copy = gateway
            .start_copy(&container, TARGET, &container, IMAGE_BLOB)
            .await
            .step("start copy")?;
        info!("Copy {} started with status {}", copy.id, copy.status);

        let deadline = Instant::now() + self.timeout;
        let mut status = copy.status;
        while !status.is_terminal() {
            if Instant::now() >= deadline {
                ctx.report.timeout(
                    "copy reaches a terminal status",
                    format!("copy {} still pending after {:?}", copy.id, self.timeout),
                );
                warn!("Aborting copy {} into {}/{}", copy.id, container, TARGET);
                if let Err(e) = gateway.abort_copy(&container, TARGET, &copy.id).await {
                    ctx.report.fail("pending copy is aborted", e.to_string());
                }
                return Ok(());
            }
            sleep(self.poll_interval).await;

            match gateway
                .get_copy_status(&container, TARGET)
                .await
                .step("get copy status")?
            {
                Some(current) if current.id == copy.id => status = current.status,
                other => {
                    ctx.report.fail(
                        "copy status tracks the started copy",
                        format!("expected copy {}, destination reports {:?}", copy.id, other),
                    );
                    return Ok(());
                }
            }
        }

        if !ctx
            .report
            .check_eq("copy completes successfully", &status, &CopyStatus::Success)
        {
            return Ok(());
        }

        let copied = gateway
            .get_blob(&container, TARGET, &ReadOptions::default())
            .await
            .step("read copy")?;
        ctx.report
            .check_bytes("copy has the source content", &copied, &content);

        let info = gateway
            .get_blob_properties(&container, TARGET)
            .await
            .step("get copy properties")?;
        ctx.report.check_eq(
            "copy carries the source content type",
            &info.properties.content_type.as_deref(),
            &Some("image/png"),
        );
        Ok(())
    }
}

/// Full and partial property updates, plus metadata set/get idempotence
pub struct BlobPropertiesAndMetadata;

#[async_trait]
impl LifecycleScenario for BlobPropertiesAndMetadata {
    fn name(&self) -> &'static str {
        "blob_properties_and_metadata"
    }

    fn container_prefixes(&self) -> &'static [&'static str] {
        &[BLOCK_CONTAINER_PREFIX]
    }

    async fn exercise(&self, ctx: &mut ScenarioContext<'_>) -> Result<(), ScenarioError> {
        let gateway = ctx.gateway;
        let container = ctx.create_container(BLOCK_CONTAINER_PREFIX).await?;
        gateway
            .upload_block_blob(&container, IMAGE_BLOB, sample_content(1536, 0x77), "image/png")
            .await
            .step("upload blob")?;

        let info = gateway
            .get_blob_properties(&container, IMAGE_BLOB)
            .await
            .step("get blob properties")?;
        ctx.report.check_eq(
            "uploaded content type is kept",
            &info.properties.content_type.as_deref(),
            &Some("image/png"),
        );

        let full = BlobProperties {
            content_type: Some("application/my-special-format".to_string()),
            content_encoding: Some("utf-16".to_string()),
            content_language: Some("klingon".to_string()),
            cache_control: Some("max-age=1296000".to_string()),
        };
        gateway
            .set_blob_properties(&container, IMAGE_BLOB, &full)
            .await
            .step("set blob properties")?;
        let info = gateway
            .get_blob_properties(&container, IMAGE_BLOB)
            .await
            .step("get blob properties")?;
        ctx.report
            .check_eq("all properties read back as set", &info.properties, &full);

        let partial = BlobProperties {
            cache_control: Some("max-age=60".to_string()),
            ..Default::default()
        };
        gateway
            .set_blob_properties(&container, IMAGE_BLOB, &partial)
            .await
            .step("set blob properties")?;
        let info = gateway
            .get_blob_properties(&container, IMAGE_BLOB)
            .await
            .step("get blob properties")?;
        ctx.report.check_eq(
            "partial update keeps unset properties",
            &info.properties,
            &full.merged(&partial),
        );

        let metadata: Metadata = [
            ("metadatakey1".to_string(), "MetaDataValue1".to_string()),
            ("metadatakey2".to_string(), "MetaDataValue2".to_string()),
        ]
        .into_iter()
        .collect();
        for attempt in ["blob metadata reads back as set", "blob metadata set is idempotent"] {
            gateway
                .set_blob_metadata(&container, IMAGE_BLOB, &metadata)
                .await
                .step("set blob metadata")?;
            let current = gateway
                .get_blob_metadata(&container, IMAGE_BLOB)
                .await
                .step("get blob metadata")?;
            ctx.report.check_eq(attempt, &current, &metadata);
        }

        gateway
            .delete_blob(&container, IMAGE_BLOB, DeleteSnapshots::None)
            .await
            .step("delete blob")?;
        Ok(())
    }
}
