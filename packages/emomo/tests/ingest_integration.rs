//! Integration tests for the ingestion pipeline.
//!
//! These tests run the full ingest flow against the in-memory stores:
//! 1. Fetch from a source
//! 2. Normalize and deduplicate by content hash
//! 3. Describe, embed and index
//! 4. Roll back on failure, retry what was left pending

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use emomo::{
    media::content_hash,
    sources::DirectorySource,
    stores::{MemoryMemeRepository, MemoryStores, MemoryVectorStore},
    testing::{gif, png, MockDescriber, MockEmbedder, VecSource},
    CollectionBinding, FetchPage, IngestConfig, IngestOptions, IngestPipeline, MemeItem,
    MemeRepository, MemeStatus, ObjectStore, Source, VectorRepository,
};
use tokio_util::sync::CancellationToken;

/// In-memory stores plus handles on every double.
struct Harness {
    stores: MemoryStores,
    describer: Arc<MockDescriber>,
    embedder: Arc<MockEmbedder>,
    index: Arc<MemoryVectorStore>,
    pipeline: IngestPipeline,
}

impl Harness {
    fn new() -> Self {
        Self::with_describer(MockDescriber::new("vlm-a"))
    }

    fn with_describer(describer: MockDescriber) -> Self {
        let stores = MemoryStores::new();
        let describer = Arc::new(describer);
        let embedder = Arc::new(MockEmbedder::new("embed-small"));
        let index = Arc::new(MemoryVectorStore::new("emomo"));
        let pipeline = IngestPipeline::new(
            stores.store_set(),
            describer.clone(),
            CollectionBinding::new(embedder.clone(), index.clone()),
        )
        .with_config(IngestConfig::default().with_workers(2).with_batch_size(2));

        Self {
            stores,
            describer,
            embedder,
            index,
            pipeline,
        }
    }

    /// A second pipeline sharing stores and describer, writing to another collection.
    fn second_collection(&self, collection: &str, model: &str) -> (IngestPipeline, Arc<MemoryVectorStore>) {
        let index = Arc::new(MemoryVectorStore::new(collection));
        let pipeline = IngestPipeline::new(
            self.stores.store_set(),
            self.describer.clone(),
            CollectionBinding::new(Arc::new(MockEmbedder::new(model)), index.clone()),
        );
        (pipeline, index)
    }

    async fn run(&self, source: Arc<dyn Source>, options: IngestOptions) -> emomo::IngestStats {
        self.pipeline
            .ingest(source, 100, options, CancellationToken::new())
            .await
            .unwrap()
    }
}

fn png_items(count: u8) -> Vec<MemeItem> {
    (0..count)
        .map(|i| {
            MemeItem::from_bytes(format!("熊猫头/{i}.png"), png(8, 8, i * 10), "png")
                .with_category("熊猫头")
        })
        .collect()
}

#[tokio::test]
async fn test_ingest_activates_every_item() {
    let h = Harness::new();
    let source = Arc::new(VecSource::new("local", png_items(3)));

    let stats = h.run(source, IngestOptions::default()).await;

    assert_eq!(stats.total, 3);
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.succeeded(), 3);

    assert_eq!(h.stores.memes.count_by_status(MemeStatus::Active).await.unwrap(), 3);
    assert_eq!(h.stores.objects.len(), 3);
    assert_eq!(h.stores.descriptions.len(), 3);
    assert_eq!(h.index.len(), 3);
    assert_eq!(h.stores.vectors.count_by_collection("emomo").await.unwrap(), 3);
    assert_eq!(h.embedder.call_count(), 3);
}

#[tokio::test]
async fn test_second_run_skips_everything() {
    let h = Harness::new();
    h.run(Arc::new(VecSource::new("local", png_items(3))), IngestOptions::default())
        .await;

    let stats = h
        .run(Arc::new(VecSource::new("local", png_items(3))), IngestOptions::default())
        .await;

    assert_eq!(stats.processed, 3);
    assert_eq!(stats.skipped, 3);
    assert_eq!(h.describer.call_count(), 3);
    assert_eq!(h.stores.memes.len(), 3);
    assert_eq!(h.index.len(), 3);
}

#[tokio::test]
async fn test_same_content_from_two_items_is_stored_once() {
    let h = Harness::new();
    let bytes = png(8, 8, 42);
    let items = vec![
        MemeItem::from_bytes("a.png", bytes.clone(), "png"),
        MemeItem::from_bytes("copy-of-a.png", bytes, "png"),
    ];

    let stats = h.run(Arc::new(VecSource::new("local", items)), IngestOptions::default()).await;

    assert_eq!(stats.processed, 2);
    assert_eq!(stats.skipped, 1);
    assert_eq!(h.stores.memes.len(), 1);
    assert_eq!(h.stores.objects.len(), 1);
    assert_eq!(h.index.len(), 1);
}

#[tokio::test]
async fn test_second_collection_reuses_description() {
    let h = Harness::new();
    h.run(Arc::new(VecSource::new("local", png_items(2))), IngestOptions::default())
        .await;
    let (large, large_index) = h.second_collection("emomo-large", "embed-large");

    let stats = large
        .ingest(
            Arc::new(VecSource::new("local", png_items(2))),
            100,
            IngestOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.failed, 0);
    assert_eq!(stats.skipped, 0);
    assert_eq!(h.describer.call_count(), 2);
    assert_eq!(h.stores.memes.len(), 2);
    assert_eq!(h.stores.descriptions.len(), 2);
    assert_eq!(large_index.len(), 2);
    assert_eq!(h.stores.vectors.len(), 4);

    let hash = content_hash(&png(8, 8, 0));
    let record = h.stores.vectors.get(&hash, "emomo-large").await.unwrap().unwrap();
    assert_eq!(record.embedding_model, "embed-large");
}

#[tokio::test]
async fn test_forced_regeneration_replaces_in_place() {
    let h = Harness::new();
    h.run(Arc::new(VecSource::new("local", png_items(1))), IngestOptions::default())
        .await;
    let hash = content_hash(&png(8, 8, 0));
    let before = h.stores.vectors.get(&hash, "emomo").await.unwrap().unwrap();

    let stats = h
        .run(
            Arc::new(VecSource::new("local", png_items(1))),
            IngestOptions::forced().with_regenerate_descriptions(true),
        )
        .await;

    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(h.describer.call_count(), 2);
    assert_eq!(h.stores.descriptions.len(), 1);
    assert_eq!(h.stores.vectors.len(), 1);
    assert_eq!(h.index.len(), 1);

    let after = h.stores.vectors.get(&hash, "emomo").await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.vector_point_id, before.vector_point_id);
}

#[tokio::test]
async fn test_forced_run_without_regeneration_reuses_description() {
    let h = Harness::new();
    h.run(Arc::new(VecSource::new("local", png_items(1))), IngestOptions::default())
        .await;

    let stats = h
        .run(Arc::new(VecSource::new("local", png_items(1))), IngestOptions::forced())
        .await;

    assert_eq!(stats.skipped, 0);
    assert_eq!(h.describer.call_count(), 1);
    assert_eq!(h.embedder.call_count(), 2);
}

#[tokio::test]
async fn test_forced_run_refreshes_changed_source_item() {
    let h = Harness::new();
    let original = MemeItem::from_bytes("x.png", png(8, 8, 3), "png");
    h.run(Arc::new(VecSource::new("local", vec![original])), IngestOptions::default())
        .await;
    let before = h.stores.memes.get_by_source("local", "x.png").await.unwrap().unwrap();

    let changed = MemeItem::from_bytes("x.png", png(8, 8, 99), "png");
    let stats = h
        .run(Arc::new(VecSource::new("local", vec![changed])), IngestOptions::forced())
        .await;

    assert_eq!(stats.failed, 0);
    assert_eq!(stats.skipped, 0);
    assert_eq!(h.stores.memes.len(), 1);

    let after = h.stores.memes.get_by_source("local", "x.png").await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.content_hash, content_hash(&png(8, 8, 99)));
    assert_eq!(after.status, MemeStatus::Active);

    // The point for the old content is gone, the new one points at the same meme.
    assert_eq!(h.index.len(), 1);
    assert!(h.stores.vectors.get(&before.content_hash, "emomo").await.unwrap().is_none());
    let record = h.stores.vectors.get(&after.content_hash, "emomo").await.unwrap().unwrap();
    assert_eq!(record.meme_id, before.id);
    assert_eq!(h.index.payload(record.vector_point_id).unwrap().meme_id, before.id);
}

#[tokio::test]
async fn test_failed_refresh_restores_previous_record() {
    let h = Harness::new();
    let original = MemeItem::from_bytes("x.png", png(8, 8, 3), "png");
    h.run(Arc::new(VecSource::new("local", vec![original])), IngestOptions::default())
        .await;
    let before = h.stores.memes.get_by_source("local", "x.png").await.unwrap().unwrap();
    h.index.fail_upserts(true);

    let changed = MemeItem::from_bytes("x.png", png(8, 8, 99), "png");
    let stats = h
        .run(Arc::new(VecSource::new("local", vec![changed])), IngestOptions::forced())
        .await;

    assert_eq!(stats.failed, 1);
    let after = h.stores.memes.get(before.id).await.unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(h.stores.objects.len(), 1);
    assert!(h.stores.objects.exists(&before.storage_key).await.unwrap());
    assert!(h.stores.vectors.get(&before.content_hash, "emomo").await.unwrap().is_some());
}

#[tokio::test]
async fn test_second_collection_failure_keeps_reused_records() {
    let h = Harness::new();
    h.run(Arc::new(VecSource::new("local", png_items(1))), IngestOptions::default())
        .await;
    let (large, large_index) = h.second_collection("emomo-large", "embed-large");
    large_index.fail_upserts(true);

    let stats = large
        .ingest(
            Arc::new(VecSource::new("local", png_items(1))),
            100,
            IngestOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(h.stores.memes.len(), 1);
    assert_eq!(h.stores.descriptions.len(), 1);
    assert_eq!(h.stores.objects.len(), 1);
    assert_eq!(h.stores.vectors.len(), 1);
    assert_eq!(h.index.len(), 1);
    assert!(large_index.is_empty());
    assert_eq!(h.stores.memes.count_by_status(MemeStatus::Active).await.unwrap(), 1);
}

#[tokio::test]
async fn test_meme_create_failure_removes_upload() {
    let h = Harness::new();
    h.stores.memes.fail_creates(true);

    let stats = h
        .run(Arc::new(VecSource::new("local", png_items(2))), IngestOptions::default())
        .await;

    assert_eq!(stats.failed, 2);
    assert!(h.stores.memes.is_empty());
    assert!(h.stores.objects.is_empty());
    assert_eq!(h.describer.call_count(), 0);
}

#[tokio::test]
async fn test_upload_failure_writes_nothing() {
    let h = Harness::new();
    h.stores.objects.fail_uploads(true);

    let stats = h
        .run(Arc::new(VecSource::new("local", png_items(1))), IngestOptions::default())
        .await;

    assert_eq!(stats.failed, 1);
    assert!(h.stores.memes.is_empty());
    assert!(h.stores.objects.is_empty());
    assert_eq!(h.describer.call_count(), 0);
}

#[tokio::test]
async fn test_index_failure_rolls_back_everything() {
    let h = Harness::new();
    h.index.fail_upserts(true);

    let stats = h
        .run(Arc::new(VecSource::new("local", png_items(1))), IngestOptions::default())
        .await;

    assert_eq!(stats.failed, 1);
    assert!(h.stores.memes.is_empty());
    assert!(h.stores.objects.is_empty());
    assert!(h.stores.descriptions.is_empty());
    assert!(h.stores.vectors.is_empty());
    assert!(h.index.is_empty());
}

#[tokio::test]
async fn test_record_failure_removes_indexed_point() {
    let h = Harness::new();
    h.stores.vectors.fail_writes(true);

    let stats = h
        .run(Arc::new(VecSource::new("local", png_items(1))), IngestOptions::default())
        .await;

    assert_eq!(stats.failed, 1);
    assert!(h.index.is_empty());
    assert!(h.stores.memes.is_empty());
    assert!(h.stores.objects.is_empty());
}

#[tokio::test]
async fn test_embedding_failure_keeps_nothing() {
    let h = Harness::new();
    h.embedder.fail(true);

    let stats = h
        .run(Arc::new(VecSource::new("local", png_items(2))), IngestOptions::default())
        .await;

    assert_eq!(stats.failed, 2);
    assert!(h.stores.memes.is_empty());
    assert!(h.stores.descriptions.is_empty());
}

#[tokio::test]
async fn test_description_failure_leaves_pending_until_retry() {
    let h = Harness::new();
    h.describer.fail(true);

    let stats = h
        .run(Arc::new(VecSource::new("local", png_items(1))), IngestOptions::default())
        .await;

    assert_eq!(stats.failed, 1);
    assert_eq!(h.stores.memes.count_by_status(MemeStatus::Pending).await.unwrap(), 1);
    assert_eq!(h.stores.objects.len(), 1);
    assert!(h.index.is_empty());

    h.describer.fail(false);
    let retried = h
        .pipeline
        .retry_pending(10, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(retried.total, 1);
    assert_eq!(retried.processed, 1);
    assert_eq!(retried.failed, 0);
    assert_eq!(h.stores.memes.count_by_status(MemeStatus::Active).await.unwrap(), 1);
    assert_eq!(h.index.len(), 1);
}

#[tokio::test]
async fn test_retry_with_nothing_pending() {
    let h = Harness::new();
    let stats = h
        .pipeline
        .retry_pending(10, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.total, 0);
    assert_eq!(stats.processed, 0);
}

#[tokio::test]
async fn test_source_error_returns_partial_stats() {
    let h = Harness::new();
    let source = Arc::new(VecSource::new("local", png_items(4)).failing_at(2));

    let stats = h.run(source.clone(), IngestOptions::default()).await;

    assert_eq!(source.fetch_count(), 2);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(h.stores.memes.len(), 2);
}

#[tokio::test]
async fn test_limit_caps_items() {
    let h = Harness::new();
    let stats = h
        .pipeline
        .ingest(
            Arc::new(VecSource::new("local", png_items(5))),
            3,
            IngestOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.total, 3);
    assert_eq!(h.stores.memes.len(), 3);
}

#[tokio::test]
async fn test_cancelled_run_does_nothing() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let stats = h
        .pipeline
        .ingest(
            Arc::new(VecSource::new("local", png_items(3))),
            100,
            IngestOptions::default(),
            cancel,
        )
        .await
        .unwrap();

    assert_eq!(stats.total, 0);
    assert_eq!(stats.processed, 0);
    assert!(h.stores.memes.is_empty());
}

/// Serves pages from `inner` and cancels the run once the first page is
/// fully ingested.
struct CancelAfterFirstPage {
    inner: VecSource,
    memes: Arc<MemoryMemeRepository>,
    cancel: CancellationToken,
    first_page: u64,
}

#[async_trait]
impl Source for CancelAfterFirstPage {
    fn source_id(&self) -> &str {
        self.inner.source_id()
    }

    async fn fetch_batch(&self, cursor: Option<&str>, limit: usize) -> emomo::Result<FetchPage> {
        if cursor.is_some() {
            for _ in 0..500 {
                if self.memes.count_by_status(MemeStatus::Active).await? >= self.first_page {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            self.cancel.cancel();
        }
        self.inner.fetch_batch(cursor, limit).await
    }
}

#[tokio::test]
async fn test_cancelled_mid_run_returns_partial_stats() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    let source = Arc::new(CancelAfterFirstPage {
        inner: VecSource::new("local", png_items(6)),
        memes: h.stores.memes.clone(),
        cancel: cancel.clone(),
        first_page: 2,
    });

    let stats = h
        .pipeline
        .ingest(source, 100, IngestOptions::default(), cancel)
        .await
        .unwrap();

    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 0);
    assert!(stats.total >= 2 && stats.total <= 4);
    assert_eq!(h.stores.memes.len(), 2);
    assert_eq!(h.index.len(), 2);
}

#[tokio::test]
async fn test_gif_is_stored_as_first_frame_png() {
    let h = Harness::new();
    let item = MemeItem::from_bytes("dance.gif", gif(6, 4, 7), "gif");

    let stats = h.run(Arc::new(VecSource::new("local", vec![item])), IngestOptions::default()).await;
    assert_eq!(stats.failed, 0);

    let meme = h
        .stores
        .memes
        .get_by_source("local", "dance.gif")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meme.format, "png");
    assert!(meme.is_animated);
    assert_eq!((meme.width, meme.height), (6, 4));
    assert!(meme.storage_key.ends_with(".png"));
    assert_eq!(h.stores.objects.content_type(&meme.storage_key).as_deref(), Some("image/png"));

    let stored = h.stores.objects.download(&meme.storage_key).await.unwrap();
    assert_eq!(content_hash(&stored), meme.content_hash);
}

#[tokio::test]
async fn test_payload_carries_description_and_url() {
    let hash = content_hash(&png(8, 8, 0));
    let h = Harness::with_describer(
        MockDescriber::new("vlm-a").with_description(&hash, "熊猫头翻白眼，一脸无语"),
    );

    h.run(Arc::new(VecSource::new("local", png_items(1))), IngestOptions::default())
        .await;

    let record = h.stores.vectors.get(&hash, "emomo").await.unwrap().unwrap();
    let payload = h.index.payload(record.vector_point_id).unwrap();
    assert_eq!(payload.description, "熊猫头翻白眼，一脸无语");
    assert_eq!(payload.category, "熊猫头");
    assert!(payload.storage_url.starts_with("memory://emomo/"));
    assert!(payload.lexical_text.contains("无语"));
}

#[tokio::test]
async fn test_directory_source_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("熊猫头")).unwrap();
    std::fs::write(dir.path().join("熊猫头").join("a.png"), png(8, 8, 1)).unwrap();
    std::fs::write(dir.path().join("b.png"), png(8, 8, 2)).unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();

    let h = Harness::new();
    let stats = h
        .run(Arc::new(DirectorySource::new(dir.path())), IngestOptions::default())
        .await;

    assert_eq!(stats.total, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(
        h.stores.memes.categories().await.unwrap(),
        vec!["未分类".to_string(), "熊猫头".to_string()]
    );

    let meme = h
        .stores
        .memes
        .get_by_source("local", "熊猫头/a.png")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meme.category, "熊猫头");
}
