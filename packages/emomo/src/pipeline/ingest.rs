//! Ingestion pipeline: source → object store, repositories, vector store.
//!
//! A single producer paginates the source into a bounded work queue. A fixed
//! pool of workers pulls items, deduplicates them, runs enrichment
//! (description, embedding) and writes the stores. A collector task counts
//! per-item outcomes with atomics.
//!
//! Every resource a worker creates for an item is tracked in [`Created`]. When
//! a later step fails, exactly those resources are removed again, newest
//! first; reused resources are never touched.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::error::{EmomoError, Result};
use crate::media::format::{normalize, MediaFormat};
use crate::media::identity::{content_hash, storage_key, vector_point_id};
use crate::pipeline::registry::CollectionBinding;
use crate::pipeline::text::{dedupe_strings, embedding_text, lexical_text};
use crate::stores::StoreSet;
use crate::traits::ai::DescriptionProvider;
use crate::traits::source::Source;
use crate::types::item::{ItemContent, MemeItem};
use crate::types::meme::{Meme, MemeDescription, MemeStatus, MemeVector};
use crate::types::search::VectorPayload;
use crate::types::stats::{IngestOptions, IngestStats};

/// Outcome of one item.
#[derive(Debug)]
pub(crate) enum ItemOutcome {
    Ingested,
    Skipped,
    Failed(EmomoError),
}

#[derive(Debug)]
struct ItemResult {
    source_id: String,
    outcome: ItemOutcome,
}

/// Resources created by the current invocation.
#[derive(Debug, Default)]
pub(crate) struct Created {
    pub(crate) object_key: Option<String>,
    pub(crate) meme_id: Option<Uuid>,
    pub(crate) description_id: Option<Uuid>,
    pub(crate) point_id: Option<Uuid>,
    /// Record as it was before an in-place refresh
    pub(crate) replaced_meme: Option<Meme>,
}

/// Claim on a content hash for the duration of one item.
pub(crate) struct InFlight {
    hashes: Arc<Mutex<HashSet<String>>>,
    hash: String,
}

impl InFlight {
    pub(crate) fn claim(hashes: &Arc<Mutex<HashSet<String>>>, hash: &str) -> Option<Self> {
        if !hashes.lock().insert(hash.to_string()) {
            return None;
        }
        Some(Self {
            hashes: Arc::clone(hashes),
            hash: hash.to_string(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.hashes.lock().remove(&self.hash);
    }
}

#[derive(Clone, Default)]
struct Counters {
    total: Arc<AtomicU64>,
    processed: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl Counters {
    fn snapshot(&self, mut stats: IngestStats) -> IngestStats {
        stats.total = self.total.load(Ordering::Relaxed);
        stats.processed = self.processed.load(Ordering::Relaxed);
        stats.skipped = self.skipped.load(Ordering::Relaxed);
        stats.failed = self.failed.load(Ordering::Relaxed);
        stats.end_time = Utc::now();
        stats
    }
}

/// Ingests items from sources into one target collection.
#[derive(Clone)]
pub struct IngestPipeline {
    pub(crate) stores: StoreSet,
    pub(crate) describer: Arc<dyn DescriptionProvider>,
    pub(crate) binding: CollectionBinding,
    pub(crate) config: IngestConfig,
    pub(crate) in_flight: Arc<Mutex<HashSet<String>>>,
}

impl IngestPipeline {
    pub fn new(
        stores: StoreSet,
        describer: Arc<dyn DescriptionProvider>,
        binding: CollectionBinding,
    ) -> Self {
        Self {
            stores,
            describer,
            binding,
            config: IngestConfig::default(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Target collection name.
    pub fn collection(&self) -> &str {
        self.binding.name()
    }

    /// Ingest up to `limit` items from `source`.
    ///
    /// Per-item failures are counted, not returned. Cancellation stops the
    /// producer and the workers between items and returns the partial stats.
    pub async fn ingest(
        &self,
        source: Arc<dyn Source>,
        limit: usize,
        options: IngestOptions,
        cancel: CancellationToken,
    ) -> Result<IngestStats> {
        let started = IngestStats::started();
        let source_type = source.source_id().to_string();
        let workers = self.config.workers.max(1);

        info!(
            source = %source_type,
            collection = %self.collection(),
            limit,
            force = options.force,
            workers,
            "starting ingestion"
        );

        let counters = Counters::default();
        let (work_tx, work_rx) = mpsc::channel::<MemeItem>(workers * 2);
        let (result_tx, result_rx) = mpsc::channel::<ItemResult>(workers * 2);

        let collector = tokio::spawn(collect_results(result_rx, counters.clone()));
        let mut pool = self.spawn_workers(
            work_rx,
            result_tx,
            workers,
            &source_type,
            options,
            cancel.clone(),
        );

        self.produce(source.as_ref(), limit, &work_tx, &counters, &cancel)
            .await;
        drop(work_tx);

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "ingest worker panicked");
            }
        }
        if let Err(e) = collector.await {
            error!(error = %e, "ingest collector panicked");
        }

        let stats = counters.snapshot(started);
        info!(
            source = %source_type,
            collection = %self.collection(),
            total = stats.total,
            processed = stats.processed,
            skipped = stats.skipped,
            failed = stats.failed,
            duration_ms = stats.duration().num_milliseconds(),
            cancelled = cancel.is_cancelled(),
            "ingestion completed"
        );
        Ok(stats)
    }

    async fn produce(
        &self,
        source: &dyn Source,
        limit: usize,
        work_tx: &mpsc::Sender<MemeItem>,
        counters: &Counters,
        cancel: &CancellationToken,
    ) {
        let mut cursor: Option<String> = None;
        let mut fetched = 0usize;

        while fetched < limit && !cancel.is_cancelled() {
            let batch_limit = self.config.batch_size.max(1).min(limit - fetched);

            let page = tokio::select! {
                _ = cancel.cancelled() => break,
                page = source.fetch_batch(cursor.as_deref(), batch_limit) => page,
            };
            let mut page = match page {
                Ok(page) => page,
                Err(e) => {
                    error!(source = %source.source_id(), error = %e, "failed to fetch batch");
                    break;
                }
            };
            if page.items.is_empty() {
                break;
            }
            page.items.truncate(limit - fetched);

            fetched += page.items.len();
            counters
                .total
                .fetch_add(page.items.len() as u64, Ordering::Relaxed);
            debug!(source = %source.source_id(), items = page.items.len(), "fetched batch");

            for item in page.items {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = work_tx.send(item) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
    }

    fn spawn_workers(
        &self,
        receiver: mpsc::Receiver<MemeItem>,
        results: mpsc::Sender<ItemResult>,
        worker_count: usize,
        source_type: &str,
        options: IngestOptions,
        cancel: CancellationToken,
    ) -> JoinSet<()> {
        let shared_receiver = Arc::new(AsyncMutex::new(receiver));
        let source_type: Arc<str> = Arc::from(source_type);

        let mut join_set = JoinSet::new();
        for worker_idx in 0..worker_count {
            let rx = Arc::clone(&shared_receiver);
            let results = results.clone();
            let pipeline = self.clone();
            let source_type = Arc::clone(&source_type);
            let cancel = cancel.clone();

            join_set.spawn(async move {
                pipeline
                    .run_worker(worker_idx, rx, results, &source_type, options, cancel)
                    .await
            });
        }
        join_set
    }

    async fn run_worker(
        &self,
        worker_idx: usize,
        receiver: Arc<AsyncMutex<mpsc::Receiver<MemeItem>>>,
        results: mpsc::Sender<ItemResult>,
        source_type: &str,
        options: IngestOptions,
        cancel: CancellationToken,
    ) {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = receive_task(&receiver) => item,
            };
            let Some(item) = item else {
                debug!(worker = worker_idx, "ingest worker terminating (channel closed)");
                break;
            };

            let source_id = item.source_id.clone();
            let outcome = match self.process_item(source_type, item, options).await {
                Ok(outcome) => outcome,
                Err(e) => ItemOutcome::Failed(e),
            };

            if results.send(ItemResult { source_id, outcome }).await.is_err() {
                break;
            }
        }
    }

    /// Run one item through dedup, storage, and enrichment.
    pub(crate) async fn process_item(
        &self,
        source_type: &str,
        item: MemeItem,
        options: IngestOptions,
    ) -> Result<ItemOutcome> {
        let collection = self.collection();

        let by_source = self
            .stores
            .memes
            .get_by_source(source_type, &item.source_id)
            .await?;
        if let Some(meme) = by_source.as_ref().filter(|_| !options.force) {
            if self.stores.vectors.exists(&meme.content_hash, collection).await? {
                debug!(
                    source = %source_type,
                    source_id = %item.source_id,
                    collection = %collection,
                    "source item already vectorised, skipping"
                );
                return Ok(ItemOutcome::Skipped);
            }
        }

        let raw = read_content(&item.content).await?;
        let image = normalize(&raw, &item.format)?;
        if image.is_mismatch() {
            debug!(
                source_id = %item.source_id,
                claimed = %image.claimed,
                detected = %image.format,
                "claimed format differs from content"
            );
        }

        let hash = content_hash(&image.data);
        let Some(_claim) = InFlight::claim(&self.in_flight, &hash) else {
            debug!(content_hash = %hash, source_id = %item.source_id, "content already in flight, skipping");
            return Ok(ItemOutcome::Skipped);
        };

        if !options.force && self.stores.vectors.exists(&hash, collection).await? {
            debug!(content_hash = %hash, collection = %collection, "vector exists, skipping");
            return Ok(ItemOutcome::Skipped);
        }

        let mut created = Created::default();
        let meme = match self.stores.memes.get_by_hash(&hash).await? {
            Some(existing) => {
                debug!(
                    content_hash = %hash,
                    meme_id = %existing.id,
                    storage_key = %existing.storage_key,
                    "reusing existing meme"
                );
                existing
            }
            None => {
                let key = storage_key(&hash, &image.format);
                if !self.stores.objects.exists(&key).await? {
                    self.stores
                        .objects
                        .upload(&key, image.data.clone(), image.content_type())
                        .await?;
                    created.object_key = Some(key.clone());
                } else {
                    debug!(storage_key = %key, "object already stored, skipping upload");
                }

                let (width, height) = image.dimensions();
                let is_animated =
                    item.is_animated || image.detected == Some(MediaFormat::Gif);
                let mut meme = Meme::new(source_type, &item.source_id, &hash, key)
                    .with_dimensions(width, height)
                    .with_format(&image.format)
                    .with_animated(is_animated)
                    .with_file_size(image.data.len() as u64)
                    .with_category(&item.category)
                    .with_tags(dedupe_strings(&item.tags));

                // The source item changed since it was first ingested: keep its
                // identity and point the record at the new content.
                let written = match by_source {
                    Some(previous) => {
                        info!(
                            source_id = %item.source_id,
                            meme_id = %previous.id,
                            old_hash = %previous.content_hash,
                            new_hash = %hash,
                            "source item content changed, refreshing meme"
                        );
                        meme.id = previous.id;
                        meme.created_at = previous.created_at;
                        let written = self.stores.memes.update(&meme).await;
                        if written.is_ok() {
                            created.replaced_meme = Some(previous);
                        }
                        written
                    }
                    None => {
                        let written = self.stores.memes.create(&meme).await;
                        if written.is_ok() {
                            created.meme_id = Some(meme.id);
                        }
                        written
                    }
                };
                if let Err(e) = written {
                    self.compensate(&created).await;
                    return Err(e);
                }
                meme
            }
        };

        let regenerate = options.force
            && (options.regenerate_descriptions || self.config.regenerate_descriptions_on_force);
        self.enrich(&meme, &image.data, &image.format, regenerate, &mut created)
            .await?;

        if let Some(previous) = &created.replaced_meme {
            self.retire_vector(&previous.content_hash).await;
        }

        Ok(ItemOutcome::Ingested)
    }

    /// Describe, embed, index and record one meme, then mark it active.
    ///
    /// A failed description leaves the meme pending for the retry path.
    /// Later failures undo everything in `created`.
    pub(crate) async fn enrich(
        &self,
        meme: &Meme,
        image: &[u8],
        format: &str,
        regenerate: bool,
        created: &mut Created,
    ) -> Result<()> {
        let hash = meme.content_hash.as_str();
        let collection = self.collection();

        let description = match self
            .description_for(hash, image, format, regenerate, created)
            .await
        {
            Ok(description) => description,
            Err(e) => {
                warn!(
                    content_hash = %hash,
                    meme_id = %meme.id,
                    error = %e,
                    "description failed, meme left pending"
                );
                return Err(e);
            }
        };

        let text = embedding_text(&description.description, &meme.tags);
        let embedding = match self.binding.embedder().embed(&text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                self.compensate(created).await;
                return Err(e);
            }
        };

        let existing = match self.stores.vectors.get(hash, collection).await {
            Ok(existing) => existing,
            Err(e) => {
                self.compensate(created).await;
                return Err(e);
            }
        };

        let point_id = vector_point_id(hash, collection);
        let payload = VectorPayload {
            meme_id: meme.id,
            source_type: meme.source_type.clone(),
            category: meme.category.clone(),
            is_animated: meme.is_animated,
            tags: meme.tags.clone(),
            description: description.description.clone(),
            storage_url: self.stores.objects.url(&meme.storage_key),
            lexical_text: lexical_text(&description.description, &meme.tags),
        };

        if let Err(e) = self.binding.store().upsert(point_id, embedding, payload).await {
            self.compensate(created).await;
            return Err(e);
        }
        if existing.is_none() {
            created.point_id = Some(point_id);
        }

        let mut record = MemeVector::new(
            meme.id,
            hash,
            collection,
            self.binding.embedding_model(),
            point_id,
        )
        .with_description(description.id);

        let recorded = match &existing {
            Some(old) => {
                debug!(content_hash = %hash, collection = %collection, "replacing vector record");
                record.id = old.id;
                self.stores.vectors.upsert(&record).await
            }
            None => self.stores.vectors.create(&record).await,
        };
        if let Err(e) = recorded {
            self.compensate(created).await;
            return Err(e);
        }

        // The vector is consistent; a pending meme is activated by the retry path.
        self.stores
            .memes
            .update_status(meme.id, MemeStatus::Active)
            .await?;

        debug!(
            content_hash = %hash,
            meme_id = %meme.id,
            collection = %collection,
            point_id = %point_id,
            "meme vectorised"
        );
        Ok(())
    }

    /// Cached description for `(hash, model)`, or a new one.
    async fn description_for(
        &self,
        hash: &str,
        image: &[u8],
        format: &str,
        regenerate: bool,
        created: &mut Created,
    ) -> Result<MemeDescription> {
        let model = self.describer.model();
        let cached = self.stores.descriptions.get(hash, model).await?;

        if let Some(cached) = &cached {
            if !regenerate {
                debug!(content_hash = %hash, model = %model, "reusing description");
                return Ok(cached.clone());
            }
        }

        let text = self.describer.describe(image, format).await?;

        match cached {
            Some(mut existing) => {
                existing.description = text;
                existing.created_at = Utc::now();
                self.stores.descriptions.upsert(&existing).await?;
                Ok(existing)
            }
            None => {
                let description = MemeDescription::new(hash, model, text);
                self.stores.descriptions.create(&description).await?;
                created.description_id = Some(description.id);
                Ok(description)
            }
        }
    }

    /// Drop the point and record left behind by a meme's previous content
    /// in the target collection.
    async fn retire_vector(&self, old_hash: &str) {
        let collection = self.collection();
        let stale = match self.stores.vectors.get(old_hash, collection).await {
            Ok(Some(stale)) => stale,
            Ok(None) => return,
            Err(e) => {
                warn!(content_hash = %old_hash, collection = %collection, error = %e, "failed to look up stale vector");
                return;
            }
        };
        if let Err(e) = self.binding.store().delete(stale.vector_point_id).await {
            warn!(point_id = %stale.vector_point_id, error = %e, "failed to delete stale vector point");
            return;
        }
        if let Err(e) = self.stores.vectors.delete(stale.id).await {
            warn!(vector_id = %stale.id, error = %e, "failed to delete stale vector record");
        }
    }

    /// Undo resources created by this invocation, newest first.
    ///
    /// Failures are logged and never replace the triggering error.
    pub(crate) async fn compensate(&self, created: &Created) {
        if let Some(point_id) = created.point_id {
            if let Err(e) = self.binding.store().delete(point_id).await {
                error!(point_id = %point_id, collection = %self.collection(), error = %e, "failed to roll back vector point");
            }
        }
        if let Some(id) = created.description_id {
            if let Err(e) = self.stores.descriptions.delete(id).await {
                error!(description_id = %id, error = %e, "failed to roll back description");
            }
        }
        if let Some(id) = created.meme_id {
            if let Err(e) = self.stores.memes.delete(id).await {
                error!(meme_id = %id, error = %e, "failed to roll back meme record");
            }
        }
        if let Some(previous) = &created.replaced_meme {
            if let Err(e) = self.stores.memes.update(previous).await {
                error!(meme_id = %previous.id, error = %e, "failed to restore refreshed meme record");
            }
        }
        if let Some(key) = &created.object_key {
            if let Err(e) = self.stores.objects.delete(key).await {
                error!(storage_key = %key, error = %e, "failed to roll back object upload");
            }
        }
    }
}

async fn receive_task(receiver: &Arc<AsyncMutex<mpsc::Receiver<MemeItem>>>) -> Option<MemeItem> {
    let mut guard = receiver.lock().await;
    guard.recv().await
}

async fn collect_results(mut results: mpsc::Receiver<ItemResult>, counters: Counters) {
    while let Some(result) = results.recv().await {
        counters.processed.fetch_add(1, Ordering::Relaxed);
        match result.outcome {
            ItemOutcome::Ingested => {}
            ItemOutcome::Skipped => {
                counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            ItemOutcome::Failed(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(source_id = %result.source_id, error = %e, "failed to process item");
            }
        }
    }
}

async fn read_content(content: &ItemContent) -> Result<Vec<u8>> {
    match content {
        ItemContent::Bytes(data) => Ok(data.clone()),
        ItemContent::Path(path) => Ok(tokio::fs::read(path).await?),
    }
}
