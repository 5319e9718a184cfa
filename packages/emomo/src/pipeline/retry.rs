//! Retry path for memes left pending by a failed enrichment.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::pipeline::ingest::{Created, InFlight, IngestPipeline};
use crate::types::meme::{Meme, MemeStatus};
use crate::types::stats::IngestStats;

enum RetryOutcome {
    Activated,
    Enriched,
    Skipped,
}

impl IngestPipeline {
    /// Re-run enrichment for up to `limit` pending memes.
    ///
    /// Content is read back from object storage. A meme that already has a
    /// vector in the target collection is only flipped to active. Memes are
    /// handled one at a time; cancellation stops between memes.
    pub async fn retry_pending(
        &self,
        limit: usize,
        cancel: CancellationToken,
    ) -> Result<IngestStats> {
        let mut stats = IngestStats::started();
        let pending = self
            .stores
            .memes
            .list_by_status(MemeStatus::Pending, limit, 0)
            .await?;
        stats.total = pending.len() as u64;

        info!(
            collection = %self.collection(),
            pending = pending.len(),
            "retrying pending memes"
        );

        for meme in pending {
            if cancel.is_cancelled() {
                break;
            }

            stats.processed += 1;
            match self.retry_one(&meme).await {
                Ok(RetryOutcome::Activated) => {
                    debug!(meme_id = %meme.id, "vector already present, activated");
                }
                Ok(RetryOutcome::Enriched) => {
                    debug!(meme_id = %meme.id, "pending meme enriched");
                }
                Ok(RetryOutcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    stats.failed += 1;
                    error!(
                        meme_id = %meme.id,
                        content_hash = %meme.content_hash,
                        error = %e,
                        "retry failed"
                    );
                }
            }
        }

        stats.end_time = Utc::now();
        info!(
            collection = %self.collection(),
            processed = stats.processed,
            skipped = stats.skipped,
            failed = stats.failed,
            "retry completed"
        );
        Ok(stats)
    }

    async fn retry_one(&self, meme: &Meme) -> Result<RetryOutcome> {
        let Some(_claim) = InFlight::claim(&self.in_flight, &meme.content_hash) else {
            return Ok(RetryOutcome::Skipped);
        };

        if self
            .stores
            .vectors
            .exists(&meme.content_hash, self.collection())
            .await?
        {
            self.stores
                .memes
                .update_status(meme.id, MemeStatus::Active)
                .await?;
            return Ok(RetryOutcome::Activated);
        }

        let image = self.stores.objects.download(&meme.storage_key).await?;

        // Only the description and point created here may be rolled back.
        let mut created = Created::default();
        self.enrich(meme, &image, &meme.format, false, &mut created)
            .await?;
        Ok(RetryOutcome::Enriched)
    }
}
