//! Sequential batch runner
//!
//! Runs the single-item processor over an ordered list of files with the
//! same region and options. Items are processed one at a time, each item's
//! failure is recorded on that item only, and items already `Completed` or
//! `Failed` are skipped so a partially run batch can be resumed.

use crate::{
    config::RemovalOptions,
    error::Result,
    processor::{PreviewMode, RemovalProcessor},
    types::{
        BatchEvent, BatchItem, BatchItemUpdate, BatchProgress, BatchStatus, BatchSummary, Region,
    },
};
use tracing::{debug, info, instrument, warn};

/// Runner that owns batch items for the duration of a run
#[derive(Clone)]
pub struct BatchRunner {
    processor: RemovalProcessor,
}

impl BatchRunner {
    pub fn new(processor: RemovalProcessor) -> Self {
        Self { processor }
    }

    /// Process every non-terminal item in list order
    ///
    /// `on_update` receives, per processed item, a `Progress` event followed
    /// by `ItemUpdated` events for the `Processing` and the terminal
    /// transition; a single `Finished` event closes the run.
    ///
    /// # Errors
    /// Only precondition failures (invalid options, missing cloud
    /// credential), reported before any item is touched. Per-item failures
    /// are recorded on the item instead.
    #[instrument(name = "batch run", skip_all, fields(items = items.len(), region = %region))]
    pub async fn run<F>(
        &self,
        items: &mut [BatchItem],
        region: Region,
        options: &RemovalOptions,
        mut on_update: F,
    ) -> Result<BatchSummary>
    where
        F: FnMut(BatchEvent),
    {
        let inpainter = self.processor.prepare(options)?;
        let total_count = items.len();
        let mut summary = BatchSummary::default();

        for (index, item) in items.iter_mut().enumerate() {
            if item.status.is_terminal() {
                summary.skipped += 1;
                continue;
            }
            if item.status == BatchStatus::Processing {
                // Left over from an interrupted run
                debug!(item = %item.display_name, "Restarting item left in processing");
                item.status = BatchStatus::Pending;
            }

            on_update(BatchEvent::Progress(BatchProgress {
                current_index: index,
                total_count,
                current_name: item.display_name.clone(),
            }));

            Self::transition(item, BatchItemUpdate::processing(), &mut on_update);

            let outcome = self
                .processor
                .process_with(&inpainter, &item.source_path, region, options, PreviewMode::Skip)
                .await;

            match outcome {
                Ok(result) => {
                    summary.completed += 1;
                    Self::transition(
                        item,
                        BatchItemUpdate::completed(result.output_path),
                        &mut on_update,
                    );
                },
                Err(e) => {
                    warn!(item = %item.display_name, error = %e, "Batch item failed");
                    summary.failed += 1;
                    Self::transition(item, BatchItemUpdate::failed(e.to_string()), &mut on_update);
                },
            }
        }

        info!(
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            "Batch finished"
        );
        on_update(BatchEvent::Finished(summary));
        Ok(summary)
    }

    fn transition<F>(item: &mut BatchItem, update: BatchItemUpdate, on_update: &mut F)
    where
        F: FnMut(BatchEvent),
    {
        debug_assert!(
            item.status.can_transition_to(update.status),
            "invalid batch transition {:?} -> {:?}",
            item.status,
            update.status
        );
        item.apply(&update);
        on_update(BatchEvent::ItemUpdated {
            id: item.id.clone(),
            update,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::inpaint::{GeminiInpainter, InpaintBackends, PatchInpainter};
    use crate::services::{OutputFormat, OutputFormatHandler, ScratchManager};
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn runner(scratch: &std::path::Path) -> BatchRunner {
        let backends = InpaintBackends::new(
            Arc::new(PatchInpainter::new()),
            Arc::new(GeminiInpainter::new(crate::config::CloudConfig::default()).unwrap()),
        );
        BatchRunner::new(RemovalProcessor::new(
            backends,
            Arc::new(MemoryCredentialStore::new()),
            ScratchManager::open_session(scratch).unwrap(),
            90,
        ))
    }

    fn png(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([30, 60, 90])));
        let path = dir.join(name);
        std::fs::write(&path, OutputFormatHandler::encode(&image, OutputFormat::Png, 90).unwrap())
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_event_order_for_single_item() {
        let dir = TempDir::new().unwrap();
        let mut items = vec![BatchItem::new(png(dir.path(), "a.png"))];
        let mut events = Vec::new();

        let summary = runner(&dir.path().join("scratch"))
            .run(&mut items, Region::new(2, 2, 4, 4), &RemovalOptions::default(), |e| {
                events.push(e);
            })
            .await
            .unwrap();

        assert_eq!(summary.completed, 1);
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], BatchEvent::Progress(p) if p.current_index == 0 && p.total_count == 1));
        assert!(matches!(&events[1], BatchEvent::ItemUpdated { update, .. } if update.status == BatchStatus::Processing));
        assert!(matches!(&events[2], BatchEvent::ItemUpdated { update, .. } if update.status == BatchStatus::Completed));
        assert!(matches!(&events[3], BatchEvent::Finished(_)));
        assert!(items[0].processed_path.as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn test_invalid_options_fail_before_any_item() {
        let dir = TempDir::new().unwrap();
        let mut items = vec![BatchItem::new(png(dir.path(), "a.png"))];
        let options = RemovalOptions {
            inpaint_radius: 99.0,
            ..RemovalOptions::default()
        };
        let mut events = Vec::new();

        let result = runner(&dir.path().join("scratch"))
            .run(&mut items, Region::new(0, 0, 2, 2), &options, |e| events.push(e))
            .await;

        assert!(result.is_err());
        assert!(events.is_empty());
        assert_eq!(items[0].status, BatchStatus::Pending);
    }
}
