// Image catalog: fetch, parse, verify, publish
//
// The catalog moves through Idle -> Loading -> Loaded, and re-enters
// Loaded -> Verifying -> Loaded for every verification round. Each state
// change publishes a new immutable snapshot on a watch channel, so renderers
// never observe a list that is being modified.

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::engine::ImageLister;
use crate::image::ImageReference;
use crate::verify::Verifier;

/// Default number of verification processes allowed to run at once
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogState {
    Idle,
    Loading,
    Loaded,
    Verifying,
}

impl fmt::Display for CatalogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CatalogState::Idle => "idle",
            CatalogState::Loading => "loading",
            CatalogState::Loaded => "loaded",
            CatalogState::Verifying => "verifying",
        };
        write!(f, "{}", s)
    }
}

/// Check if a catalog state transition is valid
fn is_valid_transition(from: CatalogState, to: CatalogState) -> bool {
    use CatalogState::*;

    matches!(
        (from, to),
        (Idle | Loaded, Loading)
            | (Loading, Loaded)
            // A failed fetch falls back to the previous state
            | (Loading, Idle)
            | (Loaded, Verifying)
            | (Verifying, Loaded)
    )
}

fn validate_transition(from: CatalogState, to: CatalogState) -> Result<()> {
    if !is_valid_transition(from, to) {
        bail!(
            "Invalid catalog state transition from '{}' to '{}'",
            from,
            to
        );
    }
    Ok(())
}

/// Immutable view of the catalog published after every state change
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSnapshot {
    pub state: CatalogState,
    /// Increases with every publish
    pub generation: u64,
    pub images: Vec<ImageReference>,
}

impl CatalogSnapshot {
    fn idle() -> Self {
        Self {
            state: CatalogState::Idle,
            generation: 0,
            images: Vec::new(),
        }
    }

    pub fn verified(&self) -> impl Iterator<Item = &ImageReference> {
        self.images.iter().filter(|image| image.verified)
    }
}

/// Outcome of one verification round, derived from the merged final state
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub total: usize,
    pub verified: Vec<ImageReference>,
    pub elapsed: Duration,
}

pub struct Catalog {
    lister: Arc<dyn ImageLister>,
    verifier: Verifier,
    concurrency: usize,
    snapshot: watch::Sender<Arc<CatalogSnapshot>>,
}

impl Catalog {
    /// Create a catalog in the Idle state
    ///
    /// `concurrency` is clamped to at least 1.
    pub fn new(lister: Arc<dyn ImageLister>, verifier: Verifier, concurrency: usize) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(CatalogSnapshot::idle()));
        Self {
            lister,
            verifier,
            concurrency: concurrency.max(1),
            snapshot,
        }
    }

    /// Receive every snapshot published from now on
    pub fn subscribe(&self) -> watch::Receiver<Arc<CatalogSnapshot>> {
        self.snapshot.subscribe()
    }

    /// The most recently published snapshot
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.borrow().clone()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn state(&self) -> CatalogState {
        self.snapshot.borrow().state
    }

    fn publish(&self, state: CatalogState, images: Vec<ImageReference>) -> Arc<CatalogSnapshot> {
        let generation = self.snapshot.borrow().generation + 1;
        let snapshot = Arc::new(CatalogSnapshot {
            state,
            generation,
            images,
        });
        debug!(
            state = %state,
            generation = generation,
            images = snapshot.images.len(),
            "Publishing catalog snapshot"
        );
        self.snapshot.send_replace(snapshot.clone());
        snapshot
    }

    /// Fetch the image list and rebuild the working set from scratch
    ///
    /// The new snapshot is published before any verification runs, so every
    /// image starts out unverified. On a fetch failure the previous images
    /// are republished and the error is returned.
    pub async fn load(&mut self) -> Result<Arc<CatalogSnapshot>> {
        let previous = self.snapshot();
        validate_transition(previous.state, CatalogState::Loading)?;
        self.publish(CatalogState::Loading, previous.images.clone());

        let records = match self.lister.list_images().await {
            Ok(records) => records,
            Err(e) => {
                self.publish(previous.state, previous.images.clone());
                return Err(e);
            }
        };

        let mut skipped = 0;
        let images: Vec<ImageReference> = records
            .iter()
            .filter_map(|record| {
                let image = ImageReference::from_record(record);
                if image.is_none() {
                    debug!(image_id = %record.id, "Skipping image without tags or digests");
                    skipped += 1;
                }
                image
            })
            .collect();

        info!("Loaded {} images ({} skipped)", images.len(), skipped);

        Ok(self.publish(CatalogState::Loaded, images))
    }

    /// Re-verify every image in the current working set
    ///
    /// At most `concurrency` verification processes run at once. All results
    /// are awaited before they are merged into a new snapshot.
    pub async fn verify_all(&mut self) -> Result<VerificationReport> {
        let current = self.snapshot();
        if current.state == CatalogState::Idle {
            bail!("No images loaded yet");
        }
        validate_transition(current.state, CatalogState::Verifying)?;
        self.publish(CatalogState::Verifying, current.images.clone());

        info!(
            "Verifying {} images (concurrency {})",
            current.images.len(),
            self.concurrency
        );

        let started = Instant::now();
        let verifier = &self.verifier;
        let results: Vec<ImageReference> = stream::iter(current.images.iter().cloned())
            .map(|mut image| async move {
                verifier.apply(&mut image).await;
                image
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let merged = merge_results(&current.images, results);
        let snapshot = self.publish(CatalogState::Loaded, merged);

        let report = VerificationReport {
            total: snapshot.images.len(),
            verified: snapshot.verified().cloned().collect(),
            elapsed: started.elapsed(),
        };

        info!(
            "Verified {}/{} images in {:.1}s",
            report.verified.len(),
            report.total,
            report.elapsed.as_secs_f64()
        );

        Ok(report)
    }
}

/// Replace entries of `base` by key with their verified counterparts,
/// keeping the original order
fn merge_results(base: &[ImageReference], results: Vec<ImageReference>) -> Vec<ImageReference> {
    let by_key: HashMap<String, ImageReference> = results
        .into_iter()
        .map(|image| (image.key().to_string(), image))
        .collect();

    base.iter()
        .map(|image| match by_key.get(image.key()) {
            Some(updated) => ImageReference {
                verified: updated.verified,
                ..image.clone()
            },
            None => image.clone(),
        })
        .collect()
}
