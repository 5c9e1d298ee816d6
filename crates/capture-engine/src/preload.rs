//! Asset preloading.
//!
//! Resolves every slide, background, and cover reference into a ready
//! handle. Each load races its own timeout and all loads run concurrently;
//! the preload completes only after every one of them has resolved.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use lyricap_common::config::CaptureDefaults;
use lyricap_project_model::project::{BackgroundKind, ProjectSnapshot};
use lyricap_project_model::slide::{AssetKey, SlideKind};

use crate::assets::{AssetHandle, AssetRegistry};
use crate::backend::{MediaBackend, MediaKind};

/// How each requested asset resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreloadReport {
    pub loaded: Vec<AssetKey>,
    /// Assets that missed the deadline. Media assets stay registered.
    pub timed_out: Vec<AssetKey>,
    pub failed: Vec<(AssetKey, String)>,
}

impl PreloadReport {
    pub fn requested(&self) -> usize {
        self.loaded.len() + self.timed_out.len() + self.failed.len()
    }
}

#[derive(Debug, Clone)]
enum AssetRequest {
    Image {
        key: AssetKey,
        source_ref: String,
    },
    Media {
        key: AssetKey,
        source_ref: String,
        kind: MediaKind,
        background: bool,
    },
}

enum LoadOutcome {
    Loaded(AssetHandle),
    TimedOut(Option<AssetHandle>),
    Failed(String),
}

/// Loads session assets through a [`MediaBackend`].
pub struct Preloader {
    backend: Arc<dyn MediaBackend>,
    timeout: Duration,
    micro_seek_secs: f64,
}

impl Preloader {
    pub fn new(backend: Arc<dyn MediaBackend>, timeout: Duration, micro_seek_secs: f64) -> Self {
        Self {
            backend,
            timeout,
            micro_seek_secs,
        }
    }

    pub fn from_defaults(backend: Arc<dyn MediaBackend>, defaults: &CaptureDefaults) -> Self {
        Self::new(backend, defaults.preload_timeout(), defaults.micro_seek_secs)
    }

    /// Load every asset the snapshot references.
    ///
    /// Never fails: assets that error out are left absent and listed in the
    /// report, so a missing asset simply draws nothing.
    pub async fn preload(&self, snapshot: &ProjectSnapshot) -> (AssetRegistry, PreloadReport) {
        let requests = collect_requests(snapshot);
        tracing::info!(
            assets = requests.len(),
            timeout_ms = self.timeout.as_millis() as u64,
            "Preloading assets"
        );

        let outcomes = join_all(requests.into_iter().map(|r| self.load(r))).await;

        let mut registry = AssetRegistry::new();
        let mut report = PreloadReport::default();
        for (key, outcome) in outcomes {
            match outcome {
                LoadOutcome::Loaded(handle) => {
                    registry.insert(key.clone(), handle);
                    report.loaded.push(key);
                }
                LoadOutcome::TimedOut(handle) => {
                    tracing::warn!(asset = %key, "Asset not ready before timeout");
                    if let Some(handle) = handle {
                        registry.insert(key.clone(), handle);
                    }
                    report.timed_out.push(key);
                }
                LoadOutcome::Failed(reason) => {
                    tracing::warn!(asset = %key, reason = %reason, "Asset failed to load");
                    report.failed.push((key, reason));
                }
            }
        }

        tracing::info!(
            loaded = report.loaded.len(),
            timed_out = report.timed_out.len(),
            failed = report.failed.len(),
            "Preload complete"
        );
        (registry, report)
    }

    async fn load(&self, request: AssetRequest) -> (AssetKey, LoadOutcome) {
        match request {
            AssetRequest::Image { key, source_ref } => {
                let outcome =
                    match tokio::time::timeout(self.timeout, self.backend.load_image(&source_ref))
                        .await
                    {
                        Ok(Ok(image)) => LoadOutcome::Loaded(AssetHandle::Image(image)),
                        Ok(Err(e)) => LoadOutcome::Failed(e.to_string()),
                        Err(_) => LoadOutcome::TimedOut(None),
                    };
                (key, outcome)
            }
            AssetRequest::Media {
                key,
                source_ref,
                kind,
                background,
            } => {
                let element = match self.backend.open_media(&source_ref, kind) {
                    Ok(element) => element,
                    Err(e) => return (key, LoadOutcome::Failed(e.to_string())),
                };
                if background {
                    element.set_looping(true);
                    element.set_muted(true);
                }

                let ready = tokio::time::timeout(self.timeout, element.wait_ready()).await;
                if let Ok(Err(e)) = ready {
                    return (key, LoadOutcome::Failed(e.to_string()));
                }
                if kind == MediaKind::Video {
                    element.seek(self.micro_seek_secs);
                }

                let handle = AssetHandle::Media(element);
                let outcome = match ready {
                    Ok(_) => LoadOutcome::Loaded(handle),
                    Err(_) => LoadOutcome::TimedOut(Some(handle)),
                };
                (key, outcome)
            }
        }
    }
}

fn collect_requests(snapshot: &ProjectSnapshot) -> Vec<AssetRequest> {
    let mut requests: Vec<AssetRequest> = snapshot
        .timeline
        .slides
        .iter()
        .filter(|slide| !slide.source_ref.is_empty())
        .map(|slide| {
            let key = slide.asset_key();
            let source_ref = slide.source_ref.clone();
            match slide.kind {
                SlideKind::Image => AssetRequest::Image { key, source_ref },
                SlideKind::Video => AssetRequest::Media {
                    key,
                    source_ref,
                    kind: MediaKind::Video,
                    background: false,
                },
                SlideKind::Audio => AssetRequest::Media {
                    key,
                    source_ref,
                    kind: MediaKind::Audio,
                    background: false,
                },
            }
        })
        .collect();

    let metadata = &snapshot.metadata;
    if let Some(source_ref) = metadata.background_ref.as_ref().filter(|r| !r.is_empty()) {
        requests.push(match metadata.background_kind {
            BackgroundKind::Image => AssetRequest::Image {
                key: AssetKey::Background,
                source_ref: source_ref.clone(),
            },
            BackgroundKind::Video => AssetRequest::Media {
                key: AssetKey::Background,
                source_ref: source_ref.clone(),
                kind: MediaKind::Video,
                background: true,
            },
        });
    }
    if let Some(source_ref) = metadata.cover_ref.as_ref().filter(|r| !r.is_empty()) {
        requests.push(AssetRequest::Image {
            key: AssetKey::Cover,
            source_ref: source_ref.clone(),
        });
    }
    requests
}
