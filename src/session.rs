//! Processing session controller.
//!
//! One session runs per image: `PreparingModel → Resizing → Inferring → Compositing →
//! Complete`. Every session captures a [`GenerationToken`] when it starts and checks it
//! after each suspension point through [`SessionController::enter`]; once the token is
//! stale the session ends as `Cancelled` and publishes nothing further.

use std::sync::Arc;

use image::RgbaImage;
use parking_lot::Mutex;

use crate::catalog::ModelKind;
use crate::config::PipelineOptions;
use crate::dragdrop::{DragEvent, DragOutcome, DragTracker};
use crate::errors::{EraserError, Result};
use crate::export::{compose, Export, OutputFormat};
use crate::file::{download_filename, IncomingFile};
use crate::generation::{Generation, GenerationToken};
use crate::imageops::{apply_alpha, fit_mask, resize_to_bound, resolve, Background, MaskResult, Resolved};
use crate::model::ModelManager;
use crate::preferences::PreferenceStore;
use crate::progress::{ProgressAnimation, ProgressLevel};
use crate::store::{AppState, AppStore};

/// Fixed strings shown to the user. Underlying errors are only logged.
pub mod messages {
    pub const NOT_AN_IMAGE: &str = "Only image files are supported.";
    pub const READ_FAILED: &str = "Failed to read this file. Try another image.";
    pub const MODEL_FAILED: &str = "Failed to load AI model. Please refresh the page.";
    pub const PROCESSING_FAILED: &str = "Failed to remove background. Please try another image.";
    pub const EXPORT_WITHOUT_IMAGE: &str = "Upload and process an image before downloading.";
    pub const EXPORT_FAILED: &str = "Download failed. Please try another image or format.";
    pub const EMPTY_COLOR: &str = "Enter a color value, for example #FAD2E1.";
    pub const INVALID_COLOR: &str = "Color not recognized. Use #hex, rgb(), or a CSS color name.";

    pub fn model_unavailable(name: &str) -> String {
        format!("{name} needs GPU acceleration, which is unavailable.")
    }
}

/// Progress labels of the pipeline phases.
pub mod labels {
    pub const PROCESSING: &str = "Processing image...";
    pub const ANALYZING: &str = "Analyzing image...";
    pub const REMOVING: &str = "Removing background...";
    pub const APPLYING: &str = "Applying mask...";
    pub const RENDERING: &str = "Rendering...";
    pub const COMPLETE: &str = "Complete";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    PreparingModel,
    Resizing,
    Inferring,
    Compositing,
    Complete,
    Cancelled,
    Failed,
}

/// Why a session stopped before completing.
enum Halt {
    Stale,
    Failed {
        message: &'static str,
        error: EraserError,
    },
}

type Step<T> = std::result::Result<T, Halt>;

fn fail(message: &'static str) -> impl FnOnce(EraserError) -> Halt {
    move |error| Halt::Failed { message, error }
}

pub struct SessionController {
    store: Arc<AppStore>,
    models: Arc<ModelManager>,
    generation: Generation,
    options: PipelineOptions,
    preferences: Option<PreferenceStore>,
    drag: Mutex<DragTracker>,
}

impl SessionController {
    pub fn new(store: Arc<AppStore>, models: Arc<ModelManager>, options: PipelineOptions) -> Self {
        Self {
            store,
            models,
            generation: Generation::new(),
            options,
            preferences: None,
            drag: Mutex::new(DragTracker::new()),
        }
    }

    pub fn with_preferences(mut self, preferences: PreferenceStore) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn store(&self) -> &Arc<AppStore> {
        &self.store
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    /// Take a file picked or dropped by the user.
    ///
    /// Non-images only set the error message. While an image is shown or processing,
    /// the file is parked behind the replace dialog. Otherwise a session starts and its
    /// final state is returned.
    pub async fn offer_file(&self, file: IncomingFile) -> Option<SessionState> {
        if !file.is_image() {
            tracing::debug!(name = %file.name, mime = %file.mime, "rejected non-image file");
            self.store.update(|state| state.show_warning(messages::NOT_AN_IMAGE));
            return None;
        }

        let snapshot = self.store.snapshot();
        if snapshot.is_processing || snapshot.original_image.is_some() {
            self.store.update(|state| {
                state.pending_file = Some(file);
                state.show_replace_dialog = true;
            });
            return None;
        }

        Some(self.handle_file(file).await)
    }

    /// Start the parked file, if any.
    pub async fn confirm_replace(&self) -> Option<SessionState> {
        let mut pending = None;
        self.store.update(|state| {
            pending = state.pending_file.take();
            state.show_replace_dialog = false;
        });
        match pending {
            Some(file) => Some(self.handle_file(file).await),
            None => None,
        }
    }

    pub fn cancel_replace(&self) {
        self.store.update(|state| {
            state.pending_file = None;
            state.show_replace_dialog = false;
        });
    }

    /// Run a full session for `file`, superseding any session in flight.
    #[tracing::instrument(skip(self, file), fields(name = %file.name))]
    pub async fn handle_file(&self, file: IncomingFile) -> SessionState {
        let token = self.generation.advance();
        tracing::debug!(generation = token.id(), "session started");

        self.store.update(|state| {
            state.clear_session();
            state.filename = Some(file.name.clone());
            state.is_processing = true;
            state.processing_label = labels::PROCESSING.to_string();
        });

        let level = ProgressLevel::new();
        let outcome = self.run(&token, &level, &file).await;
        self.finish(&token, outcome)
    }

    async fn run(&self, token: &GenerationToken, level: &ProgressLevel, file: &IncomingFile) -> Step<()> {
        let bytes = file.read().await.map_err(fail(messages::READ_FAILED))?;
        self.enter(token, SessionState::PreparingModel)?;
        self.store.update(|state| state.original_image = Some(Arc::clone(&bytes)));

        let selected = self.store.snapshot().selected_model;
        self.prepare_model(token, level, selected)
            .await
            .map_err(fail(messages::MODEL_FAILED))?;
        self.enter(token, SessionState::Resizing)?;
        self.milestone(token, level, 20.0, labels::ANALYZING);

        let max_dimension = self.options.max_dimension;
        let resized = tokio::task::spawn_blocking(move || -> Result<RgbaImage> {
            let decoded = image::load_from_memory(&bytes)?;
            Ok(resize_to_bound(&decoded.into_rgba8(), max_dimension))
        })
        .await
        .map_err(|e| EraserError::image("decode task", e))
        .and_then(|decoded| decoded)
        .map_err(fail(messages::READ_FAILED))?;
        self.enter(token, SessionState::Inferring)?;
        tracing::debug!(width = resized.width(), height = resized.height(), "image bounded");
        self.milestone(token, level, 40.0, labels::REMOVING);

        let result = {
            let _animation = self.animate(token, level);
            self.models.invoke(&resized).await
        }
        .map_err(fail(messages::PROCESSING_FAILED))?;
        self.enter(token, SessionState::Compositing)?;
        self.milestone(token, level, 70.0, labels::APPLYING);

        let processed = composite(&resized, result).map_err(fail(messages::PROCESSING_FAILED))?;
        self.milestone(token, level, 90.0, labels::RENDERING);
        let png = tokio::task::spawn_blocking(move || encode_png(&processed))
            .await
            .map_err(|e| EraserError::image("render task", e))
            .and_then(|encoded| encoded)
            .map_err(fail(messages::PROCESSING_FAILED))?;
        self.enter(token, SessionState::Complete)?;

        self.store.update(|state| {
            state.processed_image = Some(Arc::new(png));
            state.is_processing = false;
            state.processing_progress = 100.0;
            state.processing_label = labels::COMPLETE.to_string();
        });
        Ok(())
    }

    /// Map a halted or finished run onto its terminal state, publishing failures only
    /// for the current generation.
    fn finish(&self, token: &GenerationToken, outcome: Step<()>) -> SessionState {
        let state = match outcome {
            Ok(()) => SessionState::Complete,
            Err(Halt::Failed { message, error }) if token.is_current() => {
                tracing::error!(generation = token.id(), error = ?error, "session failed");
                self.store.update(|state| {
                    state.is_processing = false;
                    state.show_error(message);
                });
                SessionState::Failed
            }
            Err(Halt::Failed { error, .. }) => {
                tracing::debug!(generation = token.id(), error = %error, "stale session failure discarded");
                SessionState::Cancelled
            }
            Err(Halt::Stale) => SessionState::Cancelled,
        };
        tracing::debug!(generation = token.id(), ?state, "session finished");
        state
    }

    /// The single generation check every step passes after resuming.
    fn enter(&self, token: &GenerationToken, next: SessionState) -> Step<()> {
        if token.is_current() {
            tracing::debug!(generation = token.id(), state = ?next, "session transition");
            Ok(())
        } else {
            tracing::debug!(
                generation = token.id(),
                current = self.generation.current(),
                skipped = ?next,
                "stale session result discarded"
            );
            Err(Halt::Stale)
        }
    }

    /// Publish a real progress milestone, starting a new progress phase.
    fn milestone(&self, token: &GenerationToken, level: &ProgressLevel, percent: f32, label: &str) {
        if !token.is_current() {
            return;
        }
        let percent = percent.min(self.options.animation_cap);
        level.reset(percent);
        self.store.update(|state| {
            state.processing_progress = percent;
            state.processing_label = label.to_string();
        });
    }

    fn animate(&self, token: &GenerationToken, level: &ProgressLevel) -> ProgressAnimation {
        let store = Arc::clone(&self.store);
        let publisher = token.clone();
        ProgressAnimation::start(
            &self.options,
            level.clone(),
            token.clone(),
            Arc::new(move |percent: f32| {
                if publisher.is_current() {
                    store.update(|state| state.processing_progress = percent);
                }
            }),
        )
    }

    async fn prepare_model(&self, token: &GenerationToken, level: &ProgressLevel, kind: ModelKind) -> Result<()> {
        if self.models.current() != Some(kind) {
            self.models
                .ensure_loaded(kind, &|percent: f32, status: &str| {
                    self.milestone(token, level, percent, status)
                })
                .await?;
        }
        // A load finished under a superseded token leaves the flag to the next session.
        if token.is_current() {
            self.store.update(|state| state.model_ready = state.selected_model == kind);
        }
        Ok(())
    }

    /// Load the selected model outside of any session, reporting progress in the store.
    pub async fn load_selected_model(&self) -> Result<()> {
        let kind = self.store.snapshot().selected_model;
        let publish = |percent: f32, status: &str| {
            self.store.update(|state| {
                if !state.is_processing {
                    state.processing_progress = percent;
                    state.processing_label = status.to_string();
                }
            });
        };

        match self.models.ensure_loaded(kind, &publish).await {
            Ok(()) => {
                self.store.update(|state| {
                    if state.selected_model == kind {
                        state.model_ready = true;
                    }
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!(model = %kind, error = ?e, "model load failed");
                self.store.update(|state| {
                    state.model_ready = false;
                    state.show_error(messages::MODEL_FAILED);
                });
                Err(e)
            }
        }
    }

    /// Switch to `kind`, remembering the choice. Models that need acceleration are
    /// refused with a warning when it is unavailable.
    pub async fn select_model(&self, kind: ModelKind) -> Result<()> {
        let info = kind.info();
        if !kind.is_available(self.models.accelerated_available()) {
            self.store
                .update(|state| state.show_warning(&messages::model_unavailable(info.name)));
            return Err(EraserError::validation(
                "model",
                format!("{} requires accelerated compute", info.name),
            ));
        }

        if let Some(preferences) = &self.preferences {
            preferences.update(|prefs| prefs.model = Some(kind)).await;
        }
        self.store.update(|state| {
            state.selected_model = kind;
            state.model_ready = false;
            state.clear_error();
        });
        self.load_selected_model().await
    }

    pub fn set_background(&self, background: Background) {
        self.store.update(|state| {
            state.background = background;
            state.clear_error();
        });
    }

    /// Parse and apply a user-typed color. Returns whether it was accepted.
    pub fn set_background_str(&self, input: &str) -> bool {
        if input.trim().is_empty() {
            self.store.update(|state| state.show_warning(messages::EMPTY_COLOR));
            return false;
        }
        match input.parse::<Background>() {
            Ok(background) => {
                self.set_background(background);
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "background rejected");
                self.store.update(|state| state.show_warning(messages::INVALID_COLOR));
                false
            }
        }
    }

    pub fn set_format(&self, format: OutputFormat) {
        self.store.update(|state| state.format = format);
    }

    /// Encode the processed image in the chosen format over the chosen background.
    pub async fn export(&self) -> Option<Export> {
        let snapshot = self.store.snapshot();
        let Some(processed) = snapshot.processed_image.clone() else {
            self.store.update(|state| state.show_warning(messages::EXPORT_WITHOUT_IMAGE));
            return None;
        };
        let (format, background) = (snapshot.format, snapshot.background);

        let composed = tokio::task::spawn_blocking(move || compose(&processed, format, background))
            .await
            .map_err(|e| EraserError::image("export task", e))
            .and_then(|composed| composed);
        match composed {
            Ok(bytes) => Some(Export {
                filename: download_filename(snapshot.filename.as_deref(), format.extension()),
                bytes,
                mime: format.mime(),
            }),
            Err(e) => {
                tracing::error!(%format, error = ?e, "export failed");
                self.store.update(|state| state.show_error(messages::EXPORT_FAILED));
                None
            }
        }
    }

    /// Abandon the current image and return to the empty state.
    pub fn discard(&self) {
        let token = self.generation.advance();
        tracing::debug!(generation = token.id(), "session discarded");
        self.store.update(AppState::clear_session);
    }

    /// Feed a raw drag event through the depth tracker; a dropped file is offered for
    /// processing.
    pub async fn handle_drag(&self, event: DragEvent) -> DragOutcome {
        let outcome = self.drag.lock().handle(event);
        if let Some(dragging) = outcome.dragging_changed {
            self.store.update(|state| state.is_dragging_file = dragging);
        }
        if let Some(file) = outcome.dropped.clone() {
            self.offer_file(file).await;
        }
        outcome
    }
}

/// Turn a model result into the final RGBA image at the size of `source`.
fn composite(source: &RgbaImage, result: MaskResult) -> Result<RgbaImage> {
    match resolve(result)? {
        Resolved::Composited(image) => Ok(image),
        Resolved::Mask(mask) => {
            let (width, height) = source.dimensions();
            apply_alpha(source, &fit_mask(mask, width, height))
        }
    }
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| EraserError::Encode {
            format: "png".to_string(),
            source: e.into(),
        })?;
    Ok(bytes)
}
