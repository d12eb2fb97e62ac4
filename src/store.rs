//! Snapshot state container with synchronous change notification.
//!
//! Every update produces a new immutable [`AppState`] snapshot; subscribers are
//! called in registration order, outside of any lock, so they may read the store or
//! update it again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::catalog::ModelKind;
use crate::export::OutputFormat;
use crate::file::IncomingFile;
use crate::imageops::Background;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BannerVariant {
    #[default]
    Info,
    Error,
    Warning,
}

pub const INITIAL_LABEL: &str = "Preparing image...";

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub filename: Option<String>,
    /// Encoded bytes of the file as read.
    pub original_image: Option<Arc<Vec<u8>>>,
    /// PNG bytes of the processed result.
    pub processed_image: Option<Arc<Vec<u8>>>,
    pub background: Background,
    pub format: OutputFormat,
    pub is_processing: bool,
    pub processing_label: String,
    pub processing_progress: f32,
    pub error_message: Option<String>,
    pub banner: BannerVariant,
    pub is_dragging_file: bool,
    pub show_replace_dialog: bool,
    pub pending_file: Option<IncomingFile>,
    pub selected_model: ModelKind,
    pub model_ready: bool,
}

impl AppState {
    pub fn new(selected_model: ModelKind) -> Self {
        Self {
            filename: None,
            original_image: None,
            processed_image: None,
            background: Background::Transparent,
            format: OutputFormat::Png,
            is_processing: false,
            processing_label: INITIAL_LABEL.to_string(),
            processing_progress: 0.0,
            error_message: None,
            banner: BannerVariant::Info,
            is_dragging_file: false,
            show_replace_dialog: false,
            pending_file: None,
            selected_model,
            model_ready: false,
        }
    }

    /// Restore every per-image field, keeping model selection and drag state.
    pub fn clear_session(&mut self) {
        let fresh = Self::new(self.selected_model);
        *self = Self {
            selected_model: self.selected_model,
            model_ready: self.model_ready,
            is_dragging_file: self.is_dragging_file,
            ..fresh
        };
    }

    /// Show a failure message.
    pub fn show_error(&mut self, message: &str) {
        self.banner = BannerVariant::Error;
        self.error_message = Some(message.to_string());
    }

    /// Show a message about input that was rejected.
    pub fn show_warning(&mut self, message: &str) {
        self.banner = BannerVariant::Warning;
        self.error_message = Some(message.to_string());
    }

    pub fn clear_error(&mut self) {
        self.banner = BannerVariant::Info;
        self.error_message = None;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ModelKind::default())
    }
}

type Listener = Arc<dyn Fn(&AppState) + Send + Sync>;
type Listeners = Mutex<Vec<(u64, Listener)>>;

pub struct AppStore {
    state: RwLock<Arc<AppState>>,
    listeners: Arc<Listeners>,
    next_id: AtomicU64,
}

impl AppStore {
    pub fn new(initial: AppState) -> Self {
        Self {
            state: RwLock::new(Arc::new(initial)),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<AppState> {
        Arc::clone(&self.state.read())
    }

    /// Register `listener`; it is called once immediately with the current snapshot.
    #[must_use = "dropping the Subscription unsubscribes the listener"]
    pub fn subscribe(&self, listener: impl Fn(&AppState) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        self.listeners.lock().push((id, Arc::clone(&listener)));
        listener(&self.snapshot());
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Apply `patch` to a copy of the current state, publish it and notify subscribers.
    pub fn update(&self, patch: impl FnOnce(&mut AppState)) {
        let next = {
            let mut state = self.state.write();
            let mut next = AppState::clone(&state);
            patch(&mut next);
            let next = Arc::new(next);
            *state = Arc::clone(&next);
            next
        };

        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&next);
        }
    }
}

/// Keeps a listener registered until dropped.
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_fires_immediately() {
        let store = AppStore::new(AppState::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe(move |state| sink.lock().push(state.processing_label.clone()));

        assert_eq!(*seen.lock(), vec![INITIAL_LABEL.to_string()]);
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let store = AppStore::new(AppState::default());
        let before = store.snapshot();
        store.update(|state| state.is_processing = true);

        assert!(!before.is_processing);
        assert!(store.snapshot().is_processing);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let store = AppStore::new(AppState::default());
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let sub = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.update(|state| state.model_ready = true);
        drop(sub);
        store.update(|state| state.model_ready = false);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_may_read_store() {
        let store = Arc::new(AppStore::new(AppState::default()));
        let reader = Arc::clone(&store);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe(move |state| {
            assert_eq!(reader.snapshot().is_processing, state.is_processing);
            sink.lock().push(state.is_processing);
        });

        store.update(|state| state.is_processing = true);
        assert_eq!(*seen.lock(), vec![false, true]);
    }

    #[test]
    fn test_clear_session_keeps_model_fields() {
        let mut state = AppState::new(ModelKind::Modnet);
        state.model_ready = true;
        state.filename = Some("cat.png".into());
        state.processing_progress = 40.0;
        state.show_error("boom");

        state.clear_session();

        assert_eq!(state.selected_model, ModelKind::Modnet);
        assert!(state.model_ready);
        assert_eq!(state.filename, None);
        assert_eq!(state.processing_progress, 0.0);
        assert_eq!(state.banner, BannerVariant::Info);
        assert_eq!(state.error_message, None);
    }

    #[test]
    fn test_banner_variants() {
        let mut state = AppState::default();
        state.show_warning("bad color");
        assert_eq!(state.banner, BannerVariant::Warning);
        state.show_error("failed");
        assert_eq!(state.banner, BannerVariant::Error);
        state.clear_error();
        assert_eq!((state.banner, state.error_message), (BannerVariant::Info, None));
    }
}
