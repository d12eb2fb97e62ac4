pub mod cache;
pub mod catalog;
pub mod config;
pub mod dragdrop;
pub mod errors;
pub mod export;
pub mod file;
pub mod generation;
pub mod imageops;
pub mod model;
pub mod onnx;
pub mod preferences;
pub mod progress;
pub mod session;
pub mod source;
pub mod store;
pub mod traits;

pub mod mocks;

pub use cache::ModelCache;
pub use catalog::{Device, ModelInfo, ModelKind};
pub use config::{Config, PipelineOptions};
pub use dragdrop::{DragEvent, DragOutcome, DragTracker};
pub use errors::{EraserError, Result};
pub use export::{compose, Export, OutputFormat};
pub use file::IncomingFile;
pub use generation::{Generation, GenerationToken};
pub use model::ModelManager;
pub use onnx::{MaskOutput, OnnxBackend};
pub use preferences::{PreferenceStore, Preferences, ThemeMode};
pub use session::{SessionController, SessionState};
pub use source::{HubSource, LocalSource};
pub use store::{AppState, AppStore, BannerVariant, Subscription};
pub use traits::*;
