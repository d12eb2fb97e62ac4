use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use eraser_rs::{
    AppState, AppStore, Config, HubSource, IncomingFile, LocalSource, ModelCache, ModelManager,
    ModelSource, OnnxBackend, PreferenceStore, SessionController, SessionState,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    ensure!(
        config.input.is_file(),
        "Input file does not exist: {}",
        config.input.display()
    );

    let data_dir = data_dir(&config)?;
    let preferences = PreferenceStore::new(data_dir.join("preferences.json"));
    let model = match config.model {
        Some(model) => model,
        None => preferences.load().await.model.unwrap_or_default(),
    };

    let source: Arc<dyn ModelSource> = match &config.model_dir {
        Some(dir) => Arc::new(LocalSource::new(dir)),
        None => Arc::new(HubSource::new()),
    };
    let mut models = ModelManager::new(
        Arc::new(OnnxBackend::new(config.device_id, config.mask_output)),
        source,
    );
    if !config.no_cache {
        models = models.with_cache(ModelCache::new(data_dir.join("models")));
    }

    let store = Arc::new(AppStore::new(AppState::default()));
    let controller = SessionController::new(
        Arc::clone(&store),
        Arc::new(models),
        config.pipeline_options(),
    )
    .with_preferences(preferences);

    let progress_bar = ProgressBar::new(100);
    progress_bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("#>-"),
    );
    let bar = progress_bar.clone();
    let _progress = store.subscribe(move |state| {
        bar.set_position(state.processing_progress.round() as u64);
        bar.set_message(state.processing_label.clone());
    });

    if controller.select_model(model).await.is_err() {
        progress_bar.abandon();
        bail!(error_message(&store, "Model could not be loaded"));
    }
    controller.set_format(config.format);
    controller.set_background(config.background);

    let state = controller
        .offer_file(IncomingFile::from_path(&config.input))
        .await;
    if state != Some(SessionState::Complete) {
        progress_bar.abandon();
        bail!(error_message(&store, "Processing did not complete"));
    }

    let Some(export) = controller.export().await else {
        progress_bar.abandon();
        bail!(error_message(&store, "Export failed"));
    };
    progress_bar.finish();

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;
    let output_path = config.output_dir.join(&export.filename);
    tokio::fs::write(&output_path, &export.bytes)
        .await
        .with_context(|| format!("Failed to save image: {}", output_path.display()))?;

    tracing::info!(path = %output_path.display(), mime = export.mime, "saved");
    Ok(())
}

fn data_dir(config: &Config) -> Result<PathBuf> {
    if let Some(dir) = &config.cache_dir {
        return Ok(dir.clone());
    }
    let dirs = ProjectDirs::from("com", "eraser-rs", "eraser-rs")
        .context("Could not determine project directories")?;
    Ok(dirs.data_dir().to_path_buf())
}

fn error_message(store: &AppStore, fallback: &str) -> String {
    store
        .snapshot()
        .error_message
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}
