use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ragbot::embedder::build_embedder;
use ragbot::llm::build_provider;
use ragbot::{web, Cli, RagApp};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = cli.build_settings()?;
    let embedder = build_embedder(&settings.embedder).context("failed to set up embeddings")?;
    info!(
        model = embedder.model_id(),
        dimensions = embedder.dimensions(),
        "embedder ready"
    );

    let mut app = RagApp::new(&settings, embedder);
    match build_provider(&settings.llm) {
        Ok(provider) => {
            info!(provider = provider.name(), model = %settings.llm.model, "llm ready");
            app = app.with_llm(provider);
        }
        Err(err) => warn!(error = %err, "llm unavailable; chat stays disabled until it is configured"),
    }
    app.startup();

    // Blocking HTTP clients inside the app must be dropped outside the runtime.
    let shared = Arc::new(Mutex::new(app));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(web::serve(settings.bind, Arc::clone(&shared)))
}
