use dotenvy::dotenv;
use tracing::{info, warn};

mod codec;
mod compositor;
mod config;
mod error;
mod handlers;
mod llm;
mod placement;
mod state;
mod utils;

use config::CONFIG;
use handlers::compose::{parse_compose_args, run_compose};
use state::AppState;
use utils::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let _guards = init_logging();

    for warning in &CONFIG.load_warnings {
        warn!("{warning}");
    }

    if CONFIG.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY is not set; every request will use the default placement.");
    }

    let state = AppState::from_config(&CONFIG);

    let args: Vec<String> = std::env::args().collect();
    if let Some(compose_args) = parse_compose_args(&args)? {
        let summary = run_compose(&state, compose_args).await?;
        info!(
            "Compose summary: width={} height={} bytes={}",
            summary.width, summary.height, summary.bytes_written
        );
        return Ok(());
    }

    info!(
        "Starting wall art compositor (model {})",
        CONFIG.gemini_model
    );
    handlers::http::serve(state, &CONFIG).await
}
