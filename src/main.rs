use std::path::PathBuf;

use clap::Parser;
use pageplane::{
    api::start_api_server,
    observability::{init_observability, log_config_info},
    startup::build_state,
    Config, Result, APP_NAME, VERSION,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pageplane")]
#[command(about = "MCP gateway for diagram conversion and Confluence publishing")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Bind address override (PAGEPLANE_BIND_ADDRESS)
    #[arg(long)]
    bind: Option<String>,

    /// Port override (PAGEPLANE_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Page cache location override (PAGEPLANE_CACHE_PATH)
    #[arg(long)]
    cache_path: Option<PathBuf>,

    /// Project directory searched for .pageplane.toml (PAGEPLANE_PROJECT_DIR)
    #[arg(long)]
    project_dir: Option<PathBuf>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(cache_path) = self.cache_path {
            config.publish.cache_path = cache_path;
        }
        if let Some(project_dir) = self.project_dir {
            config.publish.project_dir = Some(project_dir);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load .env file if it exists; must happen before any config is read
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let mut config = Config::from_env()?;
    args.apply(&mut config);
    config.validate()?;

    init_observability(&config.observability)?;
    info!(app_name = APP_NAME, version = VERSION, "Starting pageplane MCP gateway");
    log_config_info(&config);

    let state = match build_state(&config).await {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, kind = e.kind(), "Startup failed");
            return Err(e);
        }
    };

    start_api_server(&config.server, state).await?;

    info!("pageplane shutdown completed");
    Ok(())
}
