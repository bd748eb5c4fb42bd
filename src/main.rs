use chat_proxy::config::config_search_paths;
use chat_proxy::server::{ANTHROPIC_ROUTE, OPENAI_ROUTE};
use chat_proxy::{build_router, AppState, ProxyConfig, SharedLogger};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "chat-proxy",
    about = "Streaming chat proxy for Anthropic and OpenAI with one SSE chunk format",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log file path
    #[arg(long, default_value = "chat-proxy.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    let logger = SharedLogger::new(&cli.log_file)?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    // Fails here, before binding, when the Anthropic key is missing.
    let state = match AppState::from_config(config.clone(), client, logger.clone()) {
        Ok(state) => state,
        Err(e) => {
            logger.error("startup", e.to_string());
            return Err(e.into());
        }
    };

    info!("chat-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Anthropic: {} model={}", config.anthropic.base_url, config.anthropic.model);
    info!(
        "  OpenAI:    {} model={} key={}",
        config.openai.base_url,
        config.openai.model,
        if state.openai_key.is_some() { "set" } else { "missing (requests will fail)" }
    );
    info!("  Chunk ids: {:?}", config.anthropic.chunk_ids);
    info!("  Log file:  {}", cli.log_file.display());

    logger.info(
        "startup",
        format!("Starting chat-proxy port={}", config.port),
    );

    let app = build_router(Arc::new(state));
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  POST {}", ANTHROPIC_ROUTE);
    info!("  POST {}", OPENAI_ROUTE);

    axum::serve(listener, app).await?;

    Ok(())
}
