//! Start a chat-proxy server programmatically.
//!
//! Usage:
//!   export ANTHROPIC_API_KEY=sk-ant-...
//!   export OPENAI_API_KEY=sk-...        # optional
//!   cargo run --example basic_proxy

use chat_proxy::server::{ANTHROPIC_ROUTE, OPENAI_ROUTE};
use chat_proxy::{build_router, AppState, ProxyConfig, SharedLogger};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ProxyConfig::find_and_load(None)?;
    println!("Anthropic: {} ({})", config.anthropic.base_url, config.anthropic.model);
    println!("OpenAI:    {} ({})", config.openai.base_url, config.openai.model);

    let logger = SharedLogger::new("proxy-example.log")?;
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let port = config.port;
    let state = Arc::new(AppState::from_config(config, client, logger)?);

    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("Listening on http://{}", addr);
    println!();
    println!(
        "  curl -N -X POST http://localhost:{}{} -H 'Content-Type: application/json' \\",
        port, ANTHROPIC_ROUTE
    );
    println!("       -d '{{\"messages\":[{{\"role\":\"user\",\"content\":\"Hello\"}}]}}'");
    println!("  (same body works against {})", OPENAI_ROUTE);

    axum::serve(listener, app).await?;
    Ok(())
}
