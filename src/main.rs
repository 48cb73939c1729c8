use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use docqa::config::Settings;
use docqa::embeddings::HttpEmbedder;
use docqa::llm::LlmClient;
use docqa::rag::RagEngine;
use docqa::{server, AppState};

#[derive(Parser)]
#[command(name = "docqa", about = "PDF question answering service", version)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let settings = Settings::from_env()?;
    settings.init_dirs()?;
    log::info!(
        "provider={} model={} index={}",
        settings.provider.as_str(),
        settings.llm_model,
        settings.index_db_path().display()
    );

    let embedder = HttpEmbedder::from_settings(&settings)?;
    let engine = RagEngine::from_settings(&settings, Box::new(embedder));
    let llm = LlmClient::from_settings(&settings)?;

    let state = Arc::new(AppState {
        engine,
        llm,
        settings,
    });

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    server::run(state, addr).await?;
    Ok(())
}
