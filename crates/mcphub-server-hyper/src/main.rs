/*!
* 文件名: main.rs
* 作者: JQQ
* 创建日期: 2026/01/06
* 最后修改日期: 2026/01/16
* 版权: 2023 JQQ. All rights reserved.
* 依赖: clap, tokio, tracing-subscriber
* 描述: mcphub 可执行入口 / mcphub executable entry point
*/

use clap::Parser;
use mcphub_core::{HubConfig, McpHub};
use mcphub_server_hyper::{HubServerBuilder, JsonFileStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcphub")]
#[command(about = "Run several MCP backends behind one local endpoint, grouped into profiles")]
#[command(version)]
struct Cli {
    /// JSON config file holding backends, profiles and hub settings
    #[arg(short, long, default_value = "mcphub.json")]
    config: PathBuf,

    /// Listening port (overrides the stored setting)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Import an `mcpServers` JSON file before starting
    #[arg(long)]
    import: Option<PathBuf>,

    /// Do not start enabled backends at launch
    #[arg(long)]
    no_auto_start: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let store = Arc::new(JsonFileStore::open(&cli.config).await?);
    let mut config = HubConfig::load(store.as_ref()).await?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.no_auto_start {
        config.auto_start = false;
    }

    let hub = McpHub::builder(store).config(config).build().await?;
    if let Some(path) = &cli.import {
        let raw: serde_json::Value = serde_json::from_slice(&tokio::fs::read(path).await?)?;
        let ids = hub.import(&raw).await?;
        info!("Imported {} backends from {}", ids.len(), path.display());
    }

    // 端口绑定失败直接退出 / A failed bind ends the process
    let server = HubServerBuilder::new(hub.clone()).bind().await?;
    info!("Default profile: {}", hub.url_for(None));
    for profile in hub.router().list_profiles() {
        info!("Profile {}: {}", profile.id, hub.url_for(Some(&profile.id)));
    }

    let starter = hub.clone();
    tokio::spawn(async move {
        for (id, outcome) in starter.initialize().await {
            if let Err(e) = outcome {
                if e.needs_auth() {
                    warn!("Backend {} is waiting for authorization", id);
                }
            }
        }
    });

    server.run().await?;
    Ok(())
}
