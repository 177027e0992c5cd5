use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use vesper_agent::prompt::PromptBuilder;
use vesper_agent::runtime::AgentRuntime;
use vesper_memory::manager::MemoryManager;
use vesper_scheduler::SchedulerHandle;
use vesper_shell::manager::TerminalManager;

mod app;
mod http;
mod mcp_bridge;
mod mcp_lifecycle;
mod provider_select;
mod stop;
mod tools;
mod update;
mod ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vesper_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > VESPER_CONFIG env > ~/.vesper/vesper.toml
    let config_path = std::env::var("VESPER_CONFIG").ok();
    let config = vesper_core::config::VesperConfig::load(config_path.as_deref())
        .unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            vesper_core::config::VesperConfig::default()
        });

    // `vesper-gateway mcp-bridge` runs the stdio MCP server instead of the
    // dashboard HTTP/WS server — used as the command Claude Code registers.
    if std::env::args().nth(1).as_deref() == Some("mcp-bridge") {
        return mcp_bridge::run(&config);
    }

    mcp_lifecycle::ensure_mcp_registration(&config);

    let provider = provider_select::build_provider(&config)?;
    let prompt = PromptBuilder::load(config.agent.soul_path.as_deref(), None);
    let agent = AgentRuntime::new(provider, prompt, config.agent.model.clone());

    let db_path = &config.database.path;
    let memory_conn = rusqlite::Connection::open(db_path)?;
    memory_conn
        .execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=3000;")?;
    vesper_memory::db::init_db(&memory_conn)?;
    let memory = MemoryManager::new(memory_conn);

    let scheduler_conn = rusqlite::Connection::open(db_path)?;
    scheduler_conn
        .execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=3000;")?;
    let scheduler = SchedulerHandle::new(scheduler_conn)?;

    let terminal = TerminalManager::new();

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(config, agent, memory, scheduler, terminal));
    let router = app::build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Vesper gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
