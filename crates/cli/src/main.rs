use std::sync::Arc;

use {
    clap::{Parser, Subcommand},
    dormbot_channel::Dispatcher,
    dormbot_engine::{Engine, RoleSet},
    dormbot_gateway::{Config, HttpMessenger},
    dormbot_media::MediaIngest,
    dormbot_store::MemoryStore,
    dormbot_verify::HttpSlipVerifier,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "dormbot", about = "Dormbot — dormitory chat assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Config file path (overrides discovery).
    #[arg(long, global = true, env = "DORMBOT_CONFIG")]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server (default when no subcommand is provided).
    Serve,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_ansi(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "dormbot starting");

    match cli.command {
        None | Some(Commands::Serve) => serve(cli).await,
    }
}

async fn serve(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let store = Arc::new(MemoryStore::new());

    let roles = Arc::new(RoleSet::new());
    for id in &config.roles.admins {
        roles.add_admin(id);
    }
    for id in &config.roles.staff {
        roles.add_staff(id);
    }
    roles.seed_from_store(store.as_ref()).await?;

    let messenger = Arc::new(HttpMessenger::new(
        config.channel.api_base.clone(),
        config.channel.access_token.clone(),
    ));
    let media = MediaIngest::new(config.media.dir.clone(), config.media.public_base.clone())
        .with_max_width(config.media.max_width);
    let verifier = Arc::new(HttpSlipVerifier::new(
        config.verifier.endpoint.clone(),
        config.verifier.token.clone(),
    ));

    let dispatch = Dispatcher::new(Arc::clone(&messenger) as Arc<dyn dormbot_channel::Outbound>);
    let ledger = dispatch.ledger();
    let engine = Engine::new(
        store,
        roles,
        media,
        messenger as Arc<dyn dormbot_media::ContentSource>,
        verifier,
        dispatch,
    );

    dormbot_gateway::serve(&config, engine, ledger).await?;
    Ok(())
}
