use clap::{Parser, ValueEnum};
use roundledger_adapters::InMemoryNativeWallet;
use roundledger_core::distribution::DEFAULT_NATIVE_RESERVE;
use roundledger_core::{
    AccountId, Amount, EngineConfig, GenesisAccounts, NativeDistributor, NativeRewardPolicy,
};
use roundledger_service::settler::{SettlementTrigger, SettlerConfig};
use roundledger_service::storage::JournalStorageConfig;
use roundledger_service::{build_router, ServiceConfig, ServiceState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum JournalStorageMode {
    Auto,
    Memory,
    Postgres,
}

#[derive(Debug, Parser)]
#[command(name = "roundledgerd", version, about = "RoundLedger REST service")]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8095
    #[arg(long, default_value = "127.0.0.1:8095", env = "ROUNDLEDGER_LISTEN")]
    listen: SocketAddr,
    /// Privileged operator account.
    #[arg(long, default_value = "owner", env = "ROUNDLEDGER_OWNER")]
    owner: String,
    #[arg(long, default_value = "reward-pool", env = "ROUNDLEDGER_REWARD_POOL")]
    reward_pool: String,
    #[arg(long, default_value = "marketing-pool", env = "ROUNDLEDGER_MARKETING_POOL")]
    marketing_pool: String,
    /// Receives the full supply at genesis. Defaults to the owner.
    #[arg(long, env = "ROUNDLEDGER_INITIAL_HOLDER")]
    initial_holder: Option<String>,
    #[arg(
        long,
        default_value = "0x000000000000000000000000000000000000dead",
        env = "ROUNDLEDGER_BURN_SINK"
    )]
    burn_sink: String,
    /// Identity the settlement trigger settles as. Defaults to the owner.
    #[arg(long, env = "ROUNDLEDGER_SETTLER")]
    settler: Option<String>,
    /// Seconds between settlement attempts.
    #[arg(long, default_value_t = 300, env = "ROUNDLEDGER_SETTLE_INTERVAL_SECS")]
    settle_interval_secs: u64,
    /// Seconds to wait after startup before the first settlement attempt.
    #[arg(long, default_value_t = 5, env = "ROUNDLEDGER_STARTUP_DELAY_SECS")]
    startup_delay_secs: u64,
    /// Disable the settlement trigger and serve REST only.
    #[arg(long, default_value_t = false)]
    no_settler: bool,
    /// Initial native balance of the operator wallet, in base units.
    #[arg(long, default_value_t = 0, env = "ROUNDLEDGER_NATIVE_POOL_SEED")]
    native_pool_seed: Amount,
    /// Percent of the available native balance paid out per round.
    #[arg(long, default_value_t = 100, env = "ROUNDLEDGER_NATIVE_REWARD_PERCENT")]
    native_reward_percent: u128,
    /// Native balance kept back from every distribution, in base units.
    #[arg(long, default_value_t = DEFAULT_NATIVE_RESERVE, env = "ROUNDLEDGER_NATIVE_RESERVE")]
    native_reserve: Amount,
    /// Journal persistence backend. `auto` picks postgres when a database url is configured.
    #[arg(long, value_enum, default_value_t = JournalStorageMode::Auto, env = "ROUNDLEDGER_JOURNAL_STORAGE")]
    journal_storage: JournalStorageMode,
    /// PostgreSQL url for journal persistence.
    #[arg(long, env = "ROUNDLEDGER_DATABASE_URL")]
    database_url: Option<String>,
    /// Max PostgreSQL pool connections for journal persistence.
    #[arg(long, default_value_t = 5, env = "ROUNDLEDGER_PG_MAX_CONNECTIONS")]
    pg_max_connections: u32,
}

fn resolve_journal_storage(cli: &Cli) -> anyhow::Result<JournalStorageConfig> {
    let resolved_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let storage = match cli.journal_storage {
        JournalStorageMode::Memory => JournalStorageConfig::memory(),
        JournalStorageMode::Postgres => {
            let database_url = resolved_url.ok_or_else(|| {
                anyhow::anyhow!("journal_storage=postgres requires --database-url or DATABASE_URL")
            })?;
            JournalStorageConfig::postgres(database_url, cli.pg_max_connections)
        }
        JournalStorageMode::Auto => {
            if let Some(database_url) = resolved_url {
                JournalStorageConfig::postgres(database_url, cli.pg_max_connections)
            } else {
                JournalStorageConfig::memory()
            }
        }
    };

    Ok(storage)
}

fn engine_config(cli: &Cli) -> EngineConfig {
    let owner = AccountId::new(&cli.owner);
    EngineConfig {
        genesis: GenesisAccounts {
            initial_holder: cli
                .initial_holder
                .as_deref()
                .map(AccountId::new)
                .unwrap_or_else(|| owner.clone()),
            owner,
            reward_pool: AccountId::new(&cli.reward_pool),
            marketing_pool: AccountId::new(&cli.marketing_pool),
            burn_sink: AccountId::new(&cli.burn_sink),
        },
        ..EngineConfig::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "roundledger_service=info,roundledger_core=info,info".to_string()
        }))
        .init();

    let cli = Cli::parse();
    let journal_storage = resolve_journal_storage(&cli)?;
    info!(backend = journal_storage.label(), "journal storage resolved");
    let engine = engine_config(&cli);
    let settler = cli
        .settler
        .as_deref()
        .map(AccountId::new)
        .unwrap_or_else(|| engine.genesis.owner.clone());
    let state = ServiceState::bootstrap(ServiceConfig {
        engine,
        journal_storage,
    })
    .await?;
    let app = build_router(state.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let settler_task = if cli.no_settler {
        None
    } else {
        let wallet = Arc::new(InMemoryNativeWallet::new("operator", cli.native_pool_seed));
        let distributor = NativeDistributor::new(
            NativeRewardPolicy {
                reward_percent: cli.native_reward_percent,
                reserve: cli.native_reserve,
                ..NativeRewardPolicy::default()
            },
            wallet,
        );
        let trigger = SettlementTrigger::new(
            state.clone(),
            Some(Arc::new(distributor)),
            SettlerConfig {
                settler,
                interval_secs: cli.settle_interval_secs,
                startup_delay_secs: cli.startup_delay_secs,
            },
        );
        Some(tokio::spawn(trigger.run(shutdown_rx)))
    };

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("roundledger-service REST listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
            info!("shutdown requested");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(task) = settler_task {
        task.await?;
    }

    Ok(())
}
