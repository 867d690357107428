use clap::{
    Args,
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use survivor_sync::{
    SyncConfig,
    SyncEngine,
    indexer_client::HttpIndexer,
    logging,
    polling::spawn_poll_worker,
    query::{
        QueryKey,
        QueryVariables,
    },
};
use tokio::time::Instant;
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the indexer and log every cache change.
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[arg(long)]
    indexer_url: Option<String>,

    /// Query to poll, by wire name. Repeatable.
    #[arg(long = "query", value_parser = parse_query_key)]
    queries: Vec<QueryKey>,

    /// Query variable as `name=value`; values are parsed as JSON when
    /// possible. Repeatable.
    #[arg(long = "var", value_parser = parse_variable)]
    variables: Vec<(String, serde_json::Value)>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

fn parse_query_key(raw: &str) -> Result<QueryKey, String> {
    raw.parse()
}

fn parse_variable(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

async fn handle_interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received interrupt, exiting"),
        Err(err) => warn!(%err, "Received interrupt error, exiting anyway"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => SyncConfig::load(path).wrap_err("loading sync config")?,
        None => SyncConfig::default(),
    };
    if let Some(log_dir) = cli.log_dir {
        config.logging.directory = Some(log_dir);
    }
    let _log_guard = logging::init_tracing(&config.logging)?;

    match cli.command {
        Command::Watch(args) => watch(config, args).await,
    }
}

async fn watch(mut config: SyncConfig, args: WatchArgs) -> Result<()> {
    if let Some(url) = args.indexer_url {
        config.indexer_url = Some(url);
    }
    if let Some(interval) = args.poll_interval_ms {
        config.poll_interval_ms = interval;
    }
    let indexer_url = config
        .indexer_url
        .clone()
        .ok_or_else(|| eyre!("Specify --indexer-url or set indexer_url in the config file"))?;
    let indexer = HttpIndexer::new(indexer_url)?;

    let mut variables = QueryVariables::new();
    for (name, value) in args.variables {
        variables.insert(name, value);
    }
    let queries = if args.queries.is_empty() {
        vec![QueryKey::TopScores]
    } else {
        args.queries
    };

    let (poll, mut events, worker) = spawn_poll_worker(indexer, config.poll_interval());
    for key in &queries {
        info!(%key, "polling");
        poll.enable(*key, variables.clone());
    }

    let mut engine = SyncEngine::new(&config);
    let interrupt = handle_interrupt();
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else {
                    warn!("poll worker stopped");
                    break;
                };
                let key = event.key;
                let records = event.data.len();
                let refetch = poll.refetch_fn(key);
                if engine.apply_poll(event, Some(refetch), Instant::now()) {
                    info!(%key, records, "query updated");
                    if let Some(data) = engine.cache().data(key) {
                        let payload = serde_json::to_string(data).unwrap_or_default();
                        debug!(%key, %payload, "query payload");
                    }
                }
            }
            _ = &mut interrupt => break,
        }
    }

    poll.shutdown();
    worker.await.wrap_err("poll worker panicked")?;
    Ok(())
}
