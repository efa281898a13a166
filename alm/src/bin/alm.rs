use std::{
    backtrace::{Backtrace, BacktraceStatus},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use alloy::primitives::{B256, Bytes};
use alm::{
    cache::SignatureCache,
    client::{ChainHandles, RpcChain, messages_from_transaction, resolve_validator_set},
    message::{Direction, Message},
    tracker::{MessageTracker, TrackerSnapshot},
};
use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use serde::Serialize;
use tokio::{select, signal, task::JoinSet};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Origin {
    Home,
    Foreign,
}

/// Follow bridge messages until they are executed on their destination chain. Every change is printed to stdout as
/// one line of JSON.
#[derive(Parser, Debug)]
struct Args {
    #[clap(long, short, default_value = "config.toml")]
    config_file: PathBuf,
    /// The chain the message was sent from.
    #[clap(long, value_enum, default_value = "home")]
    from: Origin,
    /// Track every message sent by this transaction.
    #[clap(long, conflicts_with_all = ["message_id", "data"], required_unless_present = "message_id")]
    tx_hash: Option<B256>,
    #[clap(long, requires = "data")]
    message_id: Option<B256>,
    /// The encoded message, as emitted by the origin bridge.
    #[clap(long, requires = "message_id")]
    data: Option<Bytes>,
    #[clap(long, default_value = "false")]
    log_json: bool,
}

#[derive(Serialize)]
struct Update<'a> {
    message_id: B256,
    #[serde(flatten)]
    snapshot: &'a TrackerSnapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the updates, so logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_line_number(true)
        .with_writer(std::io::stderr);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    // Set a panic hook that records the panic as a `tracing` event at the `ERROR` verbosity level.
    std::panic::set_hook(Box::new(|panic| {
        let message = match panic.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match panic.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<dyn Any>",
            },
        };
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("<unnamed>");

        let backtrace = Backtrace::capture();
        let backtrace = (backtrace.status() == BacktraceStatus::Captured)
            .then(|| backtrace.to_string())
            .unwrap_or_default();

        match panic.location() {
            Some(location) => tracing::error!(
                thread_name,
                message,
                panic.file = location.file(),
                panic.line = location.line(),
                panic.column = location.column(),
                %backtrace,
            ),
            None => tracing::error!(thread_name, message, %backtrace),
        }
    }));

    let config = alm::read_config(&args.config_file)?;

    let meter_provider = match &config.otlp_collector_endpoint {
        Some(endpoint) => {
            let exporter = MetricExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint.clone())
                .build()?;
            let reader = PeriodicReader::builder(exporter)
                .with_interval(Duration::from_secs(10))
                .build();
            let provider = SdkMeterProvider::builder().with_reader(reader).build();
            opentelemetry::global::set_meter_provider(provider.clone());
            Some(provider)
        }
        None => None,
    };

    let (home_chain, foreign_chain) = tokio::try_join!(
        RpcChain::connect(&config.home),
        RpcChain::connect(&config.foreign)
    )?;
    let (home_chain, foreign_chain) = (Arc::new(home_chain), Arc::new(foreign_chain));

    let validator_set = resolve_validator_set(&config.home, &*home_chain).await?;
    info!(
        validators = ?validator_set.validators,
        required_signatures = validator_set.required_signatures,
        "Resolved validator set"
    );

    let home = ChainHandles::new(config.home.polling_interval)
        .with_client(home_chain.clone())
        .with_bridge(home_chain.clone())
        .with_validator_set(validator_set);
    let foreign = ChainHandles::new(config.foreign.polling_interval)
        .with_client(foreign_chain.clone())
        .with_bridge(foreign_chain.clone());

    let direction = Direction::from_home(args.from == Origin::Home);
    let messages = match (args.tx_hash, args.message_id, args.data) {
        (Some(tx_hash), _, _) => {
            let origin = if direction.is_from_home() {
                &home_chain
            } else {
                &foreign_chain
            };
            messages_from_transaction(&**origin, &**origin, tx_hash, direction).await?
        }
        (None, Some(message_id), Some(data)) => vec![Message::new(message_id, data)],
        _ => return Err(anyhow!("either --tx-hash or both --message-id and --data are required")),
    };
    info!("Tracking {} message(s) sent {direction:?}", messages.len());

    let cache = Arc::new(SignatureCache::new());
    let trackers: Vec<_> = messages
        .into_iter()
        .map(|message| {
            MessageTracker::spawn(
                message,
                args.tx_hash,
                direction,
                &home,
                &foreign,
                cache.clone(),
            )
        })
        .collect();

    let mut printers = JoinSet::new();
    for tracker in &trackers {
        let message_id = tracker.message().id;
        let mut receiver = tracker.subscribe();
        printers.spawn(async move {
            loop {
                let snapshot = receiver.borrow_and_update().clone();
                let update = Update {
                    message_id,
                    snapshot: &snapshot,
                };
                println!("{}", serde_json::to_string(&update)?);

                if snapshot.status.is_final() || receiver.changed().await.is_err() {
                    return Ok::<_, anyhow::Error>(());
                }
            }
        });
    }

    let result: Result<()> = select! {
        result = async {
            while let Some(printed) = printers.join_next().await {
                printed??;
            }
            Ok::<_, anyhow::Error>(())
        } => result,
        interrupted = signal::ctrl_c() => {
            info!("Interrupted, stopping");
            interrupted.map_err(Into::into)
        }
    };

    for tracker in trackers {
        tracker.shutdown().await;
    }

    // Export whatever was recorded since the last period.
    if let Some(provider) = meter_provider {
        if let Err(e) = provider.shutdown() {
            warn!("shutting down the meter provider failed: {e:?}");
        }
    }

    result
}
