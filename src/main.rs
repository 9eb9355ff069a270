use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use xray_keeper::clock::SystemClock;
use xray_keeper::config::{self, Config};
use xray_keeper::jobs::{self, enforcement::EnforcementSettings};
use xray_keeper::provisioning::render_list;
use xray_keeper::store::{memory::MemoryStore, postgres::PgStore, CredentialRegistry};
use xray_keeper::xray::{CommandRunner, RecordingRunner, SystemCommandRunner};
use xray_keeper::{api, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = cli::Cli::parse();
    let cfg = config::load()?;

    let result = run(args, cfg).await;
    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "xray_keeper=debug,tower_http=debug".into()),
    );
    let fmt_layer = if std::env::var("KEEPER_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

async fn run(args: cli::Cli, cfg: Config) -> anyhow::Result<()> {
    let registry = open_registry(&cfg, args.ephemeral).await?;
    let runner: Arc<dyn CommandRunner> = if args.dry_run {
        tracing::info!("dry run: reload and tc commands are recorded, not executed");
        Arc::new(RecordingRunner::new())
    } else {
        Arc::new(SystemCommandRunner)
    };
    let state = Arc::new(AppState::build(
        cfg,
        registry,
        runner,
        Arc::new(SystemClock),
    ));

    match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(state.config.port);
            run_server(state, port).await
        }
        Some(cli::Commands::Key { command }) => handle_key_command(command, &state).await,
        Some(cli::Commands::Settings) => {
            println!("{}", state.provisioning.settings().render());
            Ok(())
        }
        Some(cli::Commands::Enforce { limit, bandwidth }) => {
            handle_enforce(&state, limit, bandwidth).await
        }
        Some(cli::Commands::Reconcile) => {
            let removed = state.reconciler().run_pass().await?;
            if removed.is_empty() {
                println!("No expired keys.");
            } else {
                println!("Removed {} expired key(s):", removed.len());
                for id in removed {
                    println!("  {}", id);
                }
            }
            Ok(())
        }
        None => {
            let port = state.config.port;
            run_server(state, port).await
        }
    }
}

async fn open_registry(
    cfg: &Config,
    ephemeral: bool,
) -> anyhow::Result<Arc<dyn CredentialRegistry>> {
    if ephemeral {
        tracing::warn!("using in-memory registry; keys are forgotten on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }

    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    Ok(Arc::new(db))
}

async fn run_server(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let (stop_tx, stop_rx) = jobs::stop_channel();

    let reconciler = Arc::new(state.reconciler());
    let mut handles = vec![jobs::expiration::spawn(
        reconciler,
        state.config.reconcile_interval,
        stop_rx.clone(),
    )];
    tracing::info!(
        interval_secs = state.config.reconcile_interval.as_secs(),
        "expiration job started"
    );

    if state.config.enforce_interval.is_zero() {
        tracing::info!("enforcement job disabled (KEEPER_ENFORCE_INTERVAL=0)");
    } else {
        handles.push(jobs::enforcement::spawn(
            state.enforcer.clone(),
            state.registry.clone(),
            EnforcementSettings {
                access_log: state.config.access_log_path.clone(),
                default_limit: state.config.default_device_limit,
                bandwidth: state.config.throttle_bandwidth.clone(),
            },
            state.config.enforce_interval,
            stop_rx,
        ));
        tracing::info!(
            interval_secs = state.config.enforce_interval.as_secs(),
            "enforcement job started"
        );
    }

    let app = api::app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("xray-keeper listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down background jobs");
    let _ = stop_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
}

async fn handle_key_command(cmd: cli::KeyCommands, state: &Arc<AppState>) -> anyhow::Result<()> {
    match cmd {
        cli::KeyCommands::Create {
            label,
            expires,
            devices,
        } => {
            let operator = state.config.operator_id.clone();
            let issued = state
                .provisioning
                .create_key(&operator, label, &expires, &devices)
                .await?;
            println!("{}", issued.confirmation());

            let image = &issued.artifact.image;
            std::fs::write(&image.file_name, &image.data)
                .with_context(|| format!("failed to write {}", image.file_name))?;
            println!("QR code: {}", image.file_name);
        }
        cli::KeyCommands::Revoke { id } => {
            let revoked = state.provisioning.revoke(&id).await?;
            println!("🗑 Key {} revoked", revoked.id);
            if !revoked.reloaded {
                println!("⚠️ XRay was not reloaded; run the reload command manually");
            }
        }
        cli::KeyCommands::List => {
            let keys = state.provisioning.list().await?;
            println!("{}", render_list(&keys));
        }
        cli::KeyCommands::Audit => {
            let report = state.provisioning.audit().await?;
            if report.is_clean() {
                println!("Config and registry agree.");
            } else {
                for id in &report.only_in_config {
                    println!("only in xray config: {}", id);
                }
                for id in &report.only_in_registry {
                    println!("only in registry:    {}", id);
                }
            }
        }
    }
    Ok(())
}

async fn handle_enforce(
    state: &Arc<AppState>,
    limit: Option<usize>,
    bandwidth: Option<String>,
) -> anyhow::Result<()> {
    let bandwidth = bandwidth.unwrap_or_else(|| state.config.throttle_bandwidth.clone());
    let log_path = &state.config.access_log_path;

    let throttled = match limit {
        Some(limit) => state.enforcer.enforce(log_path, limit, &bandwidth).await?,
        None => {
            state
                .enforcer
                .enforce_registered(
                    log_path,
                    state.registry.as_ref(),
                    state.config.default_device_limit,
                    &bandwidth,
                )
                .await?
        }
    };

    if throttled.is_empty() {
        println!("No clients over their device limit.");
    } else {
        println!("Throttled to {}:", bandwidth);
        for id in throttled {
            println!("  {}", id);
        }
    }
    Ok(())
}
