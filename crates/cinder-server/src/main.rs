//! The `cinder` binary: loads configuration, starts the TCP listener on a
//! tokio runtime and drives the simulation tick on the main thread.

use std::io::BufRead;
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use cinder_config::{CliArgs, Config};
use cinder_net::{FrameConfig, GameServer, ServerConfig};
use cinder_protocol::{ProtocolVersion, SUPPORTED_VERSIONS};
use cinder_server::{Simulation, SimulationSettings, TickClock};
use clap::Parser;
use crossbeam_channel::{Receiver, unbounded};
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let config_dir = args.config.clone().unwrap_or_else(Config::default_dir);

    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("cannot load {}: {err}", config_dir.display());
            return ExitCode::FAILURE;
        }
    };
    config.apply_cli_overrides(&args);
    if let Err(err) = config.validate() {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    cinder_log::init_logging(&config.logging);

    match config.protocol.version.parse::<ProtocolVersion>() {
        Ok(version) if SUPPORTED_VERSIONS.contains(&version) => {}
        _ => warn!("Version {} is not supported.", config.protocol.version),
    }
    if !config.server.online_mode {
        info!("running in offline mode");
    }

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("server failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn net_config(config: &Config) -> std::io::Result<ServerConfig> {
    let ip: IpAddr = config
        .server
        .bind_address
        .parse()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
    Ok(ServerConfig {
        bind_addr: SocketAddr::new(ip, config.server.port),
        max_connections: config.server.max_players,
        outbound_capacity: config.network.outbound_queue_capacity,
        frame: FrameConfig {
            max_payload_size: config.network.max_frame_size,
        },
        idle_timeout: Some(Duration::from_secs(u64::from(config.network.timeout_seconds)))
            .filter(|t| !t.is_zero()),
    })
}

fn run(config: &Config) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("cinder-net")
        .build()?;

    let (events_tx, events_rx) = unbounded();
    let server = Arc::new(GameServer::new(net_config(config)?, events_tx));
    let running = Arc::new(AtomicBool::new(true));

    let listener = Arc::clone(&server);
    let listener_running = Arc::clone(&running);
    let accept_task = runtime.spawn(async move {
        if let Err(err) = listener.run().await {
            error!("listener stopped: {err}");
        }
        listener_running.store(false, Ordering::SeqCst);
    });

    let signal_server = Arc::clone(&server);
    let signal_running = Arc::clone(&running);
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            signal_running.store(false, Ordering::SeqCst);
            signal_server.shutdown();
        }
    });

    let console = spawn_console_reader();
    let mut simulation = Simulation::new(SimulationSettings::from_config(config), events_rx);
    let mut clock = TickClock::new(config.network.tick_rate);
    info!(
        "simulating at {} ticks per second, protocol {}",
        config.network.tick_rate, config.protocol.version
    );

    while running.load(Ordering::SeqCst) {
        for line in console.try_iter() {
            simulation.run_console_command(&line);
        }
        let now = Instant::now();
        clock.advance(now, |_| {
            simulation.tick(Instant::now());
        });
        std::thread::sleep(clock.time_until_next(Instant::now()));
    }

    server.shutdown();
    let _ = runtime.block_on(accept_task);
    runtime.shutdown_timeout(Duration::from_secs(1));
    info!("stopped after {} ticks", simulation.ticks());
    Ok(())
}

/// Forwards stdin lines to the tick thread as console commands.
fn spawn_console_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    let spawned = std::thread::Builder::new()
        .name("cinder-console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines().map_while(Result::ok) {
                let line = line.trim().trim_start_matches('/').to_string();
                if !line.is_empty() && tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(err) = spawned {
        warn!("console input unavailable: {err}");
    }
    rx
}
