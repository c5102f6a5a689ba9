//! osc-scenes - OSC scene router
//!
//! Turns `/scene/<key>` and `/midi-scene/<fraction>` triggers into bursts of
//! OSC commands for lighting, video and audio endpoints.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use osc_scenes::cli::{self, ConsoleCommand};
use osc_scenes::config::{ConfigWatcher, DEFAULT_LISTEN_PORT};
use osc_scenes::dispatch::{Dispatcher, ShutdownMode};
use osc_scenes::drivers::{ConsoleTransport, Transport, UdpTransport};
use osc_scenes::endpoints::{Endpoint, SCENE_PREFIX};
use osc_scenes::listener::ListenerManager;
use osc_scenes::router::{InboundMessage, Router, RouterHandle, MIDI_SCENE_PREFIX};
use osc_scenes::scene::{self, midi_trigger_address, CompiledConfig};
use osc_scenes::value::TypedValue;

/// OSC scene router - fire whole scenes of OSC commands from one trigger
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the scene file
    #[arg(short, long, default_value = "scenes.yaml")]
    config: String,

    /// Port to listen on for triggers (overrides the scene file)
    #[arg(short = 'p', long)]
    listen_port: Option<u16>,

    /// Reply destination for scene activation feedback, as host:port
    /// (overrides the scene file)
    #[arg(short, long)]
    reply: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Compile the scene file, print the result and exit
    #[arg(long)]
    check: bool,

    /// With --check: print the result as JSON
    #[arg(long, requires = "check")]
    json: bool,

    /// Log outgoing messages instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Interactive console on stdin
    #[arg(long)]
    console: bool,

    /// Send pending delayed commands on exit instead of dropping them
    #[arg(long)]
    drain_on_exit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.log_json)?;

    if args.check {
        return check(&args).await;
    }

    info!("Starting osc-scenes...");
    info!("Scene file: {}", args.config);

    let transport: Arc<dyn Transport> = if args.dry_run {
        info!("Dry run: outgoing messages are logged, not sent");
        Arc::new(ConsoleTransport::new())
    } else {
        Arc::new(UdpTransport::bind().await?)
    };

    let dispatcher = Dispatcher::spawn(transport);
    info!("📤 Sending through the {} transport", dispatcher.outbox().transport_name());
    let router = Router::spawn(dispatcher.clone());

    if let Some(reply) = &args.reply {
        let reply = Endpoint::reply(reply).context("Invalid --reply")?;
        router.set_reply(Some(reply)).await;
    }

    let (config_watcher, initial) = ConfigWatcher::new(args.config.clone()).await?;

    let mut app = App {
        listener: ListenerManager::new(router.clone()),
        router,
        dispatcher,
        cli_listen_port: args.listen_port,
        config_path: args.config.clone(),
    };

    match initial {
        Ok(config) => app.apply(config).await,
        Err(e) => {
            error!("❌ {}", e);
            warn!("No configuration loaded; waiting for a valid scene file");
            // Listen anyway so triggers are visible in the log
            app.listen(args.listen_port.unwrap_or(DEFAULT_LISTEN_PORT))
                .await;
        }
    }

    let (console_tx, console_rx) = mpsc::unbounded_channel();
    if args.console {
        cli::spawn_console(console_tx);
    } else {
        drop(console_tx);
    }

    run_app(&mut app, config_watcher, console_rx, shutdown_signal()).await;

    // Cleanup
    info!("Shutting down...");
    app.listener.stop().await;
    let mode = if args.drain_on_exit {
        ShutdownMode::Drain
    } else {
        ShutdownMode::Cancel
    };
    let pending = app.router.shutdown(mode).await;
    if pending > 0 {
        match mode {
            ShutdownMode::Drain => info!("Sent {} pending delayed command(s)", pending),
            ShutdownMode::Cancel => info!("Dropped {} pending delayed command(s)", pending),
        }
    }

    info!("osc-scenes shutdown complete");
    Ok(())
}

struct App {
    router: RouterHandle,
    dispatcher: Dispatcher,
    listener: ListenerManager,
    /// Port from the command line; outranks the scene file
    cli_listen_port: Option<u16>,
    config_path: String,
}

impl App {
    /// Install a compiled configuration and bring the listener in line
    async fn apply(&mut self, config: CompiledConfig) {
        for (number, key) in config.scenes.midi_map() {
            info!(
                "🎹 MIDI {} → scene '{}' ({})",
                number,
                key,
                midi_trigger_address(*number)
            );
        }

        let port = config.listen_port_or(self.cli_listen_port);

        self.router.reload(config).await;

        let current = self.listener.local_addr().map(|a| a.port());
        let collides = self
            .dispatcher
            .outbox()
            .routes()
            .endpoints
            .find_by_port(port)
            .is_some();

        if current != Some(port) {
            self.listen(port).await;
        } else if collides {
            error!(
                "❌ An endpoint now sends to the listen port {}; stopping the listener",
                port
            );
            self.listener.stop().await;
        }
    }

    async fn listen(&mut self, port: u16) {
        let routes = self.dispatcher.outbox().routes();
        if let Err(e) = self.listener.start(port, &routes.endpoints).await {
            match self.listener.local_addr() {
                Some(addr) => warn!("Still listening on {}", addr),
                None => warn!("Not listening: {}", e),
            }
        }
    }

    async fn reload_from_disk(&mut self) {
        match scene::load(&self.config_path).await {
            Ok(config) => self.apply(config).await,
            Err(e) => warn!("⚠️  Reload failed (keeping previous scenes): {}", e),
        }
    }

    /// Returns false when the console asked to quit
    async fn on_console(&mut self, command: ConsoleCommand) -> bool {
        match command {
            ConsoleCommand::Status => {
                let status = self.router.status().await;
                cli::print_status(&status, self.router.pending().await);
            }
            ConsoleCommand::Scenes => match self.router.scenes().await {
                Some(scenes) => {
                    let status = self.router.status().await;
                    cli::print_scenes(&scenes, status.active_scene_key.as_deref());
                }
                None => println!("No configuration loaded"),
            },
            ConsoleCommand::Scene(key) => {
                self.router.trigger(InboundMessage::new(
                    format!("/{}/{}", SCENE_PREFIX, key),
                    vec![TypedValue::Int(1)],
                ));
            }
            ConsoleCommand::Midi(fraction) => {
                self.router.trigger(InboundMessage::new(
                    format!("/{}/{}", MIDI_SCENE_PREFIX, fraction),
                    Vec::new(),
                ));
            }
            ConsoleCommand::Reload => self.reload_from_disk().await,
            ConsoleCommand::Listen(port) => self.listen(port).await,
            ConsoleCommand::Stop => {
                if !self.listener.stop().await {
                    println!("Not listening");
                }
            }
            ConsoleCommand::Reply(target) => match target.as_deref().map(Endpoint::reply) {
                None => self.router.set_reply(None).await,
                Some(Ok(reply)) => self.router.set_reply(Some(reply)).await,
                Some(Err(e)) => println!("{}", e),
            },
            ConsoleCommand::Pending => println!("{} pending", self.router.pending().await),
            ConsoleCommand::Cancel => {
                let cancelled = self.router.cancel_pending().await;
                println!("{} cancelled", cancelled);
            }
            ConsoleCommand::Help => cli::print_help(),
            ConsoleCommand::Quit => return false,
        }
        true
    }
}

async fn run_app(
    app: &mut App,
    mut config_watcher: ConfigWatcher,
    mut console_rx: mpsc::UnboundedReceiver<ConsoleCommand>,
    shutdown: impl std::future::Future<Output = ()>,
) {
    info!("Ready for triggers");

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Handle scene file reload
            Some(new_config) = config_watcher.next_config() => {
                info!("📝 Scene file changed, installing new scenes...");
                app.apply(new_config).await;
            }

            // Handle console commands
            Some(command) = console_rx.recv() => {
                if !app.on_console(command).await {
                    break;
                }
            }

            // Handle shutdown signal
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }
}

async fn check(args: &Args) -> Result<()> {
    let config = scene::load(&args.config)
        .await
        .with_context(|| format!("Scene file '{}' failed to compile", args.config))?;
    let listen_port = config.listen_port_or(args.listen_port);

    if args.json {
        println!("{}", cli::report_json(&config, listen_port)?);
    } else {
        cli::print_report(&config, listen_port);
    }
    Ok(())
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
