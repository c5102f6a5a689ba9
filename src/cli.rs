//! Interactive console and terminal reports

use crate::router::RouterStatus;
use crate::scene::{midi_trigger_address, CompiledConfig, Scene, SceneTable};
use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A line typed at the console, parsed
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Status,
    Scenes,
    /// Inject `/scene/<key> 1`
    Scene(String),
    /// Inject `/midi-scene/<fraction>`
    Midi(f64),
    Reload,
    Listen(u16),
    Stop,
    /// `reply host:port` or `reply off`
    Reply(Option<String>),
    Pending,
    Cancel,
    Help,
    Quit,
}

const HELP: &str = "\
  status               show the active scene and listener state
  scenes               list scenes and their MIDI triggers
  scene <key>          activate a scene as if /scene/<key> 1 arrived
  midi <fraction>      trigger /midi-scene/<fraction>
  reload               re-read the scene file
  listen <port>        (re)start the listener on a port
  stop                 stop listening
  reply <host:port>    set the reply destination (`reply off` clears it)
  pending              count delayed commands not yet sent
  cancel               drop all delayed commands
  quit                 exit";

pub fn parse_line(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Err(String::new());
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments for '{}'", command));
    }

    let parsed = match (command.to_ascii_lowercase().as_str(), arg) {
        ("status", None) => ConsoleCommand::Status,
        ("scenes", None) => ConsoleCommand::Scenes,
        ("scene", Some(key)) => ConsoleCommand::Scene(key.to_string()),
        ("midi", Some(fraction)) => ConsoleCommand::Midi(
            fraction
                .parse()
                .map_err(|_| format!("'{}' is not a number", fraction))?,
        ),
        ("reload", None) => ConsoleCommand::Reload,
        ("listen", Some(port)) => ConsoleCommand::Listen(
            port.parse()
                .map_err(|_| format!("'{}' is not a valid port", port))?,
        ),
        ("stop", None) => ConsoleCommand::Stop,
        ("reply", Some("off")) => ConsoleCommand::Reply(None),
        ("reply", Some(target)) => ConsoleCommand::Reply(Some(target.to_string())),
        ("pending", None) => ConsoleCommand::Pending,
        ("cancel", None) => ConsoleCommand::Cancel,
        ("help" | "?", None) => ConsoleCommand::Help,
        ("quit" | "exit", None) => ConsoleCommand::Quit,
        (other, _) => return Err(format!("unknown command or arguments: '{}'", other)),
    };
    Ok(parsed)
}

/// Run the line editor on a blocking thread, forwarding parsed commands.
///
/// Ctrl-C or Ctrl-D at the prompt forwards `Quit`.
pub fn spawn_console(tx: mpsc::UnboundedSender<ConsoleCommand>) {
    std::thread::spawn(move || {
        if let Err(e) = run_console(&tx) {
            warn!("Console stopped: {}", e);
            let _ = tx.send(ConsoleCommand::Quit);
        }
    });
}

fn run_console(tx: &mpsc::UnboundedSender<ConsoleCommand>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("Type {} for a list of commands.", "help".bold());

    loop {
        match rl.readline("scenes> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());

                match parse_line(&line) {
                    Ok(command) => {
                        let quit = command == ConsoleCommand::Quit;
                        if tx.send(command).is_err() || quit {
                            break;
                        }
                    }
                    Err(reason) => println!("{} (type 'help')", reason.red()),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                let _ = tx.send(ConsoleCommand::Quit);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    debug!("Console closed");
    Ok(())
}

pub fn print_help() {
    println!("{}", HELP);
}

pub fn print_status(status: &RouterStatus, pending: usize) {
    let scene = match (&status.active_scene_name, &status.active_scene_key) {
        (Some(name), Some(key)) => format!("{} ({})", name.green().bold(), key),
        _ => "none".dimmed().to_string(),
    };
    let listening = if status.listening {
        "yes".green()
    } else {
        "no".red()
    };
    let loaded = if status.loaded {
        status.scene_count.to_string().green()
    } else {
        "no configuration loaded".red()
    };

    println!("  Active scene: {}", scene);
    println!("  Listening:    {}", listening);
    println!("  Scenes:       {}", loaded);
    println!("  Pending:      {}", pending);
}

pub fn print_scenes(scenes: &SceneTable, active: Option<&str>) {
    for scene in scenes.iter() {
        print_scene(scene, active == Some(scene.key.as_str()), false);
    }
}

fn print_scene(scene: &Scene, active: bool, with_commands: bool) {
    let marker = if active { "▶".green() } else { " ".normal() };
    let midi = scene
        .midi
        .map(|n| format!("  midi {} → {}", n, midi_trigger_address(n)).cyan().to_string())
        .unwrap_or_default();

    println!(
        "{} {} {}{}",
        marker,
        scene.key.yellow(),
        format!("\"{}\"", scene.display_name).bright_white(),
        midi
    );

    if with_commands {
        for command in &scene.commands {
            println!("      {}", command);
        }
    }
}

/// Human-readable `--check` report
pub fn print_report(config: &CompiledConfig, listen_port: u16) {
    println!("\n{}", "=== Scene Configuration ===".bold().cyan());

    println!("\n{}", "Server:".bold());
    println!("  Listen port: {}", listen_port.to_string().green());
    match &config.reply {
        Some(reply) => println!("  Reply:       {}", reply.target().green()),
        None => println!("  Reply:       {}", "none".dimmed()),
    }

    println!("\n{} ({})", "Endpoints:".bold(), config.endpoints.len());
    for endpoint in config.endpoints.iter() {
        println!("  {}", endpoint);
    }

    println!("\n{} ({})", "Scenes:".bold(), config.scenes.len());
    for scene in config.scenes.iter() {
        print_scene(scene, false, true);
    }

    if config.warnings.is_empty() {
        println!("\n{}", "✅ No warnings".green().bold());
    } else {
        println!(
            "\n{} ({})",
            "Warnings:".bold().yellow(),
            config.warnings.len()
        );
        for warning in &config.warnings {
            println!("  ⚠️  {}", warning);
        }
    }
}

#[derive(Serialize)]
struct SceneReport<'a> {
    #[serde(flatten)]
    scene: &'a Scene,
    trigger: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    midi_trigger: Option<String>,
}

#[derive(Serialize)]
struct Report<'a> {
    listen_port: u16,
    reply: Option<String>,
    endpoints: Vec<&'a crate::endpoints::Endpoint>,
    scenes: Vec<SceneReport<'a>>,
    warnings: Vec<String>,
}

/// Machine-readable `--check --json` report
pub fn report_json(config: &CompiledConfig, listen_port: u16) -> Result<String> {
    let report = Report {
        listen_port,
        reply: config.reply.as_ref().map(|r| r.target()),
        endpoints: config.endpoints.iter().collect(),
        scenes: config
            .scenes
            .iter()
            .map(|scene| SceneReport {
                scene,
                trigger: format!("/scene/{}", scene.key),
                midi_trigger: scene.midi.map(midi_trigger_address),
            })
            .collect(),
        warnings: config.warnings.iter().map(|w| w.to_string()).collect(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}
