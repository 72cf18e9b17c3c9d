//! Command-line front end for a KLF200 gateway.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use klf200_gateway::{CommandProcessor, GatewayConfig};
use klf200_protocol::{Command, ModeInstruction, PositionInstruction, Velocity, VeluxPosition};

#[derive(Parser)]
#[command(name = "klf200", version, about = "Operate a Velux KLF200 gateway")]
struct Cli {
    /// JSON configuration file. Overrides the connection flags.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Gateway hostname or IP address.
    #[arg(long, env = "KLF200_HOST")]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Gateway password (the Wi-Fi key printed on the device).
    #[arg(long, env = "KLF200_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Debug logging for every target.
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Firmware and API version.
    Version,
    /// All nodes known to the gateway.
    Nodes,
    /// A single node.
    Node { id: u8 },
    /// All stored scenes.
    Scenes,
    /// Runs a scene.
    Scene {
        id: u8,
        #[arg(long, value_enum, default_value = "default")]
        velocity: VelocityArg,
    },
    StopScene { id: u8 },
    /// Moves a node to a position (0 closed, 100 open).
    Move {
        node: u8,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent_open: u8,
    },
    Velocity {
        node: u8,
        #[arg(value_enum)]
        velocity: VelocityArg,
    },
    Rename { node: u8, name: String },
    Mode { node: u8, mode: u8, param: u8 },
    /// Prints position events until Ctrl-C.
    Watch,
}

#[derive(Clone, Copy, ValueEnum)]
enum VelocityArg {
    Default,
    Silent,
    Fast,
}

impl From<VelocityArg> for Velocity {
    fn from(v: VelocityArg) -> Self {
        match v {
            VelocityArg::Default => Velocity::Default,
            VelocityArg::Silent => Velocity::Silent,
            VelocityArg::Fast => Velocity::Fast,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "debug"
    } else {
        "info,klf200=debug"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = load_config(&cli)?;
    tracing::info!(host = %config.hostname, port = config.port, "connecting");
    let mut processor = CommandProcessor::connect(config)
        .await
        .context("invalid gateway configuration")?;
    if !processor.is_available() {
        tracing::warn!(state = ?processor.state(), "gateway not reachable yet");
    }

    let result = run(&processor, cli.command).await;
    processor.shutdown().await;
    result
}

fn load_config(cli: &Cli) -> anyhow::Result<GatewayConfig> {
    if let Some(path) = &cli.config {
        return GatewayConfig::load(path)
            .with_context(|| format!("loading {}", path.display()));
    }
    let (Some(host), Some(password)) = (&cli.host, &cli.password) else {
        bail!("either --config or both --host and --password are required");
    };
    let mut config = GatewayConfig::new(host.as_str(), password.as_str());
    if let Some(port) = cli.port {
        config.port = port;
    }
    // One-shot invocations do not need the node sweep.
    config.refresh_on_connect = false;
    Ok(config)
}

async fn run(processor: &CommandProcessor, cmd: Cmd) -> anyhow::Result<()> {
    match cmd {
        Cmd::Version => {
            let version = execute(processor, Command::get_version()).await?;
            let protocol = execute(processor, Command::get_protocol()).await?;
            if let Some(v) = version.version() {
                println!("software  {}", v.software_version());
                println!("hardware  {}", v.hardware);
                println!("product   {}/{}", v.product_group, v.product_type);
            }
            if let Some(p) = protocol.protocol_version() {
                println!("protocol  {p}");
            }
        }
        Cmd::Nodes => {
            let done = execute(processor, Command::get_all_nodes()).await?;
            println!("{}", serde_json::to_string_pretty(done.nodes())?);
        }
        Cmd::Node { id } => {
            let done = execute(processor, Command::get_node(id)).await?;
            let node = done.node().context("gateway returned no node")?;
            println!("{}", serde_json::to_string_pretty(node)?);
        }
        Cmd::Scenes => {
            let done = execute(processor, Command::get_all_scenes()).await?;
            for scene in done.scenes() {
                println!("{:>3}  {}", scene.id, scene.name);
            }
        }
        Cmd::Scene { id, velocity } => {
            execute(processor, Command::execute_scene(id, velocity.into())).await?;
            println!("scene {id} finished");
        }
        Cmd::StopScene { id } => {
            execute(processor, Command::stop_scene(id)).await?;
            println!("scene {id} stopped");
        }
        Cmd::Move { node, percent_open } => {
            let target =
                PositionInstruction::main(node, VeluxPosition::from_percent_open(percent_open));
            execute(processor, Command::send_position(vec![target])?).await?;
            println!("node {node} at {percent_open}% open");
        }
        Cmd::Velocity { node, velocity } => {
            execute(processor, Command::set_velocity(node, velocity.into())).await?;
        }
        Cmd::Rename { node, name } => {
            execute(processor, Command::set_node_name(node, &name)?).await?;
        }
        Cmd::Mode { node, mode, param } => {
            let instruction = ModeInstruction {
                node_id: node,
                mode_number: mode,
                mode_parameter: param,
            };
            execute(processor, Command::send_mode(vec![instruction])?).await?;
        }
        Cmd::Watch => watch(processor).await?,
    }
    Ok(())
}

/// Runs a command and turns an `Error` status into an error.
async fn execute(processor: &CommandProcessor, command: Command) -> anyhow::Result<Command> {
    let done = processor.execute_command(command).await;
    if let Some(detail) = done.error_detail() {
        bail!("{:?} failed: {detail}", done.kind());
    }
    Ok(done)
}

async fn watch(processor: &CommandProcessor) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = processor.register_event_listener(move |node: u8, position: VeluxPosition| {
        let _ = tx.send((node, position));
    });
    let mut state = processor.subscribe_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            Some((node, position)) = rx.recv() => match position.percent_open() {
                Some(open) => println!("node {node:>3}  {open:>3}% open"),
                None => println!("node {node:>3}  raw {:#06x}", position.raw()),
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                println!("gateway {current:?}");
            }
        }
    }

    processor.unregister_event_listener(id);
    Ok(())
}
