use clap::{Parser, Subcommand};
use netkit::app::{self, FrameHandler};
use netkit::config::{self, Config, InterfaceSpec};
use netkit::dataplane::{Hub, Interface, Port, Router, RouterMode, RouterSettings, Switch};
use netkit::telemetry::{init_logging, MetricsRegistry};
use netkit::transport::Transport;
use netkit::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "netkit")]
#[command(about = "Userspace network tools driven over a framed stdio transport")]
struct Cli {
    /// Path to an optional netkit.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// IPv4 router: NAME[IPV4:IP/PREFIX][=MTU] per interface
    Router {
        #[arg(required = true)]
        interfaces: Vec<String>,
    },
    /// ARP resolver: NAME[IPV4:IP/PREFIX][=MTU] per interface
    Arp {
        #[arg(required = true)]
        interfaces: Vec<String>,
    },
    /// MAC-learning switch over the named interfaces
    Switch {
        #[arg(required = true)]
        interfaces: Vec<String>,
    },
    /// Hub flooding every frame to the other interfaces
    Hub {
        #[arg(required = true)]
        interfaces: Vec<String>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a netkit.toml
    Validate,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config {
            action: ConfigAction::Validate,
        } => cmd_config_validate(cli.config.as_deref()),
        Commands::Router { interfaces } => cmd_run(Tool::Router, &interfaces, cli.config.as_deref()),
        Commands::Arp { interfaces } => cmd_run(Tool::Arp, &interfaces, cli.config.as_deref()),
        Commands::Switch { interfaces } => cmd_run(Tool::Switch, &interfaces, cli.config.as_deref()),
        Commands::Hub { interfaces } => cmd_run(Tool::Hub, &interfaces, cli.config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tool {
    Router,
    Arp,
    Switch,
    Hub,
}

impl Tool {
    fn addressed(self) -> bool {
        matches!(self, Tool::Router | Tool::Arp)
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => config::load(path),
        None => Ok(Config::default()),
    }
}

fn cmd_config_validate(path: Option<&Path>) -> Result<()> {
    let path = path.ok_or_else(|| netkit::Error::Config("--config FILE is required".into()))?;
    let config = config::load(path)?;
    let result = config::validate(&config);
    result.print_diagnostics();

    if result.has_errors() {
        return Err(netkit::Error::Config(format!(
            "{} has {} error(s)",
            path.display(),
            result.errors.len()
        )));
    }
    println!("{} is valid", path.display());
    Ok(())
}

fn cmd_run(tool: Tool, args: &[String], config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(Some(&config.logging));

    let validation = config::validate(&config);
    if validation.has_errors() {
        return Err(netkit::Error::Config(validation.errors.join("; ")));
    }
    for warning in &validation.warnings {
        tracing::warn!("{}", warning);
    }

    let specs = config::parse_interfaces(args, tool.addressed())?;
    let interfaces = if tool.addressed() {
        build_interfaces(&specs)?
    } else {
        Vec::new()
    };
    let metrics = Arc::new(MetricsRegistry::new());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;

    runtime.block_on(async {
        match tool {
            Tool::Router | Tool::Arp => {
                let mode = if tool == Tool::Router {
                    RouterMode::Router
                } else {
                    RouterMode::ArpResolver
                };
                let settings = RouterSettings {
                    arp_cache_size: config.arp.cache_size,
                    icmp: config.icmp.settings(),
                };
                let mut router = Router::new(mode, interfaces, settings, Arc::clone(&metrics));
                serve(&mut router).await
            }
            Tool::Switch => {
                let ports = Port::from_specs(&specs);
                let mut switch = Switch::new(ports, config.switch.table_size, Arc::clone(&metrics));
                serve(&mut switch).await
            }
            Tool::Hub => {
                let mut hub = Hub::new(Port::from_specs(&specs), Arc::clone(&metrics));
                serve(&mut hub).await
            }
        }
    })?;

    for (name, value) in metrics.export() {
        info!(metric = %name, value, "Final counter");
    }
    Ok(())
}

fn build_interfaces(specs: &[InterfaceSpec]) -> Result<Vec<Interface>> {
    specs
        .iter()
        .zip(1..)
        .map(|(spec, num)| Interface::from_spec(num, spec))
        .collect()
}

async fn serve<H: FrameHandler>(handler: &mut H) -> Result<()> {
    info!(interfaces = handler.interface_count(), "Waiting for handshake");
    let mut transport = Transport::stdio();
    app::run(&mut transport, handler).await
}
