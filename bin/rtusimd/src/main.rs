//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the RTU simulator harness."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rtusim_common::{init_tracing, DaemonConfig, LogFormat};
use rtusim_core::{
    InboundEvent, NullTimerService, PointChange, PortHost, Publisher, SimPort,
};
use rtusim_logging::InstanceContext;
use tracing::{info, warn};

mod script;

use script::ScriptStep;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Simulated RTU harness",
    long_about = "Loads point configuration into a simulated RTU port, drives it the way a \
                  gateway host would and prints every published point change as a JSON line."
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to the harness TOML configuration")]
    config: Option<PathBuf>,

    #[arg(long = "main", value_name = "FILE", help = "Main point configuration JSON")]
    main_config: Option<PathBuf>,

    #[arg(long = "override", value_name = "FILE", help = "Override point configuration JSON")]
    override_config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override the log format")]
    format: Option<CliFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFormat {
    StructuredJson,
    Pretty,
}

impl From<CliFormat> for LogFormat {
    fn from(value: CliFormat) -> Self {
        match value {
            CliFormat::StructuredJson => LogFormat::StructuredJson,
            CliFormat::Pretty => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Configure, enable and publish the initial state of every point")]
    Replay,
    #[command(about = "Read the status of one device")]
    Status {
        #[arg(long, help = "Device type, e.g. CB or TapChanger")]
        device: String,
        #[arg(long)]
        number: u32,
    },
    #[command(about = "Send a set request body")]
    Set {
        #[arg(long, help = r#"JSON body, e.g. {"Type":"CB","Number":1,"State":"Open"}"#)]
        body: String,
    },
    #[command(about = "Deliver one host event")]
    Event {
        #[arg(long)]
        event_type: String,
        #[arg(long)]
        index: u32,
        #[arg(long, default_value = "")]
        payload: String,
        #[arg(long, default_value = "|ONLINE|")]
        quality: String,
    },
    #[command(about = "Run a JSON array of events and requests")]
    Script {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Prints every published change to stdout as one JSON line.
struct StdoutPublisher;

impl Publisher for StdoutPublisher {
    fn publish(&self, ctx: &InstanceContext, change: &PointChange) {
        let line = serde_json::json!({
            "port": ctx.name,
            "kind": change.kind,
            "index": change.index,
            "quality": change.quality,
            "value": change.value,
        });
        println!("{line}");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/rtusimd.toml"));

    let loaded = DaemonConfig::load_or_default(&candidates)?;
    let mut config = loaded.config;
    if let Some(format) = cli.format {
        config.logging.format = format.into();
    }
    if let Some(path) = cli.main_config {
        config.port.main_config = Some(path);
    }
    if let Some(path) = cli.override_config {
        config.port.override_config = Some(path);
    }
    init_tracing("rtusimd", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found, using defaults"),
    }

    let (main_json, override_json) = config.port.read_documents()?;
    let ctx = InstanceContext::new(config.port.instance_id, config.port.name.clone());
    let host = PortHost::new(
        SimPort::new(Arc::new(StdoutPublisher)),
        ctx,
        Arc::new(NullTimerService),
    );
    host.configure(&main_json, &override_json);
    host.enable();

    match cli.command.unwrap_or(Commands::Replay) {
        Commands::Replay => host.operational(),
        Commands::Status { device, number } => {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("Type", &device)
                .append_pair("Number", &number.to_string())
                .finish();
            print_response(&host.handle_request(&format!("GET /PyPortRtuSim/status?{query}"), ""));
        }
        Commands::Set { body } => {
            print_response(&host.handle_request("POST /PyPortRtuSim/set", &body));
        }
        Commands::Event {
            event_type,
            index,
            payload,
            quality,
        } => {
            let event = InboundEvent::new(&event_type, index)
                .with_payload(payload)
                .with_quality(quality)
                .with_sender("rtusimd");
            println!("{}", serde_json::json!({ "status": host.handle_event(&event) }));
        }
        Commands::Script { file } => {
            let steps = ScriptStep::load(&file)
                .with_context(|| format!("unable to load script {}", file.display()))?;
            info!(steps = steps.len(), script = %file.display(), "running script");
            for step in steps {
                let output = step.run(&host);
                if !output.is_empty() {
                    println!("{output}");
                }
            }
        }
    }

    host.disable();
    Ok(())
}

fn print_response(response: &str) {
    if response.is_empty() {
        warn!("request rejected");
    } else {
        println!("{response}");
    }
}
