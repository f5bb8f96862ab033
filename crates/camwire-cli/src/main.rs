//! Command-line tool for the V720 camera control protocol.
//!
//! Sends framed commands to the camera (or its relay server), encodes and
//! decodes frames offline, listens for frames as a stand-in camera, and
//! wraps `tcpdump` for capturing the camera's traffic.
//!
//! # Usage
//!
//! ```bash
//! # Ask the camera to start streaming (host/port/device from config)
//! camwire start-stream
//!
//! # Same, against an explicit relay server and device
//! camwire --host 192.168.1.200 --port 6123 start-stream --dev-target deadbeef
//!
//! # Send an arbitrary command and wait for the reply
//! camwire send --code 101 --field status=200 --wait-reply
//!
//! # Show the bytes a command would produce
//! camwire encode --code 3 --dev-target deadbeef
//!
//! # Decode captured bytes
//! camwire decode 21000000000000000000000000000000000...
//!
//! # Pretend to be the camera and print every frame received
//! camwire listen --bind 0.0.0.0:6123
//!
//! # Capture camera traffic for 30 seconds, then summarize it
//! camwire capture --duration 30
//! ```

mod format;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use camwire_core::capture::{
    capture_then_analyze, running_as_root, CaptureError, CaptureFacility, CaptureFilter,
    CaptureOutcome, CaptureRequest, Tcpdump,
};
use camwire_core::client::{send_once, CameraClient, ClientError};
use camwire_core::config::{self, CamwireConfig};
use camwire_core::message::CommandMessage;
use camwire_core::protocol::{encode_frame, FrameHeader, FrameOptions, PayloadStyle, ProtocolError};
use camwire_core::receiver::CommandListener;

/// Talk to V720-family IP cameras over their binary control channel.
#[derive(Parser)]
#[command(name = "camwire")]
#[command(about = "Send, decode and capture V720 camera control frames")]
#[command(version)]
struct Cli {
    /// Relay server or camera host (defaults to the config file)
    #[arg(long, global = true, env = "CAMWIRE_HOST")]
    host: Option<String>,

    /// Relay server or camera port (defaults to the config file)
    #[arg(long, global = true, env = "CAMWIRE_PORT")]
    port: Option<u16>,

    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Ask the camera to start streaming
    StartStream {
        /// Target device id (defaults to the config file)
        #[arg(short, long)]
        dev_target: Option<String>,

        #[command(flatten)]
        frame: FrameArgs,
    },

    /// Send one command
    Send {
        #[command(flatten)]
        message: MessageArgs,

        #[command(flatten)]
        frame: FrameArgs,

        /// Keep the connection open and print the first reply
        #[arg(short, long)]
        wait_reply: bool,
    },

    /// Print the frame a command encodes to, without sending it
    Encode {
        #[command(flatten)]
        message: MessageArgs,

        #[command(flatten)]
        frame: FrameArgs,
    },

    /// Decode hex-encoded frames (argument or stdin)
    Decode {
        /// Hex bytes; read from stdin when omitted
        hex: Option<String>,
    },

    /// Accept connections and print every frame received
    Listen {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:6123")]
        bind: String,

        /// Write logs to ~/.camwire/logs/camwire-listen.log instead of stderr
        #[arg(long)]
        log_file: bool,
    },

    /// Capture camera traffic with tcpdump, then summarize it
    Capture {
        /// Capture window in seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Network interface
        #[arg(short, long)]
        interface: Option<String>,

        /// Camera LAN address to filter on
        #[arg(long)]
        camera_host: Option<String>,

        /// Ports to filter on (repeatable)
        #[arg(long = "filter-port")]
        ports: Vec<u16>,

        /// Directory for the capture file
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Run tcpdump directly instead of via sudo
        #[arg(long)]
        no_sudo: bool,

        /// Skip the summary after capturing
        #[arg(long)]
        no_analyze: bool,
    },

    /// Summarize an existing capture file
    Analyze {
        /// Path to the .pcap file
        file: PathBuf,
    },

    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// The command message to build.
#[derive(Args)]
struct MessageArgs {
    /// Command code
    #[arg(short, long)]
    code: i64,

    /// Target device id
    #[arg(short, long)]
    dev_target: Option<String>,

    /// Extra field as KEY=VALUE, VALUE parsed as JSON when possible (repeatable)
    #[arg(long = "field", value_parser = format::parse_field)]
    fields: Vec<(String, Value)>,
}

impl MessageArgs {
    fn to_message(&self) -> CommandMessage {
        let mut message = CommandMessage::new(self.code);
        if let Some(target) = &self.dev_target {
            message = message.with_dev_target(target.clone());
        }
        for (key, value) in &self.fields {
            message = message.with_field(key.clone(), value.clone());
        }
        message
    }
}

/// Header fields and payload layout.
#[derive(Args)]
struct FrameArgs {
    /// Correlation id placed in the header
    #[arg(long, default_value_t = 0)]
    package_id: u32,

    /// Message flag byte
    #[arg(long, default_value_t = 0)]
    message_flag: u8,

    /// Deal flag byte
    #[arg(long, default_value_t = 0)]
    deal_flag: u8,

    /// Forwarding token as 16 hex digits
    #[arg(long, value_parser = format::parse_forward_id)]
    forward_id: Option<[u8; 8]>,

    /// Use `", "` / `": "` separators in the JSON payload
    #[arg(long)]
    spaced: bool,
}

impl FrameArgs {
    fn to_options(&self) -> FrameOptions {
        FrameOptions {
            message_flag: self.message_flag,
            package_id: self.package_id,
            deal_flag: self.deal_flag,
            forward_id: self.forward_id.unwrap_or_default(),
            style: if self.spaced {
                PayloadStyle::Spaced
            } else {
                PayloadStyle::Compact
            },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn init_logging(cli: &Cli) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Command::Listen { log_file: true, .. } = cli.command {
        let file_appender = tracing_appender::rolling::never(config::logs_dir(), "camwire-listen.log");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        return Some(guard);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    None
}

#[derive(Debug)]
enum CliError {
    Connection(String),
    ActionFailed(String),
    Protocol(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Connection(_) => ExitCode::from(2),
            CliError::ActionFailed(_) => ExitCode::from(1),
            CliError::Protocol(_) => ExitCode::from(3),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Connection(msg) => write!(f, "Connection error: {}", msg),
            CliError::ActionFailed(msg) => write!(f, "Action failed: {}", msg),
            CliError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl From<ClientError> for CliError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Protocol(e) => CliError::Protocol(e.to_string()),
            other => CliError::Connection(other.to_string()),
        }
    }
}

impl From<ProtocolError> for CliError {
    fn from(err: ProtocolError) -> Self {
        CliError::Protocol(err.to_string())
    }
}

impl From<CaptureError> for CliError {
    fn from(err: CaptureError) -> Self {
        CliError::ActionFailed(err.to_string())
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = CamwireConfig::load();
    if let Some(host) = &cli.host {
        config.server_host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server_port = port;
    }
    let host = config.server_host.clone();
    let port = config.server_port;

    match &cli.command {
        Command::StartStream { dev_target, frame } => {
            let target = dev_target.clone().unwrap_or_else(|| config.dev_target.clone());
            let message = CommandMessage::start_streaming(target);
            send_command(&cli, &config, &host, port, &message, &frame.to_options(), false).await
        }
        Command::Send {
            message,
            frame,
            wait_reply,
        } => {
            send_command(
                &cli,
                &config,
                &host,
                port,
                &message.to_message(),
                &frame.to_options(),
                *wait_reply,
            )
            .await
        }
        Command::Encode { message, frame } => encode_command(&cli, &message.to_message(), &frame.to_options()),
        Command::Decode { hex } => decode_command(&cli, hex.as_deref()),
        Command::Listen { bind, .. } => listen(&cli, bind).await,
        Command::Capture {
            duration,
            interface,
            camera_host,
            ports,
            output_dir,
            no_sudo,
            no_analyze,
        } => {
            let mut request = config.capture.request();
            if let Some(secs) = duration {
                request.duration = Duration::from_secs(*secs);
            }
            if let Some(interface) = interface {
                request.interface = interface.clone();
            }
            if camera_host.is_some() || !ports.is_empty() {
                request.filter = CaptureFilter::new(
                    camera_host.clone().unwrap_or(request.filter.host),
                    if ports.is_empty() { request.filter.ports } else { ports.clone() },
                );
            }
            if let Some(dir) = output_dir {
                request.output_dir = dir.clone();
            }
            if *no_sudo {
                request.use_sudo = false;
            }
            capture(&cli, &request, !*no_analyze).await
        }
        Command::Analyze { file } => {
            if !file.is_file() {
                return Err(CliError::ActionFailed(format!("no such capture file: {}", file.display())));
            }
            let summary = Tcpdump::default().analyze(file).await?;
            print_summary(&cli, file, &summary);
            Ok(())
        }
        Command::Config { action } => config_command(&cli, &config, action),
    }
}

async fn send_command(
    cli: &Cli,
    config: &CamwireConfig,
    host: &str,
    port: u16,
    message: &CommandMessage,
    options: &FrameOptions,
    wait_reply: bool,
) -> Result<(), CliError> {
    let client_config = config.client_config();
    info!(%host, port, code = message.code, "sending command");

    let (sent, reply) = if wait_reply {
        let mut client = CameraClient::new(host, port).with_config(client_config);
        client.connect().await?;
        let result = async {
            let sent = client.send_with(message, options).await?;
            let reply = client.recv().await?;
            Ok::<_, ClientError>((sent, reply))
        }
        .await;
        if let Err(e) = client.close().await {
            debug!(error = %e, "close failed");
        }
        let (sent, reply) = result?;
        (sent, Some(reply))
    } else {
        (send_once(host, port, client_config, message, options).await?, None)
    };

    if cli.format == OutputFormat::Json {
        let output = serde_json::json!({
            "success": true,
            "target": format!("{host}:{port}"),
            "bytes": sent,
            "message": serde_json::to_value(message).unwrap_or(Value::Null),
            "reply": reply.as_ref().map(format::frame_json),
        });
        println!("{}", output);
    } else {
        if !cli.quiet {
            eprintln!("Sent {} bytes to {}:{}: {}", sent, host, port, message);
        }
        if let Some(frame) = &reply {
            println!("{}", format::frame_line(frame));
        }
    }
    Ok(())
}

fn encode_command(cli: &Cli, message: &CommandMessage, options: &FrameOptions) -> Result<(), CliError> {
    let frame = encode_frame(message, options)?;
    let (header, payload) = frame.split_at(FrameHeader::SIZE);

    if cli.format == OutputFormat::Json {
        let output = serde_json::json!({
            "payload": String::from_utf8_lossy(payload),
            "payload_len": payload.len(),
            "header": hex::encode(header),
            "frame": hex::encode(&frame),
            "frame_len": frame.len(),
        });
        println!("{}", output);
    } else {
        if !cli.quiet {
            eprintln!("payload {} bytes: {}", payload.len(), String::from_utf8_lossy(payload));
            eprintln!("header  {} bytes: {}", header.len(), hex::encode(header));
            eprintln!("frame   {} bytes", frame.len());
        }
        println!("{}", hex::encode(&frame));
    }
    Ok(())
}

fn decode_command(cli: &Cli, hex_arg: Option<&str>) -> Result<(), CliError> {
    let input = match hex_arg {
        Some(hex) => hex.to_string(),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| CliError::ActionFailed(format!("Failed to read stdin: {}", e)))?;
            buf
        }
    };
    let bytes = format::parse_hex(&input)
        .map_err(|e| CliError::ActionFailed(format!("Invalid hex input: {}", e)))?;

    let decoded = format::decode_all(&bytes);
    let mut good = 0usize;
    for (index, item) in decoded.frames.iter().enumerate() {
        match item {
            Ok(frame) => {
                good += 1;
                if cli.format == OutputFormat::Json {
                    println!("{}", format::frame_json(frame));
                } else {
                    println!("#{} {}", index, format::frame_line(frame));
                }
            }
            Err(e) => eprintln!("#{} skipped: {}", index, e),
        }
    }

    if decoded.trailing > 0 {
        return Err(CliError::Protocol(format!(
            "{} trailing bytes do not form a complete frame",
            decoded.trailing
        )));
    }
    if good == 0 {
        return Err(CliError::Protocol("no well-formed frames in input".to_string()));
    }
    Ok(())
}

async fn listen(cli: &Cli, bind: &str) -> Result<(), CliError> {
    let listener = CommandListener::bind(bind)
        .await
        .map_err(|e| CliError::Connection(format!("Failed to bind {}: {}", bind, e)))?;
    let addr = listener
        .local_addr()
        .map_err(|e| CliError::Connection(e.to_string()))?;
    if !cli.quiet {
        eprintln!("Listening on {} (Ctrl-C to stop)", addr);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let json = cli.format == OutputFormat::Json;
    listener
        .run(cancel, |peer, frame| {
            if json {
                let mut value = format::frame_json(&frame);
                value["peer"] = Value::String(peer.to_string());
                println!("{}", value);
            } else {
                println!("{} {}", peer, format::frame_line(&frame));
            }
        })
        .await
        .map_err(|e| CliError::Connection(e.to_string()))
}

async fn capture(
    cli: &Cli,
    request: &CaptureRequest,
    analyze: bool,
) -> Result<(), CliError> {
    if !cli.quiet {
        if !running_as_root().await {
            eprintln!("Warning: live capture usually needs root privileges");
        }
        eprintln!(
            "Capturing `{}` on {} for {}s",
            request.filter,
            request.interface,
            request.duration.as_secs()
        );
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let report = capture_then_analyze(&Tcpdump::default(), request, cancel, analyze).await?;
    match report.outcome {
        CaptureOutcome::Interrupted => Err(CliError::ActionFailed("capture interrupted".to_string())),
        CaptureOutcome::Completed(artifact) => {
            match report.summary {
                Some(summary) => print_summary(cli, &artifact, &summary),
                None if cli.format == OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "artifact": artifact.display().to_string() }));
                }
                None => println!("{}", artifact.display()),
            }
            Ok(())
        }
    }
}

fn print_summary(cli: &Cli, artifact: &Path, summary: &str) {
    if cli.format == OutputFormat::Json {
        let output = serde_json::json!({
            "artifact": artifact.display().to_string(),
            "summary": summary,
        });
        println!("{}", output);
    } else {
        if !cli.quiet {
            eprintln!("Packet summary for {}:", artifact.display());
        }
        print!("{}", summary);
    }
}

fn config_command(cli: &Cli, config: &CamwireConfig, action: &ConfigAction) -> Result<(), CliError> {
    match action {
        ConfigAction::Show => {
            let json = serde_json::to_string_pretty(config)
                .map_err(|e| CliError::ActionFailed(e.to_string()))?;
            println!("{}", json);
        }
        ConfigAction::Path => println!("{}", config::config_path().display()),
        ConfigAction::Init { force } => {
            let path = config::config_path();
            if path.exists() && !force {
                return Err(CliError::ActionFailed(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            let path = CamwireConfig::default()
                .save()
                .map_err(|e| CliError::ActionFailed(format!("Failed to write config: {}", e)))?;
            if !cli.quiet {
                eprintln!("Wrote {}", path.display());
            }
        }
    }
    Ok(())
}
