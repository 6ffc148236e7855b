use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::{
    fs,
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use widget_bridge::{
    create_preview_widget_with_config, create_widget_with_config,
    event::handler,
    host::{HostError, InMemoryHost, PostedMessage},
    message::decode,
    EventKind, PreviewSessionConfig, SessionDescriptor, StyleMode, Widget, WidgetConfig,
    WidgetError,
};

const CONTAINER: &str = "widget";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a widget config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log dropped inbound messages at warn level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check inbound envelopes (one JSON value per line)
    Validate {
        /// File to read, or `-` for stdin
        #[arg(default_value = "-")]
        input: String,
    },

    /// Mount a widget on an in-memory host and replay frame messages
    Replay(ReplayArgs),
}

#[derive(Parser)]
struct ReplayArgs {
    /// Live session id
    #[arg(long, requires = "secret", conflicts_with = "preview")]
    session_id: Option<String>,

    /// Live session secret
    #[arg(long, requires = "session_id")]
    secret: Option<String>,

    #[arg(long)]
    style_mode: Option<StyleMode>,

    /// Preview session config (JSON) instead of a live session
    #[arg(long, required_unless_present = "session_id")]
    preview: Option<PathBuf>,

    /// Messages posted by the frame, one JSON envelope per line
    script: PathBuf,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Widget(#[from] WidgetError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Mount task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn read_input(input: &str) -> Result<String, CliError> {
    let mut content = String::new();
    if input == "-" {
        io::stdin().read_to_string(&mut content)?;
    } else {
        BufReader::new(fs::File::open(input)?).read_to_string(&mut content)?;
    }
    Ok(content)
}

fn validate(input: &str) -> Result<(), CliError> {
    let content = read_input(input)?;
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let verdict = match serde_json::from_str::<Value>(line) {
            Err(e) => format!("dropped (not JSON: {})", e),
            Ok(raw) => match decode(&raw) {
                Ok(message) => format!("accepted {}", message.kind()),
                Err(rejection) => format!("dropped ({})", rejection),
            },
        };
        println!("{}: {}", index + 1, verdict);
    }
    Ok(())
}

fn load_script(path: &Path) -> Result<Vec<Value>, CliError> {
    let file = fs::File::open(path)?;
    let mut script = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        script.push(serde_json::from_str(&line)?);
    }
    Ok(script)
}

fn redacted(posted: &PostedMessage) -> Value {
    let mut message = posted.message.clone();
    if let Some(secret) = message.get_mut("secret") {
        *secret = Value::String("[REDACTED]".to_string());
    }
    message
}

fn build_widget(
    args: &ReplayArgs,
    host: Arc<InMemoryHost>,
    config: WidgetConfig,
) -> Result<Widget, CliError> {
    match (&args.session_id, &args.secret, &args.preview) {
        (Some(session_id), Some(secret), _) => {
            let mut descriptor = SessionDescriptor::new(session_id.as_str(), secret.as_str());
            if let Some(mode) = args.style_mode {
                descriptor = descriptor.with_style_mode(mode);
            }
            Ok(create_widget_with_config(host, descriptor, config)?)
        }
        (_, _, Some(path)) => {
            let mut preview: PreviewSessionConfig =
                serde_json::from_reader(BufReader::new(fs::File::open(path)?))?;
            if let Some(mode) = args.style_mode {
                preview = preview.with_style_mode(mode);
            }
            Ok(create_preview_widget_with_config(host, preview, config)?)
        }
        _ => Err(WidgetError::invalid_config("either --session-id/--secret or --preview is required").into()),
    }
}

async fn replay(args: &ReplayArgs, config: WidgetConfig) -> Result<(), CliError> {
    let script = load_script(&args.script)?;
    let host = Arc::new(InMemoryHost::new().with_container(CONTAINER).with_auto_load(true));
    let widget = build_widget(args, host.clone(), config)?;

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorder = {
        let events = events.clone();
        handler(move |message| {
            if let Ok(mut events) = events.lock() {
                events.push(message.kind().to_string());
            }
            Ok(())
        })
    };
    for kind in [
        EventKind::Ready,
        EventKind::SessionUpdated,
        EventKind::AllocationsUpdated,
        EventKind::Resize,
        EventKind::Error,
        EventKind::Destroyed,
    ] {
        widget.on(kind, &recorder);
    }

    let mounting = tokio::spawn({
        let widget = widget.clone();
        async move { widget.mount(CONTAINER).await }
    });
    // The script starts once the frame has received its init envelope.
    while host.posted().is_empty() && !mounting.is_finished() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    if let Some(frame) = host.current_frame() {
        info!(messages = script.len(), "replaying script");
        for message in script {
            host.deliver_from_frame(frame.frame, message)?;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
    let mounted = mounting.await?;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let posted: Vec<Value> = host.posted().iter().map(redacted).collect();
    let frame = host.current_frame();
    let mount = match &mounted {
        Ok(()) => json!({"ok": true}),
        Err(e) => json!({"ok": false, "code": e.code().to_string(), "message": e.to_string()}),
    };
    let report = json!({
        "mount": mount,
        "posted": posted,
        "events": events.lock().map(|e| e.clone()).unwrap_or_default(),
        "state": {
            "widget": widget.state().to_string(),
            "ready": widget.is_ready(),
            "session_id": widget.get_session_id(),
            "type": widget.get_type(),
            "session_data": widget.get_session_data(),
            "allocations": widget.get_allocations(),
            "total_amount": widget.total_amount(),
            "frame_address": widget.frame_address().map(|u| u.to_string()),
            "frame_size": frame.map(|f| json!({"width": f.width, "height": f.height})),
        },
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    widget.destroy();
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = match &cli.config {
        Some(path) => WidgetConfig::from_file(path)?,
        None => WidgetConfig::default(),
    };
    config.debug |= cli.verbose;
    debug!("config: {:?}", config);

    match &cli.command {
        Commands::Validate { input } => validate(input),
        Commands::Replay(args) => replay(args, config).await,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
