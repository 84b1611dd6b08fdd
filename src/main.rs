use chrono::Local;
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use video_client::network::AlwaysOnline;
use video_client::transport::TokioWebSocketTransportFactory;
use video_client::videocore::CallIdentity;
use video_client::{Client, ClientConfig, Event};
use video_ureq_client::UreqHttpClient;

// Joins a call and logs everything that happens until Ctrl-C.
//
// Usage:
//   cargo run -- --api-key KEY --token JWT --user-id alice default:standup
//   cargo run -- --config client.json --user-id alice --create default:standup

#[derive(Parser)]
#[command(name = "video-client")]
#[command(about = "Join a video call and log signaling events")]
struct Cli {
    /// Call to join, as `type:id`.
    call: String,

    #[arg(short, long)]
    user_id: String,

    #[arg(short = 'k', long, env = "VIDEO_API_KEY")]
    api_key: Option<String>,

    #[arg(short, long, env = "VIDEO_USER_TOKEN")]
    token: Option<String>,

    /// JSON file with a `ClientConfig`; flags override its credentials.
    #[arg(short, long)]
    config: Option<String>,

    /// Create the call if it does not exist yet.
    #[arg(long)]
    create: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => ClientConfig::default(),
    };
    if let Some(key) = &cli.api_key {
        config.api_key = key.clone();
    }
    if let Some(token) = &cli.token {
        config.user_token = token.clone();
    }
    if config.api_key.is_empty() || config.user_token.is_empty() {
        anyhow::bail!("an API key and a user token are required");
    }
    Ok(config)
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e:#}");
            return;
        }
    };
    let call: CallIdentity = match cli.call.parse() {
        Ok(call) => call,
        Err(e) => {
            error!("{e}");
            return;
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to build tokio runtime: {e}");
            return;
        }
    };

    rt.block_on(async {
        let client = Client::with_http_client(
            config,
            cli.user_id.clone(),
            Arc::new(UreqHttpClient::new()),
            Arc::new(TokioWebSocketTransportFactory::new()),
            Arc::new(AlwaysOnline),
        );

        client.subscribe(Arc::new(|event: &Event| -> anyhow::Result<()> {
            match event {
                Event::ConnectionStateChanged(state) => {
                    info!("Connection: {}", state.name());
                    if let Some(err) = state.error() {
                        warn!("  cause: {err}");
                    }
                }
                Event::CallStateChanged(state) => info!("Call: {}", state.name()),
                Event::Sfu(sfu_event) => info!("SFU event: {}", sfu_event.name()),
                Event::ClosedCaptionsUpdated(captions) => {
                    for caption in captions {
                        info!("[{}] {}", caption.speaker_id, caption.text);
                    }
                }
            }
            Ok(())
        }));

        if let Err(e) = client.join(call.clone(), cli.create).await {
            error!("Failed to join {call}: {e}");
            return;
        }

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
        }
        info!("Leaving {call}");
        if let Err(e) = client.leave().await {
            warn!("Leave failed: {e}");
        }
    });
}
