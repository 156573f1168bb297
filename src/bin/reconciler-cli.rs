use clap::{Args, Parser, Subcommand};
use proxy_reconciler::engine::BackendEvent;
use proxy_reconciler::registry::BackendState;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "reconciler-cli")]
#[command(about = "Management CLI for the proxy reconciler admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "RECONCILER_API_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show engine status and the last pass result
    Status,
    /// List services with their rendered backends
    Services,
    /// Print `active` or `backup` for one rendered server
    Backend { service: String, server: String },
    /// Report a backend joining
    Join(BackendArgs),
    /// Report a backend changing target or state
    Change(BackendArgs),
    /// Report a backend leaving
    Depart {
        source_id: String,
        host: String,
        port: u16,
    },
    /// Drop every backend reported by a source
    Teardown { source_id: String },
}

#[derive(Args)]
struct BackendArgs {
    source_id: String,
    host: String,
    port: u16,
    /// Target service; omitted means the default (first) service
    #[arg(short, long)]
    service: Option<String>,
    #[arg(long, default_value = "active")]
    state: BackendState,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let base = cli.url.trim_end_matches('/');

    let event = match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/admin/status", base)).headers(headers).send().await?;
            return print_json(res).await;
        }
        Commands::Services => {
            let res = client.get(format!("{}/admin/services", base)).headers(headers).send().await?;
            return print_json(res).await;
        }
        Commands::Backend { service, server } => {
            let res = client
                .get(format!("{}/admin/backends/{}/{}", base, service, server))
                .headers(headers)
                .send()
                .await?;
            return print_text(res).await;
        }
        Commands::Join(args) => BackendEvent::BackendJoined {
            source_id: args.source_id,
            service_name: args.service,
            host: args.host,
            port: args.port,
            state: args.state,
        },
        Commands::Change(args) => BackendEvent::BackendChanged {
            source_id: args.source_id,
            service_name: args.service,
            host: args.host,
            port: args.port,
            state: args.state,
        },
        Commands::Depart { source_id, host, port } => BackendEvent::BackendDeparted {
            source_id,
            host,
            port,
        },
        Commands::Teardown { source_id } => BackendEvent::SourceTornDown { source_id },
    };

    let res = client
        .post(format!("{}/admin/events", base))
        .headers(headers)
        .json(&event)
        .send()
        .await?;
    print_json(res).await
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let Some(res) = check_status(res).await else {
        return Ok(());
    };
    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn print_text(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let Some(res) = check_status(res).await else {
        return Ok(());
    };
    println!("{}", res.text().await?);
    Ok(())
}

async fn check_status(res: reqwest::Response) -> Option<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Some(res);
    }
    eprintln!("Error: Admin API returned status {}", status);
    if let Ok(text) = res.text().await {
        eprintln!("Response: {}", text);
    }
    None
}
