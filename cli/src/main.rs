use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use plex_core::{
    describe_error, Format, PlexClient, PlexConfig, PlexRequest, PlexTvAuthenticator,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plexctl")]
#[command(author, version, about = "Query and manage a Plex Media Server")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server URL (overrides config and PLEX_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the server's identity
    Identity,

    /// List library sections
    Sections,

    /// List every item in a library section
    Items {
        /// Section key as shown by `sections`
        section: String,

        /// Items requested per page
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Ask the server to rescan a library section
    Refresh {
        section: String,
    },

    /// Issue a raw GET and print the decoded response
    Get {
        /// Endpoint relative to the server URL
        endpoint: String,

        /// Query parameters as key=value (a bare key sends no value)
        #[arg(short, long = "param")]
        params: Vec<String>,

        #[arg(long, value_enum, default_value_t = WireFormat::Json)]
        format: WireFormat,

        /// Follow pagination and print only the collected items
        #[arg(long)]
        all: bool,
    },

    /// Sign in with the configured username/password and print a fresh token
    SignIn,
}

#[derive(Clone, Copy, ValueEnum)]
enum WireFormat {
    Json,
    Xml,
    Raw,
}

impl From<WireFormat> for Format {
    fn from(format: WireFormat) -> Self {
        match format {
            WireFormat::Json => Format::Json,
            WireFormat::Xml => Format::Xml,
            WireFormat::Raw => Format::Raw,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = if cli.verbose {
        EnvFilter::new("plexctl=debug,plex_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = PlexConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    let page_size = config.page_size;
    let connection = config.into_connection().context("Invalid connection settings")?;
    let client = PlexClient::new(connection)?;

    if let Err(e) = run(&client, cli.command, page_size).await {
        if let Some(plex) = e.downcast_ref::<plex_core::PlexError>() {
            tracing::error!("{}", describe_error(plex));
        }
        return Err(e);
    }
    Ok(())
}

async fn run(client: &PlexClient, command: Commands, default_page_size: usize) -> Result<()> {
    match command {
        Commands::Identity => {
            let identity = client.server_identity().await?;
            print_json(&identity)
        }
        Commands::Sections => {
            for section in client.library_sections().await? {
                println!("{:>4}  {:<8}  {}", section.key, section.kind, section.title);
            }
            Ok(())
        }
        Commands::Items { section, page_size } => {
            let items = client
                .section_items(&section, page_size.unwrap_or(default_page_size))
                .await?;
            for item in &items {
                match item.year {
                    Some(year) => println!("{:>8}  {} ({year})", item.rating_key, item.title),
                    None => println!("{:>8}  {}", item.rating_key, item.title),
                }
            }
            tracing::info!(count = items.len(), "items listed");
            Ok(())
        }
        Commands::Refresh { section } => {
            client.refresh_section(&section).await?;
            println!("refresh requested for section {section}");
            Ok(())
        }
        Commands::Get {
            endpoint,
            params,
            format,
            all,
        } => {
            let mut request = PlexRequest::get(endpoint)
                .request_format(format.into())
                .response_format(format.into());
            for param in params {
                let (key, value) = param.split_once('=').unwrap_or((param.as_str(), ""));
                request = request.query(key, value);
            }

            if all {
                let items = client.paginate(request, default_page_size).await?;
                return print_json(&items);
            }

            let envelope = client.send(request).await?;
            eprintln!("HTTP {} {}", envelope.status(), envelope.reason());
            match envelope.content() {
                serde_json::Value::String(text) => println!("{text}"),
                content => print_json(content)?,
            }
            Ok(())
        }
        Commands::SignIn => {
            let client_id = client.connection().await.client_identifier().to_string();
            let authenticator = PlexTvAuthenticator::new(client_id)?;
            let token = client.refresh_token(&authenticator).await?;
            println!("{token}");
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
