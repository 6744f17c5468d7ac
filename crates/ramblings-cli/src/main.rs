use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use ramblings_common::telemetry::{self, TelemetryConfig};
use ramblings_common::{AtUri, ConfigError, ContentConfig, Lookup, XrpcClient};
use ramblings_renderer::{ContentService, ThreadFetcher, redirect_location};

#[derive(Parser)]
#[command(version, about = "Ramblings - render an ATProto publication to HTML", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Publication record URI (at://did/collection/rkey)
    #[arg(long, global = true, env = "RAMBLINGS_PUBLICATION_URI")]
    publication_uri: Option<String>,

    /// File holding the repository DID
    #[arg(long, global = true, env = "RAMBLINGS_DID_FILE")]
    did_file: Option<PathBuf>,

    /// Console log level when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<tracing::Level>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every document as JSON summaries, newest first
    Index,
    /// Resolve a slug to a record, a redirect, or nothing
    Show {
        /// Slug, optionally split into path segments
        #[arg(required = true)]
        slug: Vec<String>,
    },
    /// Render a document to HTML
    Render {
        #[arg(required = true)]
        slug: Vec<String>,

        /// Write the HTML here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the rendered document with its metadata as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch the comment thread of a post as JSON
    Thread {
        /// at:// URI of the post
        uri: String,
    },
    /// Show the publication title and description
    Publication,
    /// Render every document and report the ones that come out empty
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_miette();

    let cli = Cli::parse();

    let mut telemetry_config = TelemetryConfig::from_env("ramblings-cli");
    if let Some(level) = cli.log_level {
        telemetry_config = telemetry_config.with_level(level);
    }
    telemetry::init(telemetry_config);

    let config = load_config(cli.publication_uri, cli.did_file)?;
    let service = build_service(&config)?;

    match cli.command {
        Commands::Index => {
            let index = service.index().await?;
            print_json(&index)?;
        }
        Commands::Show { slug } => match service.by_slug_segments(&slug).await? {
            Lookup::Found(record) => print_json(&*record)?,
            Lookup::Redirect(path) => println!("→ redirect to {}", redirect_location(&path)),
            Lookup::NotFound => miette::bail!("no document at {}", slug.join("/")),
        },
        Commands::Render { slug, out, json } => {
            let record = match service.by_slug_segments(&slug).await? {
                Lookup::Found(record) => record,
                Lookup::Redirect(path) => {
                    tracing::info!(%path, "following redirect");
                    match service.by_slug(&path).await? {
                        Lookup::Found(record) => record,
                        _ => miette::bail!("redirect target {path} is missing"),
                    }
                }
                Lookup::NotFound => miette::bail!("no document at {}", slug.join("/")),
            };

            let rendered = service.render(&record).await?;
            let output = if json {
                serde_json::to_string_pretty(&rendered).into_diagnostic()?
            } else {
                rendered.html
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, output).into_diagnostic()?;
                    println!("✓ Output: {}", path.display());
                }
                None => println!("{output}"),
            }
        }
        Commands::Thread { uri } => {
            let thread = service.comments(&uri).await?;
            print_json(&thread)?;
        }
        Commands::Publication => {
            let publication = service.publication().await?;
            println!("{}", publication.title);
            if let Some(description) = publication.description {
                println!("{description}");
            }
        }
        Commands::Check => {
            let start = std::time::Instant::now();
            let rendered = service.render_all().await?;
            let empty: Vec<_> = rendered
                .iter()
                .filter(|doc| doc.html.trim().is_empty())
                .collect();

            for doc in &empty {
                println!("⚠ {} rendered no content ({})", doc.path, doc.document_uri);
            }
            println!(
                "✓ Rendered {} documents in {:.2}s, {} empty",
                rendered.len(),
                start.elapsed().as_secs_f64(),
                empty.len()
            );
            if !empty.is_empty() {
                miette::bail!("{} documents rendered empty", empty.len());
            }
        }
    }

    Ok(())
}

/// Environment first, then command-line overrides.
fn load_config(
    publication_uri: Option<String>,
    did_file: Option<PathBuf>,
) -> Result<ContentConfig, ConfigError> {
    let mut config = ContentConfig::from_env()?;
    if let Some(uri) = publication_uri {
        if AtUri::parse(&uri).is_none() {
            return Err(ConfigError::InvalidPublicationUri { uri });
        }
        config.publication_uri = uri;
    }
    if let Some(path) = did_file {
        config.did_file = path;
    }
    Ok(config)
}

fn build_service(config: &ContentConfig) -> Result<ContentService<XrpcClient>> {
    let client = XrpcClient::new(config.plc_directory.clone(), config.http_timeout)?;
    let threads = ThreadFetcher::from_config(client.http().clone(), config);
    Ok(ContentService::new(Arc::new(client), config, threads))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}

fn init_miette() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))
    .expect("couldn't set the miette hook");
    miette::set_panic_hook();
}
