use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use eurostat_fs::config::ConfigLoader;
use eurostat_fs::domain::Agency;
use eurostat_fs::download::DownloadFilters;
use eurostat_fs::driver::EurostatDriver;
use eurostat_fs::error::CatalogError;
use eurostat_fs::output::{DownloadResult, JsonOutput, write_tree};
use eurostat_fs::resolver::ListRequest;

const LOOKUP_MISS: u8 = 2;

#[derive(Parser)]
#[command(name = "estat-fs")]
#[command(about = "Browse the Eurostat SDMX catalog as folders and download dataflows as CSV")]
#[command(version, author)]
struct Cli {
    /// Path to eurostat-fs.json; defaults to ./eurostat-fs.json when present.
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    agency: Option<Agency>,

    #[arg(long, global = true)]
    connection: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "List the root or the contents of a container")]
    List(ListArgs),
    #[command(about = "Show one container or item")]
    Info(InfoArgs),
    #[command(about = "Search dataflow names")]
    Search(SearchArgs),
    #[command(about = "Print the whole reachable catalog")]
    Tree,
    #[command(about = "Download a dataflow as CSV")]
    Download(DownloadArgs),
    #[command(about = "Fetch codelists by id")]
    Codelist(CodelistArgs),
}

#[derive(Args)]
struct ListArgs {
    container: Option<String>,

    #[arg(long)]
    query: Option<String>,

    #[arg(long)]
    page_size: Option<usize>,

    #[arg(long)]
    category_scheme: Option<String>,
}

#[derive(Args)]
struct InfoArgs {
    id: String,
}

#[derive(Args)]
struct SearchArgs {
    text: String,
}

#[derive(Args)]
struct DownloadArgs {
    id: String,

    #[arg(long)]
    dest: Utf8PathBuf,

    #[arg(long)]
    filename: Option<String>,

    #[arg(long)]
    start_period: Option<String>,

    #[arg(long)]
    end_period: Option<String>,

    #[arg(long = "first-n")]
    first_n: Option<String>,

    #[arg(long = "last-n")]
    last_n: Option<String>,
}

#[derive(Args)]
struct CodelistArgs {
    #[arg(required = true)]
    ids: Vec<String>,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<CatalogError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::InvalidItemKey(_) | CatalogError::UnknownAgency(_) => LOOKUP_MISS,
        CatalogError::Http(_)
        | CatalogError::Status { .. }
        | CatalogError::UnexpectedContentType { .. }
        | CatalogError::Xml { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(agency) = cli.agency {
        config = config.with_agency(agency);
    }
    let config = config.with_connection(cli.connection);
    tracing::debug!(
        agency = %config.agency,
        publisher = config.agency.label(),
        base_uri = %config.base_uri,
        "configuration resolved"
    );

    let driver = EurostatDriver::new(config)?;

    match cli.command {
        Command::List(args) => {
            let request = ListRequest {
                container_id: args.container.as_deref(),
                query: args.query.as_deref(),
                page_size: args.page_size,
                category_scheme: args.category_scheme.as_deref(),
            };
            let response = driver.list_container(&request)?;
            JsonOutput::print_listing(&response).into_diagnostic()?;
        }
        Command::Info(args) => {
            let item = driver.get_item_info(&args.id)?;
            JsonOutput::print_item(item.as_ref()).into_diagnostic()?;
            if item.is_none() {
                tracing::warn!(id = %args.id, "not in the catalog");
                return Ok(ExitCode::from(LOOKUP_MISS));
            }
        }
        Command::Search(args) => {
            let response = driver.search(&args.text)?;
            JsonOutput::print_listing(&response).into_diagnostic()?;
        }
        Command::Tree => {
            let snapshot = driver.snapshot()?;
            let mut stdout = std::io::stdout().lock();
            write_tree(&snapshot, &mut stdout).into_diagnostic()?;
            let report = snapshot.report();
            if !report.orphans.is_empty() {
                tracing::warn!(orphans = report.orphans.len(), "some categories are unreachable");
            }
        }
        Command::Download(args) => {
            let filters = DownloadFilters {
                start_period: args.start_period,
                end_period: args.end_period,
                first_n_observations: args.first_n,
                last_n_observations: args.last_n,
            };
            let path =
                driver.download_item(&args.id, &args.dest, args.filename.as_deref(), &filters)?;
            let result = DownloadResult {
                id: args.id,
                path: path.to_string(),
            };
            JsonOutput::print_download(&result).into_diagnostic()?;
        }
        Command::Codelist(args) => {
            let codelists = driver.fetch_codelists(&args.ids)?;
            JsonOutput::print_codelists(&codelists).into_diagnostic()?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
