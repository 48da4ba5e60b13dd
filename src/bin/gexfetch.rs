use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gexfetch::app::{App, BuildRequest, FetchOptions};
use gexfetch::config::{ConfigLoader, DEFAULT_MIN_CELLS, DEFAULT_MIN_FEATURES, SeriesRequest};
use gexfetch::domain::GeoSeriesAccession;
use gexfetch::error::GexError;
use gexfetch::geo::GeoHttpClient;
use gexfetch::matrix::SprsMatrixBuilder;
use gexfetch::output::{JsonOutput, TracingProgress};
use gexfetch::store::Store;

#[derive(Parser)]
#[command(name = "gexfetch")]
#[command(about = "Fetch GEO expression series and build single-cell count matrices")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download a series and build its expression matrix")]
    Fetch(FetchArgs),
    #[command(about = "List locally available series")]
    List,
    #[command(about = "Show series info")]
    Info(InfoArgs),
    #[command(about = "Clear project-local store")]
    Clear,
}

#[derive(Args, Clone)]
struct FetchArgs {
    accession: Option<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long, default_value_t = DEFAULT_MIN_CELLS)]
    min_cells: u32,

    #[arg(long, default_value_t = DEFAULT_MIN_FEATURES)]
    min_features: u32,

    #[arg(long)]
    label: Option<String>,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    no_cache: bool,

    #[arg(long)]
    skip_build: bool,
}

#[derive(Args)]
struct InfoArgs {
    accession: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(gex) = report.downcast_ref::<GexError>() {
            return ExitCode::from(map_exit_code(gex));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GexError) -> u8 {
    match error {
        GexError::SeriesNotFound(_) | GexError::NotDetected | GexError::MissingConfig => 2,
        GexError::GeoHttp(_) | GexError::GeoStatus { .. } | GexError::GeoResolution(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = Store::new()?;
    let geo = GeoHttpClient::new()?;
    let app = App::new(store, geo, SprsMatrixBuilder, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Fetch(args) => fetch(&app, args),
        Commands::List => {
            let result = app.list(&TracingProgress)?;
            JsonOutput::print_list(&result).map_err(|err| GexError::Filesystem(err.to_string()))?;
            Ok(())
        }
        Commands::Info(args) => {
            let accession: GeoSeriesAccession = args.accession.parse()?;
            let result = app.info(&accession, &TracingProgress)?;
            JsonOutput::print_info(&result).map_err(|err| GexError::Filesystem(err.to_string()))?;
            Ok(())
        }
        Commands::Clear => {
            let result = app.clear(&TracingProgress)?;
            JsonOutput::print_clear(&result)
                .map_err(|err| GexError::Filesystem(err.to_string()))?;
            Ok(())
        }
    }
    .map_err(miette::Report::new)
}

fn fetch(app: &App<GeoHttpClient, SprsMatrixBuilder>, args: FetchArgs) -> Result<(), GexError> {
    let options = FetchOptions {
        force: args.force,
        no_cache: args.no_cache,
    };

    let requests: Vec<SeriesRequest> = match &args.accession {
        Some(value) => vec![SeriesRequest {
            accession: value.parse()?,
            min_cells: args.min_cells,
            min_features: args.min_features,
            label: args.label.clone(),
        }],
        None => ConfigLoader::resolve(args.config.as_deref())?.series,
    };

    for request in requests {
        let report = app.fetch(&request.accession, &options, &TracingProgress)?;
        JsonOutput::print_fetch(&report).map_err(|err| GexError::Filesystem(err.to_string()))?;

        if args.skip_build {
            continue;
        }
        let build_request = BuildRequest {
            min_cells: request.min_cells,
            min_features: request.min_features,
            label: request.label.clone(),
        };
        let (_, built) = app.build(&request.accession, &build_request, &TracingProgress)?;
        JsonOutput::print_build(&built).map_err(|err| GexError::Filesystem(err.to_string()))?;
    }
    Ok(())
}
