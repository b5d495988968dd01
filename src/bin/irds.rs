use std::io::{self, BufWriter, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use ir_datasets::app::App;
use ir_datasets::cache::CacheStore;
use ir_datasets::config::{ConfigLoader, ResolvedConfig};
use ir_datasets::dataset::Capability;
use ir_datasets::descriptor::JsonDescriptorSource;
use ir_datasets::error::IrdsError;
use ir_datasets::fetch::{DownloadClient, HttpDownloadClient};
use ir_datasets::output::{HumanOutput, JsonOutput, OutputMode, TracingSink};
use ir_datasets::registry::{Registry, ResourceFactory};
use ir_datasets::resource::CancelToken;
use ir_datasets::store::Store;

#[derive(Parser)]
#[command(name = "irds")]
#[command(about = "Download, cache and stream IR benchmark datasets")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List registered datasets")]
    List,
    #[command(about = "Show dataset components and cache state")]
    Info(InfoArgs),
    #[command(about = "Materialize every component of the given datasets")]
    Fetch(FetchArgs),
    #[command(about = "Stream records of one component as JSON lines")]
    Export(ExportArgs),
}

#[derive(Args)]
struct InfoArgs {
    id: String,
}

#[derive(Args)]
struct FetchArgs {
    #[arg(required = true)]
    ids: Vec<String>,

    #[arg(long, help = "Abandon resolution after this many seconds")]
    timeout_secs: Option<u64>,
}

#[derive(Args)]
struct ExportArgs {
    id: String,

    #[arg(value_enum)]
    capability: Capability,

    #[arg(long)]
    limit: Option<usize>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<IrdsError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IrdsError) -> u8 {
    match error {
        IrdsError::UnknownId(_) | IrdsError::Capability { .. } | IrdsError::ConfigRead(_) => 2,
        IrdsError::Transport { .. }
        | IrdsError::HttpStatus { .. }
        | IrdsError::Integrity { .. }
        | IrdsError::ConfigUnavailable { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = App::new(build_registry(&config)?);

    match cli.command {
        Commands::List => {
            let result = app.list(&TracingSink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_list(&result).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_list(&result),
            }
        }
        Commands::Info(args) => {
            let result = app.info(&args.id, &TracingSink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_info(&result).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_info(&result),
            }
        }
        Commands::Fetch(args) => {
            let cancel = match args.timeout_secs {
                Some(secs) => CancelToken::with_timeout(std::time::Duration::from_secs(secs)),
                None => CancelToken::new(),
            };
            let result = app.fetch(&args.ids, &cancel, &TracingSink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_fetch(&result).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_fetch(&result),
            }
        }
        Commands::Export(args) => {
            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            let result = app.export(
                &args.id,
                args.capability,
                args.limit,
                &mut writer,
                &TracingSink,
            )?;
            writer.flush().into_diagnostic()?;
            HumanOutput::print_export(&result);
        }
    }
    Ok(())
}

fn build_registry(config: &ResolvedConfig) -> Result<Registry, IrdsError> {
    let store = Store::new(config.cache_root.clone());
    store.ensure_root()?;
    let client: Arc<dyn DownloadClient> = Arc::new(HttpDownloadClient::new(config.fetch.timeout)?);
    let descriptors = Arc::new(JsonDescriptorSource::new(
        config.downloads.clone(),
        store.clone(),
        Arc::clone(&client),
    ));
    let cache = CacheStore::new(store, config.cache);
    let factory = ResourceFactory::new(cache, descriptors, client, config.fetch);
    Registry::bootstrap(&factory)
}
