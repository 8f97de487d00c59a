use std::process::ExitCode;

use camino::Utf8PathBuf;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use fingrid_explorer::app::{App, FetchReport, Outcome, ProgressSink};
use fingrid_explorer::client::FingridHttpClient;
use fingrid_explorer::config::{
    ApiKey, ConfigLoader, DatePolicy, KeySource, ResolvedConfig, resolve_api_key_from_env,
};
use fingrid_explorer::domain::{AggregationMode, DatasetId, DateWindow, Granularity, Locale};
use fingrid_explorer::error::ExplorerError;
use fingrid_explorer::export::write_csv_file;
use fingrid_explorer::labels::builtin_entries;
use fingrid_explorer::output::{FetchView, JsonOutput, OutputMode, TextOutput};
use fingrid_explorer::session::Session;
use fingrid_explorer::table::SeriesTable;

#[derive(Parser)]
#[command(name = "fgx")]
#[command(about = "Search, fetch and resample Fingrid Open Data time series")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    /// Personal API key from data.fingrid.fi; falls back to FGAPIKEY.
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search the dataset catalog")]
    Search(SearchArgs),
    #[command(about = "Search, select and fetch datasets")]
    Fetch(FetchArgs),
    #[command(about = "Show the API call for a dataset")]
    Url(UrlArgs),
    #[command(about = "List category code labels")]
    Labels,
}

#[derive(Args)]
struct SearchArgs {
    query: String,
}

#[derive(Args)]
struct FetchArgs {
    query: String,

    /// Dataset ids from the search results.
    #[arg(long, value_delimiter = ',', required_unless_present = "all")]
    select: Vec<String>,

    #[arg(long, conflicts_with = "select")]
    all: bool,

    #[arg(long)]
    start: Option<NaiveDate>,

    #[arg(long)]
    end: Option<NaiveDate>,

    /// Granularity of the combined view and of resampled dataset tables.
    #[arg(long, value_enum, default_value = "hour")]
    granularity: Granularity,

    /// Resample each dataset table with this mode instead of showing raw rows.
    #[arg(long, value_enum)]
    resample: Option<AggregationMode>,

    /// Directory to write one CSV per dataset plus combined.csv.
    #[arg(long)]
    csv: Option<Utf8PathBuf>,

    #[arg(long, default_value_t = 20)]
    rows: usize,
}

#[derive(Args)]
struct UrlArgs {
    id: String,

    #[arg(long)]
    start: Option<NaiveDate>,

    #[arg(long)]
    end: Option<NaiveDate>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ExplorerError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ExplorerError) -> u8 {
    match error {
        ExplorerError::Auth(_)
        | ExplorerError::InvalidDatasetId(_)
        | ExplorerError::InvalidRange(_)
        | ExplorerError::InvalidGranularity(_)
        | ExplorerError::InvalidTransition { .. }
        | ExplorerError::ConfigRead(_)
        | ExplorerError::ConfigParse(_) => 2,
        ExplorerError::Network(_) | ExplorerError::Status { .. } | ExplorerError::Decode(_) => 3,
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
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let user_key = cli.api_key.as_deref().or(config.api_key.as_deref());
    let api_key = resolve_api_key_from_env(user_key);

    match cli.command {
        Commands::Search(args) => run_search(args, &config, api_key, output_mode),
        Commands::Fetch(args) => run_fetch(args, &config, api_key, output_mode),
        Commands::Url(args) => run_url(args, &config, api_key),
        Commands::Labels => run_labels(&config, output_mode),
    }
}

fn build_app(config: &ResolvedConfig) -> miette::Result<App<FingridHttpClient>> {
    let client = FingridHttpClient::new(&config.base_url, config.timeout)?;
    Ok(App::from_config(client, config))
}

fn require_key(api_key: Option<ApiKey>) -> miette::Result<ApiKey> {
    api_key.ok_or_else(|| {
        ExplorerError::Auth("no API key given; pass --api-key or set FGAPIKEY".to_string()).into()
    })
}

fn resolve_window(
    policy: &DatePolicy,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<DateWindow, ExplorerError> {
    let end = end.unwrap_or(policy.max_end);
    let start = start.unwrap_or(policy.default_start.min(end));
    DateWindow::new(start, end)
}

fn run_search(
    args: SearchArgs,
    config: &ResolvedConfig,
    api_key: Option<ApiKey>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let api_key = require_key(api_key)?;
    let app = build_app(config)?;
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.search(&args.query, api_key.as_str(), &JsonOutput)?;
            JsonOutput::print_search(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let text = TextOutput {
                locale: Locale::En,
            };
            let result = app.search(&args.query, api_key.as_str(), &text)?;
            text.print_search(&result).into_diagnostic()?;
        }
    }
    Ok(())
}

fn run_fetch(
    args: FetchArgs,
    config: &ResolvedConfig,
    api_key: Option<ApiKey>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let api_key = require_key(api_key)?;
    let app = build_app(config)?;
    let policy = DatePolicy::for_source(api_key.source(), Local::now().date_naive());
    let text = TextOutput {
        locale: Locale::En,
    };
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::NonInteractive => &JsonOutput,
        OutputMode::Interactive => &text,
    };

    let mut session = Session::new();
    match app.search(&args.query, api_key.as_str(), sink) {
        Ok(result) => session.search_completed(&args.query, result.results)?,
        Err(err) => {
            session.search_failed();
            return Err(err.into());
        }
    }

    let ids = if args.all {
        session.results().iter().map(|item| item.id.clone()).collect()
    } else {
        args.select
            .iter()
            .map(|id| id.parse::<DatasetId>())
            .collect::<Result<Vec<_>, _>>()?
    };
    let window = resolve_window(&policy, args.start, args.end)?;
    session.select(&ids, window, &policy)?;

    let (selection, window) = session.begin_fetch()?;
    let report = app.fetch_selection(&selection, window, api_key.as_str(), sink);
    session.finish_fetch(report.succeeded(), report.failed())?;

    let tables = dataset_tables(&app, &report, args.granularity, args.resample)?;
    let combined = app.combined(&report, args.granularity)?;

    if let Some(dir) = &args.csv {
        for (item, table) in report.items.iter().zip(&tables) {
            if let Some(table) = table {
                write_csv_file(table, &dir.join(format!("{}.csv", item.descriptor.id)))?;
            }
        }
        if let Some(combined) = &combined {
            write_csv_file(combined, &dir.join("combined.csv"))?;
        }
    }

    match output_mode {
        OutputMode::NonInteractive => {
            let view = FetchView::new(&report, &tables, combined.as_ref());
            JsonOutput::print_fetch(&view).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            for (item, table) in report.items.iter().zip(&tables) {
                if let Some(table) = table {
                    let title = format!(
                        "{} [{}]",
                        item.descriptor.name(Locale::En),
                        item.descriptor.unit(Locale::En)
                    );
                    text.print_table(&title, table, args.rows).into_diagnostic()?;
                }
            }
            if let Some(combined) = &combined {
                let title = format!("Combined ({}, ffill)", args.granularity);
                text.print_table(&title, combined, args.rows).into_diagnostic()?;
            }
            let failed = report.failed();
            if !failed.is_empty() {
                eprintln!("{} of {} datasets failed", failed.len(), report.items.len());
            }
        }
    }
    Ok(())
}

fn dataset_tables(
    app: &App<FingridHttpClient>,
    report: &FetchReport,
    granularity: Granularity,
    resample: Option<AggregationMode>,
) -> Result<Vec<Option<SeriesTable>>, ExplorerError> {
    report
        .items
        .iter()
        .map(|item| match (&item.outcome, resample) {
            (Outcome::Fetched { table, .. }, Some(mode)) => {
                app.aggregate(table, granularity, mode).map(Some)
            }
            (Outcome::Fetched { table, .. }, None) => Ok(Some(table.clone())),
            (Outcome::Failed { .. }, _) => Ok(None),
        })
        .collect()
}

fn run_url(args: UrlArgs, config: &ResolvedConfig, api_key: Option<ApiKey>) -> miette::Result<()> {
    let today = Local::now().date_naive();
    let source = api_key
        .as_ref()
        .map(ApiKey::source)
        .unwrap_or(KeySource::Environment);
    let policy = DatePolicy::for_source(source, today);
    let id: DatasetId = args.id.parse()?;
    let window = resolve_window(&policy, args.start, args.end)?;
    let app = build_app(config)?;
    println!("{}", app.api_call_url(&config.base_url, &id, window)?);
    Ok(())
}

fn run_labels(config: &ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let labeler = config.labeler();
    let mut codes: Vec<String> = builtin_entries().map(|(code, _)| code.to_string()).collect();
    for code in config.labels.keys() {
        if !codes.contains(code) {
            codes.push(code.clone());
        }
    }
    let entries = codes
        .into_iter()
        .map(|code| labeler.label(&code).map(|label| (code, label)))
        .collect::<Result<Vec<_>, _>>()?;
    match output_mode {
        OutputMode::NonInteractive => {
            let map: serde_json::Map<String, serde_json::Value> = entries
                .into_iter()
                .map(|(code, label)| (code, serde_json::Value::String(label)))
                .collect();
            JsonOutput::print_json(&map).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            for (code, label) in entries {
                println!("{code:<6} {label}");
            }
        }
    }
    Ok(())
}
