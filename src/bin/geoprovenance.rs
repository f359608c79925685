use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use geoprovenance::app::{App, ConfigResult, IngestOutcome, IngestRequest};
use geoprovenance::config::{
    Config, ConfigStore, DefaultDirectory, DirectoryPrompt, Settings, expand_path,
};
use geoprovenance::domain::{DatasetName, SourceUrl};
use geoprovenance::download::HttpDownloader;
use geoprovenance::error::GeoError;
use geoprovenance::output::{JsonOutput, OutputMode, TextOutput};
use geoprovenance::progress::TerminalProgress;

#[derive(Parser)]
#[command(name = "geoprovenance")]
#[command(about = "Download datasets and keep track of where they came from")]
#[command(version)]
struct Cli {
    /// Print JSON results and never prompt.
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Config file to use instead of ~/.geoprovenance/config.json.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download a file and record metadata")]
    Ingest(IngestArgs),
    #[command(about = "Print the current config and set the data save directory")]
    Config(ConfigArgs),
    #[command(about = "List all dataset names and their associated tags")]
    List,
    #[command(about = "Search datasets by name or tag")]
    Search(SearchArgs),
    #[command(about = "Print the full path of a dataset by name")]
    Find(FindArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// URL of the file to download
    url: String,

    /// Name of the dataset
    #[arg(long)]
    name: String,

    /// Tags associated with the download (space-separated)
    #[arg(long, num_args = 1..)]
    tags: Vec<String>,

    /// Keep only this member of a downloaded zip archive
    #[arg(long)]
    extract: Option<String>,
}

#[derive(Args)]
struct ConfigArgs {
    /// Directory where data is saved
    #[arg(long)]
    dir: Option<String>,
}

#[derive(Args)]
struct SearchArgs {
    /// Text to look for in dataset names and tags
    query: String,
}

#[derive(Args)]
struct FindArgs {
    /// Name of the dataset to find
    dataset: String,
}

struct StdinPrompt;

impl DirectoryPrompt for StdinPrompt {
    fn choose(&self, default: &Utf8Path) -> Result<Utf8PathBuf, GeoError> {
        let io_error = |err: io::Error| GeoError::Filesystem(err.to_string());
        let mut stdout = io::stdout();
        write!(stdout, "Where should downloaded data be stored? [{default}]: ").map_err(io_error)?;
        stdout.flush().map_err(io_error)?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).map_err(io_error)?;
        let answer = line.trim();
        if answer.is_empty() {
            Ok(default.to_owned())
        } else {
            Ok(Utf8PathBuf::from(answer))
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<GeoError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_DOWNLOAD: u8 = 3;

fn map_exit_code(error: &GeoError) -> u8 {
    match error {
        GeoError::Configuration
        | GeoError::NotFound(_)
        | GeoError::MetadataFileMissing(_)
        | GeoError::InvalidName(_)
        | GeoError::InvalidUrl(_) => EXIT_USAGE,
        error if error.is_download() => EXIT_DOWNLOAD,
        _ => EXIT_FAILURE,
    }
}

fn ingest_exit_code(outcome: &IngestOutcome) -> u8 {
    match outcome {
        IngestOutcome::Recorded { .. } => 0,
        IngestOutcome::Skipped { .. } => EXIT_DOWNLOAD,
    }
}

// `--config` wins over `$GEOPROVENANCE_CONFIG`, which wins over the home default.
fn config_store(flag: Option<&str>) -> Result<ConfigStore, GeoError> {
    match flag {
        Some(path) => Ok(ConfigStore::with_path(expand_path(path)?)),
        None => ConfigStore::new(),
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let store = config_store(cli.config.as_deref())?;
    let prompt: &dyn DirectoryPrompt =
        if matches!(output_mode, OutputMode::Interactive) && io::stdin().is_terminal() {
            &StdinPrompt
        } else {
            &DefaultDirectory
        };

    match cli.command {
        Commands::Config(args) => run_config(args, &store, prompt, output_mode),
        command => {
            let settings = store.load(prompt)?.resolve()?;
            let downloader = HttpDownloader::new()?;
            let app = App::new(settings, downloader);
            run_with_settings(command, &app, output_mode)
        }
    }
}

fn run_config(
    args: ConfigArgs,
    store: &ConfigStore,
    prompt: &dyn DirectoryPrompt,
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    let config = match args.dir {
        Some(dir) => {
            let dir = expand_path(&dir)?;
            let config = store.update(Config::with_download_directory(dir.clone()))?;
            if matches!(output_mode, OutputMode::Interactive) {
                println!("Data save directory updated to: {dir}");
            }
            config
        }
        None => store.load(prompt)?,
    };

    let result = ConfigResult::new(store, &config);
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_config(&result).into_diagnostic()?,
        OutputMode::Interactive => println!("{}", TextOutput::config(&result)),
    }
    Ok(ExitCode::SUCCESS)
}

fn run_with_settings(
    command: Commands,
    app: &App<HttpDownloader>,
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    let interactive = matches!(output_mode, OutputMode::Interactive);
    match command {
        Commands::Ingest(args) => {
            let request = IngestRequest {
                url: args.url.parse::<SourceUrl>()?,
                name: args.name.parse::<DatasetName>()?,
                tags: args.tags,
                extract: args.extract,
            };
            let result = if interactive {
                app.ingest(request, &TerminalProgress::new())?
            } else {
                app.ingest(request, &JsonOutput)?
            };
            print_ingest(&result, app.settings(), output_mode)?;
            Ok(ExitCode::from(ingest_exit_code(&result)))
        }
        Commands::List => {
            let result = app.list();
            if interactive {
                println!("{}", TextOutput::list(&result));
            } else {
                JsonOutput::print_list(&result).into_diagnostic()?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Search(args) => {
            let result = app.search(&args.query);
            if interactive {
                println!("{}", TextOutput::search(&result));
            } else {
                JsonOutput::print_search(&result).into_diagnostic()?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Find(args) => {
            let result = app.find(&args.dataset)?;
            if interactive {
                println!("{}", TextOutput::find(&result));
            } else {
                JsonOutput::print_find(&result).into_diagnostic()?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config(_) => Err(miette::Report::msg(
            "config does not need a configured download directory",
        )),
    }
}

fn print_ingest(
    result: &IngestOutcome,
    settings: &Settings,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_ingest(result).into_diagnostic(),
        OutputMode::Interactive => {
            println!("{}", TextOutput::ingest(result, &settings.metadata_file));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use geoprovenance::store::{AddOutcome, Record};

    #[test]
    fn usage_errors_exit_with_two() {
        for error in [
            GeoError::Configuration,
            GeoError::NotFound("dem".to_string()),
            GeoError::MetadataFileMissing(Utf8PathBuf::from("/data/metadata.json")),
            GeoError::InvalidName(" ".to_string()),
            GeoError::InvalidUrl("ftp://example.com".to_string()),
        ] {
            assert_eq!(map_exit_code(&error), 2, "{error}");
        }
    }

    #[test]
    fn download_errors_exit_with_three() {
        for error in [
            GeoError::Download {
                url: "https://example.com/a.zip".to_string(),
                message: "connection refused".to_string(),
            },
            GeoError::DownloadStatus {
                url: "https://example.com/a.zip".to_string(),
                status: 404,
            },
            GeoError::Extraction {
                member: "a.tif".to_string(),
                message: "not found".to_string(),
            },
            GeoError::HttpClient("tls backend".to_string()),
        ] {
            assert_eq!(map_exit_code(&error), 3, "{error}");
        }
    }

    #[test]
    fn other_errors_exit_with_one() {
        for error in [
            GeoError::DuplicateName {
                name: "dem".to_string(),
                source_url: "https://example.com/a.zip".to_string(),
            },
            GeoError::ConfigRead(Utf8PathBuf::from("/etc/config.json")),
            GeoError::ConfigLocation("no home".to_string()),
            GeoError::Filesystem("disk full".to_string()),
            GeoError::Serialization("bad".to_string()),
        ] {
            assert_eq!(map_exit_code(&error), 1, "{error}");
        }
    }

    #[test]
    fn skipped_ingest_exits_with_three() {
        let skipped = IngestOutcome::Skipped {
            url: "https://example.com/a.zip".to_string(),
            reason: "connection refused".to_string(),
        };
        let recorded = IngestOutcome::Recorded {
            outcome: AddOutcome::Inserted(Record {
                id: 1,
                source_url: "https://example.com/a.zip".to_string(),
                downloaded_filename: "a.zip".to_string(),
                data_name: "a".to_string(),
                tags: Vec::new(),
                download_timestamp: "2024-01-01T00:00:00+00:00".to_string(),
            }),
            path: Utf8PathBuf::from("/data/a.zip"),
        };

        assert_eq!(ingest_exit_code(&skipped), 3);
        assert_eq!(ingest_exit_code(&recorded), 0);
    }

    #[test]
    fn config_flag_picks_the_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("geo.json")).unwrap();

        let store = config_store(Some(path.as_str())).unwrap();

        assert_eq!(store.path(), path.as_path());
    }
}
