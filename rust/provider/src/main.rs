use std::{
    collections::HashMap,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use clap::Parser as _;
use futures::StreamExt as _;
use snafu::{OptionExt as _, ResultExt as _, Snafu, ensure};
use strum::{EnumDiscriminants, IntoStaticStr};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use crate::{
    framework::types::security::RoleName,
    provider::{Provider, ProviderConfig},
    resource::{
        ApplyOutcome,
        role::{self, RoleSpec, RoleState},
    },
};

mod client;
mod framework;
mod provider;
mod resource;

#[cfg(test)]
mod acceptance;
#[cfg(test)]
mod test_support;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

const LOG_ENV: &str = "OPENSEARCH_ROLE_PROVIDER_LOG";
const DEFAULT_LOG_DIRECTIVE: &str = "info";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("failed to initialize tracing subscribers"))]
    InitTracing {
        source: tracing_subscriber::util::TryInitError,
    },

    #[snafu(display("failed to configure the provider"))]
    ConfigureProvider { source: provider::Error },

    #[snafu(display("failed to serialize the output"))]
    SerializeOutput { source: serde_json::Error },

    #[snafu(display("failed to read the declaration {path:?}"))]
    ReadDeclaration {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse the declaration {path:?}"))]
    ParseDeclaration {
        source: serde_json::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to read the state file {path:?}"))]
    ReadState {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse the state file {path:?}"))]
    ParseState {
        source: serde_json::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to write the state file {path:?}"))]
    WriteState {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("{second:?} is the same declaration as {first:?}"))]
    DuplicateDeclaration { first: PathBuf, second: PathBuf },

    #[snafu(display("failed to apply the declaration {path:?}"))]
    ApplyRole { source: role::Error, path: PathBuf },

    #[snafu(display("{failed} of {total} declarations could not be applied"))]
    ApplyFailed { failed: usize, total: usize },

    #[snafu(display("failed to read role {role_name:?}"))]
    ReadRole {
        source: role::Error,
        role_name: RoleName,
    },

    #[snafu(display("role {role_name:?} does not exist"))]
    RoleNotFound { role_name: RoleName },

    #[snafu(display("failed to import role {role_name:?}"))]
    ImportRole {
        source: role::Error,
        role_name: RoleName,
    },

    #[snafu(display("failed to destroy role {role_name:?}"))]
    DestroyRole {
        source: role::Error,
        role_name: RoleName,
    },

    #[snafu(display("role {role_name:?} still exists after it was destroyed"))]
    RoleStillExists { role_name: RoleName },
}

#[derive(clap::Parser)]
#[clap(about, author, version)]
struct Opts {
    /// Format of the log output which is written to stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Plain, global = true)]
    log_format: LogFormat,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
enum LogFormat {
    Plain,
    Json,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Print the JSON schema of a role declaration
    Schema,

    /// Create or update the roles declared in the given files
    Apply {
        #[clap(flatten)]
        provider: ProviderConfig,

        /// JSON files, each containing one role declaration
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Maximum number of declarations which are applied at the same time
        #[arg(long, default_value = "4")]
        concurrency: NonZeroUsize,

        /// Directory with the states of previous runs
        ///
        /// If set, a role whose name changed since the previous run is replaced.
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },

    /// Print the state of an existing role
    Read {
        #[clap(flatten)]
        provider: ProviderConfig,

        role_name: RoleName,
    },

    /// Import an existing role and print its state
    Import {
        #[clap(flatten)]
        provider: ProviderConfig,

        role_name: RoleName,
    },

    /// Delete roles
    Destroy {
        #[clap(flatten)]
        provider: ProviderConfig,

        #[arg(required = true)]
        role_names: Vec<RoleName>,
    },
}

#[tokio::main]
#[snafu::report]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    init_tracing(opts.log_format)?;
    log_build_info();

    match opts.cmd {
        Command::Schema => {
            let schema = schemars::schema_for!(RoleSpec);
            print_json(&schema)?;
        }
        Command::Apply {
            provider,
            files,
            concurrency,
            state_dir,
        } => {
            let provider = Provider::configure(&provider)
                .await
                .context(ConfigureProviderSnafu)?;
            apply_all(&provider, &files, concurrency, state_dir.as_deref()).await?;
        }
        Command::Read {
            provider,
            role_name,
        } => {
            let provider = Provider::configure(&provider)
                .await
                .context(ConfigureProviderSnafu)?;
            let state = role::read(&provider, &role_name)
                .await
                .context(ReadRoleSnafu {
                    role_name: role_name.clone(),
                })?
                .context(RoleNotFoundSnafu { role_name })?;
            print_json(&state)?;
        }
        Command::Import {
            provider,
            role_name,
        } => {
            let provider = Provider::configure(&provider)
                .await
                .context(ConfigureProviderSnafu)?;
            let state = role::import(&provider, &role_name)
                .await
                .context(ImportRoleSnafu { role_name })?;
            print_json(&state)?;
        }
        Command::Destroy {
            provider,
            role_names,
        } => {
            let provider = Provider::configure(&provider)
                .await
                .context(ConfigureProviderSnafu)?;
            destroy_all(&provider, &role_names).await?;
        }
    }

    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    let registry = tracing_subscriber::registry().with(filter);

    match log_format {
        LogFormat::Plain => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
    .context(InitTracingSnafu)
}

fn log_build_info() {
    tracing::info!(
        built_info.pkg_version = built_info::PKG_VERSION,
        built_info.git_version = built_info::GIT_VERSION,
        built_info.target = built_info::TARGET,
        built_info.built_time_utc = built_info::BUILT_TIME_UTC,
        built_info.rustc_version = built_info::RUSTC_VERSION,
        "Starting {description}",
        description = built_info::PKG_DESCRIPTION
    );
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context(SerializeOutputSnafu)?;
    println!("{json}");
    Ok(())
}

/// Applies all declarations and prints one result per declaration.
///
/// A failing declaration does not stop the others.
async fn apply_all(
    provider: &Provider,
    files: &[PathBuf],
    concurrency: NonZeroUsize,
    state_dir: Option<&Path>,
) -> Result<()> {
    let state_files = resolve_state_files(files, state_dir).await?;

    let results: Vec<(&PathBuf, Result<(ApplyOutcome, RoleState)>)> =
        futures::stream::iter(files.iter().zip(&state_files))
            .map(|(path, state_file)| async move {
                let result = apply_declaration(provider, path, state_file.as_deref()).await;
                (path, result)
            })
            .buffer_unordered(concurrency.get())
            .collect()
            .await;

    let mut failed: usize = 0;
    for (path, result) in results {
        match result {
            Ok((outcome, state)) => {
                tracing::info!(file = %path.display(), %outcome, "Declaration applied");
                print_json(&serde_json::json!({
                    "file": path,
                    "outcome": outcome,
                    "state": state,
                }))?;
            }
            Err(error) => {
                failed += 1;
                tracing::error!(
                    file = %path.display(),
                    error = %snafu::Report::from_error(error),
                    "Failed to apply the declaration"
                );
            }
        }
    }

    ensure!(
        failed == 0,
        ApplyFailedSnafu {
            failed,
            total: files.len()
        }
    );
    Ok(())
}

async fn apply_declaration(
    provider: &Provider,
    path: &Path,
    state_file: Option<&Path>,
) -> Result<(ApplyOutcome, RoleState)> {
    let content = tokio::fs::read(path)
        .await
        .context(ReadDeclarationSnafu { path })?;
    let spec: RoleSpec =
        serde_json::from_slice(&content).context(ParseDeclarationSnafu { path })?;

    let prior_state = match state_file {
        Some(state_file) => read_state(state_file).await?,
        None => None,
    };

    let (outcome, state) = role::apply(
        provider,
        &spec,
        prior_state.as_ref().map(|prior_state| &prior_state.id),
    )
    .await
    .context(ApplyRoleSnafu { path })?;

    if let Some(state_file) = state_file {
        write_state(state_file, &state).await?;
    }

    Ok((outcome, state))
}

/// Resolves the state file of every declaration, if a state directory is given.
///
/// Declarations are identified by their canonical path. A declaration which is listed more than
/// once is rejected before anything is applied.
async fn resolve_state_files(
    files: &[PathBuf],
    state_dir: Option<&Path>,
) -> Result<Vec<Option<PathBuf>>> {
    let mut declarations: HashMap<PathBuf, &PathBuf> = HashMap::new();
    let mut state_files = Vec::with_capacity(files.len());

    for path in files {
        let canonical_path = tokio::fs::canonicalize(path)
            .await
            .context(ReadDeclarationSnafu { path })?;
        state_files.push(state_dir.map(|state_dir| state_file(state_dir, &canonical_path)));

        if let Some(first) = declarations.insert(canonical_path, path) {
            return DuplicateDeclarationSnafu {
                first: first.clone(),
                second: path.clone(),
            }
            .fail();
        }
    }

    Ok(state_files)
}

/// Path of the state of the declaration with the given canonical path
///
/// The whole path is encoded into the file name, so declarations with the same file name in
/// different directories do not share a state.
fn state_file(state_dir: &Path, canonical_declaration: &Path) -> PathBuf {
    let key: String = url::form_urlencoded::byte_serialize(
        canonical_declaration.as_os_str().as_encoded_bytes(),
    )
    .collect();
    state_dir.join(format!("{key}.state.json"))
}

async fn read_state(path: &Path) -> Result<Option<RoleState>> {
    match tokio::fs::read(path).await {
        Ok(content) => serde_json::from_slice(&content)
            .map(Some)
            .context(ParseStateSnafu { path }),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error).context(ReadStateSnafu { path }),
    }
}

async fn write_state(path: &Path, state: &RoleState) -> Result<()> {
    let content = serde_json::to_vec_pretty(state).context(SerializeOutputSnafu)?;
    tokio::fs::write(path, content)
        .await
        .context(WriteStateSnafu { path })
}

/// Deletes the given roles and verifies that they are gone.
async fn destroy_all(provider: &Provider, role_names: &[RoleName]) -> Result<()> {
    for role_name in role_names {
        role::delete(provider, role_name)
            .await
            .context(DestroyRoleSnafu {
                role_name: role_name.clone(),
            })?;
        let still_exists = role::exists(provider, role_name)
            .await
            .context(ReadRoleSnafu {
                role_name: role_name.clone(),
            })?;
        ensure!(
            !still_exists,
            RoleStillExistsSnafu {
                role_name: role_name.clone()
            }
        );
    }
    Ok(())
}
