use anyhow::Result;
use clap::Parser;
use ipavault::commands::{self, ContainerSource, ExportRequest, Services};
use std::path::PathBuf;
use uuid::Uuid;

/// ipavault - keep, probe, download and export iOS app archives
///
/// Saved links live in the app-group store under the root directory and are
/// probed for reachability and size. Downloads land in
/// Documents/DownloadedIPAs, exports in Documents/ExportedIPAs.
///
/// Examples:
///   ipavault links add https://example.com/AppX.ipa
///   ipavault download <ID>
///   ipavault export ./AppX.app --container ./container
#[derive(Parser, Debug)]
#[command(author, version = env!("IPAVAULT_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root directory (overrides defaults; also via IPAVAULT_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "IPAVAULT_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub root: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage saved links
    #[command(subcommand)]
    Links(LinksCommand),

    /// Download a saved link into Documents/DownloadedIPAs
    Download(DownloadArgs),

    /// Manage downloaded archives
    #[command(subcommand)]
    Downloads(DownloadsCommand),

    /// Package an app bundle and its data into an archive
    Export(ExportArgs),
}

#[derive(clap::Subcommand, Debug)]
enum LinksCommand {
    /// List saved links
    List,
    /// Save a link and probe it
    Add {
        #[arg(value_name = "URL")]
        url: String,
        /// Display name (defaults to the file name in the URL)
        #[arg(long)]
        name: Option<String>,
    },
    /// Change a link's display name
    Rename { id: Uuid, name: String },
    /// Change a link's URL
    SetUrl { id: Uuid, url: String },
    /// Remove links
    Remove {
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },
    /// Probe one link, or all of them
    Refresh { id: Option<Uuid> },
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    #[arg(value_name = "ID")]
    pub id: Uuid,
}

#[derive(clap::Subcommand, Debug)]
enum DownloadsCommand {
    /// List downloaded archives, newest first
    List,
    /// Remove downloaded archives by file name
    Remove {
        #[arg(required = true, value_name = "FILE")]
        files: Vec<String>,
    },
    /// Remove every downloaded archive
    Clear {
        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Path to the .app bundle directory
    #[arg(value_name = "BUNDLE")]
    pub bundle: PathBuf,

    #[arg(long)]
    pub bundle_id: Option<String>,

    /// Display name, used for the archive file name
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long = "app-version")]
    pub app_version: Option<String>,

    /// Container directory to take data from
    #[arg(long, value_name = "PATH", conflicts_with = "container_id")]
    pub container: Option<PathBuf>,

    /// Container identifier under the root's data directories
    #[arg(long, value_name = "ID")]
    pub container_id: Option<String>,

    /// Resolve --container-id under the shared app-group root
    #[arg(long, requires = "container_id")]
    pub shared: bool,

    #[arg(long)]
    pub no_documents: bool,

    #[arg(long)]
    pub no_library: bool,

    /// Include Library/Caches
    #[arg(long)]
    pub caches: bool,

    /// Output directory (defaults to Documents/ExportedIPAs)
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

impl From<ExportArgs> for ExportRequest {
    fn from(args: ExportArgs) -> Self {
        let container = match (args.container, args.container_id) {
            (Some(path), _) => ContainerSource::Path(path),
            (None, Some(data_id)) => ContainerSource::Id {
                data_id,
                shared: args.shared,
            },
            (None, None) => ContainerSource::None,
        };
        ExportRequest {
            bundle: args.bundle,
            bundle_id: args.bundle_id,
            name: args.name,
            version: args.app_version,
            container,
            include_documents: !args.no_documents,
            include_library: !args.no_library,
            include_caches: args.caches,
            output: args.output,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let services = Services::build(ipavault::runtime::RealRuntime, cli.root)?;

    match cli.command {
        Commands::Links(command) => {
            let registry = &services.registry;
            match command {
                LinksCommand::List => commands::links::list(registry).await?,
                LinksCommand::Add { url, name } => {
                    commands::links::add(registry, &url, name.as_deref()).await?
                }
                LinksCommand::Rename { id, name } => {
                    commands::links::rename(registry, id, &name).await?
                }
                LinksCommand::SetUrl { id, url } => {
                    commands::links::set_url(registry, id, &url).await?
                }
                LinksCommand::Remove { ids } => commands::links::remove(registry, &ids).await?,
                LinksCommand::Refresh { id } => commands::links::refresh(registry, id).await?,
            }
        }
        Commands::Download(args) => {
            commands::download(&services.registry, &services.downloads, args.id).await?
        }
        Commands::Downloads(command) => match command {
            DownloadsCommand::List => commands::list_downloads(&services.downloads)?,
            DownloadsCommand::Remove { files } => {
                commands::remove_downloads(&services.downloads, &files)?
            }
            DownloadsCommand::Clear { yes } => {
                commands::clear_downloads(services.runtime.as_ref(), &services.downloads, yes)?
            }
        },
        Commands::Export(args) => commands::export(&services, args.into()).await?,
    }
    Ok(())
}
