use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use gitops_pr::App;
use gitops_pr::Config;
use gitops_pr::Provider;
use gitops_pr::RepositoryReference;
use gitops_pr::commands::add_app::AddAppArgs;
use gitops_pr::commands::create_regex::CreateRegexArgs;
use gitops_pr::commands::labels::LabelsArgs;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::level_filters::LevelFilter;
use tracing::warn;

#[derive(Parser)]
#[command(name = "gitops-pr")]
#[command(about = "Propose changes to GitOps repositories as pull requests", long_about = None)]
pub struct Cli {
    /// Never prompt and never colorize output
    #[arg(long, global = true)]
    pub batch: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pull request steps
    Pr {
        #[command(subcommand)]
        command: PrCommands,
    },
    /// Environment app management
    App {
        #[command(subcommand)]
        command: AppCommands,
    },
}

#[derive(Subcommand)]
pub enum PrCommands {
    /// Print a pull request's labels as shell variable assignments
    Labels(LabelsArgs),
    /// Create a pull request updating files with a regex
    CreateRegex(CreateRegexArgs),
}

#[derive(Subcommand)]
pub enum AppCommands {
    /// Add an app to an environment, or bump its version
    Add(AddAppArgs),
}

fn setup_logging() -> Result<()> {
    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%H:%M:%S%.3f".into());
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    tracing_subscriber::fmt()
        .with_timer(timer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;
    let cli = Cli::parse();

    let mut config = Config::from_env();
    config.batch_mode |= cli.batch;
    if config.batch_mode {
        colored::control::set_override(false);
    }

    let repo_url = match &cli.command {
        Commands::Pr {
            command: PrCommands::Labels(args),
        } => args.url.as_deref(),
        Commands::Pr {
            command: PrCommands::CreateRegex(args),
        } => args.repo.as_deref(),
        Commands::App {
            command: AppCommands::Add(args),
        } => args.repo.as_deref(),
    };
    let repo = match repo_url {
        Some(url) => RepositoryReference::parse(url)?,
        None => RepositoryReference::from_dir(&std::env::current_dir()?).await?,
    };
    let provider = Provider::resolve(&repo, &config)?;
    debug!("Using {} provider for {}", provider.kind(), repo);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping at the next step");
                cancel.cancel();
            }
        }
    });

    let app = App::new(config, provider, repo).with_cancellation(cancel);
    let mut stdout = std::io::stdout();
    match &cli.command {
        Commands::Pr {
            command: PrCommands::Labels(args),
        } => app.cmd_labels(args, &mut stdout).await?,
        Commands::Pr {
            command: PrCommands::CreateRegex(args),
        } => app.cmd_create_regex(args, &mut stdout).await?,
        Commands::App {
            command: AppCommands::Add(args),
        } => app.cmd_add_app(args, &mut stdout).await?,
    }

    Ok(())
}
