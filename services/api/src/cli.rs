use crate::reports::{run_lease, run_profile, run_rank, LeaseArgs, ProfileArgs, RankArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use resale_insight::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Resale Insight",
    about = "Serve or query hybrid resale price and town sentiment analytics",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Rank towns by price and rating over a month window
    Rank(RankArgs),
    /// Print the price and sentiment profile of one town
    Profile(ProfileArgs),
    /// Compute the remaining lease for a lease start year and month
    Lease(LeaseArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Rank(args) => run_rank(args).await,
        Command::Profile(args) => run_profile(args).await,
        Command::Lease(args) => run_lease(args),
    }
}
