use crate::demo::{run_demo, run_startup_activity, DemoArgs, StartupActivityArgs};
use crate::server;
use admissions::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Batch Admissions",
    about = "Run and demonstrate the batch admissions workflow from the command line",
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
    /// Walk one application through payment, team completion and submission
    Demo(DemoArgs),
    /// Activity reports over admitted startups
    Startups {
        #[command(subcommand)]
        command: StartupsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum StartupsCommand {
    /// List inactive and endangered startups from a JSON export
    Activity(StartupActivityArgs),
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
        Command::Demo(args) => run_demo(args),
        Command::Startups {
            command: StartupsCommand::Activity(args),
        } => run_startup_activity(args),
    }
}
