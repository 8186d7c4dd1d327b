//! ---
//! sc_section: "05-control-plane"
//! sc_subsection: "binary"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "Operator control CLI for the syscheck daemon."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use syscheck_api::RunRequest;
use syscheck_common::logging;
use syscheck_common::version::VersionInfo;
use tokio::runtime::Runtime;

mod client;
mod render;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "syscheck operator control utility",
    long_about = None
)]
struct Cli {
    #[arg(
        long,
        value_name = "URL",
        env = "SYSCHECK_ENDPOINT",
        default_value = "http://127.0.0.1:7170",
        help = "Base URL of the syscheck daemon API"
    )]
    endpoint: String,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Show daemon status")]
    Status,
    #[command(about = "List registered subsystems and their tests")]
    List,
    #[command(about = "Run tests: everything, one subsystem, or one test")]
    Run {
        #[arg(value_name = "SUBSYSTEM", help = "Subsystem name or numeric id")]
        subsystem: Option<String>,
        #[arg(
            long,
            value_name = "TEST",
            requires = "subsystem",
            help = "Test name or numeric id within the subsystem"
        )]
        test: Option<String>,
    },
    #[command(about = "Show recent run reports")]
    Reports {
        #[arg(long, default_value_t = 5, help = "Maximum number of reports to show")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    if cli.version {
        println!("{}", VersionInfo::current().extended());
        return Ok(());
    }

    let runtime = Runtime::new()?;
    let api = client::ApiClient::new(cli.endpoint);

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => {
            let status = runtime.block_on(api.status())?;
            render::status(&status);
        }
        Commands::List => {
            let subsystems = runtime.block_on(api.subsystems())?;
            render::subsystems(&subsystems);
        }
        Commands::Run { subsystem, test } => {
            let request = RunRequest { subsystem, test };
            let report = runtime.block_on(api.run(&request))?;
            let passed = render::run_report(&report);
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::Reports { limit } => {
            let reports = runtime.block_on(api.reports())?;
            render::report_summaries(&reports, limit);
        }
    }

    Ok(())
}
