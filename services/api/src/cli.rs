use crate::admin::{run_access_check, run_init_db, AccessCheckArgs, InitDbArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use hr_desk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "HR Desk",
    about = "Run the HR desk service and its operator commands",
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
    /// Create the database file and apply the schema, optionally with seed data
    InitDb(InitDbArgs),
    /// Inspect the configured access policy
    Access {
        #[command(subcommand)]
        command: AccessCommand,
    },
}

#[derive(Subcommand, Debug)]
enum AccessCommand {
    /// Print whether a role may enter a section
    Check(AccessCheckArgs),
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
        Command::InitDb(args) => run_init_db(args),
        Command::Access {
            command: AccessCommand::Check(args),
        } => run_access_check(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["hr-desk"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn access_check_takes_role_and_section() {
        let cli = Cli::try_parse_from([
            "hr-desk", "access", "check", "--role", "analyst", "--section", "reports",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Access {
                command: AccessCommand::Check(args),
            }) => {
                assert_eq!(args.role, "analyst");
                assert_eq!(args.section, "reports");
            }
            other => panic!("expected access check, got {other:?}"),
        }
    }

    #[test]
    fn init_db_accepts_a_seed_file() {
        let cli = Cli::try_parse_from(["hr-desk", "init-db", "--seed", "sql/seed.sql"])
            .expect("parses");
        match cli.command {
            Some(Command::InitDb(args)) => {
                assert_eq!(args.seed.as_deref(), Some(std::path::Path::new("sql/seed.sql")));
            }
            other => panic!("expected init-db, got {other:?}"),
        }
    }
}
