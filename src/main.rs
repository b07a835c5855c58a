use clap::Parser;
use credvault::cli::{Cli, Commands, SessionAction, UserAction};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { ref bind } => {
            credvault::cli::commands::serve::execute(&cli, bind.as_deref())
        }
        Commands::Keygen { ref path } => {
            credvault::cli::commands::keygen::execute(&cli, path.as_deref())
        }
        Commands::Generate { strength } => credvault::cli::commands::generate::execute(strength),
        Commands::Audit { last, ref since } => {
            credvault::cli::commands::audit_cmd::execute(&cli, last, since.as_deref())
        }
        Commands::User { ref action } => match action {
            UserAction::Add {
                ref id,
                ref salt,
                ref verifier,
            } => credvault::cli::commands::users::execute_user_add(
                &cli,
                id,
                salt.as_deref(),
                verifier.as_deref(),
            ),
        },
        Commands::Session { ref action } => match action {
            SessionAction::Set { ref id, ref key } => {
                credvault::cli::commands::users::execute_session_set(&cli, id, key)
            }
            SessionAction::Clear { ref id } => {
                credvault::cli::commands::users::execute_session_clear(&cli, id)
            }
        },
    };

    if let Err(e) = result {
        credvault::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}
