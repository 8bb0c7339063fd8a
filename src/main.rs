use clap::Parser;
use savetitan_lib::cli::commands;
use savetitan_lib::cli::{Cli, Commands};
use savetitan_lib::settings::{FileSettingsStore, GlobalSettingsStore};
use savetitan_lib::AppError;
use std::process;

fn main() {
    let cli = Cli::parse();

    let default_filter = match FileSettingsStore::open_default().load() {
        Ok(settings) if settings.debug_enabled() => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    if let Some(name) = cli.run_profile {
        let id = {
            let ctx = savetitan_lib::Context::load_default()?;
            ctx.profiles.resolve_name(&name)?
        };
        return commands::run::run_profile(&id);
    }
    if let Some(id) = cli.run_id {
        return commands::run::run_profile(&id);
    }

    match cli.command {
        None | Some(Commands::List) => commands::profile::list_profiles(),
        Some(Commands::Run { profile }) => commands::run::run_profile(&profile),
        Some(Commands::Upload { profile }) => commands::run::upload(&profile),
        Some(Commands::Profile(cmd)) => commands::profile::execute(cmd),
        Some(Commands::Omit(cmd)) => commands::profile::execute_omit(cmd),
        Some(Commands::Import(cmd)) => commands::profile::execute_import(cmd),
        Some(Commands::Saves(cmd)) => commands::saves::execute(cmd),
        Some(Commands::Config(cmd)) => commands::config::execute(cmd),
        Some(Commands::Overrides(cmd)) => commands::overrides::execute(cmd),
        Some(Commands::Completions { shell }) => {
            savetitan_lib::cli::generate_completions(shell);
            Ok(())
        }
    }
}
