mod collab;
mod completion;
mod config;
mod flows;
mod render;

#[cfg(test)]
mod tests;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::flows::{run_mutate_command, run_rollback_command, MutateRequest, RollbackRequest};

#[derive(Parser, Debug)]
#[command(name = "tokensmith")]
#[command(about = "Design-system registry mutation pipeline", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Mutate {
        intent: String,
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long)]
        registry_path: Option<PathBuf>,
        #[arg(long)]
        auto_approve: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        non_interactive: bool,
        #[arg(long)]
        no_transpile: bool,
        #[arg(long)]
        no_deploy: bool,
        #[arg(long, value_delimiter = ',')]
        transpile_targets: Vec<String>,
        #[arg(long, conflicts_with = "no_git")]
        enable_git: bool,
        #[arg(long)]
        no_git: bool,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        verbose: bool,
    },
    Rollback {
        registry_path: Option<PathBuf>,
        #[arg(default_value = "last")]
        source: String,
        output_path: Option<PathBuf>,
        #[arg(long)]
        no_backup: bool,
        #[arg(long)]
        no_validate: bool,
        #[arg(long)]
        list: bool,
        #[arg(long)]
        cleanup: bool,
        #[arg(long)]
        keep: Option<usize>,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        verbose: bool,
    },
    Completions {
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Mutate {
            intent,
            plan,
            registry_path,
            auto_approve,
            dry_run,
            non_interactive,
            no_transpile,
            no_deploy,
            transpile_targets,
            enable_git,
            no_git,
            json,
            verbose,
        } => run_mutate_command(MutateRequest {
            intent,
            plan_path: plan,
            registry_path,
            auto_approve,
            dry_run,
            non_interactive,
            no_transpile,
            no_deploy,
            transpile_targets,
            enable_git,
            no_git,
            json,
            verbose,
        }),
        Commands::Rollback {
            registry_path,
            source,
            output_path,
            no_backup,
            no_validate,
            list,
            cleanup,
            keep,
            json,
            verbose,
        } => run_rollback_command(RollbackRequest {
            registry_path,
            source,
            output_path,
            no_backup,
            no_validate,
            list,
            cleanup,
            keep,
            json,
            verbose,
        }),
        Commands::Completions { shell } => {
            let mut stdout = std::io::stdout();
            completion::write_completions_script(shell, &mut stdout)
        }
    }
}
