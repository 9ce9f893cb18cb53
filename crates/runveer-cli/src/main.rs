mod commands;
mod reporter;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{CliError, Context, EXIT_CONFIG_ERROR};
use reporter::{PlainReporter, StyledReporter};
use runveer_core::{
    install_signal_handler, AutoFix, MenuPresenter, Overrides, RunnerConfig, StatusReporter,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "runveer",
    version,
    about = "Run Python scripts in self-healing, fingerprinted virtual environments"
)]
struct Cli {
    /// Project directory holding the scripts.
    #[arg(long, default_value = ".", global = true)]
    project_dir: PathBuf,

    /// Environment directory name (overrides runveer.toml).
    #[arg(long, global = true)]
    env_name: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Plain text output without colours or spinners.
    #[arg(long, default_value_t = false, global = true)]
    plain: bool,

    /// Answer yes to every confirmation, including missing-module repairs.
    #[arg(short, long, default_value_t = false, global = true)]
    yes: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Prepare the environment and run a script (pick one from a menu when omitted).
    Run {
        /// Script to run, relative to the project directory.
        script: Option<PathBuf>,
        /// Arguments passed to the script (after --).
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// List runnable scripts with their detected traits.
    List,
    /// Resolve a script's third-party imports and write the manifest.
    Resolve {
        /// Script to analyse.
        script: PathBuf,
    },
    /// Print the project fingerprint.
    Fingerprint,
    /// Create or validate the environment for the current project state.
    Setup,
    /// Remove the environment.
    Clean {
        /// Also remove timestamped fallback environments.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUNVEER_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        return finish(commands::completions::run::<Cli>(shell));
    }

    install_signal_handler();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let ctx = Context {
        project_dir: cli.project_dir.clone(),
        config,
        json: cli.json,
    };

    let use_plain = cli.plain || !console::Term::stdout().is_term();
    let styled;
    let plain;
    // With --json, status output goes to stderr and stdout carries only JSON.
    let (reporter, menu): (&dyn StatusReporter, &dyn MenuPresenter) = if use_plain {
        plain = PlainReporter::stdio(cli.yes, cli.json);
        (&plain, &plain)
    } else {
        styled = StyledReporter::new(cli.yes, cli.json);
        (&styled, &styled)
    };

    let result = match cli.command {
        Commands::Run { script, args } => {
            commands::run::run(&ctx, reporter, menu, script.as_deref(), &args)
        }
        Commands::List => commands::list::run(&ctx, reporter),
        Commands::Resolve { script } => commands::resolve::run(&ctx, reporter, &script),
        Commands::Fingerprint => commands::fingerprint::run(&ctx, reporter),
        Commands::Setup => commands::setup::run(&ctx, reporter),
        Commands::Clean { all } => commands::clean::run(&ctx, reporter, all),
        Commands::Completions { .. } => unreachable!("handled before configuration"),
    };
    finish(result)
}

fn load_config(cli: &Cli) -> Result<RunnerConfig, String> {
    if !cli.project_dir.is_dir() {
        return Err(format!(
            "project directory not found: {}",
            cli.project_dir.display()
        ));
    }
    let overrides = Overrides {
        env_name: cli.env_name.clone(),
        auto_fix: cli.yes.then_some(AutoFix::Always),
    };
    RunnerConfig::load(&cli.project_dir)
        .and_then(|config| config.with_overrides(overrides))
        .map_err(|e| e.to_string())
}

fn finish(result: Result<u8, CliError>) -> ExitCode {
    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {}", e.message);
            ExitCode::from(e.code)
        }
    }
}
