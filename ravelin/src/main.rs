//! Ravelin - a web application firewall engine
//!
//! This is the main entry point for the Ravelin CLI.

use clap::{Parser, Subcommand};
use ravelin_config::ConfParser;
use ravelin_core::{DirectiveRegistry, RegistryDispatcher, SettingsBuilder};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Ravelin - web application firewall driven by a directive policy language
#[derive(Parser)]
#[command(name = "ravelin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a policy file for parse errors
    Check {
        /// Path to the policy file
        #[arg(default_value = "ravelin.conf")]
        policy: String,
    },

    /// Parse a policy file and print its directive tree as JSON
    Tree {
        /// Path to the policy file
        #[arg(default_value = "ravelin.conf")]
        policy: String,
    },

    /// Apply a policy file and print the resulting engine settings
    Apply {
        /// Path to the policy file
        #[arg(default_value = "ravelin.conf")]
        policy: String,
    },

    /// Show version information
    Version,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    match cli.command {
        Commands::Check { policy } => {
            let parser = load(&policy);
            println!(
                "✅ Policy '{}' is valid ({} statements)",
                policy,
                parser.tree().statement_count()
            );
        }

        Commands::Tree { policy } => {
            let parser = load(&policy);
            println!("{}", serde_json::to_string_pretty(&parser.tree().to_json())?);
        }

        Commands::Apply { policy } => {
            let mut parser = load(&policy);

            let registry = DirectiveRegistry::builtin();
            let mut builder = SettingsBuilder::new();
            let mut dispatcher = RegistryDispatcher::new(&registry, &mut builder);
            if let Err(e) = parser.apply(&mut dispatcher) {
                eprintln!("❌ Policy Error: {}", e);
                std::process::exit(1);
            }

            let settings = builder.finish();
            println!("{}", settings.to_json()?);
        }

        Commands::Version => {
            println!("Ravelin v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// Parse a policy file, reporting every accumulated error before exiting on
/// failure.
fn load(policy: &str) -> ConfParser {
    match ConfParser::parse(policy) {
        Ok(parser) => {
            if parser.has_errors() {
                for err in parser.errors() {
                    eprintln!("❌ {}", err);
                }
                eprintln!(
                    "❌ Policy '{}' failed with {} error(s)",
                    policy,
                    parser.error_count()
                );
                std::process::exit(1);
            }
            parser
        }
        Err(e) => {
            eprintln!("❌ Failed to load policy: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
