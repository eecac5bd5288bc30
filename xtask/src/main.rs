use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tests with different feature combinations
    TestFeatures,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::TestFeatures => test_features(),
    }
}

fn test_features() -> Result<()> {
    // Logging backends are mutually exclusive, everything else combines freely
    let logging = [None, Some("log")];
    let optional_features: [&[&str]; 4] = [&[], &["std"], &["serde"], &["std", "serde"]];

    for backend in logging {
        for extra in optional_features {
            let features: Vec<&str> = backend.into_iter().chain(extra.iter().copied()).collect();
            println!("Testing with [{}]", features.join(", "));
            run_cargo("test", &features)?;
        }
    }

    // defmt needs a global logger at link time, so it is only type-checked
    println!("Checking with defmt");
    run_cargo("check", &["defmt", "serde"])?;

    println!("All tests passed!");
    Ok(())
}

fn run_cargo(subcommand: &str, features: &[&str]) -> Result<()> {
    let features_arg = features.join(",");
    println!("Running cargo {} with features: {}", subcommand, features_arg);

    let mut args = vec![subcommand, "--no-default-features", "--lib"];
    if !features.is_empty() {
        args.push("--features");
        args.push(&features_arg);
    }

    let status = Command::new("cargo")
        .args(&args)
        .status()
        .with_context(|| format!("Failed to execute cargo {}", subcommand))?;

    if !status.success() {
        anyhow::bail!("cargo {} failed with features: {}", subcommand, features_arg);
    }

    Ok(())
}
