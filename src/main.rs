//! llmroute command line
//!
//! `llmroute health` prints provider health as JSON.
//! `llmroute generate <prompt>` routes one prompt and prints the response
//! followed by the usage report.

use anyhow::bail;
use clap::{Parser, Subcommand};
use llmroute::client::OpenAiCompatibleAdapter;
use llmroute::config::ConfigLoader;
use llmroute::{GenerateRequest, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Multi-provider LLM request router
#[derive(Parser, Debug)]
#[command(name = "llmroute")]
#[command(version)]
struct Cli {
    /// Config file layered over the built-in provider defaults
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print provider health as JSON
    Health,
    /// Route one prompt and print the response and usage report
    Generate {
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::from_path(path)?,
        None => ConfigLoader::new()?,
    };
    let config = loader.into_config();

    let adapter = Arc::new(OpenAiCompatibleAdapter::new()?);
    let mut builder = Router::builder(config.clone());
    for (id, descriptor) in &config.providers {
        if descriptor.base_url.is_some() {
            builder = builder.shared_adapter(*id, adapter.clone());
        }
    }
    let router = builder.build()?;

    match cli.command {
        Commands::Health => {
            println!("{}", serde_json::to_string_pretty(&router.health_check())?);
        }
        Commands::Generate { prompt } => {
            let prompt = prompt.join(" ");
            if prompt.trim().is_empty() {
                bail!("prompt must not be empty");
            }

            let response = router.generate(GenerateRequest::new(prompt)).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            println!("{}", serde_json::to_string_pretty(&router.usage_report())?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_generate_with_config() {
        let cli = Cli::try_parse_from(["llmroute", "--config", "cfg.json", "generate", "hello", "there"])
            .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("cfg.json")));
        match cli.command {
            Commands::Generate { prompt } => assert_eq!(prompt, vec!["hello", "there"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_generate_requires_prompt() {
        assert!(Cli::try_parse_from(["llmroute", "generate"]).is_err());
        assert!(Cli::try_parse_from(["llmroute"]).is_err());
        assert!(matches!(
            Cli::try_parse_from(["llmroute", "health"]).unwrap().command,
            Commands::Health
        ));
    }
}
