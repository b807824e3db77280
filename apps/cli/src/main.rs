//! `orbit` binary: boot the engine with the demo module, or check a
//! configuration.

mod cli;
mod demo;

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use orbit_config::{ConfigLoader, LoadedConfig};
use orbit_engine::Engine;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loaded = load_config(&cli.config, cli.no_env).context("loading configuration")?;

    match cli.command {
        Command::CheckConfig { json } => {
            println!("{}", render_config(&loaded, json)?);
            Ok(())
        }
        Command::Start => start(loaded).await,
    }
}

fn load_config(files: &[PathBuf], no_env: bool) -> anyhow::Result<LoadedConfig> {
    let mut loader = ConfigLoader::new();
    for file in files {
        loader = loader.with_file(file);
    }
    if no_env {
        loader = loader.without_env();
    }
    Ok(loader.load()?)
}

async fn start(loaded: LoadedConfig) -> anyhow::Result<()> {
    let _log = orbit_log::init_with(loaded.config().logging.clone())?;

    let engine = Engine::new(loaded, vec![demo::module()?]);
    engine.start().await?;
    tracing::info!("orbit running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl-C")?;
    tracing::info!("shutdown requested");
    engine.stop().await?;
    Ok(())
}

fn render_config(loaded: &LoadedConfig, json: bool) -> anyhow::Result<String> {
    let config = loaded.config();
    if json {
        return Ok(serde_json::to_string_pretty(config)?);
    }

    let files = if loaded.files().is_empty() {
        "(defaults and environment only)".to_string()
    } else {
        loaded
            .files()
            .iter()
            .map(|f| f.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let modules = if config.modules.enabled.is_empty() {
        "all".to_string()
    } else {
        config.modules.enabled.join(", ")
    };

    let mut out = String::from("configuration ok\n");
    writeln!(out, "  files:            {files}")?;
    writeln!(out, "  action timeout:   {}ms", config.general.action_timeout_ms)?;
    writeln!(out, "  pending actions:  {}", config.general.max_pending_actions)?;
    writeln!(out, "  task workers:     {}", config.tasks.workers)?;
    writeln!(out, "  task scheduler:   {}", config.tasks.scheduler)?;
    write!(out, "  modules:          {modules}")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orbit.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn check_config_summarizes_the_merge() {
        let (_dir, path) = write_config("[tasks]\nworkers = 4\n\n[modules]\nenabled = [\"demo\"]\n");
        let loaded = load_config(std::slice::from_ref(&path), true).unwrap();

        let text = render_config(&loaded, false).unwrap();

        assert!(text.starts_with("configuration ok\n"));
        assert!(text.contains(&path.display().to_string()));
        assert!(text.contains("task workers:     4"));
        assert!(text.contains("modules:          demo"));
    }

    #[test]
    fn check_config_prints_json() {
        let loaded = load_config(&[], true).unwrap();
        let text = render_config(&loaded, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["general"]["action_timeout_ms"], 300_000);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let (_dir, path) = write_config("[general]\naction_timeout_ms = 0\n");
        let err = load_config(&[path], true).unwrap_err();
        assert!(err.to_string().contains("action_timeout_ms"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(&[PathBuf::from("/nonexistent/orbit.toml")], true).is_err());
    }
}
