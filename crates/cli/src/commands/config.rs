//! Config Commands

use std::path::Path;

use anyhow::{bail, Result};
use clap::Subcommand;

use playsmith_common::PlaysmithConfig;

use crate::output::{print_success, render_structured, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration (file plus environment)
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn render(config: &PlaysmithConfig, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json | OutputFormat::Yaml => render_structured(config, format),
        OutputFormat::Table | OutputFormat::Plain => Ok(toml::to_string_pretty(config)?),
    }
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    PlaysmithConfig::default().save(path)?;
    Ok(())
}

pub fn execute(cmd: ConfigCommands, path: &Path, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let config = PlaysmithConfig::resolve(path)?;
            println!("{}", render(&config, format)?);
        }
        ConfigCommands::Init { force } => {
            init(path, force)?;
            print_success(&format!("Wrote {}", path.display()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playsmith.toml");

        init(&path, false).unwrap();
        assert!(init(&path, false).is_err());
        init(&path, true).unwrap();

        let loaded = PlaysmithConfig::load(&path).unwrap();
        assert_eq!(loaded, PlaysmithConfig::default());
    }

    #[test]
    fn test_render_formats() {
        let config = PlaysmithConfig::default();
        assert!(render(&config, OutputFormat::Table).unwrap().contains("[llm]"));
        assert!(render(&config, OutputFormat::Json).unwrap().contains("\"llm\""));
    }
}
