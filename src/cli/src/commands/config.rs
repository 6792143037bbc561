//! CLI settings stored in `~/.skyreel/config.toml`.

use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a setting
    Set {
        /// Setting name (api-url, output)
        key: String,
        value: String,
    },

    /// Print a setting
    Get { key: String },

    /// Show every setting
    Show,

    /// Delete the settings file
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

/// Persisted CLI settings.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CliConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl CliConfig {
    fn get(&self, key: &str) -> Result<Option<&str>> {
        match key {
            "api-url" => Ok(self.api_url.as_deref()),
            "output" => Ok(self.output.as_deref()),
            other => bail!("Unknown setting '{}'", other),
        }
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        match key {
            "api-url" => {
                reqwest::Url::parse(&value).with_context(|| format!("Invalid URL: {}", value))?;
                self.api_url = Some(value);
            }
            "output" => {
                OutputFormat::from_str(&value, true).map_err(|e| anyhow::anyhow!(e))?;
                self.output = Some(value);
            }
            other => bail!("Unknown setting '{}'", other),
        }
        Ok(())
    }
}

fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".skyreel").join("config.toml"))
}

pub fn load_config() -> Result<CliConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn save_config(cfg: &CliConfig) -> Result<()> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Default output format from the settings file, if one is saved.
pub fn saved_output_format() -> Option<OutputFormat> {
    let cfg = load_config().ok()?;
    OutputFormat::from_str(cfg.output.as_deref()?, true).ok()
}

pub async fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value } => {
            let mut cfg = load_config()?;
            cfg.set(&key, value.clone())?;
            save_config(&cfg)?;

            match format {
                OutputFormat::Table => output::print_success(&format!("{} = {}", key, value)),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
            }
        }

        ConfigCommands::Get { key } => {
            let cfg = load_config()?;
            let Some(value) = cfg.get(&key)? else {
                bail!("'{}' is not set", key);
            };
            match format {
                OutputFormat::Table => println!("{}", value),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
            }
        }

        ConfigCommands::Show => {
            let cfg = load_config()?;
            match format {
                OutputFormat::Table => {
                    if cfg.api_url.is_none() && cfg.output.is_none() {
                        output::print_info("No settings saved.");
                        return Ok(());
                    }
                    output::print_header("Configuration");
                    if let Some(url) = &cfg.api_url {
                        output::print_detail("api-url", url);
                    }
                    if let Some(out) = &cfg.output {
                        output::print_detail("output", out);
                    }
                }
                _ => output::print_item(&cfg, format)?,
            }
        }

        ConfigCommands::Reset { force } => {
            if !force {
                output::print_info("This deletes all saved CLI settings. Use --force to confirm.");
                return Ok(());
            }

            let path = config_path()?;
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
            output::print_success("Settings reset");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_validates_values() {
        let mut cfg = CliConfig::default();
        cfg.set("api-url", "http://movie-host:8080".into()).unwrap();
        cfg.set("output", "yaml".into()).unwrap();
        assert_eq!(cfg.get("api-url").unwrap(), Some("http://movie-host:8080"));

        assert!(cfg.set("api-url", "not a url".into()).is_err());
        assert!(cfg.set("output", "xml".into()).is_err());
        assert!(cfg.set("colour", "on".into()).is_err());
    }

    #[test]
    fn test_toml_keys_are_kebab_case() {
        let cfg = CliConfig {
            api_url: Some("http://localhost:8080".into()),
            output: None,
        };
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert_eq!(text.trim(), r#"api-url = "http://localhost:8080""#);
    }
}
