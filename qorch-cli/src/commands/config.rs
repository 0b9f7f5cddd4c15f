use std::path::PathBuf;

use anyhow::Result;
use qorch_config::Settings;
use serde_json::Value;

use crate::cli::{ConfigCommands, OutputFormat};

pub async fn run(config: Option<PathBuf>, output: OutputFormat, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show { section } => show(config.as_deref(), output, section.as_deref()),
    }
}

fn show(config: Option<&std::path::Path>, output: OutputFormat, section: Option<&str>) -> Result<()> {
    let settings = Settings::load(config)?;
    let value = serde_json::to_value(&settings)?;

    let selected = match section {
        Some(name) => value
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such config section '{name}'"))?,
        None => value,
    };

    print_value(&selected, output)
}

fn print_value(value: &Value, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => {
            let toml_value: toml::Value = serde_json::from_value(value.clone())?;
            println!("{}", toml::to_string_pretty(&toml_value)?);
        }
    }
    Ok(())
}
