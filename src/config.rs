use crate::{Result, VisualizerError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_FILE: &str = "config.json";

/// files that must be found in the assembly folder
pub const REQUIRED_ASSEMBLIES: [&str; 2] = ["QuantConnect.ToolBox.exe", "QuantConnect.Common.dll"];

/// config.json in the working directory
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub assembly_folder: PathBuf,
    #[serde(default)]
    pub default_output_folder: Option<PathBuf>,
}

/// config written into the assembly folder for the LEAN runtime
#[derive(Debug, Deserialize, Serialize)]
struct PluginConfig {
    #[serde(rename = "plugin-directory")]
    plugin_directory: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let file = File::open(path).map_err(|e| {
            VisualizerError::Configuration(format!("could not open {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            VisualizerError::Configuration(format!("invalid {}: {}", path.display(), e))
        })?;
        debug!(config_path = %path.display(), ?config, "config loaded");
        Ok(config)
    }

    /// the folder for auto-named plots, needed only when no output path is given
    pub fn output_folder(&self) -> Result<&Path> {
        self.default_output_folder.as_deref().ok_or_else(|| {
            VisualizerError::Configuration(
                "no output path given and default_output_folder is not set in the config".to_string(),
            )
        })
    }
}

/// Checks that the configured assembly folder holds the LEAN assemblies
/// and returns its absolute path.
/// On the first run writes the plugin config.json into that folder,
/// an existing one is never overwritten.
pub fn resolve_assembly_folder(config: &Config) -> Result<PathBuf> {
    let folder = &config.assembly_folder;
    let entries = std::fs::read_dir(folder).map_err(|e| {
        VisualizerError::Configuration(format!(
            "could not list assembly folder {}: {}",
            folder.display(),
            e
        ))
    })?;
    let assemblies: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("QuantConnect"))
        .collect();
    for required in REQUIRED_ASSEMBLIES.iter() {
        if !assemblies.iter().any(|a| a == required) {
            return Err(VisualizerError::Configuration(format!(
                "{} not found in {}, please set up correctly the assembly folder",
                required,
                folder.display()
            )));
        }
    }
    let absolute = folder.canonicalize()?;

    let plugin_config = absolute.join(CONFIG_FILE);
    if !plugin_config.exists() {
        let content = PluginConfig {
            plugin_directory: absolute.to_string_lossy().into_owned(),
        };
        let mut buf = BufWriter::new(File::create(&plugin_config)?);
        serde_json::to_writer(&mut buf, &content).map_err(|e| {
            VisualizerError::Configuration(format!(
                "could not write {}: {}",
                plugin_config.display(),
                e
            ))
        })?;
        buf.flush()?;
        info!(path = %plugin_config.display(), "initiated plugin config");
    }
    Ok(absolute)
}
