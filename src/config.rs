use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ContractScopeError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Source code parsing configuration
    pub parsing: ParsingConfig,

    /// Diagram rendering settings
    pub diagram: DiagramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Root that every followed import must stay inside.
    /// Falls back to the current directory when the parsed file lies below it,
    /// otherwise to the directory of the parsed file.
    pub workspace_root: Option<PathBuf>,

    /// Package directories searched for non-relative imports (`@openzeppelin/...`)
    pub dependency_dirs: Vec<String>,

    /// Directories to ignore when scanning a whole directory
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// Language used when a file extension is not recognised
    pub default_language: String,

    /// Maximum file size to parse (in bytes)
    pub max_file_size: usize,

    /// Maximum nesting of followed imports
    pub max_import_depth: usize,

    /// Extension -> language id, consulted before the built-in registry
    pub extension_overrides: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramConfig {
    /// Graph direction directive (TB, TD, BT, LR, RL)
    pub direction: String,

    /// Cluster colours as `fill,stroke,color` triples, cycled by cluster index
    pub palette: Vec<String>,

    /// Render parameter lists inside node labels
    pub show_parameters: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig {
                workspace_root: None,
                dependency_dirs: vec!["node_modules".to_string(), "lib".to_string()],
                ignore_patterns: vec![
                    "target/".to_string(),
                    "node_modules/".to_string(),
                    ".git/".to_string(),
                    "build/".to_string(),
                ],
            },
            parsing: ParsingConfig {
                default_language: "func".to_string(),
                max_file_size: 1024 * 1024, // 1MB
                max_import_depth: 32,
                extension_overrides: HashMap::new(),
            },
            diagram: DiagramConfig {
                direction: "TB".to_string(),
                palette: default_palette(),
                show_parameters: true,
            },
        }
    }
}

pub fn default_palette() -> Vec<String> {
    [
        "#E3F2FD,#1E88E5,#0D47A1",
        "#E8F5E9,#43A047,#1B5E20",
        "#FFF3E0,#FB8C00,#E65100",
        "#F3E5F5,#8E24AA,#4A148C",
        "#FFEBEE,#E53935,#B71C1C",
        "#E0F7FA,#00ACC1,#006064",
        "#FFFDE7,#FDD835,#F57F17",
        "#ECEFF1,#546E7A,#263238",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ContractScopeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ContractScopeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "ContractScope.toml",
                    "contractscope.toml",
                    ".contractscope.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        const DIRECTIONS: [&str; 5] = ["TB", "TD", "BT", "LR", "RL"];
        if !DIRECTIONS.contains(&self.diagram.direction.as_str()) {
            return Err(ContractScopeError::Config(format!(
                "unsupported diagram direction '{}'",
                self.diagram.direction
            )));
        }
        if self.diagram.palette.is_empty() {
            return Err(ContractScopeError::Config("diagram palette must not be empty".to_string()));
        }
        Ok(())
    }
}
