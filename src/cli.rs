use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use tracing::info;

use contractscope::{Config, Engine};

#[derive(Parser)]
#[command(name = "contractscope")]
#[command(about = "Call-graph diagrams for smart-contract sources")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract the call graph of a file or directory
    Graph {
        /// Source file or directory
        path: PathBuf,

        /// Language id, overriding extension detection
        #[arg(short, long)]
        language: Option<String>,

        /// Follow include/import/mod directives
        #[arg(long)]
        imports: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Mermaid)]
        format: OutputFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Filter a rendered diagram by classification and name
    Filter {
        /// Diagram file produced by `graph`
        file: PathBuf,

        /// Classification tags to keep (comma separated); empty keeps all
        #[arg(short, long, value_delimiter = ',')]
        types: Vec<String>,

        /// Keep nodes whose label or id contains this text, plus their neighbours
        #[arg(short, long)]
        name: Option<String>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List registered languages and their extensions
    Languages,

    /// Write a default configuration file
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Mermaid,
    Json,
}

impl Cli {
    pub async fn execute(self, mut engine: Engine) -> Result<()> {
        match self.command {
            Commands::Graph { path, language, imports, format, output } => {
                let graph = if path.is_dir() {
                    engine.parse_directory(&path).await?
                } else if let Some(language) = language {
                    let source = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    if imports {
                        engine.parse_with_imports(&source, &path, &language).await?
                    } else {
                        engine.parse_source(&source, &language)?
                    }
                } else {
                    engine.parse_file(&path, imports).await?
                };

                let text = match format {
                    OutputFormat::Mermaid => engine.render(&graph).to_text(),
                    OutputFormat::Json => serde_json::to_string_pretty(&graph)?,
                };
                emit(&text, output.as_deref()).await
            }
            Commands::Filter { file, types, name, output } => {
                let document = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let types: Vec<String> = types
                    .iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                let filtered = engine.apply_filters(&document, &types, name.as_deref().unwrap_or(""));
                emit(&filtered, output.as_deref()).await
            }
            Commands::Languages => {
                let mut rows: Vec<(String, String)> = engine
                    .parser()
                    .registry()
                    .adapters()
                    .map(|adapter| {
                        let extensions: Vec<String> =
                            adapter.file_extensions().iter().map(|ext| format!(".{}", ext)).collect();
                        (adapter.language_id().to_string(), extensions.join(" "))
                    })
                    .collect();
                rows.sort();
                for (id, extensions) in rows {
                    println!("{:<12} {}", id, extensions);
                }
                Ok(())
            }
            Commands::Init { path } => {
                let dir = path.unwrap_or_else(|| PathBuf::from("."));
                tokio::fs::create_dir_all(&dir).await?;
                let target = dir.join("contractscope.toml");
                if target.exists() {
                    anyhow::bail!("{} already exists", target.display());
                }
                Config::default().save(&target)?;
                info!("Wrote {}", target.display());
                println!("Created {}", target.display());
                Ok(())
            }
        }
    }
}

async fn emit(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            tokio::fs::write(path, format!("{}\n", text))
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}
