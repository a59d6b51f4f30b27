use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use crate::config::Config;
use super::call_graph::{cluster, ContractGraph};
use super::diagram::{DiagramDocument, DiagramFilter, DiagramSynthesizer};
use super::imports::{ImportResolver, ResolvedSource};
use super::parser::CodeParser;

/// Host-facing entry point: parsing, import merging, rendering and filtering
pub struct Engine {
    config: Config,
    parser: CodeParser,
    synthesizer: DiagramSynthesizer,
    filter: DiagramFilter,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        debug!("Loaded configuration: {:?}", config);

        let parser = CodeParser::new(&config.parsing)?;
        let synthesizer = DiagramSynthesizer::new(&config.diagram);
        let filter = DiagramFilter::new(&config.diagram.direction)?;

        Ok(Self {
            config,
            parser,
            synthesizer,
            filter,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn parser(&self) -> &CodeParser {
        &self.parser
    }

    pub fn detect_language(&self, path: &Path) -> String {
        self.parser.detect_language(path)
    }

    pub fn parse_source(&mut self, source: &str, language_id: &str) -> Result<ContractGraph> {
        Ok(self.parser.parse_source(source, language_id)?)
    }

    /// Merge `source` (the contents of `path`) with the files it imports,
    /// without parsing the result
    pub async fn resolve_imports(&self, source: &str, path: &Path, language_id: &str) -> Result<ResolvedSource> {
        let adapter = self.parser.adapter(language_id)?;
        let root = self.workspace_root_for(path);
        let resolver = ImportResolver::new(&root, &self.config.project, &self.config.parsing)?;

        let resolved = resolver.resolve(source, path, adapter.as_ref()).await?;
        debug!(
            "Merged {} file(s) for {} under {}",
            resolved.files.len(),
            path.display(),
            resolver.workspace_root().display()
        );
        Ok(resolved)
    }

    pub async fn parse_with_imports(&mut self, source: &str, path: &Path, language_id: &str) -> Result<ContractGraph> {
        let resolved = self.resolve_imports(source, path, language_id).await?;
        self.parse_source(&resolved.code, language_id)
    }

    pub async fn parse_file(&mut self, path: &Path, follow_imports: bool) -> Result<ContractGraph> {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if metadata.len() as usize > self.parser.max_file_size() {
            anyhow::bail!(
                "{} is {} bytes, above the {} byte limit",
                path.display(),
                metadata.len(),
                self.parser.max_file_size()
            );
        }

        let source = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let language = self.detect_language(path);
        info!("Parsing {} as {}", path.display(), language);

        if follow_imports {
            self.parse_with_imports(&source, path, &language).await
        } else {
            self.parse_source(&source, &language)
        }
    }

    /// Parse every recognised file below `dir` and concatenate the graphs.
    ///
    /// Each file goes through the adapter of its own language. Files that
    /// cannot be read are logged and skipped.
    pub async fn parse_directory(&mut self, dir: &Path) -> Result<ContractGraph> {
        let ignored: Vec<String> = self
            .config
            .project
            .ignore_patterns
            .iter()
            .map(|pattern| pattern.trim_end_matches('/').to_string())
            .filter(|pattern| !pattern.is_empty())
            .collect();

        let walker = WalkBuilder::new(dir)
            .hidden(false)
            .git_ignore(true)
            .filter_entry(move |entry| {
                let name = entry.file_name().to_string_lossy();
                !ignored.iter().any(|pattern| *pattern == name)
            })
            .build();

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
            let path = entry.path();
            if path.is_file() && self.parser.should_parse_file(path) {
                files.push(path.to_path_buf());
            }
        }
        files.sort();

        let mut merged: Option<ContractGraph> = None;
        for path in &files {
            match self.parse_file(path, false).await {
                Ok(graph) => match merged.as_mut() {
                    Some(total) => total.merge(graph),
                    None => merged = Some(graph),
                },
                Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
            }
        }

        let graph = merged.unwrap_or_else(|| {
            ContractGraph::new(self.config.parsing.default_language.clone(), Default::default())
        });
        info!(
            "Parsed {} file(s) under {}: {} functions, {} calls",
            files.len(),
            dir.display(),
            graph.nodes.len(),
            graph.edges.len()
        );
        Ok(graph)
    }

    /// Cluster and render `graph`
    pub fn render(&self, graph: &ContractGraph) -> DiagramDocument {
        let clusters = cluster(graph);
        self.synthesizer.render(graph, &clusters)
    }

    /// Filter a rendered diagram by classification tags and a name substring.
    ///
    /// Lines that cannot be parsed are dropped; the rest is still filtered.
    pub fn apply_filters(&self, text: &str, types: &[String], name: &str) -> String {
        self.filter.apply(text, types, name)
    }

    /// Configured root, else the current directory when `path` lies below it,
    /// else the directory of `path`
    fn workspace_root_for(&self, path: &Path) -> PathBuf {
        if let Some(root) = &self.config.project.workspace_root {
            return root.clone();
        }
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let below_cwd = std::env::current_dir()
            .and_then(|cwd| Ok((std::fs::canonicalize(cwd)?, std::fs::canonicalize(&dir)?)));
        match below_cwd {
            Ok((cwd, dir)) if dir.starts_with(&cwd) => cwd,
            _ => dir,
        }
    }
}
