use std::collections::HashSet;
use std::future::Future;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::{ParsingConfig, ProjectConfig};
use crate::error::{ContractScopeError, Result};
use super::languages::{ImportKind, LanguageAdapter};

/// Source text with every followed import merged in
#[derive(Debug, Clone, Default)]
pub struct ResolvedSource {
    pub code: String,
    /// Canonical paths of every file that contributed, in visiting order
    pub files: Vec<PathBuf>,
}

/// Follows include/import/module directives across files.
///
/// Traversal is depth first and strictly sequential. A file is marked visited
/// before its own imports are followed, so cyclic imports terminate. Every
/// path is canonicalized and must stay inside the workspace root.
pub struct ImportResolver {
    workspace_root: PathBuf,
    dependency_dirs: Vec<String>,
    max_depth: usize,
    max_file_size: usize,
}

/// State of one `resolve` call
struct Walk {
    rules: Vec<(ImportKind, Regex)>,
    extension: String,
    visited: HashSet<PathBuf>,
    files: Vec<PathBuf>,
}

struct Directive {
    kind: ImportKind,
    span: Range<usize>,
    target: String,
}

type Merged<'s> = Pin<Box<dyn Future<Output = String> + Send + 's>>;

impl ImportResolver {
    pub fn new(workspace_root: &Path, project: &ProjectConfig, parsing: &ParsingConfig) -> Result<Self> {
        let workspace_root = std::fs::canonicalize(workspace_root).map_err(|e| {
            ContractScopeError::Import(format!("workspace root {}: {}", workspace_root.display(), e))
        })?;

        Ok(Self {
            workspace_root,
            dependency_dirs: project.dependency_dirs.clone(),
            max_depth: parsing.max_import_depth,
            max_file_size: parsing.max_file_size,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Merge `code` (the contents of `file_path`) with everything it imports.
    ///
    /// Imported code comes before the importing file's own code. Imports that
    /// are missing, too deep, too large or outside the workspace are logged
    /// and left out.
    pub async fn resolve(&self, code: &str, file_path: &Path, adapter: &dyn LanguageAdapter) -> Result<ResolvedSource> {
        let rules = adapter
            .import_rules()
            .iter()
            .map(|rule| Ok((rule.kind, Regex::new(rule.pattern)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut walk = Walk {
            rules,
            extension: adapter.file_extensions().first().copied().unwrap_or("").to_string(),
            visited: HashSet::new(),
            files: Vec::new(),
        };

        let root_file = match tokio::fs::canonicalize(file_path).await {
            Ok(path) if path.starts_with(&self.workspace_root) => {
                walk.visited.insert(path.clone());
                walk.files.push(path.clone());
                path
            }
            Ok(path) => {
                warn!("{} is outside workspace {}", path.display(), self.workspace_root.display());
                path
            }
            Err(_) => file_path.to_path_buf(),
        };

        if walk.rules.is_empty() {
            return Ok(ResolvedSource { code: code.to_string(), files: walk.files });
        }

        let code = self.visit(&mut walk, code.to_string(), root_file, 0).await;
        Ok(ResolvedSource { code, files: walk.files })
    }

    fn visit<'s>(&'s self, walk: &'s mut Walk, code: String, file: PathBuf, depth: usize) -> Merged<'s> {
        Box::pin(async move {
            let directives = self.directives(walk, &code);
            if directives.is_empty() {
                return code;
            }

            let dir = file.parent().map(Path::to_path_buf).unwrap_or_else(|| self.workspace_root.clone());
            let mut imported = String::new();
            let mut own = String::with_capacity(code.len());
            let mut last = 0;

            for directive in directives {
                if directive.span.start < last {
                    continue;
                }
                if depth + 1 > self.max_depth {
                    warn!(
                        "Import depth limit {} reached in {}, skipping {}",
                        self.max_depth,
                        file.display(),
                        directive.target
                    );
                    continue;
                }

                let candidates = match directive.kind {
                    ImportKind::Path => self.path_candidates(&directive.target, &dir, &walk.extension),
                    ImportKind::Module => module_candidates(&directive.target, &file, &dir, &walk.extension),
                };
                let path = match self.locate(&candidates).await {
                    Ok(path) => path,
                    Err(e) => {
                        warn!("Skipping import '{}' in {}: {}", directive.target, file.display(), e);
                        continue;
                    }
                };

                if !walk.visited.insert(path.clone()) {
                    debug!("Already visited {}, not following again", path.display());
                    continue;
                }

                let content = match self.read(&path).await {
                    Ok(content) => content,
                    Err(e) => {
                        warn!("Skipping import {}: {}", path.display(), e);
                        continue;
                    }
                };
                walk.files.push(path.clone());
                let merged = self.visit(walk, content, path, depth + 1).await;

                match directive.kind {
                    ImportKind::Path => {
                        imported.push_str(&merged);
                        imported.push('\n');
                    }
                    ImportKind::Module => {
                        own.push_str(&code[last..directive.span.start]);
                        own.push_str(&format!("mod {} {{\n{}\n}}", directive.target, merged));
                        last = directive.span.end;
                    }
                }
            }

            own.push_str(&code[last..]);
            imported.push_str(&own);
            imported
        })
    }

    fn directives(&self, walk: &Walk, code: &str) -> Vec<Directive> {
        let mut directives: Vec<Directive> = walk
            .rules
            .iter()
            .flat_map(|(kind, regex)| {
                regex.captures_iter(code).filter_map(move |caps| {
                    Some(Directive {
                        kind: *kind,
                        span: caps.get(0)?.range(),
                        target: caps.name("target")?.as_str().trim().to_string(),
                    })
                })
            })
            .collect();
        directives.sort_by_key(|d| d.span.start);
        directives
    }

    /// Importing directory, then workspace root, then each dependency directory
    fn path_candidates(&self, target: &str, dir: &Path, extension: &str) -> Vec<PathBuf> {
        let target = if Path::new(target).extension().is_none() && !extension.is_empty() {
            format!("{}.{}", target, extension)
        } else {
            target.to_string()
        };

        let mut candidates = vec![dir.join(&target), self.workspace_root.join(&target)];
        candidates.extend(
            self.dependency_dirs
                .iter()
                .map(|dep| self.workspace_root.join(dep).join(&target)),
        );
        candidates
    }

    /// First existing candidate, canonicalized and confined to the workspace
    async fn locate(&self, candidates: &[PathBuf]) -> Result<PathBuf> {
        for candidate in candidates {
            let Ok(path) = tokio::fs::canonicalize(candidate).await else {
                continue;
            };
            if !path.starts_with(&self.workspace_root) {
                return Err(ContractScopeError::OutsideWorkspace {
                    path,
                    root: self.workspace_root.clone(),
                });
            }
            return Ok(path);
        }

        let tried: Vec<String> = candidates.iter().map(|c| c.display().to_string()).collect();
        Err(ContractScopeError::Import(format!("not found (tried {})", tried.join(", "))))
    }

    async fn read(&self, path: &Path) -> Result<String> {
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() as usize > self.max_file_size {
            return Err(ContractScopeError::Import(format!(
                "{} bytes exceeds the {} byte limit",
                metadata.len(),
                self.max_file_size
            )));
        }
        Ok(tokio::fs::read_to_string(path).await?)
    }
}

/// `mod name;` lives in `name.ext` or `name/mod.ext` next to a root file, and
/// inside the stem directory for any other file
fn module_candidates(name: &str, file: &Path, dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    if !matches!(stem, "lib" | "main" | "mod" | "") {
        let nested = dir.join(stem);
        candidates.push(nested.join(format!("{}.{}", name, extension)));
        candidates.push(nested.join(name).join(format!("mod.{}", extension)));
    }
    candidates.push(dir.join(format!("{}.{}", name, extension)));
    candidates.push(dir.join(name).join(format!("mod.{}", extension)));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::languages::LanguageRegistry;
    use std::fs;

    fn resolver(root: &Path) -> ImportResolver {
        let config = Config::default();
        ImportResolver::new(root, &config.project, &config.parsing).unwrap()
    }

    async fn resolve(root: &Path, file: &Path, language: &str) -> ResolvedSource {
        let registry = LanguageRegistry::with_builtin().unwrap();
        let adapter = registry.get(language).unwrap();
        let code = fs::read_to_string(file).unwrap();
        resolver(root).resolve(&code, file, adapter.as_ref()).await.unwrap()
    }

    #[tokio::test]
    async fn test_cyclic_includes_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.fc");
        fs::write(&a, "#include \"b.fc\";\nint from_a() { return from_b(); }\n").unwrap();
        fs::write(dir.path().join("b.fc"), "#include \"a.fc\";\nint from_b() { return 1; }\n").unwrap();

        let resolved = resolve(dir.path(), &a, "func").await;
        assert_eq!(resolved.code.matches("int from_a()").count(), 1);
        assert_eq!(resolved.code.matches("int from_b()").count(), 1);
        assert_eq!(resolved.files.len(), 2);
    }

    #[tokio::test]
    async fn test_imported_code_comes_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("imports")).unwrap();
        fs::write(dir.path().join("imports/stdlib.fc"), "int helper() { return 1; }\n").unwrap();
        let main = dir.path().join("main.fc");
        fs::write(&main, "#include \"imports/stdlib.fc\";\nint main() { return helper(); }\n").unwrap();

        let resolved = resolve(dir.path(), &main, "func").await;
        let helper = resolved.code.find("int helper()").unwrap();
        let entry = resolved.code.find("int main()").unwrap();
        assert!(helper < entry);
    }

    #[tokio::test]
    async fn test_missing_import_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.tact");
        fs::write(&main, "import \"./messages\";\ncontract A { get fun x(): Int { return 1; } }\n").unwrap();

        let resolved = resolve(dir.path(), &main, "tact").await;
        assert!(resolved.code.contains("contract A"));
        assert_eq!(resolved.files.len(), 1);
    }

    #[tokio::test]
    async fn test_extension_is_appended_and_dependency_dirs_searched() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/@oz")).unwrap();
        fs::write(dir.path().join("node_modules/@oz/Ownable.sol"), "contract Ownable { function owner() public {} }\n").unwrap();
        fs::write(dir.path().join("messages.tact"), "message Add { amount: Int }\n").unwrap();

        let tact = dir.path().join("main.tact");
        fs::write(&tact, "import \"./messages\";\ncontract A {}\n").unwrap();
        let resolved = resolve(dir.path(), &tact, "tact").await;
        assert!(resolved.code.contains("message Add"));

        let sol = dir.path().join("Token.sol");
        fs::write(&sol, "import {Ownable} from \"@oz/Ownable.sol\";\ncontract Token is Ownable {}\n").unwrap();
        let resolved = resolve(dir.path(), &sol, "solidity").await;
        assert!(resolved.code.starts_with("contract Ownable"));
    }

    #[tokio::test]
    async fn test_mod_declarations_are_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/utils.rs"), "pub fn check() {}\n").unwrap();
        let lib = dir.path().join("src/lib.rs");
        fs::write(&lib, "mod utils;\npub fn run() { utils::check(); }\n").unwrap();

        let resolved = resolve(dir.path(), &lib, "rust").await;
        assert!(resolved.code.starts_with("mod utils {\npub fn check() {}\n\n}"));
        assert!(resolved.code.contains("pub fn run()"));
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("c.fc"), "int c() { return 1; }\n").unwrap();
        fs::write(dir.path().join("b.fc"), "#include \"c.fc\";\nint b() { return c(); }\n").unwrap();
        let a = dir.path().join("a.fc");
        fs::write(&a, "#include \"b.fc\";\nint a() { return b(); }\n").unwrap();

        let mut config = Config::default();
        config.parsing.max_import_depth = 1;
        let resolver = ImportResolver::new(dir.path(), &config.project, &config.parsing).unwrap();
        let registry = LanguageRegistry::with_builtin().unwrap();
        let adapter = registry.get("func").unwrap();
        let code = fs::read_to_string(&a).unwrap();
        let resolved = resolver.resolve(&code, &a, adapter.as_ref()).await.unwrap();

        assert!(resolved.code.contains("int b()"));
        assert!(!resolved.code.contains("int c()"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_outside_workspace_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.fc"), "int secret() { return 42; }\n").unwrap();

        let workspace = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.fc"), workspace.path().join("link.fc")).unwrap();
        let main = workspace.path().join("main.fc");
        fs::write(&main, "#include \"link.fc\";\nint main() { return 0; }\n").unwrap();

        let resolved = resolve(workspace.path(), &main, "func").await;
        assert!(!resolved.code.contains("secret"));
        let outside_root = fs::canonicalize(outside.path()).unwrap();
        assert!(resolved.files.iter().all(|f| !f.starts_with(&outside_root)));
    }
}
