//! Ignore pattern management for the vault watcher
//!
//! Supports multiple sources of ignore patterns:
//! 1. Built-in patterns (.git/, workspace metadata, trash, OS files - always active)
//! 2. The vault's .gitignore (optional, enabled by default)
//! 3. Config-based patterns (additional custom patterns)
//!
//! All sources use gitignore semantics relative to the vault root, and a
//! path is ignored when it or any of its parent directories matches.

use crate::WatchError;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};
use vault_core::{IgnoreConfig, WRITE_PROBE_FILE};

/// Patterns that are never backed up
const BUILTIN_PATTERNS: &[&str] = &[
    // Version control metadata
    ".git",
    // Obsidian workspace layout (rewritten on every pane switch)
    ".obsidian/workspace*.json",
    // Obsidian trash
    ".trash",
    // OS index files
    ".DS_Store",
    "._*",
    "Thumbs.db",
    "desktop.ini",
    // Writability probe
    WRITE_PROBE_FILE,
    // Editor temp files
    "*.swp",
    "*.swo",
    "*~",
    ".#*",
];

/// Ignore rule manager
///
/// Combines multiple sources of ignore patterns:
/// 1. Built-in patterns (highest priority - always enforced)
/// 2. .gitignore patterns
/// 3. Additional config patterns
pub struct IgnoreRules {
    /// Vault root directory
    vault_root: PathBuf,

    /// Vault root with symlinks resolved, as some backends report events
    canonical_root: PathBuf,

    /// Built-in patterns
    builtin: Gitignore,

    /// Vault .gitignore patterns (optional)
    gitignore: Option<Gitignore>,

    /// Config patterns (optional)
    additional: Option<Gitignore>,

    /// Configuration
    config: IgnoreConfig,
}

impl IgnoreRules {
    /// Load ignore rules for a vault
    pub fn load(vault_root: &Path, config: IgnoreConfig) -> Result<Self, WatchError> {
        let builtin = build_matcher(vault_root, BUILTIN_PATTERNS.iter().copied())?;
        let additional = if config.additional_patterns.is_empty() {
            None
        } else {
            Some(build_matcher(
                vault_root,
                config.additional_patterns.iter().map(String::as_str),
            )?)
        };

        let mut rules = Self {
            vault_root: vault_root.to_path_buf(),
            canonical_root: canonical_root(vault_root),
            builtin,
            gitignore: None,
            additional,
            config,
        };

        rules.reload_gitignore()?;
        Ok(rules)
    }

    /// Reload the vault's .gitignore from disk
    ///
    /// Called when the watcher sees the .gitignore itself change.
    pub fn reload_gitignore(&mut self) -> Result<(), WatchError> {
        if !self.config.use_gitignore {
            self.gitignore = None;
            return Ok(());
        }

        let gitignore_path = self.vault_root.join(".gitignore");
        if !gitignore_path.exists() {
            self.gitignore = None;
            return Ok(());
        }

        let mut builder = GitignoreBuilder::new(&self.vault_root);
        if let Some(err) = builder.add(&gitignore_path) {
            return Err(WatchError::Ignore(err));
        }
        self.gitignore = Some(builder.build()?);
        Ok(())
    }

    /// Check if path should be ignored
    ///
    /// Accepts absolute paths under the vault root or vault-relative paths.
    /// The vault root itself and paths outside it are always ignored.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let Some(relative) = self.relative(path) else {
            return true;
        };
        if relative.as_os_str().is_empty() {
            return true;
        }

        let is_dir = self.vault_root.join(relative).is_dir();

        // 1. Built-in patterns
        if self
            .builtin
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
        {
            return true;
        }

        // 2. .gitignore
        if let Some(ref gitignore) = self.gitignore {
            if gitignore
                .matched_path_or_any_parents(relative, is_dir)
                .is_ignore()
            {
                return true;
            }
        }

        // 3. Additional config patterns
        if let Some(ref additional) = self.additional {
            if additional
                .matched_path_or_any_parents(relative, is_dir)
                .is_ignore()
            {
                return true;
            }
        }

        false
    }

    /// Whether the path is the vault's own .gitignore
    pub fn is_gitignore_file(&self, path: &Path) -> bool {
        self.relative(path)
            .is_some_and(|relative| relative == Path::new(".gitignore"))
    }

    /// Get number of active ignore sources
    pub fn active_sources(&self) -> usize {
        let mut count = 1; // Built-in always active
        if self.gitignore.is_some() {
            count += 1;
        }
        if self.additional.is_some() {
            count += 1;
        }
        count
    }

    /// Get vault root
    pub fn vault_root(&self) -> &Path {
        &self.vault_root
    }

    fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        if path.is_absolute() {
            path.strip_prefix(&self.vault_root)
                .or_else(|_| path.strip_prefix(&self.canonical_root))
                .ok()
        } else {
            Some(path)
        }
    }
}

/// Resolve symlinks in the vault root, keeping the path as given if that fails
pub(crate) fn canonical_root(root: &Path) -> PathBuf {
    root.canonicalize().unwrap_or_else(|_| root.to_path_buf())
}

fn build_matcher<'a>(
    root: &Path,
    patterns: impl IntoIterator<Item = &'a str>,
) -> Result<Gitignore, WatchError> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        builder.add_line(None, pattern)?;
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn rules_for(root: &Path, config: IgnoreConfig) -> IgnoreRules {
        IgnoreRules::load(root, config).unwrap()
    }

    #[test]
    fn test_builtin_patterns_always_enforced() {
        let temp_dir = TempDir::new().unwrap();
        let rules = rules_for(temp_dir.path(), IgnoreConfig::default());

        assert!(rules.should_ignore(Path::new(".git/objects/ab/cd")));
        assert!(rules.should_ignore(Path::new(".obsidian/workspace.json")));
        assert!(rules.should_ignore(Path::new(".obsidian/workspace-mobile.json")));
        assert!(rules.should_ignore(Path::new(".obsidian/workspaces.json")));
        assert!(rules.should_ignore(Path::new(".trash/old-note.md")));
        assert!(rules.should_ignore(Path::new("notes/.DS_Store")));
        assert!(rules.should_ignore(Path::new("attachments/Thumbs.db")));
        assert!(rules.should_ignore(Path::new("._daily.md")));
        assert!(rules.should_ignore(Path::new(".backup-write-test")));
        assert!(rules.should_ignore(Path::new("notes/.daily.md.swp")));
        assert!(rules.should_ignore(Path::new("notes/daily.md~")));

        // Normal notes and other Obsidian settings are tracked
        assert!(!rules.should_ignore(Path::new("notes/daily.md")));
        assert!(!rules.should_ignore(Path::new(".obsidian/app.json")));
        assert!(!rules.should_ignore(Path::new("README.md")));
    }

    #[test]
    fn test_absolute_paths() {
        let temp_dir = TempDir::new().unwrap();
        let rules = rules_for(temp_dir.path(), IgnoreConfig::default());

        assert!(!rules.should_ignore(&temp_dir.path().join("notes/a.md")));
        assert!(rules.should_ignore(&temp_dir.path().join(".git/index")));

        // Root itself and foreign paths are never changes to back up
        assert!(rules.should_ignore(temp_dir.path()));
        assert!(rules.should_ignore(Path::new("/somewhere/else.md")));
    }

    #[cfg(unix)]
    #[test]
    fn test_canonical_event_paths_under_symlinked_root() {
        let temp_dir = TempDir::new().unwrap();
        let real = temp_dir.path().join("real-vault");
        fs::create_dir_all(&real).unwrap();
        let link = temp_dir.path().join("vault");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let rules = rules_for(&link, IgnoreConfig::default());
        let canonical = real.canonicalize().unwrap();

        assert!(!rules.should_ignore(&canonical.join("notes/a.md")));
        assert!(!rules.should_ignore(&link.join("notes/a.md")));
        assert!(rules.should_ignore(&canonical.join(".git/index")));
    }

    #[test]
    fn test_gitignore_parsing() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".gitignore"), "*.log\nexports/\n").unwrap();
        fs::create_dir_all(temp_dir.path().join("exports")).unwrap();

        let rules = rules_for(temp_dir.path(), IgnoreConfig::default());

        assert!(rules.should_ignore(Path::new("debug.log")));
        assert!(rules.should_ignore(Path::new("exports")));
        assert!(rules.should_ignore(Path::new("exports/note.pdf")));
        assert!(!rules.should_ignore(Path::new("notes/a.md")));
        assert_eq!(rules.active_sources(), 2);
    }

    #[test]
    fn test_gitignore_disabled() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(".gitignore"), "*.log\n").unwrap();

        let config = IgnoreConfig {
            use_gitignore: false,
            additional_patterns: vec![],
        };
        let rules = rules_for(temp_dir.path(), config);

        assert!(!rules.should_ignore(Path::new("test.log")));
        // Built-in patterns still apply
        assert!(rules.should_ignore(Path::new(".git/HEAD")));
    }

    #[test]
    fn test_additional_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let config = IgnoreConfig {
            use_gitignore: false,
            additional_patterns: vec!["*.tmp".to_string(), "build/".to_string()],
        };
        fs::create_dir_all(temp_dir.path().join("build")).unwrap();

        let rules = rules_for(temp_dir.path(), config);

        assert!(rules.should_ignore(Path::new("scratch.tmp")));
        assert!(rules.should_ignore(Path::new("build/output.txt")));
        assert!(!rules.should_ignore(Path::new("notes/build.md")));
        assert_eq!(rules.active_sources(), 2);
    }

    #[test]
    fn test_reload_gitignore() {
        let temp_dir = TempDir::new().unwrap();
        let mut rules = rules_for(temp_dir.path(), IgnoreConfig::default());

        assert!(!rules.should_ignore(Path::new("test.log")));
        assert_eq!(rules.active_sources(), 1);

        fs::write(temp_dir.path().join(".gitignore"), "*.log\n").unwrap();
        rules.reload_gitignore().unwrap();

        assert!(rules.should_ignore(Path::new("test.log")));
    }

    #[test]
    fn test_is_gitignore_file() {
        let temp_dir = TempDir::new().unwrap();
        let rules = rules_for(temp_dir.path(), IgnoreConfig::default());

        assert!(rules.is_gitignore_file(&temp_dir.path().join(".gitignore")));
        assert!(rules.is_gitignore_file(Path::new(".gitignore")));
        assert!(!rules.is_gitignore_file(Path::new("notes/.gitignore")));
    }
}
