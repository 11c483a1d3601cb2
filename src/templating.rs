//! Applies placeholder substitution to a working tree

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ProvisionError, Result};
use crate::git::GIT_DIR;
use crate::placeholder::{PlaceholderResolver, TemplateContext, contains_placeholder};

/// Renames and rewrites a materialized tree for one provisioning run.
///
/// Owns the run's [`TemplateContext`], so a GUID or password key resolves to
/// the same value in every path and file touched by this engine.
pub struct TemplateEngine {
    resolver: PlaceholderResolver,
    context: TemplateContext,
}

impl TemplateEngine {
    pub fn new(resolver: PlaceholderResolver) -> Self {
        Self {
            resolver,
            context: TemplateContext::new(),
        }
    }

    /// Rename pass over the whole tree, then content pass.
    pub fn render_tree(&mut self, root: &Path) -> Result<()> {
        info!(
            "Rendering templates in {:?} for component '{}'",
            root,
            self.resolver.component_name()
        );
        self.rewrite_path_names(root)?;
        self.rewrite_file_contents(root)
    }

    /// Replace placeholders in file and directory names below `dir`.
    ///
    /// A directory is renamed before it is descended into, and the recursion
    /// continues with the new path.
    pub fn rewrite_path_names(&mut self, dir: &Path) -> Result<()> {
        let mut subdirectories = Vec::new();

        for entry in read_entries(dir)? {
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                if entry.file_name() != GIT_DIR {
                    subdirectories.push(path);
                }
                continue;
            }
            self.rename_entry(&path)?;
        }

        for subdirectory in subdirectories {
            let current = self.rename_entry(&subdirectory)?;
            self.rewrite_path_names(&current)?;
        }

        Ok(())
    }

    /// Replace placeholders inside every file below `dir`.
    ///
    /// Files without a placeholder are not written. Files that are not UTF-8
    /// text are skipped.
    pub fn rewrite_file_contents(&mut self, dir: &Path) -> Result<()> {
        for entry in read_entries(dir)? {
            let file_type = entry.file_type()?;
            let path = entry.path();

            if file_type.is_dir() {
                if entry.file_name() != GIT_DIR {
                    self.rewrite_file_contents(&path)?;
                }
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let content = match String::from_utf8(fs::read(&path)?) {
                Ok(content) => content,
                Err(_) => {
                    debug!("Skipping non-text file {:?}", path);
                    continue;
                }
            };
            if !contains_placeholder(&content) {
                continue;
            }

            let rendered = self.resolver.substitute(&content, &mut self.context)?;
            fs::write(&path, rendered.as_bytes())?;
            info!("Replaced placeholders in {:?}", path);
        }

        Ok(())
    }

    /// Rename `path` if its final component holds a placeholder and return
    /// the path the entry now lives at.
    fn rename_entry(&mut self, path: &Path) -> Result<PathBuf> {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(path.to_path_buf());
        };
        if !contains_placeholder(name) {
            return Ok(path.to_path_buf());
        }

        let new_name = self.resolver.substitute(name, &mut self.context)?;
        if new_name == name {
            return Ok(path.to_path_buf());
        }

        let target = path.with_file_name(&*new_name);
        if target.symlink_metadata().is_ok() {
            return Err(ProvisionError::RenameCollision {
                from: path.display().to_string(),
                to: target.display().to_string(),
            });
        }

        fs::rename(path, &target)?;
        info!("Renamed {:?} to {:?}", path, target);
        Ok(target)
    }
}

fn read_entries(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}
