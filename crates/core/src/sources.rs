//! Source discovery across the core root and caller-supplied roots

use crate::error::{Error, Result};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tokio::task::JoinSet;
use walkdir::WalkDir;

/// Extension of files handed to the compiler
pub const SOURCE_EXTENSION: &str = "sol";

/// Ordered `root directory -> [relative file]` listing
pub type SourceTree = Vec<(PathBuf, Vec<String>)>;

/// A file name provided by more than one root. The later root wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCollision {
    pub file: String,
    pub previous: PathBuf,
    pub replacement: PathBuf,
}

/// Sources ready for compilation
#[derive(Debug, Default)]
pub struct SourceSet {
    /// `file name -> content`
    pub sources: BTreeMap<String, String>,
    /// Files shadowed by a later root
    pub collisions: Vec<SourceCollision>,
}

/// Lists the contract sources under every root.
///
/// A root that is a single file contributes its parent directory and its
/// file name. Directory roots are walked recursively.
pub fn collect(roots: &[PathBuf]) -> Result<SourceTree> {
    let mut tree = SourceTree::with_capacity(roots.len());

    for root in roots {
        if !root.exists() {
            return Err(Error::SourceNotFound(root.clone()));
        }

        if root.is_file() {
            let dir = root
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let files = root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .filter(|name| is_source_file(name))
                .into_iter()
                .collect();
            tree.push((dir, files));
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
        {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if is_source_file(&relative) {
                files.push(relative);
            }
        }

        tracing::debug!("Found {} sources in {}", files.len(), root.display());
        tree.push((root.clone(), files));
    }

    Ok(tree)
}

/// Reads every listed file and flattens the tree to `file -> content`.
///
/// Reads run concurrently. Entries are inserted in root order afterwards, so
/// later roots deterministically shadow earlier ones.
pub async fn read(tree: &SourceTree) -> Result<SourceSet> {
    let mut reads = JoinSet::new();
    let mut order = Vec::new();

    for (dir, files) in tree {
        for file in files {
            let index = order.len();
            let path = dir.join(file);
            order.push((file.clone(), dir.clone()));
            reads.spawn(async move {
                let content = tokio::fs::read_to_string(&path).await;
                (index, path, content)
            });
        }
    }

    let mut contents: Vec<Option<String>> = vec![None; order.len()];
    while let Some(joined) = reads.join_next().await {
        let (index, path, content) =
            joined.map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let content = content.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {e}", path.display()),
            ))
        })?;
        contents[index] = Some(content);
    }

    let mut set = SourceSet::default();
    let mut origin: BTreeMap<String, PathBuf> = BTreeMap::new();
    for ((file, dir), content) in order.into_iter().zip(contents) {
        let content = content.unwrap_or_default();
        if let Some(previous) = origin.insert(file.clone(), dir.clone()) {
            tracing::warn!(
                "{} is a duplicate file name, {} shadows {}",
                file,
                dir.display(),
                previous.display()
            );
            set.collisions.push(SourceCollision {
                file: file.clone(),
                previous,
                replacement: dir,
            });
        }
        set.sources.insert(file, content);
    }

    Ok(set)
}

fn is_source_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION))
        .unwrap_or(false)
}
