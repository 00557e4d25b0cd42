//! Decides whether the compiled artifacts are out of date

use crate::{artifacts::BACKEND_FILE, error::Result};
use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};
use walkdir::WalkDir;

/// Why a compile pass is required
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecompileReason {
    /// No backend artifact in the destination
    ArtifactMissing,
    /// Recompilation was requested explicitly
    Forced,
    /// A caller source is newer than the backend artifact
    SourceChanged(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    Recompile(RecompileReason),
}

impl Staleness {
    pub fn needs_compile(&self) -> bool {
        matches!(self, Staleness::Recompile(_))
    }
}

/// Compares the modification times of the caller's sources against the
/// backend artifact in `destination`.
///
/// Only `additional_paths` are scanned: core sources change with releases,
/// not between runs. Any newer source forces a recompile of the whole tree.
pub fn check(
    destination: &Path,
    additional_paths: &[PathBuf],
    always_recompile: bool,
) -> Result<Staleness> {
    let artifact = destination.join(BACKEND_FILE);
    let artifact_modified = match std::fs::metadata(&artifact) {
        Ok(metadata) => metadata.modified()?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Staleness::Recompile(RecompileReason::ArtifactMissing));
        }
        Err(e) => return Err(e.into()),
    };

    if always_recompile {
        return Ok(Staleness::Recompile(RecompileReason::Forced));
    }

    for root in additional_paths {
        if let Some(changed) = newer_source(root, artifact_modified)? {
            tracing::info!("{} changed since last compile", changed.display());
            return Ok(Staleness::Recompile(RecompileReason::SourceChanged(changed)));
        }
    }

    Ok(Staleness::Fresh)
}

fn newer_source(root: &Path, than: SystemTime) -> Result<Option<PathBuf>> {
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| crate::Error::Io(e.into()))?;
        let path = entry.path();
        let is_source = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(crate::sources::SOURCE_EXTENSION));
        if !entry.file_type().is_file() || !is_source {
            continue;
        }
        if entry.metadata().map_err(|e| crate::Error::Io(e.into()))?.modified()? > than {
            return Ok(Some(path.to_path_buf()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, time::Duration};
    use tempfile::TempDir;

    fn set_mtime(path: &Path, time: SystemTime) {
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    struct Fixture {
        _temp: TempDir,
        out: PathBuf,
        src: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let src = temp.path().join("src");
        fs::create_dir_all(&out).unwrap();
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("Project.sol"), "contract Project {}").unwrap();
        Fixture {
            _temp: temp,
            out,
            src,
        }
    }

    #[test]
    fn test_missing_artifact_requires_compile() {
        let f = fixture();
        assert_eq!(
            check(&f.out, &[f.src.clone()], false).unwrap(),
            Staleness::Recompile(RecompileReason::ArtifactMissing)
        );
    }

    #[test]
    fn test_fresh_artifact_skips() {
        let f = fixture();
        let artifact = f.out.join(BACKEND_FILE);
        fs::write(&artifact, "{}").unwrap();

        let now = SystemTime::now();
        set_mtime(&f.src.join("Project.sol"), now - Duration::from_secs(60));
        set_mtime(&artifact, now);

        let staleness = check(&f.out, &[f.src.clone()], false).unwrap();
        assert_eq!(staleness, Staleness::Fresh);
        assert!(!staleness.needs_compile());
    }

    #[test]
    fn test_newer_source_forces_recompile() {
        let f = fixture();
        let artifact = f.out.join(BACKEND_FILE);
        fs::write(&artifact, "{}").unwrap();

        let now = SystemTime::now();
        set_mtime(&artifact, now - Duration::from_secs(60));
        set_mtime(&f.src.join("Project.sol"), now);

        assert_eq!(
            check(&f.out, &[f.src.clone()], false).unwrap(),
            Staleness::Recompile(RecompileReason::SourceChanged(f.src.join("Project.sol")))
        );
    }

    #[test]
    fn test_non_source_files_are_ignored() {
        let f = fixture();
        let artifact = f.out.join(BACKEND_FILE);
        fs::write(&artifact, "{}").unwrap();
        fs::write(f.src.join("notes.txt"), "notes").unwrap();

        let now = SystemTime::now();
        set_mtime(&f.src.join("Project.sol"), now - Duration::from_secs(120));
        set_mtime(&artifact, now - Duration::from_secs(60));
        set_mtime(&f.src.join("notes.txt"), now);

        assert_eq!(check(&f.out, &[f.src.clone()], false).unwrap(), Staleness::Fresh);
    }

    #[test]
    fn test_always_recompile() {
        let f = fixture();
        fs::write(f.out.join(BACKEND_FILE), "{}").unwrap();
        assert_eq!(
            check(&f.out, &[], true).unwrap(),
            Staleness::Recompile(RecompileReason::Forced)
        );
    }
}
