//! Launch preconditions: solver binary checks and instance staging.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

/// The solver binary was not found (or not executable).
///
/// Kept as a distinct error type so `main` can map it to its own exit code.
#[derive(Debug)]
pub struct MissingBinary {
    pub path: PathBuf,
}

impl fmt::Display for MissingBinary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "solver binary not found at {}", self.path.display())
    }
}

impl std::error::Error for MissingBinary {}

/// Fail fast when the solver binary is missing or not executable.
pub fn check_binary(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(MissingBinary {
            path: path.to_path_buf(),
        }
        .into());
    }
    if !is_executable(path)? {
        return Err(anyhow!("solver binary {} is not executable", path.display()));
    }
    debug!(binary = %path.display(), "solver binary ok");
    Ok(())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let metadata =
        fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    Ok(metadata.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> Result<bool> {
    Ok(true)
}

/// Copy the graph instance to the location the solver expects, relative to its
/// working directory.
///
/// Staging happens on every launch rather than as a one-time install step, so
/// staged data always matches the declared source. A configured source that is
/// missing is a launch-precondition failure; no configured source is fine.
pub fn stage_instance(
    source: Option<&Path>,
    dest_rel: &Path,
    workdir: &Path,
) -> Result<Option<PathBuf>> {
    let Some(source) = source else {
        return Ok(None);
    };
    if !source.is_file() {
        return Err(anyhow!(
            "instance data not found at {} (staging precondition)",
            source.display()
        ));
    }

    let dest = workdir.join(dest_rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create instance dir {}", parent.display()))?;
    }
    fs::copy(source, &dest).with_context(|| {
        format!("stage instance {} -> {}", source.display(), dest.display())
    })?;
    info!(source = %source.display(), dest = %dest.display(), "staged instance data");
    Ok(Some(dest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_a_distinct_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = check_binary(&temp.path().join("no-such-solver")).unwrap_err();
        assert!(err.downcast_ref::<MissingBinary>().is_some());
        assert!(err.to_string().contains("no-such-solver"));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_rejected() {
        use std::os::unix::fs::PermissionsExt;
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("solver");
        fs::write(&path, "#!/bin/sh\n").expect("write");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");

        let err = check_binary(&path).unwrap_err();
        assert!(err.downcast_ref::<MissingBinary>().is_none());
        assert!(err.to_string().contains("not executable"));
    }

    #[cfg(unix)]
    #[test]
    fn executable_file_passes() {
        use std::os::unix::fs::PermissionsExt;
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("solver");
        fs::write(&path, "#!/bin/sh\n").expect("write");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");

        check_binary(&path).expect("executable passes");
    }

    #[test]
    fn staging_copies_on_every_launch() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("DSJC1000.5.col");
        let workdir = temp.path().join("work");
        fs::create_dir_all(&workdir).expect("workdir");
        fs::write(&source, "p edge 1000 249826\n").expect("write source");

        let dest_rel = Path::new("instances/DSJC1000.5.col");
        let staged = stage_instance(Some(&source), dest_rel, &workdir)
            .expect("stage")
            .expect("dest");
        assert_eq!(staged, workdir.join(dest_rel));
        assert_eq!(
            fs::read_to_string(&staged).expect("read"),
            "p edge 1000 249826\n"
        );

        // A changed source is restaged, not assumed installed.
        fs::write(&source, "p edge 1000 300000\n").expect("rewrite source");
        stage_instance(Some(&source), dest_rel, &workdir).expect("restage");
        assert_eq!(
            fs::read_to_string(&staged).expect("read"),
            "p edge 1000 300000\n"
        );
    }

    #[test]
    fn missing_source_is_fatal_but_no_source_is_fine() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = stage_instance(
            Some(&temp.path().join("gone.col")),
            Path::new("instances/gone.col"),
            temp.path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("staging precondition"));

        let staged =
            stage_instance(None, Path::new("instances/none.col"), temp.path()).expect("stage");
        assert!(staged.is_none());
    }
}
