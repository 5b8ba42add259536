//! Topology file discovery
//!
//! Environment variable first, then an upward search from the current
//! directory for `stack.kdl` or `.stackflow/stack.kdl`.

use crate::error::{RegistryError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Topology file name
const TOPOLOGY_FILENAME: &str = "stack.kdl";

/// Project-local directory that may hold the topology file
const PROJECT_DIR: &str = ".stackflow";

/// Environment variable pointing at the topology file
const TOPOLOGY_PATH_ENV: &str = "STACKFLOW_TOPOLOGY";

/// Find the topology file
///
/// Search order:
/// 1. STACKFLOW_TOPOLOGY environment variable
/// 2. `stack.kdl` in the current directory or any parent
/// 3. `.stackflow/stack.kdl` in the current directory or any parent
#[tracing::instrument]
pub fn find_topology() -> Result<PathBuf> {
    if let Ok(path_str) = std::env::var(TOPOLOGY_PATH_ENV) {
        let path = PathBuf::from(&path_str);
        debug!(env_path = %path_str, "Checking STACKFLOW_TOPOLOGY");
        if path.exists() {
            info!(topology_path = %path.display(), "Found topology from environment variable");
            return Ok(path);
        }
        warn!(env_path = %path_str, "STACKFLOW_TOPOLOGY is set but file does not exist");
    }

    let start_dir = std::env::current_dir()?;
    find_topology_from(&start_dir).ok_or(RegistryError::NotFound)
}

/// Search upward from `start_dir` for the topology file
pub fn find_topology_from(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    debug!(start_dir = %start_dir.display(), "Searching for {}", TOPOLOGY_FILENAME);

    loop {
        for candidate in [
            current.join(TOPOLOGY_FILENAME),
            current.join(PROJECT_DIR).join(TOPOLOGY_FILENAME),
        ] {
            if candidate.exists() {
                info!(topology_path = %candidate.display(), "Found topology file");
                return Some(candidate);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("Topology file not found");
    None
}

/// Project root for a topology path: the directory holding `stack.kdl`,
/// or the parent of `.stackflow/` when the file lives there.
pub fn project_root(topology_path: &Path) -> Option<&Path> {
    let dir = topology_path.parent()?;
    if dir.file_name().is_some_and(|name| name == PROJECT_DIR) {
        dir.parent()
    } else {
        Some(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_find_topology_from_with_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();

        std::fs::write(root.join(TOPOLOGY_FILENAME), "resource-type \"network\"").unwrap();

        let result = find_topology_from(root);
        assert_eq!(result, Some(root.join(TOPOLOGY_FILENAME)));
    }

    #[test]
    fn test_find_topology_from_subdirectory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();

        std::fs::write(root.join(TOPOLOGY_FILENAME), "resource-type \"network\"").unwrap();

        let sub_dir = root.join("infra").join("web");
        std::fs::create_dir_all(&sub_dir).unwrap();

        let result = find_topology_from(&sub_dir);
        assert_eq!(result, Some(root.join(TOPOLOGY_FILENAME)));
    }

    #[test]
    fn test_find_topology_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join(PROJECT_DIR)).unwrap();
        std::fs::write(
            root.join(PROJECT_DIR).join(TOPOLOGY_FILENAME),
            "resource-type \"network\"",
        )
        .unwrap();

        let result = find_topology_from(root).unwrap();
        assert!(result.ends_with(".stackflow/stack.kdl"));
        assert_eq!(project_root(&result), Some(root));
    }

    #[test]
    fn test_find_topology_from_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(find_topology_from(temp_dir.path()).is_none());
    }

    #[test]
    #[serial]
    fn test_find_topology_from_env() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("custom.kdl");
        std::fs::write(&path, "resource-type \"network\"").unwrap();

        temp_env::with_var(TOPOLOGY_PATH_ENV, Some(&path), || {
            assert_eq!(find_topology().unwrap(), path);
        });
    }

    #[test]
    fn test_project_root() {
        let path = PathBuf::from("/home/user/weather/stack.kdl");
        assert_eq!(project_root(&path), Some(Path::new("/home/user/weather")));
    }
}
