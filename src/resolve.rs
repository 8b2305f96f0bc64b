//! Executable resolution: map the command the user typed to the
//! absolute path the watcher will observe.

use std::path::PathBuf;

/// The command could not be found on `PATH` (or at the given path).
#[derive(Debug)]
pub struct ResolveError {
    command: String,
    source: which::Error,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot resolve {}: {}", self.command, self.source)
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Resolve `command` the way a shell would: `PATH` search for bare
/// names, direct lookup for anything containing a separator.
pub fn executable(command: &str) -> Result<PathBuf, ResolveError> {
    which::which(command).map_err(|source| ResolveError {
        command: command.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_resolves_command_on_path() {
        let path = executable("sh").unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("sh"));
    }

    #[test]
    fn test_unknown_command_fails() {
        let err = executable("no-such-binary-xyz").unwrap_err();
        assert!(err.to_string().contains("no-such-binary-xyz"));
    }

    #[test]
    fn test_resolves_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("tool");
        std::fs::write(&bin, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let resolved = executable(bin.to_str().unwrap()).unwrap();
        assert_eq!(resolved, bin);
    }

    #[test]
    fn test_non_executable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.txt");
        std::fs::write(&file, b"not a program").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(executable(file.to_str().unwrap()).is_err());
    }
}
