//! Preflight checks for build validation.
//!
//! Validates that the host has the tools a backend shells out to before any
//! staging happens, so a missing `dpkg-deb` is reported up front instead of
//! after the tree has been composed.
//!
//! # Example
//!
//! ```rust
//! use psu_packager::preflight::{check_required_tools, command_exists};
//!
//! if !command_exists("dpkg-deb") {
//!     println!("dpkg not installed");
//! }
//!
//! if let Err(e) = check_required_tools(&[("dpkg-deb", "dpkg")]) {
//!     eprintln!("{}", e);
//! }
//! ```

use crate::error::{PackageError, Result};

/// Check if a command exists on `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Check that specific tools are available.
///
/// `tools` holds (command, providing package) pairs. All missing tools are
/// reported together on one line.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    let msg = missing
        .iter()
        .map(|(t, p)| format!("{} (install: {})", t, p))
        .collect::<Vec<_>>()
        .join("; ");
    Err(PackageError::MissingTool(msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_success() {
        let tools = &[("sh", "dash"), ("ls", "coreutils")];
        assert!(check_required_tools(tools).is_ok());
    }

    #[test]
    fn test_check_required_tools_failure() {
        let tools = &[("sh", "dash"), ("nonexistent_command_xyz", "fake-package")];
        let err = check_required_tools(tools).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nonexistent_command_xyz (install: fake-package)"));
        assert!(!msg.contains("dash"));
        assert_eq!(msg.lines().count(), 1);
    }

    #[test]
    fn test_empty_tool_list() {
        assert!(check_required_tools(&[]).is_ok());
    }
}
