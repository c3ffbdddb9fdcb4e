//! Debian package backend.
//!
//! Wraps `dpkg-deb --build`. Before invoking the tool the control file is
//! checked against the package identity, so a template carrying a stale
//! version or architecture is rejected rather than silently producing an
//! artifact whose filename disagrees with its metadata.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, instrument};

use super::{artifact_path_for, PackageBackend};
use crate::error::{one_line, PackageError, Result};
use crate::identity::PackageIdentity;

pub const NAME: &str = "deb";
const DPKG_DEB: &str = "dpkg-deb";

#[derive(Debug, Clone)]
pub struct DebBackend {
    control_dir: PathBuf,
    program: String,
    leading_args: Vec<String>,
}

impl DebBackend {
    pub fn new(control_dir: &Path) -> Self {
        Self::with_command(control_dir, DPKG_DEB, &[])
    }

    /// Run `program leading_args.. --root-owner-group --build <staging> <output>`
    /// in place of plain `dpkg-deb`, e.g. a wrapper script.
    pub fn with_command(control_dir: &Path, program: &str, leading_args: &[&str]) -> Self {
        Self {
            control_dir: control_dir.to_path_buf(),
            program: program.to_string(),
            leading_args: leading_args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    /// Check `{control_dir}/control` against `identity` without running any tool.
    pub fn validate(&self, staging_root: &Path, identity: &PackageIdentity) -> Result<()> {
        let control_path = staging_root.join(&self.control_dir).join("control");
        let text = fs::read_to_string(&control_path).map_err(|e| {
            PackageError::backend(
                DPKG_DEB,
                staging_root,
                format!("reading control file '{}': {e}", control_path.display()),
            )
        })?;
        check_control_matches(&parse_control(&text), identity)
            .map_err(|detail| PackageError::backend(DPKG_DEB, staging_root, detail))
    }
}

impl PackageBackend for DebBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn extension(&self) -> &'static str {
        "deb"
    }

    fn required_tools(&self) -> Vec<(&str, &'static str)> {
        vec![(self.program.as_str(), "dpkg")]
    }

    #[instrument(skip_all, fields(backend = NAME, package = %identity))]
    fn emit(&self, staging_root: &Path, identity: &PackageIdentity) -> Result<PathBuf> {
        self.validate(staging_root, identity)?;

        let output = artifact_path_for(staging_root, self.extension())?;
        debug!(output = %output.display(), "running {}", self.program);
        let result = Command::new(&self.program)
            .args(&self.leading_args)
            .arg("--root-owner-group")
            .arg("--build")
            .arg(staging_root)
            .arg(&output)
            .output()
            .map_err(|e| {
                PackageError::backend(
                    DPKG_DEB,
                    staging_root,
                    format!("running {}: {e}", self.program),
                )
            })?;

        if !result.status.success() {
            let stdout = String::from_utf8_lossy(&result.stdout);
            let stderr = String::from_utf8_lossy(&result.stderr);
            let detail = one_line(&format!("{stdout}\n{stderr}"));
            return Err(PackageError::backend(
                DPKG_DEB,
                staging_root,
                if detail.is_empty() {
                    format!("{} exited with {}", self.program, result.status)
                } else {
                    detail
                },
            ));
        }
        if !output.is_file() {
            return Err(PackageError::backend(
                DPKG_DEB,
                staging_root,
                format!("expected output '{}' was not produced", output.display()),
            ));
        }

        info!(artifact = %output.display(), "built Debian package");
        Ok(output)
    }

    fn install_hint(&self, artifact: &str, _identity: &PackageIdentity) -> String {
        format!("sudo dpkg -i {artifact}")
    }

    fn remove_hint(&self, _artifact: &str, identity: &PackageIdentity) -> String {
        format!("sudo dpkg -r {}", identity.name())
    }
}

/// Parse a deb822 control paragraph into field -> value.
///
/// Continuation lines are folded into the preceding field. Field names are
/// case-insensitive and stored lowercased.
pub fn parse_control(text: &str) -> BTreeMap<String, String> {
    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some(value) = current.as_ref().and_then(|key| fields.get_mut(key)) {
                value.push('\n');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_ascii_lowercase();
            fields.insert(key.clone(), value.trim().to_string());
            current = Some(key);
        }
    }

    fields
}

fn check_control_matches(
    fields: &BTreeMap<String, String>,
    identity: &PackageIdentity,
) -> std::result::Result<(), String> {
    let expected = [
        ("Package", identity.name()),
        ("Version", identity.version()),
        ("Architecture", identity.architecture()),
    ];
    for (field, want) in expected {
        match fields.get(&field.to_ascii_lowercase()) {
            None => return Err(format!("control file is missing the '{field}' field")),
            Some(got) if got != want => {
                return Err(format!(
                    "control field '{field}' is '{got}' but the package identity says '{want}'"
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Shell script standing in for `dpkg-deb`: checks the argument shape and
/// copies the control file to the output path. Run it as `sh <script>`.
#[cfg(test)]
pub(crate) fn write_stand_in_tool(dir: &Path) -> PathBuf {
    let script = dir.join("dpkg-deb-stand-in.sh");
    fs::write(
        &script,
        "[ \"$1\" = --root-owner-group ] && [ \"$2\" = --build ] || { echo \"unexpected arguments: $*\" >&2; exit 2; }\n\
         [ -f \"$3/DEBIAN/control\" ] || { echo \"no control file\" >&2; exit 2; }\n\
         cat \"$3/DEBIAN/control\" > \"$4\"\n",
    )
    .unwrap();
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn staged_with_control(temp: &TempDir, control: &str) -> PathBuf {
        let root = temp.path().join("psu_0.1.0_all");
        fs::create_dir_all(root.join("DEBIAN")).unwrap();
        fs::write(root.join("DEBIAN/control"), control).unwrap();
        root
    }

    const CONTROL: &str = "Package: psu\nVersion: 0.1.0\nArchitecture: all\nMaintainer: PSU <psu@example.org>\nDescription: PSU interpreter\n HTML page scripting language.\n";

    fn identity() -> PackageIdentity {
        PackageIdentity::new("psu", "0.1.0", "all").unwrap()
    }

    #[test]
    fn test_parse_control() {
        let fields = parse_control(CONTROL);
        assert_eq!(fields["package"], "psu");
        assert_eq!(fields["architecture"], "all");
        assert_eq!(
            fields["description"],
            "PSU interpreter\nHTML page scripting language."
        );
    }

    #[test]
    fn test_control_matches_identity() {
        assert!(check_control_matches(&parse_control(CONTROL), &identity()).is_ok());
    }

    #[test]
    fn test_control_version_mismatch() {
        let other = PackageIdentity::new("psu", "0.2.0", "all").unwrap();
        let err = check_control_matches(&parse_control(CONTROL), &other).unwrap_err();
        assert!(err.contains("Version"));
    }

    #[test]
    fn test_control_missing_field() {
        let err =
            check_control_matches(&parse_control("Package: psu\nVersion: 0.1.0\n"), &identity())
                .unwrap_err();
        assert!(err.contains("Architecture"));
    }

    #[test]
    fn test_emit_without_control_file_is_validation_failure() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("psu_0.1.0_all");
        fs::create_dir_all(root.join("DEBIAN")).unwrap();

        let err = DebBackend::new(Path::new("DEBIAN"))
            .emit(&root, &identity())
            .unwrap_err();
        assert!(matches!(err, PackageError::BackendValidationFailure { .. }));
    }

    #[test]
    fn test_emit_validates_control_before_running_tool() {
        let temp = TempDir::new().unwrap();
        let root = staged_with_control(&temp, &CONTROL.replace("0.1.0", "0.0.9"));

        let err = DebBackend::with_command(Path::new("DEBIAN"), "no_such_dpkg_deb_xyz", &[])
            .emit(&root, &identity())
            .unwrap_err();
        match err {
            PackageError::BackendValidationFailure { detail, .. } => {
                assert!(detail.contains("Version"), "{detail}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_emit_runs_tool_with_build_arguments() {
        let temp = TempDir::new().unwrap();
        let root = staged_with_control(&temp, CONTROL);
        let script = write_stand_in_tool(temp.path());
        let backend =
            DebBackend::with_command(Path::new("DEBIAN"), "sh", &[script.to_str().unwrap()]);

        let artifact = backend.emit(&root, &identity()).unwrap();

        assert_eq!(artifact, temp.path().join("psu_0.1.0_all.deb"));
        assert_eq!(fs::read_to_string(&artifact).unwrap(), CONTROL);
        assert_eq!(backend.required_tools(), vec![("sh", "dpkg")]);
    }

    #[test]
    fn test_tool_failure_output_is_one_line() {
        let temp = TempDir::new().unwrap();
        let root = staged_with_control(&temp, CONTROL);
        let script = temp.path().join("failing.sh");
        fs::write(
            &script,
            "echo 'dpkg-deb: building package' ; printf 'dpkg-deb: error: parsing file\\n  bad Maintainer\\n' >&2 ; exit 2\n",
        )
        .unwrap();

        let err = DebBackend::with_command(Path::new("DEBIAN"), "sh", &[script.to_str().unwrap()])
            .emit(&root, &identity())
            .unwrap_err();

        let line = err.diagnostic();
        assert_eq!(line.lines().count(), 1, "{line}");
        assert!(line.contains("dpkg-deb: building package; dpkg-deb: error: parsing file; bad Maintainer"));
        assert!(!temp.path().join("psu_0.1.0_all.deb").exists());
    }

    #[test]
    fn test_emit_builds_deb_when_dpkg_available() {
        if which::which(DPKG_DEB).is_err() {
            eprintln!("skipping: {DPKG_DEB} not installed");
            return;
        }
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("psu_0.1.0_all");
        fs::create_dir_all(root.join("DEBIAN")).unwrap();
        fs::create_dir_all(root.join("usr/lib/psu/interpreter")).unwrap();
        fs::write(root.join("DEBIAN/control"), CONTROL).unwrap();
        fs::write(root.join("usr/lib/psu/interpreter/interp.bin"), "bin").unwrap();

        let artifact = DebBackend::new(Path::new("DEBIAN"))
            .emit(&root, &identity())
            .unwrap();
        assert_eq!(artifact, temp.path().join("psu_0.1.0_all.deb"));
        assert!(fs::metadata(&artifact).unwrap().len() > 0);
    }

    #[test]
    fn test_hints() {
        let backend = DebBackend::new(Path::new("DEBIAN"));
        assert_eq!(
            backend.install_hint("psu_0.1.0_all.deb", &identity()),
            "sudo dpkg -i psu_0.1.0_all.deb"
        );
        assert_eq!(
            backend.remove_hint("psu_0.1.0_all.deb", &identity()),
            "sudo dpkg -r psu"
        );
    }
}
