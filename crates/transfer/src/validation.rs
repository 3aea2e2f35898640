use std::path::Path;

use crate::TransferError;

/// Validates a file name as it will appear on the remote side.
///
/// Rejects:
/// - Empty names
/// - `.` and `..`
/// - Path separators (`/`, `\`)
/// - Control characters
pub fn validate_remote_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }
    if name == "." || name == ".." {
        return Err(TransferError::InvalidName(format!(
            "relative directory not allowed: {name}"
        )));
    }
    if name.contains(['/', '\\']) {
        return Err(TransferError::InvalidName(format!(
            "path separator not allowed: {name}"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(TransferError::InvalidName(format!(
            "control character not allowed: {name:?}"
        )));
    }
    Ok(())
}

/// Resolves the remote name for a local file.
///
/// Uses `name` when given, otherwise the final component of `path`.
pub fn remote_file_name(path: &Path, name: Option<&str>) -> Result<String, TransferError> {
    let resolved = match name {
        Some(n) => n.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                TransferError::InvalidName(format!("no file name in {}", path.display()))
            })?,
    };
    validate_remote_name(&resolved)?;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_name() {
        assert!(validate_remote_name("").is_err());
    }

    #[test]
    fn rejects_dot_names() {
        assert!(validate_remote_name(".").is_err());
        assert!(validate_remote_name("..").is_err());
    }

    #[test]
    fn rejects_separators() {
        assert!(validate_remote_name("sub/file.txt").is_err());
        assert!(validate_remote_name("sub\\file.txt").is_err());
    }

    #[test]
    fn rejects_control_chars() {
        assert!(validate_remote_name("bad\nname").is_err());
    }

    #[test]
    fn accepts_plain_names() {
        assert!(validate_remote_name("mdfObjTemplate.json").is_ok());
        assert!(validate_remote_name(".hidden").is_ok());
        assert!(validate_remote_name("with space.csv").is_ok());
    }

    #[test]
    fn remote_name_from_path() {
        let name = remote_file_name(Path::new("/data/run1/scan.nii"), None).unwrap();
        assert_eq!(name, "scan.nii");
    }

    #[test]
    fn remote_name_override() {
        let name = remote_file_name(Path::new("/data/x.bin"), Some("renamed.bin")).unwrap();
        assert_eq!(name, "renamed.bin");
    }

    #[test]
    fn remote_name_override_validated() {
        assert!(remote_file_name(Path::new("/data/x.bin"), Some("../x")).is_err());
    }

    #[test]
    fn remote_name_requires_file_component() {
        assert!(remote_file_name(Path::new("/"), None).is_err());
    }
}
