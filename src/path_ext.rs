//! Extended-path string transforms for long and UNC paths.
//!
//! Pure string rewriting with no I/O; callers apply these only on Windows to
//! shield the volume and file collaborators from MAX_PATH limits.

const EXTENDED_PREFIX: &str = r"\\?\";
const EXTENDED_UNC_PREFIX: &str = r"\\?\UNC\";

/// Rewrite a path to its extended form: `C:\x` → `\\?\C:\x`,
/// `\\server\share` → `\\?\UNC\server\share`. Already-extended paths pass
/// through unchanged.
pub fn extended_path(path: &str) -> String {
    if path.starts_with(EXTENDED_PREFIX) {
        path.to_string()
    } else if let Some(rest) = path.strip_prefix(r"\\") {
        format!("{EXTENDED_UNC_PREFIX}{rest}")
    } else {
        format!("{EXTENDED_PREFIX}{path}")
    }
}

/// Undo [`extended_path`], returning the plain form.
pub fn extended_path_undo(path: &str) -> String {
    if let Some(rest) = path.strip_prefix(EXTENDED_UNC_PREFIX) {
        format!(r"\\{rest}")
    } else if let Some(rest) = path.strip_prefix(EXTENDED_PREFIX) {
        rest.to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_path_drive() {
        assert_eq!(extended_path(r"C:\temp\file.dat"), r"\\?\C:\temp\file.dat");
    }

    #[test]
    fn test_extended_path_unc() {
        assert_eq!(
            extended_path(r"\\server\share\file.dat"),
            r"\\?\UNC\server\share\file.dat"
        );
    }

    #[test]
    fn test_extended_path_idempotent() {
        let once = extended_path(r"E:\fill001.dat");
        assert_eq!(extended_path(&once), once);
        let unc = extended_path(r"\\server\share");
        assert_eq!(extended_path(&unc), unc);
    }

    #[test]
    fn test_undo_drive() {
        assert_eq!(
            extended_path_undo(r"\\?\C:\temp\file.dat"),
            r"C:\temp\file.dat"
        );
    }

    #[test]
    fn test_undo_unc() {
        assert_eq!(
            extended_path_undo(r"\\?\UNC\server\share"),
            r"\\server\share"
        );
    }

    #[test]
    fn test_undo_plain_path_unchanged() {
        assert_eq!(extended_path_undo(r"C:\plain"), r"C:\plain");
    }

    #[test]
    fn test_round_trip() {
        for p in [r"C:\x\y.dat", r"\\host\vol\z.dat", r"E:\"] {
            assert_eq!(extended_path_undo(&extended_path(p)), p);
        }
    }
}
