//! Container allow-list.

use std::path::Path;

/// Input container extensions accepted for conversion.
pub const SUPPORTED_CONTAINERS: &[&str] = &["mp4", "mov", "avi", "mkv"];

/// Check whether the file extension is an accepted container (case-insensitive).
pub fn is_supported_container(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_CONTAINERS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_containers() {
        assert!(is_supported_container("/tmp/in.mp4"));
        assert!(is_supported_container("/tmp/in.MOV"));
        assert!(is_supported_container("clip.avi"));
        assert!(is_supported_container("movie.final.mkv"));
    }

    #[test]
    fn test_unsupported_containers() {
        assert!(!is_supported_container("/tmp/in.webm"));
        assert!(!is_supported_container("/tmp/in.mp4.part"));
        assert!(!is_supported_container("/tmp/noext"));
        assert!(!is_supported_container("/tmp/.mp4"));
    }
}
