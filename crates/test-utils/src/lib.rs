//! Shared test utilities for the sync target cache crates.
//!
//! - [`TestDir`] - Managed temporary directory with path helpers
//! - [`strategies`] - Proptest generators for document keys, queries,
//!   targets and membership-change sequences

#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod test_dir;
pub use test_dir::TestDir;

pub mod strategies;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_creates_temp_directory() {
        let dir = TestDir::new();
        assert!(dir.path().exists(), "temp directory should exist");
        assert!(dir.path().is_dir(), "should be a directory");
    }

    #[test]
    fn test_dir_join_stays_inside_directory() {
        let dir = TestDir::new();
        let subpath = dir.join("cache/targets.db");
        assert!(subpath.starts_with(dir.path()));
        assert!(subpath.ends_with("cache/targets.db"));
    }

    #[test]
    fn test_dir_cleanup_on_drop() {
        let path = {
            let dir = TestDir::new();
            let p = dir.path().to_path_buf();
            std::fs::write(p.join("file.txt"), "data").expect("write file");
            assert!(p.exists());
            p
        };
        assert!(!path.exists(), "temp directory should be cleaned up on drop");
    }
}
