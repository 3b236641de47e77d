use crate::foundation::util::random::random_hex;
use crate::foundation::{ItestError, NAME_SUFFIX_BYTES};
use log::debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const MAX_DIR_ATTEMPTS: usize = 16;

/// Creates fresh, empty directories `<base>/<prefix><8 hex>` below a base directory.
#[derive(Clone, Debug)]
pub struct DirAllocator {
    base: PathBuf,
}

impl DirAllocator {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Never reuses an existing path: `create_dir` fails on collisions and the name is redrawn.
    pub fn allocate(&self, prefix: &str) -> Result<PathBuf, ItestError> {
        for _ in 0..MAX_DIR_ATTEMPTS {
            let path = self.base.join(format!("{prefix}{}", random_hex(NAME_SUFFIX_BYTES)));
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    debug!("allocated directory path={}", path.display());
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(ItestError::resource_exhausted("directory", format!("create {}: {err}", path.display())));
                }
            }
        }
        Err(ItestError::resource_exhausted(
            "directory",
            format!("no fresh name for prefix {prefix} under {} after {MAX_DIR_ATTEMPTS} attempts", self.base.display()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_fresh_empty_dirs() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let allocator = DirAllocator::new(tmp.path());
        let first = allocator.allocate("fp-").expect("dir");
        let second = allocator.allocate("fp-").expect("dir");

        assert_ne!(first, second);
        assert!(first.is_dir());
        assert_eq!(std::fs::read_dir(&first).expect("read_dir").count(), 0);
        let name = first.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("fp-"));
        assert_eq!(name.len(), "fp-".len() + 2 * NAME_SUFFIX_BYTES);
    }

    #[test]
    fn test_missing_base_is_resource_exhausted() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let allocator = DirAllocator::new(tmp.path().join("missing").join("deeper"));
        let err = allocator.allocate("x-").unwrap_err();
        assert!(matches!(err, ItestError::ResourceExhausted { ref resource, .. } if resource == "directory"));
    }
}
