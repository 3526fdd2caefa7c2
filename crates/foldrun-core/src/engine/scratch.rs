use crate::core::io::fasta::format_fasta;
use crate::core::models::target::ChainSequence;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A scratch file that is removed when the guard goes out of scope.
///
/// Every stage that hands sequences to an external tool writes them to the same
/// per-process path, `<dir>/tmp_<pid>.fasta`, so at most one scratch FASTA
/// exists at a time.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn fasta_path(dir: &Path) -> PathBuf {
        dir.join(format!("tmp_{}.fasta", std::process::id()))
    }

    /// Writes `records` as FASTA to the per-process scratch path.
    pub fn fasta(dir: &Path, records: &[ChainSequence]) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = Self::fasta_path(dir);
        fs::write(&path, format_fasta(records))?;
        Ok(Self { path })
    }

    /// Claims `<dir>/<name>` for a file an external tool will create.
    pub fn reserve(dir: &Path, name: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fasta_scratch_is_removed_on_drop() {
        let dir = tempdir().unwrap();
        let path = {
            let scratch =
                ScratchFile::fasta(dir.path(), &[ChainSequence::new("A", "MKV")]).unwrap();
            assert_eq!(fs::read_to_string(scratch.path()).unwrap(), ">A\nMKV");
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn reserved_path_tolerates_never_being_created() {
        let dir = tempdir().unwrap();
        let scratch = ScratchFile::reserve(&dir.path().join("nested"), "features.npz").unwrap();
        assert!(scratch.path().parent().unwrap().is_dir());
        drop(scratch);
    }
}
