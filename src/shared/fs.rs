//! Usage: Atomic file replacement (temp sibling + rename) for artifacts read by other programs.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path.file_name().and_then(|v| v.to_str()).unwrap_or("file");
    path.with_file_name(format!(".{file_name}.{}.setup-tmp", std::process::id()))
}

fn open_private(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// Write `bytes` to `path` so readers see either the old content or the new one, never a mix.
///
/// The parent directory is created when missing. The target is replaced by a rename and is
/// never removed beforehand.
pub(crate) fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create dir {}: {e}", parent.display()))?;
    }

    let tmp_path = temp_sibling(path);
    let written = open_private(&tmp_path).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(format!(
            "failed to write temp file {}: {e}",
            tmp_path.display()
        ));
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(format!("failed to finalize file {}: {e}", path.display()));
    }

    Ok(())
}
