use std::io::Write;
use std::path::Path;

/// Replace `path` with `data` so readers see either the old or the new file.
///
/// The data is written to a uniquely named sibling first and then renamed
/// over the target.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    let file_name = path
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("data");
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let pid = std::process::id();

    for attempt in 0..16_u8 {
        let tmp_path = parent.join(format!(".{file_name}.{pid}.{stamp}.{attempt}.tmp"));
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(error) => return Err(error),
        };

        let written = file
            .write_all(data)
            .and_then(|()| file.sync_all())
            .and_then(|()| std::fs::rename(&tmp_path, path));
        if written.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        return written;
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        "failed to create a unique temp file",
    ))
}

#[cfg(test)]
mod tests {
    use super::write_atomic;

    #[test]
    fn replaces_existing_file_without_leftovers() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("scripts.json");
        std::fs::write(&path, "old").expect("seed file should be written");

        write_atomic(&path, b"new").expect("atomic write should succeed");

        assert_eq!(
            std::fs::read_to_string(&path).expect("file should be readable"),
            "new"
        );
        let leftovers = std::fs::read_dir(temp_dir.path())
            .expect("read temp dir entries")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn missing_parent_directory_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("missing").join("settings.json");

        assert!(write_atomic(&path, b"{}").is_err());
    }
}
