use std::path::{Component, Path, PathBuf};

/// Extensions the watcher and scanner treat as audio (compared case-insensitively).
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "flac", "aiff"];

pub fn is_audio_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// True if any component of `path` below `root` is a dotfile or dot-directory.
/// Components of `root` itself are not considered.
pub fn is_hidden_within(root: &Path, path: &Path) -> bool {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components().any(|c| match c {
        Component::Normal(name) => name.to_str().map(|s| s.starts_with('.')).unwrap_or(false),
        _ => false,
    })
}

/// Resolves `path` to the key it is cataloged under: absolute, with `.` and
/// `..` folded away and the parent directory canonicalized when it still
/// exists. The final component is kept as given so removed files resolve to
/// the same key they were stored under.
pub fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let normal = normalize_lexically(&joined);
    if let (Some(parent), Some(name)) = (normal.parent(), normal.file_name()) {
        if let Ok(dir) = std::fs::canonicalize(parent) {
            return Ok(dir.join(name));
        }
    }
    Ok(normal)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root.
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The catalog key for a path.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
