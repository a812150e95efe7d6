//! Harvest image and file references from final result text.
//!
//! The model writes markdown like `![chart](./attachments/cpu.png)` or
//! `[full log](logs/api.txt)` for artifacts it produced in the
//! workspace. We resolve those paths, verify containment (symlinks are
//! resolved and checked component-wise, not by string prefix), and
//! return base64 payloads for the chat surface to upload.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;

use ifox_domain::event::{HarvestedFile, HarvestedImage};

/// Images above this size are dropped (5 MiB).
pub const MAX_IMAGE_SIZE: u64 = 5 * 1024 * 1024;
/// Files above this size are dropped (1 GiB, the chat-surface cap).
pub const MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;
/// At most this many files per message.
pub const MAX_FILES_PER_MESSAGE: usize = 10;

const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "ico"];

fn media_type_for(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "csv" => "text/csv",
        "html" => "text/html",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Resolve a markdown path against the workspace and verify the
/// resolved target stays inside it. Returns `None` for external URLs,
/// anchors, and anything that escapes the root.
fn resolve_contained(workspace: &Path, raw: &str) -> Option<PathBuf> {
    if raw.starts_with("http://")
        || raw.starts_with("https://")
        || raw.starts_with("data:")
        || raw.starts_with("mailto:")
        || raw.starts_with("tel:")
        || raw.starts_with('#')
    {
        return None;
    }

    let candidate = if let Some(rest) = raw.strip_prefix("./") {
        workspace.join(rest)
    } else if raw.starts_with('/') {
        let path = Path::new(raw);
        // Absolute paths must already sit under the workspace root.
        if !path.starts_with(workspace) {
            tracing::warn!(path = raw, "rejecting absolute path outside workspace");
            return None;
        }
        path.to_path_buf()
    } else {
        workspace.join(raw)
    };

    // Resolve symlinks on both sides; containment is checked on
    // components, so `/workspacefoo` cannot slip past `/workspace`.
    let workspace_real = workspace.canonicalize().ok()?;
    let resolved = candidate.canonicalize().ok()?;
    if resolved != workspace_real && !resolved.starts_with(&workspace_real) {
        tracing::warn!(path = raw, "skipping path outside workspace");
        return None;
    }
    Some(resolved)
}

/// Extract embedded images (`![alt](path)`) from result text.
pub fn extract_images(workspace: &Path, text: &str) -> Vec<HarvestedImage> {
    let pattern = Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("static regex");
    let mut images = Vec::new();

    for captures in pattern.captures_iter(text) {
        let alt = captures.get(1).map(|m| m.as_str()).unwrap_or("");
        let raw_path = captures.get(2).map(|m| m.as_str()).unwrap_or("");

        let Some(resolved) = resolve_contained(workspace, raw_path) else {
            continue;
        };
        let Ok(meta) = resolved.metadata() else {
            tracing::warn!(path = raw_path, "image not found");
            continue;
        };
        if meta.len() > MAX_IMAGE_SIZE {
            tracing::warn!(path = raw_path, size = meta.len(), "image too large, dropping");
            continue;
        }
        let media_type = media_type_for(&resolved);
        if !media_type.starts_with("image/") {
            tracing::warn!(path = raw_path, media_type = %media_type, "not an image type");
            continue;
        }
        let Ok(bytes) = std::fs::read(&resolved) else {
            continue;
        };
        images.push(HarvestedImage {
            path: raw_path.to_string(),
            data: BASE64.encode(&bytes),
            media_type,
            alt: if alt.is_empty() {
                resolved
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            } else {
                alt.to_string()
            },
        });
    }
    images
}

/// Extract non-image file links (`[desc](path)`) from result text.
pub fn extract_files(workspace: &Path, text: &str) -> Vec<HarvestedFile> {
    // The regex crate has no lookbehind; capture the preceding char and
    // skip matches that are actually image syntax.
    let pattern = Regex::new(r"(^|[^!])\[([^\]]+)\]\(([^)]+)\)").expect("static regex");
    let mut files = Vec::new();

    for captures in pattern.captures_iter(text) {
        let description = captures.get(2).map(|m| m.as_str()).unwrap_or("");
        let raw_path = captures.get(3).map(|m| m.as_str()).unwrap_or("");

        let Some(resolved) = resolve_contained(workspace, raw_path) else {
            continue;
        };
        if resolved.is_dir() {
            continue;
        }
        let ext = resolved
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            continue; // handled by extract_images
        }
        let Ok(meta) = resolved.metadata() else {
            continue;
        };
        if meta.len() > MAX_FILE_SIZE {
            tracing::warn!(path = raw_path, size = meta.len(), "file too large, dropping");
            continue;
        }
        if files.len() >= MAX_FILES_PER_MESSAGE {
            tracing::warn!(path = raw_path, "file limit reached, dropping");
            continue;
        }
        let Ok(bytes) = std::fs::read(&resolved) else {
            continue;
        };
        files.push(HarvestedFile {
            path: raw_path.to_string(),
            data: BASE64.encode(&bytes),
            media_type: media_type_for(&resolved),
            filename: resolved
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            description: description.to_string(),
            size: meta.len(),
        });
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chart.png"), b"\x89PNG fake").unwrap();
        std::fs::write(dir.path().join("report.txt"), b"all good").unwrap();
        dir
    }

    #[test]
    fn image_reference_is_harvested() {
        let ws = workspace();
        let images = extract_images(ws.path(), "See ![cpu](./chart.png) above");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].alt, "cpu");
        assert_eq!(images[0].media_type, "image/png");
        assert_eq!(BASE64.decode(&images[0].data).unwrap(), b"\x89PNG fake");
    }

    #[test]
    fn external_urls_are_skipped() {
        let ws = workspace();
        assert!(extract_images(ws.path(), "![x](https://example.com/a.png)").is_empty());
        assert!(extract_files(ws.path(), "[doc](https://example.com/a.txt)").is_empty());
        assert!(extract_files(ws.path(), "[anchor](#section)").is_empty());
    }

    #[test]
    fn escape_attempts_are_rejected() {
        let ws = workspace();
        let outside = tempfile::NamedTempFile::new().unwrap();
        let abs = outside.path().display().to_string();
        assert!(extract_files(ws.path(), &format!("[secrets]({abs})")).is_empty());
        assert!(extract_files(ws.path(), "[up](../../../etc/passwd)").is_empty());
    }

    #[test]
    fn symlink_out_of_workspace_is_rejected() {
        let ws = workspace();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"shh").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            ws.path().join("link.txt"),
        )
        .unwrap();
        assert!(extract_files(ws.path(), "[leak](link.txt)").is_empty());
    }

    #[test]
    fn files_exclude_images_and_respect_limit() {
        let ws = workspace();
        let text = "![c](chart.png) and [r](report.txt)";
        let files = extract_files(ws.path(), text);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "report.txt");
        assert_eq!(files[0].description, "r");

        // Per-message cap.
        let mut many = String::new();
        for i in 0..15 {
            let name = format!("f{i}.txt");
            std::fs::write(ws.path().join(&name), b"x").unwrap();
            many.push_str(&format!("[f{i}]({name}) "));
        }
        assert_eq!(extract_files(ws.path(), &many).len(), MAX_FILES_PER_MESSAGE);
    }

    #[test]
    fn oversized_image_is_dropped() {
        let ws = workspace();
        let big = vec![0u8; (MAX_IMAGE_SIZE + 1) as usize];
        std::fs::write(ws.path().join("huge.png"), &big).unwrap();
        assert!(extract_images(ws.path(), "![h](huge.png)").is_empty());
    }

    #[test]
    fn image_link_is_not_double_counted_as_file() {
        let ws = workspace();
        let images = extract_images(ws.path(), "![c](chart.png)");
        let files = extract_files(ws.path(), "![c](chart.png)");
        assert_eq!(images.len(), 1);
        assert!(files.is_empty());
    }
}
