use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine;
use chrono::Datelike;

use crate::source::RemoteItem;
use crate::types::{FileMatchPolicy, FolderLayout, Timezone};

/// Build the local path for an item under `directory`.
///
/// `FolderLayout::YearMonth` partitions by the declared timestamp converted
/// into `timezone`, e.g. `2024/02/IMG_0001.JPG`.
pub fn local_download_path(
    directory: &Path,
    layout: FolderLayout,
    timezone: Timezone,
    item: &RemoteItem,
    filename: &str,
) -> PathBuf {
    let clean = clean_filename(filename);
    match layout {
        FolderLayout::Flat => directory.join(clean),
        FolderLayout::YearMonth => {
            let local = timezone.convert(item.timestamp);
            directory
                .join(format!("{:04}", local.year()))
                .join(format!("{:02}", local.month()))
                .join(clean)
        }
    }
}

/// Clean a filename by removing characters that are invalid on common
/// filesystems: `/`, `\`, `:`, `*`, `?`, `"`, `<`, `>`, `|`.
pub fn clean_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

/// First 7 characters of the base64-encoded item id.
fn base64_id7(id: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(id.as_bytes());
    encoded.chars().take(7).collect()
}

/// Insert the id7 suffix before the extension: `IMG_0001.JPG` →
/// `IMG_0001_QUJDMTI.JPG`.
pub fn apply_name_id7(filename: &str, id: &str) -> String {
    let suffix = base64_id7(id);
    match filename.rfind('.') {
        Some(dot) => {
            let (stem, ext) = filename.split_at(dot);
            format!("{}_{}{}", stem, suffix, ext)
        }
        None => format!("{}_{}", filename, suffix),
    }
}

/// Append the staging suffix to a final path: `a/b.jpg` → `a/b.jpg.temp`.
pub fn staging_path(final_path: &Path, suffix: &str) -> PathBuf {
    let mut os = final_path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Maps every item in one listing to a distinct local path.
///
/// Display filenames are not unique in a remote library. Under
/// `FileMatchPolicy::Name`, the first item to claim a path keeps the plain
/// name and every later claimant gets the id7 suffix. Built from the whole
/// listing (including items the cursor will skip) so the assignment is the
/// same on every run over the same listing.
#[derive(Debug, Default)]
pub struct PathPlan {
    paths: HashMap<String, PathBuf>,
}

impl PathPlan {
    pub fn build(
        items: &[RemoteItem],
        directory: &Path,
        layout: FolderLayout,
        timezone: Timezone,
        policy: FileMatchPolicy,
    ) -> Self {
        let mut paths = HashMap::with_capacity(items.len());
        let mut claimed: HashMap<PathBuf, &str> = HashMap::with_capacity(items.len());

        for item in items {
            // Paging can return the same record twice if the library shifts
            // mid-listing; the first occurrence keeps its path.
            if paths.contains_key(&item.id) {
                tracing::debug!(item = %item.id, "Repeated in listing, keeping first path");
                continue;
            }
            let name = match policy {
                FileMatchPolicy::Name => item.filename.clone(),
                FileMatchPolicy::NameId7 => apply_name_id7(&item.filename, &item.id),
            };
            let mut path = local_download_path(directory, layout, timezone, item, &name);
            if let Some(owner) = claimed.get(&path) {
                let deduped = apply_name_id7(&item.filename, &item.id);
                let deduped_path = local_download_path(directory, layout, timezone, item, &deduped);
                tracing::warn!(
                    item = %item.id,
                    "{} is also claimed by {}; using {}",
                    path.display(),
                    owner,
                    deduped_path.display()
                );
                path = deduped_path;
            }
            claimed.insert(path.clone(), &item.id);
            paths.insert(item.id.clone(), path);
        }

        Self { paths }
    }

    pub fn path_for(&self, item: &RemoteItem) -> Option<&Path> {
        self.paths.get(&item.id).map(PathBuf::as_path)
    }
}
