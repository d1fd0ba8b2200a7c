//! Local image files and their task identifiers.
use crate::{err, Error};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Asset {
    pub path: PathBuf,
    pub file_name: String,
    /// File name up to the first `.`; stable key of the asset across upload and catalog.
    pub task_id: String,
    pub sort_key: u64,
}

/// Numeric sort key of `<name>_<number>.<ext>` or `<number>.<ext>`.
pub fn sort_key(file_name: &str) -> Option<u64> {
    let stem = task_id(file_name);
    let digits = stem.rsplit('_').next().unwrap_or(stem);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn task_id(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

impl Asset {
    pub fn from_path(path: PathBuf) -> Result<Self, Error> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .context(err::MalformedFileName {
                file_name: path.display().to_string(),
            })?
            .to_string();
        let sort_key = sort_key(&file_name).context(err::MalformedFileName {
            file_name: file_name.clone(),
        })?;
        Ok(Self {
            task_id: task_id(&file_name).to_string(),
            path,
            file_name,
            sort_key,
        })
    }
}

/// All regular, non-hidden files directly inside `dir`, ordered by ascending numeric suffix
/// (ties broken by file name). Symbolic links are followed.
///
/// Fails on the first file name without a numeric suffix, and when two files share a task id.
pub fn enumerate_assets(dir: &Path) -> Result<Vec<Asset>, Error> {
    let mut assets = Vec::new();
    let entries = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true);
    for entry in entries {
        let entry = entry.context(err::WalkDir)?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            debug!(path = %entry.path().display(), "skipping hidden entry");
            continue;
        }
        if !entry.file_type().is_file() {
            warn!(path = %entry.path().display(), "skipping entry that is not a file");
            continue;
        }
        assets.push(Asset::from_path(entry.into_path())?);
    }
    assets.sort_by(|a, b| {
        a.sort_key
            .cmp(&b.sort_key)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });

    let mut seen = HashSet::new();
    for asset in &assets {
        ensure!(
            seen.insert(asset.task_id.as_str()),
            err::DuplicateTaskId {
                task_id: asset.task_id.clone(),
                dir: dir.display().to_string(),
            }
        );
    }
    Ok(assets)
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn sort_keys() {
        assert_eq!(sort_key("Task_000042.jpg"), Some(42));
        assert_eq!(sort_key("17.jpg"), Some(17));
        assert_eq!(sort_key("a_b_3.tar.gz"), Some(3));
        assert_eq!(sort_key("Task_.jpg"), None);
        assert_eq!(sort_key("cover.jpg"), None);
        assert_eq!(sort_key("Task_12a.jpg"), None);
        assert_eq!(task_id("Task_000042.jpg"), "Task_000042");
    }

    #[test]
    fn numeric_order_not_lexical() {
        let tmp_dir = TempDir::new("assets").unwrap();
        let dir = tmp_dir.path();
        for i in &[10, 2, 1, 33, 100] {
            std::fs::write(dir.join(format!("img_{}.jpg", i)), "x").unwrap();
        }
        std::fs::create_dir(dir.join("nested_5")).unwrap();
        std::fs::write(dir.join(".DS_Store"), "x").unwrap();

        let ids: Vec<_> = enumerate_assets(dir)
            .unwrap()
            .into_iter()
            .map(|a| a.task_id)
            .collect();
        assert_eq!(ids, vec!["img_1", "img_2", "img_10", "img_33", "img_100"]);
    }

    #[test]
    fn malformed_name_is_an_error() {
        let tmp_dir = TempDir::new("assets").unwrap();
        std::fs::write(tmp_dir.path().join("Task_1.jpg"), "x").unwrap();
        std::fs::write(tmp_dir.path().join("notes.txt"), "x").unwrap();
        match enumerate_assets(tmp_dir.path()) {
            Err(Error::MalformedFileName { file_name }) => assert_eq!(file_name, "notes.txt"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn duplicate_task_id_is_an_error() {
        let tmp_dir = TempDir::new("assets").unwrap();
        std::fs::write(tmp_dir.path().join("Task_1.jpg"), "x").unwrap();
        std::fs::write(tmp_dir.path().join("Task_1.png"), "x").unwrap();
        assert!(matches!(
            enumerate_assets(tmp_dir.path()),
            Err(Error::DuplicateTaskId { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_images_are_listed() {
        let store = TempDir::new("assets-store").unwrap();
        let tmp_dir = TempDir::new("assets").unwrap();
        std::fs::write(store.path().join("Task_2.jpg"), "x").unwrap();
        std::fs::write(tmp_dir.path().join("Task_1.jpg"), "x").unwrap();
        std::os::unix::fs::symlink(
            store.path().join("Task_2.jpg"),
            tmp_dir.path().join("Task_2.jpg"),
        )
        .unwrap();

        let ids: Vec<_> = enumerate_assets(tmp_dir.path())
            .unwrap()
            .into_iter()
            .map(|a| a.task_id)
            .collect();
        assert_eq!(ids, vec!["Task_1", "Task_2"]);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_an_error() {
        let tmp_dir = TempDir::new("assets").unwrap();
        std::os::unix::fs::symlink(
            tmp_dir.path().join("gone.jpg"),
            tmp_dir.path().join("Task_1.jpg"),
        )
        .unwrap();
        assert!(matches!(
            enumerate_assets(tmp_dir.path()),
            Err(Error::WalkDir { .. })
        ));
    }

    #[test]
    fn empty_dir() {
        let tmp_dir = TempDir::new("assets").unwrap();
        assert!(enumerate_assets(tmp_dir.path()).unwrap().is_empty());
    }
}
