use super::KeyValueStorage;
use crate::{Error, Result};
use std::path::PathBuf;

/// Stores each key as `<key>.json` inside a directory.
pub struct FileStorage {
    data_dir: PathBuf,
}

impl FileStorage {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(Error::InvalidData(format!("Invalid storage key: {}", key)));
        }
        Ok(self.data_dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        Ok(Some(content))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;

        // Write then rename so a crash mid-write never leaves a torn file.
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, value)?;
        std::fs::rename(tmp_path, path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_key_reads_none() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf());

        assert!(storage.read("task_timers").unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("nested"));

        storage.write("task_timers", "[]").unwrap();
        assert_eq!(storage.read("task_timers").unwrap().as_deref(), Some("[]"));
        assert!(temp_dir.path().join("nested/task_timers.json").exists());
        assert!(!temp_dir.path().join("nested/task_timers.json.tmp").exists());

        storage.write("task_timers", "[1]").unwrap();
        assert_eq!(storage.read("task_timers").unwrap().as_deref(), Some("[1]"));
    }

    #[test]
    fn test_rejects_path_keys() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf());

        assert!(storage.write("../outside", "[]").is_err());
        assert!(storage.read("a/b").is_err());
    }
}
