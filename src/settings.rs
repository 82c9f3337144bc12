use crate::error::SettingsError;
use serde_json::{Map, Value as JsonValue};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONFIG: &str = include_str!("../config/pen-deck.yaml");
pub const CONFIG_FILE_NAME: &str = "pen-deck.yaml";

pub struct Settings {
    path: Option<PathBuf>,
    value: JsonValue,
    // the file did not exist and was written from the defaults
    created: bool,
}

#[derive(Clone, Debug)]
pub struct SystemSettings {
    pub results_directory: PathBuf,
    pub auto_save_results: bool,
    pub max_results_files: usize,
    pub scan_timeout: Duration,
    pub cancel_grace: Duration,
    pub max_output_bytes: usize,
    pub log_level: String,
    pub log_directory: PathBuf,
    pub visible_rows: usize,
}

pub fn get_by_path<'a>(v: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut cur = v;
    for seg in path.split('.') {
        cur = cur.get(seg)?;
    }
    Some(cur)
}

/// Deep-merge `user` over `base`: mappings merge key by key, anything else replaces.
pub fn merge_values(base: &mut JsonValue, user: JsonValue) {
    match (base, user) {
        (JsonValue::Object(b), JsonValue::Object(u)) => {
            for (k, v) in u {
                match b.get_mut(&k) {
                    Some(slot) if slot.is_object() && v.is_object() => merge_values(slot, v),
                    _ => {
                        b.insert(k, v);
                    }
                }
            }
        }
        (b, u) => *b = u,
    }
}

fn parse_yaml(text: &str, path: &Path) -> Result<JsonValue, SettingsError> {
    let v: JsonValue = serde_yaml::from_str(text).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    // An empty document parses as null; treat it as an empty mapping.
    Ok(if v.is_null() {
        JsonValue::Object(Map::new())
    } else {
        v
    })
}

impl Settings {
    pub fn defaults() -> Result<Self, SettingsError> {
        let value = parse_yaml(DEFAULT_CONFIG, Path::new("<embedded>"))?;
        Ok(Self {
            path: None,
            value,
            created: false,
        })
    }

    /// Load `path` merged over the embedded defaults. A missing file is created from
    /// the defaults so the operator has something to edit.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let mut settings = Self::defaults()?;
        settings.path = Some(path.to_path_buf());
        if path.exists() {
            let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let user = parse_yaml(&text, path)?;
            merge_values(&mut settings.value, user);
        } else {
            settings.save()?;
            settings.created = true;
        }
        Ok(settings)
    }

    #[cfg(test)]
    pub fn from_value(value: JsonValue) -> Self {
        Self {
            path: None,
            value,
            created: false,
        }
    }

    pub fn value(&self) -> &JsonValue {
        &self.value
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn created(&self) -> bool {
        self.created
    }

    pub fn base_dir(&self) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn get(&self, key_path: &str) -> Option<&JsonValue> {
        get_by_path(&self.value, key_path)
    }

    pub fn get_str(&self, key_path: &str, default: &str) -> String {
        self.get(key_path)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    }

    pub fn get_u64(&self, key_path: &str, default: u64) -> u64 {
        self.get(key_path).and_then(|v| v.as_u64()).unwrap_or(default)
    }

    pub fn get_bool(&self, key_path: &str, default: bool) -> bool {
        self.get(key_path)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    // Entry point for the web front end's settings page.
    #[allow(dead_code)]
    pub fn set(&mut self, key_path: &str, value: JsonValue) -> Result<(), SettingsError> {
        let segments: Vec<&str> = key_path.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(SettingsError::EmptyPath(key_path.to_string()));
        };
        let mut cur = &mut self.value;
        for seg in parents {
            let obj = cur
                .as_object_mut()
                .ok_or_else(|| SettingsError::NotAMapping {
                    path: key_path.to_string(),
                    segment: seg.to_string(),
                })?;
            cur = obj
                .entry(seg.to_string())
                .or_insert_with(|| JsonValue::Object(Map::new()));
        }
        let obj = cur
            .as_object_mut()
            .ok_or_else(|| SettingsError::NotAMapping {
                path: key_path.to_string(),
                segment: last.to_string(),
            })?;
        obj.insert(last.to_string(), value);
        debug!(key_path, "setting updated");
        self.save()
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = serde_yaml::to_string(&self.value)?;
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|source| SettingsError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }
        fs::write(path, text).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })
    }

    pub fn system(&self) -> SystemSettings {
        let base = self.base_dir();
        let resolve = |p: String| {
            let pb = PathBuf::from(p);
            if pb.is_absolute() {
                pb
            } else {
                base.join(pb)
            }
        };
        SystemSettings {
            results_directory: resolve(self.get_str("system.results_directory", "results")),
            auto_save_results: self.get_bool("system.auto_save_results", true),
            max_results_files: self.get_u64("system.max_results_files", 100) as usize,
            scan_timeout: Duration::from_secs(self.get_u64("system.scan_timeout_seconds", 1800)),
            cancel_grace: Duration::from_millis(self.get_u64("system.cancel_grace_ms", 3000)),
            max_output_bytes: self.get_u64("system.max_output_bytes", 1 << 20) as usize,
            log_level: self.get_str("system.log_level", "info"),
            log_directory: resolve(self.get_str("system.log_directory", "logs")),
            visible_rows: self.get_u64("display.visible_rows", 6).max(1) as usize,
        }
    }
}
