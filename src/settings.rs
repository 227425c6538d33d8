use crate::errors::{AppError, AppResult};
use crate::models::AppSettings;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Current settings plus the file they are persisted to, if any.
#[derive(Debug)]
pub struct SettingsStore {
    current: RwLock<AppSettings>,
    path: Option<PathBuf>,
}

impl SettingsStore {
    pub fn in_memory(settings: AppSettings) -> Self {
        Self {
            current: RwLock::new(settings),
            path: None,
        }
    }

    /// Loads from `path`; a missing file yields defaults and is created on the first update.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let settings = if path.exists() {
            load_settings(&path)?
        } else {
            AppSettings::default()
        };
        Ok(Self {
            current: RwLock::new(settings),
            path: Some(path),
        })
    }

    pub fn get(&self) -> AppSettings {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn update(&self, patch: serde_json::Value) -> AppResult<AppSettings> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let updated = apply_patch(&current, patch)?;
        if let Some(path) = &self.path {
            save_settings(path, &updated)?;
        }
        *current = updated.clone();
        tracing::info!(
            default_sort = updated.default_sort.as_str(),
            max_undo_depth = ?updated.max_undo_depth,
            "settings updated"
        );
        Ok(updated)
    }
}

enum Format {
    Json,
    Yaml,
}

fn format_of(path: &Path) -> AppResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("yaml") | Some("yml") => Ok(Format::Yaml),
        _ => Err(AppError::Validation(format!(
            "Unsupported settings file {}; expected .json, .yaml or .yml",
            path.display()
        ))),
    }
}

/// Reads settings from a JSON or YAML file. Missing keys take their defaults.
pub fn load_settings(path: &Path) -> AppResult<AppSettings> {
    let format = format_of(path)?;
    let raw = std::fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(AppSettings::default());
    }
    let settings = match format {
        Format::Json => serde_json::from_str(&raw)?,
        Format::Yaml => serde_yaml::from_str(&raw)?,
    };
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> AppResult<()> {
    let raw = match format_of(path)? {
        Format::Json => serde_json::to_string_pretty(settings)?,
        Format::Yaml => serde_yaml::to_string(settings)?,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, raw)?;
    Ok(())
}

/// Deep-merges a camelCase JSON patch over `current`.
pub fn apply_patch(current: &AppSettings, patch: serde_json::Value) -> AppResult<AppSettings> {
    let mut merged = serde_json::to_value(current)?;
    merge_json(&mut merged, patch);
    serde_json::from_value(merged).map_err(|error| AppError::Validation(format!("Invalid settings: {}", error)))
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
