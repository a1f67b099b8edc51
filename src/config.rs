//! Persisted user settings.
//!
//! `Settings` is a flat, typed record. The `settings!` macro below generates the struct, its
//! defaults and a static registry (`SETTINGS`) that maps every field name to its type, so that
//! panels can bind fields by name without reflection. `ConfigStore` owns the live record and
//! flushes it to disk after every mutation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::logging::Transcript;

pub const APP_NAME: &str = "raggen-ui";
const SETTINGS_FILE: &str = "settings.json";

/// Errors raised while reading, writing or mutating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown setting '{0}'")]
    UnknownField(String),
    #[error("setting '{field}' expects {expected:?}, got {found:?}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: FieldType,
    },
    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Int,
    Bool,
}

/// A dynamically typed settings value, used at the panel/widget boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Text(_) => FieldType::Text,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Bool(_) => FieldType::Bool,
        }
    }

    /// Convert a JSON value into a field value of the requested type, if it matches.
    fn from_json(ty: FieldType, value: &Value) -> Option<Self> {
        match ty {
            FieldType::Text => value.as_str().map(|s| FieldValue::Text(s.to_string())),
            FieldType::Int => value.as_i64().map(FieldValue::Int),
            FieldType::Bool => value.as_bool().map(FieldValue::Bool),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Int(n) => write!(f, "{n}"),
            FieldValue::Bool(b) => f.write_str(if *b { "[x]" } else { "[ ]" }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingSpec {
    pub name: &'static str,
    pub ty: FieldType,
}

macro_rules! settings {
    (@ty Text) => { String };
    (@ty Int) => { i64 };
    (@ty Bool) => { bool };
    ($( $(#[$doc:meta])* $name:ident : $kind:ident = $default:expr ),* $(,)?) => {
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct Settings {
            $( $(#[$doc])* pub $name: settings!(@ty $kind), )*
        }

        impl Default for Settings {
            fn default() -> Self {
                Self { $( $name: $default, )* }
            }
        }

        /// Every persisted field with its static type.
        pub const SETTINGS: &[SettingSpec] = &[
            $( SettingSpec { name: stringify!($name), ty: FieldType::$kind }, )*
        ];

        impl Settings {
            pub fn get(&self, name: &str) -> Option<FieldValue> {
                $(
                    if name == stringify!($name) {
                        return Some(FieldValue::$kind(self.$name.clone()));
                    }
                )*
                None
            }

            /// Write a field by name, rejecting unknown names and mismatched types.
            pub fn set(&mut self, name: &str, value: FieldValue) -> Result<(), ConfigError> {
                $(
                    if name == stringify!($name) {
                        return match value {
                            FieldValue::$kind(v) => {
                                self.$name = v;
                                Ok(())
                            }
                            other => Err(ConfigError::TypeMismatch {
                                field: name.to_string(),
                                expected: FieldType::$kind,
                                found: other.field_type(),
                            }),
                        };
                    }
                )*
                Err(ConfigError::UnknownField(name.to_string()))
            }
        }
    };
}

settings! {
    /// Directory of the most recently selected document.
    file_path: Text = home_dir().display().to_string(),
    /// Default target of the save dialog.
    save_path: Text = home_dir().join("chunks.json").display().to_string(),
    /// External command used for PDF/DOCX conversion (`{input}` is replaced by the path).
    converter_command: Text = String::new(),
    languages: Text = "en".to_string(),
    force_ocr: Bool = true,
    use_llm: Bool = false,
    llm_base_url: Text = String::new(),
    llm_api_key: Text = String::new(),
    llm_model: Text = "gpt-4o-mini".to_string(),
    /// Upper bound for a chunk body, in characters.
    chunk_size: Int = 256,
    embed_metadata: Bool = false,
    include_title: Bool = true,
    qdrant_url: Text = "http://127.0.0.1:6333".to_string(),
    qdrant_key: Text = String::new(),
    sparse_model: Text = "Qdrant/bm25".to_string(),
    dense_model: Text = "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2".to_string(),
    dense_dimension: Int = 384,
    chunks_collection: Text = "raggen_chunks".to_string(),
    docs_collection: Text = "raggen_docs".to_string(),
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn field_type(name: &str) -> Option<FieldType> {
    SETTINGS.iter().find(|spec| spec.name == name).map(|spec| spec.ty)
}

/// Default per-user location of the settings file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join(SETTINGS_FILE)
}

/// Serialize `settings` and overwrite `path`, creating parent directories first.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load settings from `path`.
///
/// A missing file yields defaults, which are written back. Anything unreadable falls back to
/// defaults field by field: unknown keys are ignored and keys of the wrong JSON type keep their
/// default. This never fails.
pub fn load_settings(path: &Path) -> Settings {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let settings = Settings::default();
            if let Err(err) = save_settings(path, &settings) {
                tracing::warn!(error = %err, "Failed to persist default settings");
            }
            return settings;
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Settings unreadable, using defaults");
            return Settings::default();
        }
    };

    let parsed: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Settings file is not valid JSON, using defaults");
            return Settings::default();
        }
    };
    let Some(map) = parsed.as_object() else {
        tracing::warn!(path = %path.display(), "Settings file is not a JSON object, using defaults");
        return Settings::default();
    };

    let mut settings = Settings::default();
    for (key, value) in map {
        let Some(ty) = field_type(key) else {
            tracing::warn!(field = %key, "Ignoring unknown setting");
            continue;
        };
        match FieldValue::from_json(ty, value) {
            Some(field) => {
                // Type was checked against the registry above.
                let _ = settings.set(key, field);
            }
            None => {
                tracing::warn!(field = %key, expected = ?ty, "Setting has the wrong type, keeping default");
            }
        }
    }
    settings
}

/// Owner of the live settings record. Every mutation is flushed immediately.
pub struct ConfigStore {
    path: PathBuf,
    settings: Settings,
    transcript: Option<Transcript>,
}

impl ConfigStore {
    /// Load (or create) the settings file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = load_settings(&path);
        tracing::debug!(path = %path.display(), "Loaded settings");
        Self {
            path,
            settings,
            transcript: None,
        }
    }

    /// Report save failures to the transcript in addition to the log file.
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn snapshot(&self) -> Settings {
        self.settings.clone()
    }

    /// Set one field and persist the whole record.
    pub fn update(&mut self, name: &str, value: FieldValue) -> Result<(), ConfigError> {
        self.settings.set(name, value)?;
        self.save();
        Ok(())
    }

    /// Persist the current record; failures are logged, never propagated.
    pub fn save(&self) {
        if let Err(err) = save_settings(&self.path, &self.settings) {
            tracing::warn!(error = %err, "Failed to save settings");
            if let Some(transcript) = &self.transcript {
                transcript.warn(format!("Failed to save settings: {err}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn registry_matches_runtime_types() {
        let settings = Settings::default();
        for spec in SETTINGS {
            let value = settings.get(spec.name).expect("registered field readable");
            assert_eq!(value.field_type(), spec.ty, "field {}", spec.name);
        }
    }

    #[test]
    fn set_rejects_unknown_and_mismatched_fields() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.set("nope", FieldValue::Int(1)),
            Err(ConfigError::UnknownField(_))
        ));
        assert!(matches!(
            settings.set("chunk_size", FieldValue::Text("x".into())),
            Err(ConfigError::TypeMismatch { .. })
        ));
        settings.set("chunk_size", FieldValue::Int(512)).unwrap();
        assert_eq!(settings.chunk_size, 512);
    }

    #[test]
    fn missing_file_creates_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = load_settings(&path);
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.chunk_size = 1024;
        settings.use_llm = true;
        settings.qdrant_url = "http://qdrant:6333".into();
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path), settings);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn drifted_schema_keeps_known_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"chunk_size": 128, "app_language": "ru", "force_ocr": "yes"}"#,
        )
        .unwrap();
        let settings = load_settings(&path);
        assert_eq!(settings.chunk_size, 128);
        assert!(settings.force_ocr, "wrong type keeps default");
    }

    #[test]
    fn store_update_persists_immediately() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut store = ConfigStore::open(&path);
        store
            .update("languages", FieldValue::Text("ru,en".into()))
            .unwrap();
        assert_eq!(load_settings(&path).languages, "ru,en");
    }
}
