use crate::error::Result;
use crate::models::debt::DEFAULT_CURRENCY;
use log::{info, warn};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_SCHEMA_VERSION: i64 = 1;

pub(crate) const DATA_DIR_NAME: &str = ".debtbook";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Accept any input, as the entity itself does.
    Permissive,
    /// Run `Debt::validate` before writes and reject negative payments.
    Strict,
}

impl ValidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Permissive => "permissive",
            ValidationMode::Strict => "strict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSettings {
    pub default_currency: String,
    pub validation_mode: ValidationMode,
    pub refresh_updated_on_payment: bool,
}

impl Default for EffectiveSettings {
    fn default() -> Self {
        Self {
            default_currency: DEFAULT_CURRENCY.to_string(),
            validation_mode: ValidationMode::Permissive,
            refresh_updated_on_payment: false,
        }
    }
}

pub async fn get_settings(data_dir: String) -> std::result::Result<Value, String> {
    load_settings_from_disk(&data_dir).map_err(|e| format!("Settings error: {e}"))
}

pub async fn save_settings(data_dir: String, settings: Value) -> std::result::Result<Value, String> {
    save_settings_to_disk(&data_dir, &settings).map_err(|e| format!("Settings error: {e}"))
}

pub fn load_effective_settings(data_dir: &str) -> Result<EffectiveSettings> {
    let settings = load_settings_from_disk(data_dir)?;
    Ok(effective_from_value(&settings))
}

fn effective_from_value(settings: &Value) -> EffectiveSettings {
    let defaults = EffectiveSettings::default();

    let default_currency = settings
        .get("defaultCurrency")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or(defaults.default_currency);

    let validation_mode = match settings.get("validationMode").and_then(Value::as_str) {
        Some("strict") => ValidationMode::Strict,
        _ => ValidationMode::Permissive,
    };

    let refresh_updated_on_payment = settings
        .get("refreshUpdatedOnPayment")
        .and_then(Value::as_bool)
        .unwrap_or(defaults.refresh_updated_on_payment);

    EffectiveSettings {
        default_currency,
        validation_mode,
        refresh_updated_on_payment,
    }
}

pub fn load_settings_from_disk(data_dir: &str) -> Result<Value> {
    let path = settings_path(data_dir);
    ensure_data_dir(data_dir)?;

    let original = if path.exists() {
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str::<Value>(&raw).unwrap_or_else(|e| {
            warn!("settings.json at {} is unreadable ({e}); using defaults", path.display());
            json!({})
        })
    } else {
        json!({})
    };

    let migrated = migrate_settings(original.clone());
    if migrated != original || !path.exists() {
        write_settings_file(&path, &migrated)?;
    }

    Ok(migrated)
}

pub fn save_settings_to_disk(data_dir: &str, settings: &Value) -> Result<Value> {
    let path = settings_path(data_dir);
    ensure_data_dir(data_dir)?;

    let mut merged = load_settings_from_disk(data_dir).unwrap_or_else(|e| {
        warn!("Could not load existing settings ({e}); merging onto defaults");
        default_settings()
    });
    merge_settings(&mut merged, settings);

    let migrated = migrate_settings(merged);
    write_settings_file(&path, &migrated)?;
    info!("Saved settings to {}", path.display());
    Ok(migrated)
}

fn settings_path(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join(DATA_DIR_NAME).join("settings.json")
}

pub(crate) fn ensure_data_dir(data_dir: &str) -> Result<()> {
    fs::create_dir_all(Path::new(data_dir).join(DATA_DIR_NAME))?;
    Ok(())
}

fn write_settings_file(path: &Path, settings: &Value) -> Result<()> {
    let raw = serde_json::to_string_pretty(settings)?;
    fs::write(path, raw)?;
    Ok(())
}

fn migrate_settings(input: Value) -> Value {
    let defaults = default_settings();
    let mut out = match input {
        Value::Object(map) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };

    deep_merge_defaults(&mut out, &defaults);
    sanitize_settings(&mut out);

    if let Some(obj) = out.as_object_mut() {
        obj.insert("schema_version".to_string(), json!(SETTINGS_SCHEMA_VERSION));
    }

    out
}

fn default_settings() -> Value {
    json!({
        "schema_version": SETTINGS_SCHEMA_VERSION,
        "defaultCurrency": DEFAULT_CURRENCY,
        "validationMode": ValidationMode::Permissive.as_str(),
        "refreshUpdatedOnPayment": false
    })
}

fn deep_merge_defaults(target: &mut Value, defaults: &Value) {
    let (Some(target_obj), Some(default_obj)) = (target.as_object_mut(), defaults.as_object()) else {
        return;
    };

    for (key, default_value) in default_obj {
        match target_obj.get_mut(key) {
            Some(existing) => {
                if existing.is_object() && default_value.is_object() {
                    deep_merge_defaults(existing, default_value);
                }
            }
            None => {
                target_obj.insert(key.clone(), default_value.clone());
            }
        }
    }
}

fn merge_settings(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target_obj), Value::Object(incoming_obj)) => {
            for (key, value) in incoming_obj {
                if let Some(existing) = target_obj.get_mut(key) {
                    merge_settings(existing, value);
                } else {
                    target_obj.insert(key.clone(), value.clone());
                }
            }
        }
        (target_slot, incoming_value) => {
            *target_slot = incoming_value.clone();
        }
    }
}

fn sanitize_settings(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };

    sanitize_currency(obj, "defaultCurrency", DEFAULT_CURRENCY);
    sanitize_enum(obj, "validationMode", &["permissive", "strict"], "permissive");
    ensure_bool(obj, "refreshUpdatedOnPayment", false);
}

/// ISO-4217 shape only: three ASCII letters, stored upper-case.
fn sanitize_currency(map: &mut Map<String, Value>, key: &str, default: &str) {
    let normalized = map
        .get(key)
        .and_then(Value::as_str)
        .map(|code| code.trim().to_ascii_uppercase())
        .filter(|code| code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or_else(|| default.to_string());
    map.insert(key.to_string(), json!(normalized));
}

fn sanitize_enum(map: &mut Map<String, Value>, key: &str, allowed: &[&str], default: &str) {
    let valid = map
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| allowed.contains(value))
        .unwrap_or(default);
    map.insert(key.to_string(), json!(valid));
}

fn ensure_bool(map: &mut Map<String, Value>, key: &str, default: bool) {
    let value = map.get(key).and_then(Value::as_bool).unwrap_or(default);
    map.insert(key.to_string(), json!(value));
}
