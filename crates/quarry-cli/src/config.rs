//! CLI configuration

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use quarry_core::{AcceptRejectWarn, ConflictBehavior, ValidationPolicy};
use quarry_storage::{EncodeConfig, EntryEnvelope};
use serde::{Deserialize, Serialize};

/// Get default config directory
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".quarry")
}

/// Path of the config file when `--config` is not given
pub fn config_file_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSection {
    pub single_structural_class: AcceptRejectWarn,
    pub structural_class: AcceptRejectWarn,
    pub name_forms: bool,
    pub structure_rules: bool,
}

impl Default for ValidationSection {
    fn default() -> Self {
        let policy = ValidationPolicy::default();
        Self {
            single_structural_class: policy.single_structural_class,
            structural_class: policy.structural_class,
            name_forms: policy.validate_name_forms,
            structure_rules: policy.validate_structure_rules,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSection {
    pub exclude_dn: bool,
    pub compress_attribute_descriptions: bool,
    pub compress_object_classes: bool,
    pub deflate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectiveSection {
    pub default_conflict_behavior: String,
}

impl Default for CollectiveSection {
    fn default() -> Self {
        Self {
            default_conflict_behavior: ConflictBehavior::default().to_string(),
        }
    }
}

/// Configuration for the CLI, stored as TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub validation: ValidationSection,
    pub codec: CodecSection,
    pub collective: CollectiveSection,
}

const KEYS: &[&str] = &[
    "validation.single_structural_class",
    "validation.structural_class",
    "validation.name_forms",
    "validation.structure_rules",
    "codec.exclude_dn",
    "codec.compress_attribute_descriptions",
    "codec.compress_object_classes",
    "codec.deflate",
    "collective.default_conflict_behavior",
];

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        config.conflict_behavior()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::info!("Wrote config to {:?}", path);
        Ok(())
    }

    pub fn keys() -> &'static [&'static str] {
        KEYS
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "validation.single_structural_class" => self.validation.single_structural_class.to_string(),
            "validation.structural_class" => self.validation.structural_class.to_string(),
            "validation.name_forms" => self.validation.name_forms.to_string(),
            "validation.structure_rules" => self.validation.structure_rules.to_string(),
            "codec.exclude_dn" => self.codec.exclude_dn.to_string(),
            "codec.compress_attribute_descriptions" => self.codec.compress_attribute_descriptions.to_string(),
            "codec.compress_object_classes" => self.codec.compress_object_classes.to_string(),
            "codec.deflate" => self.codec.deflate.to_string(),
            "collective.default_conflict_behavior" => self.collective.default_conflict_behavior.clone(),
            _ => return None,
        };
        Some(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "validation.single_structural_class" => self.validation.single_structural_class = value.parse()?,
            "validation.structural_class" => self.validation.structural_class = value.parse()?,
            "validation.name_forms" => self.validation.name_forms = parse_bool(key, value)?,
            "validation.structure_rules" => self.validation.structure_rules = parse_bool(key, value)?,
            "codec.exclude_dn" => self.codec.exclude_dn = parse_bool(key, value)?,
            "codec.compress_attribute_descriptions" => {
                self.codec.compress_attribute_descriptions = parse_bool(key, value)?
            }
            "codec.compress_object_classes" => self.codec.compress_object_classes = parse_bool(key, value)?,
            "codec.deflate" => self.codec.deflate = parse_bool(key, value)?,
            "collective.default_conflict_behavior" => {
                let behavior: ConflictBehavior = value.parse()?;
                self.collective.default_conflict_behavior = behavior.to_string();
            }
            _ => bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy::default()
            .with_single_structural_class(self.validation.single_structural_class)
            .with_structural_class(self.validation.structural_class)
            .with_name_forms(self.validation.name_forms)
            .with_structure_rules(self.validation.structure_rules)
    }

    pub fn encode_config(&self) -> EncodeConfig {
        EncodeConfig::default()
            .with_exclude_dn(self.codec.exclude_dn)
            .with_compressed_attribute_descriptions(self.codec.compress_attribute_descriptions)
            .with_compressed_object_classes(self.codec.compress_object_classes)
    }

    pub fn envelope(&self) -> EntryEnvelope {
        EntryEnvelope::new(self.codec.deflate)
    }

    pub fn conflict_behavior(&self) -> anyhow::Result<ConflictBehavior> {
        Ok(self.collective.default_conflict_behavior.parse()?)
    }
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => bail!("{} expects true or false, got '{}'", key, value),
    }
}
