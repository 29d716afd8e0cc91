//! Config manager for loading, saving, and atomic updates.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Section-level updates (only modified section is changed)
//! - Missing keys are filled with defaults and written back
//! - Preserves comments and formatting with toml_edit

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

/// Errors from reading or writing the settings file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to edit settings document: {0}")]
    Edit(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Owns the settings file and the [`Settings`] loaded from it.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Manager for `config_path`. Holds defaults until a load.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// In-memory changes; persist with `save()` or `update_section()`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Load an existing file. A missing file is an error.
    pub fn load(&mut self) -> ConfigResult<()> {
        let content = self
            .read_existing()?
            .ok_or_else(|| ConfigError::NotFound(self.config_path.clone()))?;
        self.settings = self.parse(&content)?;
        Ok(())
    }

    /// Load the file, or write one with defaults when it is missing.
    ///
    /// A file with unknown tables or missing keys is rewritten in full.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        let Some(content) = self.read_existing()? else {
            self.settings = Settings::default();
            return self.save();
        };

        self.settings = self.parse(&content)?;
        if needs_rewrite(&content, &self.settings)? {
            tracing::debug!(
                "Config {} has unknown or missing keys, rewriting",
                self.config_path.display()
            );
            self.save()?;
        }
        Ok(())
    }

    /// Write every section, with a comment above each table.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)
    }

    /// Update a specific section atomically.
    ///
    /// Re-reads the file from disk, replaces only the given table, and
    /// writes back atomically. Other tables keep their comments.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let mut doc: DocumentMut = match self.read_existing()? {
            Some(content) if !content.trim().is_empty() => content.parse()?,
            _ => DocumentMut::new(),
        };

        let section_toml = section_toml(&self.settings, section)?;
        let section_doc: DocumentMut = section_toml.parse()?;
        let section_table = section_doc.as_table().clone();

        doc[section.table_name()] = Item::Table(section_table);
        self.atomic_write(&doc.to_string())
    }

    /// File contents, or `None` when the file does not exist.
    fn read_existing(&self) -> ConfigResult<Option<String>> {
        match fs::read_to_string(&self.config_path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Io {
                path: self.config_path.clone(),
                source,
            }),
        }
    }

    fn parse(&self, content: &str) -> ConfigResult<Settings> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: self.config_path.clone(),
            source,
        })
    }

    /// Generate config content with a comment above each table.
    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();

        output.push_str("# Video-to-mesh reconstruction configuration\n");
        output.push_str(
            "# This file is auto-generated. Comments may be preserved on section updates.\n",
        );

        for section in ConfigSection::ALL {
            output.push('\n');
            output.push_str(&format!("# {}\n", section.description()));
            output.push_str(&format!("[{}]\n", section.table_name()));
            for line in section_toml(&self.settings, section)?.lines() {
                output.push_str(line);
                output.push('\n');
            }
        }

        Ok(output)
    }

    /// Write to `<name>.toml.tmp`, sync, then rename over the file.
    fn atomic_write(&self, content: &str) -> ConfigResult<()> {
        let io_err = |source: io::Error| ConfigError::Io {
            path: self.config_path.clone(),
            source,
        };

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let temp_path = self.config_path.with_extension("toml.tmp");
        let write_temp = || -> io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()
        };
        write_temp().map_err(io_err)?;

        fs::rename(&temp_path, &self.config_path).map_err(io_err)
    }
}

/// Whether a parsed file has unknown tables or lacks keys the current
/// settings would write.
fn needs_rewrite(content: &str, settings: &Settings) -> ConfigResult<bool> {
    let doc: DocumentMut = content.parse()?;

    let known = |key: &str| ConfigSection::ALL.iter().any(|s| s.table_name() == key);
    if doc.iter().any(|(key, _)| !known(key)) {
        return Ok(true);
    }

    for section in ConfigSection::ALL {
        let expected: DocumentMut = section_toml(settings, section)?.parse()?;
        let complete = doc
            .get(section.table_name())
            .and_then(Item::as_table_like)
            .is_some_and(|table| expected.iter().all(|(key, _)| table.contains_key(key)));
        if !complete {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Serialize one section's table body.
fn section_toml(settings: &Settings, section: ConfigSection) -> ConfigResult<String> {
    let text = match section {
        ConfigSection::Paths => toml::to_string_pretty(&settings.paths)?,
        ConfigSection::Sampling => toml::to_string_pretty(&settings.sampling)?,
        ConfigSection::Toolchain => toml::to_string_pretty(&settings.toolchain)?,
        ConfigSection::Reconstruction => toml::to_string_pretty(&settings.reconstruction)?,
        ConfigSection::Accelerators => toml::to_string_pretty(&settings.accelerators)?,
        ConfigSection::Tools => toml::to_string_pretty(&settings.tools)?,
        ConfigSection::Provisioning => toml::to_string_pretty(&settings.provisioning)?,
        ConfigSection::Logging => toml::to_string_pretty(&settings.logging)?,
    };
    Ok(text)
}
