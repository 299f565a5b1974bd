use crate::domain::data_source::{DataSource, SourceCatalog};
use crate::domain::error::{AppError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Named data sources persisted as a JSON file, plus which one is active.
pub struct SourceRegistry {
    path: PathBuf,
    catalog: SourceCatalog,
}

impl SourceRegistry {
    /// Load the registry at `path`. A missing file is an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let catalog = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| {
                AppError::IoError(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                AppError::ParseError(format!("Corrupt source registry {}: {}", path.display(), e))
            })?
        } else {
            SourceCatalog::default()
        };

        debug!(
            "Loaded {} data sources from {}",
            catalog.sources.len(),
            path.display()
        );
        Ok(Self { path, catalog })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.catalog)
            .map_err(|e| AppError::Internal(format!("Failed to serialize registry: {}", e)))?;

        // write-then-rename so a crash never leaves a half-written registry
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Register a source. The first source added becomes active.
    pub fn add(&mut self, source: DataSource, replace: bool) -> Result<()> {
        validate_source_name(&source.name)?;
        if !replace && self.catalog.sources.contains_key(&source.name) {
            return Err(AppError::ValidationError(format!(
                "Data source '{}' already exists",
                source.name
            )));
        }

        if self.catalog.active.is_none() {
            self.catalog.active = Some(source.name.clone());
        }
        self.catalog.sources.insert(source.name.clone(), source);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<DataSource> {
        let removed = self
            .catalog
            .sources
            .remove(name)
            .ok_or_else(|| not_found(name))?;
        if self.catalog.active.as_deref() == Some(name) {
            self.catalog.active = None;
        }
        Ok(removed)
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        if !self.catalog.sources.contains_key(name) {
            return Err(not_found(name));
        }
        self.catalog.active = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&DataSource> {
        self.catalog.sources.get(name).ok_or_else(|| not_found(name))
    }

    pub fn active(&self) -> Option<&DataSource> {
        self.catalog
            .active
            .as_deref()
            .and_then(|name| self.catalog.sources.get(name))
    }

    /// The named source, or the active one when no name is given.
    pub fn resolve(&self, name: Option<&str>) -> Result<&DataSource> {
        match name {
            Some(name) => self.get(name),
            None => self.active().ok_or_else(|| {
                AppError::NotFound(
                    "No active data source. Add one with `import` or `add-db`, or pass --source"
                        .to_string(),
                )
            }),
        }
    }

    /// Sources ordered by name.
    pub fn list(&self) -> impl Iterator<Item = &DataSource> {
        self.catalog.sources.values()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.catalog.active.as_deref() == Some(name)
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.sources.is_empty()
    }
}

fn not_found(name: &str) -> AppError {
    AppError::NotFound(format!("Data source '{}' not found", name))
}

pub fn validate_source_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Data source name cannot be empty".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(AppError::ValidationError(format!(
            "Invalid data source name '{}': use letters, digits, '_', '-' or '.'",
            name
        )));
    }
    Ok(())
}

pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}
