use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::ModelError;

const BUILTIN_CATALOG: &str = include_str!("../../data/models.json");

/// One downloadable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub id: String,
    pub name: String,
    pub url: String,
    /// File name inside the model directory.
    pub filename: String,
    /// Expected size, for display only. Validation uses the absolute floor.
    pub size_mb: u64,
    #[serde(default)]
    pub recommended: bool,
}

/// Static list of downloadable models with one designated default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub default_model_id: String,
    pub models: Vec<ModelArtifact>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelArtifact>, default_model_id: impl Into<String>) -> Result<Self> {
        let catalog = Self {
            default_model_id: default_model_id.into(),
            models,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn builtin() -> Result<Self> {
        let catalog: ModelCatalog = serde_json::from_str(BUILTIN_CATALOG)
            .context("Built-in model catalog is not valid JSON")?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Loads the catalog from `path` when given, otherwise the built-in one.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::builtin();
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model catalog from {}", path.display()))?;
        let catalog: ModelCatalog = serde_json::from_str(&raw)
            .with_context(|| format!("Model catalog at {} is not valid JSON", path.display()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            bail!("Model catalog must contain at least one model");
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            if !seen.insert(model.id.as_str()) {
                bail!("Duplicate model id '{}' in catalog", model.id);
            }
            let name = Path::new(&model.filename);
            if model.filename.is_empty()
                || name.file_name().map(|f| f != name.as_os_str()).unwrap_or(true)
            {
                bail!(
                    "Model '{}' has invalid filename '{}': must be a bare file name",
                    model.id,
                    model.filename
                );
            }
        }
        Ok(())
    }

    /// The designated default, or the first entry if the id names nothing.
    pub fn default_artifact(&self) -> &ModelArtifact {
        self.models
            .iter()
            .find(|m| m.id == self.default_model_id)
            .unwrap_or(&self.models[0])
    }

    pub fn get(&self, id: &str) -> Result<&ModelArtifact, ModelError> {
        self.models
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| ModelError::UnknownArtifact(id.to_string()))
    }

    /// `Some(id)` looks the artifact up; `None` is the default.
    pub fn select(&self, id: Option<&str>) -> Result<&ModelArtifact, ModelError> {
        match id {
            Some(id) => self.get(id),
            None => Ok(self.default_artifact()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelArtifact> {
        self.models.iter()
    }
}

#[cfg(test)]
pub(crate) fn test_artifact(id: &str, url: &str) -> ModelArtifact {
    ModelArtifact {
        id: id.to_string(),
        name: format!("Test model {id}"),
        url: url.to_string(),
        filename: format!("{id}.gguf"),
        size_mb: 1,
        recommended: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_has_recommended_default() {
        let catalog = ModelCatalog::builtin().unwrap();
        let default = catalog.default_artifact();
        assert_eq!(default.id, catalog.default_model_id);
        assert!(default.recommended);
    }

    #[test]
    fn test_unknown_default_falls_back_to_first() {
        let catalog = ModelCatalog::new(
            vec![test_artifact("a", "http://x/a"), test_artifact("b", "http://x/b")],
            "missing",
        )
        .unwrap();
        assert_eq!(catalog.default_artifact().id, "a");
    }

    #[test]
    fn test_get_unknown_id_is_typed_error() {
        let catalog = ModelCatalog::builtin().unwrap();
        let err = catalog.get("nope").unwrap_err();
        assert!(matches!(err, ModelError::UnknownArtifact(id) if id == "nope"));
    }

    #[test]
    fn test_select_none_is_default() {
        let catalog = ModelCatalog::builtin().unwrap();
        assert_eq!(catalog.select(None).unwrap(), catalog.default_artifact());
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(ModelCatalog::new(vec![], "a").is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = ModelCatalog::new(
            vec![test_artifact("a", "http://x/a"), test_artifact("a", "http://x/b")],
            "a",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_filename_with_directory_rejected() {
        let mut artifact = test_artifact("a", "http://x/a");
        artifact.filename = "../escape.gguf".to_string();
        assert!(ModelCatalog::new(vec![artifact], "a").is_err());
    }
}
