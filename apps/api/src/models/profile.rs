use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

const BUILTIN_PROFILE: &str = include_str!("../../data/profile.json");

/// The résumé record the chat answers questions about.
/// Loaded once at startup and shared as `Arc<Profile>`; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub headline: String,
    pub years_of_experience: String,
    pub location: String,
    pub email: String,
    pub phone: String,
    pub linkedin: String,
    pub github: String,
    pub about: String,
    pub skills: Vec<String>,
    /// Most recent first.
    pub experience: Vec<Experience>,
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub role: String,
    pub company: String,
    pub location: String,
    pub period: String,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub title: String,
    pub tech: Vec<String>,
    pub description: String,
    pub links: Vec<String>,
}

impl Profile {
    /// Parses the profile compiled into the binary.
    pub fn builtin() -> Result<Self> {
        let profile: Profile =
            serde_json::from_str(BUILTIN_PROFILE).context("Built-in profile is not valid JSON")?;
        profile.validate()?;
        Ok(profile)
    }

    /// Loads the profile from `path` when given, otherwise the built-in one.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::builtin();
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile from {}", path.display()))?;
        let profile: Profile = serde_json::from_str(&raw)
            .with_context(|| format!("Profile at {} is not valid JSON", path.display()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("Profile name cannot be empty");
        }
        if self.experience.is_empty() {
            bail!("Profile must contain at least one experience entry");
        }
        if self.skills.is_empty() {
            bail!("Profile must list at least one skill");
        }
        Ok(())
    }

    /// The most recent experience entry. `validate` guarantees one exists.
    pub fn current_role(&self) -> &Experience {
        &self.experience[0]
    }

    /// Employers before the current one, most recent first.
    pub fn previous_employers(&self) -> Vec<&str> {
        self.experience
            .iter()
            .skip(1)
            .map(|e| e.company.as_str())
            .collect()
    }

    pub fn skills_preview(&self, limit: usize) -> Vec<&str> {
        self.skills.iter().take(limit).map(String::as_str).collect()
    }

    /// First name, used where the narration refers to the owner informally.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_profile_parses_and_validates() {
        let profile = Profile::builtin().unwrap();
        assert_eq!(profile.name, "Dev Gupta");
        assert!(profile.skills.iter().any(|s| s == "React Native"));
        assert!(!profile.projects.is_empty());
    }

    #[test]
    fn test_current_role_is_first_entry() {
        let profile = Profile::builtin().unwrap();
        assert_eq!(profile.current_role().company, profile.experience[0].company);
    }

    #[test]
    fn test_previous_employers_skip_current() {
        let profile = Profile::builtin().unwrap();
        let previous = profile.previous_employers();
        assert_eq!(previous.len(), profile.experience.len() - 1);
        assert!(!previous.contains(&profile.current_role().company.as_str()));
    }

    #[test]
    fn test_skills_preview_truncates() {
        let profile = Profile::builtin().unwrap();
        assert_eq!(profile.skills_preview(3).len(), 3);
        assert_eq!(profile.skills_preview(1000).len(), profile.skills.len());
    }

    #[test]
    fn test_load_from_file_overrides_builtin() {
        let mut profile = Profile::builtin().unwrap();
        profile.name = "Ada Lovelace".to_string();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&profile).unwrap().as_bytes())
            .unwrap();

        let loaded = Profile::load(Some(file.path())).unwrap();
        assert_eq!(loaded.name, "Ada Lovelace");
        assert_eq!(loaded.first_name(), "Ada");
    }

    #[test]
    fn test_validate_rejects_empty_experience() {
        let mut profile = Profile::builtin().unwrap();
        profile.experience.clear();
        assert!(profile.validate().is_err());
    }
}
