use indexmap::IndexSet;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by [`RuleSet`] mutations and rule validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("Rule index {index} is out of bounds (rule count: {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("A rule with id {0} already exists")]
    DuplicateId(Uuid),

    #[error("A rule for folder '{0}' already exists")]
    DuplicateFolder(String),

    #[error("Folder name must not be empty")]
    EmptyFolderName,

    #[error("Folder name '{0}' must be a single path segment")]
    InvalidFolderName(String),

    #[error("Rule '{0}' has no file extensions")]
    NoExtensions(String),

    #[error("Extension '{extension}' in rule '{folder}' must start with '.' and name a suffix")]
    InvalidExtension { folder: String, extension: String },
}

/// A folder-name + extension-list pairing used to classify files
///
/// Extensions are stored normalized: lower-case, leading dot, no duplicates,
/// first-seen order preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizingRule {
    pub id: Uuid,
    pub folder_name: String,
    #[serde(deserialize_with = "deserialize_extensions")]
    pub extensions: IndexSet<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Settings files are hand-editable, so `.PDF` or `pdf` on disk load as `.pdf`
fn deserialize_extensions<'de, D>(deserializer: D) -> Result<IndexSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw.iter().filter_map(|e| normalize_extension(e)).collect())
}

impl OrganizingRule {
    /// Create an enabled rule with a fresh id, normalizing every extension
    pub fn new<I, S>(folder_name: impl Into<String>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            id: Uuid::new_v4(),
            folder_name: folder_name.into().trim().to_string(),
            extensions: extensions
                .into_iter()
                .filter_map(|e| normalize_extension(e.as_ref()))
                .collect(),
            enabled: true,
        }
    }

    /// Build a rule from free-form user input such as `"mp3, .FLAC wav"`
    pub fn parse(folder_name: &str, extensions: &str) -> Result<Self, RuleError> {
        let rule = Self::new(
            folder_name,
            extensions.split(|c: char| c == ',' || c.is_whitespace()),
        );
        rule.validate()?;
        Ok(rule)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// True when the rule is enabled and lists `extension` (compared lower-cased)
    pub fn matches(&self, extension: &str) -> bool {
        self.enabled && self.extensions.contains(&extension.to_lowercase())
    }

    /// Check the rule is usable as a relative destination and has a non-empty extension list
    pub fn validate(&self) -> Result<(), RuleError> {
        validate_folder_name(&self.folder_name)?;

        if self.extensions.is_empty() {
            return Err(RuleError::NoExtensions(self.folder_name.clone()));
        }

        for ext in &self.extensions {
            let normalized = normalize_extension(ext).is_some_and(|n| n == *ext);
            if !normalized || ext.chars().count() <= 1 {
                return Err(RuleError::InvalidExtension {
                    folder: self.folder_name.clone(),
                    extension: ext.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Folder names become one path segment under the watched root
pub fn validate_folder_name(name: &str) -> Result<(), RuleError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RuleError::EmptyFolderName);
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed == "." || trimmed == ".." {
        return Err(RuleError::InvalidFolderName(name.to_string()));
    }
    Ok(())
}

/// Normalize `"MP3"`, `".Mp3"` and `" mp3 "` to `".mp3"`; `None` for blank input
pub fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered.starts_with('.') {
        Some(lowered)
    } else {
        Some(format!(".{}", lowered))
    }
}

/// Ordered collection of rules; the first enabled match wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<OrganizingRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted rule data, dropping any repeated id after the first
    pub fn from_rules(rules: Vec<OrganizingRule>) -> Self {
        let mut set = Self::new();
        for rule in rules {
            if let Err(e) = set.push(rule) {
                tracing::warn!("Dropping rule while loading: {}", e);
            }
        }
        set
    }

    /// The canned rule set offered on first run
    pub fn defaults() -> Self {
        Self::from_rules(vec![
            OrganizingRule::new("Music", [".mp3", ".flac", ".m4a", ".wav", ".aac"]),
            OrganizingRule::new("Images", [".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff"]),
            OrganizingRule::new("Documents", [".pdf", ".doc", ".docx", ".txt", ".rtf", ".pages"]),
            OrganizingRule::new("Videos", [".mp4", ".avi", ".mkv", ".mov", ".wmv", ".m4v"]),
            OrganizingRule::new("Archives", [".zip", ".rar", ".7z", ".tar", ".gz", ".dmg"]),
            OrganizingRule::new("Code", [".swift", ".py", ".js", ".html", ".css", ".json"]),
        ])
    }

    pub fn push(&mut self, rule: OrganizingRule) -> Result<(), RuleError> {
        if self.rules.iter().any(|r| r.id == rule.id) {
            return Err(RuleError::DuplicateId(rule.id));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<OrganizingRule, RuleError> {
        self.check_index(index)?;
        Ok(self.rules.remove(index))
    }

    /// Replace the rule at `index`, returning the previous one
    pub fn replace(&mut self, index: usize, rule: OrganizingRule) -> Result<OrganizingRule, RuleError> {
        self.check_index(index)?;
        if self
            .rules
            .iter()
            .enumerate()
            .any(|(i, r)| i != index && r.id == rule.id)
        {
            return Err(RuleError::DuplicateId(rule.id));
        }
        Ok(std::mem::replace(&mut self.rules[index], rule))
    }

    /// Move a rule to a new position, shifting the ones in between
    pub fn move_rule(&mut self, from: usize, to: usize) -> Result<(), RuleError> {
        self.check_index(from)?;
        self.check_index(to)?;
        let rule = self.rules.remove(from);
        self.rules.insert(to, rule);
        Ok(())
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<(), RuleError> {
        self.check_index(index)?;
        self.rules[index].enabled = enabled;
        Ok(())
    }

    /// First rule in list order that is enabled and lists `extension`
    pub fn first_match(&self, extension: &str) -> Option<&OrganizingRule> {
        self.rules.iter().find(|r| r.matches(extension))
    }

    /// Whether another rule (ignoring position `except`) already uses this folder name
    pub fn contains_folder(&self, folder_name: &str, except: Option<usize>) -> bool {
        let wanted = folder_name.trim();
        self.rules
            .iter()
            .enumerate()
            .any(|(i, r)| Some(i) != except && r.folder_name.trim() == wanted)
    }

    pub fn get(&self, index: usize) -> Option<&OrganizingRule> {
        self.rules.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OrganizingRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn to_vec(&self) -> Vec<OrganizingRule> {
        self.rules.clone()
    }

    fn check_index(&self, index: usize) -> Result<(), RuleError> {
        if index >= self.rules.len() {
            return Err(RuleError::IndexOutOfBounds {
                index,
                len: self.rules.len(),
            });
        }
        Ok(())
    }
}
