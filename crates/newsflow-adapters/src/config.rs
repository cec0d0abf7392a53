//! Declarative per-source selector configuration (`sources.yaml`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use scraper::Selector;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("source `{source_name}`: {reason}")]
    Invalid { source_name: String, reason: String },
}

/// One selector or an ordered fallback list; YAML accepts either form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "SelectorListRepr")]
pub struct SelectorList(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectorListRepr {
    One(String),
    Many(Vec<String>),
}

impl From<SelectorListRepr> for SelectorList {
    fn from(repr: SelectorListRepr) -> Self {
        let selectors = match repr {
            SelectorListRepr::One(s) => vec![s],
            SelectorListRepr::Many(v) => v,
        };
        SelectorList(
            selectors
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

impl SelectorList {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SelectorList(selectors.into_iter().map(Into::into).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All alternatives as one CSS selector group, for "wait until any appears".
    pub fn css_group(&self) -> String {
        self.0.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DetailSelectors {
    pub title: SelectorList,
    pub image: SelectorList,
    #[serde(default)]
    pub intro: SelectorList,
    #[serde(default)]
    pub label: SelectorList,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceProfile {
    pub name: String,
    pub category: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub link_selectors: Vec<String>,
    pub detail_selectors: DetailSelectors,
    /// Used as the raw label for sources whose pages carry no category element.
    #[serde(default)]
    pub fixed_label: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl SourceProfile {
    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            source_name: self.name.clone(),
            reason: reason.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("name is empty"));
        }
        if self.category.trim().is_empty() {
            return Err(self.invalid("category is empty"));
        }
        let base = Url::parse(&self.url).map_err(|e| self.invalid(format!("url `{}`: {e}", self.url)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(self.invalid(format!("url `{}` is not http(s)", self.url)));
        }
        if self.link_selectors.is_empty() {
            return Err(self.invalid("no link selectors"));
        }
        if self.detail_selectors.title.is_empty() {
            return Err(self.invalid("no title selector"));
        }
        if self.detail_selectors.image.is_empty() {
            return Err(self.invalid("no image selector"));
        }

        let detail = &self.detail_selectors;
        let all = self
            .link_selectors
            .iter()
            .map(String::as_str)
            .chain(detail.title.iter())
            .chain(detail.image.iter())
            .chain(detail.intro.iter())
            .chain(detail.label.iter());
        for selector in all {
            Selector::parse(selector)
                .map_err(|e| self.invalid(format!("selector `{selector}`: {e}")))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceProfile>,
}

impl SourceRegistry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let registry: SourceRegistry =
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        registry.validate()?;
        Ok(registry)
    }

    /// Static checks: every profile is well formed and names are unique, since
    /// run results are keyed by source name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for profile in &self.sources {
            profile.validate()?;
            if !seen.insert(profile.name.as_str()) {
                return Err(profile.invalid("duplicate source name"));
            }
        }
        Ok(())
    }

    pub fn enabled(&self) -> impl Iterator<Item = &SourceProfile> {
        self.sources.iter().filter(|s| s.enabled)
    }
}
