use std::path::Path;

use anyhow::{Context, Result};
use newsflow_core::{normalize_text, DEFAULT_CATEGORY};
use serde::Deserialize;

/// `(category, contains_any)` in priority order. The generic current-affairs
/// rule sits last because its needles ("stiri", "news") overlap nearly every
/// other category.
const BUILTIN_RULES: &[(&str, &[&str])] = &[
    ("Auto", &["transporturi"]),
    ("Sport", &["sport", "stiri sport", "sportz"]),
    (
        "Extern",
        &["externe", "știri externe", "international", "mapamond", "politic extern", "extern"],
    ),
    ("Politică", &["stiri politice", "politic intern", "politic", "politica", "politică"]),
    (
        "Economie",
        &[
            "economie",
            "economic",
            "macro",
            "stiri economice",
            "bani și afaceri",
            "business",
            "energie",
            "financiar",
        ],
    ),
    ("Monden", &["monden", "stiri mondene", "showbiz"]),
    ("Horoscop", &["horoscop"]),
    ("Social", &["social", "știri sociale"]),
    ("Lifestyle", &["lifestyle", "stil de viață"]),
    ("Sănătate", &["sănătate și fitness", "sanatate", "health", "doctor de bine"]),
    ("Vremea", &["meteo", "vremea"]),
    (
        "Magazin și știință",
        &["sci-tech", "high tech", "ai world", "stiri stiinta", "techrider", "tehnologie", "digital"],
    ),
    ("Opinii", &["opinii", "opinii și analize", "analize", "invitatii evz"]),
    ("Eveniment", &["eveniment", "evenimente"]),
    ("Cultură", &["timp liber", "cultură și vacanțe", "cultură-media", "cultura"]),
    ("Justiție", &["justitie", "justiție"]),
    (
        "Publicitate",
        &["promo", "comunicate", "publicitate", "advertorial", "advertoriale", "conținut plătit"],
    ),
    ("Alegeri prezidențiale 2025", &["alegeri prezidentiale 2025"]),
    ("Știri diverse", &["stiri diverse"]),
    ("Știri șocante", &["stiri socante"]),
    ("Bănci și asigurări", &["bănci", "banci"]),
    ("Viața", &["viața"]),
    ("Entertainment", &["muzică și filme"]),
    (
        "Construcții și imobiliare",
        &["imobiliare", "contructii & imobiliare", "real estate&construcții"],
    ),
    (
        DEFAULT_CATEGORY,
        &[
            "articole",
            "actualitate",
            "știri românia",
            "știri interne",
            "știri",
            "stiri actuale",
            "news",
            "fara categorie",
            "făra categorie",
            "stiri",
        ],
    ),
];

#[derive(Debug, Clone, Deserialize)]
pub struct LabelRule {
    pub category: String,
    pub contains_any: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LabelRulesFile {
    #[serde(default)]
    rules: Vec<LabelRule>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    category: String,
    needles: Vec<String>,
}

/// Maps scraped category text onto a canonical label. First matching rule
/// wins; matching is substring containment on normalized text.
#[derive(Debug, Clone)]
pub struct LabelClassifier {
    rules: Vec<CompiledRule>,
}

impl Default for LabelClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LabelClassifier {
    pub fn new(rules: Vec<LabelRule>) -> Self {
        let rules = rules
            .into_iter()
            .filter_map(|rule| {
                let needles: Vec<String> = rule
                    .contains_any
                    .iter()
                    .map(|n| normalize_text(n).trim().to_string())
                    .filter(|n| !n.is_empty())
                    .collect();
                let category = rule.category.trim().to_string();
                (!needles.is_empty() && !category.is_empty()).then_some(CompiledRule { category, needles })
            })
            .collect();
        Self { rules }
    }

    pub fn builtin() -> Self {
        Self::new(
            BUILTIN_RULES
                .iter()
                .map(|(category, needles)| LabelRule {
                    category: category.to_string(),
                    contains_any: needles.iter().map(|n| n.to_string()).collect(),
                })
                .collect(),
        )
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: LabelRulesFile = serde_yaml::from_str(text).context("parsing label rules")?;
        Ok(Self::new(file.rules))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Never returns an empty string.
    pub fn classify(&self, raw_label: &str) -> String {
        let normalized = normalize_text(raw_label);
        let category = self
            .rules
            .iter()
            .find(|rule| rule.needles.iter().any(|n| normalized.contains(n.as_str())))
            .map(|rule| rule.category.as_str())
            .unwrap_or(DEFAULT_CATEGORY);
        format_label(category)
    }
}

/// First character uppercased, the rest lowercased.
pub fn format_label(label: &str) -> String {
    let mut chars = label.trim().chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => DEFAULT_CATEGORY.to_string(),
    }
}
