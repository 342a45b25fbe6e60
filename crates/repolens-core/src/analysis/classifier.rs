use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::AnalyzerKind;

/// Built-in routing table: extension, analyzer, language hint.
const DEFAULT_ROUTES: &[(&str, AnalyzerKind, &str)] = &[
    ("py", AnalyzerKind::LocalLint, "Python"),
    ("ipynb", AnalyzerKind::NotebookExtract, "Python"),
    ("c", AnalyzerKind::GenerativeReview, "C"),
    ("h", AnalyzerKind::GenerativeReview, "C"),
    ("cc", AnalyzerKind::GenerativeReview, "C++"),
    ("cpp", AnalyzerKind::GenerativeReview, "C++"),
    ("cxx", AnalyzerKind::GenerativeReview, "C++"),
    ("hpp", AnalyzerKind::GenerativeReview, "C++"),
    ("cs", AnalyzerKind::GenerativeReview, "C#"),
    ("go", AnalyzerKind::GenerativeReview, "Go"),
    ("java", AnalyzerKind::GenerativeReview, "Java"),
    ("kt", AnalyzerKind::GenerativeReview, "Kotlin"),
    ("scala", AnalyzerKind::GenerativeReview, "Scala"),
    ("js", AnalyzerKind::GenerativeReview, "JavaScript"),
    ("jsx", AnalyzerKind::GenerativeReview, "JavaScript (React)"),
    ("ts", AnalyzerKind::GenerativeReview, "TypeScript"),
    ("tsx", AnalyzerKind::GenerativeReview, "TypeScript (React)"),
    ("rb", AnalyzerKind::GenerativeReview, "Ruby"),
    ("php", AnalyzerKind::GenerativeReview, "PHP"),
    ("rs", AnalyzerKind::GenerativeReview, "Rust"),
    ("swift", AnalyzerKind::GenerativeReview, "Swift"),
    ("sh", AnalyzerKind::GenerativeReview, "Shell"),
];

/// Target of a routing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub kind: AnalyzerKind,
    /// Language name passed to the generative reviewer.
    pub language: String,
}

/// Configured addition or replacement of a routing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOverride {
    pub extension: String,
    pub kind: AnalyzerKind,
    #[serde(default)]
    pub language: Option<String>,
}

/// Data-driven extension → analyzer table. Unlisted extensions are skipped.
#[derive(Debug, Clone)]
pub struct Classifier {
    routes: HashMap<String, Route>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Classifier {
    pub fn builtin() -> Self {
        DEFAULT_ROUTES
            .iter()
            .fold(Self::empty(), |table, (ext, kind, language)| {
                table.with_route(ext, *kind, *language)
            })
    }

    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    pub fn with_route(mut self, extension: &str, kind: AnalyzerKind, language: &str) -> Self {
        self.insert(extension, kind, language.to_string());
        self
    }

    /// Apply configured overrides on top of the current table.
    pub fn with_overrides(mut self, overrides: &[RouteOverride]) -> Self {
        for entry in overrides {
            let language = entry
                .language
                .clone()
                .or_else(|| self.language(&entry.extension).map(str::to_string))
                .unwrap_or_else(|| normalize(&entry.extension));
            self.insert(&entry.extension, entry.kind, language);
        }
        self
    }

    fn insert(&mut self, extension: &str, kind: AnalyzerKind, language: String) {
        self.routes
            .insert(normalize(extension), Route { kind, language });
    }

    /// Pure lookup; accepts extensions with or without a leading dot, any case.
    pub fn classify(&self, extension: &str) -> AnalyzerKind {
        self.routes
            .get(&normalize(extension))
            .map(|route| route.kind)
            .unwrap_or(AnalyzerKind::Skip)
    }

    pub fn language(&self, extension: &str) -> Option<&str> {
        self.routes
            .get(&normalize(extension))
            .map(|route| route.language.as_str())
    }

    /// Entries sorted by extension.
    pub fn routes(&self) -> Vec<(&str, &Route)> {
        let mut routes: Vec<_> = self
            .routes
            .iter()
            .map(|(ext, route)| (ext.as_str(), route))
            .collect();
        routes.sort_by(|a, b| a.0.cmp(b.0));
        routes
    }
}

fn normalize(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}
