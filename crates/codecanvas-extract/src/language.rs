//! Supported languages and their grammars

use std::path::Path;

use tree_sitter::Language;

/// Languages with a syntax-tree grammar. Tier 1 languages additionally carry
/// a custom query schema; the rest fall back to the generic definition query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    Python,
    Rust,
    TypeScript,
    JavaScript,
    Go,
    Java,
    C,
    Cpp,
}

impl Lang {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") | Some("pyi") => Some(Lang::Python),
            Some("rs") => Some(Lang::Rust),
            Some("ts") | Some("tsx") => Some(Lang::TypeScript),
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Some(Lang::JavaScript),
            Some("go") => Some(Lang::Go),
            Some("java") => Some(Lang::Java),
            Some("c") | Some("h") => Some(Lang::C),
            Some("cpp") | Some("cc") | Some("cxx") | Some("hpp") | Some("hh") => Some(Lang::Cpp),
            _ => None,
        }
    }

    pub fn grammar(&self) -> Language {
        match self {
            Lang::Python => tree_sitter_python::LANGUAGE.into(),
            Lang::Rust => tree_sitter_rust::LANGUAGE.into(),
            Lang::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Lang::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Lang::Go => tree_sitter_go::LANGUAGE.into(),
            Lang::Java => tree_sitter_java::LANGUAGE.into(),
            Lang::C => tree_sitter_c::LANGUAGE.into(),
            Lang::Cpp => tree_sitter_cpp::LANGUAGE.into(),
        }
    }

    /// Stable key used for session routing and config.
    pub fn key(&self) -> &'static str {
        match self {
            Lang::Python => "python",
            Lang::Rust => "rust",
            Lang::TypeScript => "typescript",
            Lang::JavaScript => "javascript",
            Lang::Go => "go",
            Lang::Java => "java",
            Lang::C => "c",
            Lang::Cpp => "cpp",
        }
    }

    /// Whether a custom Tier 1 query schema is registered.
    pub fn has_custom_schema(&self) -> bool {
        matches!(
            self,
            Lang::Python | Lang::Rust | Lang::TypeScript | Lang::JavaScript | Lang::Go
        )
    }

    pub fn all() -> &'static [Lang] {
        &[
            Lang::Python,
            Lang::Rust,
            Lang::TypeScript,
            Lang::JavaScript,
            Lang::Go,
            Lang::Java,
            Lang::C,
            Lang::Cpp,
        ]
    }
}
