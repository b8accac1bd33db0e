//! Tree-sitter TypeScript grammar binding.
//!
//! Generalized from the teacher's `LanguageRegistry` (`language.rs`), which
//! maps a dozen `codegraph_core::Language` variants to Tree-sitter grammars
//! and file extensions. Here there is exactly one language, so the registry
//! collapses to a single config, but the shape — a grammar handle plus the
//! extensions it owns, with a `Parser` built fresh per call — is unchanged.

use tree_sitter::{Language, Parser};

pub const FILE_EXTENSIONS: &[&str] = &["ts", "tsx"];

pub struct TypeScriptLanguage;

impl TypeScriptLanguage {
    pub fn grammar() -> Language {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    }

    pub fn tsx_grammar() -> Language {
        tree_sitter_typescript::LANGUAGE_TSX.into()
    }

    /// Build a `Parser` configured for `.ts` or `.tsx` source, chosen by the
    /// file's extension so JSX syntax doesn't break the plain grammar.
    pub fn new_parser(file_path: &str) -> Result<Parser, codegraph_core::CodeGraphError> {
        let mut parser = Parser::new();
        let grammar = if file_path.ends_with(".tsx") {
            Self::tsx_grammar()
        } else {
            Self::grammar()
        };
        parser
            .set_language(&grammar)
            .map_err(|e| codegraph_core::CodeGraphError::Parse {
                file: file_path.to_string(),
                message: format!("failed to load TypeScript grammar: {e}"),
            })?;
        Ok(parser)
    }

    pub fn owns_extension(ext: &str) -> bool {
        FILE_EXTENSIONS.contains(&ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_ts_and_tsx_parsers() {
        assert!(TypeScriptLanguage::new_parser("a.ts").is_ok());
        assert!(TypeScriptLanguage::new_parser("a.tsx").is_ok());
    }

    #[test]
    fn extension_ownership() {
        assert!(TypeScriptLanguage::owns_extension("ts"));
        assert!(TypeScriptLanguage::owns_extension("tsx"));
        assert!(!TypeScriptLanguage::owns_extension("py"));
    }
}
