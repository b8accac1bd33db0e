//! Language bindings. Single member today (TypeScript); kept as its own
//! module to mirror the teacher's `LanguageRegistry` shape for whoever
//! adds the next grammar.

pub mod typescript;

pub use typescript::TypeScriptLanguage;
