//! Declarative query schemas
//!
//! Tier 1 languages register a custom query using a fixed capture vocabulary;
//! every other grammar runs the generic definition-only query. Queries are
//! compiled once per language and reused across the parser pool.

use std::sync::OnceLock;

use tree_sitter::Query;

use crate::language::Lang;

pub const CAP_DEF_CLASS_NODE: &str = "def.class.node";
pub const CAP_DEF_CLASS_NAME: &str = "def.class.name";
pub const CAP_DEF_FUNC_NODE: &str = "def.func.node";
pub const CAP_DEF_FUNC_NAME: &str = "def.func.name";
pub const CAP_IMPORT_SPEC: &str = "import.spec";
pub const CAP_CALL_TARGET: &str = "call.target";

const PYTHON_QUERY: &str = r#"
(class_definition name: (identifier) @def.class.name) @def.class.node
(function_definition name: (identifier) @def.func.name) @def.func.node
(import_statement name: (dotted_name) @import.spec)
(import_statement name: (aliased_import name: (dotted_name) @import.spec))
(import_from_statement module_name: (dotted_name) @import.spec)
(import_from_statement module_name: (relative_import) @import.spec)
(call function: (identifier) @call.target)
(call function: (attribute attribute: (identifier) @call.target))
"#;

const RUST_QUERY: &str = r#"
(struct_item name: (type_identifier) @def.class.name) @def.class.node
(enum_item name: (type_identifier) @def.class.name) @def.class.node
(trait_item name: (type_identifier) @def.class.name) @def.class.node
(function_item name: (identifier) @def.func.name) @def.func.node
(function_signature_item name: (identifier) @def.func.name) @def.func.node
(use_declaration argument: (_) @import.spec)
(call_expression function: (identifier) @call.target)
(call_expression function: (scoped_identifier name: (identifier) @call.target))
(call_expression function: (field_expression field: (field_identifier) @call.target))
"#;

const TYPESCRIPT_QUERY: &str = r#"
(class_declaration name: (type_identifier) @def.class.name) @def.class.node
(interface_declaration name: (type_identifier) @def.class.name) @def.class.node
(enum_declaration name: (identifier) @def.class.name) @def.class.node
(function_declaration name: (identifier) @def.func.name) @def.func.node
(method_definition name: (property_identifier) @def.func.name) @def.func.node
(import_statement source: (string) @import.spec)
(call_expression function: (identifier) @call.target)
(call_expression function: (member_expression property: (property_identifier) @call.target))
"#;

const JAVASCRIPT_QUERY: &str = r#"
(class_declaration name: (identifier) @def.class.name) @def.class.node
(function_declaration name: (identifier) @def.func.name) @def.func.node
(method_definition name: (property_identifier) @def.func.name) @def.func.node
(import_statement source: (string) @import.spec)
(call_expression function: (identifier) @call.target)
(call_expression function: (member_expression property: (property_identifier) @call.target))
"#;

const GO_QUERY: &str = r#"
(type_declaration (type_spec name: (type_identifier) @def.class.name)) @def.class.node
(function_declaration name: (identifier) @def.func.name) @def.func.node
(method_declaration name: (field_identifier) @def.func.name) @def.func.node
(import_spec path: (interpreted_string_literal) @import.spec)
(call_expression function: (identifier) @call.target)
(call_expression function: (selector_expression field: (field_identifier) @call.target))
"#;

/// The generic fallback: every named node, classified later by node kind.
const GENERIC_QUERY: &str = "(_) @node";

fn lang_index(lang: Lang) -> usize {
    match lang {
        Lang::Python => 0,
        Lang::Rust => 1,
        Lang::TypeScript => 2,
        Lang::JavaScript => 3,
        Lang::Go => 4,
        Lang::Java => 5,
        Lang::C => 6,
        Lang::Cpp => 7,
    }
}

static TIER1: [OnceLock<Query>; 8] = [const { OnceLock::new() }; 8];
static GENERIC: [OnceLock<Query>; 8] = [const { OnceLock::new() }; 8];

/// Compiled Tier 1 query for `lang`, if a custom schema is registered.
pub fn tier1_query(lang: Lang) -> Option<&'static Query> {
    let source = match lang {
        Lang::Python => PYTHON_QUERY,
        Lang::Rust => RUST_QUERY,
        Lang::TypeScript => TYPESCRIPT_QUERY,
        Lang::JavaScript => JAVASCRIPT_QUERY,
        Lang::Go => GO_QUERY,
        _ => return None,
    };
    Some(TIER1[lang_index(lang)].get_or_init(|| {
        Query::new(&lang.grammar(), source).expect("tier 1 query must compile")
    }))
}

/// Compiled generic query for `lang`.
pub fn generic_query(lang: Lang) -> &'static Query {
    GENERIC[lang_index(lang)].get_or_init(|| {
        Query::new(&lang.grammar(), GENERIC_QUERY).expect("generic query must compile")
    })
}

/// Classify a node-type name into a definition kind.
///
/// Declaration-shaped node kinds only: `method_declaration` is a definition,
/// `method_invocation` is not.
pub fn classify_kind(kind_name: &str) -> Option<crate::extractor::DefKind> {
    let declares = ["definition", "declaration", "item", "spec"]
        .iter()
        .any(|s| kind_name.contains(s));
    if !declares {
        return None;
    }
    let class_like = ["class", "struct", "interface", "enum", "trait", "module"]
        .iter()
        .any(|s| kind_name.contains(s));
    if class_like {
        return Some(crate::extractor::DefKind::Class);
    }
    let func_like = ["function", "method", "constructor"]
        .iter()
        .any(|s| kind_name.contains(s));
    if func_like {
        return Some(crate::extractor::DefKind::Func);
    }
    None
}
