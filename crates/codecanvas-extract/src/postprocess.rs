//! Per-language helpers for naming and nesting
//!
//! Bounded helpers only: receiver types for externally-attached methods,
//! `impl` block targets, and pointer declarator unwrapping. Anything deeper
//! belongs to the language server path.

use tree_sitter::Node;

use crate::language::Lang;

/// Text of `node`, empty on decode failure.
fn text(node: Node, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or_default().to_string()
}

/// Name of an enclosing container node, when `node` is one.
fn container_name(node: Node, lang: Lang, source: &[u8]) -> Option<String> {
    match (lang, node.kind()) {
        (Lang::Python, "class_definition" | "function_definition")
        | (Lang::Rust, "function_item" | "mod_item")
        | (Lang::TypeScript, "class_declaration" | "function_declaration")
        | (Lang::JavaScript, "class_declaration" | "function_declaration")
        | (Lang::Go, "function_declaration")
        | (Lang::Java, "class_declaration" | "interface_declaration" | "enum_declaration")
        | (Lang::Cpp, "class_specifier" | "struct_specifier") => {
            node.child_by_field_name("name").map(|n| text(n, source))
        }
        (Lang::Rust, "impl_item") => impl_target(node, source),
        (Lang::TypeScript | Lang::JavaScript, "method_definition") => {
            node.child_by_field_name("name").map(|n| text(n, source))
        }
        _ => None,
    }
}

/// The implementing type of a Rust `impl` block (`impl Trait for Type` and
/// plain `impl Type` both yield `Type`), with generic arguments stripped.
pub fn impl_target(node: Node, source: &[u8]) -> Option<String> {
    let ty = node.child_by_field_name("type")?;
    let raw = text(ty, source);
    let base = raw.split('<').next().unwrap_or(&raw);
    Some(base.trim().to_string())
}

/// Receiver type of a Go `method_declaration`, pointer stripped:
/// `func (s *Server) run()` yields `Server`.
pub fn go_receiver(node: Node, source: &[u8]) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    for child in receiver.named_children(&mut cursor) {
        if child.kind() != "parameter_declaration" {
            continue;
        }
        let mut ty = child.child_by_field_name("type")?;
        // Unwrap `*T` and `T[...]` down to the named type.
        loop {
            match ty.kind() {
                "pointer_type" | "generic_type" => {
                    let Some(inner) = ty.named_child(0) else { break };
                    ty = inner;
                }
                _ => break,
            }
        }
        return Some(text(ty, source));
    }
    None
}

/// Descend a C/C++ declarator chain (`*(*fn_ptr)(...)`) to the identifier
/// naming the function.
pub fn unwrap_declarator(node: Node, source: &[u8]) -> Option<String> {
    let mut current = node.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "identifier" | "field_identifier" | "qualified_identifier" => {
                return Some(text(current, source));
            }
            _ => {
                if let Some(next) = current.child_by_field_name("declarator") {
                    current = next;
                } else {
                    return None;
                }
            }
        }
    }
}

/// Dotted qualified name for a definition node: the enclosing container
/// chain (outermost first) joined with the definition's own name.
pub fn qualname(def_node: Node, lang: Lang, source: &[u8], name: &str) -> String {
    let mut chain: Vec<String> = Vec::new();

    // Methods attached via a receiver declaration nest under the receiver
    // type even though the syntax tree keeps them at top level.
    if lang == Lang::Go && def_node.kind() == "method_declaration" {
        if let Some(recv) = go_receiver(def_node, source) {
            chain.push(recv);
        }
    }

    let mut ancestors: Vec<String> = Vec::new();
    let mut current = def_node.parent();
    while let Some(node) = current {
        if let Some(container) = container_name(node, lang, source) {
            ancestors.push(container);
        }
        current = node.parent();
    }
    ancestors.reverse();

    let mut parts = ancestors;
    parts.extend(chain);
    parts.push(name.to_string());
    parts.join(".")
}
