//! Unit tests for the syntactic extractor

use std::path::Path;

use crate::extractor::{DefKind, ExtractionTier, Extractor};
use crate::language::Lang;
use crate::parser_pool::ParserPool;

fn extractor() -> Extractor {
    Extractor::new(ParserPool::new(2))
}

fn extract(lang: Lang, content: &str) -> crate::extractor::FileExtraction {
    extractor()
        .extract_blocking(lang, Path::new("test-input"), content.to_string())
        .unwrap()
}

#[test]
fn python_definitions_imports_and_calls() {
    let src = r#"
import os
from collections import OrderedDict

class Outer:
    class Inner:
        def method(self):
            helper()

def helper():
    print("x")
"#;
    let out = extract(Lang::Python, src);
    assert_eq!(out.tier, ExtractionTier::Custom);

    let quals: Vec<_> = out.definitions.iter().map(|d| d.qualname.as_str()).collect();
    assert!(quals.contains(&"Outer"));
    assert!(quals.contains(&"Outer.Inner"));
    assert!(quals.contains(&"Outer.Inner.method"));
    assert!(quals.contains(&"helper"));

    let specs: Vec<_> = out.imports.iter().map(|i| i.spec.as_str()).collect();
    assert!(specs.contains(&"os"));
    assert!(specs.contains(&"collections"));

    let targets: Vec<_> = out.call_sites.iter().map(|c| c.target.as_str()).collect();
    assert!(targets.contains(&"helper"));
    assert!(targets.contains(&"print"));
}

#[test]
fn python_method_kinds_and_ranges() {
    let src = "class C:\n    def m(self):\n        pass\n";
    let out = extract(Lang::Python, src);
    let class_def = out
        .definitions
        .iter()
        .find(|d| d.qualname == "C")
        .expect("class definition");
    assert_eq!(class_def.kind, DefKind::Class);
    let method = out
        .definitions
        .iter()
        .find(|d| d.qualname == "C.m")
        .expect("method definition");
    assert_eq!(method.kind, DefKind::Func);
    assert!(method.range.start_line >= class_def.range.start_line);
    assert!(method.range.end_line <= class_def.range.end_line);
}

#[test]
fn rust_impl_methods_nest_under_the_type() {
    let src = r#"
struct Server;

impl Server {
    fn run(&self) {
        self.step();
    }

    fn step(&self) {}
}

fn main() {
    helper();
}
"#;
    let out = extract(Lang::Rust, src);
    let quals: Vec<_> = out.definitions.iter().map(|d| d.qualname.as_str()).collect();
    assert!(quals.contains(&"Server"));
    assert!(quals.contains(&"Server.run"));
    assert!(quals.contains(&"Server.step"));
    assert!(quals.contains(&"main"));

    let targets: Vec<_> = out.call_sites.iter().map(|c| c.target.as_str()).collect();
    assert!(targets.contains(&"step"));
    assert!(targets.contains(&"helper"));
}

#[test]
fn rust_use_declarations_are_imports() {
    let src = "use std::collections::HashMap;\nfn f() { let _m: HashMap<u8, u8>; }\n";
    let out = extract(Lang::Rust, src);
    assert!(out
        .imports
        .iter()
        .any(|i| i.spec.contains("std::collections::HashMap")));
}

#[test]
fn typescript_classes_and_member_calls() {
    let src = r#"
import { api } from "./api";

export class Store {
    load(): void {
        api.fetch();
    }
}

function boot() {
    const s = new Store();
    s.load();
}
"#;
    let out = extract(Lang::TypeScript, src);
    let quals: Vec<_> = out.definitions.iter().map(|d| d.qualname.as_str()).collect();
    assert!(quals.contains(&"Store"));
    assert!(quals.contains(&"Store.load"));
    assert!(quals.contains(&"boot"));

    assert!(out.imports.iter().any(|i| i.spec == "./api"));
    let targets: Vec<_> = out.call_sites.iter().map(|c| c.target.as_str()).collect();
    assert!(targets.contains(&"fetch"));
    assert!(targets.contains(&"load"));
}

#[test]
fn go_methods_nest_under_receiver_type() {
    let src = r#"
package main

import "fmt"

type Server struct{}

func (s *Server) Run() {
    s.step()
}

func (s *Server) step() {}

func main() {
    fmt.Println("x")
}
"#;
    let out = extract(Lang::Go, src);
    let quals: Vec<_> = out.definitions.iter().map(|d| d.qualname.as_str()).collect();
    assert!(quals.contains(&"Server"));
    assert!(quals.contains(&"Server.Run"));
    assert!(quals.contains(&"Server.step"));
    assert!(quals.contains(&"main"));

    assert!(out.imports.iter().any(|i| i.spec == "fmt"));
    let targets: Vec<_> = out.call_sites.iter().map(|c| c.target.as_str()).collect();
    assert!(targets.contains(&"step"));
    assert!(targets.contains(&"Println"));
}

#[test]
fn java_uses_generic_tier() {
    let src = r#"
public class Greeter {
    public String greet(String name) {
        return "hi " + name;
    }
}
"#;
    let out = extract(Lang::Java, src);
    assert_eq!(out.tier, ExtractionTier::Generic);
    let quals: Vec<_> = out.definitions.iter().map(|d| d.qualname.as_str()).collect();
    assert!(quals.contains(&"Greeter"));
    assert!(quals.contains(&"Greeter.greet"));
    // Generic tier never extracts imports or call sites.
    assert!(out.imports.is_empty());
    assert!(out.call_sites.is_empty());
}

#[test]
fn generic_tier_skips_invocations() {
    // method_invocation contains "method" but is not a declaration shape.
    let src = "class A { void f() { g(); } void g() {} }\n";
    let out = extract(Lang::Java, src);
    let funcs: Vec<_> = out
        .definitions
        .iter()
        .filter(|d| d.kind == DefKind::Func)
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(funcs.len(), 2, "only the two declarations: {funcs:?}");
}

#[test]
fn c_function_names_unwrap_declarators() {
    let src = "static int *lookup(int key) { return 0; }\n";
    let out = extract(Lang::C, src);
    assert!(out
        .definitions
        .iter()
        .any(|d| d.kind == DefKind::Func && d.name == "lookup"));
}

#[test]
fn unsupported_extension_yields_empty_extraction() {
    let out = tokio_block_on(async {
        extractor()
            .extract_path(Path::new("README.md"))
            .await
            .unwrap()
    });
    assert_eq!(out.tier, ExtractionTier::Unsupported);
    assert!(out.definitions.is_empty());
}

#[test]
fn empty_file_parses_with_no_definitions() {
    let out = extract(Lang::Python, "");
    assert_eq!(out.tier, ExtractionTier::Custom);
    assert!(out.definitions.is_empty());
    assert!(out.imports.is_empty());
    assert!(out.call_sites.is_empty());
}

#[test]
fn snippets_hold_the_first_definition_line() {
    let out = extract(Lang::Python, "def foo():\n    return 1\n");
    let def = &out.definitions[0];
    assert_eq!(def.snippet, "def foo():");
}

fn tokio_block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}
