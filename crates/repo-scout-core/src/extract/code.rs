//! Matchers for program structure: functions, classes, exports, imports,
//! and HTTP route registrations.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{
    clip, collapse_whitespace, find_closing, split_top_level, ExtractError, Extractor, Language,
    SourceFile, MAX_ITEMS_PER_CATEGORY,
};
use crate::models::{ApiRoute, ClassDecl, ExportBinding, ExtractedKnowledge, FunctionSig};

/// How far a bracket search may scan before giving up.
const MAX_BRACKET_SPAN: usize = 64 * 1024;
/// Characters of body kept after a signature.
const BODY_PREVIEW_CHARS: usize = 240;

const NOT_METHOD_NAMES: &[&str] = &[
    "if", "for", "while", "switch", "catch", "function", "return", "with", "typeof", "super",
    "await", "new", "else", "do", "try",
];

static JS_FUNCTION_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?:^|[^\w$.])(?P<async>async\s+)?function\s*\*?\s*(?P<name>[A-Za-z_$][\w$]*)\s*(?:<[^>(]*>)?\s*\(")
        .unwrap()
});
static JS_ASSIGNED_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)\b(?:const|let|var)\s+(?P<name>[A-Za-z_$][\w$]*)\s*(?::[^=\n]+)?=\s*(?P<async>async\s+)?(?:function\b\s*\*?\s*[\w$]*\s*)?\(")
        .unwrap()
});
static JS_SINGLE_PARAM_ARROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)\b(?:const|let|var)\s+(?P<name>[A-Za-z_$][\w$]*)\s*=\s*(?P<async>async\s+)?(?P<param>[A-Za-z_$][\w$]*)\s*=>")
        .unwrap()
});
static JS_METHOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]+(?:(?:public|private|protected|static|readonly|override)\s+)*(?P<async>async\s+)?(?:get\s+|set\s+)?\*?(?P<name>#?[A-Za-z_$][\w$]*)\s*\(")
        .unwrap()
});
static PY_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?P<indent>[ \t]*)(?P<async>async\s+)?def\s+(?P<name>\w+)\s*\(").unwrap()
});
static RUST_FN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^(?P<indent>[ \t]*)(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?P<async>async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+(?P<name>\w+)\s*(?:<[^>(]*>)?\s*\("#)
        .unwrap()
});
static GO_FUNC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^func\s+(?P<recv>\([^)]*\)\s*)?(?P<name>\w+)\s*(?:\[[^\]]*\])?\s*\(").unwrap()
});
static RUBY_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?P<indent>[ \t]*)def\s+(?:self\.)?(?P<name>\w+[?!]?)\s*(?P<params>\([^)]*\))?")
        .unwrap()
});
static JAVA_LIKE_METHOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:(?:public|private|protected|internal|static|final|override|virtual|abstract|async|suspend)\s+)+(?:fun\s+|function\s+)?[\w<>\[\],.? ]*?\b(?P<name>[A-Za-z_]\w*)\s*\(")
        .unwrap()
});

static JS_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?:^|[^\w$.])(?:abstract\s+)?class\s+(?P<name>[A-Za-z_$][\w$]*)(?:\s*<[^>{]*>)?(?:\s+extends\s+(?P<sup>[A-Za-z_$][\w$.]*))?[^{;\n]*\{")
        .unwrap()
});
static PY_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?P<indent>[ \t]*)class\s+(?P<name>\w+)\s*(?:\((?P<sup>[^)]*)\))?\s*:").unwrap()
});

static EXPORT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*export\s+(?:declare\s+)?(?:abstract\s+)?(?:async\s+)?(?:function\*?|class|const|let|var|interface|type|enum)\s+(?P<name>[A-Za-z_$][\w$]*)")
        .unwrap()
});
static EXPORT_DEFAULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*export\s+default\s+(?:async\s+)?(?:(?:function\*?|class)\s*)?(?P<name>[A-Za-z_$][\w$]*)?")
        .unwrap()
});
static EXPORT_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*export\s*(?:type\s*)?\{(?P<list>[^}]*)\}").unwrap());
static MODULE_EXPORTS_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"module\.exports\s*=\s*\{(?P<list>[^}]*)\}").unwrap());
static MODULE_EXPORTS_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)module\.exports\s*=\s*(?P<name>[A-Za-z_$][\w$]*)\s*;?\s*$").unwrap()
});
static EXPORTS_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:module\.)?exports\.(?P<name>[A-Za-z_$][\w$]*)\s*=").unwrap()
});

static JS_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\s+(?:type\s+)?(?:[\w*{}\s,$]+\s+from\s+)?['"](?P<spec>[^'"\n]+)['"]"#).unwrap()
});
static JS_REQUIRE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:require|import)\(\s*['"](?P<spec>[^'"\n]+)['"]\s*\)"#).unwrap()
});
static PY_FROM_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*from\s+(?P<spec>[\w.]+)\s+import\b").unwrap());
static PY_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*import\s+(?P<spec>[\w.]+)").unwrap());
static RUST_USE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:pub\s+)?use\s+(?P<spec>[\w:]+)").unwrap());
static GO_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*(?:import\s+)?(?:\w+\s+)?"(?P<spec>[\w./-]+)"\s*$"#).unwrap());
static RUBY_REQUIRE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*require(?:_relative)?\s+['"](?P<spec>[^'"]+)['"]"#).unwrap()
});

static ROUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?P<obj>[A-Za-z_$][\w$]*)\.(?P<verb>get|post|put|patch|delete|del|options|head|all)\s*\(\s*(?:'(?P<p1>[^'\n]*)'|"(?P<p2>[^"\n]*)"|`(?P<p3>[^`\n]*)`)\s*,"#)
        .unwrap()
});

/// Functions, assigned function expressions, and methods.
pub struct FunctionExtractor;

impl Extractor for FunctionExtractor {
    fn name(&self) -> &'static str {
        "functions"
    }

    fn applies_to(&self, file: &SourceFile<'_>) -> bool {
        file.is_code()
    }

    fn extract(
        &self,
        file: &SourceFile<'_>,
        out: &mut ExtractedKnowledge,
    ) -> Result<(), ExtractError> {
        let text = file.content;
        let mut seen_parens = HashSet::new();
        let push = |sig: Option<FunctionSig>, out: &mut ExtractedKnowledge| {
            if let Some(sig) = sig {
                if out.functions.len() < MAX_ITEMS_PER_CATEGORY {
                    out.functions.push(sig);
                }
            }
        };

        match file.language {
            Language::JavaScript => {
                for caps in JS_FUNCTION_DECL.captures_iter(text) {
                    let sig = signature_from_paren(text, &caps, false, &mut seen_parens);
                    push(sig, out);
                }
                for caps in JS_ASSIGNED_FUNCTION.captures_iter(text) {
                    let sig = assigned_function(text, &caps, &mut seen_parens);
                    push(sig, out);
                }
                for caps in JS_SINGLE_PARAM_ARROW.captures_iter(text) {
                    let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
                    let name = caps.name("name").map(|m| m.as_str()).unwrap_or_default();
                    let param = caps.name("param").map(|m| m.as_str()).unwrap_or_default();
                    let end = caps.get(0).map(|m| m.end()).unwrap_or(0);
                    push(
                        Some(FunctionSig {
                            name: name.to_string(),
                            params: vec![param.to_string()],
                            is_async: caps.name("async").is_some(),
                            is_method: false,
                            snippet: with_body_preview(text, whole, end),
                        }),
                        out,
                    );
                }
                for class in class_bodies(text) {
                    let body = &text[class.0..class.1];
                    for caps in JS_METHOD.captures_iter(body) {
                        let sig = method_in_body(text, class.0, &caps, &mut seen_parens);
                        push(sig, out);
                    }
                }
            }
            Language::Python => {
                for caps in PY_DEF.captures_iter(text) {
                    let is_method = caps.name("indent").map_or(false, |m| !m.as_str().is_empty());
                    let sig = signature_from_paren(text, &caps, is_method, &mut seen_parens);
                    push(sig, out);
                }
            }
            Language::Rust => {
                for caps in RUST_FN.captures_iter(text) {
                    let is_method = caps.name("indent").map_or(false, |m| !m.as_str().is_empty());
                    let sig = signature_from_paren(text, &caps, is_method, &mut seen_parens);
                    push(sig, out);
                }
            }
            Language::Go => {
                for caps in GO_FUNC.captures_iter(text) {
                    let is_method = caps.name("recv").is_some();
                    let sig = signature_from_paren(text, &caps, is_method, &mut seen_parens);
                    push(sig, out);
                }
            }
            Language::Ruby => {
                for caps in RUBY_DEF.captures_iter(text) {
                    let name = caps.name("name").map(|m| m.as_str()).unwrap_or_default();
                    let params = caps
                        .name("params")
                        .map(|m| split_top_level(m.as_str().trim_matches(|c: char| c == '(' || c == ')')))
                        .unwrap_or_default();
                    let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
                    push(
                        Some(FunctionSig {
                            name: name.to_string(),
                            params,
                            is_async: false,
                            is_method: caps.name("indent").map_or(false, |m| !m.as_str().is_empty()),
                            snippet: collapse_whitespace(whole),
                        }),
                        out,
                    );
                }
            }
            Language::OtherCode => {
                for caps in JAVA_LIKE_METHOD.captures_iter(text) {
                    let name = caps.name("name").map(|m| m.as_str()).unwrap_or_default();
                    if NOT_METHOD_NAMES.contains(&name) {
                        continue;
                    }
                    let sig = signature_from_paren(text, &caps, true, &mut seen_parens);
                    push(sig, out);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Build a signature for a match whose last character is the opening `(`.
fn signature_from_paren(
    text: &str,
    caps: &Captures<'_>,
    is_method: bool,
    seen_parens: &mut HashSet<usize>,
) -> Option<FunctionSig> {
    let whole = caps.get(0)?;
    let open = whole.end() - 1;
    if !seen_parens.insert(open) {
        return None;
    }
    let close = find_closing(text, open, MAX_BRACKET_SPAN)?;
    let params = split_top_level(&text[open + 1..close]);
    let start = whole.start() + leading_boundary_len(whole.as_str());
    let signature = &text[start..=close];
    Some(FunctionSig {
        name: caps.name("name")?.as_str().to_string(),
        params,
        is_async: caps.name("async").is_some(),
        is_method,
        snippet: with_body_preview(text, signature, close + 1),
    })
}

/// `const name = (...) => ...` or `const name = function (...) {...}`.
fn assigned_function(
    text: &str,
    caps: &Captures<'_>,
    seen_parens: &mut HashSet<usize>,
) -> Option<FunctionSig> {
    let whole = caps.get(0)?;
    let open = whole.end() - 1;
    let close = find_closing(text, open, MAX_BRACKET_SPAN)?;
    let is_function_keyword = whole.as_str().contains("function");
    if !is_function_keyword {
        // Only an arrow function when `=>` follows the parameter list
        // (optionally after a return type annotation).
        let rest = &text[close + 1..];
        let lookahead: String = rest.chars().take(120).collect();
        let arrow = lookahead.find("=>")?;
        let before = &lookahead[..arrow];
        if before.contains(['{', ';', '\n', '=']) {
            return None;
        }
    }
    signature_from_paren(text, caps, false, seen_parens)
}

fn method_in_body(
    text: &str,
    body_offset: usize,
    caps: &Captures<'_>,
    seen_parens: &mut HashSet<usize>,
) -> Option<FunctionSig> {
    let name = caps.name("name")?.as_str();
    if NOT_METHOD_NAMES.contains(&name) {
        return None;
    }
    let whole = caps.get(0)?;
    let open = body_offset + whole.end() - 1;
    if seen_parens.contains(&open) {
        return None;
    }
    let close = find_closing(text, open, MAX_BRACKET_SPAN)?;
    // A method definition is followed by its body (optionally after a
    // return type), not by `;` or an operator as a call would be.
    let after: String = text[close + 1..].chars().take(80).collect();
    let after = after.trim_start();
    let has_body = after.starts_with('{')
        || (after.starts_with(':') && after.find('{').map_or(false, |i| !after[..i].contains(';')));
    if !has_body {
        return None;
    }
    seen_parens.insert(open);
    let start = body_offset + whole.start();
    let signature = text[start..=close].trim_start();
    Some(FunctionSig {
        name: name.to_string(),
        params: split_top_level(&text[open + 1..close]),
        is_async: caps.name("async").is_some(),
        is_method: true,
        snippet: with_body_preview(text, signature, close + 1),
    })
}

/// Length of the non-identifier character a `(?:^|[^\w$.])` prefix consumed.
fn leading_boundary_len(matched: &str) -> usize {
    match matched.chars().next() {
        Some(c) if !(c.is_alphanumeric() || c == '_' || c == '$') => c.len_utf8(),
        _ => 0,
    }
}

fn with_body_preview(text: &str, signature: &str, after: usize) -> String {
    let mut snippet = collapse_whitespace(signature);
    let rest = &text[after.min(text.len())..];
    let trimmed = rest.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with("=>") || trimmed.starts_with(':') {
        let preview: String = trimmed.chars().take(BODY_PREVIEW_CHARS).collect();
        let preview = collapse_whitespace(&preview);
        if !preview.is_empty() {
            snippet.push(' ');
            snippet.push_str(&clip(&preview, BODY_PREVIEW_CHARS));
        }
    }
    snippet
}

/// Byte ranges of JS/TS class bodies (exclusive of the braces).
fn class_bodies(text: &str) -> Vec<(usize, usize)> {
    JS_CLASS
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let open = whole.end() - 1;
            let close = find_closing(text, open, MAX_BRACKET_SPAN * 4)?;
            Some((open + 1, close))
        })
        .collect()
}

/// Class declarations with superclass and method names.
pub struct ClassExtractor;

impl Extractor for ClassExtractor {
    fn name(&self) -> &'static str {
        "classes"
    }

    fn applies_to(&self, file: &SourceFile<'_>) -> bool {
        matches!(
            file.language,
            Language::JavaScript | Language::Python | Language::OtherCode
        )
    }

    fn extract(
        &self,
        file: &SourceFile<'_>,
        out: &mut ExtractedKnowledge,
    ) -> Result<(), ExtractError> {
        let text = file.content;
        if file.language == Language::Python {
            for caps in PY_CLASS.captures_iter(text) {
                if out.classes.len() >= MAX_ITEMS_PER_CATEGORY {
                    break;
                }
                out.classes.push(python_class(text, &caps));
            }
            return Ok(());
        }

        for caps in JS_CLASS.captures_iter(text) {
            if out.classes.len() >= MAX_ITEMS_PER_CATEGORY {
                break;
            }
            let Some(whole) = caps.get(0) else { continue };
            let open = whole.end() - 1;
            let close = find_closing(text, open, MAX_BRACKET_SPAN * 4)
                .ok_or(ExtractError::Unbalanced(open))?;
            let body = &text[open + 1..close];
            let mut methods = Vec::new();
            for m in JS_METHOD.captures_iter(body) {
                let Some(name) = m.name("name").map(|n| n.as_str()) else {
                    continue;
                };
                if NOT_METHOD_NAMES.contains(&name) || methods.iter().any(|x| x == name) {
                    continue;
                }
                let Some(paren) = m.get(0).map(|g| open + 1 + g.end() - 1) else {
                    continue;
                };
                let Some(pclose) = find_closing(text, paren, MAX_BRACKET_SPAN) else {
                    continue;
                };
                let after = text[pclose + 1..].trim_start();
                if after.starts_with('{') || after.starts_with(':') {
                    methods.push(name.to_string());
                }
            }
            out.classes.push(ClassDecl {
                name: caps.name("name").map(|m| m.as_str().to_string()).unwrap_or_default(),
                superclass: caps.name("sup").map(|m| m.as_str().to_string()),
                methods,
            });
        }
        Ok(())
    }
}

fn python_class(text: &str, caps: &Captures<'_>) -> ClassDecl {
    let indent = caps.name("indent").map_or(0, |m| m.as_str().len());
    let body_start = caps.get(0).map_or(text.len(), |m| m.end());
    let mut methods = Vec::new();
    for line in text[body_start..].lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let line_indent = line.len() - line.trim_start().len();
        if line_indent <= indent {
            break;
        }
        let trimmed = line.trim_start();
        let def = trimmed
            .strip_prefix("async def ")
            .or_else(|| trimmed.strip_prefix("def "));
        if let Some(rest) = def {
            if let Some(name) = rest.split('(').next() {
                methods.push(name.trim().to_string());
            }
        }
    }
    let superclass = caps
        .name("sup")
        .and_then(|m| m.as_str().split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "object" && !s.contains('='));
    ClassDecl {
        name: caps.name("name").map(|m| m.as_str().to_string()).unwrap_or_default(),
        superclass,
        methods,
    }
}

/// Named and default export bindings (ES modules and CommonJS).
pub struct ExportExtractor;

impl Extractor for ExportExtractor {
    fn name(&self) -> &'static str {
        "exports"
    }

    fn applies_to(&self, file: &SourceFile<'_>) -> bool {
        file.language == Language::JavaScript
    }

    fn extract(
        &self,
        file: &SourceFile<'_>,
        out: &mut ExtractedKnowledge,
    ) -> Result<(), ExtractError> {
        let text = file.content;
        let add = |name: &str, is_default: bool, out: &mut ExtractedKnowledge| {
            let name = name.trim();
            if name.is_empty() || out.exports.len() >= MAX_ITEMS_PER_CATEGORY {
                return;
            }
            if out
                .exports
                .iter()
                .any(|e| e.name == name && e.is_default == is_default)
            {
                return;
            }
            out.exports.push(ExportBinding {
                name: name.to_string(),
                is_default,
            });
        };

        for caps in EXPORT_DECL.captures_iter(text) {
            if let Some(name) = caps.name("name") {
                add(name.as_str(), false, out);
            }
        }
        for caps in EXPORT_DEFAULT.captures_iter(text) {
            let name = caps.name("name").map_or("default", |m| m.as_str());
            add(name, true, out);
        }
        for caps in EXPORT_LIST.captures_iter(text) {
            let list = caps.name("list").map_or("", |m| m.as_str());
            for item in list.split(',') {
                let item = item.trim();
                if item.is_empty() {
                    continue;
                }
                let exported = item.rsplit(" as ").next().unwrap_or(item).trim();
                if exported == "default" {
                    add(item.split(" as ").next().unwrap_or(item), true, out);
                } else {
                    add(exported, false, out);
                }
            }
        }
        for caps in MODULE_EXPORTS_OBJECT.captures_iter(text) {
            let list = caps.name("list").map_or("", |m| m.as_str());
            for item in split_top_level(list) {
                let key = item.split(':').next().unwrap_or(&item).trim();
                let key = key.trim_start_matches("async ").trim();
                let key = key.split('(').next().unwrap_or(key).trim();
                if key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                    add(key, false, out);
                }
            }
        }
        for caps in MODULE_EXPORTS_NAME.captures_iter(text) {
            if let Some(name) = caps.name("name") {
                add(name.as_str(), true, out);
            }
        }
        for caps in EXPORTS_PROPERTY.captures_iter(text) {
            if let Some(name) = caps.name("name") {
                add(name.as_str(), false, out);
            }
        }
        Ok(())
    }
}

/// Import specifiers. Only recorded as scoring hints.
pub struct ImportExtractor;

impl Extractor for ImportExtractor {
    fn name(&self) -> &'static str {
        "imports"
    }

    fn applies_to(&self, file: &SourceFile<'_>) -> bool {
        file.is_code()
    }

    fn extract(
        &self,
        file: &SourceFile<'_>,
        out: &mut ExtractedKnowledge,
    ) -> Result<(), ExtractError> {
        let patterns: Vec<&Regex> = match file.language {
            Language::JavaScript => vec![&*JS_IMPORT, &*JS_REQUIRE],
            Language::Python => vec![&*PY_FROM_IMPORT, &*PY_IMPORT],
            Language::Rust => vec![&*RUST_USE],
            Language::Go => vec![&*GO_IMPORT],
            Language::Ruby => vec![&*RUBY_REQUIRE],
            _ => Vec::new(),
        };
        for pattern in patterns {
            for caps in pattern.captures_iter(file.content) {
                let Some(spec) = caps.name("spec") else { continue };
                let spec = spec.as_str().to_string();
                if !out.imports.contains(&spec) && out.imports.len() < MAX_ITEMS_PER_CATEGORY {
                    out.imports.push(spec);
                }
            }
        }
        Ok(())
    }
}

/// `<object>.<verb>('<path>', ..., handler)` route registrations.
pub struct RouteExtractor;

impl Extractor for RouteExtractor {
    fn name(&self) -> &'static str {
        "routes"
    }

    fn applies_to(&self, file: &SourceFile<'_>) -> bool {
        file.is_code()
    }

    fn extract(
        &self,
        file: &SourceFile<'_>,
        out: &mut ExtractedKnowledge,
    ) -> Result<(), ExtractError> {
        let text = file.content;
        for caps in ROUTE.captures_iter(text) {
            if out.routes.len() >= MAX_ITEMS_PER_CATEGORY {
                break;
            }
            let path = caps
                .name("p1")
                .or_else(|| caps.name("p2"))
                .or_else(|| caps.name("p3"))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if !(path.starts_with('/') || path == "*") {
                continue;
            }
            let Some(verb) = caps.name("verb") else { continue };
            let Some(open) = text[verb.end()..].find('(').map(|i| verb.end() + i) else {
                continue;
            };
            let handler = find_closing(text, open, MAX_BRACKET_SPAN)
                .map(|close| route_handler(&text[open + 1..close]))
                .unwrap_or_else(|| "anonymous".to_string());
            let method = match verb.as_str() {
                "del" => "DELETE".to_string(),
                "all" => "ALL".to_string(),
                v => v.to_ascii_uppercase(),
            };
            out.routes.push(ApiRoute {
                object: caps.name("obj").map(|m| m.as_str().to_string()).unwrap_or_default(),
                method,
                path: path.to_string(),
                handler,
            });
        }
        Ok(())
    }
}

/// The last argument of a route call, which is conventionally the handler.
fn route_handler(args: &str) -> String {
    let parts = split_top_level(args);
    let Some(last) = parts.last().filter(|_| parts.len() > 1) else {
        return "anonymous".to_string();
    };
    let inline = last.starts_with("function")
        || last.starts_with("async")
        || last.starts_with('(')
        || last.contains("=>");
    if inline {
        "inline handler".to_string()
    } else {
        clip(last, 80)
    }
}
