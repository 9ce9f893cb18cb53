//! Top-level import extraction from Python source text.
//!
//! The primary path tokenizes the source into logical statements (honouring
//! comments, string literals, bracket nesting and line continuations) and
//! reads `import` / `from ... import` statements from them. When the source
//! cannot be tokenized, extraction degrades to a line-oriented pattern scan
//! instead of failing.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;

/// Distinct top-level module names imported by a script, sorted.
pub type ImportSet = BTreeSet<String>;

static IMPORT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*import\s+(\w+)").expect("valid import pattern"));
static FROM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*from\s+(\w+)\s+import").expect("valid from-import pattern")
});

/// Extract the set of top-level modules imported by `source`.
///
/// For `from X.Y import Z` only `X` is recorded, for `import X.Y` only `X`.
/// Relative imports are skipped. Never fails: untokenizable source falls
/// back to [`scan_import_lines`].
pub fn extract_imports(source: &str) -> ImportSet {
    match tokenize(source) {
        Ok(statements) => {
            let mut imports = ImportSet::new();
            for stmt in &statements {
                collect_statement(stmt, &mut imports);
            }
            imports
        }
        Err(e) => {
            debug!("structured import scan failed ({e}), falling back to line scan");
            scan_import_lines(source)
        }
    }
}

/// Line-oriented fallback: identifiers following `import` / `from` at the
/// start of a line.
pub fn scan_import_lines(source: &str) -> ImportSet {
    let mut imports = ImportSet::new();
    for re in [&*IMPORT_LINE, &*FROM_LINE] {
        for caps in re.captures_iter(source) {
            if let Some(m) = caps.get(1) {
                imports.insert(m.as_str().to_owned());
            }
        }
    }
    imports
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Dot,
    Comma,
    Colon,
    Other,
}

type Statement = Vec<Token>;

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    statements: Vec<Statement>,
    current: Statement,
    depth: usize,
    line: usize,
}

fn tokenize(source: &str) -> Result<Vec<Statement>, String> {
    let mut t = Tokenizer {
        chars: source.chars().peekable(),
        statements: Vec::new(),
        current: Vec::new(),
        depth: 0,
        line: 1,
    };
    t.run()?;
    Ok(t.statements)
}

impl Tokenizer<'_> {
    fn run(&mut self) -> Result<(), String> {
        while let Some(c) = self.chars.next() {
            match c {
                '\n' => {
                    self.line += 1;
                    if self.depth == 0 {
                        self.end_statement();
                    }
                }
                '#' => {
                    while let Some(&n) = self.chars.peek() {
                        if n == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                '\\' => match self.chars.next() {
                    Some('\n') => self.line += 1,
                    Some('\r') if self.chars.peek() == Some(&'\n') => {
                        self.chars.next();
                        self.line += 1;
                    }
                    _ => return Err(format!("stray backslash on line {}", self.line)),
                },
                '\'' | '"' => self.skip_string(c)?,
                '(' | '[' | '{' => {
                    self.depth += 1;
                    self.current.push(Token::Other);
                }
                ')' | ']' | '}' => {
                    if self.depth == 0 {
                        return Err(format!("unbalanced '{c}' on line {}", self.line));
                    }
                    self.depth -= 1;
                    self.current.push(Token::Other);
                }
                ';' if self.depth == 0 => self.end_statement(),
                '.' => self.current.push(Token::Dot),
                ',' => self.current.push(Token::Comma),
                ':' => self.current.push(Token::Colon),
                c if c.is_alphabetic() || c == '_' => {
                    let mut name = String::from(c);
                    while let Some(&n) = self.chars.peek() {
                        if n.is_alphanumeric() || n == '_' {
                            name.push(n);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    let quote = self.chars.peek().copied();
                    if matches!(quote, Some('\'' | '"'))
                        && STRING_PREFIXES.contains(&name.to_ascii_lowercase().as_str())
                    {
                        self.chars.next();
                        self.skip_string(quote.unwrap_or('"'))?;
                    } else {
                        self.current.push(Token::Name(name));
                    }
                }
                c if c.is_whitespace() => {}
                _ => self.current.push(Token::Other),
            }
        }
        if self.depth != 0 {
            return Err("unclosed bracket at end of file".to_owned());
        }
        self.end_statement();
        Ok(())
    }

    fn end_statement(&mut self) {
        if !self.current.is_empty() {
            self.statements.push(std::mem::take(&mut self.current));
        }
    }

    /// Consume a string literal whose opening quote has already been read.
    fn skip_string(&mut self, quote: char) -> Result<(), String> {
        let start = self.line;
        let triple = if self.chars.peek() == Some(&quote) {
            self.chars.next();
            if self.chars.peek() == Some(&quote) {
                self.chars.next();
                true
            } else {
                // Empty string literal.
                self.current.push(Token::Other);
                return Ok(());
            }
        } else {
            false
        };

        let mut run = 0;
        while let Some(c) = self.chars.next() {
            match c {
                '\\' => {
                    if self.chars.next() == Some('\n') {
                        self.line += 1;
                    }
                    run = 0;
                }
                '\n' => {
                    if !triple {
                        return Err(format!("unterminated string on line {start}"));
                    }
                    self.line += 1;
                    run = 0;
                }
                c if c == quote => {
                    if !triple {
                        self.current.push(Token::Other);
                        return Ok(());
                    }
                    run += 1;
                    if run == 3 {
                        self.current.push(Token::Other);
                        return Ok(());
                    }
                }
                _ => run = 0,
            }
        }
        Err(format!("unterminated string starting on line {start}"))
    }
}

fn is_name(token: Option<&Token>, word: &str) -> bool {
    matches!(token, Some(Token::Name(n)) if n == word)
}

fn collect_statement(stmt: &[Token], imports: &mut ImportSet) {
    // `try: import x` and similar one-line compound statements put the
    // import after a colon.
    for (i, token) in stmt.iter().enumerate() {
        let at_start = i == 0 || stmt[i - 1] == Token::Colon;
        if !at_start {
            continue;
        }
        match token {
            Token::Name(k) if k == "import" => collect_import(&stmt[i + 1..], imports),
            Token::Name(k) if k == "from" => collect_from(&stmt[i + 1..], imports),
            _ => {}
        }
    }
}

fn collect_import(rest: &[Token], imports: &mut ImportSet) {
    let mut expect_module = true;
    let mut iter = rest.iter();
    while let Some(token) = iter.next() {
        match token {
            Token::Name(n) if n == "as" => {
                iter.next();
            }
            Token::Name(n) => {
                if expect_module {
                    imports.insert(n.clone());
                    expect_module = false;
                }
            }
            Token::Dot => {}
            Token::Comma => expect_module = true,
            Token::Colon | Token::Other => break,
        }
    }
}

fn collect_from(rest: &[Token], imports: &mut ImportSet) {
    match rest.first() {
        Some(Token::Name(module)) if module != "import" => {
            let has_import = rest.iter().any(|t| is_name(Some(t), "import"));
            if has_import {
                imports.insert(module.clone());
            }
        }
        // Relative (`from . import x`) or malformed.
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> ImportSet {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn plain_and_dotted_imports() {
        let src = "import os\nimport xml.etree.ElementTree as ET\nimport requests, numpy as np\n";
        assert_eq!(extract_imports(src), set(&["numpy", "os", "requests", "xml"]));
    }

    #[test]
    fn from_imports_record_only_the_package() {
        let src = "from flask import Flask, request\nfrom sklearn.linear_model import Ridge\n";
        assert_eq!(extract_imports(src), set(&["flask", "sklearn"]));
    }

    #[test]
    fn relative_imports_are_skipped() {
        let src = "from . import helpers\nfrom .models import User\nfrom ..core import x\n";
        assert!(extract_imports(src).is_empty());
    }

    #[test]
    fn parenthesized_multiline_from_import() {
        let src = "from flask import (\n    Flask,\n    request,\n)\nimport yaml\n";
        assert_eq!(extract_imports(src), set(&["flask", "yaml"]));
    }

    #[test]
    fn imports_inside_strings_and_comments_are_ignored() {
        let src = r#"
# import fake_comment
doc = """
import fake_docstring
"""
s = 'import fake_single'
raw = rb"from fake_bytes import x"
import real
"#;
        assert_eq!(extract_imports(src), set(&["real"]));
    }

    #[test]
    fn nested_and_compound_imports() {
        let src = "def f():\n    import pandas\ntry: import ujson as json\nexcept ImportError: import json\nimport a; import b\n";
        assert_eq!(
            extract_imports(src),
            set(&["a", "b", "json", "pandas", "ujson"])
        );
    }

    #[test]
    fn yield_from_and_raise_from_are_not_imports() {
        let src = "def g():\n    yield from other()\n    raise ValueError() from err\n";
        assert!(extract_imports(src).is_empty());
    }

    #[test]
    fn backslash_continuation() {
        let src = "import os, \\\n    requests\n";
        assert_eq!(extract_imports(src), set(&["os", "requests"]));
    }

    #[test]
    fn invalid_source_falls_back_to_line_scan() {
        let src = "import requests\nfrom yaml import safe_load\nprint('unterminated\ndef broken(:\n";
        assert_eq!(extract_imports(src), set(&["requests", "yaml"]));
    }

    #[test]
    fn unbalanced_brackets_fall_back() {
        let src = "import numpy\nx = (1, 2\nfrom bs4 import BeautifulSoup\n";
        let found = extract_imports(src);
        assert!(found.contains("numpy"));
        assert!(found.contains("bs4"));
    }

    #[test]
    fn line_scan_matches_line_starts_only() {
        let src = "x = 1  # import nothing\n  import os\nfrom re import compile\n";
        assert_eq!(scan_import_lines(src), set(&["os", "re"]));
    }
}
