//! Source front-end of the host driver.
//!
//! Kernel bodies run as host code, so "compiling" device source means
//! validating it the way a device compiler front-end would and extracting
//! every kernel signature. Diagnostics use the familiar
//! `file:line:col: error: message` layout.

use crate::driver::status::{self, Status};
use crate::driver::{AddressQualifier, ArgInfo};
use std::collections::HashSet;

/// Build options accepted by the host compiler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOptions {
    pub warnings_as_errors: bool,
    pub suppress_warnings: bool,
    pub disable_optimizations: bool,
    pub strict_aliasing: bool,
    pub unsafe_math: bool,
    pub defines: Vec<(String, Option<String>)>,
    pub include_dirs: Vec<String>,
}

/// Entry point declared in device source.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSignature {
    pub name: String,
    pub params: Vec<ArgInfo>,
    pub line: usize,
}

/// Successful build output.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub kernels: Vec<KernelSignature>,
    pub options: ParsedOptions,
}

impl CompiledUnit {
    pub fn kernel(&self, name: &str) -> Option<&KernelSignature> {
        self.kernels.iter().find(|k| k.name == name)
    }
}

/// Device facts the front-end checks source against.
#[derive(Debug, Clone, Default)]
pub struct TargetInfo {
    pub extensions: HashSet<String>,
    pub double_precision: bool,
}

/// Compiles `source`; on failure returns the status and the build log.
pub fn compile(
    source: &str,
    filename: &str,
    options: &str,
    target: &TargetInfo,
) -> Result<(CompiledUnit, String), (Status, String)> {
    let options = match parse_options(options) {
        Ok(o) => o,
        Err(msg) => return Err((status::INVALID_BUILD_OPTIONS, format!("error: {}", msg))),
    };

    let mut diag = Diagnostics::new(filename, &options);
    let tokens = Lexer::new(source).run(&mut diag);

    check_brackets(&tokens, &mut diag);
    check_directives(&tokens, target, &mut diag);
    if !target.double_precision {
        check_double(&tokens, &mut diag);
    }

    // Signatures are only meaningful with balanced delimiters.
    let kernels = if diag.errors == 0 {
        parse_kernels(&tokens, &mut diag)
    } else {
        Vec::new()
    };

    let log = diag.render();
    if diag.errors > 0 {
        return Err((status::BUILD_PROGRAM_FAILURE, log));
    }

    Ok((CompiledUnit { kernels, options }, log))
}

pub fn parse_options(options: &str) -> Result<ParsedOptions, String> {
    const ACCEPTED: &[&str] = &[
        "-cl-mad-enable",
        "-cl-no-signed-zeros",
        "-cl-finite-math-only",
        "-cl-denorms-are-zero",
        "-cl-single-precision-constant",
        "-cl-kernel-arg-info",
    ];

    let mut parsed = ParsedOptions::default();
    let mut words = options.split_whitespace();

    while let Some(word) = words.next() {
        match word {
            "-Werror" => parsed.warnings_as_errors = true,
            "-w" => parsed.suppress_warnings = true,
            "-cl-opt-disable" => parsed.disable_optimizations = true,
            "-cl-strict-aliasing" => parsed.strict_aliasing = true,
            "-cl-unsafe-math-optimizations" | "-cl-fast-relaxed-math" => parsed.unsafe_math = true,
            "-D" => {
                let def = words.next().ok_or("missing macro name after '-D'")?;
                parsed.defines.push(split_define(def));
            }
            "-I" => {
                let dir = words.next().ok_or("missing directory after '-I'")?;
                parsed.include_dirs.push(dir.to_string());
            }
            w if w.starts_with("-D") => parsed.defines.push(split_define(&w[2..])),
            w if w.starts_with("-I") => parsed.include_dirs.push(w[2..].to_string()),
            w if w.starts_with("-cl-std=") => {}
            w if ACCEPTED.contains(&w) => {}
            w => return Err(format!("unrecognized build option '{}'", w)),
        }
    }

    Ok(parsed)
}

fn split_define(def: &str) -> (String, Option<String>) {
    match def.split_once('=') {
        Some((name, value)) => (name.to_string(), Some(value.to_string())),
        None => (def.to_string(), None),
    }
}

struct Diagnostics {
    filename: String,
    lines: Vec<String>,
    errors: usize,
    warnings: usize,
    werror: bool,
    silent: bool,
}

impl Diagnostics {
    fn new(filename: &str, options: &ParsedOptions) -> Self {
        Self {
            filename: filename.to_string(),
            lines: Vec::new(),
            errors: 0,
            warnings: 0,
            werror: options.warnings_as_errors,
            silent: options.suppress_warnings,
        }
    }

    fn error(&mut self, line: usize, col: usize, msg: impl AsRef<str>) {
        self.errors += 1;
        self.lines.push(format!(
            "{}:{}:{}: error: {}",
            self.filename,
            line,
            col,
            msg.as_ref()
        ));
    }

    fn warning(&mut self, line: usize, col: usize, msg: impl AsRef<str>) {
        if self.werror {
            self.error(line, col, format!("{} [-Werror]", msg.as_ref()));
            return;
        }
        if self.silent {
            return;
        }
        self.warnings += 1;
        self.lines.push(format!(
            "{}:{}:{}: warning: {}",
            self.filename,
            line,
            col,
            msg.as_ref()
        ));
    }

    fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        let mut summary = Vec::new();
        if self.warnings > 0 {
            summary.push(plural(self.warnings, "warning"));
        }
        if self.errors > 0 {
            summary.push(plural(self.errors, "error"));
        }
        if !summary.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("{} generated.", summary.join(" and ")));
        }
        out
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("1 {}", word)
    } else {
        format!("{} {}s", n, word)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Punct(char),
    Literal,
    Directive(String),
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
    col: usize,
}

impl Token {
    fn is_punct(&self, c: char) -> bool {
        self.tok == Tok::Punct(c)
    }

    fn ident(&self) -> Option<&str> {
        match &self.tok {
            Tok::Ident(s) => Some(s),
            _ => None,
        }
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn run(mut self, diag: &mut Diagnostics) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut line_start = true;

        while let Some(c) = self.peek(0) {
            let (line, col) = (self.line, self.col);

            if c == '\n' {
                self.bump();
                line_start = true;
                continue;
            }
            if c.is_whitespace() {
                self.bump();
                continue;
            }

            if c == '/' && self.peek(1) == Some('/') {
                while let Some(c) = self.peek(0) {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }

            if c == '/' && self.peek(1) == Some('*') {
                self.bump();
                self.bump();
                let mut closed = false;
                while let Some(c) = self.bump() {
                    if c == '*' && self.peek(0) == Some('/') {
                        self.bump();
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    diag.error(line, col, "unterminated /* comment");
                }
                continue;
            }

            if c == '#' && line_start {
                let mut text = String::new();
                while let Some(c) = self.peek(0) {
                    if c == '\n' {
                        break;
                    }
                    if c == '\\' && self.peek(1) == Some('\n') {
                        self.bump();
                        self.bump();
                        text.push(' ');
                        continue;
                    }
                    text.push(c);
                    self.bump();
                }
                tokens.push(Token {
                    tok: Tok::Directive(text),
                    line,
                    col,
                });
                continue;
            }
            line_start = false;

            if c == '"' || c == '\'' {
                self.bump();
                let mut closed = false;
                while let Some(n) = self.peek(0) {
                    if n == '\n' {
                        break;
                    }
                    self.bump();
                    if n == '\\' {
                        self.bump();
                    } else if n == c {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    diag.error(line, col, format!("missing terminating {} character", c));
                }
                tokens.push(Token {
                    tok: Tok::Literal,
                    line,
                    col,
                });
                continue;
            }

            if c.is_ascii_alphabetic() || c == '_' {
                let mut ident = String::new();
                while let Some(n) = self.peek(0) {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        ident.push(n);
                        self.bump();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    tok: Tok::Ident(ident),
                    line,
                    col,
                });
                continue;
            }

            if c.is_ascii_digit() || (c == '.' && self.peek(1).map_or(false, |n| n.is_ascii_digit())) {
                let mut prev = c;
                while let Some(n) = self.peek(0) {
                    let exponent_sign = (n == '+' || n == '-') && matches!(prev, 'e' | 'E' | 'p' | 'P');
                    if n.is_ascii_alphanumeric() || n == '.' || n == '_' || exponent_sign {
                        prev = n;
                        self.bump();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    tok: Tok::Literal,
                    line,
                    col,
                });
                continue;
            }

            self.bump();
            tokens.push(Token {
                tok: Tok::Punct(c),
                line,
                col,
            });
        }

        tokens
    }
}

fn closer_of(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

fn check_brackets(tokens: &[Token], diag: &mut Diagnostics) {
    let mut stack: Vec<&Token> = Vec::new();

    for token in tokens {
        match token.tok {
            Tok::Punct('(' | '[' | '{') => stack.push(token),
            Tok::Punct(c @ (')' | ']' | '}')) => match stack.pop() {
                Some(open) => {
                    let Tok::Punct(o) = open.tok else { continue };
                    if closer_of(o) != c {
                        diag.error(
                            token.line,
                            token.col,
                            format!("expected '{}' to match '{}' at line {}", closer_of(o), o, open.line),
                        );
                        return;
                    }
                }
                None => {
                    diag.error(token.line, token.col, format!("extraneous closing '{}'", c));
                    return;
                }
            },
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        if let Tok::Punct(o) = open.tok {
            diag.error(
                open.line,
                open.col,
                format!("expected '{}' at end of input to match this '{}'", closer_of(o), o),
            );
        }
    }
}

fn check_directives(tokens: &[Token], target: &TargetInfo, diag: &mut Diagnostics) {
    for token in tokens {
        let Tok::Directive(text) = &token.tok else { continue };
        let normalized = text.trim_start_matches('#').replace(':', " : ");
        let words: Vec<&str> = normalized.split_whitespace().collect();

        if let ["pragma", "OPENCL", "EXTENSION", name, ":", _state] = words.as_slice() {
            if *name != "all" && !target.extensions.contains(*name) {
                diag.warning(
                    token.line,
                    token.col,
                    format!("unsupported OpenCL extension '{}' - ignoring", name),
                );
            }
        }
    }
}

fn is_double_type(ident: &str) -> bool {
    ident == "double" || matches!(ident, "double2" | "double3" | "double4" | "double8" | "double16")
}

fn check_double(tokens: &[Token], diag: &mut Diagnostics) {
    if let Some(token) = tokens.iter().find(|t| t.ident().map_or(false, is_double_type)) {
        diag.error(
            token.line,
            token.col,
            "use of type 'double' requires cl_khr_fp64 support",
        );
    }
}

fn parse_kernels(tokens: &[Token], diag: &mut Diagnostics) -> Vec<KernelSignature> {
    let mut kernels: Vec<KernelSignature> = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        match token.tok {
            Tok::Punct('{') => depth += 1,
            Tok::Punct('}') => depth = depth.saturating_sub(1),
            _ => {}
        }

        let is_kernel = matches!(token.ident(), Some("__kernel") | Some("kernel"));
        if depth == 0 && is_kernel {
            match parse_kernel_decl(tokens, i + 1, diag) {
                Some((Some(sig), next)) => {
                    if kernels.iter().any(|k| k.name == sig.name) {
                        diag.error(token.line, token.col, format!("redefinition of kernel '{}'", sig.name));
                    } else {
                        kernels.push(sig);
                    }
                    i = next;
                    continue;
                }
                Some((None, next)) => {
                    i = next;
                    continue;
                }
                None => return kernels,
            }
        }
        i += 1;
    }

    kernels
}

/// Index just past the group opened at `open`.
fn skip_group(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < tokens.len() {
        match tokens[i].tok {
            Tok::Punct('(') | Tok::Punct('[') | Tok::Punct('{') => depth += 1,
            Tok::Punct(')') | Tok::Punct(']') | Tok::Punct('}') => {
                if depth <= 1 {
                    return i + 1;
                }
                depth -= 1;
            }
            _ => {}
        }
        i += 1;
    }
    tokens.len()
}

/// Parses one kernel declaration starting after the `kernel` keyword.
/// Returns the signature (absent for prototypes) and the index to resume at,
/// or `None` after a fatal error.
fn parse_kernel_decl(
    tokens: &[Token],
    mut i: usize,
    diag: &mut Diagnostics,
) -> Option<(Option<KernelSignature>, usize)> {
    let mut head: Vec<&Token> = Vec::new();

    while i < tokens.len() {
        let token = &tokens[i];
        if matches!(token.ident(), Some("__attribute__") | Some("__attribute")) {
            i = skip_group(tokens, i + 1);
            continue;
        }
        if token.is_punct('(') {
            break;
        }
        if matches!(token.tok, Tok::Punct(';') | Tok::Punct('{')) {
            diag.error(token.line, token.col, "expected kernel function declaration");
            return None;
        }
        head.push(token);
        i += 1;
    }

    let name_token = match head.pop() {
        Some(t) if t.ident().is_some() => t,
        _ => {
            let (line, col) = tokens.get(i).map_or((0, 0), |t| (t.line, t.col));
            diag.error(line, col, "expected kernel name");
            return None;
        }
    };
    let name = name_token.ident().unwrap_or_default().to_string();

    let returns_void = head.len() == 1 && head[0].ident() == Some("void");
    if !returns_void {
        diag.error(
            name_token.line,
            name_token.col,
            format!("kernel function '{}' must have void return type", name),
        );
        return None;
    }

    if !tokens.get(i).map_or(false, |t| t.is_punct('(')) {
        diag.error(
            name_token.line,
            name_token.col,
            format!("expected '(' after kernel name '{}'", name),
        );
        return None;
    }

    let close = skip_group(tokens, i);
    if close <= i + 1 || !tokens[close - 1].is_punct(')') {
        diag.error(
            name_token.line,
            name_token.col,
            format!("unterminated parameter list for kernel '{}'", name),
        );
        return None;
    }
    let inner = &tokens[i + 1..close - 1];
    let mut params = Vec::new();

    let pieces: Vec<&[Token]> = split_params(inner);
    let is_void_list = pieces.len() == 1 && pieces[0].len() == 1 && pieces[0][0].ident() == Some("void");
    if !is_void_list {
        for piece in pieces {
            match parse_param(piece, diag) {
                Some(param) => params.push(param),
                None => return None,
            }
        }
    }

    match tokens.get(close) {
        Some(t) if t.is_punct(';') => Some((None, close + 1)),
        Some(t) if t.is_punct('{') => Some((
            Some(KernelSignature {
                name,
                params,
                line: name_token.line,
            }),
            close,
        )),
        Some(t) => {
            diag.error(t.line, t.col, format!("expected function body after kernel '{}'", name));
            None
        }
        None => {
            diag.error(name_token.line, name_token.col, "unexpected end of input");
            None
        }
    }
}

fn split_params(tokens: &[Token]) -> Vec<&[Token]> {
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        match token.tok {
            Tok::Punct('(') | Tok::Punct('[') => depth += 1,
            Tok::Punct(')') | Tok::Punct(']') => depth = depth.saturating_sub(1),
            Tok::Punct(',') if depth == 0 => {
                pieces.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&tokens[start..]);
    pieces
}

fn parse_param(tokens: &[Token], diag: &mut Diagnostics) -> Option<ArgInfo> {
    let first = tokens.first()?;
    let mut address = None;
    let mut is_const = false;
    let mut pointer_depth = 0;
    let mut words: Vec<&str> = Vec::new();

    for token in tokens {
        match &token.tok {
            Tok::Punct('*') => pointer_depth += 1,
            Tok::Ident(word) => match word.as_str() {
                "__global" | "global" => address = Some(AddressQualifier::Global),
                "__local" | "local" => address = Some(AddressQualifier::Local),
                "__constant" | "constant" => address = Some(AddressQualifier::Constant),
                "__private" | "private" => address = Some(AddressQualifier::Private),
                "const" | "__const" => is_const = true,
                "restrict" | "__restrict" | "volatile" | "__read_only" | "read_only" => {}
                other => words.push(other),
            },
            _ => {}
        }
    }

    let Some(name) = words.pop() else {
        diag.error(first.line, first.col, "parameter name omitted");
        return None;
    };
    if words.is_empty() {
        diag.error(first.line, first.col, format!("unknown type for parameter '{}'", name));
        return None;
    }
    let type_name = canonical_type(&words);
    let is_pointer = pointer_depth > 0;

    let address = match (is_pointer, address) {
        (true, Some(AddressQualifier::Private)) | (true, None) => {
            diag.error(
                first.line,
                first.col,
                format!(
                    "pointer argument '{}' must point to __global, __local, or __constant address space",
                    name
                ),
            );
            return None;
        }
        (true, Some(space)) => space,
        (false, _) => AddressQualifier::Private,
    };

    Some(ArgInfo {
        name: name.to_string(),
        size: if is_pointer { None } else { scalar_size(&type_name) },
        is_const: is_const || address == AddressQualifier::Constant,
        type_name,
        address,
        is_pointer,
    })
}

fn canonical_type(words: &[&str]) -> String {
    match words {
        ["unsigned"] | ["unsigned", "int"] => "uint".to_string(),
        ["unsigned", "char"] => "uchar".to_string(),
        ["unsigned", "short"] => "ushort".to_string(),
        ["unsigned", "long"] => "ulong".to_string(),
        ["signed", rest] => rest.to_string(),
        ["struct", name] => format!("struct {}", name),
        _ => words.join(" "),
    }
}

/// Byte size of a by-value OpenCL type, `None` for user types.
pub fn scalar_size(type_name: &str) -> Option<usize> {
    let base_len = type_name
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(type_name.len());
    let (base, lanes) = type_name.split_at(base_len);

    let elem = match base {
        "bool" | "char" | "uchar" => 1,
        "short" | "ushort" | "half" => 2,
        "int" | "uint" | "float" => 4,
        "long" | "ulong" | "double" | "size_t" | "ptrdiff_t" | "intptr_t" | "uintptr_t" => 8,
        _ => return None,
    };

    let lanes = match lanes {
        "" => 1,
        "2" => 2,
        "3" | "4" => 4,
        "8" => 8,
        "16" => 16,
        _ => return None,
    };

    Some(elem * lanes)
}
