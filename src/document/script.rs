// src/document/script.rs
// =============================================================================
// Inline scripts: small expressions embedded in a document as `$$ expr $$`.
//
// Documents use them to generate text or links at render time, for example
//
//   See the parent folder: $$ link(dirname(path), "up") $$
//
// Expressions are NOT arbitrary code. The grammar only knows
//   - string literals: "text" or 'text'
//   - the variables `path` and `body`
//   - calls to a fixed registry of functions: name(arg, ...)
//
// A failing expression never breaks the document: it is replaced in place
// by a visible error block naming the failure.
// =============================================================================

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

// Bounds the recursion of both parsing and evaluation
const MAX_DEPTH: usize = 64;

static INLINE_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\$\s*(.+?)\s*\$\$").expect("inline script pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unexpected {found} at offset {offset}")]
    Syntax { found: String, offset: usize },

    #[error("unterminated string literal at offset {0}")]
    UnterminatedString(usize),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("calls nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("`{name}` expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },
}

// Values visible to an expression
struct Scope<'a> {
    path: &'a str,
    body: &'a str,
}

impl Scope<'_> {
    fn variable(&self, name: &str) -> Result<String, EvalError> {
        match name {
            "path" => Ok(self.path.to_string()),
            "body" => Ok(self.body.to_string()),
            _ => Err(EvalError::UnknownVariable(name.to_string())),
        }
    }
}

// Replaces every `$$ expr $$` in `body` with its value or an error block
pub fn expand_inline(path: &str, body: &str) -> String {
    if !body.contains("$$") {
        return body.to_string();
    }

    let scope = Scope { path, body };
    INLINE_SCRIPT
        .replace_all(body, |caps: &Captures| {
            let source = &caps[1];
            evaluate(source, &scope).unwrap_or_else(|error| error_block(source, &error))
        })
        .trim()
        .to_string()
}

fn error_block(source: &str, error: &EvalError) -> String {
    format!("\n\n::: open .danger.readonly **EvalError: {error}**\n```\n{source}\n```\n:::\n\n")
}

fn evaluate(source: &str, scope: &Scope) -> Result<String, EvalError> {
    let tokens = tokenize(source)?;
    let mut parser = ExprParser {
        tokens: &tokens,
        pos: 0,
        len: source.len(),
        depth: 0,
    };
    let expr = parser.expression()?;
    parser.finish()?;
    expr.eval(scope)
}

// ---------------------------------------------------------------------------
// Tokens and syntax tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("`{name}`"),
            Token::Str(_) => "string".to_string(),
            Token::LParen => "`(`".to_string(),
            Token::RParen => "`)`".to_string(),
            Token::Comma => "`,`".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Str(String),
    Var(String),
    Call(String, Vec<Expr>),
}

impl Expr {
    fn eval(&self, scope: &Scope) -> Result<String, EvalError> {
        match self {
            Expr::Str(value) => Ok(value.clone()),
            Expr::Var(name) => scope.variable(name),
            Expr::Call(name, args) => {
                let builtin = REGISTRY
                    .get(name.as_str())
                    .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
                builtin.check_arity(name, args.len())?;
                let values = args
                    .iter()
                    .map(|arg| arg.eval(scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((builtin.call)(&values))
            }
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push((offset, Token::LParen)),
            ')' => tokens.push((offset, Token::RParen)),
            ',' => tokens.push((offset, Token::Comma)),
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, next)) = chars.next() {
                    match next {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        next if next == quote => {
                            closed = true;
                            break;
                        }
                        next => value.push(next),
                    }
                }
                if !closed {
                    return Err(EvalError::UnterminatedString(offset));
                }
                tokens.push((offset, Token::Str(value)));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut name = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if !(next.is_alphanumeric() || next == '_') {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                tokens.push((offset, Token::Ident(name)));
            }
            other => {
                return Err(EvalError::Syntax {
                    found: format!("`{other}`"),
                    offset,
                })
            }
        }
    }

    Ok(tokens)
}

// Recursive descent over: expr := string | ident | ident '(' [expr (',' expr)*] ')'
struct ExprParser<'t> {
    tokens: &'t [(usize, Token)],
    pos: usize,
    len: usize,
    // Calls currently open
    depth: usize,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn unexpected(&self) -> EvalError {
        match self.tokens.get(self.pos) {
            Some((offset, token)) => EvalError::Syntax {
                found: token.describe(),
                offset: *offset,
            },
            None => EvalError::Syntax {
                found: "end of expression".to_string(),
                offset: self.len,
            },
        }
    }

    fn expression(&mut self) -> Result<Expr, EvalError> {
        let expr = match self.peek() {
            Some(Token::Str(value)) => Expr::Str(value.clone()),
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    if self.depth == MAX_DEPTH {
                        return Err(EvalError::TooDeep(MAX_DEPTH));
                    }
                    self.depth += 1;
                    let args = self.arguments()?;
                    self.depth -= 1;
                    return Ok(Expr::Call(name, args));
                }
                return Ok(Expr::Var(name));
            }
            _ => return Err(self.unexpected()),
        };
        self.pos += 1;
        Ok(expr)
    }

    // Parses the arguments after an opening parenthesis, consuming the ')'
    fn arguments(&mut self) -> Result<Vec<Expr>, EvalError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RParen) => {
                    self.pos += 1;
                    return Ok(args);
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn finish(&self) -> Result<(), EvalError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }
}

// ---------------------------------------------------------------------------
// Function registry
// ---------------------------------------------------------------------------

struct Builtin {
    min: usize,
    max: Option<usize>,
    call: fn(&[String]) -> String,
}

impl Builtin {
    const fn exact(n: usize, call: fn(&[String]) -> String) -> Self {
        Builtin { min: n, max: Some(n), call }
    }

    fn check_arity(&self, name: &str, got: usize) -> Result<(), EvalError> {
        let fits = got >= self.min && self.max.map_or(true, |max| got <= max);
        if fits {
            return Ok(());
        }
        let expected = match self.max {
            Some(max) if max == self.min => max.to_string(),
            Some(max) => format!("{} to {}", self.min, max),
            None => format!("at least {}", self.min),
        };
        Err(EvalError::Arity {
            name: name.to_string(),
            expected,
            got,
        })
    }
}

static REGISTRY: LazyLock<BTreeMap<&'static str, Builtin>> = LazyLock::new(|| {
    BTreeMap::from([
        ("concat", Builtin { min: 0, max: None, call: |args| args.concat() }),
        ("upper", Builtin::exact(1, |args| args[0].to_uppercase())),
        ("lower", Builtin::exact(1, |args| args[0].to_lowercase())),
        ("trim", Builtin::exact(1, |args| args[0].trim().to_string())),
        ("replace", Builtin::exact(3, |args| args[0].replace(&args[1], &args[2]))),
        ("len", Builtin::exact(1, |args| args[0].chars().count().to_string())),
        ("dirname", Builtin::exact(1, |args| dirname(&args[0]).to_string())),
        ("basename", Builtin::exact(1, |args| basename(&args[0]).to_string())),
        ("stem", Builtin::exact(1, |args| stem(&args[0]).to_string())),
        (
            "link",
            Builtin {
                min: 1,
                max: Some(2),
                call: |args| {
                    let text = args.get(1).unwrap_or(&args[0]);
                    format!("[{text}]({})", args[0])
                },
            },
        ),
    ])
});

// "/a/b.md" -> "/a/"
fn dirname(path: &str) -> &str {
    path.rfind('/').map_or("", |i| &path[..=i])
}

// "/a/b.md" -> "b.md"
fn basename(path: &str) -> &str {
    path.rfind('/').map_or(path, |i| &path[i + 1..])
}

// "/a/b.md" -> "b"
fn stem(path: &str) -> &str {
    let name = basename(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(i) => &name[..i],
    }
}
