/// Python subset, line by line
///
/// Not an interpreter. Each line is handled on its own:
/// - `print(...)` calls, with `sep=` / `end=` keywords
/// - `name = expr` assignments
/// - comments, blank lines, `def` headers, the `if __name__` guard and a
///   bare `main()` call are skipped
/// - any other statement (loops, conditionals, imports, ...) is skipped
///
/// Expressions are literals, known variables, `input()`, f-strings over bare
/// names, or one binary `+ - * /` between two such operands. An expression
/// outside that grammar is kept as its own source text.
use super::SimulationOutput;
use std::collections::HashMap;
use std::fmt;

/// Upper bound for any string the simulation builds
const MAX_STRING_LEN: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
enum PyValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
}

impl PyValue {
    fn type_name(&self) -> &'static str {
        match self {
            PyValue::Int(_) => "int",
            PyValue::Float(_) => "float",
            PyValue::Str(_) => "str",
            PyValue::Bool(_) => "bool",
            PyValue::None => "NoneType",
        }
    }

    fn as_number(&self) -> Option<Number> {
        match self {
            PyValue::Int(n) => Some(Number::Int(*n)),
            PyValue::Bool(b) => Some(Number::Int(*b as i64)),
            PyValue::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }
}

impl fmt::Display for PyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PyValue::Int(n) => write!(f, "{}", n),
            PyValue::Float(x) => write!(f, "{}", format_float(*x)),
            PyValue::Str(s) => write!(f, "{}", s),
            PyValue::Bool(true) => write!(f, "True"),
            PyValue::Bool(false) => write!(f, "False"),
            PyValue::None => write!(f, "None"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn to_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }
}

fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

/// Evaluation error, rendered like a Python exception line
#[derive(Debug, Clone, PartialEq)]
struct PyError(String);

impl PyError {
    fn new(kind: &str, message: impl fmt::Display) -> Self {
        PyError(format!("{}: {}", kind, message))
    }
}

struct Simulator<'a> {
    vars: HashMap<String, PyValue>,
    stdin: std::str::Lines<'a>,
    output: String,
}

pub fn run(code: &str, stdin: &str) -> SimulationOutput {
    let mut sim = Simulator {
        vars: HashMap::new(),
        stdin: stdin.lines(),
        output: String::new(),
    };

    for (number, raw) in code.lines().enumerate() {
        if let Err(PyError(message)) = sim.exec_line(raw) {
            let output = sim.output.trim_end().to_string();
            return SimulationOutput::failed(output, format!("{} (line {})", message, number + 1));
        }
    }

    SimulationOutput::ok(sim.output.trim_end())
}

impl<'a> Simulator<'a> {
    fn exec_line(&mut self, raw: &str) -> Result<(), PyError> {
        let line = strip_comment(raw).trim();
        if is_skipped(line) {
            return Ok(());
        }

        if let Some(args) = call_arguments(line, "print") {
            return self.print(args);
        }

        if let Some((name, expr)) = assignment(line) {
            let value = self.eval_or_literal(expr)?;
            self.vars.insert(name.to_string(), value);
            return Ok(());
        }

        tracing::trace!(line, "Skipping unsupported Python statement");
        Ok(())
    }

    fn print(&mut self, args: &str) -> Result<(), PyError> {
        let mut sep = " ".to_string();
        let mut end = "\n".to_string();
        let mut pieces = Vec::new();

        for arg in split_top_level(args, ',') {
            let arg = arg.trim();
            if arg.is_empty() {
                continue;
            }
            if let Some(value) = keyword_value(arg, "sep") {
                sep = self.eval_or_literal(value)?.to_string();
                continue;
            }
            if let Some(value) = keyword_value(arg, "end") {
                end = self.eval_or_literal(value)?.to_string();
                continue;
            }
            pieces.push(self.eval_or_literal(arg)?.to_string());
        }

        let line = pieces.join(&sep);
        if self.output.len() + line.len() + end.len() > MAX_STRING_LEN {
            return Err(PyError::new("MemoryError", "output limit exceeded"));
        }
        self.output.push_str(&line);
        self.output.push_str(&end);
        Ok(())
    }

    /// Evaluate, falling back to the expression's own text when unsupported
    fn eval_or_literal(&mut self, expr: &str) -> Result<PyValue, PyError> {
        let expr = expr.trim();
        Ok(self
            .eval(expr)?
            .unwrap_or_else(|| PyValue::Str(expr.to_string())))
    }

    fn eval(&mut self, expr: &str) -> Result<Option<PyValue>, PyError> {
        if let Some(value) = self.eval_operand(expr)? {
            return Ok(Some(value));
        }

        let Some((lhs, op, rhs)) = split_binary(expr) else {
            return Ok(None);
        };
        let (Some(left), Some(right)) = (self.eval_operand(lhs)?, self.eval_operand(rhs)?) else {
            return Ok(None);
        };

        binary(op, left, right).map(Some)
    }

    /// Literal, known variable or `input()` call; never a compound expression
    fn eval_operand(&mut self, expr: &str) -> Result<Option<PyValue>, PyError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Ok(None);
        }

        if let Some(literal) = parse_string_literal(expr) {
            let text = if literal.formatted {
                self.interpolate(&literal.body)
            } else {
                literal.body
            };
            return Ok(Some(PyValue::Str(text)));
        }

        match expr {
            "True" => return Ok(Some(PyValue::Bool(true))),
            "False" => return Ok(Some(PyValue::Bool(false))),
            "None" => return Ok(Some(PyValue::None)),
            _ => {}
        }

        if let Some(number) = parse_number(expr) {
            return Ok(Some(number));
        }

        if call_arguments(expr, "input").is_some() {
            return match self.stdin.next() {
                Some(line) => Ok(Some(PyValue::Str(line.to_string()))),
                None => Err(PyError::new("EOFError", "EOF when reading a line")),
            };
        }

        if is_identifier(expr) {
            return Ok(self.vars.get(expr).cloned());
        }

        Ok(None)
    }

    /// f-string substitution of bare, previously assigned names
    fn interpolate(&self, body: &str) -> String {
        let mut out = String::with_capacity(body.len());
        let mut chars = body.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    out.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    out.push('}');
                }
                '{' => {
                    let mut inner = String::new();
                    let mut closed = false;
                    for next in chars.by_ref() {
                        if next == '}' {
                            closed = true;
                            break;
                        }
                        inner.push(next);
                    }
                    let name = inner.trim();
                    match self.vars.get(name) {
                        Some(value) if closed && is_identifier(name) => {
                            out.push_str(&value.to_string())
                        }
                        _ => {
                            out.push('{');
                            out.push_str(&inner);
                            if closed {
                                out.push('}');
                            }
                        }
                    }
                }
                _ => out.push(c),
            }
        }

        out
    }
}

fn binary(op: char, left: PyValue, right: PyValue) -> Result<PyValue, PyError> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return arithmetic(op, a, b);
    }

    match (op, &left, &right) {
        ('+', PyValue::Str(a), PyValue::Str(b)) => {
            if a.len() + b.len() > MAX_STRING_LEN {
                return Err(PyError::new("MemoryError", "string too large"));
            }
            Ok(PyValue::Str(format!("{}{}", a, b)))
        }
        ('*', PyValue::Str(s), other) | ('*', other, PyValue::Str(s))
            if matches!(other, PyValue::Int(_) | PyValue::Bool(_)) =>
        {
            let count = match other.as_number() {
                Some(Number::Int(n)) => n.max(0) as usize,
                _ => 0,
            };
            if s.len().saturating_mul(count) > MAX_STRING_LEN {
                return Err(PyError::new("MemoryError", "string too large"));
            }
            Ok(PyValue::Str(s.repeat(count)))
        }
        ('+', PyValue::Str(_), other) => Err(PyError::new(
            "TypeError",
            format!("can only concatenate str (not \"{}\") to str", other.type_name()),
        )),
        _ => Err(PyError::new(
            "TypeError",
            format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op,
                left.type_name(),
                right.type_name()
            ),
        )),
    }
}

fn arithmetic(op: char, a: Number, b: Number) -> Result<PyValue, PyError> {
    if op == '/' {
        let divisor = b.to_f64();
        if divisor == 0.0 {
            return Err(PyError::new("ZeroDivisionError", "division by zero"));
        }
        return Ok(PyValue::Float(a.to_f64() / divisor));
    }

    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        let exact = match op {
            '+' => x.checked_add(y),
            '-' => x.checked_sub(y),
            '*' => x.checked_mul(y),
            _ => None,
        };
        if let Some(n) = exact {
            return Ok(PyValue::Int(n));
        }
    }

    let (x, y) = (a.to_f64(), b.to_f64());
    let value = match op {
        '+' => x + y,
        '-' => x - y,
        '*' => x * y,
        _ => return Err(PyError::new("SyntaxError", format!("unknown operator {}", op))),
    };
    Ok(PyValue::Float(value))
}

fn is_skipped(line: &str) -> bool {
    line.is_empty()
        || line.starts_with("def ")
        || line.starts_with("if __name__")
        || line == "main()"
}

/// Drop a trailing `#` comment that is not inside a string literal
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in line.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '#' => return &line[..i],
            _ => {}
        }
    }

    line
}

/// `name(args)` spanning the whole line → `args`
fn call_arguments<'l>(line: &'l str, name: &str) -> Option<&'l str> {
    let rest = line.strip_prefix(name)?.trim_start();
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    // Reject `print(a)(b)` style chains where the first paren closes early
    brackets_balanced(inner).then_some(inner)
}

fn brackets_balanced(text: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0i32;

    for c in text.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }

    depth == 0 && quote.is_none()
}

fn keyword_value<'l>(arg: &'l str, keyword: &str) -> Option<&'l str> {
    let rest = arg.strip_prefix(keyword)?.trim_start();
    let value = rest.strip_prefix('=')?;
    if value.starts_with('=') {
        return None;
    }
    Some(value)
}

/// `name = expr` with a plain identifier target
fn assignment(line: &str) -> Option<(&str, &str)> {
    let eq = top_level_positions(line)
        .into_iter()
        .find(|&(_, c)| c == '=')
        .map(|(i, _)| i)?;

    let bytes = line.as_bytes();
    if bytes.get(eq + 1) == Some(&b'=') {
        return None;
    }
    if eq > 0 && matches!(bytes[eq - 1], b'!' | b'<' | b'>' | b'=') {
        return None;
    }

    let name = line[..eq].trim();
    if !is_identifier(name) || is_keyword(name) {
        return None;
    }
    Some((name, &line[eq + 1..]))
}

/// First top-level `+ - * /` that acts as a binary operator
fn split_binary(expr: &str) -> Option<(&str, char, &str)> {
    let positions = top_level_positions(expr);
    let bytes = expr.as_bytes();

    for (i, c) in positions {
        if !matches!(c, '+' | '-' | '*' | '/') {
            continue;
        }
        let lhs = expr[..i].trim_end();
        if lhs.is_empty() {
            continue;
        }
        // Unary sign after another operator
        if lhs.ends_with(['+', '-', '*', '/', '(', '=']) {
            continue;
        }
        // `**` and `//` are outside the subset
        if bytes.get(i + 1).map_or(false, |&b| b == c as u8) {
            return None;
        }
        // Exponent sign in a float literal such as 1e-5
        if matches!(c, '+' | '-')
            && lhs.ends_with(['e', 'E'])
            && parse_number(&lhs[..lhs.len() - 1]).is_some()
        {
            continue;
        }
        return Some((lhs, c, &expr[i + 1..]));
    }

    None
}

/// Byte offsets of characters outside string literals and brackets
fn top_level_positions(text: &str) -> Vec<(usize, char)> {
    let mut positions = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0i32;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ if depth == 0 => positions.push((i, c)),
            _ => {}
        }
    }

    positions
}

fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, c) in top_level_positions(text) {
        if c == separator {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

struct StringLiteral {
    body: String,
    formatted: bool,
}

/// A single string literal spanning the whole expression
fn parse_string_literal(expr: &str) -> Option<StringLiteral> {
    let prefix_len = expr
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .count();
    let prefix = expr[..prefix_len].to_ascii_lowercase();
    if !matches!(prefix.as_str(), "" | "f" | "r" | "fr" | "rf") {
        return None;
    }
    let raw = prefix.contains('r');
    let formatted = prefix.contains('f');

    let rest = &expr[prefix_len..];
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = rest.strip_prefix(quote)?;

    let mut body = String::new();
    let mut chars = inner.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            // The closing quote must end the expression
            return (i + c.len_utf8() == inner.len()).then_some(StringLiteral { body, formatted });
        }
        if c == '\\' && !raw {
            match chars.next().map(|(_, e)| e) {
                Some('n') => body.push('\n'),
                Some('t') => body.push('\t'),
                Some('\\') => body.push('\\'),
                Some('\'') => body.push('\''),
                Some('"') => body.push('"'),
                Some(other) => {
                    body.push('\\');
                    body.push(other);
                }
                None => return None,
            }
            continue;
        }
        body.push(c);
    }

    None
}

fn parse_number(expr: &str) -> Option<PyValue> {
    let expr = expr.trim();
    if !expr.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') {
        return None;
    }
    if let Ok(n) = expr.parse::<i64>() {
        return Some(PyValue::Int(n));
    }
    if expr.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    expr.parse::<f64>().ok().map(PyValue::Float)
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn is_keyword(name: &str) -> bool {
    matches!(
        name,
        "if" | "elif" | "else" | "for" | "while" | "def" | "class" | "return" | "import"
            | "from" | "try" | "except" | "finally" | "with" | "pass" | "break" | "continue"
            | "lambda" | "global" | "nonlocal" | "del" | "assert" | "raise" | "yield"
            | "True" | "False" | "None" | "and" | "or" | "not" | "in" | "is"
    )
}
