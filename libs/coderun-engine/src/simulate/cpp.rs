/// C++ output extraction
///
/// Nothing is compiled. The source is scanned for `cout <<` insertion
/// chains and only their literal operands are kept: string and character
/// literals verbatim (escapes decoded), `endl` as a newline. Variables,
/// arithmetic and control flow are ignored.
use super::SimulationOutput;

pub const NO_OUTPUT_PLACEHOLDER: &str = "(no output detected)";

pub fn run(code: &str) -> SimulationOutput {
    let source = strip_comments(code);
    let mut output = String::new();

    for statement in cout_statements(&source) {
        for operand in split_insertions(statement).iter().skip(1) {
            append_operand(operand.trim(), &mut output);
        }
    }

    let output = output.trim_end();
    if output.is_empty() {
        SimulationOutput::ok(NO_OUTPUT_PLACEHOLDER)
    } else {
        SimulationOutput::ok(output)
    }
}

/// Remove `//` and `/* */` comments outside literals
fn strip_comments(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            let end = skip_literal(&chars, i);
            out.extend(&chars[i..end]);
            i = end;
        } else if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
            out.push(' ');
        } else {
            out.push(c);
            i += 1;
        }
    }

    out
}

/// Index just past the literal starting at `start`
fn skip_literal(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            '\n' => return i,
            _ => i += 1,
        }
    }
    chars.len()
}

/// Every `cout << ... ;` statement, from `cout` up to the terminating semicolon
fn cout_statements(source: &str) -> Vec<&str> {
    let bytes = source.as_bytes();
    let mut statements = Vec::new();
    let mut search_from = 0;

    while let Some(found) = source[search_from..].find("cout") {
        let start = search_from + found;
        let end_of_word = start + "cout".len();
        search_from = end_of_word;

        let standalone_before = start == 0 || !is_ident_byte(bytes[start - 1]);
        let standalone_after = end_of_word >= bytes.len() || !is_ident_byte(bytes[end_of_word]);
        if !standalone_before || !standalone_after {
            continue;
        }
        if !source[end_of_word..].trim_start().starts_with("<<") {
            continue;
        }

        let end = statement_end(source, end_of_word);
        statements.push(&source[start..end]);
        search_from = end;
    }

    statements
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Byte offset of the first top-level `;` after `from`, or end of input
fn statement_end(source: &str, from: usize) -> usize {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in source[from..].char_indices() {
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
            ';' => return from + offset,
            _ => {}
        }
    }

    source.len()
}

/// Split a statement on top-level `<<`
fn split_insertions(statement: &str) -> Vec<String> {
    let chars: Vec<char> = statement.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                let end = skip_literal(&chars, i);
                current.extend(&chars[i..end]);
                i = end;
                continue;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '<' if depth == 0 && chars.get(i + 1) == Some(&'<') => {
                parts.push(std::mem::take(&mut current));
                i += 2;
                continue;
            }
            _ => {}
        }
        current.push(c);
        i += 1;
    }
    parts.push(current);

    parts
}

fn append_operand(operand: &str, output: &mut String) {
    if operand == "endl" || operand == "std::endl" {
        output.push('\n');
        return;
    }

    // Adjacent literals ("a" "b") concatenate; anything else is not a literal operand
    let chars: Vec<char> = operand.chars().collect();
    let mut pieces = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '"' | '\'' => {
                let end = skip_literal(&chars, i);
                if end < 2 || chars[end - 1] != chars[i] || end - i < 2 {
                    return;
                }
                pieces.push_str(&decode_escapes(&chars[i + 1..end - 1]));
                i = end;
            }
            _ => return,
        }
    }
    output.push_str(&pieces);
}

fn decode_escapes(chars: &[char]) -> String {
    let mut out = String::with_capacity(chars.len());
    let mut iter = chars.iter();
    while let Some(&c) = iter.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match iter.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => {}
            Some('0') => {}
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(&other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
