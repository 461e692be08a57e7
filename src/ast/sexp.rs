//! Canonical S-expression projection
//!
//! Every node renders to a unique parenthesized form used to compare parse
//! results against bash's own grammar. The projection is a pure function of
//! the tree.

use super::types::{CasePattern, HereDoc, Node, Word};
use crate::parser::types::ANSI_C_ESCAPES;
use crate::parser::word_parser::{
    consume_bracket_class, consume_double_quote, consume_single_quote, is_expansion_start,
};

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_with_newlines(s: &str) -> String {
    escape_quotes(s).replace('\n', "\\n")
}

fn append_redirects(base: String, redirects: &[Node]) -> String {
    if redirects.is_empty() {
        return base;
    }
    let rendered: Vec<String> = redirects.iter().map(Node::to_sexp).collect();
    format!("{} {}", base, rendered.join(" "))
}

fn redirect_suffix(redirects: &[Node]) -> String {
    if redirects.is_empty() {
        return String::new();
    }
    let rendered: Vec<String> = redirects.iter().map(Node::to_sexp).collect();
    format!(" {}", rendered.join(" "))
}

/// Drop `$` from `$"..."` locale strings outside single quotes.
fn strip_locale_dollars(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());
    let mut in_single = false;
    let mut in_double = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && !in_single && i + 1 < chars.len() {
            out.push(c);
            out.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if c == '\'' && !in_double {
            in_single = !in_single;
        } else if c == '"' && !in_single {
            in_double = !in_double;
        } else if c == '$'
            && !in_single
            && !in_double
            && chars.get(i + 1) == Some(&'"')
            && is_expansion_start(&chars, i, "$\"")
        {
            i += 1;
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Replace every `$'...'` outside other quotes with its expansion, re-quoted
/// in single quotes. Inside `${...}` a plain default value (`:-`, `=`, ...)
/// loses the quotes as well.
fn expand_ansi_c_quotes(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());
    let mut in_single = false;
    let mut in_double = false;
    let mut brace_depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if !in_single {
            if c == '$' && chars.get(i + 1) == Some(&'{') {
                brace_depth += 1;
                out.push_str("${");
                i += 2;
                continue;
            }
            if c == '}' && brace_depth > 0 {
                brace_depth -= 1;
                out.push(c);
                i += 1;
                continue;
            }
        }
        let effective_double = in_double && brace_depth == 0;
        if c == '\'' && !effective_double {
            if in_single {
                in_single = false;
            } else if i == 0 || chars[i - 1] != '$' {
                in_single = true;
            }
            out.push(c);
            i += 1;
        } else if c == '"' && !in_single {
            in_double = !in_double;
            out.push(c);
            i += 1;
        } else if c == '\\' && !in_single && i + 1 < chars.len() {
            out.push(c);
            out.push(chars[i + 1]);
            i += 2;
        } else if c == '$' && chars.get(i + 1) == Some(&'\'') && !in_single && !effective_double {
            let mut j = i + 2;
            while j < chars.len() {
                if chars[j] == '\\' && j + 1 < chars.len() {
                    j += 2;
                } else if chars[j] == '\'' {
                    break;
                } else {
                    j += 1;
                }
            }
            let mut expanded = expand_ansi_c_body(&chars[i + 2..j.min(chars.len())]);
            if brace_depth > 0 && follows_default_operator(&out) {
                let inner = &expanded[1..expanded.len() - 1];
                if !inner.is_empty() && !inner.contains('\x01') {
                    expanded = inner.to_string();
                }
            }
            out.push_str(&expanded);
            i = (j + 1).min(chars.len());
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

fn follows_default_operator(out: &str) -> bool {
    if [":-", ":=", ":+", ":?"].iter().any(|op| out.ends_with(op)) {
        return true;
    }
    let mut rev = out.chars().rev();
    matches!(rev.next(), Some('-' | '=' | '+' | '?')) && rev.next() != Some(':')
}

/// Expand the escapes of an ANSI-C string body and wrap it in single
/// quotes. A NUL, however written, ends the string.
fn expand_ansi_c_body(inner: &[char]) -> String {
    let mut bytes: Vec<u8> = Vec::new();
    let mut i = 0;
    while i < inner.len() {
        let c = inner[i];
        if c != '\\' || i + 1 >= inner.len() {
            push_char(&mut bytes, c);
            i += 1;
            continue;
        }
        let esc = inner[i + 1];
        match esc {
            '\'' => {
                bytes.extend_from_slice(b"'\\''");
                i += 2;
            }
            'x' | 'u' | 'U' => {
                let braced = esc == 'x' && inner.get(i + 2) == Some(&'{');
                let from = if braced { i + 3 } else { i + 2 };
                let max = match esc {
                    'x' if braced => usize::MAX,
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let to = digit_run(inner, from, max, 16);
                if to == from {
                    if braced {
                        break;
                    }
                    bytes.push(b'\\');
                    i += 1;
                    continue;
                }
                let value = digits_to_u32(&inner[from..to], 16);
                if value == 0 || (esc == 'x' && value & 0xFF == 0) {
                    break;
                }
                if esc == 'x' {
                    bytes.push((value & 0xFF) as u8);
                } else {
                    push_char(&mut bytes, char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                i = if braced && inner.get(to) == Some(&'}') { to + 1 } else { to };
            }
            'c' if i + 2 < inner.len() => {
                let value = (inner[i + 2] as u32) & 0x1F;
                if value == 0 {
                    break;
                }
                bytes.push(value as u8);
                i += 3;
            }
            '0'..='7' => {
                // `\0` takes up to three more digits, `\N` up to two more
                let from = if esc == '0' { i + 2 } else { i + 1 };
                let to = digit_run(inner, from, 3, 8);
                let value = digits_to_u32(&inner[i + 1..to.max(i + 2)], 8) & 0xFF;
                if value == 0 {
                    break;
                }
                bytes.push(value as u8);
                i = to.max(i + 2);
            }
            _ => {
                match ANSI_C_ESCAPES.get(&esc) {
                    Some(&byte) => bytes.push(byte),
                    None => {
                        bytes.push(b'\\');
                        push_char(&mut bytes, esc);
                    }
                }
                i += 2;
            }
        }
    }
    format!("'{}'", String::from_utf8_lossy(&bytes))
}

fn push_char(bytes: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

fn digit_run(chars: &[char], from: usize, max: usize, radix: u32) -> usize {
    let mut end = from;
    while end < chars.len() && end - from < max && chars[end].is_digit(radix) {
        end += 1;
    }
    end
}

// Wrapping keeps the low bits intact for over-long `\x{...}` runs.
fn digits_to_u32(digits: &[char], radix: u32) -> u32 {
    digits
        .iter()
        .filter_map(|d| d.to_digit(radix))
        .fold(0u32, |acc, d| acc.wrapping_mul(radix).wrapping_add(d))
}

fn digits_value(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse::<u32>().ok().filter(|v| *v <= i32::MAX as u32)
}

/// Strip a `{name}` or `{name[sub]}` fd-variable prefix from a redirect operator.
fn strip_fd_variable(op: &str) -> &str {
    let chars: Vec<char> = op.chars().collect();
    if chars.first() != Some(&'{') {
        return op;
    }
    let mut j = 1;
    if j < chars.len() && (chars[j].is_alphabetic() || chars[j] == '_') {
        j += 1;
        while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
            j += 1;
        }
        if j < chars.len() && chars[j] == '[' {
            j += 1;
            while j < chars.len() && chars[j] != ']' {
                j += 1;
            }
            if j < chars.len() {
                j += 1;
            }
        }
        if j < chars.len() && chars[j] == '}' {
            let byte_idx: usize = chars[..=j].iter().map(|c| c.len_utf8()).sum();
            return &op[byte_idx..];
        }
    }
    op
}

impl Word {
    pub fn to_sexp(&self) -> String {
        let mut value = strip_locale_dollars(&expand_ansi_c_quotes(&self.value)).replace('\\', "\\\\");
        if value.ends_with("\\\\") && !value.ends_with("\\\\\\\\") {
            value.push_str("\\\\");
        }
        let escaped = value
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\t', "\\t");
        format!("(word \"{}\")", escaped)
    }

    /// Operand text as shown inside `(cond-term "...")`.
    pub fn cond_formatted_value(&self) -> String {
        strip_locale_dollars(&self.value)
            .trim_end_matches('\n')
            .to_string()
    }
}

impl HereDoc {
    pub fn to_sexp(&self) -> String {
        let op = if self.strip_tabs { "<<-" } else { "<<" };
        let mut content = self.content.clone();
        if content.ends_with('\\') && !content.ends_with("\\\\") {
            content.push('\\');
        }
        format!("(redirect \"{}\" \"{}\")", op, content)
    }
}

impl CasePattern {
    /// Split the raw pattern on top-level `|` and render each alternative.
    pub fn to_sexp(&self) -> String {
        let chars: Vec<char> = self.pattern.chars().collect();
        let mut alternatives: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut depth = 0usize;
        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            if ch == '\\' && i + 1 < chars.len() {
                current.push(ch);
                current.push(chars[i + 1]);
                i += 2;
            } else if matches!(ch, '@' | '?' | '*' | '+' | '!') && chars.get(i + 1) == Some(&'(') {
                current.push(ch);
                current.push('(');
                depth += 1;
                i += 2;
            } else if is_expansion_start(&chars, i, "$(") {
                current.push_str("$(");
                depth += 1;
                i += 2;
            } else if ch == '(' && depth > 0 {
                current.push(ch);
                depth += 1;
                i += 1;
            } else if ch == ')' && depth > 0 {
                current.push(ch);
                depth -= 1;
                i += 1;
            } else if ch == '[' {
                let (next, text, _) = consume_bracket_class(&chars, i, depth);
                current.push_str(&text);
                i = next;
            } else if ch == '\'' && depth == 0 {
                let (next, text) = consume_single_quote(&chars, i);
                current.push_str(&text);
                i = next;
            } else if ch == '"' && depth == 0 {
                let (next, text) = consume_double_quote(&chars, i);
                current.push_str(&text);
                i = next;
            } else if ch == '|' && depth == 0 {
                alternatives.push(std::mem::take(&mut current));
                i += 1;
            } else {
                current.push(ch);
                i += 1;
            }
        }
        alternatives.push(current);
        let words: Vec<String> = alternatives
            .into_iter()
            .map(|alt| Word::new(alt, Vec::new()).to_sexp())
            .collect();
        let body = match &self.body {
            Some(b) => b.to_sexp(),
            None => "()".to_string(),
        };
        format!("(pattern ({}) {})", words.join(" "), body)
    }
}

fn is_semi(node: &Node) -> bool {
    node.is_operator(";") || node.is_operator("\n")
}

fn list_op_name(op: &str) -> &str {
    match op {
        "&&" => "and",
        "||" => "or",
        ";" | "\n" => "semi",
        "&" => "background",
        other => other,
    }
}

fn list_to_sexp(parts: &[Node]) -> String {
    let mut end = parts.len();
    while end > 1 && is_semi(&parts[end - 1]) {
        end -= 1;
    }
    let parts = &parts[..end];
    if parts.len() == 1 {
        return parts[0].to_sexp();
    }
    if parts.last().map_or(false, |n| n.is_operator("&")) {
        let mut i = parts.len() as isize - 3;
        while i > 0 {
            let idx = i as usize;
            if is_semi(&parts[idx]) {
                let left = &parts[..idx];
                let right = &parts[idx + 1..parts.len() - 1];
                return format!(
                    "(semi {} (background {}))",
                    list_to_sexp(left),
                    list_to_sexp(right)
                );
            }
            i -= 2;
        }
        let inner = &parts[..parts.len() - 1];
        return format!("(background {})", list_to_sexp(inner));
    }
    list_with_precedence(parts)
}

fn list_with_precedence(parts: &[Node]) -> String {
    let semi_positions: Vec<usize> = (0..parts.len()).filter(|&i| is_semi(&parts[i])).collect();
    if semi_positions.is_empty() {
        return list_amp_and_higher(parts);
    }
    let mut segments: Vec<&[Node]> = Vec::new();
    let mut start = 0;
    for pos in semi_positions {
        let seg = &parts[start..pos];
        if seg.first().map_or(false, |n| n.kind() != "operator") {
            segments.push(seg);
        }
        start = pos + 1;
    }
    let seg = &parts[start..];
    if seg.first().map_or(false, |n| n.kind() != "operator") {
        segments.push(seg);
    }
    let Some((first, rest)) = segments.split_first() else {
        return "()".to_string();
    };
    let mut result = list_amp_and_higher(first);
    for seg in rest {
        result = format!("(semi {} {})", result, list_amp_and_higher(seg));
    }
    result
}

fn list_amp_and_higher(parts: &[Node]) -> String {
    if parts.len() == 1 {
        return parts[0].to_sexp();
    }
    let amp_positions: Vec<usize> = (1..parts.len().saturating_sub(1))
        .step_by(2)
        .filter(|&i| parts[i].is_operator("&"))
        .collect();
    if amp_positions.is_empty() {
        return list_and_or(parts);
    }
    let mut segments: Vec<&[Node]> = Vec::new();
    let mut start = 0;
    for pos in amp_positions {
        segments.push(&parts[start..pos]);
        start = pos + 1;
    }
    segments.push(&parts[start..]);
    let mut result = list_and_or(segments[0]);
    for seg in &segments[1..] {
        result = format!("(background {} {})", result, list_and_or(seg));
    }
    result
}

fn list_and_or(parts: &[Node]) -> String {
    if parts.len() == 1 {
        return parts[0].to_sexp();
    }
    let mut result = parts[0].to_sexp();
    let mut i = 1;
    while i + 1 < parts.len() {
        let name = match &parts[i] {
            Node::Operator { op } => list_op_name(op).to_string(),
            other => other.kind().to_string(),
        };
        result = format!("({} {} {})", name, result, parts[i + 1].to_sexp());
        i += 2;
    }
    result
}

fn pipeline_to_sexp(commands: &[Node]) -> String {
    if commands.len() == 1 {
        return commands[0].to_sexp();
    }
    let mut cmds: Vec<(&Node, bool)> = Vec::new();
    for (i, cmd) in commands.iter().enumerate() {
        if matches!(cmd, Node::PipeBoth) {
            continue;
        }
        let needs_redirect = matches!(commands.get(i + 1), Some(Node::PipeBoth));
        cmds.push((cmd, needs_redirect));
    }
    let Some(((last, last_needs), rest)) = cmds.split_last() else {
        return String::new();
    };
    let mut result = pipe_member_sexp(last, *last_needs);
    for (cmd, needs) in rest.iter().rev() {
        if *needs && !matches!(cmd, Node::Command { .. }) {
            result = format!("(pipe {} (redirect \">&\" 1) {})", cmd.to_sexp(), result);
        } else {
            result = format!("(pipe {} {})", pipe_member_sexp(cmd, *needs), result);
        }
    }
    result
}

fn pipe_member_sexp(cmd: &Node, needs_redirect: bool) -> String {
    match cmd {
        Node::Command { words, redirects } if needs_redirect => {
            let mut parts: Vec<String> = words.iter().map(Word::to_sexp).collect();
            parts.extend(redirects.iter().map(Node::to_sexp));
            parts.push("(redirect \">&\" 1)".to_string());
            format!("(command {})", parts.join(" "))
        }
        _ => cmd.to_sexp(),
    }
}

fn redirect_to_sexp(op: &str, target: &Word) -> String {
    let mut op = strip_fd_variable(op.trim_start_matches(|c: char| c.is_ascii_digit())).to_string();
    let mut target_val = strip_locale_dollars(&target.value);
    if target_val.ends_with('\\') && !target_val.ends_with("\\\\") {
        target_val.push('\\');
    }
    if let Some(raw) = target_val.strip_prefix('&') {
        if op == ">" {
            op = ">&".to_string();
        } else if op == "<" {
            op = "<&".to_string();
        }
        if let Some(n) = digits_value(raw) {
            return format!("(redirect \"{}\" {})", op, n);
        }
        if let Some(n) = raw.strip_suffix('-').and_then(digits_value) {
            return format!("(redirect \"{}\" {})", op, n);
        }
        if target_val == "&-" {
            return "(redirect \">&-\" 0)".to_string();
        }
        let fd_target = raw.strip_suffix('-').unwrap_or(raw);
        return format!("(redirect \"{}\" \"{}\")", op, fd_target);
    }
    if op == ">&" || op == "<&" {
        if let Some(n) = digits_value(&target_val) {
            return format!("(redirect \"{}\" {})", op, n);
        }
        if target_val == "-" {
            return "(redirect \">&-\" 0)".to_string();
        }
        if let Some(n) = target_val.strip_suffix('-').and_then(digits_value) {
            return format!("(redirect \"{}\" {})", op, n);
        }
        let out = target_val.strip_suffix('-').unwrap_or(&target_val);
        return format!("(redirect \"{}\" \"{}\")", op, out);
    }
    format!("(redirect \"{}\" \"{}\")", op, target_val)
}

fn arith_val(s: &str) -> String {
    let v = if s.is_empty() { "1" } else { s };
    escape_quotes(&strip_locale_dollars(v))
        .replace('\n', "\\n")
        .replace('\t', "\\t")
}

fn in_clause(words: &Option<Vec<Word>>) -> String {
    match words {
        None => "(in (word \"\\\"$@\\\"\"))".to_string(),
        Some(ws) if ws.is_empty() => "(in)".to_string(),
        Some(ws) => {
            let rendered: Vec<String> = ws.iter().map(Word::to_sexp).collect();
            format!("(in {})", rendered.join(" "))
        }
    }
}

fn param_sexp(tag: &str, param: &str, op: &Option<String>, arg: &Option<String>) -> String {
    match op {
        Some(op) => format!(
            "({} \"{}\" \"{}\" \"{}\")",
            tag,
            escape_quotes(param),
            escape_quotes(op),
            escape_quotes(arg.as_deref().unwrap_or(""))
        ),
        None => format!("({} \"{}\")", tag, escape_quotes(param)),
    }
}

fn opt_sexp(node: &Option<Box<Node>>) -> String {
    node.as_ref().map_or_else(|| "(arith-empty)".to_string(), |n| n.to_sexp())
}

impl Node {
    /// Render this node as its canonical S-expression.
    pub fn to_sexp(&self) -> String {
        match self {
            Node::Word(w) => w.to_sexp(),
            Node::Command { words, redirects } => {
                let mut parts: Vec<String> = words.iter().map(Word::to_sexp).collect();
                parts.extend(redirects.iter().map(Node::to_sexp));
                if parts.is_empty() {
                    "(command)".to_string()
                } else {
                    format!("(command {})", parts.join(" "))
                }
            }
            Node::Pipeline { commands } => pipeline_to_sexp(commands),
            Node::List { parts } => list_to_sexp(parts),
            Node::Operator { op } => {
                let name = match op.as_str() {
                    "&&" => "and",
                    "||" => "or",
                    ";" => "semi",
                    "&" => "bg",
                    "|" => "pipe",
                    other => other,
                };
                format!("({})", name)
            }
            Node::PipeBoth => "(pipe-both)".to_string(),
            Node::Empty | Node::Comment { .. } => String::new(),
            Node::Redirect { op, target } => redirect_to_sexp(op, target),
            Node::HereDoc(h) => h.to_sexp(),
            Node::Subshell { body, redirects } => {
                append_redirects(format!("(subshell {})", body.to_sexp()), redirects)
            }
            Node::BraceGroup { body, redirects } => {
                append_redirects(format!("(brace-group {})", body.to_sexp()), redirects)
            }
            Node::If { condition, then_body, else_body, redirects } => {
                let mut result = format!("(if {} {}", condition.to_sexp(), then_body.to_sexp());
                if let Some(e) = else_body {
                    result.push(' ');
                    result.push_str(&e.to_sexp());
                }
                result.push(')');
                result + &redirect_suffix(redirects)
            }
            Node::While { condition, body, redirects } => append_redirects(
                format!("(while {} {})", condition.to_sexp(), body.to_sexp()),
                redirects,
            ),
            Node::Until { condition, body, redirects } => append_redirects(
                format!("(until {} {})", condition.to_sexp(), body.to_sexp()),
                redirects,
            ),
            Node::For { var, words, body, redirects } => format!(
                "(for (word \"{}\") {} {}){}",
                escape_quotes(var),
                in_clause(words),
                body.to_sexp(),
                redirect_suffix(redirects)
            ),
            Node::ForArith { init, cond, incr, body, redirects } => format!(
                "(arith-for (init (word \"{}\")) (test (word \"{}\")) (step (word \"{}\")) {}){}",
                arith_val(init),
                arith_val(cond),
                arith_val(incr),
                body.to_sexp(),
                redirect_suffix(redirects)
            ),
            Node::Select { var, words, body, redirects } => format!(
                "(select (word \"{}\") {} {}){}",
                escape_quotes(var),
                in_clause(words),
                body.to_sexp(),
                redirect_suffix(redirects)
            ),
            Node::Case { word, patterns, redirects } => {
                let mut parts = vec![format!("(case {}", word.to_sexp())];
                parts.extend(patterns.iter().map(CasePattern::to_sexp));
                append_redirects(parts.join(" ") + ")", redirects)
            }
            Node::Function { name, body } => format!("(function \"{}\" {})", name, body.to_sexp()),
            Node::Coproc { command, name } => format!(
                "(coproc \"{}\" {})",
                name.as_deref().unwrap_or("COPROC"),
                command.to_sexp()
            ),
            Node::Negation { pipeline } => match pipeline {
                Some(p) => format!("(negation {})", p.to_sexp()),
                None => "(negation (command))".to_string(),
            },
            Node::Time { pipeline, posix } => {
                let inner = pipeline
                    .as_ref()
                    .map_or_else(|| "(command)".to_string(), |p| p.to_sexp());
                if *posix {
                    format!("(time -p {})", inner)
                } else {
                    format!("(time {})", inner)
                }
            }
            Node::ParamExpansion { param, op, arg } => param_sexp("param", param, op, arg),
            Node::ParamLength { param } => format!("(param-len \"{}\")", escape_quotes(param)),
            Node::ParamIndirect { param, op, arg } => param_sexp("param-indirect", param, op, arg),
            Node::CommandSubstitution { command, brace } => {
                let tag = if *brace { "funsub" } else { "cmdsub" };
                format!("({} {})", tag, command.to_sexp())
            }
            Node::ProcessSubstitution { direction, command } => {
                format!("(procsub \"{}\" {})", direction, command.to_sexp())
            }
            Node::ArithmeticExpansion { expression } => match expression {
                Some(e) => format!("(arith {})", e.to_sexp()),
                None => "(arith)".to_string(),
            },
            Node::ArithmeticCommand { redirects, raw_content, .. } => {
                let escaped = escape_with_newlines(raw_content).replace('\t', "\\t");
                format!("(arith (word \"{}\")){}", escaped, redirect_suffix(redirects))
            }
            Node::AnsiCQuote { content } => format!("(ansi-c \"{}\")", escape_with_newlines(content)),
            Node::LocaleString { content } => {
                format!("(locale \"{}\")", escape_with_newlines(content))
            }
            Node::Array { elements } => {
                if elements.is_empty() {
                    "(array)".to_string()
                } else {
                    let rendered: Vec<String> = elements.iter().map(Word::to_sexp).collect();
                    format!("(array {})", rendered.join(" "))
                }
            }
            Node::ArithNumber { value } => format!("(number \"{}\")", value),
            Node::ArithEmpty => "(empty)".to_string(),
            Node::ArithVar { name } => format!("(var \"{}\")", name),
            Node::ArithBinaryOp { op, left, right } => {
                format!("(binary-op \"{}\" {} {})", op, left.to_sexp(), right.to_sexp())
            }
            Node::ArithUnaryOp { op, operand } => {
                format!("(unary-op \"{}\" {})", op, operand.to_sexp())
            }
            Node::ArithPreIncr { operand } => format!("(pre-incr {})", operand.to_sexp()),
            Node::ArithPostIncr { operand } => format!("(post-incr {})", operand.to_sexp()),
            Node::ArithPreDecr { operand } => format!("(pre-decr {})", operand.to_sexp()),
            Node::ArithPostDecr { operand } => format!("(post-decr {})", operand.to_sexp()),
            Node::ArithAssign { op, target, value } => {
                format!("(assign \"{}\" {} {})", op, target.to_sexp(), value.to_sexp())
            }
            Node::ArithTernary { condition, if_true, if_false } => format!(
                "(ternary {} {} {})",
                condition.to_sexp(),
                opt_sexp(if_true),
                opt_sexp(if_false)
            ),
            Node::ArithComma { left, right } => {
                format!("(comma {} {})", left.to_sexp(), right.to_sexp())
            }
            Node::ArithSubscript { array, index } => {
                format!("(subscript \"{}\" {})", array, index.to_sexp())
            }
            Node::ArithEscape { ch } => format!("(escape \"{}\")", ch),
            Node::ArithDeprecated { expression } => {
                format!("(arith-deprecated \"{}\")", escape_with_newlines(expression))
            }
            Node::ArithConcat { parts } => {
                let rendered: Vec<String> = parts.iter().map(Node::to_sexp).collect();
                format!("(arith-concat {})", rendered.join(" "))
            }
            Node::ConditionalExpr { body, redirects } => {
                format!("(cond {}){}", body.to_sexp(), redirect_suffix(redirects))
            }
            Node::UnaryTest { op, operand } => format!(
                "(cond-unary \"{}\" (cond-term \"{}\"))",
                op,
                operand.cond_formatted_value()
            ),
            Node::BinaryTest { op, left, right } => format!(
                "(cond-binary \"{}\" (cond-term \"{}\") (cond-term \"{}\"))",
                op,
                left.cond_formatted_value(),
                right.cond_formatted_value()
            ),
            Node::CondAnd { left, right } => {
                format!("(cond-and {} {})", left.to_sexp(), right.to_sexp())
            }
            Node::CondOr { left, right } => {
                format!("(cond-or {} {})", left.to_sexp(), right.to_sexp())
            }
            Node::CondNot { operand } => operand.to_sexp(),
            Node::CondParen { inner } => format!("(cond-expr {})", inner.to_sexp()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::AST;

    fn cmd(words: &[&str]) -> Node {
        AST::command(words.iter().map(|w| AST::word(*w, vec![])).collect(), vec![])
    }

    #[test]
    fn test_word_escaping() {
        assert_eq!(AST::word("a\"b", vec![]).to_sexp(), "(word \"a\\\"b\")");
        assert_eq!(AST::word("a\\b", vec![]).to_sexp(), "(word \"a\\\\b\")");
        assert_eq!(AST::word("$\"hi\"", vec![]).to_sexp(), "(word \"\\\"hi\\\"\")");
    }

    #[test]
    fn test_word_ansi_c_expanded() {
        let word = |v: &str| AST::word(v, vec![]).to_sexp();
        assert_eq!(word("$'a\\nb'"), "(word \"'a\\nb'\")");
        assert_eq!(word("$'it\\'s'"), "(word \"'it'\\\\''s'\")");
        assert_eq!(word("x$'\\x41\\0zz'"), "(word \"x'A'\")");
        assert_eq!(word("$'\\u00e9\\101'"), "(word \"'\u{e9}A'\")");
        assert_eq!(word("${v:-$'a'}"), "(word \"${v:-a}\")");
        // Not ANSI-C inside double quotes or after an escaped dollar
        assert_eq!(word("\"$'n'\""), "(word \"\\\"$'n'\\\"\")");
        assert_eq!(word("\\$'n'"), "(word \"\\\\$'n'\")");
        assert_eq!(word("$\"a\"$'b'"), "(word \"\\\"a\\\"'b'\")");
    }

    #[test]
    fn test_list_precedence() {
        let list = AST::list(vec![
            cmd(&["a"]),
            AST::operator("&&"),
            cmd(&["b"]),
            AST::operator(";"),
            cmd(&["c"]),
            AST::operator("&"),
        ]);
        assert_eq!(
            list.to_sexp(),
            "(semi (and (command (word \"a\")) (command (word \"b\"))) (background (command (word \"c\"))))"
        );
    }

    #[test]
    fn test_trailing_semicolon_is_dropped() {
        let list = AST::list(vec![cmd(&["a"]), AST::operator(";")]);
        assert_eq!(list.to_sexp(), "(command (word \"a\"))");
    }

    #[test]
    fn test_pipe_both_adds_redirect() {
        let pipe = AST::pipeline(vec![cmd(&["a"]), Node::PipeBoth, cmd(&["b"])]);
        assert_eq!(
            pipe.to_sexp(),
            "(pipe (command (word \"a\") (redirect \">&\" 1)) (command (word \"b\")))"
        );
    }

    #[test]
    fn test_redirect_forms() {
        assert_eq!(
            AST::redirect("2>&", AST::word("1", vec![])).to_sexp(),
            "(redirect \">&\" 1)"
        );
        assert_eq!(
            AST::redirect(">&", AST::word("-", vec![])).to_sexp(),
            "(redirect \">&-\" 0)"
        );
        assert_eq!(
            AST::redirect("{fd}>", AST::word("out", vec![])).to_sexp(),
            "(redirect \">\" \"out\")"
        );
    }

    #[test]
    fn test_case_pattern_alternatives() {
        let pat = CasePattern {
            pattern: "a|@(b|c)".to_string(),
            body: None,
            terminator: ";;".to_string(),
        };
        assert_eq!(pat.to_sexp(), "(pattern ((word \"a\") (word \"@(b|c)\")) ())");
    }

    #[test]
    fn test_for_without_in_iterates_positional() {
        let node = Node::For {
            var: "x".to_string(),
            words: None,
            body: Box::new(cmd(&["true"])),
            redirects: vec![],
        };
        assert_eq!(
            node.to_sexp(),
            "(for (word \"x\") (in (word \"\\\"$@\\\"\")) (command (word \"true\")))"
        );
    }
}
