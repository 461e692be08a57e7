//! Abstract Syntax Tree (AST) Types for Bash
//!
//! Every grammar production maps to one variant of [`Node`]. Words keep their
//! raw source text (quotes and escapes intact) alongside the expansion nodes
//! found inside them, so a projector can reproduce the canonical output
//! without re-parsing.

use serde::Serialize;

// =============================================================================
// WORDS
// =============================================================================

/// A shell word: raw text plus the expansions embedded in it, in source order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Word {
    pub value: String,
    pub parts: Vec<Node>,
}

impl Word {
    pub fn new(value: impl Into<String>, parts: Vec<Node>) -> Self {
        Self {
            value: value.into(),
            parts,
        }
    }
}

// =============================================================================
// REDIRECTIONS
// =============================================================================

/// A here-document. The body is filled in after the redirecting line ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HereDoc {
    pub delimiter: String,
    pub content: String,
    pub strip_tabs: bool,
    pub quoted: bool,
    pub fd: Option<u32>,
    /// Set once the body has been gathered (or the owning parse finished).
    pub complete: bool,
    #[serde(skip)]
    pub(crate) start_pos: usize,
    #[serde(skip)]
    pub(crate) id: usize,
}

// =============================================================================
// CASE ITEMS
// =============================================================================

/// One `pattern) body ;;` arm of a case statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CasePattern {
    /// Raw pattern text, alternatives still joined by `|`.
    pub pattern: String,
    pub body: Option<Box<Node>>,
    /// `;;`, `;&` or `;;&`
    pub terminator: String,
}

// =============================================================================
// NODES
// =============================================================================

/// Union of all AST node types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Node {
    // ---- commands and lists ----
    #[serde(rename = "word")]
    Word(Word),
    #[serde(rename = "command")]
    Command { words: Vec<Word>, redirects: Vec<Node> },
    #[serde(rename = "pipeline")]
    Pipeline { commands: Vec<Node> },
    /// Flat operand/operator sequence; precedence is recovered on projection.
    #[serde(rename = "list")]
    List { parts: Vec<Node> },
    #[serde(rename = "operator")]
    Operator { op: String },
    /// Marker following a command that was piped with `|&`.
    #[serde(rename = "pipe-both")]
    PipeBoth,
    #[serde(rename = "empty")]
    Empty,
    #[serde(rename = "comment")]
    Comment { text: String },

    // ---- redirections ----
    #[serde(rename = "redirect")]
    Redirect { op: String, target: Word },
    #[serde(rename = "heredoc")]
    HereDoc(HereDoc),

    // ---- compound commands ----
    #[serde(rename = "subshell")]
    Subshell { body: Box<Node>, redirects: Vec<Node> },
    #[serde(rename = "brace-group")]
    BraceGroup { body: Box<Node>, redirects: Vec<Node> },
    #[serde(rename = "if")]
    If {
        condition: Box<Node>,
        then_body: Box<Node>,
        else_body: Option<Box<Node>>,
        redirects: Vec<Node>,
    },
    #[serde(rename = "while")]
    While { condition: Box<Node>, body: Box<Node>, redirects: Vec<Node> },
    #[serde(rename = "until")]
    Until { condition: Box<Node>, body: Box<Node>, redirects: Vec<Node> },
    /// `words` is `None` when the `in` clause is absent (iterate `"$@"`).
    #[serde(rename = "for")]
    For {
        var: String,
        words: Option<Vec<Word>>,
        body: Box<Node>,
        redirects: Vec<Node>,
    },
    #[serde(rename = "for-arith")]
    ForArith {
        init: String,
        cond: String,
        incr: String,
        body: Box<Node>,
        redirects: Vec<Node>,
    },
    #[serde(rename = "select")]
    Select {
        var: String,
        words: Option<Vec<Word>>,
        body: Box<Node>,
        redirects: Vec<Node>,
    },
    #[serde(rename = "case")]
    Case { word: Word, patterns: Vec<CasePattern>, redirects: Vec<Node> },
    #[serde(rename = "function")]
    Function { name: String, body: Box<Node> },
    #[serde(rename = "coproc")]
    Coproc { command: Box<Node>, name: Option<String> },
    #[serde(rename = "negation")]
    Negation { pipeline: Option<Box<Node>> },
    #[serde(rename = "time")]
    Time { pipeline: Option<Box<Node>>, posix: bool },

    // ---- expansions ----
    #[serde(rename = "param")]
    ParamExpansion { param: String, op: Option<String>, arg: Option<String> },
    #[serde(rename = "param-len")]
    ParamLength { param: String },
    #[serde(rename = "param-indirect")]
    ParamIndirect { param: String, op: Option<String>, arg: Option<String> },
    /// `$(...)`, backticks, or a funsub `${ ...; }` when `brace` is set.
    #[serde(rename = "cmdsub")]
    CommandSubstitution { command: Box<Node>, brace: bool },
    #[serde(rename = "procsub")]
    ProcessSubstitution { direction: String, command: Box<Node> },
    #[serde(rename = "arith")]
    ArithmeticExpansion { expression: Option<Box<Node>> },
    #[serde(rename = "arith-cmd")]
    ArithmeticCommand {
        expression: Option<Box<Node>>,
        redirects: Vec<Node>,
        raw_content: String,
    },
    #[serde(rename = "ansi-c")]
    AnsiCQuote { content: String },
    #[serde(rename = "locale")]
    LocaleString { content: String },
    #[serde(rename = "array")]
    Array { elements: Vec<Word> },

    // ---- arithmetic ----
    #[serde(rename = "number")]
    ArithNumber { value: String },
    #[serde(rename = "arith-empty")]
    ArithEmpty,
    #[serde(rename = "var")]
    ArithVar { name: String },
    #[serde(rename = "binary-op")]
    ArithBinaryOp { op: String, left: Box<Node>, right: Box<Node> },
    #[serde(rename = "unary-op")]
    ArithUnaryOp { op: String, operand: Box<Node> },
    #[serde(rename = "pre-incr")]
    ArithPreIncr { operand: Box<Node> },
    #[serde(rename = "post-incr")]
    ArithPostIncr { operand: Box<Node> },
    #[serde(rename = "pre-decr")]
    ArithPreDecr { operand: Box<Node> },
    #[serde(rename = "post-decr")]
    ArithPostDecr { operand: Box<Node> },
    #[serde(rename = "assign")]
    ArithAssign { op: String, target: Box<Node>, value: Box<Node> },
    #[serde(rename = "ternary")]
    ArithTernary {
        condition: Box<Node>,
        if_true: Option<Box<Node>>,
        if_false: Option<Box<Node>>,
    },
    #[serde(rename = "comma")]
    ArithComma { left: Box<Node>, right: Box<Node> },
    #[serde(rename = "subscript")]
    ArithSubscript { array: String, index: Box<Node> },
    #[serde(rename = "escape")]
    ArithEscape { ch: String },
    #[serde(rename = "arith-deprecated")]
    ArithDeprecated { expression: String },
    #[serde(rename = "arith-concat")]
    ArithConcat { parts: Vec<Node> },

    // ---- conditional expressions ----
    #[serde(rename = "cond-expr")]
    ConditionalExpr { body: Box<Node>, redirects: Vec<Node> },
    #[serde(rename = "unary-test")]
    UnaryTest { op: String, operand: Word },
    #[serde(rename = "binary-test")]
    BinaryTest { op: String, left: Word, right: Word },
    #[serde(rename = "cond-and")]
    CondAnd { left: Box<Node>, right: Box<Node> },
    #[serde(rename = "cond-or")]
    CondOr { left: Box<Node>, right: Box<Node> },
    #[serde(rename = "cond-not")]
    CondNot { operand: Box<Node> },
    #[serde(rename = "cond-paren")]
    CondParen { inner: Box<Node> },
}

impl Node {
    /// Short kind tag, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Word(_) => "word",
            Node::Command { .. } => "command",
            Node::Pipeline { .. } => "pipeline",
            Node::List { .. } => "list",
            Node::Operator { .. } => "operator",
            Node::PipeBoth => "pipe-both",
            Node::Empty => "empty",
            Node::Comment { .. } => "comment",
            Node::Redirect { .. } => "redirect",
            Node::HereDoc(_) => "heredoc",
            Node::Subshell { .. } => "subshell",
            Node::BraceGroup { .. } => "brace-group",
            Node::If { .. } => "if",
            Node::While { .. } => "while",
            Node::Until { .. } => "until",
            Node::For { .. } => "for",
            Node::ForArith { .. } => "for-arith",
            Node::Select { .. } => "select",
            Node::Case { .. } => "case",
            Node::Function { .. } => "function",
            Node::Coproc { .. } => "coproc",
            Node::Negation { .. } => "negation",
            Node::Time { .. } => "time",
            Node::ParamExpansion { .. } => "param",
            Node::ParamLength { .. } => "param-len",
            Node::ParamIndirect { .. } => "param-indirect",
            Node::CommandSubstitution { .. } => "cmdsub",
            Node::ProcessSubstitution { .. } => "procsub",
            Node::ArithmeticExpansion { .. } => "arith",
            Node::ArithmeticCommand { .. } => "arith-cmd",
            Node::AnsiCQuote { .. } => "ansi-c",
            Node::LocaleString { .. } => "locale",
            Node::Array { .. } => "array",
            Node::ArithNumber { .. } => "number",
            Node::ArithEmpty => "arith-empty",
            Node::ArithVar { .. } => "var",
            Node::ArithBinaryOp { .. } => "binary-op",
            Node::ArithUnaryOp { .. } => "unary-op",
            Node::ArithPreIncr { .. } => "pre-incr",
            Node::ArithPostIncr { .. } => "post-incr",
            Node::ArithPreDecr { .. } => "pre-decr",
            Node::ArithPostDecr { .. } => "post-decr",
            Node::ArithAssign { .. } => "assign",
            Node::ArithTernary { .. } => "ternary",
            Node::ArithComma { .. } => "comma",
            Node::ArithSubscript { .. } => "subscript",
            Node::ArithEscape { .. } => "escape",
            Node::ArithDeprecated { .. } => "arith-deprecated",
            Node::ArithConcat { .. } => "arith-concat",
            Node::ConditionalExpr { .. } => "cond-expr",
            Node::UnaryTest { .. } => "unary-test",
            Node::BinaryTest { .. } => "binary-test",
            Node::CondAnd { .. } => "cond-and",
            Node::CondOr { .. } => "cond-or",
            Node::CondNot { .. } => "cond-not",
            Node::CondParen { .. } => "cond-paren",
        }
    }

    /// True for a list operator node carrying `op`.
    pub fn is_operator(&self, op: &str) -> bool {
        matches!(self, Node::Operator { op: o } if o == op)
    }

    /// Direct child nodes, in source order. Words contribute their parts.
    pub fn children(&self) -> Vec<&Node> {
        fn words<'a>(out: &mut Vec<&'a Node>, ws: &'a [Word]) {
            for w in ws {
                out.extend(w.parts.iter());
            }
        }
        let mut out: Vec<&Node> = Vec::new();
        match self {
            Node::Word(w) => out.extend(w.parts.iter()),
            Node::Command { words: ws, redirects } => {
                words(&mut out, ws);
                out.extend(redirects.iter());
            }
            Node::Pipeline { commands } => out.extend(commands.iter()),
            Node::List { parts } => out.extend(parts.iter()),
            Node::Redirect { target, .. } => out.extend(target.parts.iter()),
            Node::Subshell { body, redirects } | Node::BraceGroup { body, redirects } => {
                out.push(body);
                out.extend(redirects.iter());
            }
            Node::If { condition, then_body, else_body, redirects } => {
                out.push(condition);
                out.push(then_body);
                if let Some(e) = else_body {
                    out.push(e);
                }
                out.extend(redirects.iter());
            }
            Node::While { condition, body, redirects }
            | Node::Until { condition, body, redirects } => {
                out.push(condition);
                out.push(body);
                out.extend(redirects.iter());
            }
            Node::For { words: ws, body, redirects, .. }
            | Node::Select { words: ws, body, redirects, .. } => {
                if let Some(ws) = ws {
                    words(&mut out, ws);
                }
                out.push(body);
                out.extend(redirects.iter());
            }
            Node::ForArith { body, redirects, .. } => {
                out.push(body);
                out.extend(redirects.iter());
            }
            Node::Case { word, patterns, redirects } => {
                out.extend(word.parts.iter());
                for p in patterns {
                    if let Some(b) = &p.body {
                        out.push(b);
                    }
                }
                out.extend(redirects.iter());
            }
            Node::Function { body, .. } => out.push(body),
            Node::Coproc { command, .. } => out.push(command),
            Node::Negation { pipeline } | Node::Time { pipeline, .. } => {
                if let Some(p) = pipeline {
                    out.push(p);
                }
            }
            Node::CommandSubstitution { command, .. }
            | Node::ProcessSubstitution { command, .. } => out.push(command),
            Node::ArithmeticExpansion { expression } => {
                if let Some(e) = expression {
                    out.push(e);
                }
            }
            Node::ArithmeticCommand { expression, redirects, .. } => {
                if let Some(e) = expression {
                    out.push(e);
                }
                out.extend(redirects.iter());
            }
            Node::Array { elements } => words(&mut out, elements),
            Node::ArithBinaryOp { left, right, .. }
            | Node::ArithComma { left, right }
            | Node::CondAnd { left, right }
            | Node::CondOr { left, right } => {
                out.push(left);
                out.push(right);
            }
            Node::ArithUnaryOp { operand, .. }
            | Node::ArithPreIncr { operand }
            | Node::ArithPostIncr { operand }
            | Node::ArithPreDecr { operand }
            | Node::ArithPostDecr { operand }
            | Node::CondNot { operand } => out.push(operand),
            Node::ArithAssign { target, value, .. } => {
                out.push(target);
                out.push(value);
            }
            Node::ArithTernary { condition, if_true, if_false } => {
                out.push(condition);
                if let Some(t) = if_true {
                    out.push(t);
                }
                if let Some(f) = if_false {
                    out.push(f);
                }
            }
            Node::ArithSubscript { index, .. } => out.push(index),
            Node::ArithConcat { parts } => out.extend(parts.iter()),
            Node::ConditionalExpr { body, redirects } => {
                out.push(body);
                out.extend(redirects.iter());
            }
            Node::UnaryTest { operand, .. } => out.extend(operand.parts.iter()),
            Node::BinaryTest { left, right, .. } => {
                out.extend(left.parts.iter());
                out.extend(right.parts.iter());
            }
            Node::CondParen { inner } => out.push(inner),
            Node::Operator { .. }
            | Node::PipeBoth
            | Node::Empty
            | Node::Comment { .. }
            | Node::HereDoc(_)
            | Node::ParamExpansion { .. }
            | Node::ParamLength { .. }
            | Node::ParamIndirect { .. }
            | Node::AnsiCQuote { .. }
            | Node::LocaleString { .. }
            | Node::ArithNumber { .. }
            | Node::ArithEmpty
            | Node::ArithVar { .. }
            | Node::ArithEscape { .. }
            | Node::ArithDeprecated { .. } => {}
        }
        out
    }

    /// Visit every here-document reachable from this node, including those
    /// nested inside command substitutions.
    pub fn for_each_heredoc_mut(&mut self, f: &mut dyn FnMut(&mut HereDoc)) {
        fn words(ws: &mut [Word], f: &mut dyn FnMut(&mut HereDoc)) {
            for w in ws {
                nodes(&mut w.parts, f);
            }
        }
        fn nodes(ns: &mut [Node], f: &mut dyn FnMut(&mut HereDoc)) {
            for n in ns {
                n.for_each_heredoc_mut(f);
            }
        }
        match self {
            Node::HereDoc(h) => f(h),
            Node::Word(w) => nodes(&mut w.parts, f),
            Node::Command { words: ws, redirects } => {
                words(ws, f);
                nodes(redirects, f);
            }
            Node::Pipeline { commands } => nodes(commands, f),
            Node::List { parts } => nodes(parts, f),
            Node::Redirect { target, .. } => nodes(&mut target.parts, f),
            Node::Subshell { body, redirects } | Node::BraceGroup { body, redirects } => {
                body.for_each_heredoc_mut(f);
                nodes(redirects, f);
            }
            Node::If { condition, then_body, else_body, redirects } => {
                condition.for_each_heredoc_mut(f);
                then_body.for_each_heredoc_mut(f);
                if let Some(e) = else_body {
                    e.for_each_heredoc_mut(f);
                }
                nodes(redirects, f);
            }
            Node::While { condition, body, redirects }
            | Node::Until { condition, body, redirects } => {
                condition.for_each_heredoc_mut(f);
                body.for_each_heredoc_mut(f);
                nodes(redirects, f);
            }
            Node::For { words: ws, body, redirects, .. }
            | Node::Select { words: ws, body, redirects, .. } => {
                if let Some(ws) = ws {
                    words(ws, f);
                }
                body.for_each_heredoc_mut(f);
                nodes(redirects, f);
            }
            Node::ForArith { body, redirects, .. } => {
                body.for_each_heredoc_mut(f);
                nodes(redirects, f);
            }
            Node::Case { word, patterns, redirects } => {
                nodes(&mut word.parts, f);
                for p in patterns.iter_mut() {
                    if let Some(b) = p.body.as_mut() {
                        b.for_each_heredoc_mut(f);
                    }
                }
                nodes(redirects, f);
            }
            Node::Function { body, .. } => body.for_each_heredoc_mut(f),
            Node::Coproc { command, .. }
            | Node::CommandSubstitution { command, .. }
            | Node::ProcessSubstitution { command, .. } => command.for_each_heredoc_mut(f),
            Node::Negation { pipeline } | Node::Time { pipeline, .. } => {
                if let Some(p) = pipeline {
                    p.for_each_heredoc_mut(f);
                }
            }
            Node::ArithmeticExpansion { expression } => {
                if let Some(e) = expression {
                    e.for_each_heredoc_mut(f);
                }
            }
            Node::ArithmeticCommand { expression, redirects, .. } => {
                if let Some(e) = expression {
                    e.for_each_heredoc_mut(f);
                }
                nodes(redirects, f);
            }
            Node::Array { elements } => words(elements, f),
            Node::ConditionalExpr { body, redirects } => {
                body.for_each_heredoc_mut(f);
                nodes(redirects, f);
            }
            Node::UnaryTest { operand, .. } => nodes(&mut operand.parts, f),
            Node::BinaryTest { left, right, .. } => {
                nodes(&mut left.parts, f);
                nodes(&mut right.parts, f);
            }
            Node::CondAnd { left, right }
            | Node::CondOr { left, right }
            | Node::ArithBinaryOp { left, right, .. }
            | Node::ArithComma { left, right } => {
                left.for_each_heredoc_mut(f);
                right.for_each_heredoc_mut(f);
            }
            Node::CondNot { operand }
            | Node::ArithUnaryOp { operand, .. }
            | Node::ArithPreIncr { operand }
            | Node::ArithPostIncr { operand }
            | Node::ArithPreDecr { operand }
            | Node::ArithPostDecr { operand } => operand.for_each_heredoc_mut(f),
            Node::CondParen { inner } => inner.for_each_heredoc_mut(f),
            Node::ArithAssign { target, value, .. } => {
                target.for_each_heredoc_mut(f);
                value.for_each_heredoc_mut(f);
            }
            Node::ArithTernary { condition, if_true, if_false } => {
                condition.for_each_heredoc_mut(f);
                if let Some(t) = if_true {
                    t.for_each_heredoc_mut(f);
                }
                if let Some(e) = if_false {
                    e.for_each_heredoc_mut(f);
                }
            }
            Node::ArithSubscript { index, .. } => index.for_each_heredoc_mut(f),
            Node::ArithConcat { parts } => nodes(parts, f),
            Node::Operator { .. }
            | Node::PipeBoth
            | Node::Empty
            | Node::Comment { .. }
            | Node::ParamExpansion { .. }
            | Node::ParamLength { .. }
            | Node::ParamIndirect { .. }
            | Node::AnsiCQuote { .. }
            | Node::LocaleString { .. }
            | Node::ArithNumber { .. }
            | Node::ArithEmpty
            | Node::ArithVar { .. }
            | Node::ArithEscape { .. }
            | Node::ArithDeprecated { .. } => {}
        }
    }
}

// =============================================================================
// AST FACTORY
// =============================================================================

/// Factory functions for building AST nodes
pub struct AST;

impl AST {
    pub fn word(value: impl Into<String>, parts: Vec<Node>) -> Word {
        Word::new(value, parts)
    }

    pub fn command(words: Vec<Word>, redirects: Vec<Node>) -> Node {
        Node::Command { words, redirects }
    }

    pub fn pipeline(commands: Vec<Node>) -> Node {
        Node::Pipeline { commands }
    }

    pub fn list(parts: Vec<Node>) -> Node {
        Node::List { parts }
    }

    pub fn operator(op: impl Into<String>) -> Node {
        Node::Operator { op: op.into() }
    }

    pub fn redirect(op: impl Into<String>, target: Word) -> Node {
        Node::Redirect {
            op: op.into(),
            target,
        }
    }

    pub fn heredoc(
        delimiter: impl Into<String>,
        strip_tabs: bool,
        quoted: bool,
        fd: Option<u32>,
        start_pos: usize,
        id: usize,
    ) -> HereDoc {
        HereDoc {
            delimiter: delimiter.into(),
            content: String::new(),
            strip_tabs,
            quoted,
            fd,
            complete: false,
            start_pos,
            id,
        }
    }

    pub fn param(param: impl Into<String>, op: Option<String>, arg: Option<String>) -> Node {
        Node::ParamExpansion {
            param: param.into(),
            op,
            arg,
        }
    }

    pub fn command_substitution(command: Node, brace: bool) -> Node {
        Node::CommandSubstitution {
            command: Box::new(command),
            brace,
        }
    }

    pub fn arith_binary(op: impl Into<String>, left: Node, right: Node) -> Node {
        Node::ArithBinaryOp {
            op: op.into(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn arith_unary(op: impl Into<String>, operand: Node) -> Node {
        Node::ArithUnaryOp {
            op: op.into(),
            operand: Box::new(operand),
        }
    }

    pub fn arith_number(value: impl Into<String>) -> Node {
        Node::ArithNumber { value: value.into() }
    }

    pub fn arith_var(name: impl Into<String>) -> Node {
        Node::ArithVar { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(AST::command(vec![], vec![]).kind(), "command");
        assert_eq!(Node::PipeBoth.kind(), "pipe-both");
        assert_eq!(AST::arith_number("1").kind(), "number");
        assert!(AST::operator("&&").is_operator("&&"));
        assert!(!AST::operator("&&").is_operator("||"));
    }

    #[test]
    fn test_children_include_word_parts() {
        let part = AST::param("x", None, None);
        let cmd = AST::command(vec![AST::word("$x", vec![part.clone()])], vec![]);
        assert_eq!(cmd.children(), vec![&part]);
    }

    #[test]
    fn test_for_each_heredoc_reaches_nested_substitution() {
        let doc = Node::HereDoc(AST::heredoc("EOF", false, false, None, 0, 7));
        let inner = AST::command(vec![AST::word("cat", vec![])], vec![doc]);
        let sub = AST::command_substitution(inner, false);
        let mut outer = AST::command(vec![AST::word("$(cat <<EOF)", vec![sub])], vec![]);
        let mut seen = Vec::new();
        outer.for_each_heredoc_mut(&mut |h| {
            seen.push(h.id);
            h.content = "body\n".to_string();
        });
        assert_eq!(seen, vec![7]);
        let Node::Command { words, .. } = &outer else {
            panic!("Expected command");
        };
        let Node::CommandSubstitution { command, .. } = &words[0].parts[0] else {
            panic!("Expected command substitution");
        };
        let Node::Command { redirects, .. } = command.as_ref() else {
            panic!("Expected inner command");
        };
        let Node::HereDoc(h) = &redirects[0] else {
            panic!("Expected heredoc");
        };
        assert_eq!(h.content, "body\n");
    }
}
