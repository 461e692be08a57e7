//! Compound Command Parser
//!
//! Handles parsing of compound commands:
//! - if/elif/else/fi
//! - for/select (word lists) and for ((;;))
//! - while/until
//! - case/esac
//! - subshells, brace groups and `(( ))`
//! - coproc and function definitions

use log::debug;

use crate::ast::types::{CasePattern, Node, Word};
use crate::parser::parser::Parser;
use crate::parser::types::{ParseResult, COMPOUND_KEYWORDS, RESERVED_WORDS};
use crate::parser::word_parser::{
    is_expansion_start, is_extglob_prefix, is_metachar, is_quote, is_valid_identifier,
    is_whitespace, looks_like_assignment,
};

/// Reserved words that can only continue a construct, never start one.
const CONTINUATION_WORDS: [&str; 8] = ["fi", "then", "elif", "else", "done", "esac", "do", "in"];

/// Last characters that make `name()` a glob pattern, not a function name,
/// unless whitespace separates them from the parenthesis.
const GLOB_NAME_ENDINGS: &str = "*?@+!$";

impl Parser {
    // =========================================================================
    // GROUPING
    // =========================================================================

    pub(crate) fn parse_subshell(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if self.peek() != Some('(') {
            return Ok(None);
        }
        self.advance();
        self.state.subshell = true;
        let body = self.parse_list(true);
        let result = body.and_then(|body| {
            let Some(body) = body else {
                return Err(self.error("Expected command in subshell", self.pos));
            };
            self.skip_whitespace();
            if self.peek() != Some(')') {
                return Err(self.error("Expected ) to close subshell", self.pos));
            }
            self.advance();
            Ok(body)
        });
        self.state.subshell = false;
        let body = result?;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::Subshell {
            body: Box::new(body),
            redirects,
        }))
    }

    /// `(( expr ))`. Returns `None` with the cursor unchanged when the
    /// parentheses turn out to be nested subshells.
    pub(crate) fn parse_arithmetic_command(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.starts_with("((") {
            return Ok(None);
        }
        let saved_pos = self.pos;
        self.pos += 2;
        let content_start = self.pos;
        let mut depth = 1usize;
        while let Some(c) = self.peek() {
            match c {
                '\'' => {
                    self.advance();
                    while self.peek().map_or(false, |c| c != '\'') {
                        self.advance();
                    }
                    self.advance();
                }
                '"' => {
                    self.advance();
                    while let Some(c) = self.peek() {
                        if c == '\\' && self.peek_at(1).is_some() {
                            self.pos += 2;
                            continue;
                        }
                        self.advance();
                        if c == '"' {
                            break;
                        }
                    }
                }
                '\\' if self.peek_at(1).is_some() => self.pos += 2,
                '(' => {
                    depth += 1;
                    self.advance();
                }
                ')' => {
                    if depth == 1 && self.peek_at(1) == Some(')') {
                        break;
                    }
                    depth -= 1;
                    if depth == 0 {
                        self.pos = saved_pos;
                        return Ok(None);
                    }
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
        if self.at_end() {
            return Err(self.matched_pair_error("unexpected EOF looking for `))'", saved_pos));
        }
        let content = self.slice(content_start, self.pos).replace("\\\n", "");
        self.pos += 2;
        let expression = self.parse_arith_expr(&content)?;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::ArithmeticCommand {
            expression: expression.map(Box::new),
            redirects,
            raw_content: content,
        }))
    }

    pub(crate) fn parse_brace_group(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.consume_keyword("{")? {
            return Ok(None);
        }
        self.skip_whitespace_and_newlines();
        let Some(body) = self.parse_list(true)? else {
            return Err(self.token_error("Expected command in brace group"));
        };
        self.skip_whitespace();
        if !self.consume_keyword("}")? {
            return Err(self.token_error("Expected } to close brace group"));
        }
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::BraceGroup {
            body: Box::new(body),
            redirects,
        }))
    }

    // =========================================================================
    // CONDITIONALS AND LOOPS
    // =========================================================================

    fn expect_keyword(&mut self, keyword: &str, message: &str) -> ParseResult<()> {
        self.skip_whitespace_and_newlines();
        if self.consume_keyword(keyword)? {
            Ok(())
        } else {
            Err(self.token_error(message))
        }
    }

    fn require_list_until(&mut self, stop: &[&str], message: &str) -> ParseResult<Node> {
        match self.parse_list_until(stop)? {
            Some(list) => Ok(list),
            None => Err(self.token_error(message)),
        }
    }

    pub(crate) fn parse_if(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.consume_keyword("if")? {
            return Ok(None);
        }
        let condition = self.require_list_until(&["then"], "Expected condition after 'if'")?;
        self.expect_keyword("then", "Expected 'then' after if condition")?;
        let then_body = self.require_list_until(&["elif", "else", "fi"], "Expected commands after 'then'")?;
        let else_body = self.parse_else_branch()?;
        self.expect_keyword("fi", "Expected 'fi' to close if statement")?;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::If {
            condition: Box::new(condition),
            then_body: Box::new(then_body),
            else_body: else_body.map(Box::new),
            redirects,
        }))
    }

    // `elif ...` (as a nested if without its own `fi`) or `else ...`.
    fn parse_else_branch(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace_and_newlines();
        if self.is_at_reserved_word("elif")? {
            self.consume_keyword("elif")?;
            let condition = self.require_list_until(&["then"], "Expected condition after 'elif'")?;
            self.expect_keyword("then", "Expected 'then' after elif condition")?;
            let then_body = self.require_list_until(&["elif", "else", "fi"], "Expected commands after 'then'")?;
            let else_body = self.parse_else_branch()?;
            return Ok(Some(Node::If {
                condition: Box::new(condition),
                then_body: Box::new(then_body),
                else_body: else_body.map(Box::new),
                redirects: vec![],
            }));
        }
        if self.is_at_reserved_word("else")? {
            self.consume_keyword("else")?;
            return self.require_list_until(&["fi"], "Expected commands after 'else'").map(Some);
        }
        Ok(None)
    }

    pub(crate) fn parse_while(&mut self) -> ParseResult<Option<Node>> {
        self.parse_condition_loop("while")
    }

    pub(crate) fn parse_until(&mut self) -> ParseResult<Option<Node>> {
        self.parse_condition_loop("until")
    }

    fn parse_condition_loop(&mut self, keyword: &str) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.consume_keyword(keyword)? {
            return Ok(None);
        }
        let condition = self.require_list_until(&["do"], &format!("Expected condition after '{}'", keyword))?;
        self.expect_keyword("do", &format!("Expected 'do' after {} condition", keyword))?;
        let body = self.require_list_until(&["done"], "Expected commands after 'do'")?;
        self.expect_keyword("done", &format!("Expected 'done' to close {} loop", keyword))?;
        let redirects = self.collect_redirects()?;
        let (condition, body) = (Box::new(condition), Box::new(body));
        Ok(Some(if keyword == "while" {
            Node::While { condition, body, redirects }
        } else {
            Node::Until { condition, body, redirects }
        }))
    }

    pub(crate) fn parse_for(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.consume_keyword("for")? {
            return Ok(None);
        }
        self.skip_whitespace();
        if self.starts_with("((") {
            return self.parse_for_arith().map(Some);
        }
        let var = if self.peek() == Some('$') {
            match self.parse_word(false, false, false)? {
                Some(word) => word.value,
                None => return Err(self.token_error("Expected variable name after 'for'")),
            }
        } else {
            let name = self.peek_raw_word();
            if name.is_empty() {
                return Err(self.token_error("Expected variable name after 'for'"));
            }
            self.consume_raw_word(&name);
            name
        };
        self.skip_optional_semicolon();

        let mut words = None;
        if self.is_at_reserved_word("in")? {
            self.consume_keyword("in")?;
            self.skip_whitespace();
            let saw_delimiter = matches!(self.peek(), Some(';' | '\n'));
            if self.peek() == Some(';') {
                self.advance();
            }
            self.skip_whitespace_and_newlines();
            let mut list = Vec::new();
            loop {
                self.skip_whitespace();
                if self.at_end() {
                    break;
                }
                if let Some(c @ (';' | '\n')) = self.peek() {
                    if c == ';' {
                        self.advance();
                    }
                    break;
                }
                if self.is_at_reserved_word("do")? {
                    if saw_delimiter {
                        break;
                    }
                    return Err(self.token_error("Expected ';' or newline before 'do'"));
                }
                match self.parse_word(false, false, false)? {
                    Some(word) => list.push(word),
                    None => break,
                }
            }
            words = Some(list);
        }

        self.skip_whitespace_and_newlines();
        if self.peek() == Some('{') {
            let Some(Node::BraceGroup { body, .. }) = self.parse_brace_group()? else {
                return Err(self.token_error("Expected brace group in for loop"));
            };
            let redirects = self.collect_redirects()?;
            return Ok(Some(Node::For { var, words, body, redirects }));
        }
        if !self.consume_keyword("do")? {
            return Err(self.token_error("Expected 'do' in for loop"));
        }
        let body = self.require_list_until(&["done"], "Expected commands after 'do'")?;
        self.expect_keyword("done", "Expected 'done' to close for loop")?;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::For {
            var,
            words,
            body: Box::new(body),
            redirects,
        }))
    }

    fn skip_optional_semicolon(&mut self) {
        self.skip_whitespace();
        if self.peek() == Some(';') {
            self.advance();
        }
        self.skip_whitespace_and_newlines();
    }

    // Cursor on `((` after `for`.
    fn parse_for_arith(&mut self) -> ParseResult<Node> {
        self.pos += 2;
        let mut parts: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut paren_depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '(' => paren_depth += 1,
                ')' if paren_depth > 0 => paren_depth -= 1,
                ')' if self.peek_at(1) == Some(')') => {
                    parts.push(current.trim_start_matches([' ', '\t']).to_string());
                    self.pos += 2;
                    break;
                }
                ';' if paren_depth == 0 => {
                    parts.push(current.trim_start_matches([' ', '\t']).to_string());
                    current.clear();
                    self.advance();
                    continue;
                }
                _ => {}
            }
            self.consume_into(&mut current);
        }
        let [init, cond, incr]: [String; 3] = parts
            .try_into()
            .map_err(|_| self.error("Expected three expressions in for ((;;))", self.pos))?;
        self.skip_optional_semicolon();
        let body = self.parse_loop_body("for loop")?;
        let redirects = self.collect_redirects()?;
        Ok(Node::ForArith {
            init,
            cond,
            incr,
            body: Box::new(body),
            redirects,
        })
    }

    /// `{ ...; }` or `do ...; done`. A brace group body is unwrapped.
    fn parse_loop_body(&mut self, context: &str) -> ParseResult<Node> {
        if self.peek() == Some('{') {
            return match self.parse_brace_group()? {
                Some(Node::BraceGroup { body, .. }) => Ok(*body),
                _ => Err(self.token_error(format!("Expected brace group body in {}", context))),
            };
        }
        if self.consume_keyword("do")? {
            let body = self.require_list_until(&["done"], "Expected commands after 'do'")?;
            self.expect_keyword("done", &format!("Expected 'done' to close {}", context))?;
            return Ok(body);
        }
        Err(self.token_error(format!("Expected 'do' or '{{' in {}", context)))
    }

    pub(crate) fn parse_select(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.consume_keyword("select")? {
            return Ok(None);
        }
        self.skip_whitespace();
        let var = self.peek_raw_word();
        if var.is_empty() {
            return Err(self.token_error("Expected variable name after 'select'"));
        }
        self.consume_raw_word(&var);
        self.skip_optional_semicolon();

        let mut words = None;
        if self.is_at_reserved_word("in")? {
            self.consume_keyword("in")?;
            self.skip_whitespace_and_newlines();
            let mut list = Vec::new();
            loop {
                self.skip_whitespace();
                match self.peek() {
                    None => break,
                    Some(';') => {
                        self.advance();
                        break;
                    }
                    Some('\n' | '{') => break,
                    _ => {}
                }
                if self.is_at_reserved_word("do")? {
                    break;
                }
                match self.parse_word(false, false, false)? {
                    Some(word) => list.push(word),
                    None => break,
                }
            }
            words = Some(list);
        }

        self.skip_whitespace_and_newlines();
        let body = self.parse_loop_body("select")?;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::Select {
            var,
            words,
            body: Box::new(body),
            redirects,
        }))
    }

    // =========================================================================
    // CASE
    // =========================================================================

    pub(crate) fn parse_case(&mut self) -> ParseResult<Option<Node>> {
        if !self.consume_raw_word("case") {
            return Ok(None);
        }
        self.state.case_stmt = true;
        let result = self.parse_case_body();
        self.state.case_pattern = false;
        self.state.case_stmt = false;
        let (word, patterns) = result?;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::Case { word, patterns, redirects }))
    }

    fn parse_case_body(&mut self) -> ParseResult<(Word, Vec<CasePattern>)> {
        self.skip_whitespace();
        let Some(word) = self.parse_word(false, false, false)? else {
            return Err(self.token_error("Expected word after 'case'"));
        };
        self.skip_whitespace_and_newlines();
        if !self.consume_keyword("in")? {
            return Err(self.token_error("Expected 'in' after case word"));
        }
        self.skip_whitespace_and_newlines();

        let mut patterns = Vec::new();
        self.state.case_pattern = true;
        loop {
            self.skip_whitespace_and_newlines();
            if self.is_at_reserved_word("esac")? && !self.esac_is_pattern() {
                break;
            }
            self.skip_whitespace_and_newlines();
            if self.peek() == Some('(') {
                self.advance();
                self.skip_whitespace_and_newlines();
            }
            let pattern = self.read_case_pattern();
            if pattern.is_empty() {
                return Err(self.token_error("Expected pattern in case statement"));
            }
            self.skip_whitespace();
            let mut body = None;
            if self.peek_case_terminator()?.is_none() {
                self.skip_whitespace_and_newlines();
                if !self.at_end()
                    && !self.is_at_reserved_word("esac")?
                    && self.peek_case_terminator()?.is_none()
                {
                    body = self.parse_list_until(&["esac"])?;
                    self.skip_whitespace();
                }
            }
            let terminator = match self.peek_case_terminator()? {
                Some(term) => {
                    self.next_token()?;
                    term
                }
                None => ";;",
            };
            self.skip_whitespace_and_newlines();
            debug!("case pattern {:?} terminated by {}", pattern, terminator);
            patterns.push(CasePattern {
                pattern,
                body: body.map(Box::new),
                terminator: terminator.to_string(),
            });
        }
        self.state.case_pattern = false;
        self.skip_whitespace_and_newlines();
        if !self.consume_keyword("esac")? {
            return Err(self.token_error("Expected 'esac' to close case statement"));
        }
        Ok((word, patterns))
    }

    // `esac)` followed by a command or terminator is a pattern named esac.
    fn esac_is_pattern(&mut self) -> bool {
        let saved = self.pos;
        self.skip_whitespace();
        while self.peek().map_or(false, |c| !is_metachar(c) && !is_quote(c)) {
            self.advance();
        }
        self.skip_whitespace();
        let mut is_pattern = false;
        if self.peek() == Some(')') && self.eof_token != Some(')') {
            self.advance();
            self.skip_whitespace();
            is_pattern = matches!(self.peek(), Some(c) if c == ';' || (c != '\n' && c != ')'));
        }
        self.pos = saved;
        is_pattern
    }

    /// Raw text of one case pattern up to its closing `)`. Unquoted blanks
    /// outside extglob groups are dropped.
    fn read_case_pattern(&mut self) -> String {
        let mut pattern = String::new();
        let mut extglob_depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                ')' if extglob_depth > 0 => {
                    self.consume_into(&mut pattern);
                    extglob_depth -= 1;
                }
                ')' => {
                    self.advance();
                    break;
                }
                '\\' if self.peek_at(1) == Some('\n') => self.pos += 2,
                '\\' => {
                    self.consume_into(&mut pattern);
                    if !self.at_end() {
                        self.consume_into(&mut pattern);
                    }
                }
                _ if is_expansion_start(&self.src, self.pos, "$(") => {
                    self.consume_into(&mut pattern);
                    self.consume_into(&mut pattern);
                    if self.peek() == Some('(') {
                        self.consume_into(&mut pattern);
                        let mut depth = 2usize;
                        while let Some(c) = self.peek() {
                            if depth == 0 {
                                break;
                            }
                            if c == '(' {
                                depth += 1;
                            } else if c == ')' {
                                depth -= 1;
                            }
                            self.consume_into(&mut pattern);
                        }
                    } else {
                        extglob_depth += 1;
                    }
                }
                '(' if extglob_depth > 0 => {
                    self.consume_into(&mut pattern);
                    extglob_depth += 1;
                }
                c if self.options.extglob && is_extglob_prefix(c) && self.peek_at(1) == Some('(') => {
                    self.consume_into(&mut pattern);
                    self.consume_into(&mut pattern);
                    extglob_depth += 1;
                }
                '[' => self.read_case_bracket(&mut pattern),
                '\'' => {
                    self.consume_into(&mut pattern);
                    while self.peek().map_or(false, |c| c != '\'') {
                        self.consume_into(&mut pattern);
                    }
                    if !self.at_end() {
                        self.consume_into(&mut pattern);
                    }
                }
                '"' => {
                    self.consume_into(&mut pattern);
                    while self.peek().map_or(false, |c| c != '"') {
                        if self.peek() == Some('\\') && self.peek_at(1).is_some() {
                            self.consume_into(&mut pattern);
                        }
                        self.consume_into(&mut pattern);
                    }
                    if !self.at_end() {
                        self.consume_into(&mut pattern);
                    }
                }
                c if is_whitespace(c) => {
                    if extglob_depth > 0 {
                        self.consume_into(&mut pattern);
                    } else {
                        self.advance();
                    }
                }
                _ => self.consume_into(&mut pattern),
            }
        }
        pattern
    }

    // A `[` starts a bracket class only if a `]` closes it before the
    // pattern's `)` or `|`.
    fn read_case_bracket(&mut self, pattern: &mut String) {
        let is_negation = |c: Option<char>| matches!(c, Some('^' | '!'));
        let mut scan = self.pos + 1;
        let mut has_first_bracket_literal = false;
        if is_negation(self.char_at(scan)) {
            scan += 1;
        }
        if self.char_at(scan) == Some(']') && self.src.contains(&']') {
            scan += 1;
            has_first_bracket_literal = true;
        }
        let mut depth = 0usize;
        let mut is_class = false;
        while let Some(sc) = self.char_at(scan) {
            match sc {
                ']' if depth == 0 => {
                    is_class = true;
                    break;
                }
                '[' => depth += 1,
                ')' | '|' if depth == 0 => break,
                _ => {}
            }
            scan += 1;
        }
        self.consume_into(pattern);
        if !is_class {
            return;
        }
        if is_negation(self.peek()) {
            self.consume_into(pattern);
        }
        if has_first_bracket_literal && self.peek() == Some(']') {
            self.consume_into(pattern);
        }
        while self.peek().map_or(false, |c| c != ']') {
            self.consume_into(pattern);
        }
        if !self.at_end() {
            self.consume_into(pattern);
        }
    }

    // =========================================================================
    // COPROC AND FUNCTIONS
    // =========================================================================

    pub(crate) fn parse_coproc(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.consume_keyword("coproc")? {
            return Ok(None);
        }
        self.skip_whitespace();
        if let Some(body) = self.parse_coproc_compound()? {
            return Ok(Some(coproc(body, None)));
        }

        let word_start = self.pos;
        let potential_name = self.peek_raw_word();
        if !potential_name.is_empty() {
            while self.peek().map_or(false, |c| !is_metachar(c) && !is_quote(c)) {
                self.advance();
            }
            self.skip_whitespace();
            if is_valid_identifier(&potential_name) {
                if let Some(body) = self.parse_coproc_compound()? {
                    return Ok(Some(coproc(body, Some(potential_name))));
                }
            }
            self.pos = word_start;
        }
        match self.parse_command()? {
            Some(body) => Ok(Some(coproc(body, None))),
            None => Err(self.error("Expected command after coproc", self.pos)),
        }
    }

    // Brace group, `((`, subshell, or a compound keyword.
    fn parse_coproc_compound(&mut self) -> ParseResult<Option<Node>> {
        match self.peek() {
            Some('{') => {
                if let Some(body) = self.parse_brace_group()? {
                    return Ok(Some(body));
                }
            }
            Some('(') => {
                if self.peek_at(1) == Some('(') {
                    if let Some(body) = self.parse_arithmetic_command()? {
                        return Ok(Some(body));
                    }
                }
                return self.parse_subshell();
            }
            _ => {}
        }
        match self.peek_reserved_word()? {
            Some(word) if COMPOUND_KEYWORDS.contains(word.as_str()) => self.parse_compound_command(),
            _ => Ok(None),
        }
    }

    /// `function name [()] body` or `name () body`. Returns `None` with the
    /// cursor unchanged when no definition starts here.
    pub(crate) fn parse_function(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if self.at_end() {
            return Ok(None);
        }
        let saved_pos = self.pos;
        if self.is_at_reserved_word("function")? {
            self.consume_keyword("function")?;
            self.skip_whitespace();
            let name = self.peek_raw_word();
            if name.is_empty() {
                self.pos = saved_pos;
                return Ok(None);
            }
            self.consume_raw_word(&name);
            self.skip_whitespace();
            if self.starts_with("()") {
                self.pos += 2;
            }
            return self.parse_function_definition_body(name).map(Some);
        }

        let name = self.peek_raw_word();
        if name.is_empty() || RESERVED_WORDS.contains(name.as_str()) || looks_like_assignment(&name) {
            return Ok(None);
        }
        self.skip_whitespace();
        let name_start = self.pos;
        while self
            .peek()
            .map_or(false, |c| !is_metachar(c) && !is_quote(c) && c != '(' && c != ')')
        {
            self.advance();
        }
        let name = self.slice(name_start, self.pos);
        if name.is_empty() || has_unclosed_brace_expansion(&name) {
            self.pos = saved_pos;
            return Ok(None);
        }
        let after_name = self.pos;
        self.skip_whitespace();
        let has_whitespace = self.pos > after_name;
        let glob_ending = name.chars().last().map_or(false, |c| GLOB_NAME_ENDINGS.contains(c));
        if !has_whitespace && glob_ending {
            self.pos = saved_pos;
            return Ok(None);
        }
        if self.peek() != Some('(') {
            self.pos = saved_pos;
            return Ok(None);
        }
        self.advance();
        self.skip_whitespace();
        if self.peek() != Some(')') {
            self.pos = saved_pos;
            return Ok(None);
        }
        self.advance();
        self.parse_function_definition_body(name).map(Some)
    }

    fn parse_function_definition_body(&mut self, name: String) -> ParseResult<Node> {
        self.skip_whitespace_and_newlines();
        match self.parse_function_body()? {
            Some(body) => Ok(Node::Function {
                name,
                body: Box::new(body),
            }),
            None => Err(self.error("Expected function body", self.pos)),
        }
    }

    /// Any compound command, tried in a fixed order.
    fn parse_function_body(&mut self) -> ParseResult<Option<Node>> {
        if let Some(node) = self.parse_brace_group()? {
            return Ok(Some(node));
        }
        if self.starts_with("((") {
            if let Some(node) = self.parse_arithmetic_command()? {
                return Ok(Some(node));
            }
        }
        if let Some(node) = self.parse_subshell()? {
            return Ok(Some(node));
        }
        if let Some(node) = self.parse_conditional_expr()? {
            return Ok(Some(node));
        }
        let keyword_parsers: [fn(&mut Self) -> ParseResult<Option<Node>>; 6] = [
            Self::parse_if,
            Self::parse_while,
            Self::parse_until,
            Self::parse_for,
            Self::parse_case,
            Self::parse_select,
        ];
        for parse in keyword_parsers {
            if let Some(node) = parse(self)? {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Parse one command: a compound command, a function definition, or a
    /// simple command.
    pub(crate) fn parse_compound_command(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        let Some(ch) = self.peek() else {
            return Ok(None);
        };
        if self.starts_with("((") {
            if let Some(node) = self.parse_arithmetic_command()? {
                return Ok(Some(node));
            }
        }
        if ch == '(' {
            return self.parse_subshell();
        }
        if ch == '{' {
            if let Some(node) = self.parse_brace_group()? {
                return Ok(Some(node));
            }
        }
        if self.starts_with("[[") {
            if let Some(node) = self.parse_conditional_expr()? {
                return Ok(Some(node));
            }
        }

        let mut reserved = self.peek_reserved_word()?;
        if reserved.is_none() && self.in_process_sub {
            let word = self.peek_raw_word();
            if let Some(keyword) = word.strip_prefix('}').filter(|k| !k.is_empty()) {
                if RESERVED_WORDS.contains(keyword) || ["{", "}", "[[", "]]", "!", "time"].contains(&keyword) {
                    reserved = Some(keyword.to_string());
                }
            }
        }
        match reserved.as_deref() {
            Some(word) if CONTINUATION_WORDS.contains(&word) => {
                Err(self.token_error(format!("Unexpected reserved word '{}'", word)))
            }
            Some("if") => self.parse_if(),
            Some("while") => self.parse_while(),
            Some("until") => self.parse_until(),
            Some("for") => self.parse_for(),
            Some("select") => self.parse_select(),
            Some("case") => self.parse_case(),
            Some("function") => self.parse_function(),
            Some("coproc") => self.parse_coproc(),
            _ => match self.parse_function()? {
                Some(function) => Ok(Some(function)),
                None => self.parse_command(),
            },
        }
    }
}

fn coproc(command: Node, name: Option<String>) -> Node {
    Node::Coproc {
        command: Box::new(command),
        name,
    }
}

// `${` opened in a would-be function name and never closed.
fn has_unclosed_brace_expansion(name: &str) -> bool {
    let chars: Vec<char> = name.chars().collect();
    let mut depth: isize = 0;
    let mut i = 0;
    while i < chars.len() {
        if is_expansion_start(&chars, i, "${") {
            depth += 1;
            i += 2;
            continue;
        }
        if chars[i] == '}' {
            depth -= 1;
        }
        i += 1;
    }
    depth > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::ParserOptions;

    fn compound(input: &str) -> Node {
        let mut parser = Parser::new(input, ParserOptions::default());
        parser.parse_compound_command().unwrap().unwrap()
    }

    fn compound_err(input: &str) -> String {
        let mut parser = Parser::new(input, ParserOptions::default());
        parser.parse_compound_command().unwrap_err().message().to_string()
    }

    #[test]
    fn test_parse_subshell_and_brace_group() {
        assert_eq!(compound("(echo hi)").kind(), "subshell");
        let Node::BraceGroup { redirects, .. } = compound("{ echo hi; } >out") else {
            panic!("Expected brace group");
        };
        assert_eq!(redirects.len(), 1);
        assert!(compound_err("(echo hi").contains("Expected ) to close subshell"));
    }

    #[test]
    fn test_parse_arithmetic_command() {
        let Node::ArithmeticCommand { raw_content, expression, .. } = compound("(( x = 1 + 2 ))") else {
            panic!("Expected arithmetic command");
        };
        assert_eq!(raw_content, " x = 1 + 2 ");
        assert_eq!(expression.map(|e| e.kind()), Some("assign"));
        // Two nested subshells, not arithmetic
        assert_eq!(compound("((a); (b))").kind(), "subshell");
    }

    #[test]
    fn test_parse_if_elif_else() {
        let Node::If { else_body, .. } = compound("if a; then b; elif c; then d; else e; fi") else {
            panic!("Expected if");
        };
        let Some(elif) = else_body else {
            panic!("Expected elif branch");
        };
        let Node::If { else_body, redirects, .. } = *elif else {
            panic!("Expected nested if");
        };
        assert!(redirects.is_empty());
        assert!(else_body.is_some());
        assert!(compound_err("if a; then b;").contains("Expected 'fi' to close if statement"));
    }

    #[test]
    fn test_parse_loops() {
        assert_eq!(compound("while true; do x; done").kind(), "while");
        assert_eq!(compound("until false\ndo x\ndone").kind(), "until");
        let Node::For { var, words, .. } = compound("for i in 1 2 3; do echo $i; done") else {
            panic!("Expected for");
        };
        assert_eq!(var, "i");
        assert_eq!(words.map(|w| w.len()), Some(3));
        let Node::For { words, .. } = compound("for x; do y; done") else {
            panic!("Expected for");
        };
        assert!(words.is_none());
        assert!(compound_err("for i in a do b; done").contains("Expected ';' or newline before 'do'"));
    }

    #[test]
    fn test_parse_for_arith() {
        let Node::ForArith { init, cond, incr, .. } = compound("for ((i=0; i<3; i++)); do x; done") else {
            panic!("Expected for-arith");
        };
        assert_eq!((init.as_str(), cond.as_str(), incr.as_str()), ("i=0", "i<3", "i++"));
        let Node::ForArith { body, .. } = compound("for ((;;)) { x; }") else {
            panic!("Expected for-arith");
        };
        assert_eq!(body.kind(), "list");
        assert!(compound_err("for ((i=0; i<3)); do x; done").contains("Expected three expressions"));
    }

    #[test]
    fn test_parse_select() {
        let Node::Select { var, words, .. } = compound("select opt in a b\ndo echo $opt; done") else {
            panic!("Expected select");
        };
        assert_eq!(var, "opt");
        assert_eq!(words.map(|w| w.len()), Some(2));
    }

    #[test]
    fn test_parse_case() {
        let Node::Case { word, patterns, .. } = compound("case $x in a|b) echo ab;; *) ;& esac") else {
            panic!("Expected case");
        };
        assert_eq!(word.value, "$x");
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].pattern, "a|b");
        assert_eq!(patterns[0].terminator, ";;");
        assert!(patterns[1].body.is_none());
        assert_eq!(patterns[1].terminator, ";&");
        assert!(compound_err("case x in a) b;;").contains("Expected pattern in case statement"));
    }

    #[test]
    fn test_case_pattern_bracket_and_extglob() {
        let mut parser = Parser::new("case x in []a]) y;; @(a|b)) z;; esac", ParserOptions { extglob: true });
        let Some(Node::Case { patterns, .. }) = parser.parse_compound_command().unwrap() else {
            panic!("Expected case");
        };
        assert_eq!(patterns[0].pattern, "[]a]");
        assert_eq!(patterns[1].pattern, "@(a|b)");
    }

    #[test]
    fn test_parse_functions() {
        let Node::Function { name, body } = compound("function greet { echo hi; }") else {
            panic!("Expected function");
        };
        assert_eq!(name, "greet");
        assert_eq!(body.kind(), "brace-group");
        let Node::Function { name, .. } = compound("f() (echo sub)") else {
            panic!("Expected function");
        };
        assert_eq!(name, "f");
        assert!(compound_err("f() echo").contains("Expected function body"));
    }

    #[test]
    fn test_parse_coproc() {
        let Node::Coproc { name, command } = compound("coproc worker { cat; }") else {
            panic!("Expected coproc");
        };
        assert_eq!(name.as_deref(), Some("worker"));
        assert_eq!(command.kind(), "brace-group");
        let Node::Coproc { name, command } = compound("coproc cat file") else {
            panic!("Expected coproc");
        };
        assert!(name.is_none());
        assert_eq!(command.kind(), "command");
    }

    #[test]
    fn test_unexpected_reserved_word() {
        assert!(compound_err("done").contains("Unexpected reserved word 'done'"));
    }

    #[test]
    fn test_unclosed_brace_expansion_in_name() {
        assert!(has_unclosed_brace_expansion("a${b"));
        assert!(!has_unclosed_brace_expansion("a${b}"));
    }
}
