//! Quote and context tracking
//!
//! `QuoteState` tracks single/double quoting with a LIFO stack so a nested
//! region such as `${...}` can start unquoted and hand the outer state back
//! on exit. `ContextStack` gives every nested command list its own quote
//! state, and can be deep-copied for backtracking.

use crate::parser::parser::PendingHeredoc;
use crate::parser::types::{DolbraceState, ParserState};

/// Single/double quote flags with a save stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteState {
    pub single: bool,
    pub double: bool,
    stack: Vec<(bool, bool)>,
}

impl QuoteState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save the current flags and start an unquoted region.
    pub fn push(&mut self) {
        self.stack.push((self.single, self.double));
        self.single = false;
        self.double = false;
    }

    /// Restore the flags saved by the matching `push`. No-op when nothing is saved.
    pub fn pop(&mut self) {
        if let Some((single, double)) = self.stack.pop() {
            self.single = single;
            self.double = double;
        }
    }

    pub fn in_quotes(&self) -> bool {
        self.single || self.double
    }
}

/// One nesting level: the top level, or the body of `$(...)`, `${ ...; }`
/// or a process substitution. A command list nested in a double-quoted word
/// starts unquoted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseContext {
    pub quote: QuoteState,
}

/// Non-empty stack of parse contexts. The root context is never removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStack {
    stack: Vec<ParseContext>,
}

impl Default for ContextStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStack {
    pub fn new() -> Self {
        Self {
            stack: vec![ParseContext::default()],
        }
    }

    pub fn current(&self) -> &ParseContext {
        // The stack always holds the root context.
        &self.stack[self.stack.len() - 1]
    }

    pub fn current_mut(&mut self) -> &mut ParseContext {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    /// Enter a nested command list. Leaving it is a `restore_from`.
    pub fn push(&mut self) {
        self.stack.push(ParseContext::default());
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Deep copy of every level, for restoring after a failed speculative parse.
    pub fn copy_stack(&self) -> Vec<ParseContext> {
        self.stack.clone()
    }

    pub fn restore_from(&mut self, saved: &[ParseContext]) {
        if saved.is_empty() {
            self.stack = vec![ParseContext::default()];
        } else {
            self.stack = saved.to_vec();
        }
    }
}

/// Snapshot taken before a speculative sub-parse.
#[derive(Debug, Clone)]
pub(crate) struct SavedParserState {
    pub(crate) parser_state: ParserState,
    pub(crate) dolbrace_state: DolbraceState,
    pub(crate) pending_heredocs: Vec<PendingHeredoc>,
    pub(crate) ctx_stack: Vec<ParseContext>,
    pub(crate) eof_token: Option<char>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_push_pop() {
        let mut q = QuoteState::new();
        q.double = true;
        q.push();
        assert!(!q.in_quotes());
        q.single = true;
        q.pop();
        assert!(q.double);
        assert!(!q.single);
        q.pop();
        assert!(q.double);
    }

    #[test]
    fn test_context_stack_keeps_root() {
        let mut stack = ContextStack::new();
        stack.restore_from(&[]);
        assert_eq!(stack.depth(), 1);
        stack.current_mut().quote.double = true;
        stack.push();
        assert_eq!(stack.depth(), 2);
        assert!(!stack.current().quote.in_quotes());
    }

    #[test]
    fn test_restore_is_deep_copy() {
        let mut stack = ContextStack::new();
        stack.current_mut().quote.push();
        stack.current_mut().quote.double = true;
        let outer = stack.copy_stack();
        stack.push();
        let saved = stack.copy_stack();
        stack.current_mut().quote.single = true;
        stack.push();
        stack.restore_from(&saved);
        assert_eq!(stack.depth(), 2);
        assert!(!stack.current().quote.in_quotes());
        stack.restore_from(&outer);
        let quote = &mut stack.current_mut().quote;
        assert!(quote.double);
        quote.pop();
        assert!(!quote.in_quotes());
    }
}
