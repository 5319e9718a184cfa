//! Incremental parser for streamed plan completions.
//!
//! A completion looks like `<think>reasoning</think>{...json...}`, with the
//! reasoning segment optional. The parser is fed tokens as they arrive,
//! hands back reasoning text for live display, and collects the JSON object.
//!
//! Text is processed one character at a time, so splitting the same input
//! into different chunks always yields the same reasoning and JSON.

use crate::query::prompts::{THINK_CLOSE, THINK_OPEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Nothing meaningful seen yet
    Start,
    /// Inside the reasoning tags
    Thinking,
    /// Reasoning done (or absent), waiting for `{`
    AwaitingJson,
    /// Collecting the JSON object
    ParsingJson,
    /// JSON object closed; further input is ignored
    Complete,
}

#[derive(Debug, Clone)]
pub struct StreamParser {
    state: ParseState,

    /// Candidate opening tag while in `Start`
    opening: String,

    /// Held-back text that may be the start of the closing tag
    pending: String,

    thinking: String,
    json: String,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::Start,
            opening: String::new(),
            pending: String::new(),
            thinking: String::new(),
            json: String::new(),
            depth: 0,
            in_string: false,
            escaped: false,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Feed one token. Returns the reasoning text released by this token
    /// and whether the JSON object is complete.
    pub fn feed(&mut self, token: &str) -> (String, bool) {
        let mut released = String::new();

        for ch in token.chars() {
            match self.state {
                ParseState::Start => self.feed_start(ch),
                ParseState::Thinking => self.feed_thinking(ch, &mut released),
                ParseState::AwaitingJson => {
                    if ch == '{' {
                        self.begin_json();
                    }
                }
                ParseState::ParsingJson => self.feed_json(ch),
                ParseState::Complete => break,
            }
        }

        self.thinking.push_str(&released);
        (released, self.state == ParseState::Complete)
    }

    /// Collected JSON text. Only a full object once `is_complete()`.
    pub fn json(&self) -> &str {
        &self.json
    }

    /// All reasoning text released so far.
    pub fn thinking(&self) -> &str {
        &self.thinking
    }

    pub fn is_complete(&self) -> bool {
        self.state == ParseState::Complete
    }

    fn feed_start(&mut self, ch: char) {
        if ch == '{' {
            self.opening.clear();
            self.begin_json();
            return;
        }
        if self.opening.is_empty() && ch.is_whitespace() {
            return;
        }

        // A short preamble may precede the tag; give up only once the buffer
        // is longer than the tag and no suffix of it can still open one.
        self.opening.push(ch);
        if self.opening.ends_with(THINK_OPEN) {
            self.opening.clear();
            self.state = ParseState::Thinking;
        } else if self.opening.chars().count() > THINK_OPEN.chars().count()
            && longest_tag_prefix_suffix(&self.opening, THINK_OPEN) == 0
        {
            self.opening.clear();
            self.state = ParseState::AwaitingJson;
        }
    }

    fn feed_thinking(&mut self, ch: char, released: &mut String) {
        self.pending.push(ch);

        if self.pending == THINK_CLOSE {
            self.pending.clear();
            self.state = ParseState::AwaitingJson;
            return;
        }
        if THINK_CLOSE.starts_with(self.pending.as_str()) {
            return;
        }

        // Release everything except the longest suffix that could still open the tag.
        let keep = longest_tag_prefix_suffix(&self.pending, THINK_CLOSE);
        let split = self.pending.len() - keep;
        released.push_str(&self.pending[..split]);
        self.pending.replace_range(..split, "");
    }

    fn begin_json(&mut self) {
        self.json.push('{');
        self.depth = 1;
        self.state = ParseState::ParsingJson;
    }

    fn feed_json(&mut self, ch: char) {
        self.json.push(ch);

        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return;
        }

        match ch {
            '"' => self.in_string = true,
            '{' => self.depth += 1,
            '}' => {
                self.depth -= 1;
                if self.depth == 0 {
                    self.state = ParseState::Complete;
                }
            }
            _ => {}
        }
    }
}

/// Byte length of the longest proper suffix of `text` that is a prefix of `tag`.
fn longest_tag_prefix_suffix(text: &str, tag: &str) -> usize {
    text.char_indices()
        .skip(1)
        .map(|(i, _)| &text[i..])
        .find(|suffix| tag.starts_with(suffix))
        .map(str::len)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "<think>abc</think>{\"a\":1}";

    fn feed_chunks(chunks: &[&str]) -> (String, String, bool) {
        let mut parser = StreamParser::new();
        let mut reasoning = String::new();
        let mut complete = false;
        for chunk in chunks {
            let (text, done) = parser.feed(chunk);
            reasoning.push_str(&text);
            complete = done;
        }
        (reasoning, parser.json().to_string(), complete)
    }

    #[test]
    fn test_single_characters() {
        let chars: Vec<String> = SAMPLE.chars().map(String::from).collect();
        let chunks: Vec<&str> = chars.iter().map(String::as_str).collect();

        let (reasoning, json, complete) = feed_chunks(&chunks);
        assert_eq!(reasoning, "abc");
        assert_eq!(json, "{\"a\":1}");
        assert!(complete);
    }

    #[test]
    fn test_whole_input_at_once() {
        let (reasoning, json, complete) = feed_chunks(&[SAMPLE]);
        assert_eq!(reasoning, "abc");
        assert_eq!(json, "{\"a\":1}");
        assert!(complete);
    }

    #[test]
    fn test_json_without_reasoning() {
        let (reasoning, json, complete) = feed_chunks(&["  {\"a\":", "{\"b\":2}}", " trailing"]);
        assert_eq!(reasoning, "");
        assert_eq!(json, "{\"a\":{\"b\":2}}");
        assert!(complete);
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let (_, json, complete) = feed_chunks(&["{\"q\":\"a}b{\\\"\"}"]);
        assert_eq!(json, "{\"q\":\"a}b{\\\"\"}");
        assert!(complete);
    }

    #[test]
    fn test_reasoning_with_angle_brackets() {
        let (reasoning, _, complete) = feed_chunks(&["<think>a</b><", "/thin", "k>{}"]);
        assert_eq!(reasoning, "a</b>");
        assert!(complete);
    }

    #[test]
    fn test_prose_before_json() {
        let (reasoning, json, complete) = feed_chunks(&["Sure, here it is: {\"x\":true}"]);
        assert_eq!(reasoning, "");
        assert_eq!(json, "{\"x\":true}");
        assert!(complete);
    }

    #[test]
    fn test_short_preamble_before_reasoning() {
        let (reasoning, json, complete) = feed_chunks(&["好的<think>abc</think>{\"a\":1}"]);
        assert_eq!(reasoning, "abc");
        assert_eq!(json, "{\"a\":1}");
        assert!(complete);

        let (reasoning, _, complete) = feed_chunks(&["好", "的<th", "ink>a", "bc</think>{}"]);
        assert_eq!(reasoning, "abc");
        assert!(complete);
    }

    #[test]
    fn test_long_prose_without_tag_awaits_json() {
        let mut parser = StreamParser::new();
        parser.feed("Here is the plan you asked for");
        assert_eq!(parser.state(), ParseState::AwaitingJson);

        let (reasoning, complete) = parser.feed(" <think>x</think>{\"b\":2}");
        assert!(reasoning.is_empty());
        assert!(complete);
        assert_eq!(parser.json(), "{\"b\":2}");
    }

    #[test]
    fn test_missing_closing_tag_never_completes() {
        let mut parser = StreamParser::new();
        let (_, complete) = parser.feed("<think>still thinking {\"a\":1}");
        assert!(!complete);
        assert_eq!(parser.state(), ParseState::Thinking);
        assert!(parser.json().is_empty());
    }

    #[test]
    fn test_input_after_completion_is_ignored() {
        let mut parser = StreamParser::new();
        parser.feed("{}");
        let (text, complete) = parser.feed("<think>late</think>{\"b\":1}");
        assert!(text.is_empty());
        assert!(complete);
        assert_eq!(parser.json(), "{}");
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_output(
            reasoning in "[a-z<>/ 思考]{0,20}",
            cuts in proptest::collection::vec(0usize..64, 0..8),
        ) {
            // Reasoning must not contain the closing tag itself.
            prop_assume!(!reasoning.contains(THINK_CLOSE));
            let input = format!("<think>{reasoning}</think>{{\"k\":\"v\"}}");

            let chars: Vec<char> = input.chars().collect();
            let mut bounds: Vec<usize> = cuts.into_iter().map(|c| c % (chars.len() + 1)).collect();
            bounds.push(0);
            bounds.push(chars.len());
            bounds.sort_unstable();
            bounds.dedup();

            let chunks: Vec<String> = bounds
                .windows(2)
                .map(|w| chars[w[0]..w[1]].iter().collect())
                .collect();
            let chunk_refs: Vec<&str> = chunks.iter().map(String::as_str).collect();

            let (text, json, complete) = feed_chunks(&chunk_refs);
            let (whole_text, whole_json, _) = feed_chunks(&[input.as_str()]);

            prop_assert!(complete);
            prop_assert_eq!(&text, &whole_text);
            prop_assert_eq!(json, whole_json);
            prop_assert_eq!(text, reasoning);
        }
    }
}
