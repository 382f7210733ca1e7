//! Splitting an interactive input line into an argument vector.
//!
//! Supports single quotes (literal), double quotes (with `\"` and `\\` escapes)
//! and backslash escapes outside quotes.
use crate::error::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct WordSplitter {
    input: Vec<char>,
    pos: usize,
    state: SplitState,
    buffer: String,
    words: Vec<String>,
}

impl WordSplitter {
    fn new(line: &str) -> Self {
        WordSplitter {
            input: line.chars().collect(),
            pos: 0,
            state: SplitState::Start,
            buffer: String::new(),
            words: Vec::new(),
        }
    }

    fn split(mut self) -> Result<Vec<String>, CommandError> {
        while let Some(ch) = self.read_char() {
            match self.state {
                SplitState::Start => self.handle_start(ch)?,
                SplitState::ReadingWord => self.handle_word(ch)?,
                SplitState::ReadingSingleQuote => self.handle_single_quote(ch),
                SplitState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
            }
        }

        match self.state {
            SplitState::ReadingSingleQuote | SplitState::ReadingDoubleQuote => {
                Err(CommandError::invalid_arguments("Error: No closing quotation"))
            }
            SplitState::ReadingWord => {
                self.words.push(std::mem::take(&mut self.buffer));
                Ok(self.words)
            }
            SplitState::Start => Ok(self.words),
        }
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn read_escaped(&mut self) -> Result<char, CommandError> {
        self.read_char()
            .ok_or_else(|| CommandError::invalid_arguments("Error: No escaped character"))
    }

    fn handle_start(&mut self, ch: char) -> Result<(), CommandError> {
        match ch {
            c if c.is_whitespace() => {}
            '\'' => self.state = SplitState::ReadingSingleQuote,
            '"' => self.state = SplitState::ReadingDoubleQuote,
            '\\' => {
                let escaped = self.read_escaped()?;
                self.buffer.push(escaped);
                self.state = SplitState::ReadingWord;
            }
            c => {
                self.buffer.push(c);
                self.state = SplitState::ReadingWord;
            }
        }
        Ok(())
    }

    fn handle_word(&mut self, ch: char) -> Result<(), CommandError> {
        match ch {
            c if c.is_whitespace() => {
                self.words.push(std::mem::take(&mut self.buffer));
                self.state = SplitState::Start;
            }
            '\'' => self.state = SplitState::ReadingSingleQuote,
            '"' => self.state = SplitState::ReadingDoubleQuote,
            '\\' => {
                let escaped = self.read_escaped()?;
                self.buffer.push(escaped);
            }
            c => self.buffer.push(c),
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = SplitState::ReadingWord,
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<(), CommandError> {
        match ch {
            '"' => self.state = SplitState::ReadingWord,
            '\\' if matches!(self.input.get(self.pos), Some('"' | '\\')) => {
                let escaped = self.read_escaped()?;
                self.buffer.push(escaped);
            }
            c => self.buffer.push(c),
        }
        Ok(())
    }
}

/// Split `line` into words the way a POSIX shell would, without expansions.
///
/// An unterminated quote is a [`CommandError`].
pub fn split_words(line: &str) -> Result<Vec<String>, CommandError> {
    WordSplitter::new(line).split()
}
