//! Top-level JSON fragment boundary detection
//!
//! [`FragmentScanner`] finds where each complete top-level JSON object or
//! array ends in a byte buffer that is filled incrementally. It does not parse
//! values. It tracks brace depth, bracket depth and string state, so
//! a complete value can be cut out and handed to `serde_json` on its own.
//!
//! The scanner keeps its state between calls. Bytes are never rescanned, and a
//! chunk boundary that lands inside a string literal or straight after a
//! backslash has no effect on the result.
//!
//! Positions are offsets into the caller's buffer. When the caller drops
//! consumed bytes from the front of the buffer it must call
//! [`FragmentScanner::rebase`] with the number of bytes removed.

use std::ops::Range;

/// One event produced by the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// A complete top-level value occupies this byte range
    Fragment(Range<usize>),
    /// A closing brace or bracket had no opener; the range up to it is unusable
    Malformed(Range<usize>),
    /// This many stray bytes sat between values and were skipped
    Junk(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between values, looking for `{` or `[`
    Idle,
    /// Inside a value that started at `start`
    InValue,
}

/// Resumable boundary scanner over an append-only buffer
#[derive(Debug, Clone)]
pub struct FragmentScanner {
    state: State,
    start: usize,
    pos: usize,
    brace_depth: i64,
    bracket_depth: i64,
    in_string: bool,
    escaped: bool,
    junk: usize,
}

impl FragmentScanner {
    /// Create a scanner positioned at the start of an empty buffer
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            start: 0,
            pos: 0,
            brace_depth: 0,
            bracket_depth: 0,
            in_string: false,
            escaped: false,
            junk: 0,
        }
    }

    /// Scan forward from where the previous call stopped
    ///
    /// Returns `None` once every byte of `buf` has been examined without
    /// completing another event. Call again after appending more data.
    pub fn next_event(&mut self, buf: &[u8]) -> Option<Scan> {
        while self.pos < buf.len() {
            let byte = buf[self.pos];

            if self.state == State::Idle {
                match byte {
                    b'{' | b'[' => {
                        if self.junk > 0 {
                            // Report the junk first; the opener is handled on the next call
                            return Some(Scan::Junk(std::mem::take(&mut self.junk)));
                        }
                        self.begin_value();
                    }
                    b' ' | b'\t' | b'\n' | b'\r' => {
                        if self.junk > 0 {
                            self.junk += 1;
                        }
                        self.pos += 1;
                        continue;
                    }
                    _ => {
                        self.junk += 1;
                        self.pos += 1;
                        continue;
                    }
                }
            }

            let at = self.pos;
            self.pos += 1;

            if self.escaped {
                self.escaped = false;
                continue;
            }
            if self.in_string {
                match byte {
                    b'\\' => self.escaped = true,
                    b'"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }

            let closed = match byte {
                b'"' => {
                    self.in_string = true;
                    false
                }
                b'{' => {
                    self.brace_depth += 1;
                    false
                }
                b'[' => {
                    self.bracket_depth += 1;
                    false
                }
                b'}' => {
                    self.brace_depth -= 1;
                    true
                }
                b']' => {
                    self.bracket_depth -= 1;
                    true
                }
                _ => false,
            };

            if self.brace_depth < 0 || self.bracket_depth < 0 {
                let range = self.start..at + 1;
                self.reset_idle();
                return Some(Scan::Malformed(range));
            }
            if closed && self.brace_depth == 0 && self.bracket_depth == 0 {
                let range = self.start..at + 1;
                self.reset_idle();
                return Some(Scan::Fragment(range));
            }
        }
        None
    }

    /// Offset before which every byte has been fully handled
    ///
    /// Bytes before this offset may be dropped from the buffer.
    pub fn consumed(&self) -> usize {
        match self.state {
            State::Idle => self.pos,
            State::InValue => self.start,
        }
    }

    /// Adjust positions after `n` bytes were removed from the buffer front
    pub fn rebase(&mut self, n: usize) {
        debug_assert!(n <= self.consumed());
        self.pos -= n;
        if self.state == State::InValue {
            self.start -= n;
        }
    }

    /// Whether a value has been opened but not yet closed
    pub fn is_mid_value(&self) -> bool {
        self.state == State::InValue
    }

    /// Stray bytes seen since the last reported value or junk run
    pub fn pending_junk(&self) -> usize {
        self.junk
    }

    fn begin_value(&mut self) {
        self.state = State::InValue;
        self.start = self.pos;
        self.brace_depth = 0;
        self.bracket_depth = 0;
        self.in_string = false;
        self.escaped = false;
    }

    fn reset_idle(&mut self) {
        self.state = State::Idle;
        self.brace_depth = 0;
        self.bracket_depth = 0;
        self.in_string = false;
        self.escaped = false;
    }
}

impl Default for FragmentScanner {
    fn default() -> Self {
        Self::new()
    }
}
