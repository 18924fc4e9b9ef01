use std::io::{self, BufRead};
use thiserror::Error;
use crate::events::*;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("line {line}: unknown event `{word}`")]
    Unknown { line: usize, word: String },
    #[error("line {line}: `{event}` takes {expected} argument(s), got {got}")]
    Arity { line: usize, event: String, expected: usize, got: usize },
    #[error("line {line}: bad number `{text}`")]
    Number { line: usize, text: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reads events from a line-oriented script, one event per line:
///
/// ```text
/// # comment
/// malloc 64 0x7f0000001000
/// write 0x401000 0x7f0000001008 8
/// line 0x401000 main.c:12
/// free 0x7f0000001000
/// ```
///
/// Numbers may be decimal or `0x`-prefixed hexadecimal; `sbrk` deltas and
/// return codes may carry a sign.
pub struct Script<R: BufRead> {
    input:  R,
    line:   usize,
    buf:    String,
}

impl<R: BufRead> Script<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line:   0,
            buf:    String::new(),
        }
    }

    /// Number of the line read last.
    #[inline]
    pub fn line(&self) -> usize {
        self.line
    }
}

impl<R: BufRead> Iterator for Script<R> {
    type Item = Result<Event, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.input.read_line(&mut self.buf) {
                Ok(0)   => return None,
                Ok(_)   => {},
                Err(e)  => return Some(Err(e.into())),
            }
            self.line += 1;
            let text = match self.buf.find('#') {
                Some(i) => &self.buf[..i],
                None    => &self.buf[..],
            };
            let words: Vec<&str> = text.split_whitespace().collect();
            if !words.is_empty() {
                return Some(parse(self.line, &words));
            }
        }
    }
}

fn arity(line: usize, words: &[&str], expected: usize) -> Result<(), ScriptError> {
    let got = words.len() - 1;
    if got != expected {
        return Err(ScriptError::Arity { line, event: words[0].to_string(), expected, got });
    }

    Ok(())
}

fn unsigned(line: usize, text: &str) -> Result<u64, ScriptError> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex)   => u64::from_str_radix(hex, 16),
        None        => text.parse(),
    };

    parsed.map_err(|_| ScriptError::Number { line, text: text.to_string() })
}

fn signed(line: usize, text: &str) -> Result<i64, ScriptError> {
    let (negative, magnitude) = match text.strip_prefix('-') {
        Some(rest)  => (true, rest),
        None        => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let bad = || ScriptError::Number { line, text: text.to_string() };
    let m = i64::try_from(unsigned(line, magnitude)?).map_err(|_| bad())?;

    Ok(if negative { -m } else { m })
}

fn code(line: usize, text: &str) -> Result<i32, ScriptError> {
    i32::try_from(signed(line, text)?)
        .map_err(|_| ScriptError::Number { line, text: text.to_string() })
}

fn parse(line: usize, words: &[&str]) -> Result<Event, ScriptError> {
    let num = |i: usize| unsigned(line, words[i]);
    let evt = match words[0] {
        "malloc"            => {
            arity(line, words, 2)?;
            Event::Alloc(AllocEvent::Malloc { size: num(1)?, addr: num(2)? })
        },
        "calloc"            => {
            arity(line, words, 3)?;
            Event::Alloc(AllocEvent::Calloc { nobj: num(1)?, size: num(2)?, addr: num(3)? })
        },
        "realloc"           => {
            arity(line, words, 3)?;
            Event::Alloc(AllocEvent::Realloc { old: num(1)?, size: num(2)?, addr: num(3)? })
        },
        "free"              => {
            arity(line, words, 1)?;
            Event::Alloc(AllocEvent::Free { addr: num(1)? })
        },
        "memalign"          => {
            arity(line, words, 2)?;
            Event::Alloc(AllocEvent::Memalign { size: num(1)?, addr: num(2)? })
        },
        "posix_memalign"    => {
            arity(line, words, 3)?;
            Event::Alloc(AllocEvent::PosixMemalign {
                size:   num(1)?,
                addr:   num(2)?,
                ret:    code(line, words[3])?,
            })
        },
        "mmap"              => {
            arity(line, words, 2)?;
            Event::Alloc(AllocEvent::Mmap { size: num(1)?, addr: num(2)? })
        },
        "munmap"            => {
            arity(line, words, 1)?;
            Event::Alloc(AllocEvent::Munmap { addr: num(1)? })
        },
        "sbrk"              => {
            arity(line, words, 2)?;
            Event::Alloc(AllocEvent::Sbrk { delta: signed(line, words[1])?, addr: num(2)? })
        },
        "brk"               => {
            arity(line, words, 3)?;
            Event::Alloc(AllocEvent::Brk {
                old_break:  num(1)?,
                new_break:  num(2)?,
                ret:        code(line, words[3])?,
            })
        },
        "section"           => {
            arity(line, words, 3)?;
            Event::Alloc(AllocEvent::Section {
                name:   words[1].to_string(),
                addr:   num(2)?,
                size:   num(3)?,
            })
        },
        "read" | "write"    => {
            arity(line, words, 3)?;
            let size = num(3)?;
            Event::Access(Access {
                ip:     num(1)?,
                addr:   num(2)?,
                size:   u32::try_from(size).map_err(|_| ScriptError::Number {
                    line,
                    text: words[3].to_string(),
                })?,
                kind:   if words[0] == "read" { AccessKind::Read } else { AccessKind::Write },
            })
        },
        "line"              => {
            // Locations may contain spaces; keep everything past the ip.
            if words.len() < 3 {
                return Err(ScriptError::Arity {
                    line,
                    event:      String::from("line"),
                    expected:   2,
                    got:        words.len() - 1,
                });
            }
            Event::Line { ip: num(1)?, location: words[2..].join(" ") }
        },
        "enable"            => {
            arity(line, words, 0)?;
            Event::Enable
        },
        "disable"           => {
            arity(line, words, 0)?;
            Event::Disable
        },
        other               => {
            return Err(ScriptError::Unknown { line, word: other.to_string() });
        }
    };

    Ok(evt)
}
