//! Logical-line reading and include-source opening.
//!
//! The parser consumes one logical line at a time through [`LineSource`]:
//! physical lines ending in a backslash are joined with their continuation,
//! and the reported line number is that of the first physical line of the
//! joined result. [`SourceOpener`] is the seam through which `include`
//! directives open files and subprocess pipes.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};
use std::process::Command;

/// Stream of logical config lines.
pub trait LineSource {
    /// The next logical line, or `None` at end of source.
    fn next_logical_line(&mut self) -> io::Result<Option<String>>;

    /// 1-based number of the first physical line of the most recently
    /// returned logical line.
    fn line(&self) -> u32;
}

/// [`LineSource`] over any buffered reader, joining backslash
/// continuations.
pub struct LineReader<R> {
    inner: R,
    physical: u32,
    current: u32,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            physical: 0,
            current: 0,
        }
    }

    fn read_physical(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.inner.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        self.physical += 1;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}

impl LineReader<Cursor<Vec<u8>>> {
    /// Read logical lines from an in-memory string.
    pub fn from_string(text: &str) -> Self {
        Self::new(Cursor::new(text.as_bytes().to_vec()))
    }
}

impl<R: BufRead> LineSource for LineReader<R> {
    fn next_logical_line(&mut self) -> io::Result<Option<String>> {
        let Some(mut line) = self.read_physical()? else {
            return Ok(None);
        };
        self.current = self.physical;
        // Join continuation lines; a trailing backslash at end of source is
        // simply dropped.
        while line.trim_end().ends_with('\\') {
            let joined_len = line.trim_end().len() - 1;
            line.truncate(joined_len);
            match self.read_physical()? {
                Some(next) => line.push_str(&next),
                None => break,
            }
        }
        Ok(Some(line))
    }

    fn line(&self) -> u32 {
        self.current
    }
}

/// How an include source should be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    File,
    /// Run as a subprocess and parse its standard output.
    Command,
}

/// Opens include sources. The parser only consumes the resulting stream of
/// logical lines; opening files and pipes lives behind this trait.
pub trait SourceOpener {
    fn open(&self, kind: IncludeKind, spec: &str) -> io::Result<Box<dyn LineSource>>;
}

/// Filesystem-backed opener. Commands run under `sh -c` and block until
/// they exit; a non-zero exit status is an open failure.
pub struct FsOpener;

impl SourceOpener for FsOpener {
    fn open(&self, kind: IncludeKind, spec: &str) -> io::Result<Box<dyn LineSource>> {
        match kind {
            IncludeKind::File => {
                let file = File::open(spec)?;
                Ok(Box::new(LineReader::new(BufReader::new(file))))
            }
            IncludeKind::Command => {
                let output = Command::new("/bin/sh").arg("-c").arg(spec).output()?;
                if !output.status.success() {
                    return Err(io::Error::other(format!(
                        "command terminated with {}",
                        output.status
                    )));
                }
                let text = String::from_utf8_lossy(&output.stdout).into_owned();
                Ok(Box::new(LineReader::from_string(&text)))
            }
        }
    }
}
