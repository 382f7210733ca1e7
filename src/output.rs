use std::cell::RefCell;
use std::fmt;
use std::io::{self, IsTerminal, Result as IoResult, Write};
use std::rc::Rc;

/// Memory-backed writer for capturing what commands print.
///
/// Clones share the same buffer, so a test can keep one handle and give the other
/// to an [`OutputSink`].
#[derive(Clone, Default)]
pub struct SharedBuffer {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, decoded lossily.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.borrow()).into_owned()
    }

    /// Return the collected text and clear the buffer.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.buf.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

/// A writable destination with a default line terminator.
///
/// Sinks are cheap handles: clones write to the same destination, which lets an
/// interactive shell hand its own stdout/stderr to every command it registers.
#[derive(Clone)]
pub struct OutputSink {
    out: Rc<RefCell<dyn Write>>,
    ending: String,
    terminal: bool,
}

impl OutputSink {
    /// Wrap an arbitrary writer. The sink reports itself as non-interactive.
    pub fn new(out: impl Write + 'static) -> Self {
        Self {
            out: Rc::new(RefCell::new(out)),
            ending: "\n".to_string(),
            terminal: false,
        }
    }

    pub fn stdout() -> Self {
        let terminal = io::stdout().is_terminal();
        Self {
            terminal,
            ..Self::new(io::stdout())
        }
    }

    pub fn stderr() -> Self {
        let terminal = io::stderr().is_terminal();
        Self {
            terminal,
            ..Self::new(io::stderr())
        }
    }

    /// Sink writing into a fresh [`SharedBuffer`], returned alongside it.
    pub fn buffer() -> (Self, SharedBuffer) {
        let buf = SharedBuffer::new();
        (Self::new(buf.clone()), buf)
    }

    pub fn with_ending(mut self, ending: impl Into<String>) -> Self {
        self.ending = ending.into();
        self
    }

    pub fn ending(&self) -> &str {
        &self.ending
    }

    /// Whether the destination is an interactive terminal.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Write `msg` followed by the sink's default terminator.
    pub fn write_line(&self, msg: impl fmt::Display) -> IoResult<()> {
        self.write_with(msg, None)
    }

    /// Write `msg`, appending `ending` (or the default terminator when `None`)
    /// unless the message already ends with it. An empty ending writes the
    /// message untouched.
    pub fn write_with(&self, msg: impl fmt::Display, ending: Option<&str>) -> IoResult<()> {
        let ending = ending.unwrap_or(&self.ending);
        let mut text = msg.to_string();
        if !ending.is_empty() && !text.ends_with(ending) {
            text.push_str(ending);
        }
        let mut out = self.out.borrow_mut();
        out.write_all(text.as_bytes())?;
        out.flush()
    }
}

impl Write for OutputSink {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.out.borrow_mut().write(data)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.out.borrow_mut().flush()
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink")
            .field("ending", &self.ending)
            .field("terminal", &self.terminal)
            .finish_non_exhaustive()
    }
}
