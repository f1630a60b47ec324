use core::fmt;

use crate::devices::Console;

/// A simple writer that writes to the console.
pub struct Writer<'a> {
    console: &'a dyn Console,
}

impl<'a> Writer<'a> {
    /// Creates a new writer on top of `console`.
    pub fn new(console: &'a dyn Console) -> Writer<'a> {
        Writer { console }
    }

    /// Writes raw bytes to the console.
    pub fn write(&mut self, bytes: &[u8]) {
        self.console.cputs(bytes);
    }
}

impl fmt::Write for Writer<'_> {
    /// Writes a string to the console.
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s.as_bytes());
        Ok(())
    }
}
