//! Rendering device output safely for logs and error messages.

use vte::{Parser, Perform};

/// Collects printable text, dropping escape sequences and most controls.
#[derive(Default)]
struct Printable {
    out: String,
}

impl Perform for Printable {
    fn print(&mut self, c: char) {
        self.out.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.out.push('\n'),
            b'\t' => self.out.push('\t'),
            _ => {}
        }
    }
}

/// Strip terminal escape sequences and control characters from `data`.
///
/// Device output can carry cursor movement and colour codes; this keeps
/// them from reaching the operator's terminal through log lines.
pub fn printable(data: &[u8]) -> String {
    let mut parser = Parser::new();
    let mut performer = Printable::default();
    parser.advance(&mut performer, data);
    performer.out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_colour_codes() {
        assert_eq!(printable(b"\x1b[32mGreen text\x1b[0m"), "Green text");
    }

    #[test]
    fn test_keeps_newlines_drops_cr_and_backspace() {
        assert_eq!(printable(b"line1\r\nline2\x08\x08"), "line1\nline2");
    }
}
