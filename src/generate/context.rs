//! Indented line-writer for emitted build files.

const INDENT: &str = "    ";
const DELIMITER_WIDTH: usize = 80;

#[derive(Debug, Default)]
pub struct Context {
    lines: Vec<String>,
    indent: usize,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    /// Append text at the current indent; embedded newlines split into
    /// separate lines.
    pub fn add_line(&mut self, text: impl AsRef<str>) {
        for line in text.as_ref().split('\n') {
            if line.is_empty() {
                self.lines.push(String::new());
            } else {
                self.lines.push(format!("{}{}", INDENT.repeat(self.indent), line));
            }
        }
    }

    pub fn add_empty(&mut self) {
        self.lines.push(String::new());
    }

    /// Normalize the trailing blank run to exactly `n` lines.
    pub fn empty_lines(&mut self, n: usize) {
        while self.lines.last().is_some_and(|l| l.is_empty()) {
            self.lines.pop();
        }
        for _ in 0..n {
            self.lines.push(String::new());
        }
    }

    pub fn increase_indent(&mut self) {
        self.indent += 1;
    }

    pub fn decrease_indent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn delimiter(&mut self) {
        self.add_line("#".repeat(DELIMITER_WIDTH));
    }

    /// Section title framed by delimiter lines.
    pub fn section(&mut self, title: &str) {
        self.delimiter();
        self.add_line("#");
        self.add_line(format!("# {}", title));
        self.add_line("#");
        self.delimiter();
        self.add_empty();
    }

    pub fn text(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}
