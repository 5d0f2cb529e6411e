//! Host I/O surface.
//!
//! Every observable effect of a spell flows through this trait: line
//! output for Inscribe and Gaze, prompted line input for Inquire, and
//! sleeping for Ponder. Tests and embedders drive spells against
//! [`ScriptedHost`], which replaces the console with in-memory buffers.

use std::io::{self, BufRead, Write};

/// The I/O operations a spell may perform.
pub trait Host {
    /// Write `text` followed by a newline to the output.
    fn print_line(&mut self, text: &str);

    /// Write `prompt` followed by a single space (no newline), then read
    /// one line, without its terminator, from the input.
    fn read_line(&mut self, prompt: &str) -> String;

    /// Block the calling thread for the given number of seconds.
    fn sleep(&mut self, seconds: f64);
}

/// Host backed by the real console and clock.
pub struct StdHost;

impl Host for StdHost {
    fn print_line(&mut self, text: &str) {
        println!("{text}");
    }

    fn read_line(&mut self, prompt: &str) -> String {
        print!("{prompt} ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_ok() {
            line.trim_end_matches(['\r', '\n']).to_string()
        } else {
            String::new()
        }
    }

    fn sleep(&mut self, seconds: f64) {
        if seconds > 0.0 {
            std::thread::sleep(std::time::Duration::from_secs_f64(seconds));
        }
    }
}

/// Host with scripted input and captured output.
#[derive(Debug, Default)]
pub struct ScriptedHost {
    /// Lines to serve to `read_line`, in order. Once exhausted, reads
    /// yield empty lines.
    pub input: Vec<String>,
    /// Every line printed, in order.
    pub output: Vec<String>,
    /// Every prompt shown, in order.
    pub prompts: Vec<String>,
    /// Total seconds requested from `sleep`.
    pub slept: f64,
    cursor: usize,
}

impl ScriptedHost {
    /// Create a host with the given input lines queued.
    pub fn with_input(lines: &[&str]) -> Self {
        Self {
            input: lines.iter().map(|s| (*s).to_string()).collect(),
            ..Self::default()
        }
    }
}

impl Host for ScriptedHost {
    fn print_line(&mut self, text: &str) {
        self.output.push(text.to_string());
    }

    fn read_line(&mut self, prompt: &str) -> String {
        self.prompts.push(prompt.to_string());
        let line = self.input.get(self.cursor).cloned().unwrap_or_default();
        self.cursor += 1;
        line
    }

    fn sleep(&mut self, seconds: f64) {
        self.slept += seconds;
    }
}
