//! Confirmation prompts gating destructive actions.

use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};
use std::sync::Mutex;

pub trait Confirm: Send + Sync {
    /// Ask a `(y/N)` question. `skip` answers yes without prompting.
    fn confirm_yes_no(&self, prompt: &str, skip: bool) -> bool;

    /// Require the operator to type `expected` verbatim. `skip` answers yes
    /// without prompting.
    fn confirm_exact_phrase(&self, prompt: &str, expected: &str, skip: bool) -> bool;
}

/// Line-based prompt over any reader/writer pair.
pub struct PromptConfirm<R, W> {
    io: Mutex<(R, W)>,
}

impl<R: BufRead + Send, W: Write + Send> PromptConfirm<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    /// Print `text` and read one answer line. `None` on EOF or I/O failure.
    fn ask(&self, text: &str) -> Option<String> {
        let mut guard = self.io.lock().ok()?;
        let (reader, writer) = &mut *guard;

        write!(writer, "{}", text).ok()?;
        writer.flush().ok()?;

        let mut answer = String::new();
        match reader.read_line(&mut answer) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(answer.trim().to_string()),
        }
    }
}

impl PromptConfirm<BufReader<Stdin>, Stdout> {
    pub fn terminal() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R> PromptConfirm<R, Vec<u8>> {
    /// Everything written to the prompt so far.
    pub fn written(&self) -> String {
        self.io
            .lock()
            .map(|guard| String::from_utf8_lossy(&guard.1).into_owned())
            .unwrap_or_default()
    }
}

impl<R: BufRead + Send, W: Write + Send> Confirm for PromptConfirm<R, W> {
    fn confirm_yes_no(&self, prompt: &str, skip: bool) -> bool {
        if skip {
            return true;
        }
        self.ask(&format!("{} (y/N) ", prompt))
            .map(|a| a == "y" || a == "Y")
            .unwrap_or(false)
    }

    fn confirm_exact_phrase(&self, prompt: &str, expected: &str, skip: bool) -> bool {
        if skip {
            return true;
        }
        self.ask(&format!("{} Type '{}' to confirm: ", prompt, expected))
            .map(|a| a == expected)
            .unwrap_or(false)
    }
}
