// ABOUTME: Interactive yes/no confirmation used before destructive or repeated steps
// Also carries short notices that must reach the user before tmux takes over the terminal

use std::io::{self, BufRead, Write};

/// How the orchestrator talks to the user outside of tmux.
#[cfg_attr(test, mockall::automock)]
pub trait Prompt {
    /// Ask `question`; only an explicit yes counts as confirmation.
    fn confirm(&self, question: &str) -> io::Result<bool>;

    /// Show a one-line notice.
    fn notify(&self, message: &str);
}

/// Asks on stdout and reads the answer from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn confirm(&self, question: &str) -> io::Result<bool> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{question} [y/N] ")?;
        stdout.flush()?;

        let mut answer = String::new();
        // EOF reads as an empty answer, which declines.
        io::stdin().lock().read_line(&mut answer)?;
        Ok(is_affirmative(&answer))
    }

    fn notify(&self, message: &str) {
        eprintln!("{message}");
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_affirmative() {
        for yes in ["y", "Y", "yes", "YES", " yes\n"] {
            assert!(is_affirmative(yes), "{yes:?} should confirm");
        }
        for no in ["", "\n", "n", "no", "yep", "sure"] {
            assert!(!is_affirmative(no), "{no:?} should decline");
        }
    }
}
