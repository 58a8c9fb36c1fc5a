//! Sources for the one-time code asked for during sign-in.

use std::io::{self, BufRead, Write};

use crate::error::{AppError, Result};

/// Supplies the multi-factor code when the sign-in flow asks for one.
///
/// Implementations may block; the checker does nothing else while a code is
/// pending.
pub trait CodePrompt: Send + Sync {
    fn code(&mut self, prompt: &str) -> Result<String>;
}

/// Reads the code from the controlling terminal.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl CodePrompt for StdinPrompt {
    fn code(&mut self, prompt: &str) -> Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(AppError::ManualIntervention(
                "stdin closed while waiting for the authentication code".into(),
            ));
        }
        Ok(line.trim().to_string())
    }
}

/// Fails instead of asking; used when nobody is at the terminal.
#[derive(Debug, Default)]
pub struct NonInteractive;

impl CodePrompt for NonInteractive {
    fn code(&mut self, _prompt: &str) -> Result<String> {
        Err(AppError::ManualIntervention(
            "sign-in needs an authentication code; run once interactively to refresh the session"
                .into(),
        ))
    }
}

/// Check a code against the number of digit inputs on the page.
pub fn validate_code(code: &str, digit_fields: usize) -> Result<()> {
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::auth("authentication code must be digits only"));
    }
    if digit_fields > 1 && code.chars().count() != digit_fields {
        return Err(AppError::auth(format!(
            "authentication code must have {} digits, got {}",
            digit_fields,
            code.chars().count()
        )));
    }
    Ok(())
}
