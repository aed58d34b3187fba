//! Interactive credential entry

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::io::{self, BufRead, Write};

/// Source of values the user types in
pub trait Prompt {
    /// Ask for a visible value
    fn ask(&self, label: &str) -> Result<String>;

    /// Ask for a value without echoing it
    fn ask_hidden(&self, label: &str) -> Result<SecretString>;
}

/// Prompts on the controlling terminal
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask(&self, label: &str) -> Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "{label}").context("writing prompt")?;
        stderr.flush().context("flushing prompt")?;

        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("reading from stdin")?;
        Ok(line.trim().to_string())
    }

    fn ask_hidden(&self, label: &str) -> Result<SecretString> {
        let mut secret = rpassword::prompt_password(label).context("reading hidden input")?;
        let value = SecretString::from(secret.trim().to_string());
        zeroize::Zeroize::zeroize(&mut secret);
        Ok(value)
    }
}
