//! User interaction operations (confirmation prompts).

use anyhow::Result;
use std::io::{self, BufRead, Write};

use super::RealRuntime;

/// Ask `prompt` on `output` and read a yes/no answer from `input`.
/// Anything other than `y`/`yes` (case-insensitive) counts as no.
pub(crate) fn ask_yes_no<I: BufRead, O: Write>(
    prompt: &str,
    input: &mut I,
    output: &mut O,
) -> Result<bool> {
    write!(output, "{} [y/N] ", prompt)?;
    output.flush()?;

    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Ok(false);
    }

    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

impl RealRuntime {
    pub(crate) fn confirm_impl(&self, prompt: &str) -> Result<bool> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        ask_yes_no(prompt, &mut stdin.lock(), &mut stdout)
    }
}
