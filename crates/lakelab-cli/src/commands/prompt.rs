//! Interactive confirmation on the terminal

use std::io::{BufRead, Write};

use lakelab_common::Result;
use lakelab_orchestrator::Confirmer;

/// Reads answers from stdin
pub struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        let answer = ask(&mut std::io::stdin().lock(), &mut std::io::stdout(), &format!("{} [y/N] ", prompt))?;
        Ok(is_yes(&answer))
    }

    fn confirm_typed(&self, prompt: &str, expected: &str) -> Result<bool> {
        let answer = ask(&mut std::io::stdin().lock(), &mut std::io::stdout(), &format!("{}: ", prompt))?;
        Ok(answer.trim() == expected)
    }
}

/// Write `prompt` and read one line
fn ask(input: &mut impl BufRead, output: &mut impl Write, prompt: &str) -> std::io::Result<String> {
    output.write_all(prompt.as_bytes())?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line)
}

fn is_yes(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}
