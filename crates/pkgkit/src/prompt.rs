//! Yes/no confirmations asked while reconciling checkout state.
//!
//! Library code only talks to the [`Confirm`] trait; scripts pass
//! [`ConsoleConfirm`] for a real terminal, tests pass a closure.

use crate::errors::{PkgError, Result};
use crate::ui::prompt_theme;
use dialoguer::Confirm as ConfirmPrompt;

pub trait Confirm {
    /// Asks `prompt` and returns whether the answer was yes.
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        Ok(self(prompt))
    }
}

/// Reads the answer from the terminal; anything but an explicit yes declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleConfirm;

impl Confirm for ConsoleConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        ConfirmPrompt::with_theme(&prompt_theme())
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(prompt_error)
    }
}

/// Declines every question, for runs without a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysDecline;

impl Confirm for AlwaysDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

fn prompt_error(error: dialoguer::Error) -> PkgError {
    match error {
        dialoguer::Error::IO(err) => PkgError::Prompt(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_answer_and_see_the_prompt() {
        let mut asked = Vec::new();
        let mut answer = |prompt: &str| {
            asked.push(prompt.to_string());
            true
        };
        assert!(answer.confirm("Proceed?").unwrap());
        assert_eq!(asked, ["Proceed?"]);
    }

    #[test]
    fn always_decline_says_no() {
        assert!(!AlwaysDecline.confirm("Proceed?").unwrap());
    }
}
