//! CAPTCHA detection and operator hand-off.
//!
//! The registry intermittently serves a visual CAPTCHA (or an outright
//! "Access Denied" block page) instead of search results. Detection is a
//! text heuristic; resolution is a human task, surfaced through the
//! [`CaptchaPrompt`] capability so batch runs can inject a scripted prompt.

use console::Term;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;

/// Indicators observed on the registry's CAPTCHA and block pages.
/// "support id" comes from the "Your support ID is:" denial page.
const CAPTCHA_INDICATORS: &[&str] = &[
    "captcha",
    "what code is in the image",
    "access denied",
    "support id",
];

/// Heuristic CAPTCHA / block-page check over raw page HTML.
pub fn detect_captcha(html: &str) -> bool {
    if html.is_empty() {
        return false;
    }
    let lower = html.to_lowercase();
    CAPTCHA_INDICATORS.iter().any(|ind| lower.contains(ind))
}

/// Operator's answer to a CAPTCHA prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    /// CAPTCHA solved in the browser, carry on.
    Continue,
    /// Give up on the current item but keep the session alive.
    Skip,
    /// Stop the worker cleanly.
    Quit,
}

/// Blocking operator prompt. Production uses the terminal; tests script it.
pub trait CaptchaPrompt: Send + Sync {
    fn prompt(&mut self, message: &str) -> PromptChoice;
}

/// Interactive terminal prompt with an audible bell.
pub struct TerminalPrompt {
    term: Term,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }

    /// Whether a human is actually attached to this terminal.
    pub fn is_interactive() -> bool {
        console::user_attended()
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptchaPrompt for TerminalPrompt {
    fn prompt(&mut self, message: &str) -> PromptChoice {
        // Ring the bell twice so a backgrounded terminal gets noticed.
        let _ = self.term.write_str("\x07");
        let _ = self.term.write_str("\x07");

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .items(&["continue", "skip", "quit"])
            .default(0)
            .interact_on(&self.term);

        match selection {
            Ok(0) => PromptChoice::Continue,
            Ok(1) => PromptChoice::Skip,
            _ => PromptChoice::Quit,
        }
    }
}

/// Scripted prompt for tests: replays a fixed sequence of choices and
/// answers Quit once exhausted.
pub struct ScriptedPrompt {
    choices: Vec<PromptChoice>,
    next: usize,
}

impl ScriptedPrompt {
    pub fn new(choices: Vec<PromptChoice>) -> Self {
        Self { choices, next: 0 }
    }
}

impl CaptchaPrompt for ScriptedPrompt {
    fn prompt(&mut self, _message: &str) -> PromptChoice {
        let choice = self
            .choices
            .get(self.next)
            .copied()
            .unwrap_or(PromptChoice::Quit);
        self.next += 1;
        choice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_captcha_indicators() {
        assert!(detect_captcha("<html>Please solve the CAPTCHA below</html>"));
        assert!(detect_captcha("<b>What code is in the image?</b>"));
        assert!(detect_captcha("<h1>Access Denied</h1>"));
        assert!(detect_captcha("Your support ID is: 1234567890"));
    }

    #[test]
    fn test_detect_captcha_case_insensitive() {
        assert!(detect_captcha("ACCESS DENIED"));
        assert!(detect_captcha("Captcha challenge"));
    }

    #[test]
    fn test_detect_captcha_clean_page() {
        assert!(!detect_captcha("<html><body>Total Matching Records: 42</body></html>"));
        assert!(!detect_captcha(""));
    }

    #[test]
    fn test_scripted_prompt_replays_then_quits() {
        let mut prompt = ScriptedPrompt::new(vec![PromptChoice::Continue, PromptChoice::Skip]);
        assert_eq!(prompt.prompt("x"), PromptChoice::Continue);
        assert_eq!(prompt.prompt("x"), PromptChoice::Skip);
        assert_eq!(prompt.prompt("x"), PromptChoice::Quit);
    }
}
