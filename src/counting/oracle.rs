//! Human fallback for counts nothing else can produce.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// One reply from the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleReply {
    /// A count formula, to be parsed as a polynomial in the field-size
    /// symbol.
    Answer(String),
    /// The oracle explicitly does not know; a placeholder symbol is
    /// fabricated and remembered.
    Unknown,
    /// No reply at all; a placeholder symbol is fabricated but not
    /// remembered.
    Silent,
}

/// Supplies point counts when every automated strategy has failed.
pub trait CountOracle {
    /// Presents `prompt` and returns the reply. Called again with the
    /// same prompt when a reply fails to parse.
    fn ask(&mut self, prompt: &str) -> OracleReply;
}

/// Interactive oracle on the controlling terminal: prompts on standard
/// error, reads one reply line from standard input.
///
/// `n`, `N`, `?` and `unknown` decline the question; end of input or an
/// empty line counts as silence.
#[derive(Debug, Default)]
pub struct StdinOracle;

impl CountOracle for StdinOracle {
    fn ask(&mut self, prompt: &str) -> OracleReply {
        let mut err = io::stderr();
        if writeln!(err, "{prompt}").and_then(|_| err.flush()).is_err() {
            return OracleReply::Silent;
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => OracleReply::Silent,
            Ok(_) => classify(line.trim()),
        }
    }
}

fn classify(token: &str) -> OracleReply {
    if token.is_empty() {
        OracleReply::Silent
    } else if token == "n" || token == "N" || token == "?" || token.eq_ignore_ascii_case("unknown")
    {
        OracleReply::Unknown
    } else {
        OracleReply::Answer(token.to_string())
    }
}

/// Scripted oracle replaying queued replies, for tests and offline
/// runs. An exhausted queue is silent.
#[derive(Debug, Default)]
pub struct QueueOracle {
    replies: VecDeque<OracleReply>,
    prompts: Vec<String>,
}

impl QueueOracle {
    /// Queues replies to hand out in order.
    pub fn new(replies: impl IntoIterator<Item = OracleReply>) -> Self {
        QueueOracle {
            replies: replies.into_iter().collect(),
            prompts: Vec::new(),
        }
    }

    /// Every prompt seen so far, in order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl CountOracle for QueueOracle {
    fn ask(&mut self, prompt: &str) -> OracleReply {
        self.prompts.push(prompt.to_string());
        self.replies.pop_front().unwrap_or(OracleReply::Silent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decline_tokens() {
        assert_eq!(classify("n"), OracleReply::Unknown);
        assert_eq!(classify("N"), OracleReply::Unknown);
        assert_eq!(classify("?"), OracleReply::Unknown);
        assert_eq!(classify("Unknown"), OracleReply::Unknown);
    }

    #[test]
    fn test_formulas_pass_through_trimmed() {
        assert_eq!(
            classify("p^2 - 1"),
            OracleReply::Answer("p^2 - 1".to_string())
        );
    }

    #[test]
    fn test_empty_line_is_silence() {
        assert_eq!(classify(""), OracleReply::Silent);
    }
}
