//! Message parser - Splits raw text into a command token and arguments

/// A message that looks like a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub token: &'a str,
    pub args: Vec<&'a str>,
    /// Everything after the token, leading whitespace trimmed
    pub rest: &'a str,
}

/// Parses incoming text into invocations
#[derive(Debug, Clone)]
pub struct MessageParser {
    command_prefix: String,
}

impl MessageParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
        }
    }

    /// `None` for ordinary traffic: no prefix, or nothing after it
    pub fn parse<'a>(&self, text: &'a str) -> Option<Invocation<'a>> {
        let body = text.trim_start().strip_prefix(self.command_prefix.as_str())?;
        if body.starts_with(char::is_whitespace) {
            return None;
        }

        let token = body.split_whitespace().next()?;
        let rest = body[token.len()..].trim_start();
        Some(Invocation {
            token,
            args: rest.split_whitespace().collect(),
            rest,
        })
    }
}
