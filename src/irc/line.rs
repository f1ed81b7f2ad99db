use std::fmt;

use thiserror::Error;

/// Characters stripped from both ends of a raw line before parsing.
const TRIM: &[char] = &[' ', '\r', '\n'];

/// Errors produced when a raw protocol line cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// Nothing left after trimming whitespace and line terminators.
    #[error("line too short")]
    TooShort,
    /// The parameter region held no command token.
    #[error("line has no command")]
    MissingCommand,
}

/// One message of the line-oriented wire protocol.
///
/// ```text
/// [":" prefix SPACE] command (SPACE argument)* [SPACE ":" trailing]
/// ```
///
/// An empty `prefix` or `suffix` is treated the same as an absent one when
/// formatting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Line {
    pub prefix: Option<String>,
    pub command: String,
    pub arguments: Vec<String>,
    pub suffix: Option<String>,
}

impl Line {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// `PRIVMSG <target> :<text>`
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new("PRIVMSG")
            .with_arguments([target.into()])
            .with_suffix(text)
    }

    /// Parses one raw line of protocol text.
    ///
    /// The rules are applied in a fixed order and never second-guessed:
    ///
    /// 1. Trim spaces, CR and LF; an empty result is [`LineError::TooShort`].
    /// 2. A leading `:` starts a prefix that runs to the first space. Without
    ///    a space there is no prefix, and the colon stays part of the command.
    /// 3. The first `" :"` starts the trailing parameter (the suffix).
    /// 4. Whatever lies between the two is split on single spaces: the first
    ///    token is the command, the rest are arguments.
    ///
    /// # Examples
    ///
    /// ```
    /// use feedbridge::irc::Line;
    ///
    /// let line = Line::parse(":irc.example.net 001 nick :Welcome\r\n").unwrap();
    /// assert_eq!(line.prefix.as_deref(), Some("irc.example.net"));
    /// assert_eq!(line.command, "001");
    /// assert_eq!(line.arguments, vec!["nick"]);
    /// assert_eq!(line.suffix.as_deref(), Some("Welcome"));
    /// ```
    pub fn parse(raw: &str) -> Result<Self, LineError> {
        let line = raw.trim_matches(TRIM);
        if line.is_empty() {
            return Err(LineError::TooShort);
        }

        let mut prefix = None;
        let mut params_start = 0;
        if line.starts_with(':') {
            if let Some(space) = line.find(' ') {
                prefix = Some(line[1..space].to_string());
                params_start = space + 1;
            }
        }

        let mut suffix = None;
        let mut params_end = line.len();
        if let Some(marker) = line.find(" :") {
            suffix = Some(line[marker + 2..].to_string());
            params_end = marker;
        }

        // A trailing marker that sits inside the prefix window leaves no room
        // for a command.
        let params = if params_start <= params_end {
            &line[params_start..params_end]
        } else {
            ""
        };

        let mut tokens = params.split(' ');
        let command = match tokens.next() {
            Some(command) if !command.is_empty() => command.to_string(),
            _ => return Err(LineError::MissingCommand),
        };
        let arguments = tokens.map(str::to_string).collect();

        Ok(Self {
            prefix,
            command,
            arguments,
            suffix,
        })
    }

    /// Serializes the line to wire text, CRLF included.
    ///
    /// Content is not validated: callers must keep CR and LF out of every
    /// field.
    pub fn format(&self) -> String {
        let mut out = String::with_capacity(self.wire_len_hint());

        if let Some(prefix) = self.prefix.as_deref().filter(|p| !p.is_empty()) {
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }

        out.push_str(&self.command);
        out.push(' ');

        if !self.arguments.is_empty() {
            out.push_str(&self.arguments.join(" "));
            out.push(' ');
        }

        if let Some(suffix) = self.suffix.as_deref().filter(|s| !s.is_empty()) {
            out.push(':');
            out.push_str(suffix);
        }

        out.push_str("\r\n");
        out
    }

    fn wire_len_hint(&self) -> usize {
        let prefix = self.prefix.as_ref().map_or(0, |p| p.len() + 2);
        let arguments: usize = self.arguments.iter().map(|a| a.len() + 1).sum();
        let suffix = self.suffix.as_ref().map_or(0, |s| s.len() + 1);
        prefix + self.command.len() + 1 + arguments + suffix + 2
    }
}

/// Wire form without the line terminator, for logs.
impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.format().trim_end_matches(TRIM))
    }
}
