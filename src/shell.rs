//! Operator console commands
//!
//! Line-oriented stand-in for a GUI: each stdin line becomes one command.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Add a term with fuzz expansion
    Add(String),
    /// Add a term verbatim (normalized only)
    Exact(String),
    Remove(String),
    Clear,
    Pause,
    Resume,
    Status,
    List,
    Help,
    Quit,
}

pub const HELP: &str = "Commands: add <term> | exact <term> | remove <term> | clear | pause | resume | status | list | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Unknown(String),
    MissingTerm(&'static str),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Unknown(word) => write!(f, "unknown command '{}'", word),
            ParseError::MissingTerm(cmd) => write!(f, "'{}' needs a term", cmd),
        }
    }
}

impl ShellCommand {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        let with_term = |name: &'static str, build: fn(String) -> ShellCommand| {
            if rest.is_empty() {
                Err(ParseError::MissingTerm(name))
            } else {
                Ok(Some(build(rest.to_string())))
            }
        };

        match head.to_lowercase().as_str() {
            "add" | "fuzz" => with_term("add", ShellCommand::Add),
            "exact" => with_term("exact", ShellCommand::Exact),
            "remove" | "rm" => with_term("remove", ShellCommand::Remove),
            "clear" => Ok(Some(ShellCommand::Clear)),
            "pause" => Ok(Some(ShellCommand::Pause)),
            "resume" => Ok(Some(ShellCommand::Resume)),
            "status" | "stats" => Ok(Some(ShellCommand::Status)),
            "list" | "ls" => Ok(Some(ShellCommand::List)),
            "help" | "?" => Ok(Some(ShellCommand::Help)),
            "quit" | "exit" | "q" => Ok(Some(ShellCommand::Quit)),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}
