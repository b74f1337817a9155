//! Token-level command shape.
//!
//! The interactive tokenizer lives outside the core; queries arrive here
//! as a token list and are split into a command name, positional
//! arguments, and named `--flags`. Boolean flags are a fixed vocabulary;
//! any other flag consumes the following token as its value (both
//! `--division DATA` and `--division=DATA` are accepted).

use std::collections::BTreeMap;

/// Flags that never take a value.
const BOOL_FLAGS: [&str; 19] = [
    "analyze",
    "body",
    "called-by",
    "calls",
    "clear",
    "contents",
    "count",
    "exact",
    "external",
    "header",
    "line-numbers",
    "list",
    "orphan",
    "reads",
    "references",
    "thru",
    "used-by",
    "verbose",
    "writes",
];

/// A parsed query command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCommand {
    /// Command name, lowercased.
    pub name: String,
    /// Positional arguments, in order.
    pub args: Vec<String>,
    /// Named flags; `None` for boolean presence.
    pub flags: BTreeMap<String, Option<String>>,
}

impl ParsedCommand {
    /// Build from pre-tokenized input. Returns `None` for an empty list.
    pub fn from_tokens(tokens: &[String]) -> Option<Self> {
        let mut iter = tokens.iter().peekable();
        let name = iter.next()?.to_lowercase();

        let mut args = Vec::new();
        let mut flags = BTreeMap::new();

        while let Some(token) = iter.next() {
            if let Some(flag) = token.strip_prefix("--") {
                if let Some((key, value)) = flag.split_once('=') {
                    flags.insert(key.to_lowercase(), Some(value.to_string()));
                } else {
                    let key = flag.to_lowercase();
                    let takes_value = !BOOL_FLAGS.contains(&key.as_str());
                    if takes_value && iter.peek().is_some_and(|next| !next.starts_with("--")) {
                        flags.insert(key, iter.next().cloned());
                    } else {
                        flags.insert(key, None);
                    }
                }
            } else {
                args.push(token.clone());
            }
        }

        Some(Self { name, args, flags })
    }

    /// Convenience: split a raw line on whitespace and parse.
    pub fn parse(line: &str) -> Option<Self> {
        let tokens: Vec<String> = line.split_whitespace().map(String::from).collect();
        Self::from_tokens(&tokens)
    }

    /// Positional argument by index.
    pub fn arg(&self, i: usize) -> Option<&str> {
        self.args.get(i).map(String::as_str)
    }

    /// Whether a flag is present (with or without value).
    pub fn has(&self, flag: &str) -> bool {
        self.flags.contains_key(flag)
    }

    /// A flag's value, if the flag carries one.
    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name)?.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_command() {
        let cmd = ParsedCommand::parse("divisions").unwrap();
        assert_eq!(cmd.name, "divisions");
        assert!(cmd.args.is_empty());
        assert!(cmd.flags.is_empty());
    }

    #[test]
    fn test_args_and_bool_flags() {
        let cmd = ParsedCommand::parse("paragraph 2100-VALIDATE --body --analyze").unwrap();
        assert_eq!(cmd.arg(0), Some("2100-VALIDATE"));
        assert!(cmd.has("body"));
        assert!(cmd.has("analyze"));
        assert!(!cmd.has("calls"));
    }

    #[test]
    fn test_value_flag_space_form() {
        let cmd = ParsedCommand::parse("sections --division DATA").unwrap();
        assert_eq!(cmd.flag("division"), Some("DATA"));
    }

    #[test]
    fn test_value_flag_equals_form() {
        let cmd = ParsedCommand::parse("working-storage --level=5").unwrap();
        assert_eq!(cmd.flag("level"), Some("5"));
    }

    #[test]
    fn test_bool_flag_does_not_eat_argument() {
        let cmd = ParsedCommand::parse("find MOVE --count").unwrap();
        assert_eq!(cmd.arg(0), Some("MOVE"));
        assert!(cmd.has("count"));
        assert_eq!(cmd.flag("count"), None);
    }

    #[test]
    fn test_empty_input() {
        assert!(ParsedCommand::parse("   ").is_none());
    }

    #[test]
    fn test_name_lowercased() {
        let cmd = ParsedCommand::parse("DIVISIONS").unwrap();
        assert_eq!(cmd.name, "divisions");
    }
}
