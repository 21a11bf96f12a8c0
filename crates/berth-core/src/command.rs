//! Shell-like command string tokenizer.
//!
//! Turns a single command string into an argv vector the way POSIX word
//! splitting would, honoring single and double quotes. The quote characters
//! are retained in the emitted token: when the token is later handed to a
//! `sh -c` wrapper inside a container, the container's shell receives them
//! verbatim. This is a tokenizer, not a shell — no escape interpretation
//! beyond quote matching, no globbing, no variable expansion, no quote
//! removal.

use crate::error::{Error, Result};

/// Tokenize `input` into an argv vector.
///
/// Whitespace outside quotes separates tokens; consecutive whitespace
/// collapses to a single boundary and leading/trailing whitespace is
/// ignored. A `'` or `"` opens a span that continues, whitespace-preserving,
/// until the matching close quote.
///
/// # Errors
///
/// Returns [`Error::Parse`] when a quote is opened but never closed before
/// end of string, or when the input yields no tokens at all (callers need
/// at least the executable name).
///
/// # Examples
///
/// ```
/// let argv = berth_core::parse_command("sh -c 'echo hi'").unwrap();
/// assert_eq!(argv, vec!["sh", "-c", "'echo hi'"]);
/// ```
pub fn parse_command(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match quote {
            Some(open) => {
                current.push(ch);
                if ch == open {
                    quote = None;
                }
            }
            None => {
                if ch == '\'' || ch == '"' {
                    quote = Some(ch);
                    current.push(ch);
                } else if ch.is_whitespace() {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                } else {
                    current.push(ch);
                }
            }
        }
    }

    if let Some(open) = quote {
        return Err(Error::Parse(format!(
            "unterminated {open} quote in command string"
        )));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    if tokens.is_empty() {
        return Err(Error::Parse("command string contains no tokens".into()));
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_words() {
        assert_eq!(parse_command("a b c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(parse_command("x").unwrap(), vec!["x"]);
        assert_eq!(
            parse_command("sudo apt-get update").unwrap(),
            vec!["sudo", "apt-get", "update"]
        );
    }

    #[test]
    fn test_single_quotes_retained() {
        assert_eq!(
            parse_command("sh -c 'echo hi'").unwrap(),
            vec!["sh", "-c", "'echo hi'"]
        );
    }

    #[test]
    fn test_quoted_span_preserves_inner_whitespace() {
        let argv = parse_command(
            "sh -c 'mv /tmp/code.tar.gz /usr/local/src/code.tar.gz && tail -f /dev/null'",
        )
        .unwrap();
        assert_eq!(
            argv,
            vec![
                "sh",
                "-c",
                "'mv /tmp/code.tar.gz /usr/local/src/code.tar.gz && tail -f /dev/null'"
            ]
        );
    }

    #[test]
    fn test_double_quotes() {
        assert_eq!(
            parse_command("echo \"hello  world\"").unwrap(),
            vec!["echo", "\"hello  world\""]
        );
    }

    #[test]
    fn test_quote_adjacent_to_text() {
        assert_eq!(
            parse_command("--flag='a b' tail").unwrap(),
            vec!["--flag='a b'", "tail"]
        );
    }

    #[test]
    fn test_whitespace_collapses() {
        assert_eq!(
            parse_command("  a   b\tc  ").unwrap(),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn test_unterminated_quote_fails() {
        assert!(matches!(
            parse_command("sh -c 'unterminated"),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            parse_command("echo \"open"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(matches!(parse_command(""), Err(Error::Parse(_))));
        assert!(matches!(parse_command("   "), Err(Error::Parse(_))));
    }

    #[test]
    fn test_rejoin_is_stable() {
        for input in [
            "a b c",
            "sh -c 'echo hi'",
            "docker run --rm -e FOO=\"a b\" image",
        ] {
            let first = parse_command(input).unwrap();
            let second = parse_command(&first.join(" ")).unwrap();
            assert_eq!(first, second);
        }
    }
}
