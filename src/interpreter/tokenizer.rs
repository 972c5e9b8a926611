use crate::error::ScriptError;

/// One whitespace-separated piece of a script line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// Text with the quote characters removed
    pub text: String,
    /// The token contained a double-quoted section
    pub quoted: bool,
}

impl Token {
    /// Unquoted token
    pub fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }

    /// Quoted token
    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }
}

/// Split a line on runs of whitespace outside double quotes
///
/// A standalone `//` token starts a comment that runs to the end of the line.
/// `"a b"` yields the single quoted token `a b`; `""` yields an empty quoted token.
pub fn tokenize(line: &str) -> Result<Vec<Token>, ScriptError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut started = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
                started = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    if !quoted && current == "//" {
                        return Ok(tokens);
                    }
                    tokens.push(Token {
                        text: std::mem::take(&mut current),
                        quoted,
                    });
                    quoted = false;
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }

    if in_quotes {
        return Err(ScriptError::UnterminatedQuote);
    }
    if started && !(current == "//" && !quoted) {
        tokens.push(Token {
            text: current,
            quoted,
        });
    }
    Ok(tokens)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_runs_of_spaces_outside_quotes() {
        assert_eq!(
            tokenize("books:rename   \"The  Hobbit\" Bilbo").unwrap(),
            vec![
                Token::bare("books:rename"),
                Token::quoted("The  Hobbit"),
                Token::bare("Bilbo"),
            ]
        );
    }

    #[test]
    fn standalone_double_slash_starts_comment() {
        assert_eq!(
            tokenize("settings:retain true // keep sources").unwrap(),
            vec![Token::bare("settings:retain"), Token::bare("true")]
        );
        assert!(tokenize("// just a comment").unwrap().is_empty());
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn double_slash_inside_tokens_is_kept() {
        assert_eq!(
            tokenize("http://example.com/a.zip \"//x\"").unwrap(),
            vec![
                Token::bare("http://example.com/a.zip"),
                Token::quoted("//x"),
            ]
        );
    }

    #[test]
    fn empty_quotes_make_an_empty_token() {
        assert_eq!(
            tokenize("downloads:install \"\"").unwrap(),
            vec![Token::bare("downloads:install"), Token::quoted("")]
        );
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(
            tokenize("books:delete \"Bear").unwrap_err(),
            ScriptError::UnterminatedQuote
        );
    }
}
