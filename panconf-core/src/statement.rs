//! Tokenizer for `set`-style configuration statements.
//!
//! ```text
//! set device-group DG1 address-group web static [ a "b c" ]
//! ```
//!
//! Words are whitespace separated. Double or single quotes group a value that
//! contains spaces, and `[ ... ]` groups a member list. Quotes are removed from
//! the produced tokens. Unterminated quotes or lists run to the end of the line
//! rather than failing: statements that do not make sense are the caller's
//! business to skip.

/// One token of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A bare or quoted word.
    Word(String),
    /// A bracketed member list.
    List(Vec<String>),
}

impl Token {
    /// The word text, if this token is a word.
    pub fn as_word(&self) -> Option<&str> {
        match self {
            Token::Word(word) => Some(word),
            Token::List(_) => None,
        }
    }

    /// Values carried by the token: one for a word, all members for a list.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Token::Word(word) => vec![word.as_str()],
            Token::List(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// Split `line` into words and bracketed lists.
pub fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    let mut list: Option<Vec<String>> = None;

    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        if ch == '[' && list.is_none() {
            chars.next();
            list = Some(Vec::new());
            continue;
        }
        if ch == ']' {
            chars.next();
            if let Some(items) = list.take() {
                tokens.push(Token::List(items));
            }
            continue;
        }

        let word = read_word(&mut chars, list.is_some());
        match list.as_mut() {
            Some(items) => items.push(word),
            None => tokens.push(Token::Word(word)),
        }
    }

    if let Some(items) = list {
        tokens.push(Token::List(items));
    }
    tokens
}

fn read_word(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, in_list: bool) -> String {
    let mut word = String::new();
    let mut quote: Option<char> = None;

    while let Some(&ch) = chars.peek() {
        match quote {
            Some(open) if ch == open => {
                quote = None;
                chars.next();
            }
            Some(_) => {
                word.push(ch);
                chars.next();
            }
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                chars.next();
            }
            None if ch.is_whitespace() => break,
            None if in_list && (ch == ']' || ch == '[') => break,
            None => {
                word.push(ch);
                chars.next();
            }
        }
    }
    word
}

/// Render a name for inclusion in a statement, quoting it when needed.
pub fn quote_token(name: &str) -> String {
    let needs_quotes = name.is_empty()
        || name
            .chars()
            .any(|ch| ch.is_whitespace() || matches!(ch, '[' | ']' | '"' | '\''));
    if !needs_quotes {
        return name.to_string();
    }
    if name.contains('"') {
        format!("'{name}'")
    } else {
        format!("\"{name}\"")
    }
}

/// Render a member list as `[ a b c ]`, or a lone member as a bare word.
pub fn render_list<S: AsRef<str>>(items: &[S]) -> String {
    if items.len() == 1 {
        return quote_token(items[0].as_ref());
    }
    let rendered: Vec<String> = items.iter().map(|item| quote_token(item.as_ref())).collect();
    format!("[ {} ]", rendered.join(" "))
}

#[cfg(test)]
mod tests {
    use super::{quote_token, render_list, tokenize, Token};

    fn word(text: &str) -> Token {
        Token::Word(text.to_string())
    }

    #[test]
    fn splits_words_quotes_and_lists() {
        let tokens = tokenize(r#"set shared address-group web static [ a "b c" d ]"#);
        assert_eq!(
            tokens,
            vec![
                word("set"),
                word("shared"),
                word("address-group"),
                word("web"),
                word("static"),
                Token::List(vec!["a".into(), "b c".into(), "d".into()]),
            ]
        );
    }

    #[test]
    fn lists_without_inner_spaces_still_split() {
        let tokens = tokenize("source [a b]");
        assert_eq!(
            tokens,
            vec![word("source"), Token::List(vec!["a".into(), "b".into()])]
        );
    }

    #[test]
    fn nested_quotes_and_unterminated_input() {
        let tokens = tokenize(r#"dynamic filter "'tag1' and 'tag2'""#);
        assert_eq!(tokens[2], word("'tag1' and 'tag2'"));

        let tokens = tokenize(r#"description "open ended"#);
        assert_eq!(tokens[1], word("open ended"));

        let tokens = tokenize("static [ a b");
        assert_eq!(tokens[1], Token::List(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn quoting_round_trips_through_tokenizer() {
        assert_eq!(quote_token("web"), "web");
        assert_eq!(quote_token("web servers"), "\"web servers\"");
        assert_eq!(render_list(&["a"]), "a");
        assert_eq!(render_list(&["a", "b c"]), "[ a \"b c\" ]");
        assert_eq!(
            tokenize(&render_list(&["a", "b c"])),
            vec![Token::List(vec!["a".into(), "b c".into()])]
        );
    }
}
