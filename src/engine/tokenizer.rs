//! Command-text tokenizer
//!
//! Splits a raw command or message string into literal text, environment
//! variable references (`$NAME`, `${NAME}`) and scoped property references
//! (`${{ name }}`) while honoring `\$` escapes. Concatenating the `raw`
//! fields of the returned tokens always reproduces the input exactly.

use crate::error::EngineError;
use std::collections::HashMap;
use std::collections::VecDeque;

/// Kind of a scanned token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Literal text, passed through unchanged
    Text,
    /// `$NAME` or `${NAME}` environment variable reference
    EnvironmentVariable,
    /// `${{ name }}` scoped property reference
    Property,
}

/// A single token scanned from a command string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// The exact source substring (needed for faithful re-escaping)
    pub raw: String,
    /// The extracted name for non-text kinds; equal to `raw` for text
    pub value: String,
    /// Character offset of the token start in the input
    pub position: usize,
}

impl Token {
    fn text(raw: String, position: usize) -> Self {
        Token {
            kind: TokenKind::Text,
            value: raw.clone(),
            raw,
            position,
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_identifier_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

fn is_property_edge_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

fn is_property_interior_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/' | '#')
}

/// Check a property name against the property-name grammar
///
/// Single character names must be alphanumeric; longer names must start and
/// end with an alphanumeric or underscore, with `_ . - / #` allowed in the
/// interior.
pub fn is_valid_property(name: &str) -> bool {
    let chars: Vec<char> = name.chars().collect();
    match chars.len() {
        0 => false,
        1 => chars[0].is_ascii_alphanumeric(),
        2 => is_property_edge_char(chars[0]) && is_property_edge_char(chars[1]),
        n => {
            is_property_edge_char(chars[0])
                && is_property_edge_char(chars[n - 1])
                && chars[1..n - 1].iter().all(|c| is_property_interior_char(*c))
        }
    }
}

/// Tokenize a command string
///
/// Returns a syntax error only for an opened `${{` that is never closed;
/// every other input tokenizes totally, with malformed reference shapes
/// degrading to literal text.
pub fn tokenize(input: &str) -> Result<Vec<Token>, EngineError> {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut tokens: Vec<Token> = Vec::new();
    let mut text = String::new();
    let mut text_start = 0usize;
    let mut i = 0usize;

    macro_rules! flush_text {
        () => {
            if !text.is_empty() {
                tokens.push(Token::text(std::mem::take(&mut text), text_start));
            }
        };
    }

    while i < len {
        let c = chars[i];

        if text.is_empty() {
            text_start = i;
        }

        // \$ keeps the following reference literal; the escape survives
        // tokenization and is unwound once at the end of resolution
        if c == '\\' && i + 1 < len && chars[i + 1] == '$' {
            text.push('\\');
            text.push('$');
            i += 2;
            while i < len && chars[i] != '$' && chars[i] != '\\' {
                text.push(chars[i]);
                i += 1;
            }
            continue;
        }

        if c == '$' && i + 2 < len && chars[i + 1] == '{' && chars[i + 2] == '{' {
            // Property reference attempt: scan to the first closing brace
            let start = i;
            let mut j = i + 3;
            while j < len && chars[j] != '}' {
                j += 1;
            }
            if j >= len {
                return Err(EngineError::syntax(input, start));
            }
            if j + 1 < len && chars[j + 1] == '}' {
                let raw: String = chars[start..=j + 1].iter().collect();
                let inner: String = chars[start + 3..j].iter().collect();
                let name = inner.trim();
                if !name.is_empty() && is_valid_property(name) {
                    flush_text!();
                    tokens.push(Token {
                        kind: TokenKind::Property,
                        value: name.to_string(),
                        raw,
                        position: start,
                    });
                } else {
                    text.push_str(&raw);
                }
                i = j + 2;
            } else {
                // Single closing brace; the captured span is literal text
                let raw: String = chars[start..=j].iter().collect();
                text.push_str(&raw);
                i = j + 1;
            }
            continue;
        }

        if c == '$' && i + 1 < len && chars[i + 1] == '{' {
            // Braced environment variable: ${NAME}
            let mut j = i + 2;
            if j < len && is_identifier_start(chars[j]) {
                j += 1;
                while j < len && is_identifier_char(chars[j]) {
                    j += 1;
                }
                if j < len && chars[j] == '}' {
                    let raw: String = chars[i..=j].iter().collect();
                    let value: String = chars[i + 2..j].iter().collect();
                    flush_text!();
                    tokens.push(Token {
                        kind: TokenKind::EnvironmentVariable,
                        value,
                        raw,
                        position: i,
                    });
                    i = j + 1;
                    continue;
                }
            }
            text.push('$');
            i += 1;
            continue;
        }

        if c == '$' && i + 1 < len && is_identifier_start(chars[i + 1]) {
            // Unbraced environment variable: consume the maximal identifier
            let mut j = i + 2;
            while j < len && is_identifier_char(chars[j]) {
                j += 1;
            }
            let raw: String = chars[i..j].iter().collect();
            let value: String = chars[i + 1..j].iter().collect();
            flush_text!();
            tokens.push(Token {
                kind: TokenKind::EnvironmentVariable,
                value,
                raw,
                position: i,
            });
            i = j;
            continue;
        }

        // Literal text up to the next escape or reference start
        text.push(c);
        i += 1;
        while i < len && chars[i] != '\\' && chars[i] != '$' {
            text.push(chars[i]);
            i += 1;
        }
    }

    if !text.is_empty() {
        tokens.push(Token::text(text, text_start));
    }

    Ok(tokens)
}

/// Bounded memo cache for tokenization results
///
/// The same command template is re-tokenized on every resolution pass and on
/// every repeated execution, so results are cached by input string with an
/// explicit capacity. Constructed once per engine, never ambient.
#[derive(Debug)]
pub struct TokenCache {
    capacity: usize,
    entries: HashMap<String, Vec<Token>>,
    order: VecDeque<String>,
}

impl TokenCache {
    pub fn new(capacity: usize) -> Self {
        TokenCache {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Tokenize through the cache
    pub fn tokenize(&mut self, input: &str) -> Result<Vec<Token>, EngineError> {
        if let Some(tokens) = self.entries.get(input) {
            let tokens = tokens.clone();
            self.touch(input);
            return Ok(tokens);
        }

        let tokens = tokenize(input)?;

        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(input.to_string(), tokens.clone());
        self.order.push_back(input.to_string());

        Ok(tokens)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, input: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == input) {
            let key = self.order.remove(pos).unwrap();
            self.order.push_back(key);
        }
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        TokenCache::new(256)
    }
}

/// Split a directive argument string on whitespace, respecting single and
/// double quotes and backslash escapes
pub fn split_quoted(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut escape = false;

    for c in input.chars() {
        if escape {
            current.push(c);
            escape = false;
        } else if c == '\\' {
            escape = true;
        } else if c == '\'' && !in_double {
            in_single = !in_single;
        } else if c == '"' && !in_single {
            in_double = !in_double;
        } else if c.is_whitespace() && !in_single && !in_double {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_concat(tokens: &[Token]) -> String {
        tokens.iter().map(|t| t.raw.as_str()).collect()
    }

    #[test]
    fn test_plain_text_single_token() {
        let tokens = tokenize("echo hello world").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].raw, "echo hello world");
        assert_eq!(tokens[0].position, 0);
    }

    #[test]
    fn test_property_token() {
        let tokens = tokenize("echo ${{ property.1 }}").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[1].kind, TokenKind::Property);
        assert_eq!(tokens[1].raw, "${{ property.1 }}");
        assert_eq!(tokens[1].value, "property.1");
        assert_eq!(tokens[1].position, 5);
    }

    #[test]
    fn test_property_without_padding() {
        let tokens = tokenize("${{version}}").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Property);
        assert_eq!(tokens[0].value, "version");
    }

    #[test]
    fn test_environment_variable_unbraced() {
        let tokens = tokenize("echo $HOME/bin").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].kind, TokenKind::EnvironmentVariable);
        assert_eq!(tokens[1].raw, "$HOME");
        assert_eq!(tokens[1].value, "HOME");
        assert_eq!(tokens[2].raw, "/bin");
    }

    #[test]
    fn test_environment_variable_braced() {
        let tokens = tokenize("echo ${HOME}x").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].kind, TokenKind::EnvironmentVariable);
        assert_eq!(tokens[1].raw, "${HOME}");
        assert_eq!(tokens[1].value, "HOME");
        assert_eq!(tokens[2].raw, "x");
    }

    #[test]
    fn test_escaped_property_is_text() {
        let tokens = tokenize("echo \\${{ name }}").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].raw, "echo \\${{ name }}");
    }

    #[test]
    fn test_dollar_without_identifier_is_text() {
        let tokens = tokenize("cost is $5").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].raw, "cost is $5");
    }

    #[test]
    fn test_subshell_passes_through() {
        let tokens = tokenize("$(basename $PWD)").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].raw, "$(basename ");
        assert_eq!(tokens[1].kind, TokenKind::EnvironmentVariable);
        assert_eq!(tokens[1].value, "PWD");
        assert_eq!(tokens[2].raw, ")");
    }

    #[test]
    fn test_empty_property_body_is_text() {
        let tokens = tokenize("${{ }}").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].raw, "${{ }}");
    }

    #[test]
    fn test_invalid_property_name_is_text() {
        let tokens = tokenize("${{ .bad. }}").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Text);
    }

    #[test]
    fn test_single_closing_brace_is_text() {
        let tokens = tokenize("${{ name } rest").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].raw, "${{ name } rest");
    }

    #[test]
    fn test_unterminated_property_is_syntax_error() {
        let result = tokenize("echo ${{ name ");
        assert!(matches!(
            result,
            Err(EngineError::Syntax { position: 5, .. })
        ));
    }

    #[test]
    fn test_adjacent_text_spans_merge() {
        // A lone backslash and surrounding text come back as one token
        let tokens = tokenize("a\\b c").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].raw, "a\\b c");
    }

    #[test]
    fn test_round_trip_raw_reproduces_input() {
        let inputs = [
            "echo hello",
            "echo ${{ a.b }} $HOME ${USER} \\${{ kept }} $(pwd) $5",
            "${{x}}${{y}}",
            "tail $_private ${_X1}",
            "${{ a } ${{ b }}",
        ];
        for input in inputs {
            let tokens = tokenize(input).unwrap();
            assert_eq!(raw_concat(&tokens), input, "round trip for {input:?}");
        }
    }

    #[test]
    fn test_is_valid_property() {
        assert!(is_valid_property("a"));
        assert!(is_valid_property("1"));
        assert!(is_valid_property("ab"));
        assert!(is_valid_property("_a"));
        assert!(is_valid_property("hello-world-pipeline.job.property.1"));
        assert!(is_valid_property("a/b#c"));

        assert!(!is_valid_property(""));
        assert!(!is_valid_property("_"));
        assert!(!is_valid_property("-ab"));
        assert!(!is_valid_property("ab-"));
        assert!(!is_valid_property("a b"));
        assert!(!is_valid_property(".a."));
    }

    #[test]
    fn test_token_cache_bounded() {
        let mut cache = TokenCache::new(2);
        cache.tokenize("a").unwrap();
        cache.tokenize("b").unwrap();
        cache.tokenize("c").unwrap();
        assert_eq!(cache.len(), 2);

        // Cached result matches a fresh scan
        let cached = cache.tokenize("c").unwrap();
        assert_eq!(cached, tokenize("c").unwrap());
    }

    #[test]
    fn test_split_quoted() {
        assert_eq!(
            split_quoted("file.txt abc123"),
            vec!["file.txt".to_string(), "abc123".to_string()]
        );
        assert_eq!(
            split_quoted("\"my file.txt\" 'single quoted' plain"),
            vec![
                "my file.txt".to_string(),
                "single quoted".to_string(),
                "plain".to_string()
            ]
        );
        assert_eq!(
            split_quoted("escaped\\ space"),
            vec!["escaped space".to_string()]
        );
        assert!(split_quoted("   ").is_empty());
    }
}
