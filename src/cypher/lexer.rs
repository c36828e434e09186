use std::iter::Peekable;
use std::str::CharIndices;

use crate::errors::GraphError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Keywords
    Match,
    Create,
    Return,
    Where,
    As,
    And,
    Or,
    Not,

    // Symbols
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Colon,
    Semicolon,
    Comma,
    Dot,
    Pipe,
    Asterisk,

    // Relationships
    LeftArrow,
    RightArrow,
    Dash,

    // Operators
    Equals,
    NotEquals,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Literals
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,

    Identifier(String),
    Eof,
}

impl TokenType {
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenType::Match
                | TokenType::Create
                | TokenType::Return
                | TokenType::Where
                | TokenType::As
                | TokenType::And
                | TokenType::Or
                | TokenType::Not
                | TokenType::Boolean(_)
                | TokenType::Null
        )
    }
}

/// A token and the byte range of its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub start: usize,
    pub end: usize,
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, GraphError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        tokens.push(Token {
            token_type: TokenType::Eof,
            start: self.input.len(),
            end: self.input.len(),
        });
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Token>, GraphError> {
        loop {
            self.skip_whitespace();
            let Some(&(start, char)) = self.chars.peek() else {
                return Ok(None);
            };
            if char == '/' && self.input[start..].starts_with("//") {
                self.skip_line_comment();
                continue;
            }
            self.chars.next();

            let token_type = match char {
                '\'' | '"' => self.read_string(char, start)?,
                '`' => self.read_quoted_identifier(start)?,
                c if c.is_ascii_digit() => self.read_number(start)?,
                c if c.is_alphabetic() || c == '_' => self.read_identifier(start),
                '(' => TokenType::LeftParen,
                ')' => TokenType::RightParen,
                '[' => TokenType::LeftBracket,
                ']' => TokenType::RightBracket,
                '{' => TokenType::LeftBrace,
                '}' => TokenType::RightBrace,
                ':' => TokenType::Colon,
                ';' => TokenType::Semicolon,
                ',' => TokenType::Comma,
                '.' => TokenType::Dot,
                '|' => TokenType::Pipe,
                '*' => TokenType::Asterisk,
                '=' => TokenType::Equals,
                '-' => {
                    if self.eat('>') {
                        TokenType::RightArrow
                    } else {
                        TokenType::Dash
                    }
                }
                '<' => {
                    if self.eat('-') {
                        TokenType::LeftArrow
                    } else if self.eat('=') {
                        TokenType::LessEqual
                    } else if self.eat('>') {
                        TokenType::NotEquals
                    } else {
                        TokenType::LessThan
                    }
                }
                '>' => {
                    if self.eat('=') {
                        TokenType::GreaterEqual
                    } else {
                        TokenType::GreaterThan
                    }
                }
                '!' if self.eat('=') => TokenType::NotEquals,
                other => {
                    return Err(GraphError::compile(format!(
                        "unexpected character '{other}' at offset {start}"
                    )));
                }
            };

            return Ok(Some(Token {
                token_type,
                start,
                end: self.offset(),
            }));
        }
    }

    fn offset(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(index, _)| index)
            .unwrap_or(self.input.len())
    }

    fn eat(&mut self, expected: char) -> bool {
        if let Some(&(_, char)) = self.chars.peek() {
            if char == expected {
                self.chars.next();
                return true;
            }
        }
        false
    }

    fn skip_whitespace(&mut self) {
        while let Some(&(_, char)) = self.chars.peek() {
            if !char.is_whitespace() {
                break;
            }
            self.chars.next();
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(&(_, char)) = self.chars.peek() {
            if char == '\n' {
                break;
            }
            self.chars.next();
        }
    }

    fn read_string(&mut self, quote: char, start: usize) -> Result<TokenType, GraphError> {
        let mut value = String::new();
        loop {
            let Some((_, char)) = self.chars.next() else {
                return Err(GraphError::compile(format!(
                    "unterminated string literal at offset {start}"
                )));
            };
            match char {
                c if c == quote => return Ok(TokenType::String(value)),
                '\\' => {
                    let escaped = match self.chars.next() {
                        Some((_, 'n')) => '\n',
                        Some((_, 't')) => '\t',
                        Some((_, 'r')) => '\r',
                        Some((_, c @ ('\\' | '\'' | '"'))) => c,
                        Some((_, other)) => {
                            return Err(GraphError::compile(format!(
                                "unknown escape sequence '\\{other}' at offset {start}"
                            )));
                        }
                        None => {
                            return Err(GraphError::compile(format!(
                                "unterminated string literal at offset {start}"
                            )));
                        }
                    };
                    value.push(escaped);
                }
                c => value.push(c),
            }
        }
    }

    fn read_quoted_identifier(&mut self, start: usize) -> Result<TokenType, GraphError> {
        let mut value = String::new();
        for (_, char) in self.chars.by_ref() {
            if char == '`' {
                return Ok(TokenType::Identifier(value));
            }
            value.push(char);
        }
        Err(GraphError::compile(format!(
            "unterminated quoted identifier at offset {start}"
        )))
    }

    fn read_number(&mut self, start: usize) -> Result<TokenType, GraphError> {
        self.take_digits();
        let mut is_float = false;
        if self.peek_is('.') && self.peek_second_is_digit() {
            self.chars.next();
            self.take_digits();
            is_float = true;
        }
        if self.peek_is('e') || self.peek_is('E') {
            is_float = true;
            self.chars.next();
            if self.peek_is('-') || self.peek_is('+') {
                self.chars.next();
            }
            self.take_digits();
        }
        let end = self.offset();
        let text = &self.input[start..end];
        if is_float {
            text.parse::<f64>()
                .map(TokenType::Float)
                .map_err(|_| GraphError::compile(format!("invalid number literal '{text}'")))
        } else {
            text.parse::<i64>()
                .map(TokenType::Integer)
                .map_err(|_| GraphError::compile(format!("integer literal '{text}' is too large")))
        }
    }

    fn take_digits(&mut self) {
        while let Some(&(_, char)) = self.chars.peek() {
            if !char.is_ascii_digit() {
                break;
            }
            self.chars.next();
        }
    }

    fn peek_is(&mut self, expected: char) -> bool {
        matches!(self.chars.peek(), Some(&(_, c)) if c == expected)
    }

    fn peek_second_is_digit(&self) -> bool {
        let mut ahead = self.chars.clone();
        ahead.next();
        matches!(ahead.peek(), Some(&(_, c)) if c.is_ascii_digit())
    }

    fn read_identifier(&mut self, start: usize) -> TokenType {
        while let Some(&(_, char)) = self.chars.peek() {
            if !(char.is_alphanumeric() || char == '_') {
                break;
            }
            self.chars.next();
        }
        let end = self.offset();
        let value = &self.input[start..end];
        match value.to_ascii_uppercase().as_str() {
            "MATCH" => TokenType::Match,
            "CREATE" => TokenType::Create,
            "RETURN" => TokenType::Return,
            "WHERE" => TokenType::Where,
            "AS" => TokenType::As,
            "AND" => TokenType::And,
            "OR" => TokenType::Or,
            "NOT" => TokenType::Not,
            "TRUE" => TokenType::Boolean(true),
            "FALSE" => TokenType::Boolean(false),
            "NULL" => TokenType::Null,
            _ => TokenType::Identifier(value.to_string()),
        }
    }
}

/// Splits a script into statements at top-level `;`, ignoring those inside
/// strings and comments. Empty statements are dropped.
pub fn split_statements(script: &str) -> Result<Vec<&str>, GraphError> {
    let tokens = Lexer::new(script).tokenize()?;
    let mut statements = Vec::new();
    let mut begin: Option<usize> = None;
    let mut last_end = 0;
    for token in &tokens {
        match token.token_type {
            TokenType::Semicolon | TokenType::Eof => {
                if let Some(start) = begin.take() {
                    statements.push(script[start..last_end].trim());
                }
            }
            _ => {
                begin.get_or_insert(token.start);
                last_end = token.end;
            }
        }
    }
    Ok(statements)
}
