//! Tokenizer for sandbox expressions.

use super::SandboxError;

/// Piece of a backtick template literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
    Text(String),
    /// Source text of a `${...}` hole, parsed later
    Expr(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Template(Vec<TemplateChunk>),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    QuestionDot,
    Question,
    QuestionQuestion,
    Colon,
    Arrow,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,
    AndAnd,
    OrOr,
    Semicolon,
    Eof,
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, SandboxError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(i, _)| *i)
            .unwrap_or(self.src.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> SandboxError {
        SandboxError::Syntax(format!("{} at offset {}", message.into(), self.offset()))
    }

    fn run(mut self) -> Result<Vec<Spanned>, SandboxError> {
        let mut tokens = Vec::new();
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.pos += 1;
            }
            let offset = self.offset();
            let Some(c) = self.peek() else {
                tokens.push(Spanned {
                    token: Token::Eof,
                    offset,
                });
                return Ok(tokens);
            };

            let token = match c {
                '0'..='9' => self.number()?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                '"' | '\'' => self.string(c)?,
                '`' => self.template()?,
                c if is_ident_start(c) => self.ident(),
                _ => self.punct()?,
            };
            tokens.push(Spanned { token, offset });
        }
    }

    fn number(&mut self) -> Result<Token, SandboxError> {
        let start = self.offset();
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.pos += 2;
            let digits_start = self.offset();
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits = &self.src[digits_start..self.offset()];
            return i64::from_str_radix(digits, 16)
                .map(|n| Token::Number(n as f64))
                .map_err(|_| self.error("Invalid hex literal"));
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        } else if self.peek() == Some('.')
            && !self.peek_at(1).is_some_and(|c| is_ident_start(c) || c == '.')
        {
            // Trailing dot: `1.`
            self.pos += 1;
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.pos += 1;
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = save;
            }
        }
        let text = &self.src[start..self.offset()];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error(format!("Invalid number '{}'", text)))
    }

    fn escape(&mut self, out: &mut String) -> Result<(), SandboxError> {
        let Some(c) = self.bump() else {
            return Err(self.error("Unterminated escape"));
        };
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            'u' => {
                let mut hex = String::new();
                if self.eat('{') {
                    while let Some(h) = self.bump() {
                        if h == '}' {
                            break;
                        }
                        hex.push(h);
                    }
                } else {
                    for _ in 0..4 {
                        hex.push(self.bump().ok_or_else(|| self.error("Bad unicode escape"))?);
                    }
                }
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| self.error("Bad unicode escape"))?;
                out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
            }
            other => out.push(other),
        }
        Ok(())
    }

    fn string(&mut self, quote: char) -> Result<Token, SandboxError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("Unterminated string")),
                Some(c) if c == quote => return Ok(Token::Str(out)),
                Some('\\') => self.escape(&mut out)?,
                Some(c) => out.push(c),
            }
        }
    }

    fn template(&mut self) -> Result<Token, SandboxError> {
        self.pos += 1;
        let mut chunks = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("Unterminated template literal")),
                Some('`') => break,
                Some('\\') => self.escape(&mut text)?,
                Some('$') if self.peek() == Some('{') => {
                    self.pos += 1;
                    if !text.is_empty() {
                        chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
                    }
                    let start = self.offset();
                    let mut depth = 0usize;
                    loop {
                        match self.peek() {
                            None => return Err(self.error("Unterminated template hole")),
                            Some('{') => depth += 1,
                            Some('}') if depth == 0 => break,
                            Some('}') => depth -= 1,
                            _ => {}
                        }
                        self.pos += 1;
                    }
                    let inner = self.src[start..self.offset()].to_string();
                    self.pos += 1;
                    chunks.push(TemplateChunk::Expr(inner));
                }
                Some(c) => text.push(c),
            }
        }
        if !text.is_empty() {
            chunks.push(TemplateChunk::Text(text));
        }
        Ok(Token::Template(chunks))
    }

    fn ident(&mut self) -> Token {
        let start = self.offset();
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        Token::Ident(self.src[start..self.offset()].to_string())
    }

    fn punct(&mut self) -> Result<Token, SandboxError> {
        let c = self.bump().ok_or_else(|| self.error("Unexpected end"))?;
        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            ':' => Token::Colon,
            ';' => Token::Semicolon,
            '.' => Token::Dot,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '*' => {
                if self.eat('*') {
                    Token::StarStar
                } else {
                    Token::Star
                }
            }
            '?' => {
                if self.eat('?') {
                    Token::QuestionQuestion
                } else if self.peek() == Some('.')
                    && !self.peek_at(1).is_some_and(|d| d.is_ascii_digit())
                {
                    self.pos += 1;
                    Token::QuestionDot
                } else {
                    Token::Question
                }
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Token::NotEqEq
                    } else {
                        Token::NotEq
                    }
                } else {
                    Token::Bang
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Token::EqEqEq
                    } else {
                        Token::EqEq
                    }
                } else if self.eat('>') {
                    Token::Arrow
                } else {
                    // Assignment is not part of the grammar
                    return Err(self.error("Assignment is not allowed"));
                }
            }
            '<' => {
                if self.eat('=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '&' if self.eat('&') => Token::AndAnd,
            '|' if self.eat('|') => Token::OrOr,
            other => return Err(self.error(format!("Unexpected character '{}'", other))),
        };
        Ok(token)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a?.b ?? c === d"),
            vec![
                Token::Ident("a".into()),
                Token::QuestionDot,
                Token::Ident("b".into()),
                Token::QuestionQuestion,
                Token::Ident("c".into()),
                Token::EqEqEq,
                Token::Ident("d".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_ternary_with_decimal_is_not_optional_chain() {
        assert_eq!(
            kinds("x?.5:1"),
            vec![
                Token::Ident("x".into()),
                Token::Question,
                Token::Number(0.5),
                Token::Colon,
                Token::Number(1.0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("1.5e2")[0], Token::Number(150.0));
        assert_eq!(kinds(".25")[0], Token::Number(0.25));
        assert_eq!(kinds("0xff")[0], Token::Number(255.0));
    }

    #[test]
    fn test_number_followed_by_method() {
        assert_eq!(
            kinds("1.5.toFixed"),
            vec![
                Token::Number(1.5),
                Token::Dot,
                Token::Ident("toFixed".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(kinds(r#""a\"b\n""#)[0], Token::Str("a\"b\n".into()));
        assert_eq!(kinds("'\\u0041'")[0], Token::Str("A".into()));
    }

    #[test]
    fn test_template_literal() {
        assert_eq!(
            kinds("`Hi ${name}!`")[0],
            Token::Template(vec![
                TemplateChunk::Text("Hi ".into()),
                TemplateChunk::Expr("name".into()),
                TemplateChunk::Text("!".into()),
            ])
        );
    }

    #[test]
    fn test_assignment_rejected() {
        assert!(tokenize("a = 1").is_err());
        assert!(tokenize("'unterminated").is_err());
    }
}
