use crate::error::{DiagnosticKind, Diagnostics};
use crate::intern::Interner;
use crate::intrinsics::Intrinsic;
use crate::source::{FileId, SourcePos};
use crate::token::{Token, TokenType};

/// Hand-written scanner. Stateless per file; every token records the file,
/// line and column where it starts. Unknown characters are reported and
/// skipped so one run can surface several lexical problems.
pub struct Lexer<'src, 'int> {
    src: &'src str,
    bytes: &'src [u8],
    pos: usize,
    line: u32,
    column: u32,
    file: FileId,
    interner: &'int mut Interner,
}

impl<'src, 'int> Lexer<'src, 'int> {
    pub fn new(src: &'src str, file: FileId, interner: &'int mut Interner) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            file,
            interner,
        }
    }

    pub fn tokenize(mut self, diags: &mut Diagnostics) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia(diags);
            if self.pos >= self.bytes.len() {
                let eof = self.interner.intern("");
                tokens.push(Token::new(
                    TokenType::Eof,
                    eof,
                    self.file,
                    self.line,
                    self.column,
                ));
                return tokens;
            }
            if let Some(token) = self.next_token(diags) {
                tokens.push(token);
            }
        }
    }

    fn peek(&self) -> u8 {
        if self.pos < self.bytes.len() {
            self.bytes[self.pos]
        } else {
            0
        }
    }

    fn peek2(&self) -> u8 {
        if self.pos + 1 < self.bytes.len() {
            self.bytes[self.pos + 1]
        } else {
            0
        }
    }

    fn bump(&mut self) -> u8 {
        let b = self.bytes[self.pos];
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        b
    }

    fn here(&self) -> SourcePos {
        SourcePos::new(self.file, self.line, self.column)
    }

    fn skip_trivia(&mut self, diags: &mut Diagnostics) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'/' if self.peek2() == b'/' => {
                    while self.pos < self.bytes.len() && self.peek() != b'\n' {
                        self.bump();
                    }
                }
                b'/' if self.peek2() == b'*' => {
                    let start = self.here();
                    self.bump();
                    self.bump();
                    let mut closed = false;
                    while self.pos < self.bytes.len() {
                        if self.peek() == b'*' && self.peek2() == b'/' {
                            self.bump();
                            self.bump();
                            closed = true;
                            break;
                        }
                        self.bump();
                    }
                    if !closed {
                        diags.error(DiagnosticKind::UnterminatedComment, start);
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self, diags: &mut Diagnostics) -> Option<Token> {
        let start_pos = self.here();
        let start = self.pos;
        let b = self.peek();

        let kind = match b {
            b'0'..=b'9' => self.lex_number(diags, start),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_word(start),
            b'"' => self.lex_string(diags, start),
            b'\'' => self.lex_char(diags, start),
            _ => self.lex_operator(diags)?,
        };

        let lexeme = self.interner.intern(&self.src[start..self.pos]);
        Some(Token::new(
            kind,
            lexeme,
            start_pos.file,
            start_pos.line,
            start_pos.column,
        ))
    }

    fn lex_number(&mut self, diags: &mut Diagnostics, start: usize) -> TokenType {
        let pos = self.here();
        if self.peek() == b'0' && (self.peek2() == b'x' || self.peek2() == b'X') {
            self.bump();
            self.bump();
            let digits_start = self.pos;
            while self.peek().is_ascii_hexdigit() {
                self.bump();
            }
            if self.pos == digits_start {
                diags.error(
                    DiagnosticKind::MalformedNumber {
                        lexeme: self.src[start..self.pos].to_string(),
                    },
                    pos,
                );
                return TokenType::Integer(0);
            }
            let value = i64::from_str_radix(&self.src[digits_start..self.pos], 16).unwrap_or(0);
            return TokenType::Integer(value);
        }

        while self.peek().is_ascii_digit() {
            self.bump();
        }
        // A float needs a digit on both sides of the dot.
        if self.peek() == b'.' && self.peek2().is_ascii_digit() {
            self.bump();
            while self.peek().is_ascii_digit() {
                self.bump();
            }
            let text = &self.src[start..self.pos];
            return match text.parse::<f64>() {
                Ok(value) => TokenType::Float(value),
                Err(_) => {
                    diags.error(
                        DiagnosticKind::MalformedNumber {
                            lexeme: text.to_string(),
                        },
                        pos,
                    );
                    TokenType::Float(0.0)
                }
            };
        }
        let value = self.src[start..self.pos].parse::<i64>().unwrap_or(0);
        TokenType::Integer(value)
    }

    fn lex_word(&mut self, start: usize) -> TokenType {
        while matches!(self.peek(), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') {
            self.bump();
        }
        let word = &self.src[start..self.pos];
        match word {
            "int" => TokenType::Int,
            "float" => TokenType::FloatType,
            "char" => TokenType::CharType,
            "bool" => TokenType::BoolType,
            "void" => TokenType::Void,
            "Task" => TokenType::TaskType,
            "const" => TokenType::Const,
            "struct" => TokenType::Struct,
            "union" => TokenType::Union,
            "message" => TokenType::Message,
            "import" => TokenType::Import,
            "send" => TokenType::Send,
            "recv" => TokenType::Recv,
            "if" => TokenType::If,
            "else" => TokenType::Else,
            "while" => TokenType::While,
            "for" => TokenType::For,
            "break" => TokenType::Break,
            "continue" => TokenType::Continue,
            "return" => TokenType::Return,
            "true" => TokenType::Bool(true),
            "false" => TokenType::Bool(false),
            _ => match Intrinsic::from_name(word) {
                Some(intrinsic) => TokenType::Intrinsic(intrinsic),
                None => TokenType::Identifier(self.interner.intern(word)),
            },
        }
    }

    fn unescape(&mut self) -> char {
        // Caller saw a backslash; it is already consumed.
        match self.bump() {
            b'n' => '\n',
            b't' => '\t',
            b'r' => '\r',
            b'"' => '"',
            b'\'' => '\'',
            b'\\' => '\\',
            b'0' => '\0',
            other => other as char,
        }
    }

    fn lex_string(&mut self, diags: &mut Diagnostics, _start: usize) -> TokenType {
        let open = self.here();
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            if self.pos >= self.bytes.len() {
                diags.error(DiagnosticKind::UnterminatedString, open);
                break;
            }
            match self.peek() {
                b'"' => {
                    self.bump();
                    break;
                }
                b'\\' => {
                    self.bump();
                    if self.pos >= self.bytes.len() {
                        diags.error(DiagnosticKind::UnterminatedString, open);
                        break;
                    }
                    value.push(self.unescape());
                }
                _ => {
                    let ch_start = self.pos;
                    self.bump();
                    while self.pos < self.bytes.len() && (self.bytes[self.pos] & 0xC0) == 0x80 {
                        self.pos += 1;
                        self.column += 1;
                    }
                    value.push_str(&self.src[ch_start..self.pos]);
                }
            }
        }
        TokenType::Str(self.interner.intern(&value))
    }

    fn lex_char(&mut self, diags: &mut Diagnostics, _start: usize) -> TokenType {
        let open = self.here();
        self.bump(); // opening quote
        let value = match self.peek() {
            0 | b'\'' => {
                diags.error(DiagnosticKind::UnterminatedChar, open);
                if self.peek() == b'\'' {
                    self.bump();
                }
                return TokenType::CharLit('\0');
            }
            b'\\' => {
                self.bump();
                if self.pos >= self.bytes.len() {
                    diags.error(DiagnosticKind::UnterminatedChar, open);
                    return TokenType::CharLit('\0');
                }
                self.unescape()
            }
            _ => self.bump() as char,
        };
        if self.peek() == b'\'' {
            self.bump();
        } else {
            diags.error(DiagnosticKind::UnterminatedChar, open);
        }
        TokenType::CharLit(value)
    }

    fn lex_operator(&mut self, diags: &mut Diagnostics) -> Option<TokenType> {
        let pos = self.here();
        let b = self.bump();
        let two = |lexer: &mut Self, kind| {
            lexer.bump();
            kind
        };
        let kind = match (b, self.peek()) {
            (b'+', b'+') => two(self, TokenType::Increment),
            (b'+', b'=') => two(self, TokenType::PlusAssign),
            (b'+', _) => TokenType::Plus,
            (b'-', b'-') => two(self, TokenType::Decrement),
            (b'-', b'=') => two(self, TokenType::MinusAssign),
            (b'-', b'>') => two(self, TokenType::Arrow),
            (b'-', _) => TokenType::Minus,
            (b'*', b'=') => two(self, TokenType::StarAssign),
            (b'*', _) => TokenType::Star,
            (b'/', b'=') => two(self, TokenType::SlashAssign),
            (b'/', _) => TokenType::Slash,
            (b'%', _) => TokenType::Percent,
            (b'=', b'=') => two(self, TokenType::EqEq),
            (b'=', _) => TokenType::Assign,
            (b'!', b'=') => two(self, TokenType::NotEq),
            (b'!', _) => TokenType::Not,
            (b'<', b'=') => two(self, TokenType::LtEq),
            (b'<', b'<') => two(self, TokenType::Shl),
            (b'<', _) => TokenType::Lt,
            (b'>', b'=') => two(self, TokenType::GtEq),
            (b'>', b'>') => two(self, TokenType::Shr),
            (b'>', _) => TokenType::Gt,
            (b'&', b'&') => two(self, TokenType::AndAnd),
            (b'&', _) => TokenType::Amp,
            (b'|', b'|') => two(self, TokenType::OrOr),
            (b'|', _) => TokenType::Pipe,
            (b'^', _) => TokenType::Caret,
            (b'~', _) => TokenType::Tilde,
            (b';', _) => TokenType::Semicolon,
            (b',', _) => TokenType::Comma,
            (b'.', _) => TokenType::Dot,
            (b':', _) => TokenType::Colon,
            (b'(', _) => TokenType::LParen,
            (b')', _) => TokenType::RParen,
            (b'{', _) => TokenType::LBrace,
            (b'}', _) => TokenType::RBrace,
            (b'[', _) => TokenType::LBracket,
            (b']', _) => TokenType::RBracket,
            _ => {
                diags.error(DiagnosticKind::UnknownCharacter { ch: b as char }, pos);
                return None;
            }
        };
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> (Vec<Token>, Interner, Diagnostics) {
        let mut interner = Interner::new();
        let mut diags = Diagnostics::new();
        let tokens = Lexer::new(src, FileId::default(), &mut interner).tokenize(&mut diags);
        (tokens, interner, diags)
    }

    fn kinds(src: &str) -> Vec<TokenType> {
        lex(src).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn basic_function_tokens() {
        let kinds = kinds("int main() { return 0; }");
        assert!(matches!(kinds[0], TokenType::Int));
        assert!(matches!(kinds[1], TokenType::Identifier(_)));
        assert_eq!(kinds[2], TokenType::LParen);
        assert_eq!(kinds[3], TokenType::RParen);
        assert_eq!(kinds[4], TokenType::LBrace);
        assert_eq!(kinds[5], TokenType::Return);
        assert_eq!(kinds[6], TokenType::Integer(0));
        assert_eq!(kinds[7], TokenType::Semicolon);
        assert_eq!(kinds[8], TokenType::RBrace);
        assert_eq!(kinds[9], TokenType::Eof);
    }

    #[test]
    fn hardware_names_lex_as_intrinsics() {
        let kinds = kinds("HW_GPIO_SET(25, 1);");
        assert_eq!(kinds[0], TokenType::Intrinsic(Intrinsic::HwGpioSet));
        assert_eq!(kinds[2], TokenType::Integer(25));
    }

    #[test]
    fn hex_literals_carry_their_value() {
        let kinds = kinds("0xFF 0x10");
        assert_eq!(kinds[0], TokenType::Integer(255));
        assert_eq!(kinds[1], TokenType::Integer(16));
    }

    #[test]
    fn boolean_literals_lex_to_bool_tokens() {
        let kinds = kinds("true false");
        assert_eq!(kinds[0], TokenType::Bool(true));
        assert_eq!(kinds[1], TokenType::Bool(false));
    }

    #[test]
    fn float_requires_digits_on_both_sides() {
        let kinds = kinds("3.14 2. .5");
        assert_eq!(kinds[0], TokenType::Float(3.14));
        // "2." is an integer followed by a dot, ".5" a dot then an integer.
        assert_eq!(kinds[1], TokenType::Integer(2));
        assert_eq!(kinds[2], TokenType::Dot);
        assert_eq!(kinds[3], TokenType::Dot);
        assert_eq!(kinds[4], TokenType::Integer(5));
    }

    #[test]
    fn string_escapes_are_decoded() {
        let (tokens, interner, diags) = lex(r#""line\n\ttab \"q\" \\""#);
        assert!(!diags.has_errors());
        match tokens[0].kind {
            TokenType::Str(sym) => {
                assert_eq!(interner.resolve(sym), "line\n\ttab \"q\" \\");
            }
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn char_literals_support_escapes() {
        let kinds = kinds(r"'A' '\n' '\\'");
        assert_eq!(kinds[0], TokenType::CharLit('A'));
        assert_eq!(kinds[1], TokenType::CharLit('\n'));
        assert_eq!(kinds[2], TokenType::CharLit('\\'));
    }

    #[test]
    fn comments_are_skipped_and_lines_counted() {
        let (tokens, _, diags) = lex("// first\n/* two\nlines */ int x;");
        assert!(!diags.has_errors());
        assert!(matches!(tokens[0].kind, TokenType::Int));
        assert_eq!(tokens[0].line, 3);
    }

    #[test]
    fn compound_operators_lex_as_single_tokens() {
        let kinds = kinds("== != <= >= && || << >> -> ++ -- += -= *= /=");
        let expected = [
            TokenType::EqEq,
            TokenType::NotEq,
            TokenType::LtEq,
            TokenType::GtEq,
            TokenType::AndAnd,
            TokenType::OrOr,
            TokenType::Shl,
            TokenType::Shr,
            TokenType::Arrow,
            TokenType::Increment,
            TokenType::Decrement,
            TokenType::PlusAssign,
            TokenType::MinusAssign,
            TokenType::StarAssign,
            TokenType::SlashAssign,
        ];
        assert_eq!(&kinds[..expected.len()], &expected);
    }

    #[test]
    fn unknown_character_is_reported_and_skipped() {
        let (tokens, _, diags) = lex("int @ x;");
        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);
        // The @ is skipped; lexing continues.
        assert!(matches!(tokens[1].kind, TokenType::Identifier(_)));
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        let (_, _, diags) = lex("/* never closed");
        assert!(diags.has_errors());
    }

    #[test]
    fn positions_are_one_based_and_accurate() {
        let (tokens, _, _) = lex("int x;\n  x = 1;");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 5));
        // 'x' on line 2 after two spaces
        assert_eq!((tokens[3].line, tokens[3].column), (2, 3));
    }

    #[test]
    fn lexing_twice_yields_identical_streams() {
        let src = "message<int> Q;\nvoid t() { int v = Q.recv(timeout: 100); Q.send(v + 1); }";
        let a = kinds(src);
        let b = kinds(src);
        assert_eq!(a, b);
    }

    #[test]
    fn import_statement_tokens() {
        let kinds = kinds("import \"util.rtmc\";");
        assert_eq!(kinds[0], TokenType::Import);
        assert!(matches!(kinds[1], TokenType::Str(_)));
        assert_eq!(kinds[2], TokenType::Semicolon);
    }

    #[test]
    fn task_keyword_is_case_sensitive() {
        let kinds = kinds("Task task");
        assert_eq!(kinds[0], TokenType::TaskType);
        assert!(matches!(kinds[1], TokenType::Identifier(_)));
    }
}
