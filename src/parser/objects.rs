//! Recursive-descent parsing of [`Token`] streams into [`Object`] values,
//! including the `N G obj ... endobj` indirect-object wrapper and inline
//! stream bodies.

use super::lexer::{Lexer, Token};
use crate::object::{Dictionary, Name, Object, PdfString};

pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    warnings: Vec<String>,
}

impl<'a> ObjectParser<'a> {
    pub fn new(bytes: &'a [u8], pos: usize) -> Self {
        ObjectParser { lexer: Lexer::at(bytes, pos), warnings: Vec::new() }
    }

    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Parses `N G obj <value> [stream ... endstream] endobj`, returning the
    /// object id and value. Lenient: a missing `endobj` is tolerated.
    pub fn parse_indirect_object(&mut self) -> Option<((u32, u16), Object)> {
        let num = match self.lexer.next_token()? {
            Token::Integer(n) if n >= 0 => n as u32,
            _ => return None,
        };
        let gen = match self.lexer.next_token()? {
            Token::Integer(n) if n >= 0 => n as u16,
            _ => return None,
        };
        match self.lexer.next_token()? {
            Token::Keyword(kw) if kw == b"obj" => {}
            _ => return None,
        }
        let value = self.parse_value()?;
        let value = self.maybe_attach_stream(value);
        self.expect_keyword(b"endobj");
        Some(((num, gen), value))
    }

    fn expect_keyword(&mut self, expected: &[u8]) {
        let save = self.lexer.position();
        match self.lexer.next_token() {
            Some(Token::Keyword(ref kw)) if kw == expected => {}
            _ => {
                self.warnings.push(format!(
                    "expected keyword {:?} at offset {}",
                    String::from_utf8_lossy(expected),
                    save
                ));
                self.lexer.seek(save);
            }
        }
    }

    fn maybe_attach_stream(&mut self, value: Object) -> Object {
        let save = self.lexer.position();
        match self.lexer.next_token() {
            Some(Token::Keyword(ref kw)) if kw == b"stream" => {
                let Object::Dictionary(dict) = value else {
                    self.lexer.seek(save);
                    return value;
                };
                self.lexer.skip_eol_after_stream_keyword();
                let declared_length =
                    dict.get("Length").and_then(Object::as_integer).unwrap_or(-1);
                let data_start = self.lexer.position();
                let bytes = self.lexer.bytes();

                let data_end = if declared_length >= 0
                    && bytes.len() >= data_start + declared_length as usize
                {
                    data_start + declared_length as usize
                } else {
                    self.warnings.push(format!(
                        "stream at offset {} has an untrustworthy /Length; scanning for endstream",
                        data_start
                    ));
                    find_endstream(bytes, data_start).unwrap_or(bytes.len())
                };

                let data = bytes[data_start..data_end].to_vec();
                self.lexer.seek(data_end);
                let before_endstream = self.lexer.position();
                match self.lexer.next_token() {
                    Some(Token::Keyword(ref kw)) if kw == b"endstream" => {}
                    _ => {
                        // Length didn't line up exactly; search from the declared end.
                        if let Some(found) = find_endstream(bytes, before_endstream) {
                            self.lexer.seek(found);
                            self.lexer.next_token();
                        }
                    }
                }
                Object::Stream(crate::object::Stream::new(dict, data))
            }
            _ => {
                self.lexer.seek(save);
                value
            }
        }
    }

    pub fn parse_value(&mut self) -> Option<Object> {
        let save = self.lexer.position();
        let token = self.lexer.next_token()?;
        self.parse_value_from(token, save)
    }

    fn parse_value_from(&mut self, token: Token, token_start: usize) -> Option<Object> {
        match token {
            Token::Integer(n) => Some(self.maybe_reference(n, token_start)),
            Token::Real(r) => Some(Object::Real(r)),
            Token::Name(n) => Some(Object::Name(Name(n))),
            Token::LiteralString(s) => Some(Object::String(PdfString::literal(s))),
            Token::HexString(s) => Some(Object::String(PdfString::hex(s))),
            Token::ArrayStart => self.parse_array(),
            Token::DictStart => self.parse_dictionary(),
            Token::Keyword(kw) => match kw.as_slice() {
                b"true" => Some(Object::Boolean(true)),
                b"false" => Some(Object::Boolean(false)),
                b"null" => Some(Object::Null),
                _ => Some(Object::Null),
            },
            Token::ArrayEnd | Token::DictEnd => None,
        }
    }

    /// After an integer, look ahead for `G R` to recognize an indirect
    /// reference; otherwise rewind and return the plain integer.
    fn maybe_reference(&mut self, num: i64, token_start: usize) -> Object {
        if num < 0 {
            return Object::Integer(num);
        }
        let save = self.lexer.position();
        if let Some(Token::Integer(gen)) = self.lexer.next_token() {
            if gen >= 0 {
                if let Some(Token::Keyword(kw)) = self.lexer.next_token() {
                    if kw == b"R" {
                        return Object::Reference((num as u32, gen as u16));
                    }
                }
            }
        }
        self.lexer.seek(save);
        let _ = token_start;
        Object::Integer(num)
    }

    fn parse_array(&mut self) -> Option<Object> {
        let mut items = Vec::new();
        loop {
            let save = self.lexer.position();
            match self.lexer.next_token() {
                Some(Token::ArrayEnd) | None => break,
                Some(token) => match self.parse_value_from(token, save) {
                    Some(value) => items.push(value),
                    None => break,
                },
            }
        }
        Some(Object::Array(items))
    }

    fn parse_dictionary(&mut self) -> Option<Object> {
        let mut dict = Dictionary::new();
        loop {
            match self.lexer.next_token() {
                Some(Token::DictEnd) | None => break,
                Some(Token::Name(key)) => {
                    if let Some(value) = self.parse_value() {
                        dict.0.insert(key, value);
                    } else {
                        break;
                    }
                }
                _ => continue, // tolerate stray tokens between entries
            }
        }
        Some(Object::Dictionary(dict))
    }
}

fn find_endstream(bytes: &[u8], from: usize) -> Option<usize> {
    const NEEDLE: &[u8] = b"endstream";
    bytes[from.min(bytes.len())..]
        .windows(NEEDLE.len())
        .position(|w| w == NEEDLE)
        .map(|i| from + i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dictionary_with_reference() {
        let data = b"<< /Type /Catalog /Pages 2 0 R >>";
        let mut parser = ObjectParser::new(data, 0);
        let value = parser.parse_value().unwrap();
        let dict = value.as_dict().unwrap();
        assert!(dict.type_is("Catalog"));
        assert_eq!(dict.get("Pages").unwrap().as_reference(), Some((2, 0)));
    }

    #[test]
    fn parses_indirect_object_with_stream() {
        let data = b"1 0 obj\n<< /Length 5 >>\nstream\nhello\nendstream\nendobj\n";
        let mut parser = ObjectParser::new(data, 0);
        let (id, value) = parser.parse_indirect_object().unwrap();
        assert_eq!(id, (1, 0));
        let stream = value.as_stream().unwrap();
        assert_eq!(stream.data, b"hello");
    }

    #[test]
    fn plain_integer_is_not_mistaken_for_a_reference() {
        let data = b"42";
        let mut parser = ObjectParser::new(data, 0);
        assert_eq!(parser.parse_value(), Some(Object::Integer(42)));
    }
}
