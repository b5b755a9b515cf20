/// Cursor over a single protocol line
///
/// Positions are byte offsets into `input`; every advance moves by a whole `char` so slices never
/// split a UTF-8 sequence.
pub struct Lexer<'a> {
    pub input: &'a str,
    pub byte_pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            byte_pos: 0,
        }
    }

    /// Checks the character under the cursor without advancing
    pub fn peek_char(&self) -> Option<char> {
        self.input[self.byte_pos..].chars().next()
    }

    /// Advances past the character under the cursor, returning it
    pub fn next(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.byte_pos += ch.len_utf8();
        Some(ch)
    }

    /// Advances past `expected` if it is under the cursor
    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.next();
            true
        } else {
            false
        }
    }

    /// Consumes consecutive spaces
    ///
    /// Only `' '` separates protocol tokens; other whitespace belongs to the token.
    pub fn skip_spaces(&mut self) {
        while self.eat(' ') {}
    }

    /// Consumes characters up to (not including) the next space
    pub fn next_word(&mut self) -> Option<&'a str> {
        self.next_until(&[' '])
    }

    /// Consumes characters until one of `delims` is under the cursor
    pub fn next_until(&mut self, delims: &[char]) -> Option<&'a str> {
        let remaining = &self.input[self.byte_pos..];
        let len = remaining.find(delims).unwrap_or(remaining.len());
        if len == 0 {
            return None;
        }

        self.byte_pos += len;
        Some(&remaining[..len])
    }

    /// Consumes the remaining input
    pub fn rest(&mut self) -> Option<&'a str> {
        if self.is_eof() {
            return None;
        }

        let result = &self.input[self.byte_pos..];
        self.byte_pos = self.input.len();
        Some(result)
    }

    pub fn is_eof(&self) -> bool {
        self.byte_pos >= self.input.len()
    }
}
