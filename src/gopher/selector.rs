/// Gopher item types the daemon serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// `0` plain text, sent with the `.` terminator
    Document,
    /// `1` directory, served from its `.cache` listing
    Directory,
    /// `4` BinHex
    BinHex,
    /// `5` DOS binary archive
    DosBinary,
    /// `6` uuencoded file
    Uuencoded,
    /// `9` generic binary
    Binary,
    /// `g` GIF image
    Gif,
    /// `h` HTML document
    Html,
    /// `I` other image formats
    Image,
}

impl Selector {
    /// Parses a selector character.
    ///
    /// # Example
    ///
    /// ```
    /// # use burrow::gopher::selector::Selector;
    /// assert_eq!(Selector::from_char('0'), Some(Selector::Document));
    /// assert_eq!(Selector::from_char('i'), None);
    /// ```
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Selector::Document),
            '1' => Some(Selector::Directory),
            '4' => Some(Selector::BinHex),
            '5' => Some(Selector::DosBinary),
            '6' => Some(Selector::Uuencoded),
            '9' => Some(Selector::Binary),
            'g' => Some(Selector::Gif),
            'h' => Some(Selector::Html),
            'I' => Some(Selector::Image),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Selector::Document => '0',
            Selector::Directory => '1',
            Selector::BinHex => '4',
            Selector::DosBinary => '5',
            Selector::Uuencoded => '6',
            Selector::Binary => '9',
            Selector::Gif => 'g',
            Selector::Html => 'h',
            Selector::Image => 'I',
        }
    }

    /// Only plain documents get the end-of-document terminator.
    pub fn is_document(&self) -> bool {
        matches!(self, Selector::Document)
    }

    /// Whether the HTTP gateway will serve this type.
    pub fn http_servable(&self) -> bool {
        matches!(
            self,
            Selector::Document
                | Selector::Directory
                | Selector::Binary
                | Selector::Gif
                | Selector::Html
                | Selector::Image
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chars_round_trip() {
        for c in ['0', '1', '4', '5', '6', '9', 'g', 'h', 'I'] {
            assert_eq!(Selector::from_char(c).map(|s| s.as_char()), Some(c));
        }
    }

    #[test]
    fn unknown_chars_are_rejected() {
        for c in ['2', '3', '7', '8', 'i', 's', '+', 'T'] {
            assert_eq!(Selector::from_char(c), None);
        }
    }

    #[test]
    fn gateway_refuses_archive_types() {
        assert!(!Selector::BinHex.http_servable());
        assert!(Selector::Image.http_servable());
    }
}
