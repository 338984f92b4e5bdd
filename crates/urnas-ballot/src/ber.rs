//! Minimal BER reader: definite lengths, low and high tag-number forms,
//! INTEGER/ENUMERATED, OCTET STRING and the string types the ballot uses.

use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Universal,
    Application,
    Context,
    Private,
}

impl Class {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Universal,
            1 => Self::Application,
            2 => Self::Context,
            _ => Self::Private,
        }
    }

    pub(crate) fn bits(self) -> u8 {
        match self {
            Self::Universal => 0,
            Self::Application => 1,
            Self::Context => 2,
            Self::Private => 3,
        }
    }
}

/// Universal tag numbers.
pub mod universal {
    pub const INTEGER: u32 = 2;
    pub const OCTET_STRING: u32 = 4;
    pub const ENUMERATED: u32 = 10;
    pub const UTF8_STRING: u32 = 12;
    pub const SEQUENCE: u32 = 16;
    pub const PRINTABLE_STRING: u32 = 19;
    pub const GENERALIZED_TIME: u32 = 24;
    pub const VISIBLE_STRING: u32 = 26;
    pub const GENERAL_STRING: u32 = 27;
}

/// One tag-length-value element borrowed from the input buffer.
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    pub class: Class,
    pub constructed: bool,
    pub tag: u32,
    /// Offset of the identifier octet.
    pub offset: usize,
    /// Offset of the first content octet.
    pub value_offset: usize,
    pub value: &'a [u8],
}

impl<'a> Tlv<'a> {
    pub fn is(&self, class: Class, tag: u32) -> bool {
        self.class == class && self.tag == tag
    }

    pub fn is_context(&self, tag: u32) -> bool {
        self.is(Class::Context, tag)
    }

    pub fn is_sequence(&self) -> bool {
        self.constructed && self.is(Class::Universal, universal::SEQUENCE)
    }

    pub fn is_text(&self) -> bool {
        self.class == Class::Universal
            && matches!(
                self.tag,
                universal::UTF8_STRING
                    | universal::PRINTABLE_STRING
                    | universal::VISIBLE_STRING
                    | universal::GENERAL_STRING
                    | universal::GENERALIZED_TIME
            )
    }

    pub fn is_number(&self) -> bool {
        self.class == Class::Universal
            && matches!(self.tag, universal::INTEGER | universal::ENUMERATED)
    }

    /// Two's complement integer content, up to 8 octets.
    pub fn integer(&self) -> Result<i64, DecodeError> {
        if self.constructed {
            return Err(DecodeError::Unexpected {
                expected: "primitive integer",
                offset: self.offset,
            });
        }
        let bytes = self.value;
        if bytes.is_empty() || bytes.len() > 8 {
            return Err(DecodeError::BadInteger {
                offset: self.offset,
                len: bytes.len(),
            });
        }
        let mut n: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
        for b in bytes {
            n = (n << 8) | i64::from(*b);
        }
        Ok(n)
    }

    pub fn unsigned(&self) -> Result<u32, DecodeError> {
        let n = self.integer()?;
        u32::try_from(n).map_err(|_| DecodeError::OutOfRange {
            offset: self.offset,
            value: n,
        })
    }

    pub fn text(&self) -> Result<String, DecodeError> {
        if self.constructed {
            return Err(DecodeError::Unexpected {
                expected: "primitive string",
                offset: self.offset,
            });
        }
        std::str::from_utf8(self.value)
            .map(|s| s.trim_end_matches('\0').to_string())
            .map_err(|_| DecodeError::InvalidText {
                offset: self.offset,
            })
    }

    /// Reader over the contents of a constructed element.
    pub fn children(&self) -> Result<Reader<'a>, DecodeError> {
        if !self.constructed {
            return Err(DecodeError::Unexpected {
                expected: "constructed element",
                offset: self.offset,
            });
        }
        Ok(Reader::with_base(self.value, self.value_offset))
    }
}

/// Sequential reader over concatenated TLVs.
///
/// Iteration yields `Err` at most once and then stops.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_base(buf, 0)
    }

    pub fn with_base(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self.buf.get(self.pos).ok_or(DecodeError::Truncated {
            offset: self.base + self.pos,
        })?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read(&mut self) -> Result<Option<Tlv<'a>>, DecodeError> {
        if self.is_empty() {
            return Ok(None);
        }
        let offset = self.base + self.pos;

        let first = self.byte()?;
        let class = Class::from_bits(first >> 6);
        let constructed = first & 0x20 != 0;
        let mut tag = u32::from(first & 0x1f);
        if tag == 0x1f {
            tag = 0;
            loop {
                let b = self.byte()?;
                if tag > (u32::MAX >> 7) {
                    return Err(DecodeError::TagOverflow { offset });
                }
                tag = (tag << 7) | u32::from(b & 0x7f);
                if b & 0x80 == 0 {
                    break;
                }
            }
        }

        let len_offset = self.base + self.pos;
        let first_len = self.byte()?;
        let len = match first_len {
            0x80 => return Err(DecodeError::IndefiniteLength { offset: len_offset }),
            n if n < 0x80 => usize::from(n),
            n => {
                let count = usize::from(n & 0x7f);
                if count > 4 {
                    return Err(DecodeError::LengthOverflow { offset: len_offset });
                }
                let mut len = 0usize;
                for _ in 0..count {
                    len = (len << 8) | usize::from(self.byte()?);
                }
                len
            }
        };

        let start = self.pos;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::Truncated {
                offset: self.base + self.buf.len(),
            })?;
        self.pos = end;
        Ok(Some(Tlv {
            class,
            constructed,
            tag,
            offset,
            value_offset: self.base + start,
            value: &self.buf[start..end],
        }))
    }
}

impl<'a> Iterator for Reader<'a> {
    type Item = Result<Tlv<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read() {
            Ok(tlv) => tlv.map(Ok),
            Err(e) => {
                self.pos = self.buf.len();
                Some(Err(e))
            }
        }
    }
}

/// Read the first element of `buf`. Trailing bytes are ignored.
pub fn read_one(buf: &[u8], base: usize) -> Result<Tlv<'_>, DecodeError> {
    Reader::with_base(buf, base)
        .read()?
        .ok_or(DecodeError::Truncated { offset: base })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_integer() {
        let tlv = read_one(&[0x02, 0x01, 0x2a], 0).unwrap();
        assert_eq!(tlv.class, Class::Universal);
        assert!(!tlv.constructed);
        assert_eq!(tlv.integer().unwrap(), 42);
    }

    #[test]
    fn negative_and_wide_integers() {
        let tlv = read_one(&[0x02, 0x01, 0xff], 0).unwrap();
        assert_eq!(tlv.integer().unwrap(), -1);
        assert!(tlv.unsigned().is_err());

        let tlv = read_one(&[0x02, 0x02, 0x01, 0x00], 0).unwrap();
        assert_eq!(tlv.unsigned().unwrap(), 256);

        let tlv = read_one(&[0x02, 0x00], 0).unwrap();
        assert!(matches!(tlv.integer(), Err(DecodeError::BadInteger { .. })));
    }

    #[test]
    fn high_tag_number_form() {
        // [APPLICATION 200] primitive, one content byte.
        let tlv = read_one(&[0x5f, 0x81, 0x48, 0x01, 0x07], 0).unwrap();
        assert_eq!(tlv.class, Class::Application);
        assert_eq!(tlv.tag, 200);
        assert_eq!(tlv.value, &[0x07]);
    }

    #[test]
    fn long_form_length() {
        let mut buf = vec![0x04, 0x81, 0x80];
        buf.extend(std::iter::repeat_n(0xaa, 128));
        let tlv = read_one(&buf, 0).unwrap();
        assert_eq!(tlv.value.len(), 128);
        assert_eq!(tlv.value_offset, 3);
    }

    #[test]
    fn nested_children_carry_absolute_offsets() {
        // SEQUENCE { [0] 5, [1] "ab" }
        let buf = [0x30, 0x07, 0x80, 0x01, 0x05, 0x81, 0x02, b'a', b'b'];
        let seq = read_one(&buf, 0).unwrap();
        assert!(seq.is_sequence());
        let children: Vec<_> = seq.children().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(children.len(), 2);
        assert!(children[0].is_context(0));
        assert_eq!(children[1].offset, 5);
        assert_eq!(children[1].text().unwrap(), "ab");
    }

    #[test]
    fn malformed_inputs() {
        assert!(matches!(read_one(&[], 0), Err(DecodeError::Truncated { .. })));
        assert!(matches!(
            read_one(&[0x04, 0x05, 0x01], 0),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(matches!(
            read_one(&[0x30, 0x80, 0x00, 0x00], 0),
            Err(DecodeError::IndefiniteLength { offset: 1 })
        ));
        assert!(matches!(
            read_one(&[0x04, 0x85, 1, 1, 1, 1, 1], 0),
            Err(DecodeError::LengthOverflow { .. })
        ));
    }

    #[test]
    fn iterator_stops_after_error() {
        let mut reader = Reader::new(&[0x02, 0x01, 0x01, 0x02, 0x09]);
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }
}
