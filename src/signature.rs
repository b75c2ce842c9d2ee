//! The signature-driven typed serialization codec (spec §4.1).
//!
//! A [`Signature`] is a sequence of [`Tag`]s. [`Signature::to_binary`] and
//! [`Signature::from_binary`] are the only two operations that actually
//! touch the wire; everything else in this crate builds framed messages out
//! of them.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::value::{Tag, Value};
use crate::{Error, MAX_ELEMENT_COUNT};

/// A sequence of type tags describing a heterogeneous argument tuple.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature(Vec<Tag>);

impl Signature {
    /// Builds a signature from already-parsed tags.
    pub fn new(tags: Vec<Tag>) -> Self {
        Self(tags)
    }

    /// Parses a signature from its ASCII tag-byte form, e.g. `"is"` for
    /// `(int64, string)`. Returns [`Error::UnknownVariantTag`] if any byte
    /// is not a recognised tag.
    pub fn parse(s: &str) -> Result<Self, Error> {
        s.bytes().map(Tag::from_byte).collect::<Result<_, _>>().map(Self)
    }

    /// Number of tags (and therefore required arguments) in this signature.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this signature has no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The tags, in order.
    pub fn tags(&self) -> &[Tag] {
        &self.0
    }

    /// Serializes `args` into `sink`, driven by this signature.
    ///
    /// Fails with [`Error::ArgumentCountMismatch`] if `args.len() !=
    /// self.len()`. For each position, a concrete tag requires the argument
    /// to hold the matching [`Value`] shape ([`Error::TypeMismatch`]); a `v`
    /// tag instead writes a one-byte prefix identifying `args[i]`'s own
    /// concrete shape before encoding it the same way.
    ///
    /// Does not attempt partial rollback: a failure partway through may
    /// leave `sink` holding a truncated encoding of earlier arguments.
    pub fn to_binary<W: Write>(&self, sink: &mut W, args: &[Value]) -> Result<(), Error> {
        if args.len() != self.0.len() {
            return Err(Error::ArgumentCountMismatch {
                got: args.len(),
                expected: self.0.len(),
            });
        }

        for (i, (tag, arg)) in self.0.iter().zip(args).enumerate() {
            let concrete = match tag {
                Tag::Variant => {
                    let concrete = arg.concrete_tag();
                    sink.write_u8(concrete.as_byte())?;
                    concrete
                }
                t => *t,
            };

            if !concrete.matches(arg) {
                return Err(Error::TypeMismatch { index: i, tag: concrete });
            }

            write_value(sink, arg)?;
        }

        Ok(())
    }

    /// Deserializes a tuple of [`Value`]s from `source`, driven by this
    /// signature.
    ///
    /// For a `v` slot, reads one tag byte first and rejects anything that
    /// is not one of the eight concrete tags, including another `v`
    /// ([`Error::RecursiveVariant`]). UTF-8 validity of decoded strings is
    /// **not** checked: invalid bytes are passed through via
    /// [`String::from_utf8_lossy`] only where the input truly isn't UTF-8,
    /// preserving the exact bytes whenever it is.
    pub fn from_binary<R: Read>(&self, source: &mut R) -> Result<Vec<Value>, Error> {
        self.0.iter().map(|tag| read_tagged(source, *tag)).collect()
    }

    /// Convenience wrapper around [`Signature::to_binary`] that allocates a
    /// fresh buffer and returns it.
    pub fn to_binary_vec(&self, args: &[Value]) -> Result<Vec<u8>, Error> {
        let mut buf = Cursor::new(Vec::new());
        self.to_binary(&mut buf, args)?;
        Ok(buf.into_inner())
    }
}

impl TryFrom<&str> for Signature {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

fn read_tagged<R: Read>(source: &mut R, tag: Tag) -> Result<Value, Error> {
    let tag = match tag {
        Tag::Variant => {
            let byte = read_u8(source)?;
            Tag::from_concrete_byte(byte)?
        }
        t => t,
    };

    Ok(match tag {
        Tag::Int => Value::Int(read_i64(source)?),
        Tag::IntArray => Value::IntArray(read_array(source, read_i64)?),
        Tag::Uint => Value::Uint(read_u64(source)?),
        Tag::UintArray => Value::UintArray(read_array(source, read_u64)?),
        Tag::Double => Value::Double(read_f64(source)?),
        Tag::DoubleArray => Value::DoubleArray(read_array(source, read_f64)?),
        Tag::Str => Value::Str(read_string(source)?),
        Tag::StrArray => Value::StrArray(read_string_array(source)?),
        Tag::Variant => unreachable!("concrete tag resolved above"),
    })
}

fn write_value<W: Write>(sink: &mut W, value: &Value) -> Result<(), Error> {
    match value {
        Value::Int(v) => sink.write_i64::<LittleEndian>(*v)?,
        Value::IntArray(v) => write_array(sink, v, |s, x| s.write_i64::<LittleEndian>(*x))?,
        Value::Uint(v) => sink.write_u64::<LittleEndian>(*v)?,
        Value::UintArray(v) => write_array(sink, v, |s, x| s.write_u64::<LittleEndian>(*x))?,
        Value::Double(v) => sink.write_f64::<LittleEndian>(*v)?,
        Value::DoubleArray(v) => write_array(sink, v, |s, x| s.write_f64::<LittleEndian>(*x))?,
        Value::Str(v) => write_string(sink, v)?,
        Value::StrArray(v) => {
            if v.len() > MAX_ELEMENT_COUNT {
                return Err(Error::ArrayTooLong(v.len()));
            }
            sink.write_u16::<LittleEndian>(v.len() as u16)?;
            for s in v {
                write_string(sink, s)?;
            }
        }
    }
    Ok(())
}

fn write_array<W: Write, T>(
    sink: &mut W,
    items: &[T],
    mut write_one: impl FnMut(&mut W, &T) -> std::io::Result<()>,
) -> Result<(), Error> {
    if items.len() > MAX_ELEMENT_COUNT {
        return Err(Error::ArrayTooLong(items.len()));
    }
    sink.write_u16::<LittleEndian>(items.len() as u16)?;
    for item in items {
        write_one(sink, item)?;
    }
    Ok(())
}

fn write_string<W: Write>(sink: &mut W, s: &str) -> Result<(), Error> {
    let bytes = s.as_bytes();
    if bytes.len() > MAX_ELEMENT_COUNT {
        return Err(Error::StringTooLong(bytes.len()));
    }
    sink.write_u16::<LittleEndian>(bytes.len() as u16)?;
    sink.write_all(bytes)?;
    Ok(())
}

fn read_array<R: Read, T>(
    source: &mut R,
    mut read_one: impl FnMut(&mut R) -> Result<T, Error>,
) -> Result<Vec<T>, Error> {
    let count = read_u16(source)? as usize;
    let mut out = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        out.push(read_one(source)?);
    }
    Ok(out)
}

fn read_string<R: Read>(source: &mut R) -> Result<String, Error> {
    let len = read_u16(source)? as usize;
    let mut buf = vec![0u8; len];
    source.read_exact(&mut buf).map_err(map_eof)?;
    Ok(String::from_utf8(buf).unwrap_or_else(|e| {
        // UTF-8 validity is not enforced on decode (spec §4.1): recover the
        // raw bytes as a string rather than fail.
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    }))
}

fn read_string_array<R: Read>(source: &mut R) -> Result<Vec<String>, Error> {
    let count = read_u16(source)? as usize;
    let mut out = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        out.push(read_string(source)?);
    }
    Ok(out)
}

fn read_u8<R: Read>(source: &mut R) -> Result<u8, Error> {
    source.read_u8().map_err(map_eof)
}

fn read_u16<R: Read>(source: &mut R) -> Result<u16, Error> {
    source.read_u16::<LittleEndian>().map_err(map_eof)
}

fn read_i64<R: Read>(source: &mut R) -> Result<i64, Error> {
    source.read_i64::<LittleEndian>().map_err(map_eof)
}

fn read_u64<R: Read>(source: &mut R) -> Result<u64, Error> {
    source.read_u64::<LittleEndian>().map_err(map_eof)
}

fn read_f64<R: Read>(source: &mut R) -> Result<f64, Error> {
    source.read_f64::<LittleEndian>().map_err(map_eof)
}

fn map_eof(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::UnexpectedEof
    } else {
        Error::from(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(sig: &Signature, args: &[Value]) -> Vec<Value> {
        let bytes = sig.to_binary_vec(args).expect("encode");
        let mut cursor = Cursor::new(bytes);
        sig.from_binary(&mut cursor).expect("decode")
    }

    #[test]
    fn test_greet_scenario() {
        // body = uint16 LE 11 + "Hello World"
        let sig = Signature::parse("s").unwrap();
        let bytes = sig.to_binary_vec(&[Value::Str("Hello World".into())]).unwrap();
        let mut expected = vec![0x0B, 0x00];
        expected.extend_from_slice(b"Hello World");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_sum_scenario() {
        // "Sum" args signature `I`, body = 0x0005 + 5 i64 LE
        let sig = Signature::parse("I").unwrap();
        let args = vec![Value::IntArray(vec![1, 2, 3, 4, 5])];
        let bytes = sig.to_binary_vec(&args).unwrap();
        assert_eq!(bytes.len(), 2 + 5 * 8);
        assert_eq!(&bytes[0..2], &[0x05, 0x00]);
        let decoded = {
            let mut c = Cursor::new(bytes);
            sig.from_binary(&mut c).unwrap()
        };
        assert_eq!(decoded, args);
    }

    #[test]
    fn test_publish_stream_scenario() {
        let sig = Signature::parse("is").unwrap();
        let args = vec![Value::Int(7), Value::Str("apples".into())];
        let bytes = sig.to_binary_vec(&args).unwrap();
        assert_eq!(bytes.len(), 8 + 2 + 6);
        assert_eq!(roundtrip(&sig, &args), args);
    }

    #[test]
    fn test_variant_scenario() {
        let sig = Signature::parse("v").unwrap();
        let args = vec![Value::Double(3.14)];
        let bytes = sig.to_binary_vec(&args).unwrap();
        assert_eq!(bytes[0], b'd');
        assert_eq!(roundtrip(&sig, &args), args);
    }

    #[test]
    fn test_variant_each_concrete_tag_roundtrips() {
        let sig = Signature::parse("v").unwrap();
        let samples = vec![
            Value::Int(-1),
            Value::IntArray(vec![1, -2, 3]),
            Value::Uint(9),
            Value::UintArray(vec![9, 8]),
            Value::Double(1.5),
            Value::DoubleArray(vec![1.5, -2.5]),
            Value::Str("hi".into()),
            Value::StrArray(vec!["a".into(), "b".into()]),
        ];
        for v in samples {
            assert_eq!(roundtrip(&sig, std::slice::from_ref(&v)), vec![v]);
        }
    }

    #[test]
    fn test_zero_length_string_and_array_roundtrip() {
        let sig = Signature::parse("sI").unwrap();
        let args = vec![Value::Str(String::new()), Value::IntArray(vec![])];
        assert_eq!(roundtrip(&sig, &args), args);
    }

    #[test]
    fn test_max_length_string_roundtrips() {
        let sig = Signature::parse("s").unwrap();
        let s = "a".repeat(MAX_ELEMENT_COUNT);
        let args = vec![Value::Str(s)];
        assert_eq!(roundtrip(&sig, &args), args);
    }

    #[test]
    fn test_oversize_string_fails_encoding() {
        let sig = Signature::parse("s").unwrap();
        let s = "a".repeat(MAX_ELEMENT_COUNT + 1);
        let err = sig.to_binary_vec(&[Value::Str(s)]).unwrap_err();
        assert!(matches!(err, Error::StringTooLong(_)));
    }

    #[test]
    fn test_argument_count_mismatch() {
        let sig = Signature::parse("is").unwrap();
        let err = sig.to_binary_vec(&[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, Error::ArgumentCountMismatch { got: 1, expected: 2 }));
    }

    #[test]
    fn test_type_mismatch() {
        let sig = Signature::parse("i").unwrap();
        let err = sig.to_binary_vec(&[Value::Str("nope".into())]).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { index: 0, .. }));
    }

    #[test]
    fn test_unknown_variant_tag_on_decode() {
        let sig = Signature::parse("v").unwrap();
        let mut c = Cursor::new(vec![b'x']);
        let err = sig.from_binary(&mut c).unwrap_err();
        assert!(matches!(err, Error::UnknownVariantTag(b'x')));
    }

    #[test]
    fn test_short_read_is_unexpected_eof() {
        let sig = Signature::parse("i").unwrap();
        let mut c = Cursor::new(vec![0u8; 3]);
        let err = sig.from_binary(&mut c).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof));
    }

    proptest! {
        #[test]
        fn prop_int_roundtrip(v in any::<i64>()) {
            let sig = Signature::parse("i").unwrap();
            let args = vec![Value::Int(v)];
            prop_assert_eq!(roundtrip(&sig, &args), args);
        }

        #[test]
        fn prop_string_roundtrip(s in "\\PC{0,200}") {
            let sig = Signature::parse("s").unwrap();
            if s.as_bytes().len() <= MAX_ELEMENT_COUNT {
                let args = vec![Value::Str(s)];
                prop_assert_eq!(roundtrip(&sig, &args), args);
            }
        }

        #[test]
        fn prop_int_array_roundtrip(v in prop::collection::vec(any::<i64>(), 0..64)) {
            let sig = Signature::parse("I").unwrap();
            let args = vec![Value::IntArray(v)];
            prop_assert_eq!(roundtrip(&sig, &args), args);
        }
    }
}
