//! Serde serializer producing Lua table literals.
//!
//! ComputerCraft clients read responses with `textutils.unserialize`, which
//! evaluates the body as a Lua expression. Structs and maps become
//! `{key=value,...}`, sequences become `{v1,v2,...}`, `None` becomes `nil`.
//! Keys that are not plain Lua identifiers are written as `["key"]`.

use serde::ser::{self, Serialize};
use std::fmt::{self, Display, Write};

/// Problem while encoding a value as Lua.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error(String);

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Error {}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Encode `value` as a Lua expression.
pub fn to_string<T: ?Sized + Serialize>(value: &T) -> Result<String> {
    let mut serializer = Serializer {
        output: String::new(),
    };
    value.serialize(&mut serializer)?;
    Ok(serializer.output)
}

const KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if",
    "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !KEYWORDS.contains(&s)
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                let _ = write!(out, "\\{:03}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_key(out: &mut String, key: &str) {
    if is_identifier(key) {
        out.push_str(key);
    } else {
        out.push('[');
        write_string(out, key);
        out.push(']');
    }
}

pub struct Serializer {
    output: String,
}

impl Serializer {
    fn write_float(&mut self, v: f64) {
        if v.is_nan() {
            self.output.push_str("0/0");
        } else if v.is_infinite() {
            self.output.push_str(if v > 0.0 { "1/0" } else { "-1/0" });
        } else {
            let _ = write!(self.output, "{}", v);
        }
    }

    fn write_int(&mut self, v: impl Display) -> Result<()> {
        let _ = write!(self.output, "{}", v);
        Ok(())
    }
}

/// Writes the entries of one table, handling separators and the closing
/// brace. `variant_close` adds the extra brace of a `{Variant={...}}` wrapper.
pub struct Table<'a> {
    ser: &'a mut Serializer,
    first: bool,
    variant_close: bool,
}

impl<'a> Table<'a> {
    fn open(ser: &'a mut Serializer, variant: Option<&'static str>) -> Self {
        if let Some(variant) = variant {
            ser.output.push('{');
            write_key(&mut ser.output, variant);
            ser.output.push('=');
        }
        ser.output.push('{');
        Self {
            ser,
            first: true,
            variant_close: variant.is_some(),
        }
    }

    fn separator(&mut self) {
        if !self.first {
            self.ser.output.push(',');
        }
        self.first = false;
    }

    fn element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.separator();
        value.serialize(&mut *self.ser)
    }

    fn field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.separator();
        write_key(&mut self.ser.output, key);
        self.ser.output.push('=');
        value.serialize(&mut *self.ser)
    }

    fn close(self) -> Result<()> {
        self.ser.output.push('}');
        if self.variant_close {
            self.ser.output.push('}');
        }
        Ok(())
    }
}

impl<'a> ser::Serializer for &'a mut Serializer {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Table<'a>;
    type SerializeTuple = Table<'a>;
    type SerializeTupleStruct = Table<'a>;
    type SerializeTupleVariant = Table<'a>;
    type SerializeMap = Table<'a>;
    type SerializeStruct = Table<'a>;
    type SerializeStructVariant = Table<'a>;

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.output.push_str(if v { "true" } else { "false" });
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.write_int(v)
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.write_int(v)
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.write_int(v)
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        self.write_int(v)
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.write_int(v)
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.write_int(v)
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.write_int(v)
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.write_int(v)
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        self.write_float(v as f64);
        Ok(())
    }

    fn serialize_f64(self, v: f64) -> Result<()> {
        self.write_float(v);
        Ok(())
    }

    fn serialize_char(self, v: char) -> Result<()> {
        let mut buf = [0u8; 4];
        self.serialize_str(v.encode_utf8(&mut buf))
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        write_string(&mut self.output, v);
        Ok(())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        use ser::SerializeSeq;
        let mut seq = self.serialize_seq(Some(v.len()))?;
        for byte in v {
            seq.serialize_element(byte)?;
        }
        seq.end()
    }

    fn serialize_none(self) -> Result<()> {
        self.output.push_str("nil");
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        self.serialize_none()
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.serialize_none()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()> {
        let mut table = Table::open(self, None);
        table.field(variant, value)?;
        table.close()
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Table<'a>> {
        Ok(Table::open(self, None))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Table<'a>> {
        Ok(Table::open(self, None))
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Table<'a>> {
        Ok(Table::open(self, None))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Table<'a>> {
        Ok(Table::open(self, Some(variant)))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Table<'a>> {
        Ok(Table::open(self, None))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Table<'a>> {
        Ok(Table::open(self, None))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Table<'a>> {
        Ok(Table::open(self, Some(variant)))
    }
}

impl ser::SerializeSeq for Table<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeTuple for Table<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeTupleStruct for Table<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeTupleVariant for Table<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeMap for Table<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        self.separator();
        let encoded = to_string(key)?;
        // A string key encodes as `"..."`; identifiers need no escaping, so
        // the quoted text is the identifier itself.
        let bare = encoded
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .filter(|s| is_identifier(s));
        match bare {
            Some(ident) => self.ser.output.push_str(ident),
            None => {
                self.ser.output.push('[');
                self.ser.output.push_str(&encoded);
                self.ser.output.push(']');
            }
        }
        self.ser.output.push('=');
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut *self.ser)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeStruct for Table<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.field(key, value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeStructVariant for Table<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.field(key, value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DeliveredMessage, OutboundMessage, RegisterResponse};
    use std::collections::BTreeMap;

    #[test]
    fn delivered_message_list() {
        let messages = vec![OutboundMessage::new(5, 0, "hi").deliver(12.5)];
        assert_eq!(
            to_string(&messages).unwrap(),
            r#"{{channel=5,reply_channel=0,message="hi",distance=12.5}}"#
        );
    }

    #[test]
    fn empty_list() {
        let messages: Vec<DeliveredMessage> = Vec::new();
        assert_eq!(to_string(&messages).unwrap(), "{}");
    }

    #[test]
    fn register_response() {
        let resp = RegisterResponse {
            user: "6U71uDeu-_=".to_string(),
        };
        assert_eq!(to_string(&resp).unwrap(), r#"{user="6U71uDeu-_="}"#);
    }

    #[test]
    fn whole_distance_has_no_fraction() {
        let msg = OutboundMessage::new(1, 2, "x").deliver(5.0);
        assert_eq!(
            to_string(&msg).unwrap(),
            r#"{channel=1,reply_channel=2,message="x",distance=5}"#
        );
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(
            to_string("say \"hi\"\\\n\u{1}").unwrap(),
            r#""say \"hi\"\\\n\001""#
        );
    }

    #[test]
    fn map_keys_that_are_not_identifiers_are_bracketed() {
        let mut map = BTreeMap::new();
        map.insert("end", 1);
        map.insert("ok_key", 2);
        map.insert("with space", 3);
        assert_eq!(
            to_string(&map).unwrap(),
            r#"{["end"]=1,ok_key=2,["with space"]=3}"#
        );

        let mut numeric = BTreeMap::new();
        numeric.insert(7u16, "seven");
        assert_eq!(to_string(&numeric).unwrap(), r#"{[7]="seven"}"#);
    }

    #[test]
    fn options_and_non_finite_floats() {
        assert_eq!(to_string(&None::<u8>).unwrap(), "nil");
        assert_eq!(to_string(&Some(3u8)).unwrap(), "3");
        assert_eq!(to_string(&f64::INFINITY).unwrap(), "1/0");
        assert_eq!(to_string(&f64::NEG_INFINITY).unwrap(), "-1/0");
        assert_eq!(to_string(&f64::NAN).unwrap(), "0/0");
    }
}
