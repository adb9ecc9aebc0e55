//! Non-finite float detection
//!
//! `serde_json` writes `NaN` and `±Infinity` as `null`, which would let
//! requests differing only in such a value share a fingerprint. This
//! serializer walks a value without producing output and fails on the first
//! non-finite float.

use serde::ser::{self, Serialize, Serializer};
use std::fmt;

/// Error returned by [`ensure_finite`]
#[derive(Debug)]
pub struct NonFiniteError(String);

impl fmt::Display for NonFiniteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for NonFiniteError {}

impl ser::Error for NonFiniteError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        NonFiniteError(msg.to_string())
    }
}

/// Fail if `value` contains a NaN or infinite float anywhere
pub fn ensure_finite<T: Serialize + ?Sized>(value: &T) -> Result<(), NonFiniteError> {
    value.serialize(FiniteCheck)
}

type Check = Result<(), NonFiniteError>;

#[derive(Clone, Copy)]
struct FiniteCheck;

impl Serializer for FiniteCheck {
    type Ok = ();
    type Error = NonFiniteError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _v: bool) -> Check {
        Ok(())
    }
    fn serialize_i8(self, _v: i8) -> Check {
        Ok(())
    }
    fn serialize_i16(self, _v: i16) -> Check {
        Ok(())
    }
    fn serialize_i32(self, _v: i32) -> Check {
        Ok(())
    }
    fn serialize_i64(self, _v: i64) -> Check {
        Ok(())
    }
    fn serialize_i128(self, _v: i128) -> Check {
        Ok(())
    }
    fn serialize_u8(self, _v: u8) -> Check {
        Ok(())
    }
    fn serialize_u16(self, _v: u16) -> Check {
        Ok(())
    }
    fn serialize_u32(self, _v: u32) -> Check {
        Ok(())
    }
    fn serialize_u64(self, _v: u64) -> Check {
        Ok(())
    }
    fn serialize_u128(self, _v: u128) -> Check {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Check {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Check {
        if v.is_finite() {
            Ok(())
        } else {
            Err(NonFiniteError(format!("non-finite number {}", v)))
        }
    }

    fn serialize_char(self, _v: char) -> Check {
        Ok(())
    }
    fn serialize_str(self, _v: &str) -> Check {
        Ok(())
    }
    fn serialize_bytes(self, _v: &[u8]) -> Check {
        Ok(())
    }
    fn serialize_none(self) -> Check {
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Check {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Check {
        Ok(())
    }
    fn serialize_unit_struct(self, _name: &'static str) -> Check {
        Ok(())
    }
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> Check {
        Ok(())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Check {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Check {
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self, NonFiniteError> {
        Ok(self)
    }
    fn serialize_tuple(self, _len: usize) -> Result<Self, NonFiniteError> {
        Ok(self)
    }
    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self, NonFiniteError> {
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, NonFiniteError> {
        Ok(self)
    }
    fn serialize_map(self, _len: Option<usize>) -> Result<Self, NonFiniteError> {
        Ok(self)
    }
    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self, NonFiniteError> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, NonFiniteError> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteCheck {
    type Ok = ();
    type Error = NonFiniteError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Check {
        value.serialize(*self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteCheck {
    type Ok = ();
    type Error = NonFiniteError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Check {
        value.serialize(*self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteCheck {
    type Ok = ();
    type Error = NonFiniteError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Check {
        value.serialize(*self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteCheck {
    type Ok = ();
    type Error = NonFiniteError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Check {
        value.serialize(*self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteCheck {
    type Ok = ();
    type Error = NonFiniteError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Check {
        key.serialize(*self)
    }
    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Check {
        value.serialize(*self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteCheck {
    type Ok = ();
    type Error = NonFiniteError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _key: &'static str, value: &T) -> Check {
        value.serialize(*self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteCheck {
    type Ok = ();
    type Error = NonFiniteError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _key: &'static str, value: &T) -> Check {
        value.serialize(*self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    enum Sample {
        Pair(f32, f64),
        Named { x: Option<f64> },
    }

    #[test]
    fn test_finite_values_pass() {
        assert!(ensure_finite(&json!({"a": [1, 2.5, null, "s"]})).is_ok());
        assert!(ensure_finite(&Sample::Pair(1.0, -2.0)).is_ok());
        assert!(ensure_finite(&Sample::Named { x: None }).is_ok());
        assert!(ensure_finite(&(1u128, 'c', ())).is_ok());
    }

    #[test]
    fn test_non_finite_anywhere_fails() {
        assert!(ensure_finite(&f64::NAN).is_err());
        assert!(ensure_finite(&vec![0.0, f64::INFINITY]).is_err());
        assert!(ensure_finite(&Sample::Pair(f32::NEG_INFINITY, 0.0)).is_err());
        assert!(ensure_finite(&Sample::Named { x: Some(f64::NAN) }).is_err());

        let mut map = BTreeMap::new();
        map.insert("t", f64::NAN);
        let err = ensure_finite(&map).unwrap_err();
        assert_eq!(err.to_string(), "non-finite number NaN");
    }
}
