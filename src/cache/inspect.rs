//! Value Inspection Module
//!
//! Walks a value through serde before it is encoded. JSON has no spelling for
//! NaN or infinity and `serde_json` quietly writes them as `null`, which would
//! store a value that can never be read back as its own type. The walk also
//! records whether the value is a map or some other shape, which a
//! `serde_json::Value` can no longer tell apart once a struct is converted.

use std::fmt;

use serde::ser::{self, Serialize};

use crate::error::{CacheError, Result};

// == Value Shape ==
/// Top-level shape of a value as seen by serde.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// Serialized through `serialize_map`: `HashMap`, `BTreeMap`, JSON objects
    Mapping,
    /// Structs, sequences, scalars and everything else
    Other,
}

// == Inspect ==
/// Returns the shape of `value`, or `CacheError::Encode` if any float inside
/// it is NaN or infinite.
pub fn inspect<T: Serialize + ?Sized>(value: &T) -> Result<ValueShape> {
    let mut walker = Walker { shape: None };
    value
        .serialize(&mut walker)
        .map_err(|e| CacheError::Encode(e.0))?;
    Ok(walker.shape.unwrap_or(ValueShape::Other))
}

#[derive(Debug)]
struct WalkError(String);

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for WalkError {}

impl ser::Error for WalkError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        WalkError(msg.to_string())
    }
}

struct Walker {
    shape: Option<ValueShape>,
}

type WalkResult = std::result::Result<(), WalkError>;

impl Walker {
    /// Only the outermost call decides the shape.
    fn mark(&mut self, shape: ValueShape) {
        self.shape.get_or_insert(shape);
    }

    fn float(&mut self, v: f64) -> WalkResult {
        self.mark(ValueShape::Other);
        if v.is_finite() {
            Ok(())
        } else {
            Err(WalkError(format!("non-finite float {} cannot be cached", v)))
        }
    }

    fn scalar(&mut self) -> WalkResult {
        self.mark(ValueShape::Other);
        Ok(())
    }
}

impl<'a> ser::Serializer for &'a mut Walker {
    type Ok = ();
    type Error = WalkError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _v: bool) -> WalkResult {
        self.scalar()
    }

    fn serialize_i8(self, _v: i8) -> WalkResult {
        self.scalar()
    }

    fn serialize_i16(self, _v: i16) -> WalkResult {
        self.scalar()
    }

    fn serialize_i32(self, _v: i32) -> WalkResult {
        self.scalar()
    }

    fn serialize_i64(self, _v: i64) -> WalkResult {
        self.scalar()
    }

    fn serialize_i128(self, _v: i128) -> WalkResult {
        self.scalar()
    }

    fn serialize_u8(self, _v: u8) -> WalkResult {
        self.scalar()
    }

    fn serialize_u16(self, _v: u16) -> WalkResult {
        self.scalar()
    }

    fn serialize_u32(self, _v: u32) -> WalkResult {
        self.scalar()
    }

    fn serialize_u64(self, _v: u64) -> WalkResult {
        self.scalar()
    }

    fn serialize_u128(self, _v: u128) -> WalkResult {
        self.scalar()
    }

    fn serialize_f32(self, v: f32) -> WalkResult {
        self.float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> WalkResult {
        self.float(v)
    }

    fn serialize_char(self, _v: char) -> WalkResult {
        self.scalar()
    }

    fn serialize_str(self, _v: &str) -> WalkResult {
        self.scalar()
    }

    fn serialize_bytes(self, _v: &[u8]) -> WalkResult {
        self.scalar()
    }

    fn serialize_none(self) -> WalkResult {
        self.scalar()
    }

    // `Some` is transparent in JSON, so the inner value decides the shape.
    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> WalkResult {
        value.serialize(self)
    }

    fn serialize_unit(self) -> WalkResult {
        self.scalar()
    }

    fn serialize_unit_struct(self, _name: &'static str) -> WalkResult {
        self.scalar()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> WalkResult {
        self.scalar()
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> WalkResult {
        self.mark(ValueShape::Other);
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> WalkResult {
        self.mark(ValueShape::Other);
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> std::result::Result<Self, WalkError> {
        self.mark(ValueShape::Other);
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> std::result::Result<Self, WalkError> {
        self.mark(ValueShape::Other);
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, WalkError> {
        self.mark(ValueShape::Other);
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, WalkError> {
        self.mark(ValueShape::Other);
        Ok(self)
    }

    fn serialize_map(self, _len: Option<usize>) -> std::result::Result<Self, WalkError> {
        self.mark(ValueShape::Mapping);
        Ok(self)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, WalkError> {
        self.mark(ValueShape::Other);
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, WalkError> {
        self.mark(ValueShape::Other);
        Ok(self)
    }
}

impl<'a> ser::SerializeSeq for &'a mut Walker {
    type Ok = ();
    type Error = WalkError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> WalkResult {
        value.serialize(&mut **self)
    }

    fn end(self) -> WalkResult {
        Ok(())
    }
}

impl<'a> ser::SerializeTuple for &'a mut Walker {
    type Ok = ();
    type Error = WalkError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> WalkResult {
        value.serialize(&mut **self)
    }

    fn end(self) -> WalkResult {
        Ok(())
    }
}

impl<'a> ser::SerializeTupleStruct for &'a mut Walker {
    type Ok = ();
    type Error = WalkError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> WalkResult {
        value.serialize(&mut **self)
    }

    fn end(self) -> WalkResult {
        Ok(())
    }
}

impl<'a> ser::SerializeTupleVariant for &'a mut Walker {
    type Ok = ();
    type Error = WalkError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> WalkResult {
        value.serialize(&mut **self)
    }

    fn end(self) -> WalkResult {
        Ok(())
    }
}

impl<'a> ser::SerializeMap for &'a mut Walker {
    type Ok = ();
    type Error = WalkError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> WalkResult {
        key.serialize(&mut **self)
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> WalkResult {
        value.serialize(&mut **self)
    }

    fn end(self) -> WalkResult {
        Ok(())
    }
}

impl<'a> ser::SerializeStruct for &'a mut Walker {
    type Ok = ();
    type Error = WalkError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> WalkResult {
        value.serialize(&mut **self)
    }

    fn end(self) -> WalkResult {
        Ok(())
    }
}

impl<'a> ser::SerializeStructVariant for &'a mut Walker {
    type Ok = ();
    type Error = WalkError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> WalkResult {
        value.serialize(&mut **self)
    }

    fn end(self) -> WalkResult {
        Ok(())
    }
}
