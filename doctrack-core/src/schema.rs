//! Static serialization shape of entity types.
//!
//! Entities have no runtime reflection, but a derived `Deserialize` implementation announces
//! its struct name and field names to the deserializer before reading anything. The recorder
//! below captures that announcement and aborts, which gives the model builder the wire names
//! of an entity's own fields without needing an instance.

use serde::{
    Deserialize,
    de::{self, Deserializer, Visitor},
    forward_to_deserialize_any,
};

/// The wire field names of an entity type, as announced by its `Deserialize` impl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityShape {
    fields: Option<&'static [&'static str]>,
}

impl EntityShape {
    /// Reads the shape of `T`.
    ///
    /// Types that do not deserialize as a plain struct (maps, `#[serde(flatten)]`, custom
    /// impls) yield an unknown shape.
    pub fn of<T>() -> Self
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut fields = None;
        let _ = T::deserialize(ShapeRecorder { fields: &mut fields });

        Self { fields }
    }

    /// Returns `true` when the field names are known.
    pub fn is_known(&self) -> bool {
        self.fields.is_some()
    }

    /// The field names, empty when the shape is unknown.
    pub fn fields(&self) -> &'static [&'static str] {
        self.fields.unwrap_or(&[])
    }

    /// Returns `true` when the entity declares a field with this wire name.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields().contains(&name)
    }
}

struct ShapeRecorder<'a> {
    fields: &'a mut Option<&'static [&'static str]>,
}

impl<'de> Deserializer<'de> for ShapeRecorder<'_> {
    type Error = de::value::Error;

    fn deserialize_any<V>(self, _visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        Err(de::Error::custom("entity is not a struct"))
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        *self.fields = Some(fields);

        Err(de::Error::custom("shape recorded"))
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}
