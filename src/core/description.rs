use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Canonical, JSON-representable description of a value.
///
/// Objects are backed by a sorted map, so two descriptions are equal iff they
/// are structurally equal and their rendering through [`canonical_json`] is
/// byte-identical.
pub type Description = Value;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Value of type {type_name} cannot be described: {reason}")]
    Undescribable {
        type_name: &'static str,
        reason: String,
    },
}

impl Error {
    fn undescribable<T: ?Sized>(reason: impl Into<String>) -> Self {
        Error::Undescribable {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }
}

/// Values that can render themselves as a [`Description`].
pub trait Describe {
    fn describe(&self) -> Result<Description, Error>;
}

pub fn describe<T: Describe + ?Sized>(value: &T) -> Result<Description, Error> {
    value.describe()
}

/// Render a description as compact JSON with sorted object keys.
pub fn canonical_json(description: &Description) -> String {
    sorted(description).to_string()
}

// Object keys are re-inserted in order so the rendering stays canonical even if
// serde_json is built with an insertion-ordered map.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Describe a serde record as `{"type": name, "contents": fields}`.
///
/// Records holding NaN or infinite floats are undescribable, since serde_json
/// would render them as `null`.
pub fn record<T: Serialize + ?Sized>(type_name: &str, value: &T) -> Result<Description, Error> {
    value
        .serialize(finite::FiniteFloats)
        .map_err(|err| Error::undescribable::<T>(err.to_string()))?;
    let contents =
        serde_json::to_value(value).map_err(|err| Error::undescribable::<T>(err.to_string()))?;

    let mut map = Map::new();
    map.insert("type".to_string(), Value::String(type_name.to_string()));
    map.insert("contents".to_string(), contents);
    Ok(Value::Object(map))
}

mod finite {
    use serde::Serialize;
    use serde::ser::{self, Serializer};

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    pub struct NonFinite(String);

    impl ser::Error for NonFinite {
        fn custom<T: std::fmt::Display>(msg: T) -> Self {
            NonFinite(msg.to_string())
        }
    }

    /// Walks a value without producing output, failing on the first NaN or infinity
    #[derive(Clone, Copy)]
    pub struct FiniteFloats;

    fn check(value: f64) -> Result<(), NonFinite> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(NonFinite(format!("non-finite float {}", value)))
        }
    }

    impl Serializer for FiniteFloats {
        type Ok = ();
        type Error = NonFinite;
        type SerializeSeq = Self;
        type SerializeTuple = Self;
        type SerializeTupleStruct = Self;
        type SerializeTupleVariant = Self;
        type SerializeMap = Self;
        type SerializeStruct = Self;
        type SerializeStructVariant = Self;

        fn serialize_bool(self, _: bool) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_i8(self, _: i8) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_i16(self, _: i16) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_i32(self, _: i32) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_i64(self, _: i64) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_i128(self, _: i128) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_u8(self, _: u8) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_u16(self, _: u16) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_u32(self, _: u32) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_u64(self, _: u64) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_u128(self, _: u128) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_f32(self, value: f32) -> Result<(), NonFinite> {
            check(f64::from(value))
        }
        fn serialize_f64(self, value: f64) -> Result<(), NonFinite> {
            check(value)
        }
        fn serialize_char(self, _: char) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_str(self, _: &str) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_bytes(self, _: &[u8]) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_none(self) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), NonFinite> {
            value.serialize(self)
        }
        fn serialize_unit(self) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_unit_struct(self, _: &'static str) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_unit_variant(
            self,
            _: &'static str,
            _: u32,
            _: &'static str,
        ) -> Result<(), NonFinite> {
            Ok(())
        }
        fn serialize_newtype_struct<T: ?Sized + Serialize>(
            self,
            _: &'static str,
            value: &T,
        ) -> Result<(), NonFinite> {
            value.serialize(self)
        }
        fn serialize_newtype_variant<T: ?Sized + Serialize>(
            self,
            _: &'static str,
            _: u32,
            _: &'static str,
            value: &T,
        ) -> Result<(), NonFinite> {
            value.serialize(self)
        }
        fn serialize_seq(self, _: Option<usize>) -> Result<Self, NonFinite> {
            Ok(self)
        }
        fn serialize_tuple(self, _: usize) -> Result<Self, NonFinite> {
            Ok(self)
        }
        fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, NonFinite> {
            Ok(self)
        }
        fn serialize_tuple_variant(
            self,
            _: &'static str,
            _: u32,
            _: &'static str,
            _: usize,
        ) -> Result<Self, NonFinite> {
            Ok(self)
        }
        fn serialize_map(self, _: Option<usize>) -> Result<Self, NonFinite> {
            Ok(self)
        }
        fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, NonFinite> {
            Ok(self)
        }
        fn serialize_struct_variant(
            self,
            _: &'static str,
            _: u32,
            _: &'static str,
            _: usize,
        ) -> Result<Self, NonFinite> {
            Ok(self)
        }
    }

    impl ser::SerializeSeq for FiniteFloats {
        type Ok = ();
        type Error = NonFinite;

        fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), NonFinite> {
            value.serialize(FiniteFloats)
        }
        fn end(self) -> Result<(), NonFinite> {
            Ok(())
        }
    }

    impl ser::SerializeTuple for FiniteFloats {
        type Ok = ();
        type Error = NonFinite;

        fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), NonFinite> {
            value.serialize(FiniteFloats)
        }
        fn end(self) -> Result<(), NonFinite> {
            Ok(())
        }
    }

    impl ser::SerializeTupleStruct for FiniteFloats {
        type Ok = ();
        type Error = NonFinite;

        fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), NonFinite> {
            value.serialize(FiniteFloats)
        }
        fn end(self) -> Result<(), NonFinite> {
            Ok(())
        }
    }

    impl ser::SerializeTupleVariant for FiniteFloats {
        type Ok = ();
        type Error = NonFinite;

        fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), NonFinite> {
            value.serialize(FiniteFloats)
        }
        fn end(self) -> Result<(), NonFinite> {
            Ok(())
        }
    }

    impl ser::SerializeMap for FiniteFloats {
        type Ok = ();
        type Error = NonFinite;

        fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), NonFinite> {
            key.serialize(FiniteFloats)
        }
        fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), NonFinite> {
            value.serialize(FiniteFloats)
        }
        fn end(self) -> Result<(), NonFinite> {
            Ok(())
        }
    }

    impl ser::SerializeStruct for FiniteFloats {
        type Ok = ();
        type Error = NonFinite;

        fn serialize_field<T: ?Sized + Serialize>(
            &mut self,
            _: &'static str,
            value: &T,
        ) -> Result<(), NonFinite> {
            value.serialize(FiniteFloats)
        }
        fn end(self) -> Result<(), NonFinite> {
            Ok(())
        }
    }

    impl ser::SerializeStructVariant for FiniteFloats {
        type Ok = ();
        type Error = NonFinite;

        fn serialize_field<T: ?Sized + Serialize>(
            &mut self,
            _: &'static str,
            value: &T,
        ) -> Result<(), NonFinite> {
            value.serialize(FiniteFloats)
        }
        fn end(self) -> Result<(), NonFinite> {
            Ok(())
        }
    }
}

macro_rules! describe_integer {
    ($($t:ty),*) => {
        $(
            impl Describe for $t {
                fn describe(&self) -> Result<Description, Error> {
                    Ok(Value::from(*self))
                }
            }
        )*
    };
}

describe_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! describe_float {
    ($($t:ty),*) => {
        $(
            impl Describe for $t {
                fn describe(&self) -> Result<Description, Error> {
                    Number::from_f64(f64::from(*self))
                        .map(Value::Number)
                        .ok_or_else(|| Error::undescribable::<$t>(format!("non-finite float {}", self)))
                }
            }
        )*
    };
}

describe_float!(f32, f64);

impl Describe for bool {
    fn describe(&self) -> Result<Description, Error> {
        Ok(Value::Bool(*self))
    }
}

impl Describe for str {
    fn describe(&self) -> Result<Description, Error> {
        Ok(Value::String(self.to_string()))
    }
}

impl Describe for String {
    fn describe(&self) -> Result<Description, Error> {
        self.as_str().describe()
    }
}

impl Describe for () {
    fn describe(&self) -> Result<Description, Error> {
        Ok(Value::Null)
    }
}

impl Describe for Value {
    fn describe(&self) -> Result<Description, Error> {
        Ok(self.clone())
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe(&self) -> Result<Description, Error> {
        match self {
            Some(value) => value.describe(),
            None => Ok(Value::Null),
        }
    }
}

impl<T: Describe> Describe for [T] {
    fn describe(&self) -> Result<Description, Error> {
        self.iter()
            .map(Describe::describe)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

impl<T: Describe, const N: usize> Describe for [T; N] {
    fn describe(&self) -> Result<Description, Error> {
        self.as_slice().describe()
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe(&self) -> Result<Description, Error> {
        self.as_slice().describe()
    }
}

impl<T: Describe + ?Sized> Describe for &T {
    fn describe(&self) -> Result<Description, Error> {
        (**self).describe()
    }
}

impl<T: Describe + ?Sized> Describe for Box<T> {
    fn describe(&self) -> Result<Description, Error> {
        (**self).describe()
    }
}

impl<T: Describe + ?Sized> Describe for Arc<T> {
    fn describe(&self) -> Result<Description, Error> {
        (**self).describe()
    }
}

impl<T: Describe> Describe for BTreeMap<String, T> {
    fn describe(&self) -> Result<Description, Error> {
        let mut map = Map::new();
        for (key, value) in self {
            map.insert(key.clone(), value.describe()?);
        }
        Ok(Value::Object(map))
    }
}

impl<T: Describe, S> Describe for HashMap<String, T, S> {
    fn describe(&self) -> Result<Description, Error> {
        // Map is ordered, so iteration order of the hash map does not leak
        let mut map = Map::new();
        for (key, value) in self {
            map.insert(key.clone(), value.describe()?);
        }
        Ok(Value::Object(map))
    }
}

macro_rules! describe_tuple {
    ($($name:ident),+) => {
        impl<$($name: Describe),+> Describe for ($($name,)+) {
            #[allow(non_snake_case)]
            fn describe(&self) -> Result<Description, Error> {
                let ($($name,)+) = self;
                Ok(Value::Array(vec![$($name.describe()?),+]))
            }
        }
    };
}

describe_tuple!(A);
describe_tuple!(A, B);
describe_tuple!(A, B, C);
describe_tuple!(A, B, C, D);

// ============================================================
// Pack - positional and keyword arguments of a call
// ============================================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pack {
    args: Vec<Description>,
    kwargs: BTreeMap<String, Description>,
}

impl Pack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to append a positional argument
    pub fn arg<T: Describe + ?Sized>(mut self, value: &T) -> Result<Self, Error> {
        self.args.push(value.describe()?);
        Ok(self)
    }

    /// Builder method to set a keyword argument, replacing a previous value
    pub fn kwarg<T: Describe + ?Sized>(mut self, key: &str, value: &T) -> Result<Self, Error> {
        self.kwargs.insert(key.to_string(), value.describe()?);
        Ok(self)
    }

    pub fn args(&self) -> &[Description] {
        &self.args
    }

    pub fn kwargs(&self) -> &BTreeMap<String, Description> {
        &self.kwargs
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

impl Describe for Pack {
    fn describe(&self) -> Result<Description, Error> {
        let mut kwargs = Map::new();
        for (key, value) in &self.kwargs {
            kwargs.insert(key.clone(), value.clone());
        }

        let mut map = Map::new();
        map.insert("args".to_string(), Value::Array(self.args.clone()));
        map.insert("kwargs".to_string(), Value::Object(kwargs));
        Ok(Value::Object(map))
    }
}

/// Argument lists that can be bundled into a [`Pack`].
///
/// Tuples contribute one positional argument per element.
pub trait ToPack {
    fn to_pack(&self) -> Result<Pack, Error>;
}

impl ToPack for Pack {
    fn to_pack(&self) -> Result<Pack, Error> {
        Ok(self.clone())
    }
}

impl ToPack for () {
    fn to_pack(&self) -> Result<Pack, Error> {
        Ok(Pack::new())
    }
}

macro_rules! to_pack_tuple {
    ($($name:ident),+) => {
        impl<$($name: Describe),+> ToPack for ($($name,)+) {
            #[allow(non_snake_case)]
            fn to_pack(&self) -> Result<Pack, Error> {
                let ($($name,)+) = self;
                Ok(Pack::new()$(.arg($name)?)+)
            }
        }
    };
}

to_pack_tuple!(A);
to_pack_tuple!(A, B);
to_pack_tuple!(A, B, C);
to_pack_tuple!(A, B, C, D);

// ============================================================
// Described - a value carrying its own description
// ============================================================

/// A value paired with a description supplied by whoever built it.
///
/// Used for values that hold closures, such as lazy datasets, whose structure
/// cannot be walked.
#[derive(Clone)]
pub struct Described<T> {
    value: T,
    description: Description,
}

impl<T> Described<T> {
    pub fn new(value: T, description: Description) -> Self {
        Self { value, description }
    }

    /// Build the value with `constructor` and describe it by its arguments.
    pub fn from_constructor<F>(name: &str, pack: Pack, constructor: F) -> Result<Self, Error>
    where
        F: FnOnce(&Pack) -> T,
    {
        let value = constructor(&pack);
        let mut map = Map::new();
        map.insert("constructor".to_string(), Value::String(name.to_string()));
        map.insert("pack".to_string(), pack.describe()?);
        Ok(Self::new(value, Value::Object(map)))
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Described<U> {
        Described {
            value: f(self.value),
            description: self.description,
        }
    }
}

impl<T> Describe for Described<T> {
    fn describe(&self) -> Result<Description, Error> {
        Ok(self.description.clone())
    }
}

impl<T> fmt::Debug for Described<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Described")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
