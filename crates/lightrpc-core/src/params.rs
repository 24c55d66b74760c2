//! Parameter codec
//!
//! Converts between a method's declared fields and a JSON `params` payload,
//! either as a named object or as a positional array.
//!
//! Each method type carries a static field table ([`FieldSpec`]) and two
//! accessors that hand out its fields as [`Param`] trait objects. The codec
//! walks the table; the per-type [`Param`] impls do the actual conversion and
//! recurse into sequences, maps, optional values and nested structs.
//!
//! The [`params!`](crate::params!) macro declares a struct together with its
//! field table:
//!
//! ```
//! use lightrpc_core::params;
//!
//! params! {
//!     #[derive(Debug, Default, Clone, PartialEq)]
//!     pub struct Invoice {
//!         pub label: String,
//!         pub amount: u64 => "msatoshi",
//!         pub fallbacks: Vec<String> [omit_empty],
//!         pub cache: Option<String> [skip],
//!     }
//! }
//! ```
//!
//! A field without `=> "name"` is matched by its lower-cased identifier.
//! `[omit_empty]` drops the field from encoded params while it holds its zero
//! value; `[skip]` hides it from the codec entirely.

use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use crate::error::{CodecError, Result};

/// One declared field of a method type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub ident: &'static str,
    pub wire: Option<&'static str>,
    pub omit_empty: bool,
    pub exposed: bool,
}

impl FieldSpec {
    /// Name used when encoding named params.
    pub fn wire_name(&self) -> Cow<'static, str> {
        match self.wire {
            Some(wire) => Cow::Borrowed(wire),
            None => Cow::Owned(self.ident.to_lowercase()),
        }
    }

    /// Incoming keys match the declared wire name exactly, or the lower-cased
    /// identifier.
    pub fn matches(&self, key: &str) -> bool {
        self.wire == Some(key) || key == self.ident.to_lowercase()
    }
}

/// Decoding state threaded through nested values.
#[derive(Debug, Clone)]
pub struct Context {
    strict: bool,
    path: String,
}

impl Context {
    pub fn new(root: &str, strict: bool) -> Self {
        Self {
            strict,
            path: root.to_string(),
        }
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Dotted location of the value being decoded, e.g. `Outer.inner.b`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn child(&self, segment: &str) -> Self {
        Self {
            strict: self.strict,
            path: format!("{}.{}", self.path, segment),
        }
    }

    pub fn index(&self, index: usize) -> Self {
        Self {
            strict: self.strict,
            path: format!("{}[{}]", self.path, index),
        }
    }

    pub fn mismatch(&self, expected: &'static str, found: &Value) -> CodecError {
        CodecError::Mismatch {
            path: self.path.clone(),
            expected,
            found: kind_of(found),
        }
    }
}

/// A value that can sit in a method field.
pub trait Param {
    fn encode(&self) -> Value;

    /// Whether the value equals its type's zero value.
    fn is_zero(&self) -> bool;

    fn decode(&mut self, value: &Value, cx: &Context) -> Result<()>;

    #[doc(hidden)]
    fn encode_seq(items: &[Self]) -> Value
    where
        Self: Sized,
    {
        Value::Array(items.iter().map(Param::encode).collect())
    }

    #[doc(hidden)]
    fn decode_seq_str(_text: &str, _cx: &Context) -> Option<Result<Vec<Self>>>
    where
        Self: Sized,
    {
        None
    }
}

/// A struct whose fields are reachable through a static field table.
///
/// Usually implemented with the [`params!`](crate::params!) macro.
pub trait Params: Default {
    const TYPE_NAME: &'static str;
    const FIELDS: &'static [FieldSpec];

    fn field(&self, ident: &str) -> Option<&dyn Param>;

    fn field_mut(&mut self, ident: &str) -> Option<&mut dyn Param>;
}

/// Encode the exposed fields as a named params object.
pub fn encode_named<P: Params>(target: &P) -> Map<String, Value> {
    let mut params = Map::new();
    for spec in P::FIELDS.iter().filter(|spec| spec.exposed) {
        let Some(field) = target.field(spec.ident) else {
            continue;
        };
        if spec.omit_empty && field.is_zero() {
            continue;
        }
        params.insert(spec.wire_name().into_owned(), field.encode());
    }
    params
}

/// Decode a named params object into `target`.
pub fn decode_named<P: Params>(
    target: &mut P,
    params: &Map<String, Value>,
    strict: bool,
) -> Result<()> {
    decode_object(target, params, &Context::new(P::TYPE_NAME, strict))
}

/// Decode a positional params array into `target`, in declaration order.
pub fn decode_positional<P: Params>(
    target: &mut P,
    params: &[Value],
    method: &str,
    strict: bool,
) -> Result<()> {
    let expected = P::FIELDS.iter().filter(|spec| spec.exposed).count();
    if params.len() > expected {
        return Err(CodecError::TooManyParams {
            expected,
            received: params.len(),
            method: method.to_string(),
        });
    }

    let cx = Context::new(P::TYPE_NAME, strict);
    for (spec, value) in P::FIELDS.iter().zip(params) {
        let field_cx = cx.child(spec.ident);
        if !spec.exposed {
            return Err(CodecError::Unsettable {
                path: field_cx.path().to_string(),
            });
        }
        decode_field(target, spec, value, &field_cx)?;
    }
    Ok(())
}

/// Decode a nested struct field from a JSON object.
pub fn decode_nested<P: Params>(target: &mut P, value: &Value, cx: &Context) -> Result<()> {
    match value {
        Value::Object(map) => decode_object(target, map, cx),
        other => Err(cx.mismatch("object", other)),
    }
}

/// A struct is zero when every exposed field is.
pub fn fields_zero<P: Params>(target: &P) -> bool {
    P::FIELDS
        .iter()
        .filter(|spec| spec.exposed)
        .filter_map(|spec| target.field(spec.ident))
        .all(|field| field.is_zero())
}

fn decode_object<P: Params>(target: &mut P, params: &Map<String, Value>, cx: &Context) -> Result<()> {
    for (key, value) in params {
        let spec = P::FIELDS
            .iter()
            .find(|spec| spec.exposed && spec.matches(key));

        match spec {
            Some(spec) => decode_field(target, spec, value, &cx.child(spec.ident))?,
            None if cx.strict() => {
                return Err(CodecError::UnknownField {
                    path: cx.child(key).path().to_string(),
                });
            }
            None => {}
        }
    }
    Ok(())
}

fn decode_field<P: Params>(
    target: &mut P,
    spec: &FieldSpec,
    value: &Value,
    cx: &Context,
) -> Result<()> {
    let field = target
        .field_mut(spec.ident)
        .ok_or_else(|| CodecError::Unsettable {
            path: cx.path().to_string(),
        })?;
    field.decode(value, cx)
}

pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn number_parts(value: &Value, cx: &Context) -> Result<(Option<i64>, Option<u64>, f64)> {
    match value {
        Value::Number(n) => Ok((n.as_i64(), n.as_u64(), n.as_f64().unwrap_or_default())),
        other => Err(CodecError::ExpectedNumber {
            path: cx.path().to_string(),
            found: kind_of(other),
        }),
    }
}

macro_rules! int_param {
    ($($ty:ty),* $(,)?) => {$(
        impl Param for $ty {
            fn encode(&self) -> Value {
                Value::from(*self)
            }

            fn is_zero(&self) -> bool {
                *self == 0
            }

            fn decode(&mut self, value: &Value, cx: &Context) -> Result<()> {
                // Narrowing follows `as` semantics, so out-of-range input wraps
                // or saturates instead of failing.
                *self = match number_parts(value, cx)? {
                    (Some(signed), _, _) => signed as $ty,
                    (None, Some(unsigned), _) => unsigned as $ty,
                    (None, None, float) => float as $ty,
                };
                Ok(())
            }
        }
    )*};
}

int_param!(i8, i16, i32, i64, isize, u16, u32, u64, usize);

impl Param for u8 {
    fn encode(&self) -> Value {
        Value::from(*self)
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }

    fn decode(&mut self, value: &Value, cx: &Context) -> Result<()> {
        *self = match number_parts(value, cx)? {
            (Some(signed), _, _) => signed as u8,
            (None, Some(unsigned), _) => unsigned as u8,
            (None, None, float) => float as u8,
        };
        Ok(())
    }

    fn encode_seq(items: &[Self]) -> Value {
        Value::String(hex::encode(items))
    }

    fn decode_seq_str(text: &str, cx: &Context) -> Option<Result<Vec<Self>>> {
        Some(hex::decode(text).map_err(|source| CodecError::Hex {
            path: cx.path().to_string(),
            source,
        }))
    }
}

macro_rules! float_param {
    ($($ty:ty),*) => {$(
        impl Param for $ty {
            fn encode(&self) -> Value {
                Value::from(*self)
            }

            fn is_zero(&self) -> bool {
                *self == 0.0
            }

            fn decode(&mut self, value: &Value, cx: &Context) -> Result<()> {
                match value {
                    Value::Number(n) => {
                        *self = n.as_f64().unwrap_or_default() as $ty;
                        Ok(())
                    }
                    other => Err(cx.mismatch("number", other)),
                }
            }
        }
    )*};
}

float_param!(f32, f64);

impl Param for bool {
    fn encode(&self) -> Value {
        Value::Bool(*self)
    }

    fn is_zero(&self) -> bool {
        !*self
    }

    fn decode(&mut self, value: &Value, cx: &Context) -> Result<()> {
        match value {
            Value::Bool(b) => {
                *self = *b;
                Ok(())
            }
            other => Err(cx.mismatch("bool", other)),
        }
    }
}

impl Param for String {
    fn encode(&self) -> Value {
        Value::String(self.clone())
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn decode(&mut self, value: &Value, cx: &Context) -> Result<()> {
        match value {
            Value::String(s) => {
                self.clone_from(s);
                Ok(())
            }
            other => Err(cx.mismatch("string", other)),
        }
    }
}

/// Raw passthrough: whatever JSON arrives is stored unchanged.
impl Param for Value {
    fn encode(&self) -> Value {
        self.clone()
    }

    fn is_zero(&self) -> bool {
        self.is_null()
    }

    fn decode(&mut self, value: &Value, _cx: &Context) -> Result<()> {
        *self = value.clone();
        Ok(())
    }
}

impl<T: Param + Default> Param for Vec<T> {
    fn encode(&self) -> Value {
        T::encode_seq(self)
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn decode(&mut self, value: &Value, cx: &Context) -> Result<()> {
        if let Value::String(text) = value {
            if let Some(decoded) = T::decode_seq_str(text, cx) {
                *self = decoded?;
                return Ok(());
            }
        }

        let Value::Array(items) = value else {
            return Err(cx.mismatch("array", value));
        };

        let mut decoded = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let mut elem = T::default();
            elem.decode(item, &cx.index(i))?;
            decoded.push(elem);
        }
        *self = decoded;
        Ok(())
    }
}

/// `null` leaves the value untouched; anything else allocates if needed and
/// decodes into the inner value.
impl<T: Param + Default> Param for Option<T> {
    fn encode(&self) -> Value {
        match self {
            Some(inner) => inner.encode(),
            None => Value::Null,
        }
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }

    fn decode(&mut self, value: &Value, cx: &Context) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        self.get_or_insert_with(T::default).decode(value, cx)
    }
}

impl<T: Param + Default> Param for Box<T> {
    fn encode(&self) -> Value {
        self.as_ref().encode()
    }

    fn is_zero(&self) -> bool {
        self.as_ref().is_zero()
    }

    fn decode(&mut self, value: &Value, cx: &Context) -> Result<()> {
        self.as_mut().decode(value, cx)
    }
}

macro_rules! map_param {
    ($($map:ident),*) => {$(
        impl<T: Param + Default> Param for $map<String, T> {
            fn encode(&self) -> Value {
                Value::Object(
                    self.iter()
                        .map(|(key, value)| (key.clone(), value.encode()))
                        .collect(),
                )
            }

            fn is_zero(&self) -> bool {
                self.is_empty()
            }

            fn decode(&mut self, value: &Value, cx: &Context) -> Result<()> {
                let Value::Object(entries) = value else {
                    return Err(cx.mismatch("object", value));
                };

                let mut decoded = $map::new();
                for (key, entry) in entries {
                    let mut elem = T::default();
                    elem.decode(entry, &cx.child(key))?;
                    decoded.insert(key.clone(), elem);
                }
                *self = decoded;
                Ok(())
            }
        }
    )*};
}

map_param!(HashMap, BTreeMap);

/// Declare a struct usable as method params.
///
/// See the [module docs](crate::params) for the field syntax.
#[macro_export]
macro_rules! params {
    (@wire) => { None };
    (@wire $wire:literal) => { Some($wire) };
    (@omit_empty) => { false };
    (@omit_empty omit_empty) => { true };
    (@omit_empty skip) => { false };
    (@exposed) => { true };
    (@exposed omit_empty) => { true };
    (@exposed skip) => { false };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $fty:ty $(=> $wire:literal)? $([$flag:ident])?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $fty,
            )*
        }

        impl $crate::params::Params for $name {
            const TYPE_NAME: &'static str = stringify!($name);
            const FIELDS: &'static [$crate::params::FieldSpec] = &[
                $(
                    $crate::params::FieldSpec {
                        ident: stringify!($field),
                        wire: $crate::params!(@wire $($wire)?),
                        omit_empty: $crate::params!(@omit_empty $($flag)?),
                        exposed: $crate::params!(@exposed $($flag)?),
                    },
                )*
            ];

            #[allow(unused_variables)]
            fn field(&self, ident: &str) -> Option<&dyn $crate::params::Param> {
                match ident {
                    $( stringify!($field) => Some(&self.$field), )*
                    _ => None,
                }
            }

            #[allow(unused_variables)]
            fn field_mut(&mut self, ident: &str) -> Option<&mut dyn $crate::params::Param> {
                match ident {
                    $( stringify!($field) => Some(&mut self.$field), )*
                    _ => None,
                }
            }
        }

        impl $crate::params::Param for $name {
            fn encode(&self) -> $crate::serde_json::Value {
                $crate::serde_json::Value::Object($crate::params::encode_named(self))
            }

            fn is_zero(&self) -> bool {
                $crate::params::fields_zero(self)
            }

            fn decode(
                &mut self,
                value: &$crate::serde_json::Value,
                cx: &$crate::params::Context,
            ) -> $crate::error::Result<()> {
                $crate::params::decode_nested(self, value, cx)
            }
        }
    };
}
