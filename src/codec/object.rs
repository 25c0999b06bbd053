//! Object Codec Module
//!
//! Fallback for values outside the primitive set. The payload is
//! `[u16 name length][UTF-8 stable type name][UTF-8 JSON]`, and the recorded
//! name is resolved back to a concrete type on read.

use std::any::{self, Any};
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::type_name::stable_type_name;
use crate::error::{CacheError, Result};

/// Width of the type name length prefix.
const NAME_LENGTH_WIDTH: usize = 2;

// == Cache Object Trait ==
/// A serde type stored through the object codec.
///
/// `TYPE_NAME` identifies the type across deployments. It may be an
/// assembly-qualified name: version, culture and public key token are
/// stripped before it is written. Polymorphic members should be serde enums
/// (internally or externally tagged) so the JSON records the concrete variant.
pub trait CacheObject: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    const TYPE_NAME: &'static str;
}

// == Type Erasure ==
pub(crate) trait DynObject: fmt::Debug + Send + Sync {
    fn to_json(&self) -> serde_json::Result<String>;
    fn to_json_value(&self) -> serde_json::Result<serde_json::Value>;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: CacheObject> DynObject for T {
    fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn to_json_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

// == Object Value ==
/// A decoded or to-be-encoded object with its stable type name.
#[derive(Debug)]
pub struct ObjectValue {
    type_name: String,
    inner: Box<dyn DynObject>,
}

impl ObjectValue {
    pub fn new<T: CacheObject>(value: T) -> Self {
        Self {
            type_name: stable_type_name(T::TYPE_NAME),
            inner: Box::new(value),
        }
    }

    /// Stable type name recorded in the payload.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: CacheObject>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Takes the concrete value out, failing when it is another type.
    pub fn downcast<T: CacheObject>(self) -> Result<T> {
        let type_name = self.type_name;
        self.inner
            .into_any()
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| {
                CacheError::TypeResolution(format!(
                    "{type_name} cannot be read as {}",
                    any::type_name::<T>()
                ))
            })
    }

    /// JSON text of the wrapped value.
    pub fn to_json(&self) -> Result<String> {
        Ok(self.inner.to_json()?)
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        if self.type_name != other.type_name {
            return false;
        }
        match (self.inner.to_json_value(), other.inner.to_json_value()) {
            (Ok(left), Ok(right)) => left == right,
            _ => false,
        }
    }
}

// == Resolver ==
/// Turns JSON text back into a concrete type.
#[derive(Clone, Copy)]
pub struct ObjectResolver {
    type_name: &'static str,
    deserialize: fn(&str) -> serde_json::Result<Box<dyn DynObject>>,
}

fn deserialize_boxed<T: CacheObject>(text: &str) -> serde_json::Result<Box<dyn DynObject>> {
    let value: T = serde_json::from_str(text)?;
    Ok(Box::new(value))
}

impl ObjectResolver {
    pub fn of<T: CacheObject>() -> Self {
        Self {
            type_name: T::TYPE_NAME,
            deserialize: deserialize_boxed::<T>,
        }
    }

    /// Stable name this resolver answers to.
    pub fn type_name(&self) -> String {
        stable_type_name(self.type_name)
    }
}

impl fmt::Debug for ObjectResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectResolver")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

// == Type Registry ==
/// Object types the codec can resolve by name.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    resolvers: HashMap<String, ObjectResolver>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T`, replacing any type with the same stable name.
    pub fn register<T: CacheObject>(&mut self) -> &mut Self {
        let resolver = ObjectResolver::of::<T>();
        self.resolvers.insert(resolver.type_name(), resolver);
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T: CacheObject>(mut self) -> Self {
        self.register::<T>();
        self
    }

    /// Looks up a recorded name, normalizing it first.
    pub fn resolve(&self, type_name: &str) -> Option<&ObjectResolver> {
        self.resolvers.get(&stable_type_name(type_name))
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

// == Encode ==
/// Serializes the object and returns the `(name length, name, json)` parts.
pub(crate) fn encode_parts(object: &ObjectValue) -> Result<([u8; NAME_LENGTH_WIDTH], &[u8], String)> {
    let name = object.type_name.as_bytes();
    let name_len = u16::try_from(name.len()).map_err(|_| {
        CacheError::InvalidArgument(format!(
            "type name of {} bytes exceeds {} bytes",
            name.len(),
            u16::MAX
        ))
    })?;
    let json = object.to_json()?;
    Ok((name_len.to_le_bytes(), name, json))
}

// == Decode ==
/// Reads an object payload, resolving its recorded type.
///
/// `preferred` is tried before the registry, so typed reads work for types
/// that were never registered.
pub(crate) fn decode(
    payload: &[u8],
    registry: &TypeRegistry,
    preferred: Option<&ObjectResolver>,
) -> Result<ObjectValue> {
    let (len_bytes, rest) = payload
        .split_first_chunk::<NAME_LENGTH_WIDTH>()
        .ok_or_else(|| CacheError::Corrupt("object payload lacks a type name length".into()))?;
    let name_len = usize::from(u16::from_le_bytes(*len_bytes));
    if rest.len() < name_len {
        return Err(CacheError::Corrupt(format!(
            "type name of {name_len} bytes overruns a {} byte payload",
            rest.len()
        )));
    }

    let (name, text) = rest.split_at(name_len);
    let name = std::str::from_utf8(name)
        .map_err(|e| CacheError::Corrupt(format!("type name is not UTF-8: {e}")))?;
    let text = std::str::from_utf8(text)
        .map_err(|e| CacheError::Corrupt(format!("object text is not UTF-8: {e}")))?;

    let type_name = stable_type_name(name);
    let resolver = preferred
        .filter(|resolver| resolver.type_name() == type_name)
        .or_else(|| registry.resolve(&type_name))
        .ok_or_else(|| CacheError::TypeResolution(type_name.clone()))?;

    let inner = (resolver.deserialize)(text)?;
    Ok(ObjectValue { type_name, inner })
}
