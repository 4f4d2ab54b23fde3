//! Per-event-name type registry.
//!
//! Registering a type against an event name makes the decoder materialize
//! that event's object arguments as the registered type instead of raw JSON.
//! The registry is injected wherever decoding happens, so independent
//! clients can hold independent registries; sharing one is an `Arc` away.
//!
//! Type knowledge is erased at the registry boundary: each entry stores a
//! decode closure from raw JSON to a [`TypedValue`], and the `TypedValue`
//! carries its own encode closure, so neither the registry map nor the
//! event model is generic over argument types.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// TypedValue
// ============================================================================

/// A decoded argument carried with its concrete Rust type.
///
/// Holds the value behind `dyn Any` together with an encode closure captured
/// at construction, so it can be borrowed back out with
/// [`downcast_ref`](Self::downcast_ref) and serialized without knowing the
/// type at the call site.
#[derive(Clone)]
pub struct TypedValue {
    value: Arc<dyn Any + Send + Sync>,
    encode: Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<Value> + Send + Sync>,
    type_name: &'static str,
}

impl TypedValue {
    /// Wraps a concrete value.
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self {
            value: Arc::new(value),
            encode: Arc::new(|any| {
                let value = any
                    .downcast_ref::<T>()
                    .ok_or_else(|| Error::parse("typed value does not match its codec"))?;
                Ok(serde_json::to_value(value)?)
            }),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrows the concrete value, if `T` is the stored type.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Serializes the stored value back to JSON.
    pub fn to_json(&self) -> Result<Value> {
        (self.encode)(&*self.value)
    }

    /// Name of the stored type, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TypeRegistry
// ============================================================================

/// Erased decode closure stored per event name.
pub(crate) type DecodeFn = dyn Fn(Value) -> Result<TypedValue> + Send + Sync;

/// Maps event names to argument decoders.
#[derive(Default)]
pub struct TypeRegistry {
    decoders: RwLock<FxHashMap<String, Arc<DecodeFn>>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` as the argument type for `event_name`, replacing any
    /// earlier registration for the same name.
    pub fn register<T>(&self, event_name: impl Into<String>)
    where
        T: DeserializeOwned + Serialize + Send + Sync + 'static,
    {
        let event_name = event_name.into();
        debug!(
            event = %event_name,
            r#type = std::any::type_name::<T>(),
            "registered event argument type"
        );
        let decode: Arc<DecodeFn> = Arc::new(|raw: Value| {
            let value: T = serde_json::from_value(raw)?;
            Ok(TypedValue::new(value))
        });
        self.decoders.write().insert(event_name, decode);
    }

    /// Whether a type is registered for `event_name`.
    #[must_use]
    pub fn is_registered(&self, event_name: &str) -> bool {
        self.decoders.read().contains_key(event_name)
    }

    pub(crate) fn decoder(&self, event_name: &str) -> Option<Arc<DecodeFn>> {
        self.decoders.read().get(event_name).cloned()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("entries", &self.decoders.read().len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
