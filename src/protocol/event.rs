//! Event model and JSON codec.
//!
//! An event is a name plus a payload that is explicitly nothing, one
//! argument, or many arguments. On the wire an event body is a JSON array
//! whose first element is the name and whose remaining elements are the
//! arguments in order; the payload variants map onto array lengths 1, 2,
//! and 3+ respectively, and adding an argument promotes the payload one
//! step at a time.
//!
//! Decoding consults the [`TypeRegistry`]: arguments of an event with a
//! registered type are materialized as [`TypedValue`]s, everything else
//! stays raw JSON. Encoding streams the body element by element through a
//! [`MessageWrite`] so large argument lists never need a single contiguous
//! buffer.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::registry::{TypeRegistry, TypedValue};
use crate::transport::duplex::TransportWriter;
use crate::transport::stream::MessageWrite;

// ============================================================================
// ArgumentValue
// ============================================================================

/// One event argument, either raw JSON or a registry-decoded value.
#[derive(Debug, Clone)]
pub enum ArgumentValue {
    /// Raw JSON, used when no type is registered for the event.
    Dynamic(Value),
    /// A value decoded into its registered Rust type.
    Typed(TypedValue),
}

impl ArgumentValue {
    /// The argument as JSON, serializing typed values back out.
    pub fn to_json(&self) -> Result<Value> {
        match self {
            Self::Dynamic(value) => Ok(value.clone()),
            Self::Typed(typed) => typed.to_json(),
        }
    }

    /// Borrows the raw JSON value, if this argument is dynamic.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Dynamic(value) => Some(value),
            Self::Typed(_) => None,
        }
    }

    /// Borrows the decoded value, if this argument is typed as `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Dynamic(_) => None,
            Self::Typed(typed) => typed.downcast_ref::<T>(),
        }
    }
}

impl From<Value> for ArgumentValue {
    fn from(value: Value) -> Self {
        Self::Dynamic(value)
    }
}

impl From<TypedValue> for ArgumentValue {
    fn from(typed: TypedValue) -> Self {
        Self::Typed(typed)
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Event payload with explicit zero/one/many arity.
///
/// A single `null` argument is a real argument: it stays
/// `One(Value::Null)` and is distinct from `None`.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// No arguments.
    #[default]
    None,
    /// Exactly one argument.
    One(ArgumentValue),
    /// Two or more arguments.
    Many(Vec<ArgumentValue>),
}

impl Payload {
    /// Appends an argument, promoting the variant as needed.
    pub fn push(&mut self, argument: ArgumentValue) {
        match std::mem::take(self) {
            Self::None => *self = Self::One(argument),
            Self::One(first) => *self = Self::Many(vec![first, argument]),
            Self::Many(mut arguments) => {
                arguments.push(argument);
                *self = Self::Many(arguments);
            }
        }
    }

    /// Arguments in order.
    #[must_use]
    pub fn as_slice(&self) -> &[ArgumentValue] {
        match self {
            Self::None => &[],
            Self::One(argument) => std::slice::from_ref(argument),
            Self::Many(arguments) => arguments,
        }
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::One(_) => 1,
            Self::Many(arguments) => arguments.len(),
        }
    }

    /// Whether there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::None)
    }
}

// ============================================================================
// Event
// ============================================================================

/// A named event and its arguments.
#[derive(Debug, Clone)]
pub struct Event {
    name: String,
    payload: Payload,
}

impl Event {
    /// Creates an event with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Payload::None,
        }
    }

    /// Creates an event with a single serializable argument.
    pub fn with_argument(name: impl Into<String>, argument: impl Serialize) -> Result<Self> {
        let mut event = Self::new(name);
        event.push_argument(argument)?;
        Ok(event)
    }

    /// Creates an event with several serializable arguments.
    pub fn with_arguments<I, T>(name: impl Into<String>, arguments: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Serialize,
    {
        let mut event = Self::new(name);
        for argument in arguments {
            event.push_argument(argument)?;
        }
        Ok(event)
    }

    /// Appends one serializable argument.
    pub fn push_argument(&mut self, argument: impl Serialize) -> Result<()> {
        self.payload
            .push(ArgumentValue::Dynamic(serde_json::to_value(argument)?));
        Ok(())
    }

    /// Appends an already-decoded typed argument.
    pub fn push_typed(&mut self, argument: TypedValue) {
        self.payload.push(ArgumentValue::Typed(argument));
    }

    /// Event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Event payload.
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// First argument, if any.
    #[must_use]
    pub fn argument(&self) -> Option<&ArgumentValue> {
        self.payload.as_slice().first()
    }

    /// All arguments in order.
    #[must_use]
    pub fn arguments(&self) -> &[ArgumentValue] {
        self.payload.as_slice()
    }
}

// ============================================================================
// Decode
// ============================================================================

/// Decodes an event body (the JSON array, messaging header already
/// consumed).
///
/// The body must be exactly one JSON array with a leading string name;
/// trailing bytes after the array are fatal. Arguments of an event with a
/// registered type are decoded through the registry, and a decode failure
/// there is fatal too.
pub(crate) fn decode_event(body: &[u8], registry: &TypeRegistry) -> Result<Event> {
    let value: Value = serde_json::from_slice(body)?;
    let Value::Array(elements) = value else {
        return Err(Error::parse("event body must be a JSON array"));
    };

    let mut elements = elements.into_iter();
    let name = match elements.next() {
        Some(Value::String(name)) => name,
        Some(_) => return Err(Error::parse("event name must be a string")),
        None => return Err(Error::parse("event body array is empty")),
    };

    let decoder = registry.decoder(&name);
    let mut event = Event::new(name);
    for element in elements {
        match &decoder {
            Some(decode) => event.push_typed(decode(element)?),
            None => event.payload.push(ArgumentValue::Dynamic(element)),
        }
    }
    Ok(event)
}

// ============================================================================
// Encode
// ============================================================================

/// Streams the event body into an in-progress message, element by element.
pub(crate) async fn write_event<W: TransportWriter>(
    event: &Event,
    writer: &mut MessageWrite<'_, W>,
) -> Result<()> {
    writer.write(b"[").await?;
    writer
        .write(serde_json::to_string(event.name())?.as_bytes())
        .await?;
    for argument in event.arguments() {
        writer.write(b",").await?;
        let encoded = serde_json::to_string(&argument.to_json()?)?;
        writer.write(encoded.as_bytes()).await?;
    }
    writer.write(b"]").await?;
    Ok(())
}

/// Encodes the event body to a buffer, for callers that do not stream.
#[cfg(test)]
pub(crate) fn encode_event_body(event: &Event) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    body.push(b'[');
    body.extend_from_slice(serde_json::to_string(event.name())?.as_bytes());
    for argument in event.arguments() {
        body.push(b',');
        body.extend_from_slice(serde_json::to_string(&argument.to_json()?)?.as_bytes());
    }
    body.push(b']');
    Ok(body)
}

// ============================================================================
// Tests
// ============================================================================
