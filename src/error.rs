use std::io;
use std::string::FromUtf8Error;

use thiserror::Error;

use crate::kind::Kind;

pub type Result<T> = std::result::Result<T, PackError>;

/// Every failure the codec can surface. Variants carry the payload needed to
/// act on the failure programmatically; none are recovered internally.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid packed int")]
    InvalidPackedInt,

    #[error("invalid packed uint")]
    InvalidPackedUint,

    /// An unknown kind byte was found where a type tag was expected.
    #[error("invalid kind byte in type tag")]
    InvalidReceiver,

    /// A nil type appeared in a position that requires a concrete type,
    /// e.g. as the element type of a tagged container.
    #[error("attempted to encode nil outside of pointer or interface context")]
    Nil,

    /// A nil value reached an object-mode dispatch position.
    #[error("may not encode nil in object mode")]
    NilObject,

    /// In object mode the decode receiver must be [`AnyRecord`](crate::AnyRecord).
    #[error("in object mode, the decode receiver must be AnyRecord")]
    MustBePointerToInterface,

    #[error("value not registered in registry: {0}")]
    NotDefinedType(&'static str),

    #[error("id not registered in registry: {0}")]
    NotDefinedId(u64),

    #[error("invalid type provided: {0:?}")]
    InvalidType(&'static str),

    #[error("invalid kind provided for a map key: {0:?}")]
    InvalidTypeKey(Kind),

    /// A field-level `max` bound or the session size limit was exceeded.
    /// `type_name` is set when a field bound tripped, absent for the
    /// session-wide budget.
    #[error("data exceeds maximum allowed size; max: {max}, got: {size}")]
    DataTooLarge {
        max: u64,
        size: u64,
        type_name: Option<&'static str>,
    },

    #[error("cannot encode kind {kind:?} in interface mode in {context:?}")]
    CantUseInInterfaceMode { kind: Kind, context: &'static str },

    /// Tag or value nesting exceeded the codec's hard depth ceiling.
    #[error("nesting depth exceeds limit")]
    DepthLimit,

    /// A socket session was constructed without a registry.
    #[error("a registry is required for socket sessions")]
    RegistryRequired,

    /// A `before_pack`/`after_unpack` hook aborted the operation.
    #[error("hook failed: {0}")]
    Hook(String),

    #[error("invalid utf-8 in string body")]
    Utf8(#[source] FromUtf8Error),

    #[error("{0}")]
    Io(#[source] io::Error),
}

impl From<FromUtf8Error> for PackError {
    fn from(e: FromUtf8Error) -> Self {
        PackError::Utf8(e)
    }
}

/// The limited stream adapters report budget overruns through the `io`
/// traits; unwrap those back into the structured variant here.
impl From<io::Error> for PackError {
    fn from(e: io::Error) -> Self {
        let smuggled = e
            .get_ref()
            .map_or(false, |inner| inner.is::<PackError>());
        if !smuggled {
            return PackError::Io(e);
        }
        match e.into_inner() {
            Some(boxed) => match boxed.downcast::<PackError>() {
                Ok(pe) => *pe,
                Err(other) => PackError::Io(io::Error::other(other)),
            },
            None => PackError::Io(io::ErrorKind::Other.into()),
        }
    }
}
