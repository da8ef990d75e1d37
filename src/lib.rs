//! # anypack
//!
//! A self-describing binary codec: symmetric encode/decode pipelines
//! between in-memory values and a compact byte stream. Primitives,
//! strings, slices, fixed arrays, maps, optional indirection and
//! user-defined records are supported, plus an *object mode* in which each
//! top-level value is prefixed with a registry id so a receiver can decode
//! a stream of mixed record types without knowing their order in advance.
//!
//! # Serialization format
//!
//! Following pseudocode depicts the byte representation on the wire.
//! In-memory representations are distinct from this.
//!
//! ```text
//! // Statically typed positions carry no framing beyond their body:
//! bool:        u8 (0 or 1)
//! i8 / u8:     one raw byte
//! ints:        VarInt           // sign-bit base-128, see varint module
//! uints:       VarUint          // base-128
//! f32 / f64:   4 / 8 bytes, big-endian IEEE-754
//! complex:     two floats, real then imaginary
//! string:      VarUint byte length, raw utf-8 bytes
//! [T; N]:      N element bodies, no length prefix
//! Vec<T>:      VarUint element count, element bodies
//! Vec<u8>:     VarUint byte length, raw bytes
//! HashMap:     VarInt entry count (-1 = absent), key/value bodies
//! Option<T>:   u8 presence flag, then the body when present
//!
//! // An erased position (`Value`) prefixes the body with a type tag:
//! Tag := KindByte
//!      | KindByte Tag            // Pointer, Slice
//!      | KindByte VarUint Tag    // Array(length, inner)
//!      | KindByte Tag Tag        // Map(key, value)
//!      | 0xff                    // nil, no body follows
//!
//! // In object mode every top-level value becomes:
//! struct Object {
//!     id:    VarUint,            // position in the shared registry
//!     body:  field bodies in declared order, no tag
//! }
//! ```
//!
//! # Quick start
//!
//! ```
//! use anypack::{from_slice, to_vec, Options, Registry};
//!
//! anypack::record! {
//!     #[derive(Debug, Default, PartialEq)]
//!     pub struct Greeting {
//!         pub text: String,
//!         #[pack("max:255")]
//!         pub from: String,
//!     }
//! }
//!
//! # fn main() -> anypack::Result<()> {
//! let options = || Options::new().with_registry(Registry::new().with::<Greeting>());
//!
//! let greeting = Greeting { text: "hello".into(), from: "mars".into() };
//! let bytes = to_vec(&greeting, options())?;
//!
//! let decoded: anypack::AnyRecord = from_slice(&bytes, options())?;
//! assert_eq!(Some(&greeting), decoded.downcast_ref::<Greeting>());
//! # Ok(())
//! # }
//! ```
//!
//! Sessions ([`Packer`]/[`Unpacker`]) are single-threaded state machines;
//! the [`Socket`] wrapper adds a mutex per direction for full-duplex use
//! over TCP with optional deadlines.

mod desc;
mod error;
mod field;
mod kind;
mod limit;
mod marshal;
mod options;
mod packer;
mod record;
mod registry;
mod socket;
mod unpacker;
mod value;

pub mod varint;

pub use desc::TypeDesc;
pub use error::{PackError, Result};
pub use field::FieldOptions;
pub use kind::Kind;
pub use limit::{LimitedReader, LimitedWriter};
pub use marshal::{from_slice, to_vec};
pub use options::Options;
pub use packer::{Pack, Packer};
pub use record::{AnyRecord, DynRecord, FieldDesc, Record, RecordDesc};
pub use registry::{ObjectId, Registry};
pub use socket::Socket;
pub use unpacker::{Unpack, UnpackField, Unpacker};
pub use value::{Complex128, Complex64, Value};
