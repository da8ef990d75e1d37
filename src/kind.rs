use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

/// Wire kind bytes. Discriminants are part of the wire format and must not
/// change; 0xff doubles as the nil sentinel in type tags.
#[repr(u8)]
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, FromPrimitive, Debug)]
pub enum Kind {
    Bool = 1,
    Int = 2,
    Int8 = 3,
    Int16 = 4,
    Int32 = 5,
    Int64 = 6,
    Uint = 7,
    Uint8 = 8,
    Uint16 = 9,
    Uint32 = 10,
    Uint64 = 11,
    Uintptr = 12,
    Float32 = 13,
    Float64 = 14,
    Complex64 = 15,
    Complex128 = 16,
    Array = 17,
    Interface = 20,
    Map = 21,
    Pointer = 22,
    Slice = 23,
    String = 24,
    Struct = 25,
    Nil = 0xff,
}

impl Kind {
    pub fn from_byte(byte: u8) -> Option<Kind> {
        Kind::from_u8(byte)
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Whether this kind may appear inside a type tag. Record types carry
    /// no self-describing layout and must go through a registry instead.
    pub fn interface_encodable(self) -> bool {
        !matches!(self, Kind::Struct)
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Int8 => "int8",
            Kind::Int16 => "int16",
            Kind::Int32 => "int32",
            Kind::Int64 => "int64",
            Kind::Uint => "uint",
            Kind::Uint8 => "uint8",
            Kind::Uint16 => "uint16",
            Kind::Uint32 => "uint32",
            Kind::Uint64 => "uint64",
            Kind::Uintptr => "uintptr",
            Kind::Float32 => "float32",
            Kind::Float64 => "float64",
            Kind::Complex64 => "complex64",
            Kind::Complex128 => "complex128",
            Kind::Array => "array",
            Kind::Interface => "interface",
            Kind::Map => "map",
            Kind::Pointer => "ptr",
            Kind::Slice => "slice",
            Kind::String => "string",
            Kind::Struct => "struct",
            Kind::Nil => "nil",
        }
    }
}

#[cfg(test)]
mod test {
    use super::Kind;

    #[test]
    fn byte_conversions() {
        for kind in [
            Kind::Bool,
            Kind::Int,
            Kind::Uint8,
            Kind::Float64,
            Kind::Complex128,
            Kind::Array,
            Kind::Interface,
            Kind::Map,
            Kind::Pointer,
            Kind::Slice,
            Kind::String,
            Kind::Struct,
            Kind::Nil,
        ] {
            assert_eq!(Some(kind), Kind::from_byte(kind.to_byte()));
        }
    }

    #[test]
    fn unknown_bytes_rejected() {
        for byte in [0u8, 18, 19, 26, 27, 0x80, 0xfe] {
            assert_eq!(None, Kind::from_byte(byte));
        }
    }

    #[test]
    fn records_are_not_interface_encodable() {
        assert!(!Kind::Struct.interface_encodable());
        assert!(Kind::Interface.interface_encodable());
        assert!(Kind::Nil.interface_encodable());
    }
}
