//! The decode session, the [`Unpack`] trait, and the object-safe
//! [`UnpackField`] bridge used to fill record fields in place. Every rule
//! here mirrors the encoder exactly; the two walks must agree byte for
//! byte or the stream is lost.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use crate::desc::{TypeDesc, MAX_NESTING_DEPTH};
use crate::error::{PackError, Result};
use crate::field::FieldOptions;
use crate::kind::Kind;
use crate::limit::LimitedReader;
use crate::options::Options;
use crate::record::{AnyRecord, Record};
use crate::registry::Registry;
use crate::value::{Complex128, Complex64, Value};
use crate::varint;

/// A type the codec can rebuild from the wire.
pub trait Unpack: Sized + 'static {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, opts: &FieldOptions) -> Result<Self>;
}

/// Object-safe in-place decoding, used for record field slots. Blanket
/// implemented for every [`Unpack`] type.
pub trait UnpackField {
    fn unpack_into(
        &mut self,
        u: &mut Unpacker,
        r: &mut LimitedReader<'_>,
        opts: &FieldOptions,
    ) -> Result<()>;
}

impl<T: Unpack> UnpackField for T {
    fn unpack_into(
        &mut self,
        u: &mut Unpacker,
        r: &mut LimitedReader<'_>,
        opts: &FieldOptions,
    ) -> Result<()> {
        *self = T::unpack(u, r, opts)?;
        Ok(())
    }
}

/// Stateful decoder. Not safe for concurrent use; a session that has
/// surfaced an error is invalidated and should be reconstructed.
pub struct Unpacker {
    read: u64,
    stop_at: u64,
    size_limit: u64,
    depth: usize,
    registry: Option<Arc<Registry>>,
    sub_registries: HashMap<String, Arc<Registry>>,
}

impl Unpacker {
    pub fn new(options: Options) -> Self {
        Self {
            read: 0,
            stop_at: 0,
            size_limit: options.size_limit,
            depth: 0,
            registry: options.registry,
            sub_registries: options.sub_registries,
        }
    }

    /// Total bytes consumed from the underlying streams so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    pub fn reset_counter(&mut self) {
        self.read = 0;
    }

    pub fn set_registry(&mut self, registry: Registry) {
        self.registry = Some(Arc::new(registry));
    }

    pub fn set_sub_registries(&mut self, subs: HashMap<String, Registry>) {
        self.sub_registries = subs
            .into_iter()
            .map(|(name, registry)| (name, Arc::new(registry)))
            .collect();
    }

    pub fn set_size_limit(&mut self, bytes: u64) {
        self.size_limit = bytes;
    }

    /// Decodes one top-level value from `r`.
    ///
    /// With a registry configured the session is in object mode: the
    /// receiver type must be [`AnyRecord`], the id prefix picks the record
    /// type, and the result holds a freshly decoded record of that type.
    pub fn decode<T: Unpack>(&mut self, r: &mut impl Read) -> Result<T> {
        self.stop_at = if self.size_limit > 0 {
            self.read + self.size_limit
        } else {
            0
        };
        self.depth = 0;
        let mut r = LimitedReader::new(r, self.size_limit);

        match self.registry.clone() {
            Some(registry) => {
                if TypeId::of::<T>() != TypeId::of::<AnyRecord>() {
                    return Err(PackError::MustBePointerToInterface);
                }
                let record = self.decode_top_object(&mut r, &registry)?;
                let boxed: Box<dyn Any> = Box::new(record);
                match boxed.downcast::<T>() {
                    Ok(record) => Ok(*record),
                    Err(_) => Err(PackError::MustBePointerToInterface),
                }
            }
            None => T::unpack(self, &mut r, &FieldOptions::default()),
        }
    }

    fn decode_top_object(
        &mut self,
        r: &mut LimitedReader<'_>,
        registry: &Registry,
    ) -> Result<AnyRecord> {
        let id = self.read_var_uint(r)?;
        let entry = registry.entry(id).ok_or(PackError::NotDefinedId(id))?;
        let unpack = entry.unpack;
        Ok(AnyRecord::from_box(unpack(self, r)?))
    }

    /// Decodes a record body: each non-ignored field in descriptor order,
    /// then the post hook.
    pub fn unpack_record<T: Record>(&mut self, r: &mut LimitedReader<'_>) -> Result<T> {
        let mut record = T::default();
        let desc = T::descriptor();

        for (field_desc, slot) in desc.fields.iter().zip(record.fields_mut()) {
            if field_desc.opts.ignore {
                continue;
            }
            slot.unpack_into(self, r, &field_desc.opts)?;
        }

        record.after_unpack()?;
        Ok(record)
    }

    pub(crate) fn sub_registry(&self, objects: &Option<String>) -> Option<Arc<Registry>> {
        objects
            .as_ref()
            .and_then(|name| self.sub_registries.get(name).cloned())
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(PackError::DepthLimit);
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // Byte-level helpers; every read flows through these so the counter
    // stays truthful.

    pub(crate) fn read_byte(&mut self, r: &mut LimitedReader<'_>) -> Result<u8> {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        self.read += 1;
        Ok(byte[0])
    }

    pub(crate) fn read_array<const N: usize>(
        &mut self,
        r: &mut LimitedReader<'_>,
    ) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        r.read_exact(&mut buf)?;
        self.read += N as u64;
        Ok(buf)
    }

    pub(crate) fn read_var_uint(&mut self, r: &mut LimitedReader<'_>) -> Result<u64> {
        let (n, value) = varint::read_var_uint(r)?;
        self.read += n as u64;
        Ok(value)
    }

    pub(crate) fn read_var_int(&mut self, r: &mut LimitedReader<'_>) -> Result<i64> {
        let (n, value) = varint::read_var_int(r)?;
        self.read += n as u64;
        Ok(value)
    }

    pub(crate) fn read_type_desc(&mut self, r: &mut LimitedReader<'_>) -> Result<TypeDesc> {
        let (n, desc) = TypeDesc::read(r, self.depth)?;
        self.read += n as u64;
        Ok(desc)
    }

    /// Length-prefix sanity for a body of `len` units, before anything is
    /// allocated. `size` reports how far past the budget the prefix points.
    pub(crate) fn check_count(
        &self,
        len: u64,
        opts: &FieldOptions,
        type_name: &'static str,
    ) -> Result<()> {
        if opts.max > 0 && len > opts.max {
            return Err(PackError::DataTooLarge {
                max: opts.max,
                size: len,
                type_name: Some(type_name),
            });
        }
        if self.stop_at > 0 && self.read.saturating_add(len) > self.stop_at {
            return Err(PackError::DataTooLarge {
                max: self.size_limit,
                size: self
                    .read
                    .saturating_add(len)
                    .saturating_sub(self.stop_at - self.size_limit),
                type_name: None,
            });
        }
        Ok(())
    }

    /// `len` raw bytes, bounds-checked before allocation.
    pub(crate) fn read_bytes(
        &mut self,
        r: &mut LimitedReader<'_>,
        len: u64,
        opts: &FieldOptions,
        type_name: &'static str,
    ) -> Result<Vec<u8>> {
        self.check_count(len, opts, type_name)?;
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; len as usize];
        r.read_exact(&mut buf)?;
        self.read += len;
        Ok(buf)
    }

    fn read_bools(
        &mut self,
        r: &mut LimitedReader<'_>,
        len: u64,
        opts: &FieldOptions,
    ) -> Result<Vec<bool>> {
        if opts.max > 0 && len > opts.max {
            return Err(PackError::DataTooLarge {
                max: opts.max,
                size: len,
                type_name: Some("bools"),
            });
        }
        let packed_len = len.div_ceil(8);
        if self.stop_at > 0 && self.read.saturating_add(packed_len) > self.stop_at {
            return Err(PackError::DataTooLarge {
                max: self.size_limit,
                size: self
                    .read
                    .saturating_add(packed_len)
                    .saturating_sub(self.stop_at - self.size_limit),
                type_name: None,
            });
        }

        let mut bools = Vec::with_capacity(len as usize);
        for _ in 0..packed_len {
            let byte = self.read_byte(r)?;
            for bit in 0..8 {
                if bools.len() as u64 == len {
                    break;
                }
                bools.push(byte & (1 << bit) != 0);
            }
        }
        Ok(bools)
    }

    /// Tag plus body of an erased value. A bare nil tag yields
    /// [`Value::Nil`] with no body.
    pub(crate) fn unpack_value(
        &mut self,
        r: &mut LimitedReader<'_>,
        opts: &FieldOptions,
    ) -> Result<Value> {
        let desc = self.read_type_desc(r)?;
        if desc == TypeDesc::Nil {
            return Ok(Value::Nil);
        }
        self.unpack_value_body(r, &desc, opts)
    }

    fn unpack_value_body(
        &mut self,
        r: &mut LimitedReader<'_>,
        desc: &TypeDesc,
        opts: &FieldOptions,
    ) -> Result<Value> {
        self.enter()?;
        let result = self.unpack_value_body_inner(r, desc, opts);
        self.leave();
        result
    }

    fn unpack_value_body_inner(
        &mut self,
        r: &mut LimitedReader<'_>,
        desc: &TypeDesc,
        opts: &FieldOptions,
    ) -> Result<Value> {
        match desc {
            // An erased position inside an erased value: read another tag.
            TypeDesc::Interface => self.unpack_value(r, &FieldOptions::default()),

            TypeDesc::Bool => Ok(Value::Bool(self.read_byte(r)? != 0)),
            TypeDesc::Int8 => Ok(Value::Int8(self.read_byte(r)? as i8)),
            TypeDesc::Uint8 => Ok(Value::Uint8(self.read_byte(r)?)),

            TypeDesc::Int => Ok(Value::Int(self.read_var_int(r)?)),
            TypeDesc::Int64 => Ok(Value::Int64(self.read_var_int(r)?)),
            TypeDesc::Int16 => {
                let v = self.read_var_int(r)?;
                let v = i16::try_from(v).map_err(|_| PackError::InvalidPackedInt)?;
                Ok(Value::Int16(v))
            }
            TypeDesc::Int32 => {
                let v = self.read_var_int(r)?;
                let v = i32::try_from(v).map_err(|_| PackError::InvalidPackedInt)?;
                Ok(Value::Int32(v))
            }

            TypeDesc::Uint => Ok(Value::Uint(self.read_var_uint(r)?)),
            TypeDesc::Uint64 => Ok(Value::Uint64(self.read_var_uint(r)?)),
            TypeDesc::Uintptr => Ok(Value::Uintptr(self.read_var_uint(r)?)),
            TypeDesc::Uint16 => {
                let v = self.read_var_uint(r)?;
                let v = u16::try_from(v).map_err(|_| PackError::InvalidPackedUint)?;
                Ok(Value::Uint16(v))
            }
            TypeDesc::Uint32 => {
                let v = self.read_var_uint(r)?;
                let v = u32::try_from(v).map_err(|_| PackError::InvalidPackedUint)?;
                Ok(Value::Uint32(v))
            }

            TypeDesc::Float32 => Ok(Value::Float32(f32::from_be_bytes(self.read_array(r)?))),
            TypeDesc::Float64 => Ok(Value::Float64(f64::from_be_bytes(self.read_array(r)?))),
            TypeDesc::Complex64 => {
                let re = f32::from_be_bytes(self.read_array(r)?);
                let im = f32::from_be_bytes(self.read_array(r)?);
                Ok(Value::Complex64(Complex64::new(re, im)))
            }
            TypeDesc::Complex128 => {
                let re = f64::from_be_bytes(self.read_array(r)?);
                let im = f64::from_be_bytes(self.read_array(r)?);
                Ok(Value::Complex128(Complex128::new(re, im)))
            }

            TypeDesc::Str => {
                let len = self.read_var_uint(r)?;
                let bytes = self.read_bytes(r, len, opts, "string")?;
                Ok(Value::Str(String::from_utf8(bytes)?))
            }

            TypeDesc::Slice(elem) if **elem == TypeDesc::Uint8 => {
                let len = self.read_var_uint(r)?;
                let bytes = self.read_bytes(r, len, opts, "bytes")?;
                Ok(Value::Bytes(bytes))
            }
            TypeDesc::Slice(elem) if **elem == TypeDesc::Bool => {
                let len = self.read_var_uint(r)?;
                let bools = self.read_bools(r, len, opts)?;
                Ok(Value::Bools(bools))
            }
            TypeDesc::Slice(elem) => {
                let len = self.read_var_uint(r)?;
                self.check_count(len, opts, "slice")?;
                let mut values = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    values.push(self.unpack_value_at(r, elem)?);
                }
                Ok(Value::Slice {
                    elem: (**elem).clone(),
                    values,
                })
            }

            TypeDesc::Array(len, elem) => {
                self.check_count(*len, opts, "array")?;
                let mut values = Vec::with_capacity(*len as usize);
                for _ in 0..*len {
                    values.push(self.unpack_value_at(r, elem)?);
                }
                Ok(Value::Array {
                    elem: (**elem).clone(),
                    values,
                })
            }

            TypeDesc::Map(key_desc, val_desc) => {
                let len = self.read_var_int(r)?;
                if len < 0 {
                    // Absent container stays absent.
                    return Ok(Value::Map {
                        key: (**key_desc).clone(),
                        val: (**val_desc).clone(),
                        entries: None,
                    });
                }
                self.check_count(len as u64, opts, "map")?;

                let mut entries = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    let key = self.unpack_value_at(r, key_desc)?;
                    let val = self.unpack_value_at(r, val_desc)?;
                    entries.push((key, val));
                }
                Ok(Value::Map {
                    key: (**key_desc).clone(),
                    val: (**val_desc).clone(),
                    entries: Some(entries),
                })
            }

            TypeDesc::Pointer(elem) => {
                let present = self.read_byte(r)?;
                if present == 0 {
                    return Ok(Value::Pointer {
                        elem: (**elem).clone(),
                        value: None,
                    });
                }
                let inner = self.unpack_value_at(r, elem)?;
                Ok(Value::Pointer {
                    elem: (**elem).clone(),
                    value: Some(Box::new(inner)),
                })
            }

            TypeDesc::Nil => Err(PackError::Nil),
            TypeDesc::Struct => Err(PackError::InvalidReceiver),
        }
    }

    fn unpack_value_at(&mut self, r: &mut LimitedReader<'_>, desc: &TypeDesc) -> Result<Value> {
        if matches!(desc, TypeDesc::Interface) {
            self.enter()?;
            let result = self.unpack_value(r, &FieldOptions::default());
            self.leave();
            result
        } else {
            self.unpack_value_body(r, desc, &FieldOptions::default())
        }
    }
}

impl Default for Unpacker {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Unpack for bool {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, _opts: &FieldOptions) -> Result<Self> {
        Ok(u.read_byte(r)? != 0)
    }
}

impl Unpack for i8 {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, _opts: &FieldOptions) -> Result<Self> {
        Ok(u.read_byte(r)? as i8)
    }
}

impl Unpack for u8 {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, _opts: &FieldOptions) -> Result<Self> {
        u.read_byte(r)
    }
}

macro_rules! impl_unpack_int {
    ($($ty:ty),* $(,)?) => {$(
        impl Unpack for $ty {
            fn unpack(
                u: &mut Unpacker,
                r: &mut LimitedReader<'_>,
                _opts: &FieldOptions,
            ) -> Result<Self> {
                let v = u.read_var_int(r)?;
                <$ty>::try_from(v).map_err(|_| PackError::InvalidPackedInt)
            }
        }
    )*};
}

macro_rules! impl_unpack_uint {
    ($($ty:ty),* $(,)?) => {$(
        impl Unpack for $ty {
            fn unpack(
                u: &mut Unpacker,
                r: &mut LimitedReader<'_>,
                _opts: &FieldOptions,
            ) -> Result<Self> {
                let v = u.read_var_uint(r)?;
                <$ty>::try_from(v).map_err(|_| PackError::InvalidPackedUint)
            }
        }
    )*};
}

impl_unpack_int!(i16, i32, i64, isize);
impl_unpack_uint!(u16, u32, u64, usize);

impl Unpack for f32 {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, _opts: &FieldOptions) -> Result<Self> {
        Ok(f32::from_be_bytes(u.read_array(r)?))
    }
}

impl Unpack for f64 {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, _opts: &FieldOptions) -> Result<Self> {
        Ok(f64::from_be_bytes(u.read_array(r)?))
    }
}

impl Unpack for Complex64 {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, _opts: &FieldOptions) -> Result<Self> {
        let re = f32::from_be_bytes(u.read_array(r)?);
        let im = f32::from_be_bytes(u.read_array(r)?);
        Ok(Complex64::new(re, im))
    }
}

impl Unpack for Complex128 {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, _opts: &FieldOptions) -> Result<Self> {
        let re = f64::from_be_bytes(u.read_array(r)?);
        let im = f64::from_be_bytes(u.read_array(r)?);
        Ok(Complex128::new(re, im))
    }
}

impl Unpack for String {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, opts: &FieldOptions) -> Result<Self> {
        let len = u.read_var_uint(r)?;
        let bytes = u.read_bytes(r, len, opts, "string")?;
        Ok(String::from_utf8(bytes)?)
    }
}

impl<T: Unpack> Unpack for Vec<T> {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, opts: &FieldOptions) -> Result<Self> {
        let len = u.read_var_uint(r)?;
        u.check_count(len, opts, "slice")?;

        let elem_opts = opts.for_elements();
        let mut items = Vec::with_capacity(len as usize);
        for _ in 0..len {
            items.push(T::unpack(u, r, &elem_opts)?);
        }
        Ok(items)
    }
}

impl<T: Unpack, const N: usize> Unpack for [T; N] {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, opts: &FieldOptions) -> Result<Self> {
        u.check_count(N as u64, opts, "array")?;

        let elem_opts = opts.for_elements();
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::unpack(u, r, &elem_opts)?);
        }
        items.try_into().map_err(|_| PackError::InvalidReceiver)
    }
}

impl<K, V> Unpack for HashMap<K, V>
where
    K: Unpack + Eq + std::hash::Hash,
    V: Unpack,
{
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, opts: &FieldOptions) -> Result<Self> {
        let len = u.read_var_int(r)?;
        if len < 0 {
            // The encoder wrote an absent map; the zero state here is empty.
            return Ok(HashMap::new());
        }
        u.check_count(len as u64, opts, "map")?;

        let elem_opts = opts.for_elements();
        let mut map = HashMap::with_capacity(len as usize);
        for _ in 0..len {
            let key = K::unpack(u, r, &FieldOptions::default())?;
            let val = V::unpack(u, r, &elem_opts)?;
            map.insert(key, val);
        }
        Ok(map)
    }
}

impl<T: Unpack> Unpack for Option<T> {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, opts: &FieldOptions) -> Result<Self> {
        let present = u.read_byte(r)?;
        if present == 0 {
            return Ok(None);
        }
        u.enter()?;
        let inner = T::unpack(u, r, opts);
        u.leave();
        Ok(Some(inner?))
    }
}

impl<T: Unpack> Unpack for Box<T> {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, opts: &FieldOptions) -> Result<Self> {
        Ok(Box::new(T::unpack(u, r, opts)?))
    }
}

impl Unpack for Value {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, opts: &FieldOptions) -> Result<Self> {
        u.unpack_value(r, opts)
    }
}

impl Unpack for AnyRecord {
    fn unpack(u: &mut Unpacker, r: &mut LimitedReader<'_>, opts: &FieldOptions) -> Result<Self> {
        let Some(registry) = u.sub_registry(&opts.objects) else {
            return Err(PackError::CantUseInInterfaceMode {
                kind: Kind::Struct,
                context: "AnyRecord",
            });
        };

        let id = u.read_var_uint(r)?;
        let entry = registry.entry(id).ok_or(PackError::NotDefinedId(id))?;
        let unpack = entry.unpack;
        Ok(AnyRecord::from_box(unpack(u, r)?))
    }
}
