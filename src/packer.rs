//! The encode session and the [`Pack`] trait implemented by every type the
//! codec can emit. The session owns configuration and the running byte
//! counter; the destination stream is handed in per top-level call, which
//! is also where the per-operation size budget is armed.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use crate::desc::TypeDesc;
use crate::error::{PackError, Result};
use crate::field::FieldOptions;
use crate::kind::Kind;
use crate::limit::LimitedWriter;
use crate::options::Options;
use crate::record::{AnyRecord, Record};
use crate::registry::{lookup_id, Registry};
use crate::value::{Complex128, Complex64, Value};
use crate::varint;

/// A type that can be written to the wire. `static_desc` is the reflection
/// hook: the concrete type tree of the implementor, used to build record
/// descriptors and container tags.
pub trait Pack: Any {
    fn static_desc() -> TypeDesc
    where
        Self: Sized;

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, opts: &FieldOptions) -> Result<()>;
}

/// Stateful encoder. Not safe for concurrent use; concurrent sessions over
/// disjoint state are independent.
pub struct Packer {
    written: u64,
    stop_at: u64,
    size_limit: u64,
    registry: Option<Arc<Registry>>,
    sub_registries: HashMap<String, Arc<Registry>>,
}

impl Packer {
    pub fn new(options: Options) -> Self {
        Self {
            written: 0,
            stop_at: 0,
            size_limit: options.size_limit,
            registry: options.registry,
            sub_registries: options.sub_registries,
        }
    }

    /// Total bytes written to the underlying streams so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn reset_counter(&mut self) {
        self.written = 0;
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

    /// Encodes one top-level value into `w`.
    ///
    /// With a registry configured the session is in object mode: the value
    /// must be a registered record (or an [`AnyRecord`] holding one) and is
    /// prefixed with its id. Otherwise the value is written according to
    /// its static type, tagged only if that type is erased.
    pub fn encode<T: Pack>(&mut self, w: &mut impl Write, data: &T) -> Result<()> {
        self.stop_at = if self.size_limit > 0 {
            self.written + self.size_limit
        } else {
            0
        };
        let mut w = LimitedWriter::new(w, self.size_limit);

        match self.registry.clone() {
            Some(registry) => self.encode_top_object(&mut w, data, &registry),
            None => data.pack(self, &mut w, &FieldOptions::default()),
        }
    }

    fn encode_top_object<T: Pack>(
        &mut self,
        w: &mut LimitedWriter<'_>,
        data: &T,
        registry: &Registry,
    ) -> Result<()> {
        let any: &dyn Any = data;
        if let Some(erased) = any.downcast_ref::<AnyRecord>() {
            return self.pack_object_dyn(w, erased, registry);
        }

        let id = lookup_id(registry, TypeId::of::<T>(), type_name::<T>())?;
        self.write_var_uint(w, id)?;
        data.pack(self, w, &FieldOptions::default())
    }

    /// Writes `id(record)` then the record body through `registry`.
    pub(crate) fn pack_object_dyn(
        &mut self,
        w: &mut LimitedWriter<'_>,
        record: &AnyRecord,
        registry: &Registry,
    ) -> Result<()> {
        let id = lookup_id(registry, record.type_id(), record.type_name())?;
        self.write_var_uint(w, id)?;
        record.pack_body(self, w)
    }

    /// Encodes a record body: hook, then each non-ignored field in
    /// descriptor order. Records carry no length or tag framing of their
    /// own; configuration identity is the compatibility contract.
    pub fn pack_record<T: Record>(&mut self, w: &mut LimitedWriter<'_>, record: &T) -> Result<()> {
        record.before_pack()?;

        let desc = T::descriptor();
        let fields = record.fields();
        debug_assert_eq!(desc.fields.len(), fields.len());

        for (field_desc, field) in desc.fields.iter().zip(fields) {
            if field_desc.opts.ignore {
                continue;
            }
            field.pack(self, w, &field_desc.opts)?;
        }
        Ok(())
    }

    pub(crate) fn sub_registry(&self, objects: &Option<String>) -> Option<Arc<Registry>> {
        objects
            .as_ref()
            .and_then(|name| self.sub_registries.get(name).cloned())
    }

    // Byte-level helpers; every write flows through these so the counter
    // stays truthful.

    pub(crate) fn write_byte(&mut self, w: &mut LimitedWriter<'_>, byte: u8) -> Result<()> {
        w.write_all(&[byte])?;
        self.written += 1;
        Ok(())
    }

    pub(crate) fn write_raw(&mut self, w: &mut LimitedWriter<'_>, bytes: &[u8]) -> Result<()> {
        w.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    pub(crate) fn write_var_uint(&mut self, w: &mut LimitedWriter<'_>, v: u64) -> Result<()> {
        let n = varint::write_var_uint(w, v)?;
        self.written += n as u64;
        Ok(())
    }

    pub(crate) fn write_var_int(&mut self, w: &mut LimitedWriter<'_>, v: i64) -> Result<()> {
        let n = varint::write_var_int(w, v)?;
        self.written += n as u64;
        Ok(())
    }

    pub(crate) fn write_type_desc(
        &mut self,
        w: &mut LimitedWriter<'_>,
        desc: &TypeDesc,
    ) -> Result<()> {
        let n = desc.write(w)?;
        self.written += n as u64;
        Ok(())
    }

    /// Field `max` and session budget checks for a variable-sized body of
    /// `len` units (bytes for strings, elements for containers).
    pub(crate) fn check_len(
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
        if self.stop_at > 0 && self.written.saturating_add(len) > self.stop_at {
            return Err(PackError::DataTooLarge {
                max: self.size_limit,
                size: self.written.saturating_add(len),
                type_name: None,
            });
        }
        Ok(())
    }

    /// Length-prefixed raw bytes: the body of strings and byte slices.
    pub(crate) fn pack_bytes(
        &mut self,
        w: &mut LimitedWriter<'_>,
        bytes: &[u8],
        opts: &FieldOptions,
        type_name: &'static str,
    ) -> Result<()> {
        self.check_len(bytes.len() as u64, opts, type_name)?;
        self.write_var_uint(w, bytes.len() as u64)?;
        self.write_raw(w, bytes)
    }

    /// Count, then eight booleans per byte, lsb-first.
    fn pack_bools(
        &mut self,
        w: &mut LimitedWriter<'_>,
        bools: &[bool],
        opts: &FieldOptions,
    ) -> Result<()> {
        let packed_len = (bools.len() as u64).div_ceil(8);
        if opts.max > 0 && bools.len() as u64 > opts.max {
            return Err(PackError::DataTooLarge {
                max: opts.max,
                size: bools.len() as u64,
                type_name: Some("bools"),
            });
        }
        if self.stop_at > 0 && self.written + packed_len > self.stop_at {
            return Err(PackError::DataTooLarge {
                max: self.size_limit,
                size: self.written + packed_len,
                type_name: None,
            });
        }

        self.write_var_uint(w, bools.len() as u64)?;
        for chunk in bools.chunks(8) {
            let mut byte = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                if bit {
                    byte |= 1 << i;
                }
            }
            self.write_byte(w, byte)?;
        }
        Ok(())
    }

    /// Tag plus body for an erased value.
    pub(crate) fn pack_value(
        &mut self,
        w: &mut LimitedWriter<'_>,
        value: &Value,
        opts: &FieldOptions,
    ) -> Result<()> {
        let desc = value.type_desc();
        self.write_type_desc(w, &desc)?;
        if matches!(value, Value::Nil) {
            return Ok(());
        }
        self.pack_value_body(w, &desc, value, opts)
    }

    /// Body of an erased value, directed by `desc`. Callers derive `desc`
    /// from the value itself except at map key/value positions, where the
    /// container's descriptor governs and a mismatched entry is an error.
    fn pack_value_body(
        &mut self,
        w: &mut LimitedWriter<'_>,
        desc: &TypeDesc,
        value: &Value,
        opts: &FieldOptions,
    ) -> Result<()> {
        match (desc, value) {
            (TypeDesc::Interface, v) => self.pack_value(w, v, &FieldOptions::default()),

            (TypeDesc::Bool, Value::Bool(b)) => self.write_byte(w, u8::from(*b)),
            (TypeDesc::Int8, Value::Int8(i)) => self.write_byte(w, *i as u8),
            (TypeDesc::Uint8, Value::Uint8(u)) => self.write_byte(w, *u),

            (TypeDesc::Int, Value::Int(i)) | (TypeDesc::Int64, Value::Int64(i)) => {
                self.write_var_int(w, *i)
            }
            (TypeDesc::Int16, Value::Int16(i)) => self.write_var_int(w, i64::from(*i)),
            (TypeDesc::Int32, Value::Int32(i)) => self.write_var_int(w, i64::from(*i)),

            (TypeDesc::Uint, Value::Uint(u))
            | (TypeDesc::Uint64, Value::Uint64(u))
            | (TypeDesc::Uintptr, Value::Uintptr(u)) => self.write_var_uint(w, *u),
            (TypeDesc::Uint16, Value::Uint16(u)) => self.write_var_uint(w, u64::from(*u)),
            (TypeDesc::Uint32, Value::Uint32(u)) => self.write_var_uint(w, u64::from(*u)),

            (TypeDesc::Float32, Value::Float32(f)) => self.write_raw(w, &f.to_be_bytes()),
            (TypeDesc::Float64, Value::Float64(f)) => self.write_raw(w, &f.to_be_bytes()),
            (TypeDesc::Complex64, Value::Complex64(c)) => {
                self.write_raw(w, &c.re.to_be_bytes())?;
                self.write_raw(w, &c.im.to_be_bytes())
            }
            (TypeDesc::Complex128, Value::Complex128(c)) => {
                self.write_raw(w, &c.re.to_be_bytes())?;
                self.write_raw(w, &c.im.to_be_bytes())
            }

            (TypeDesc::Str, Value::Str(s)) => self.pack_bytes(w, s.as_bytes(), opts, "string"),

            (TypeDesc::Slice(elem), Value::Bytes(bytes)) if **elem == TypeDesc::Uint8 => {
                self.pack_bytes(w, bytes, opts, "bytes")
            }
            (TypeDesc::Slice(elem), Value::Bools(bools)) if **elem == TypeDesc::Bool => {
                self.pack_bools(w, bools, opts)
            }
            (TypeDesc::Slice(elem), Value::Slice { values, .. }) => {
                self.check_len(values.len() as u64, opts, "slice")?;
                self.write_var_uint(w, values.len() as u64)?;
                self.pack_value_elems(w, elem, values)
            }

            (TypeDesc::Array(len, elem), Value::Array { values, .. }) => {
                if *len != values.len() as u64 {
                    return Err(PackError::InvalidType("array"));
                }
                self.check_len(*len, opts, "array")?;
                self.pack_value_elems(w, elem, values)
            }

            (TypeDesc::Map(key_desc, val_desc), Value::Map { entries, .. }) => {
                crate::desc::check_map_key(key_desc)?;
                let len = entries.as_ref().map_or(0, |e| e.len() as u64);
                self.check_len(len, opts, "map")?;

                let Some(entries) = entries else {
                    // Absent container: -1, and the decoder leaves it absent.
                    return self.write_var_int(w, -1);
                };
                self.write_var_int(w, entries.len() as i64)?;

                for (key, val) in entries {
                    self.pack_value_at(w, key_desc, key)?;
                    self.pack_value_at(w, val_desc, val)?;
                }
                Ok(())
            }

            (TypeDesc::Pointer(elem), Value::Pointer { value, .. }) => match value {
                None => self.write_byte(w, 0),
                Some(inner) => {
                    self.write_byte(w, 1)?;
                    self.pack_value_at(w, elem, inner)
                }
            },

            (_, mismatched) => Err(PackError::InvalidType(mismatched.kind_name())),
        }
    }

    fn pack_value_elems(
        &mut self,
        w: &mut LimitedWriter<'_>,
        elem: &TypeDesc,
        values: &[Value],
    ) -> Result<()> {
        for value in values {
            self.pack_value_at(w, elem, value)?;
        }
        Ok(())
    }

    /// One value at a described position: erased positions tag, concrete
    /// positions write the bare body.
    fn pack_value_at(
        &mut self,
        w: &mut LimitedWriter<'_>,
        desc: &TypeDesc,
        value: &Value,
    ) -> Result<()> {
        if matches!(desc, TypeDesc::Interface) {
            self.pack_value(w, value, &FieldOptions::default())
        } else {
            self.pack_value_body(w, desc, value, &FieldOptions::default())
        }
    }
}

impl Default for Packer {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Pack for bool {
    fn static_desc() -> TypeDesc {
        TypeDesc::Bool
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, _opts: &FieldOptions) -> Result<()> {
        p.write_byte(w, u8::from(*self))
    }
}

impl Pack for i8 {
    fn static_desc() -> TypeDesc {
        TypeDesc::Int8
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, _opts: &FieldOptions) -> Result<()> {
        p.write_byte(w, *self as u8)
    }
}

impl Pack for u8 {
    fn static_desc() -> TypeDesc {
        TypeDesc::Uint8
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, _opts: &FieldOptions) -> Result<()> {
        p.write_byte(w, *self)
    }
}

macro_rules! impl_pack_int {
    ($($ty:ty => $desc:ident),* $(,)?) => {$(
        impl Pack for $ty {
            fn static_desc() -> TypeDesc {
                TypeDesc::$desc
            }

            fn pack(
                &self,
                p: &mut Packer,
                w: &mut LimitedWriter<'_>,
                _opts: &FieldOptions,
            ) -> Result<()> {
                p.write_var_int(w, *self as i64)
            }
        }
    )*};
}

macro_rules! impl_pack_uint {
    ($($ty:ty => $desc:ident),* $(,)?) => {$(
        impl Pack for $ty {
            fn static_desc() -> TypeDesc {
                TypeDesc::$desc
            }

            fn pack(
                &self,
                p: &mut Packer,
                w: &mut LimitedWriter<'_>,
                _opts: &FieldOptions,
            ) -> Result<()> {
                p.write_var_uint(w, *self as u64)
            }
        }
    )*};
}

impl_pack_int!(i16 => Int16, i32 => Int32, i64 => Int64, isize => Int);
impl_pack_uint!(u16 => Uint16, u32 => Uint32, u64 => Uint64, usize => Uint);

impl Pack for f32 {
    fn static_desc() -> TypeDesc {
        TypeDesc::Float32
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, _opts: &FieldOptions) -> Result<()> {
        p.write_raw(w, &self.to_be_bytes())
    }
}

impl Pack for f64 {
    fn static_desc() -> TypeDesc {
        TypeDesc::Float64
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, _opts: &FieldOptions) -> Result<()> {
        p.write_raw(w, &self.to_be_bytes())
    }
}

impl Pack for Complex64 {
    fn static_desc() -> TypeDesc {
        TypeDesc::Complex64
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, _opts: &FieldOptions) -> Result<()> {
        p.write_raw(w, &self.re.to_be_bytes())?;
        p.write_raw(w, &self.im.to_be_bytes())
    }
}

impl Pack for Complex128 {
    fn static_desc() -> TypeDesc {
        TypeDesc::Complex128
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, _opts: &FieldOptions) -> Result<()> {
        p.write_raw(w, &self.re.to_be_bytes())?;
        p.write_raw(w, &self.im.to_be_bytes())
    }
}

impl Pack for String {
    fn static_desc() -> TypeDesc {
        TypeDesc::Str
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, opts: &FieldOptions) -> Result<()> {
        p.pack_bytes(w, self.as_bytes(), opts, "string")
    }
}

impl<T: Pack> Pack for Vec<T> {
    fn static_desc() -> TypeDesc {
        TypeDesc::Slice(Box::new(T::static_desc()))
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, opts: &FieldOptions) -> Result<()> {
        p.check_len(self.len() as u64, opts, "slice")?;
        p.write_var_uint(w, self.len() as u64)?;

        let elem_opts = opts.for_elements();
        for item in self {
            item.pack(p, w, &elem_opts)?;
        }
        Ok(())
    }
}

impl<T: Pack, const N: usize> Pack for [T; N] {
    fn static_desc() -> TypeDesc {
        TypeDesc::Array(N as u64, Box::new(T::static_desc()))
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, opts: &FieldOptions) -> Result<()> {
        // The length is part of the static type; no prefix goes out.
        p.check_len(N as u64, opts, "array")?;
        let elem_opts = opts.for_elements();
        for item in self {
            item.pack(p, w, &elem_opts)?;
        }
        Ok(())
    }
}

impl<K, V> Pack for HashMap<K, V>
where
    K: Pack + Eq + std::hash::Hash,
    V: Pack,
{
    fn static_desc() -> TypeDesc {
        TypeDesc::Map(Box::new(K::static_desc()), Box::new(V::static_desc()))
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, opts: &FieldOptions) -> Result<()> {
        p.check_len(self.len() as u64, opts, "map")?;
        p.write_var_int(w, self.len() as i64)?;

        // Whatever order the container iterates in is the wire order.
        let elem_opts = opts.for_elements();
        for (key, val) in self {
            key.pack(p, w, &FieldOptions::default())?;
            val.pack(p, w, &elem_opts)?;
        }
        Ok(())
    }
}

impl<T: Pack> Pack for Option<T> {
    fn static_desc() -> TypeDesc {
        TypeDesc::Pointer(Box::new(T::static_desc()))
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, opts: &FieldOptions) -> Result<()> {
        match self {
            None => p.write_byte(w, 0),
            Some(inner) => {
                p.write_byte(w, 1)?;
                inner.pack(p, w, opts)
            }
        }
    }
}

impl<T: Pack> Pack for Box<T> {
    fn static_desc() -> TypeDesc {
        T::static_desc()
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, opts: &FieldOptions) -> Result<()> {
        (**self).pack(p, w, opts)
    }
}

impl Pack for Value {
    fn static_desc() -> TypeDesc {
        TypeDesc::Interface
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, opts: &FieldOptions) -> Result<()> {
        // An `objects:` directive routes this position through a registry,
        // which only registered records can satisfy.
        if p.sub_registry(&opts.objects).is_some() {
            return match self {
                Value::Nil => Err(PackError::NilObject),
                other => Err(PackError::NotDefinedType(other.kind_name())),
            };
        }
        p.pack_value(w, self, opts)
    }
}

impl Pack for AnyRecord {
    fn static_desc() -> TypeDesc {
        TypeDesc::Interface
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, opts: &FieldOptions) -> Result<()> {
        let Some(registry) = p.sub_registry(&opts.objects) else {
            // Without a registry this cell would need a type tag, and
            // records cannot be described by one.
            return Err(PackError::CantUseInInterfaceMode {
                kind: Kind::Struct,
                context: self.type_name(),
            });
        };
        p.pack_object_dyn(w, self, &registry)
    }
}
