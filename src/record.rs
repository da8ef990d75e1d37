//! Record (struct) reflection: runtime descriptors, the [`Record`] trait
//! with its pre/post hooks, the erased [`AnyRecord`] cell produced by
//! object-mode decoding, and the [`record!`] macro that derives the whole
//! surface from a field list.

use std::any::Any;
use std::fmt;
use std::sync::OnceLock;

use crate::desc::TypeDesc;
use crate::error::Result;
use crate::field::FieldOptions;
use crate::limit::LimitedWriter;
use crate::packer::{Pack, Packer};
use crate::unpacker::UnpackField;

/// Immutable description of one record field, built once per type.
#[derive(Debug, Clone)]
pub struct FieldDesc {
    pub name: &'static str,
    pub desc: TypeDesc,
    pub opts: FieldOptions,
}

impl FieldDesc {
    pub fn new(name: &'static str, desc: TypeDesc) -> Self {
        Self {
            name,
            desc,
            opts: FieldOptions::default(),
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.opts = FieldOptions::parse(tag);
        self
    }
}

/// Immutable description of a record type: its name and its wire fields in
/// declared order. Fields not listed here never touch the stream.
#[derive(Debug, Clone)]
pub struct RecordDesc {
    pub name: &'static str,
    pub fields: Vec<FieldDesc>,
}

impl RecordDesc {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDesc) -> Self {
        self.fields.push(field);
        self
    }
}

/// A struct type the codec can take apart and rebuild. The descriptor
/// drives field iteration centrally, so `max`/`ignore`/`objects` directives
/// behave identically for every record.
///
/// `before_pack` runs before any field is written and `after_unpack` after
/// every field is set; returning an error from either aborts the operation.
/// Neither runs for a record sitting in an `ignore`d field.
pub trait Record: Default + Sized + 'static {
    fn descriptor() -> &'static RecordDesc;

    /// Field values in descriptor order.
    fn fields(&self) -> Vec<&dyn Pack>;

    /// Mutable field slots in descriptor order.
    fn fields_mut(&mut self) -> Vec<&mut dyn UnpackField>;

    fn before_pack(&self) -> Result<()> {
        Ok(())
    }

    fn after_unpack(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Object-safe view of a record, so registry entries and erased cells can
/// hold any registered type behind one vtable.
pub trait DynRecord: Any {
    fn pack_body(&self, p: &mut Packer, w: &mut LimitedWriter<'_>) -> Result<()>;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn record_name(&self) -> &'static str;
}

impl<T: Record> DynRecord for T {
    fn pack_body(&self, p: &mut Packer, w: &mut LimitedWriter<'_>) -> Result<()> {
        p.pack_record(w, self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn record_name(&self) -> &'static str {
        T::descriptor().name
    }
}

/// A record whose concrete type is only known at runtime: what object-mode
/// decoding hands back, and the cell type for `objects:`-dispatched fields.
pub struct AnyRecord(Box<dyn DynRecord>);

impl AnyRecord {
    pub fn new<T: Record>(value: T) -> Self {
        AnyRecord(Box::new(value))
    }

    pub(crate) fn from_box(inner: Box<dyn DynRecord>) -> Self {
        AnyRecord(inner)
    }

    pub fn is<T: Record>(&self) -> bool {
        self.0.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Record>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn downcast<T: Record>(self) -> Option<T> {
        self.0.into_any().downcast::<T>().ok().map(|b| *b)
    }

    pub fn type_name(&self) -> &'static str {
        self.0.record_name()
    }

    pub(crate) fn type_id(&self) -> std::any::TypeId {
        self.0.as_any().type_id()
    }

    pub(crate) fn pack_body(&self, p: &mut Packer, w: &mut LimitedWriter<'_>) -> Result<()> {
        self.0.pack_body(p, w)
    }
}

impl fmt::Debug for AnyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyRecord({})", self.type_name())
    }
}

/// Placeholder behind `AnyRecord::default`, so records may hold `AnyRecord`
/// fields. It is not registered anywhere; encoding a default cell fails
/// with a registry lookup error.
#[derive(Default)]
pub(crate) struct EmptyRecord;

impl Record for EmptyRecord {
    fn descriptor() -> &'static RecordDesc {
        static DESC: OnceLock<RecordDesc> = OnceLock::new();
        DESC.get_or_init(|| RecordDesc::new("EmptyRecord"))
    }

    fn fields(&self) -> Vec<&dyn Pack> {
        Vec::new()
    }

    fn fields_mut(&mut self) -> Vec<&mut dyn UnpackField> {
        Vec::new()
    }
}

impl Pack for EmptyRecord {
    fn static_desc() -> TypeDesc {
        TypeDesc::Struct
    }

    fn pack(&self, p: &mut Packer, w: &mut LimitedWriter<'_>, _opts: &FieldOptions) -> Result<()> {
        p.pack_record(w, self)
    }
}

impl crate::unpacker::Unpack for EmptyRecord {
    fn unpack(
        u: &mut crate::unpacker::Unpacker,
        r: &mut crate::limit::LimitedReader<'_>,
        _opts: &FieldOptions,
    ) -> Result<Self> {
        u.unpack_record(r)
    }
}

impl Default for AnyRecord {
    fn default() -> Self {
        AnyRecord::new(EmptyRecord)
    }
}

/// Derives a record from a field list: the struct itself, its
/// [`RecordDesc`], and the [`Record`]/[`Pack`]/[`Unpack`] impls. Field
/// directives ride along in a `#[pack("...")]` attribute:
///
/// ```
/// anypack::record! {
///     #[derive(Debug, Default, PartialEq)]
///     pub struct Login {
///         pub user: String,
///         #[pack("max:64")]
///         pub token: String,
///         #[pack("ignore")]
///         pub attempts: i64,
///     }
/// }
/// ```
///
/// Records needing `before_pack`/`after_unpack` implement the traits by
/// hand instead; the macro only covers the hookless common case.
#[macro_export]
macro_rules! record {
    (@tag) => {
        ""
    };
    (@tag $tag:literal) => {
        $tag
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[pack($ftag:literal)])?
                $fvis:vis $fname:ident : $fty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $fvis $fname : $fty, )*
        }

        impl $crate::Record for $name {
            fn descriptor() -> &'static $crate::RecordDesc {
                static DESC: ::std::sync::OnceLock<$crate::RecordDesc> =
                    ::std::sync::OnceLock::new();
                DESC.get_or_init(|| {
                    $crate::RecordDesc::new(stringify!($name))
                        $(
                            .field(
                                $crate::FieldDesc::new(
                                    stringify!($fname),
                                    <$fty as $crate::Pack>::static_desc(),
                                )
                                .with_tag($crate::record!(@tag $($ftag)?)),
                            )
                        )*
                })
            }

            fn fields(&self) -> ::std::vec::Vec<&dyn $crate::Pack> {
                ::std::vec![ $( &self.$fname as &dyn $crate::Pack, )* ]
            }

            fn fields_mut(&mut self) -> ::std::vec::Vec<&mut dyn $crate::UnpackField> {
                ::std::vec![ $( &mut self.$fname as &mut dyn $crate::UnpackField, )* ]
            }
        }

        impl $crate::Pack for $name {
            fn static_desc() -> $crate::TypeDesc {
                $crate::TypeDesc::Struct
            }

            fn pack(
                &self,
                p: &mut $crate::Packer,
                w: &mut $crate::LimitedWriter<'_>,
                _opts: &$crate::FieldOptions,
            ) -> ::std::result::Result<(), $crate::PackError> {
                p.pack_record(w, self)
            }
        }

        impl $crate::Unpack for $name {
            fn unpack(
                u: &mut $crate::Unpacker,
                r: &mut $crate::LimitedReader<'_>,
                _opts: &$crate::FieldOptions,
            ) -> ::std::result::Result<Self, $crate::PackError> {
                u.unpack_record(r)
            }
        }
    };
}

#[cfg(test)]
mod test {
    use crate::desc::TypeDesc;
    use crate::record::Record;

    crate::record! {
        #[derive(Debug, Default, PartialEq)]
        struct Sample {
            id: i64,
            #[pack("max:8")]
            name: String,
            #[pack("ignore")]
            scratch: String,
        }
    }

    #[test]
    fn macro_builds_descriptor() {
        let desc = Sample::descriptor();
        assert_eq!("Sample", desc.name);
        assert_eq!(3, desc.fields.len());

        assert_eq!("id", desc.fields[0].name);
        assert_eq!(TypeDesc::Int64, desc.fields[0].desc);
        assert_eq!(0, desc.fields[0].opts.max);

        assert_eq!(8, desc.fields[1].opts.max);
        assert!(desc.fields[2].opts.ignore);
    }

    #[test]
    fn field_views_line_up() {
        let mut sample = Sample {
            id: 9,
            name: "x".to_owned(),
            scratch: String::new(),
        };
        assert_eq!(3, sample.fields().len());
        assert_eq!(3, sample.fields_mut().len());
    }
}
