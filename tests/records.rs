//! Record encoding: descriptors, field directives, and the pre/post hooks.

mod helpers;

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::OnceLock;

use anypack::{
    from_slice, to_vec, FieldDesc, FieldOptions, LimitedReader, LimitedWriter, Options, Pack,
    PackError, Record, RecordDesc, TypeDesc, Unpack, UnpackField, Unpacker, Value,
};
use helpers::roundtrip;

anypack::record! {
    #[derive(Debug, Default, PartialEq)]
    pub struct CustomSub {
        pub value: String,
    }
}

anypack::record! {
    #[derive(Debug, Default, PartialEq)]
    pub struct Custom {
        pub text: String,
        pub value: Value,
        pub table: HashMap<String, Value>,
        pub pointer: Option<Box<CustomSub>>,
    }
}

#[test]
fn record_roundtrip() {
    let mut table = HashMap::new();
    table.insert("k".to_owned(), Value::Float64(3.0));

    roundtrip(&Custom {
        text: "hello".to_owned(),
        value: Value::Int64(123),
        table,
        pointer: Some(Box::new(CustomSub {
            value: "Hello".to_owned(),
        })),
    });

    roundtrip(&Custom {
        text: String::new(),
        value: Value::Nil,
        table: HashMap::new(),
        pointer: None,
    });
}

anypack::record! {
    #[derive(Debug, Default, PartialEq)]
    pub struct WithIgnored {
        pub n: i64,
        #[pack("ignore")]
        pub hidden: String,
    }
}

anypack::record! {
    #[derive(Debug, Default, PartialEq)]
    pub struct OnlyN {
        pub n: i64,
    }
}

#[test]
fn ignored_fields_produce_no_bytes() {
    let with_hidden = WithIgnored {
        n: 42,
        hidden: "This field should be ignored!".to_owned(),
    };
    let bytes = to_vec(&with_hidden, Options::default()).unwrap();
    let reference = to_vec(&OnlyN { n: 42 }, Options::default()).unwrap();
    assert_eq!(reference, bytes);

    let decoded: WithIgnored = from_slice(&bytes, Options::default()).unwrap();
    assert_eq!(42, decoded.n);
    assert_eq!("", decoded.hidden, "ignored field must stay at its zero value");
}

anypack::record! {
    #[derive(Debug, Default, PartialEq)]
    pub struct Bounded {
        #[pack("max:5")]
        pub short: String,
    }
}

#[test]
fn field_max_applies_to_both_directions() {
    let err = to_vec(
        &Bounded {
            short: "much too long".to_owned(),
        },
        Options::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        PackError::DataTooLarge {
            max: 5,
            size: 13,
            type_name: Some(_),
        }
    ));

    roundtrip(&Bounded {
        short: "tiny".to_owned(),
    });

    // A length prefix past the bound is rejected before allocation.
    let bytes = to_vec(&"over the field limit".to_owned(), Options::default()).unwrap();
    let err = from_slice::<Bounded>(&bytes, Options::default()).unwrap_err();
    assert!(matches!(err, PackError::DataTooLarge { max: 5, .. }));
}

/// A record with hand-written impls so the hooks can observe themselves.
#[derive(Debug, Default)]
struct Audited {
    val: String,
    packed: Cell<bool>,
    unpacked: bool,
    fail_pack: bool,
}

impl Record for Audited {
    fn descriptor() -> &'static RecordDesc {
        static DESC: OnceLock<RecordDesc> = OnceLock::new();
        DESC.get_or_init(|| {
            RecordDesc::new("Audited").field(FieldDesc::new("val", <String as Pack>::static_desc()))
        })
    }

    fn fields(&self) -> Vec<&dyn Pack> {
        vec![&self.val]
    }

    fn fields_mut(&mut self) -> Vec<&mut dyn UnpackField> {
        vec![&mut self.val]
    }

    fn before_pack(&self) -> Result<(), PackError> {
        if self.fail_pack {
            return Err(PackError::Hook("refusing to pack".to_owned()));
        }
        self.packed.set(true);
        Ok(())
    }

    fn after_unpack(&mut self) -> Result<(), PackError> {
        self.unpacked = true;
        Ok(())
    }
}

impl Pack for Audited {
    fn static_desc() -> TypeDesc {
        TypeDesc::Struct
    }

    fn pack(
        &self,
        p: &mut anypack::Packer,
        w: &mut LimitedWriter<'_>,
        _opts: &FieldOptions,
    ) -> Result<(), PackError> {
        p.pack_record(w, self)
    }
}

impl Unpack for Audited {
    fn unpack(
        u: &mut Unpacker,
        r: &mut LimitedReader<'_>,
        _opts: &FieldOptions,
    ) -> Result<Self, PackError> {
        u.unpack_record(r)
    }
}

#[test]
fn hooks_fire_exactly_once() {
    let input = Audited {
        val: "Hello, World!".to_owned(),
        ..Audited::default()
    };

    let bytes = to_vec(&input, Options::default()).unwrap();
    assert!(input.packed.get(), "before_pack must run during encode");

    let output: Audited = from_slice(&bytes, Options::default()).unwrap();
    assert!(output.unpacked, "after_unpack must run after decode");
    assert_eq!("Hello, World!", output.val);
    assert!(!output.packed.get());
}

#[test]
fn failing_hook_aborts_encoding() {
    let input = Audited {
        val: "x".to_owned(),
        fail_pack: true,
        ..Audited::default()
    };
    let err = to_vec(&input, Options::default()).unwrap_err();
    assert!(matches!(err, PackError::Hook(_)));
}

anypack::record! {
    #[derive(Debug, Default)]
    pub struct Wrapper {
        pub name: String,
        #[pack("ignore")]
        pub audit: Audited,
    }
}

anypack::record! {
    #[derive(Debug, Default)]
    pub struct NestedWrapper {
        pub audit: Audited,
    }
}

#[test]
fn hooks_skip_ignored_fields() {
    let wrapper = Wrapper {
        name: "outer".to_owned(),
        audit: Audited {
            val: "inner".to_owned(),
            ..Audited::default()
        },
    };
    let bytes = to_vec(&wrapper, Options::default()).unwrap();
    assert!(
        !wrapper.audit.packed.get(),
        "hooks must not run for ignored fields"
    );

    let decoded: Wrapper = from_slice(&bytes, Options::default()).unwrap();
    assert!(!decoded.audit.unpacked);
    assert_eq!("", decoded.audit.val);
}

#[test]
fn hooks_fire_for_nested_records() {
    let nested = NestedWrapper {
        audit: Audited {
            val: "inner".to_owned(),
            ..Audited::default()
        },
    };
    let bytes = to_vec(&nested, Options::default()).unwrap();
    assert!(nested.audit.packed.get());

    let decoded: NestedWrapper = from_slice(&bytes, Options::default()).unwrap();
    assert!(decoded.audit.unpacked);
    assert_eq!("inner", decoded.audit.val);
}

anypack::record! {
    #[derive(Debug, Default, PartialEq)]
    pub struct Recursive {
        pub level: i64,
        pub another: Option<Box<Recursive>>,
    }
}

#[test]
fn recursive_records_terminate_on_absent_pointers() {
    roundtrip(&Recursive {
        level: 1,
        another: Some(Box::new(Recursive {
            level: 2,
            another: Some(Box::new(Recursive {
                level: 3,
                another: None,
            })),
        })),
    });
}
