//! Per-field directive parsing. A directive string is a semicolon-joined
//! list of `key` or `key:value` items; unknown keys are ignored so new
//! directives stay backward compatible.

/// Immutable per-field settings, live for the encode/decode of the
/// enclosing record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldOptions {
    /// For strings, the maximum encoded byte length; for slices, arrays
    /// and maps, the maximum element count. Zero means unbounded.
    /// Kind and length prefix bytes are not counted.
    pub max: u64,

    /// Skip the field in both directions, as if it were absent.
    pub ignore: bool,

    /// Name of the sub-registry to dispatch erased record positions
    /// through instead of the type-tag path.
    pub objects: Option<String>,
}

impl FieldOptions {
    pub fn parse(tag: &str) -> FieldOptions {
        let mut opts = FieldOptions::default();
        if tag.is_empty() {
            return opts;
        }

        for part in tag.split(';') {
            let (key, val) = match part.find(':') {
                Some(idx) => (&part[..idx], &part[idx + 1..]),
                None => (part, ""),
            };

            match key {
                "max" => opts.max = val.parse().unwrap_or(0),
                "ignore" => opts.ignore = true,
                "objects" => opts.objects = Some(val.to_owned()),
                _ => {}
            }
        }

        opts
    }

    /// Options handed to a container's elements: bounds do not cascade,
    /// the sub-registry name does.
    pub(crate) fn for_elements(&self) -> FieldOptions {
        FieldOptions {
            max: 0,
            ignore: false,
            objects: self.objects.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::FieldOptions;

    #[test]
    fn parses_known_keys() {
        let opts = FieldOptions::parse("max:16;ignore;objects:shapes");
        assert_eq!(16, opts.max);
        assert!(opts.ignore);
        assert_eq!(Some("shapes".to_owned()), opts.objects);
    }

    #[test]
    fn empty_tag_is_default() {
        assert_eq!(FieldOptions::default(), FieldOptions::parse(""));
    }

    #[test]
    fn unknown_keys_ignored() {
        let opts = FieldOptions::parse("frobnicate;max:3;color:red");
        assert_eq!(3, opts.max);
        assert!(!opts.ignore);
        assert_eq!(None, opts.objects);
    }

    #[test]
    fn unparsable_max_is_unbounded() {
        assert_eq!(0, FieldOptions::parse("max:abc").max);
        assert_eq!(0, FieldOptions::parse("max:").max);
        assert_eq!(0, FieldOptions::parse("max").max);
    }

    #[test]
    fn elements_keep_registry_name_only() {
        let opts = FieldOptions::parse("max:8;objects:shapes");
        let elem = opts.for_elements();
        assert_eq!(0, elem.max);
        assert_eq!(Some("shapes".to_owned()), elem.objects);
    }
}
