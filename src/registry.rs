//! The object registry: a bidirectional table between positive integer ids
//! and record types. Ids start at 1 and grow monotonically in registration
//! order, so both peers of a stream must register the same types in the
//! same order. Each entry also stores the monomorphized decode shard for
//! its type.

use std::any::TypeId;
use std::collections::HashMap;

use derive_more::{Deref, From};

use crate::error::{PackError, Result};
use crate::limit::LimitedReader;
use crate::record::{DynRecord, Record};
use crate::unpacker::Unpacker;

/// Identifier assigned to a registered record type.
#[derive(Deref, From, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ObjectId(u64);

pub(crate) type UnpackFn =
    fn(&mut Unpacker, &mut LimitedReader<'_>) -> Result<Box<dyn DynRecord>>;

#[derive(Clone, Copy)]
pub(crate) struct RegistryEntry {
    pub(crate) name: &'static str,
    pub(crate) unpack: UnpackFn,
}

#[derive(Clone, Default)]
pub struct Registry {
    last_id: u64,
    id_to_entry: HashMap<u64, RegistryEntry>,
    type_to_id: HashMap<TypeId, u64>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under the next id and returns it. Registering a type
    /// twice is a no-op that keeps and returns the first id, so a stream
    /// written before the duplicate push stays decodable.
    pub fn push<T: Record>(&mut self) -> ObjectId {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.type_to_id.get(&type_id) {
            return ObjectId(id);
        }

        self.last_id += 1;
        self.id_to_entry.insert(
            self.last_id,
            RegistryEntry {
                name: T::descriptor().name,
                unpack: unpack_erased::<T>,
            },
        );
        self.type_to_id.insert(type_id, self.last_id);
        ObjectId(self.last_id)
    }

    /// Builder form of [`push`](Registry::push).
    pub fn with<T: Record>(mut self) -> Self {
        self.push::<T>();
        self
    }

    pub fn len(&self) -> usize {
        self.id_to_entry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_entry.is_empty()
    }

    pub(crate) fn id_of(&self, type_id: TypeId) -> Option<u64> {
        self.type_to_id.get(&type_id).copied()
    }

    pub(crate) fn entry(&self, id: u64) -> Option<&RegistryEntry> {
        self.id_to_entry.get(&id)
    }
}

fn unpack_erased<T: Record>(
    u: &mut Unpacker,
    r: &mut LimitedReader<'_>,
) -> Result<Box<dyn DynRecord>> {
    let record = u.unpack_record::<T>(r)?;
    Ok(Box::new(record))
}

pub(crate) fn lookup_id(registry: &Registry, type_id: TypeId, name: &'static str) -> Result<u64> {
    registry
        .id_of(type_id)
        .ok_or(PackError::NotDefinedType(name))
}
