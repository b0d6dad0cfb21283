//! Named memory objects with consumer-counted liveness.
//!
//! Objects live in an arena addressed by [`ObjectId`]; slots are never
//! reused, so ids held by the encoder or the tracer stay meaningful for the
//! whole compile. A per-space address index answers "which object owns this
//! address" in `O(log n)`.
//!
//! Liveness: an object starts with a set of consumer names. Consumption
//! removes names; once the set is empty the next sweep that includes the
//! object's space returns its addresses and unregisters it. The sentinel
//! consumers [`IO_CONSUMER`] and [`CONSTS_CONSUMER`] can never be removed,
//! which pins program I/O and constants for the whole compile.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use tpc_core::id::ObjectId;
use tpc_core::types::{MemoryDimensions, MemoryRef, MemorySpan, SpaceTag};

use crate::error::{Error, Result};
use crate::space::MemorySpace;

/// Pins program inputs and outputs.
pub const IO_CONSUMER: &str = "$io";
/// Pins materialized constants.
pub const CONSTS_CONSUMER: &str = "$consts";

pub fn is_sentinel(consumer: &str) -> bool {
    consumer == IO_CONSUMER || consumer == CONSTS_CONSUMER
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryObject {
    pub id: ObjectId,
    pub name: String,
    pub dims: MemoryDimensions,
    pub tag: SpaceTag,
    /// What readers see, in logical order.
    pub span: MemorySpan,
    consumers: BTreeSet<String>,
    /// Addresses this object returns when freed. Equal to `span` for plain
    /// allocations; for blends, the union of the blendees' owned addresses.
    owned: MemorySpan,
    superseded_by: Option<ObjectId>,
    blendees: Vec<ObjectId>,
}

impl MemoryObject {
    pub fn consumers(&self) -> &BTreeSet<String> {
        &self.consumers
    }

    pub fn is_fully_consumed(&self) -> bool {
        self.consumers.is_empty()
    }

    pub fn is_pinned(&self) -> bool {
        self.consumers.iter().any(|c| is_sentinel(c))
    }

    pub fn owned(&self) -> &MemorySpan {
        &self.owned
    }

    /// The blend that now represents this object, if any.
    pub fn superseded_by(&self) -> Option<ObjectId> {
        self.superseded_by
    }

    pub fn is_blend(&self) -> bool {
        !self.blendees.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    end: usize,
    object: ObjectId,
    /// Logical offset of the run's first address within the object.
    offset: usize,
}

#[derive(Debug, Default)]
pub struct MemoryObjectAllocator {
    objects: Vec<Option<MemoryObject>>,
    by_name: HashMap<String, ObjectId>,
    index: BTreeMap<SpaceTag, BTreeMap<usize, IndexEntry>>,
}

impl MemoryObjectAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `dims.vectors` vectors in `space` and register them as `name`.
    pub fn allocate_object(
        &mut self,
        space: &mut MemorySpace,
        name: &str,
        dims: MemoryDimensions,
        consumers: &[&str],
    ) -> Result<&MemoryObject> {
        self.ensure_unregistered(name)?;
        let span = space.allocate(dims.vectors)?;
        tracing::debug!(
            name,
            tag = %space.tag(),
            vectors = dims.vectors,
            runs = span.runs().len(),
            "allocated object"
        );
        let id = self.next_id();
        let object = MemoryObject {
            id,
            name: name.to_string(),
            dims,
            tag: space.tag(),
            owned: span.clone(),
            span,
            consumers: consumers.iter().map(|c| c.to_string()).collect(),
            superseded_by: None,
            blendees: vec![],
        };
        self.index_insert(id, &object.span)?;
        Ok(self.register(object))
    }

    pub fn has_object(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get_object(&self, name: &str) -> Result<&MemoryObject> {
        let id = self.id_of(name)?;
        self.object(id).ok_or_else(|| not_found(name))
    }

    pub fn object(&self, id: ObjectId) -> Option<&MemoryObject> {
        self.objects.get(id.get() as usize).and_then(Option::as_ref)
    }

    /// Registered objects in allocation order.
    pub fn objects(&self) -> impl Iterator<Item = &MemoryObject> {
        self.objects.iter().flatten()
    }

    /// Find the object currently representing `r` and the offset of `r`
    /// within that object's logical ordering.
    pub fn resolve_ref_to_object(&self, r: MemoryRef) -> Option<(&MemoryObject, usize)> {
        let (&start, entry) = self.index.get(&r.tag)?.range(..=r.address).next_back()?;
        if r.address >= entry.end {
            return None;
        }
        let object = self.object(entry.object)?;
        Some((object, entry.offset + (r.address - start)))
    }

    /// Retire `consumers` from the object's outstanding set.
    ///
    /// An empty `consumers` slice touches the object without retiring
    /// anything. Sentinel consumers are ignored.
    pub fn consume_object(&mut self, name: &str, consumers: &[&str]) -> Result<&MemoryObject> {
        let id = self.id_of(name)?;
        let object = self.object_mut(id).ok_or_else(|| not_found(name))?;
        for c in consumers.iter().filter(|c| !is_sentinel(c)) {
            object.consumers.remove(*c);
        }
        Ok(object)
    }

    /// Add a sentinel consumer, pinning the object for the rest of the compile.
    pub(crate) fn pin_object(&mut self, name: &str, sentinel: &str) -> Result<&MemoryObject> {
        debug_assert!(is_sentinel(sentinel));
        let id = self.id_of(name)?;
        let object = self.object_mut(id).ok_or_else(|| not_found(name))?;
        object.consumers.insert(sentinel.to_string());
        Ok(object)
    }

    /// Retire `consumers` from every registered object.
    pub fn consume_all_objects(&mut self, consumers: &[&str]) {
        for object in self.objects.iter_mut().flatten() {
            for c in consumers.iter().filter(|c| !is_sentinel(c)) {
                object.consumers.remove(*c);
            }
        }
    }

    /// Register `name` as a zero-copy view over `addresses`.
    ///
    /// The blendees stay registered (resolvable by name) but are superseded:
    /// their addresses now belong to the blend, which returns them when it is
    /// freed. No space's free pool is touched. Sentinel consumers of any
    /// blendee are carried over, so a blend over program I/O or constants is
    /// pinned as well.
    pub fn blend_objects(
        &mut self,
        name: &str,
        dims: MemoryDimensions,
        consumers: &[&str],
        blendee_names: &[&str],
        addresses: &[MemoryRef],
    ) -> Result<&MemoryObject> {
        self.ensure_unregistered(name)?;
        if addresses.len() != dims.vectors {
            return Err(Error::SpanSizeMismatch {
                name: name.to_string(),
                expected: dims.vectors,
                actual: addresses.len(),
            });
        }

        let mut blendees = Vec::with_capacity(blendee_names.len());
        for b in blendee_names {
            let id = self.id_of(b)?;
            if !blendees.contains(&id) {
                blendees.push(id);
            }
        }

        let tag = blendees
            .first()
            .and_then(|id| self.object(*id))
            .map(|o| o.tag)
            .or_else(|| addresses.first().map(|r| r.tag))
            .ok_or_else(|| {
                Error::Configuration(format!("blend '{name}' has neither blendees nor addresses"))
            })?;

        // A blend over pinned storage is pinned too; it must never free it.
        let mut consumer_set: BTreeSet<String> = consumers.iter().map(|c| c.to_string()).collect();
        for b in &blendees {
            if let Some(o) = self.object(*b) {
                consumer_set.extend(o.consumers.iter().filter(|c| is_sentinel(c.as_str())).cloned());
            }
        }

        let span = MemorySpan::from_refs(addresses.iter().copied());
        let id = self.next_id();

        // Swap the blendees' index entries for the blend's; restore on overlap.
        let displaced: Vec<(ObjectId, MemorySpan)> = blendees
            .iter()
            .filter_map(|b| self.object(*b))
            .filter(|o| o.superseded_by.is_none())
            .map(|o| (o.id, o.span.clone()))
            .collect();
        for (b, s) in &displaced {
            self.index_remove(*b, s);
        }
        if let Err(e) = self.index_insert(id, &span) {
            for (b, s) in &displaced {
                self.index_insert(*b, s)?;
            }
            return Err(e);
        }

        let mut owned = MemorySpan::new();
        for b in &blendees {
            if let Some(o) = self.object_mut(*b) {
                owned.extend(&o.owned);
                o.owned = MemorySpan::new();
                o.superseded_by = Some(id);
            }
        }

        tracing::debug!(
            name,
            %tag,
            vectors = dims.vectors,
            blendees = blendees.len(),
            "blended object"
        );
        let object = MemoryObject {
            id,
            name: name.to_string(),
            dims,
            tag,
            span,
            consumers: consumer_set,
            owned,
            superseded_by: None,
            blendees,
        };
        Ok(self.register(object))
    }

    /// Free and unregister every fully consumed object placed in one of
    /// `spaces`. Objects in other spaces are left alone. Returns how many
    /// objects were freed.
    pub fn free_consumed_objects(&mut self, spaces: &mut [&mut MemorySpace]) -> Result<usize> {
        let tags: Vec<SpaceTag> = spaces.iter().map(|s| s.tag()).collect();
        let victims: Vec<ObjectId> = self
            .objects()
            .filter(|o| {
                o.superseded_by.is_none() && o.is_fully_consumed() && tags.contains(&o.tag)
            })
            .map(|o| o.id)
            .collect();

        for id in &victims {
            let Some(object) = self.object(*id) else {
                continue;
            };
            if let Some(run) = object.owned.runs().iter().find(|r| !tags.contains(&r.tag)) {
                return Err(Error::Invariant(format!(
                    "object '{}' owns {} addresses outside the swept spaces",
                    object.name, run.tag
                )));
            }
            for space in spaces.iter_mut() {
                let mut part = MemorySpan::new();
                for run in object.owned.runs().iter().filter(|r| r.tag == space.tag()) {
                    part.push_run(*run);
                }
                space.free(&part)?;
            }
            tracing::debug!(name = %object.name, tag = %object.tag, vectors = object.dims.vectors, "freed object");
            self.unregister(*id);
        }
        Ok(victims.len())
    }

    // ----- internals -----

    fn next_id(&self) -> ObjectId {
        ObjectId::new(self.objects.len() as u64)
    }

    fn id_of(&self, name: &str) -> Result<ObjectId> {
        self.by_name.get(name).copied().ok_or_else(|| not_found(name))
    }

    fn object_mut(&mut self, id: ObjectId) -> Option<&mut MemoryObject> {
        self.objects.get_mut(id.get() as usize).and_then(Option::as_mut)
    }

    fn ensure_unregistered(&self, name: &str) -> Result<()> {
        if self.has_object(name) {
            return Err(Error::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn register(&mut self, object: MemoryObject) -> &MemoryObject {
        let slot = object.id.get() as usize;
        debug_assert_eq!(slot, self.objects.len());
        self.by_name.insert(object.name.clone(), object.id);
        self.objects.push(None);
        self.objects[slot].insert(object)
    }

    /// Drop `id` and, transitively, the blendees it superseded.
    fn unregister(&mut self, id: ObjectId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(object) = self.objects.get_mut(id.get() as usize).and_then(Option::take)
            else {
                continue;
            };
            if object.superseded_by.is_none() {
                self.index_remove(id, &object.span);
            }
            self.by_name.remove(&object.name);
            stack.extend(
                object
                    .blendees
                    .iter()
                    .copied()
                    .filter(|b| self.object(*b).is_some_and(|o| o.superseded_by == Some(id))),
            );
        }
    }

    fn index_insert(&mut self, id: ObjectId, span: &MemorySpan) -> Result<()> {
        let mut entries = Vec::with_capacity(span.runs().len());
        let mut offset = 0;
        for run in span.runs() {
            entries.push((run.tag, run.start, run.end(), offset));
            offset += run.len;
        }
        entries.sort_unstable();

        for (i, &(tag, start, end, _)) in entries.iter().enumerate() {
            if i > 0 {
                let (ptag, _, pend, _) = entries[i - 1];
                if ptag == tag && pend > start {
                    return Err(overlap(tag, start));
                }
            }
            if let Some(map) = self.index.get(&tag) {
                if let Some((_, e)) = map.range(..=start).next_back() {
                    if e.end > start {
                        return Err(overlap(tag, start));
                    }
                }
                if let Some((&s, _)) = map.range(start..).next() {
                    if s < end {
                        return Err(overlap(tag, s));
                    }
                }
            }
        }

        for (tag, start, end, offset) in entries {
            self.index.entry(tag).or_default().insert(
                start,
                IndexEntry {
                    end,
                    object: id,
                    offset,
                },
            );
        }
        Ok(())
    }

    fn index_remove(&mut self, id: ObjectId, span: &MemorySpan) {
        for run in span.runs() {
            if let Some(map) = self.index.get_mut(&run.tag) {
                if map.get(&run.start).is_some_and(|e| e.object == id) {
                    map.remove(&run.start);
                }
            }
        }
    }
}

fn not_found(name: &str) -> Error {
    Error::NotFound {
        name: name.to_string(),
    }
}

fn overlap(tag: SpaceTag, address: usize) -> Error {
    Error::Invariant(format!("{tag} address {address} is already owned by another object"))
}
