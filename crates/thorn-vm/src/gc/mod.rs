// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The generational managed heap.
//!
//! Two generations, each an ordered sequence of blocks. A block is a
//! fixed-size byte arena with a bump cursor (a [`Stack`] nobody pops
//! from). Every managed object is preceded by a 16-byte header carrying
//! its size and age; gc-pointers target the first byte after the header.
//!
//! Collection is copying: survivors move into fresh blocks, aging on each
//! minor collection until they are promoted to the old generation. A card
//! table over the old generation (one byte per 512-byte stride) records
//! writes through gc-pointers so a minor collection can treat old-to-young
//! references as roots without scanning the whole old generation.
//!
//! The root set is the evaluation stack, walked slot-by-slot through the
//! type tags: operands, local variables and saved frame records all live
//! there. After a collection every live managed address - roots and object
//! interiors, including interior pointers produced by `flea`/`alea` - is
//! rewritten to the moved object's new location.


use std::collections::HashMap;

use thorn_bytefile::types::TypeKind;

use crate::mem::{MemAddr, Region};
use crate::object::{self, PointerSlot, TypeSizes};
use crate::stack::Stack;

/// Size of the header preceding every managed object.
pub const HEADER_SIZE: usize = 16;

/// Survivors older than this many minor collections move to the old
/// generation.
pub const PROMOTE_AGE: u8 = 2;

/// Bytes of old-generation memory covered by one card.
pub const CARD_STRIDE: usize = 512;

/// Which generation a block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenKind {
    Young,
    Old,
}

/// One block arena.
#[derive(Debug)]
struct Block {
    data: Stack,
    kind: GenKind,
    /// Dirty cards; only consulted for old-generation blocks.
    cards: Vec<u8>,
}

impl Block {
    fn new(size: usize, kind: GenKind) -> Self {
        Self {
            data: Stack::new(size),
            kind,
            cards: vec![0; size / CARD_STRIDE + 1],
        }
    }
}

/// Ordering metadata of one generation.
#[derive(Debug)]
struct Generation {
    kind: GenKind,
    /// Block ids in heap order.
    order: Vec<u32>,
    /// Position of the current block within `order`.
    current: usize,
    default_block_size: usize,
}

/// An object's location: owning block id and start offset (first byte
/// after the header).
type Location = (u32, u32);

/// The generational collector.
#[derive(Debug, Default)]
pub struct Collector {
    blocks: HashMap<u32, Block>,
    young: Option<Generation>,
    old: Option<Generation>,
    next_block_id: u32,
}

impl Collector {
    /// Create a collector with the given young and old default block
    /// sizes. Both must be non-zero multiples of 512; the old default is
    /// widened by one card byte per stride of configured space.
    #[must_use]
    pub fn new(young_size: usize, old_size: usize) -> Self {
        let mut collector = Self::default();
        collector.initialize(young_size, old_size);
        collector
    }

    /// Initialize both generations with one default block each.
    pub fn initialize(&mut self, young_size: usize, old_size: usize) {
        debug_assert!(!self.is_initialized());
        debug_assert!(young_size > 0 && young_size % 512 == 0);
        debug_assert!(old_size > 0 && old_size % 512 == 0);

        let old_size = old_size + old_size / 512;
        self.young = Some(self.new_generation(GenKind::Young, young_size));
        self.old = Some(self.new_generation(GenKind::Old, old_size));
    }

    /// Whether both generations are initialized.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.young.is_some() && self.old.is_some()
    }

    /// Drop all blocks and both generations.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.young = None;
        self.old = None;
    }

    fn new_generation(&mut self, kind: GenKind, default_block_size: usize) -> Generation {
        let id = self.add_block(Block::new(default_block_size, kind));
        Generation {
            kind,
            order: vec![id],
            current: 0,
            default_block_size,
        }
    }

    fn add_block(&mut self, block: Block) -> u32 {
        let id = self.next_block_id;
        self.next_block_id += 1;
        self.blocks.insert(id, block);
        id
    }

    fn generation(&self, kind: GenKind) -> &Generation {
        let generation = match kind {
            GenKind::Young => self.young.as_ref(),
            GenKind::Old => self.old.as_ref(),
        };
        generation.expect("collector is initialized")
    }

    fn generation_mut(&mut self, kind: GenKind) -> &mut Generation {
        let generation = match kind {
            GenKind::Young => self.young.as_mut(),
            GenKind::Old => self.old.as_mut(),
        };
        generation.expect("collector is initialized")
    }

    /// Bytes readable in block `id`.
    #[must_use]
    pub fn block_bytes(&self, id: u32) -> Option<&[u8]> {
        self.blocks
            .get(&id)
            .map(|block| &block.data.as_bytes()[..block.data.used()])
    }

    /// Bytes writable in block `id`.
    pub fn block_bytes_mut(&mut self, id: u32) -> Option<&mut [u8]> {
        self.blocks.get_mut(&id).map(|block| {
            let used = block.data.used();
            &mut block.data.as_bytes_mut()[..used]
        })
    }

    // --- allocation ------------------------------------------------------

    /// Allocate a managed object of `object_size` bytes (header excluded).
    ///
    /// Returns the address of the first byte after the header. Collection
    /// runs when the target generation's current block is full; `stack`
    /// and `types` provide the root set and object layouts.
    pub fn allocate<T: TypeSizes>(
        &mut self,
        stack: &mut Stack,
        types: &T,
        object_size: usize,
    ) -> MemAddr {
        let total = HEADER_SIZE + object_size;
        let young_default = self.generation(GenKind::Young).default_block_size;
        let old_default = self.generation(GenKind::Old).default_block_size;

        let (block, start) = if total > young_default {
            if total > old_default {
                self.create_block(GenKind::Old, total)
            } else {
                if total > self.current_free(GenKind::Old) {
                    self.major_gc(stack, types);
                }
                match self.bump(GenKind::Old, total) {
                    Some(location) => location,
                    None => self.create_block(GenKind::Old, total),
                }
            }
        } else {
            if total > self.current_free(GenKind::Young) {
                self.minor_gc(stack, types);
            }
            match self.bump(GenKind::Young, total) {
                Some(location) => location,
                None => self.create_block(GenKind::Young, total),
            }
        };

        self.write_header(block, start, object_size as u64, 0);
        MemAddr::managed(block, start as usize)
    }

    fn current_free(&self, kind: GenKind) -> usize {
        let generation = self.generation(kind);
        let id = generation.order[generation.current];
        self.blocks[&id].data.free()
    }

    /// Bump-allocate `total` bytes in the current block; the returned
    /// start points after the header slot.
    fn bump(&mut self, kind: GenKind, total: usize) -> Option<Location> {
        let generation = self.generation(kind);
        let id = generation.order[generation.current];
        let block = self.blocks.get_mut(&id)?;
        let position = block.data.used();
        if !block.data.expand(total) {
            return None;
        }
        Some((id, (position + HEADER_SIZE) as u32))
    }

    /// Create a block for an allocation that does not fit the current one.
    ///
    /// Oversized blocks are inserted next to the current block without
    /// becoming current: after it in the old generation, before it in the
    /// young generation. A default-sized block becomes the new current.
    fn create_block(&mut self, kind: GenKind, total: usize) -> Location {
        let default = self.generation(kind).default_block_size;
        let mut block = Block::new(total.max(default), kind);
        let fits_default = total <= default;
        assert!(block.data.expand(total), "fresh block fits its request");
        let id = self.add_block(block);

        let generation = self.generation_mut(kind);
        let at = if fits_default || generation.kind == GenKind::Old {
            generation.current + 1
        } else {
            generation.current
        };
        generation.order.insert(at, id);
        if fits_default {
            generation.current = at;
        } else if at <= generation.current {
            generation.current += 1;
        }

        (id, HEADER_SIZE as u32)
    }

    fn write_header(&mut self, block: u32, start: u32, size: u64, age: u8) {
        let block = self.blocks.get_mut(&block).expect("block exists");
        let bytes = block.data.as_bytes_mut();
        let header = start as usize - HEADER_SIZE;
        bytes[header..header + 8].copy_from_slice(&size.to_le_bytes());
        bytes[header + 8] = age;
        bytes[header + 9..header + HEADER_SIZE].fill(0);
    }

    fn read_header(&self, block: u32, start: u32) -> (u64, u8) {
        let bytes = self.blocks[&block].data.as_bytes();
        let header = start as usize - HEADER_SIZE;
        let mut size = [0u8; 8];
        size.copy_from_slice(&bytes[header..header + 8]);
        (u64::from_le_bytes(size), bytes[header + 8])
    }

    // --- write barrier ---------------------------------------------------

    /// Mark the cards covering the object at `addr` dirty. Called for
    /// every store through a gc-pointer; only old-generation blocks keep
    /// their marks.
    pub fn make_dirty(&mut self, addr: MemAddr) {
        let Region::Managed { block: id, offset } = addr.region() else {
            return;
        };
        let Some(block) = self.blocks.get_mut(&id) else {
            return;
        };
        if block.kind != GenKind::Old {
            return;
        }

        let bytes = block.data.as_bytes();
        let header = offset as usize - HEADER_SIZE;
        let mut size = [0u8; 8];
        size.copy_from_slice(&bytes[header..header + 8]);
        let end = offset as usize + u64::from_le_bytes(size) as usize;

        for card in header / CARD_STRIDE..=(end - 1) / CARD_STRIDE {
            block.cards[card] = 1;
        }
    }

    // --- collection ------------------------------------------------------

    /// Minor collection: trace from the stack and dirty old-generation
    /// cards, evacuate young survivors, promote the old enough.
    pub fn minor_gc<T: TypeSizes>(&mut self, stack: &mut Stack, types: &T) {
        let from: Vec<u32> = self.generation(GenKind::Young).order.clone();
        tracing::debug!(blocks = from.len(), "minor collection");
        self.collect(stack, types, &from, true);
    }

    /// Major collection: full trace, rebuild both generations.
    pub fn major_gc<T: TypeSizes>(&mut self, stack: &mut Stack, types: &T) {
        let mut from: Vec<u32> = self.generation(GenKind::Young).order.clone();
        from.extend_from_slice(&self.generation(GenKind::Old).order);
        tracing::debug!(blocks = from.len(), "major collection");
        self.collect(stack, types, &from, false);
    }

    fn collect<T: TypeSizes>(
        &mut self,
        stack: &mut Stack,
        types: &T,
        from: &[u32],
        minor: bool,
    ) {
        let index = self.index_blocks(from);

        let mut pass = CollectPass {
            forward: HashMap::new(),
            worklist: Vec::new(),
            young_to: ToSpace::new(
                GenKind::Young,
                self.generation(GenKind::Young).default_block_size,
            ),
            old_to: if minor {
                None
            } else {
                Some(ToSpace::new(
                    GenKind::Old,
                    self.generation(GenKind::Old).default_block_size,
                ))
            },
        };

        // Trace from the evaluation stack.
        let mut root_targets = Vec::new();
        collect_stack_pointers(stack, types, &mut root_targets);

        // Trace from dirty cards of the (uncollected) old generation.
        if minor {
            for &id in &self.generation(GenKind::Old).order {
                self.collect_dirty_card_pointers(id, types, &mut root_targets);
            }
        }

        for target in root_targets {
            self.evacuate(&mut pass, &index, target);
        }
        while let Some(location) = pass.worklist.pop() {
            self.scan_copied(&mut pass, &index, types, location);
        }

        // Rewrite every live managed address through the forwarding map.
        let remap = Remapper {
            index: &index,
            forward: &pass.forward,
        };
        rewrite_stack(stack, types, &remap);
        let mut live: Vec<u32> = pass.young_to.order.clone();
        if let Some(old_to) = &pass.old_to {
            live.extend_from_slice(&old_to.order);
        } else {
            live.extend_from_slice(&self.generation(GenKind::Old).order);
        }
        for id in live {
            self.rewrite_block(id, types, &remap);
        }

        // Install the to-spaces and free the from-space.
        let survivors = pass.forward.len();
        self.install(pass.young_to, GenKind::Young);
        if let Some(old_to) = pass.old_to {
            self.install(old_to, GenKind::Old);
        }
        for &id in from {
            self.blocks.remove(&id);
        }

        self.rebuild_cards(types);
        tracing::debug!(survivors, "collection finished");
    }

    /// Walk each from-space block into an object table sorted by start.
    fn index_blocks(&self, from: &[u32]) -> HashMap<u32, Vec<(u32, u32)>> {
        let mut index = HashMap::new();
        for &id in from {
            let block = &self.blocks[&id];
            let bytes = block.data.as_bytes();
            let used = block.data.used();

            let mut objects = Vec::new();
            let mut position = 0usize;
            while position + HEADER_SIZE <= used {
                let mut word = [0u8; 8];
                word.copy_from_slice(&bytes[position..position + 8]);
                let size = u64::from_le_bytes(word) as usize;
                objects.push(((position + HEADER_SIZE) as u32, size as u32));
                position += HEADER_SIZE + size;
            }
            index.insert(id, objects);
        }
        index
    }

    /// Find the object containing `offset` in an indexed block. A
    /// gc-address equals the object start; interior addresses (field and
    /// element pointers, tag-end object addresses) fall inside
    /// `(start, start + size]`.
    fn containing_object(objects: &[(u32, u32)], offset: u32) -> Option<(u32, u32)> {
        let at = objects.partition_point(|&(start, _)| start <= offset);
        let (start, size) = *objects.get(at.checked_sub(1)?)?;
        (offset <= start + size).then_some((start, size))
    }

    /// Copy the object containing `target` into to-space, if it lives in
    /// a from-space block and has not moved yet.
    fn evacuate(
        &mut self,
        pass: &mut CollectPass,
        index: &HashMap<u32, Vec<(u32, u32)>>,
        target: MemAddr,
    ) {
        let Region::Managed { block, offset } = target.region() else {
            return;
        };
        let Some(objects) = index.get(&block) else {
            return;
        };
        let Some((start, size)) = Self::containing_object(objects, offset) else {
            return;
        };
        if pass.forward.contains_key(&(block, start)) {
            return;
        }

        let (_, age) = self.read_header(block, start);
        let age = age.saturating_add(1);
        let space = if pass.old_to.is_some() {
            // Major collection: old objects stay old, young objects age.
            if self.blocks[&block].kind == GenKind::Old || age > PROMOTE_AGE {
                pass.old_to.as_mut().expect("old to-space exists")
            } else {
                &mut pass.young_to
            }
        } else if age > PROMOTE_AGE {
            // Promotion out of a minor collection lands in the live old
            // generation.
            return self.promote(pass, block, start, size, age);
        } else {
            &mut pass.young_to
        };

        let body: Vec<u8> = {
            let bytes = self.blocks[&block].data.as_bytes();
            bytes[start as usize..(start + size) as usize].to_vec()
        };

        let (to_block, to_start) = self.space_alloc(space, HEADER_SIZE + size as usize);
        self.write_header(to_block, to_start, u64::from(size), age);
        let dest = self.block_bytes_mut(to_block).expect("to-space block");
        dest[to_start as usize..(to_start + size) as usize].copy_from_slice(&body);

        pass.forward.insert((block, start), (to_block, to_start));
        pass.worklist.push((to_block, to_start, size));
    }

    /// Minor-collection promotion into the live old generation.
    fn promote(&mut self, pass: &mut CollectPass, block: u32, start: u32, size: u32, age: u8) {
        let body: Vec<u8> = {
            let bytes = self.blocks[&block].data.as_bytes();
            bytes[start as usize..(start + size) as usize].to_vec()
        };

        let total = HEADER_SIZE + size as usize;
        let (to_block, to_start) = match self.bump(GenKind::Old, total) {
            Some(location) => location,
            None => self.create_block(GenKind::Old, total),
        };
        self.write_header(to_block, to_start, u64::from(size), age);
        let dest = self.block_bytes_mut(to_block).expect("old block");
        dest[to_start as usize..(to_start + size) as usize].copy_from_slice(&body);

        pass.forward.insert((block, start), (to_block, to_start));
        pass.worklist.push((to_block, to_start, size));
    }

    /// Allocate raw space in a to-space, creating blocks as needed.
    fn space_alloc(&mut self, space: &mut ToSpace, total: usize) -> Location {
        if let Some(&id) = space.order.last() {
            let block = self.blocks.get_mut(&id).expect("to-space block");
            let position = block.data.used();
            if block.data.expand(total) {
                return (id, (position + HEADER_SIZE) as u32);
            }
        }

        let mut block = Block::new(total.max(space.default_size), space.kind);
        assert!(block.data.expand(total), "fresh block fits its request");
        let id = self.add_block(block);
        space.order.push(id);
        (id, HEADER_SIZE as u32)
    }

    /// Scan a freshly copied object for further managed references.
    fn scan_copied<T: TypeSizes>(
        &mut self,
        pass: &mut CollectPass,
        index: &HashMap<u32, Vec<(u32, u32)>>,
        types: &T,
        (block, start, size): (u32, u32, u32),
    ) {
        let body: Vec<u8> = {
            let bytes = self.blocks[&block].data.as_bytes();
            bytes[start as usize..(start + size) as usize].to_vec()
        };

        let mut targets = Vec::new();
        collect_object_pointers(&body, size as usize, types, &mut targets);
        for target in targets {
            self.evacuate(pass, index, target);
        }
    }

    /// Collect managed targets referenced from dirty card ranges of an
    /// old-generation block.
    fn collect_dirty_card_pointers<T: TypeSizes>(
        &self,
        id: u32,
        types: &T,
        targets: &mut Vec<MemAddr>,
    ) {
        let block = &self.blocks[&id];
        if block.cards.iter().all(|&card| card == 0) {
            return;
        }

        let bytes = block.data.as_bytes();
        let used = block.data.used();
        let dirty = |from: usize, to: usize| {
            (from / CARD_STRIDE..=to.saturating_sub(1) / CARD_STRIDE)
                .any(|card| block.cards.get(card) == Some(&1))
        };

        let mut position = 0usize;
        while position + HEADER_SIZE <= used {
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[position..position + 8]);
            let size = u64::from_le_bytes(word) as usize;
            let start = position + HEADER_SIZE;

            if dirty(position, start + size) {
                collect_object_pointers(&bytes[start..start + size], size, types, targets);
            }
            position = start + size;
        }
    }

    /// Rewrite every pointer slot of every object in block `id`.
    fn rewrite_block<T: TypeSizes>(&mut self, id: u32, types: &T, remap: &Remapper<'_>) {
        let Some(block) = self.blocks.get(&id) else {
            return;
        };
        let used = block.data.used();

        let mut position = 0usize;
        while position + HEADER_SIZE <= used {
            let bytes = self.blocks[&id].data.as_bytes();
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[position..position + 8]);
            let size = u64::from_le_bytes(word) as usize;
            let start = position + HEADER_SIZE;

            let mut body = bytes[start..start + size].to_vec();
            rewrite_object(&mut body, size, types, remap);
            let dest = self.block_bytes_mut(id).expect("block exists");
            dest[start..start + size].copy_from_slice(&body);

            position = start + size;
        }
    }

    /// Make a to-space the live generation. An empty to-space gets one
    /// fresh default block so allocation can continue.
    fn install(&mut self, mut space: ToSpace, kind: GenKind) {
        if space.order.is_empty() {
            let id = self.add_block(Block::new(space.default_size, space.kind));
            space.order.push(id);
        }
        let current = space.order.len() - 1;
        let generation = self.generation_mut(kind);
        generation.order = space.order;
        generation.current = current;
    }

    /// Clear all cards, then re-mark those covering old-generation slots
    /// that still reference the young generation (freshly promoted
    /// objects carry such references).
    fn rebuild_cards<T: TypeSizes>(&mut self, types: &T) {
        let old_order = self.generation(GenKind::Old).order.clone();
        let young_order = self.generation(GenKind::Young).order.clone();

        for id in self.blocks.keys().copied().collect::<Vec<_>>() {
            let block = self.blocks.get_mut(&id).expect("block exists");
            block.cards.fill(0);
        }

        for &id in &old_order {
            let block = &self.blocks[&id];
            let bytes = block.data.as_bytes();
            let used = block.data.used();

            let mut marks = Vec::new();
            let mut position = 0usize;
            while position + HEADER_SIZE <= used {
                let mut word = [0u8; 8];
                word.copy_from_slice(&bytes[position..position + 8]);
                let size = u64::from_le_bytes(word) as usize;
                let start = position + HEADER_SIZE;

                let mut targets = Vec::new();
                collect_object_pointers(&bytes[start..start + size], size, types, &mut targets);
                let references_young = targets.iter().any(|addr| {
                    matches!(addr.region(), Region::Managed { block, .. }
                        if young_order.contains(&block))
                });
                if references_young {
                    marks.push((position, start + size));
                }
                position = start + size;
            }

            let block = self.blocks.get_mut(&id).expect("block exists");
            for (from, to) in marks {
                for card in from / CARD_STRIDE..=(to - 1) / CARD_STRIDE {
                    block.cards[card] = 1;
                }
            }
        }
    }
}

/// Per-collection scratch state.
struct CollectPass {
    forward: HashMap<Location, Location>,
    /// Copied objects whose interiors still need scanning:
    /// (block, start, size).
    worklist: Vec<(u32, u32, u32)>,
    young_to: ToSpace,
    /// Present only during a major collection.
    old_to: Option<ToSpace>,
}

/// A growing list of destination blocks.
struct ToSpace {
    kind: GenKind,
    order: Vec<u32>,
    default_size: usize,
}

impl ToSpace {
    const fn new(kind: GenKind, default_size: usize) -> Self {
        Self {
            kind,
            order: Vec::new(),
            default_size,
        }
    }
}

/// Address rewriting through the forwarding map.
struct Remapper<'a> {
    index: &'a HashMap<u32, Vec<(u32, u32)>>,
    forward: &'a HashMap<Location, Location>,
}

impl Remapper<'_> {
    /// The post-collection address of `addr`. Addresses outside the
    /// collected blocks are unchanged; interior addresses keep their
    /// displacement from the object start.
    fn remap(&self, addr: MemAddr) -> MemAddr {
        let Region::Managed { block, offset } = addr.region() else {
            return addr;
        };
        let Some(objects) = self.index.get(&block) else {
            return addr;
        };
        let Some((start, _)) = Collector::containing_object(objects, offset) else {
            return addr;
        };
        let Some(&(to_block, to_start)) = self.forward.get(&(block, start)) else {
            return addr;
        };
        MemAddr::managed(to_block, (to_start + (offset - start)) as usize)
    }
}

/// Collect managed pointer targets from every slot of the evaluation
/// stack.
fn collect_stack_pointers<T: TypeSizes>(stack: &Stack, types: &T, targets: &mut Vec<MemAddr>) {
    walk_slots(stack.as_bytes(), stack.used(), types, &mut |bytes, slot| {
        let addr = match slot {
            PointerSlot::Fat(at) => object::read_pointer(bytes, at).addr,
            PointerSlot::Gc(at) => object::read_gc_pointer(bytes, at),
        };
        if matches!(addr.region(), Region::Managed { .. }) {
            targets.push(addr);
        }
    });
}

/// Collect managed pointer targets from one object body (`body` spans
/// exactly the object's bytes; its tag sits at the end).
fn collect_object_pointers<T: TypeSizes>(
    body: &[u8],
    size: usize,
    types: &T,
    targets: &mut Vec<MemAddr>,
) {
    object::for_each_pointer_slot(body, size, types, &mut |slot| {
        let addr = match slot {
            PointerSlot::Fat(at) => object::read_pointer(body, at).addr,
            PointerSlot::Gc(at) => object::read_gc_pointer(body, at),
        };
        if matches!(addr.region(), Region::Managed { .. }) {
            targets.push(addr);
        }
    });
}

/// Rewrite the pointer slots of one object body in place.
fn rewrite_object<T: TypeSizes>(body: &mut [u8], size: usize, types: &T, remap: &Remapper<'_>) {
    let mut slots = Vec::new();
    object::for_each_pointer_slot(body, size, types, &mut |slot| slots.push(slot));

    for slot in slots {
        match slot {
            PointerSlot::Fat(at) => {
                let mut pointer = object::read_pointer(body, at);
                pointer.addr = remap.remap(pointer.addr);
                object::write_pointer(body, at, pointer);
            }
            PointerSlot::Gc(at) => {
                let target = remap.remap(object::read_gc_pointer(body, at));
                object::write_gc_pointer(body, at, target);
            }
        }
    }
}

/// Rewrite the pointer slots of every stack slot in place.
fn rewrite_stack<T: TypeSizes>(stack: &mut Stack, types: &T, remap: &Remapper<'_>) {
    let used = stack.used();
    let mut slots = Vec::new();
    walk_slots(stack.as_bytes(), used, types, &mut |_, slot| {
        slots.push(slot);
    });

    let bytes = stack.as_bytes_mut();
    for slot in slots {
        match slot {
            PointerSlot::Fat(at) => {
                let mut pointer = object::read_pointer(bytes, at);
                pointer.addr = remap.remap(pointer.addr);
                object::write_pointer(bytes, at, pointer);
            }
            PointerSlot::Gc(at) => {
                let target = remap.remap(object::read_gc_pointer(bytes, at));
                object::write_gc_pointer(bytes, at, target);
            }
        }
    }
}

/// Walk every slot of a well-formed stack prefix top-down, reporting each
/// pointer-bearing position.
fn walk_slots<T: TypeSizes>(
    bytes: &[u8],
    used: usize,
    types: &T,
    visit: &mut dyn FnMut(&[u8], PointerSlot),
) {
    let mut offset = used;
    while offset > 0 {
        let Some(size) = object::slot_size(bytes, offset, types) else {
            // A malformed slot ends the walk; the interpreter maintains
            // the top-word-is-type-tag invariant between instructions.
            tracing::trace!(offset, "stack walk stopped at untyped slot");
            return;
        };
        let tag = object::read_tag(bytes, offset).expect("slot_size read the tag");
        if !matches!(tag.kind(), TypeKind::None) {
            object::for_each_pointer_slot(bytes, offset, types, &mut |slot| visit(bytes, slot));
        }
        offset -= size;
    }
}
