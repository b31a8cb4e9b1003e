//! Dedicated vertex buffers for large meshes, reused across frames.
//!
//! Each cached mesh owns a buffer sized exactly to its geometry. The buffer
//! is rewritten only when the mesh generation (or the material it is drawn
//! with) changes, so a static large mesh costs nothing per frame after the
//! first.
//!
//! Entries live in an arena indexed by slot, with a map from [`MeshId`] to
//! slot and a free list of vacated slots. The cache is bounded: inserting
//! past `max_entries` evicts the least recently used entry that was not used
//! in the current frame, and queues its buffer handle for release.

use std::collections::HashMap;
use std::sync::Arc;

use super::buffer::{Reservation, VertexBuffer};
use super::pool::writable;
use crate::backend::{BufferHandle, MaterialId};
use crate::error::{RenderError, RenderResult};
use crate::resources::{Mesh, MeshId, VertexLayout};

/// What [`MeshBufferCache::fetch`] had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Existing buffer reused untouched
    Hit,
    /// New entry built
    Miss,
    /// Existing entry rewritten, in place or in a new buffer
    Rebuilt,
}

#[derive(Debug)]
struct CacheEntry {
    mesh: MeshId,
    buffer: Arc<VertexBuffer>,
    /// Generation the buffer was built from; `None` while a rebuild has not
    /// completed
    generation: Option<u64>,
    last_used: u64,
}

pub struct MeshBufferCache {
    entries: Vec<Option<CacheEntry>>,
    index: HashMap<MeshId, usize>,
    free: Vec<usize>,
    max_entries: usize,
    frame: u64,
    released: Vec<BufferHandle>,
    evictions: usize,
}

impl MeshBufferCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            free: Vec::new(),
            max_entries,
            frame: 0,
            released: Vec::new(),
            evictions: 0,
        }
    }

    /// Start a new frame; entries used from now on are protected from eviction
    pub fn begin_frame(&mut self) {
        self.frame += 1;
        self.evictions = 0;
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, mesh: MeshId) -> bool {
        self.index.contains_key(&mesh)
    }

    /// Generation the cached buffer for `mesh` was built from
    pub fn generation(&self, mesh: MeshId) -> Option<u64> {
        self.entry(*self.index.get(&mesh)?)?.generation
    }

    /// Buffer cached for `mesh`
    pub fn buffer_for(&self, mesh: MeshId) -> Option<&Arc<VertexBuffer>> {
        self.buffer(*self.index.get(&mesh)?)
    }

    /// Buffer in arena slot `slot`
    pub fn buffer(&self, slot: usize) -> Option<&Arc<VertexBuffer>> {
        self.entry(slot).map(|e| &e.buffer)
    }

    /// Entries evicted since [`begin_frame`](Self::begin_frame)
    pub fn evictions(&self) -> usize {
        self.evictions
    }

    /// Handles of buffers dropped since the last call
    pub fn take_released(&mut self) -> Vec<BufferHandle> {
        std::mem::take(&mut self.released)
    }

    /// Drop every entry, queueing all handles for release
    pub fn invalidate_all(&mut self) {
        for entry in self.entries.drain(..).flatten() {
            self.released.push(entry.buffer.handle());
        }
        self.index.clear();
        self.free.clear();
    }

    /// Find or build the buffer for `mesh`.
    ///
    /// `fill` runs only when the buffer has to be (re)written and receives a
    /// reservation sized exactly to the mesh. Returns the arena slot of the
    /// entry and what happened.
    pub fn fetch<F>(
        &mut self,
        mesh: &Mesh,
        material: MaterialId,
        layout: &VertexLayout,
        fill: F,
    ) -> RenderResult<(usize, CacheOutcome)>
    where
        F: FnOnce(Reservation<'_>) -> RenderResult<()>,
    {
        let id = mesh.id();
        let vertices = mesh.vertex_count();
        let indices = mesh.index_count();

        let Some(slot) = self.index.get(&id).copied() else {
            let mut buffer = VertexBuffer::new(layout, vertices, indices);
            let reservation = buffer
                .reserve(material, vertices, indices)
                .map_err(|source| RenderError::CacheRebuildFailed { mesh: id, source })?;
            fill(reservation)?;
            log::debug!(
                "MeshBufferCache: built {:?} for mesh {:?} ({vertices} vertices)",
                buffer.handle(),
                id
            );

            let entry = CacheEntry {
                mesh: id,
                buffer: Arc::new(buffer),
                generation: Some(mesh.generation()),
                last_used: self.frame,
            };
            return Ok((self.insert(entry), CacheOutcome::Miss));
        };

        let frame = self.frame;
        let Some(entry) = self.entries.get_mut(slot).and_then(Option::as_mut) else {
            // Index pointed at a vacated slot; forget it and build afresh.
            self.index.remove(&id);
            return self.fetch(mesh, material, layout, fill);
        };
        let used_this_frame = entry.last_used == frame;
        entry.last_used = frame;

        // A mesh is baked once per frame; later submissions draw that bake.
        let current = entry.generation == Some(mesh.generation())
            && entry.buffer.material() == Some(material);
        if current || (used_this_frame && entry.generation.is_some()) {
            return Ok((slot, CacheOutcome::Hit));
        }

        entry.generation = None;
        if !entry.buffer.can_hold(vertices, indices) {
            log::debug!(
                "MeshBufferCache: mesh {:?} grew to {vertices} vertices, replacing {:?}",
                id,
                entry.buffer.handle()
            );
            self.released.push(entry.buffer.handle());
            entry.buffer = Arc::new(VertexBuffer::new(layout, vertices, indices));
        }

        let buffer = writable(&mut entry.buffer);
        buffer.clear();
        let reservation = buffer
            .reserve(material, vertices, indices)
            .map_err(|source| RenderError::CacheRebuildFailed { mesh: id, source })?;
        fill(reservation)?;
        entry.generation = Some(mesh.generation());

        log::debug!(
            "MeshBufferCache: rebuilt mesh {:?} at generation {}",
            id,
            mesh.generation()
        );
        Ok((slot, CacheOutcome::Rebuilt))
    }

    fn entry(&self, slot: usize) -> Option<&CacheEntry> {
        self.entries.get(slot).and_then(Option::as_ref)
    }

    fn insert(&mut self, entry: CacheEntry) -> usize {
        if self.index.len() >= self.max_entries {
            self.evict_lru();
        }

        let mesh = entry.mesh;
        let slot = match self.free.pop() {
            Some(slot) => {
                self.entries[slot] = Some(entry);
                slot
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        };
        self.index.insert(mesh, slot);
        slot
    }

    fn evict_lru(&mut self) {
        let frame = self.frame;
        let victim = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(slot, e)| e.as_ref().map(|e| (slot, e.last_used)))
            .filter(|&(_, last_used)| last_used < frame)
            .min_by_key(|&(_, last_used)| last_used)
            .map(|(slot, _)| slot);

        let Some(slot) = victim else {
            log::warn!(
                "MeshBufferCache: all {} entries used this frame, growing past the bound of {}",
                self.index.len(),
                self.max_entries
            );
            return;
        };

        if let Some(entry) = self.entries[slot].take() {
            log::debug!(
                "MeshBufferCache: evicting mesh {:?} (last used frame {})",
                entry.mesh,
                entry.last_used
            );
            self.index.remove(&entry.mesh);
            self.released.push(entry.buffer.handle());
            self.free.push(slot);
            self.evictions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::assembler::{assemble, resolve_layout};
    use glam::{Mat4, Vec3, Vec4};

    fn fetch(
        cache: &mut MeshBufferCache,
        mesh: &Mesh,
        assembled: &mut usize,
    ) -> RenderResult<(usize, CacheOutcome)> {
        let layout = VertexLayout::position_only();
        let writers = resolve_layout(&layout)?;
        cache.fetch(mesh, MaterialId(0), &layout, |reservation| {
            *assembled += 1;
            assemble(&writers, mesh, &Mat4::IDENTITY, Vec4::ONE, reservation)
        })
    }

    #[test]
    fn test_hit_reuses_without_assembly() {
        let mut cache = MeshBufferCache::new(8);
        let mesh = Mesh::plane(1.0, 1.0, 4);
        let mut assembled = 0;

        cache.begin_frame();
        let (slot, outcome) = fetch(&mut cache, &mesh, &mut assembled).unwrap();
        assert_eq!(outcome, CacheOutcome::Miss);
        let handle = cache.buffer(slot).unwrap().handle();
        let revision = cache.buffer(slot).unwrap().revision();

        cache.begin_frame();
        let (again, outcome) = fetch(&mut cache, &mesh, &mut assembled).unwrap();
        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(again, slot);
        assert_eq!(assembled, 1);
        assert_eq!(cache.buffer(slot).unwrap().handle(), handle);
        assert_eq!(cache.buffer(slot).unwrap().revision(), revision);
    }

    #[test]
    fn test_generation_change_rebuilds_in_place() {
        let mut cache = MeshBufferCache::new(8);
        let mut mesh = Mesh::plane(1.0, 1.0, 4);
        let mut assembled = 0;

        cache.begin_frame();
        let (slot, _) = fetch(&mut cache, &mesh, &mut assembled).unwrap();
        let handle = cache.buffer(slot).unwrap().handle();

        mesh.edit().positions[0] = Vec3::splat(7.0);
        cache.begin_frame();
        let (_, outcome) = fetch(&mut cache, &mesh, &mut assembled).unwrap();
        assert_eq!(outcome, CacheOutcome::Rebuilt);
        assert_eq!(assembled, 2);
        assert_eq!(cache.generation(mesh.id()), Some(mesh.generation()));
        assert_eq!(cache.buffer(slot).unwrap().handle(), handle);
        assert!(cache.take_released().is_empty());
    }

    #[test]
    fn test_grown_mesh_gets_new_buffer() {
        let mut cache = MeshBufferCache::new(8);
        let mut mesh = Mesh::quad();
        let mut assembled = 0;

        cache.begin_frame();
        let (slot, _) = fetch(&mut cache, &mesh, &mut assembled).unwrap();
        let old = cache.buffer(slot).unwrap().handle();

        let cube = Mesh::cube();
        *mesh.edit() = cube.data().clone();
        cache.begin_frame();
        let (slot, outcome) = fetch(&mut cache, &mesh, &mut assembled).unwrap();
        assert_eq!(outcome, CacheOutcome::Rebuilt);
        assert_ne!(cache.buffer(slot).unwrap().handle(), old);
        assert_eq!(cache.buffer(slot).unwrap().vertex_count(), 24);
        assert_eq!(cache.take_released(), vec![old]);
    }

    #[test]
    fn test_failed_rebuild_forces_next_rebuild() {
        let mut cache = MeshBufferCache::new(8);
        let mut mesh = Mesh::quad();
        let mut assembled = 0;

        cache.begin_frame();
        fetch(&mut cache, &mesh, &mut assembled).unwrap();

        mesh.edit().indices[0] = 42;
        cache.begin_frame();
        assert!(fetch(&mut cache, &mesh, &mut assembled).is_err());
        assert_eq!(cache.generation(mesh.id()), None);

        mesh.edit().indices[0] = 0;
        cache.begin_frame();
        let (_, outcome) = fetch(&mut cache, &mesh, &mut assembled).unwrap();
        assert_eq!(outcome, CacheOutcome::Rebuilt);
    }

    #[test]
    fn test_second_use_in_a_frame_keeps_the_bake() {
        let mut cache = MeshBufferCache::new(8);
        let mesh = Mesh::quad();
        let layout = VertexLayout::position_only();
        let writers = resolve_layout(&layout).unwrap();

        cache.begin_frame();
        let (slot, _) = cache
            .fetch(&mesh, MaterialId(1), &layout, |r| {
                assemble(&writers, &mesh, &Mat4::IDENTITY, Vec4::ONE, r)
            })
            .unwrap();
        let (_, outcome) = cache
            .fetch(&mesh, MaterialId(2), &layout, |r| {
                assemble(&writers, &mesh, &Mat4::IDENTITY, Vec4::ONE, r)
            })
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Hit);
        assert_eq!(cache.buffer(slot).unwrap().material(), Some(MaterialId(1)));

        cache.begin_frame();
        let (_, outcome) = cache
            .fetch(&mesh, MaterialId(2), &layout, |r| {
                assemble(&writers, &mesh, &Mat4::IDENTITY, Vec4::ONE, r)
            })
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Rebuilt);
        assert_eq!(cache.buffer(slot).unwrap().material(), Some(MaterialId(2)));
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = MeshBufferCache::new(2);
        let meshes = [Mesh::quad(), Mesh::quad(), Mesh::quad()];
        let mut assembled = 0;

        cache.begin_frame();
        let (first, _) = fetch(&mut cache, &meshes[0], &mut assembled).unwrap();
        let evicted = cache.buffer(first).unwrap().handle();
        cache.begin_frame();
        fetch(&mut cache, &meshes[1], &mut assembled).unwrap();
        cache.begin_frame();
        fetch(&mut cache, &meshes[2], &mut assembled).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.evictions(), 1);
        assert!(!cache.contains(meshes[0].id()));
        assert!(cache.contains(meshes[2].id()));
        assert_eq!(cache.take_released(), vec![evicted]);
    }

    #[test]
    fn test_entries_used_this_frame_are_not_evicted() {
        let mut cache = MeshBufferCache::new(1);
        let meshes = [Mesh::quad(), Mesh::quad()];
        let mut assembled = 0;

        cache.begin_frame();
        fetch(&mut cache, &meshes[0], &mut assembled).unwrap();
        fetch(&mut cache, &meshes[1], &mut assembled).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.evictions(), 0);
    }
}
