//! Quadric-error-metric edge-collapse mesh simplifier.
//!
//! [`MeshSimplifier`] reduces a triangle list to a target count while
//! minimizing cumulative quadric error, honoring per-vertex position locks
//! placed by a caller (the virtual geometry builder locks cluster-group
//! boundaries so adjacent groups stay watertight across LOD transitions).

mod error;
mod heap;
mod options;
mod quadric;

pub use error::SimplifyError;
pub use options::SimplifierOptions;
pub use quadric::{QuadricSurface, Vertex};

use fxhash::FxHashMap;
use heap::EdgeHeap;
use nalgebra::Point3;
use smallvec::SmallVec;
use spatial_hash::position_hash;
use tracing::{debug, trace, warn};

/// Result of a [`MeshSimplifier::simplify`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplifyReport {
    /// `true` iff the recomputed live-triangle count matched the invariant
    /// counters tracked throughout the run. A locked boundary preventing the
    /// simplifier from reaching `target` is still `true` here -- only a
    /// counter mismatch is a failure.
    pub success: bool,
    /// Highest collapse error accepted while pursuing the target, in
    /// world-space-squared-distance units. `0.0` if no edge was ever popped.
    pub max_error: f64,
    /// Live triangle count after compaction.
    pub remaining_triangles: u32,
}

/// `==` on `Point3<f32>` already treats `-0.0` and `+0.0` as equal per
/// IEEE-754; NaN is a programmer error the simplifier does not accommodate.
fn positions_equal(a: &Point3<f32>, b: &Point3<f32>) -> bool {
    a == b
}

fn sorted_triangle(a: u32, b: u32, c: u32) -> (u32, u32, u32) {
    let mut v = [a, b, c];
    v.sort_unstable();
    (v[0], v[1], v[2])
}

fn canonical_edge(pa: u32, pb: u32, pos_a: &Point3<f32>, pos_b: &Point3<f32>) -> (u32, u32) {
    if position_hash(pos_a) <= position_hash(pos_b) {
        (pa, pb)
    } else {
        (pb, pa)
    }
}

/// Edge-collapse simplifier over an owned copy of a triangle mesh.
///
/// Construction takes ownership of the vertex/index buffers; [`simplify`]
/// mutates them in place and [`into_parts`] hands the reduced buffers back
/// to the caller.
pub struct MeshSimplifier {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    locked: Vec<bool>,
    vertex_ref_count: Vec<u32>,
    /// Offsets in `indices` that currently hold each vertex id.
    vertex_offsets: Vec<SmallVec<[u32; 8]>>,
    triangle_removed: Vec<bool>,
    triangle_surfaces: Vec<QuadricSurface>,
    vertex_table: spatial_hash::PositionTable,
    index_table: spatial_hash::PositionTable,
    /// Edge endpoints by edge id, canonical (lower position-hash first).
    edges: Vec<(u32, u32)>,
    edge_alive: Vec<bool>,
    edge_lookup: FxHashMap<(u32, u32), u32>,
    /// Edge ids touching each vertex.
    vertex_edges: Vec<SmallVec<[u32; 8]>>,
    duplicate_table: FxHashMap<(u32, u32, u32), u32>,
    heap: EdgeHeap,
    free_edges: Vec<u32>,
    options: SimplifierOptions,
    max_error: f64,
}

impl MeshSimplifier {
    /// Build a simplifier over an owned vertex/index buffer. `indices.len()`
    /// must be a multiple of 3.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>, options: SimplifierOptions) -> Self {
        assert_eq!(indices.len() % 3, 0, "index buffer is not a triangle list");
        let vertex_count = vertices.len();
        let triangle_count = indices.len() / 3;

        let mut vertex_ref_count = vec![0u32; vertex_count];
        for &vi in &indices {
            vertex_ref_count[vi as usize] += 1;
        }

        let mut vertex_offsets = vec![SmallVec::new(); vertex_count];
        for (offset, &vi) in indices.iter().enumerate() {
            vertex_offsets[vi as usize].push(offset as u32);
        }

        let mut vertex_table = spatial_hash::PositionTable::new();
        for (vi, v) in vertices.iter().enumerate() {
            vertex_table.insert_at(&v.position, vi as u32);
        }

        let mut index_table = spatial_hash::PositionTable::new();
        for (offset, &vi) in indices.iter().enumerate() {
            index_table.insert_at(&vertices[vi as usize].position, offset as u32);
        }

        // Upper bound on distinct edges ever instantiated: collapses only
        // relabel existing topology, never introduce genuinely new
        // vertex-pairs beyond what the source triangles already contained.
        // Generous headroom over the tight 3x bound covers transient
        // re-triangulation during a single merge step.
        let edge_capacity = 6 * triangle_count + 16;

        Self {
            locked: vec![false; vertex_count],
            vertex_ref_count,
            vertex_offsets,
            triangle_removed: vec![false; triangle_count],
            triangle_surfaces: vec![QuadricSurface::default(); triangle_count],
            vertex_table,
            index_table,
            edges: Vec::with_capacity(edge_capacity),
            edge_alive: Vec::with_capacity(edge_capacity),
            edge_lookup: FxHashMap::default(),
            vertex_edges: vec![SmallVec::new(); vertex_count],
            duplicate_table: FxHashMap::default(),
            heap: EdgeHeap::with_capacity(edge_capacity),
            free_edges: Vec::new(),
            options,
            max_error: 0.0,
            vertices,
            indices,
        }
    }

    pub fn options(&self) -> &SimplifierOptions {
        &self.options
    }

    pub fn max_error(&self) -> f64 {
        self.max_error
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Lock every vertex at `position` (within hash-exact tolerance) so the
    /// simplifier never moves it. Callers on cluster-group boundaries lock
    /// both endpoints of every group-external edge before simplifying.
    pub fn lock_position(&mut self, position: &Point3<f32>) {
        let hash = position_hash(position);
        let matches: SmallVec<[u32; 4]> = self
            .vertex_table
            .iter(hash)
            .filter(|&vi| positions_equal(&self.vertices[vi as usize].position, position))
            .collect();
        for vi in matches {
            self.locked[vi as usize] = true;
        }
    }

    fn remaining_triangles(&self) -> u32 {
        self.triangle_removed.iter().filter(|&&r| !r).count() as u32
    }

    fn remove_triangle(&mut self, t: usize) {
        if self.triangle_removed[t] {
            return;
        }
        self.triangle_removed[t] = true;
        for slot in 0..3 {
            let offset = 3 * t + slot;
            let vi = self.indices[offset] as usize;
            if self.vertex_ref_count[vi] > 0 {
                self.vertex_ref_count[vi] -= 1;
            }
            self.vertex_offsets[vi].retain(|&o| o as usize != offset);
        }
    }

    /// Redirect one index slot to the lowest-indexed vertex sharing its
    /// exact position, per the position tables built at construction.
    fn redirect_slot(&mut self, offset: usize) {
        let vi = self.indices[offset];
        let pos = self.vertices[vi as usize].position;
        let hash = position_hash(&pos);
        let mut lowest = vi;
        for candidate in self.vertex_table.iter(hash) {
            if candidate < lowest && positions_equal(&self.vertices[candidate as usize].position, &pos) {
                lowest = candidate;
            }
        }
        if lowest != vi {
            self.vertex_ref_count[vi as usize] -= 1;
            self.vertex_ref_count[lowest as usize] += 1;
            self.vertex_offsets[vi as usize].retain(|&o| o as usize != offset);
            self.vertex_offsets[lowest as usize].push(offset as u32);
            self.indices[offset] = lowest;
            if self.locked[vi as usize] {
                self.locked[lowest as usize] = true;
            }
        }
    }

    /// `fix_triangle`: drop degenerate triangles, coalesce coincident
    /// vertices, recompute the triangle's quadric, and drop it if it is now
    /// a duplicate of a triangle already seen.
    fn fix_triangle(&mut self, t: usize) {
        if self.triangle_removed[t] {
            return;
        }
        let base = 3 * t;
        let (i0, i1, i2) = (self.indices[base], self.indices[base + 1], self.indices[base + 2]);
        let (p0, p1, p2) = (self.vertices[i0 as usize].position, self.vertices[i1 as usize].position, self.vertices[i2 as usize].position);
        if positions_equal(&p0, &p1) || positions_equal(&p1, &p2) || positions_equal(&p0, &p2) {
            self.remove_triangle(t);
            return;
        }

        for slot in 0..3 {
            self.redirect_slot(base + slot);
        }
        let (i0, i1, i2) = (self.indices[base], self.indices[base + 1], self.indices[base + 2]);
        let (p0, p1, p2) = (self.vertices[i0 as usize].position, self.vertices[i1 as usize].position, self.vertices[i2 as usize].position);
        self.triangle_surfaces[t] = QuadricSurface::from_triangle(&p0, &p1, &p2);

        let key = sorted_triangle(i0, i1, i2);
        if let Some(&other) = self.duplicate_table.get(&key) {
            if other as usize != t && !self.triangle_removed[other as usize] {
                self.remove_triangle(t);
                return;
            }
        }
        self.duplicate_table.insert(key, t as u32);
    }

    fn adjacent_triangles(&self, vertex: u32) -> SmallVec<[u32; 16]> {
        let mut out: SmallVec<[u32; 16]> = SmallVec::new();
        for &offset in &self.vertex_offsets[vertex as usize] {
            let t = offset / 3;
            if !self.triangle_removed[t as usize] && !out.contains(&t) {
                out.push(t);
            }
        }
        out
    }

    fn remove_edge(&mut self, edge: u32) {
        if !self.edge_alive[edge as usize] {
            return;
        }
        self.edge_alive[edge as usize] = false;
        self.heap.remove(edge);
        let (a, b) = self.edges[edge as usize];
        self.edge_lookup.remove(&(a, b));
        self.vertex_edges[a as usize].retain(|&e| e != edge);
        self.vertex_edges[b as usize].retain(|&e| e != edge);
        self.free_edges.push(edge);
    }

    fn insert_edge(&mut self, a: u32, b: u32) -> Option<u32> {
        let pos_a = self.vertices[a as usize].position;
        let pos_b = self.vertices[b as usize].position;
        if positions_equal(&pos_a, &pos_b) {
            return None; // degenerate self-loop after coalescing
        }
        let (lo, hi) = canonical_edge(a, b, &pos_a, &pos_b);
        if let Some(&existing) = self.edge_lookup.get(&(lo, hi)) {
            return Some(existing);
        }
        let id = if let Some(id) = self.free_edges.pop() {
            self.edges[id as usize] = (lo, hi);
            self.edge_alive[id as usize] = true;
            id
        } else {
            let id = self.edges.len() as u32;
            self.edges.push((lo, hi));
            self.edge_alive.push(true);
            id
        };
        self.edge_lookup.insert((lo, hi), id);
        self.vertex_edges[lo as usize].push(id);
        self.vertex_edges[hi as usize].push(id);
        Some(id)
    }

    /// Build the initial edge set from the current (post-`fix_triangle`)
    /// triangle list.
    fn build_edges(&mut self) {
        let triangle_count = self.triangle_removed.len();
        for t in 0..triangle_count {
            if self.triangle_removed[t] {
                continue;
            }
            let base = 3 * t;
            let tri = [self.indices[base], self.indices[base + 1], self.indices[base + 2]];
            for k in 0..3 {
                self.insert_edge(tri[k], tri[(k + 1) % 3]);
            }
        }
    }

    /// `evaluate(p0, p1, do_merge)`. Returns the collapse error for merging
    /// the two endpoints of `edge`; if `do_merge`, also performs the merge
    /// and returns the dirty edges that need a fresh heap entry.
    fn evaluate(&mut self, edge: u32, do_merge: bool) -> (f64, Vec<u32>) {
        let (p0, p1) = self.edges[edge as usize];
        let tris0 = self.adjacent_triangles(p0);
        let tris1 = self.adjacent_triangles(p1);
        let mut tri_set: SmallVec<[u32; 24]> = SmallVec::new();
        for &t in tris0.iter().chain(tris1.iter()) {
            if !tri_set.contains(&t) {
                tri_set.push(t);
            }
        }
        if tri_set.is_empty() {
            return (0.0, Vec::new());
        }

        let locked0 = self.locked[p0 as usize];
        let locked1 = self.locked[p1 as usize];
        let mut merged = QuadricSurface::default();
        for &t in &tri_set {
            merged.add_assign(&self.triangle_surfaces[t as usize]);
        }

        let mut error = 0.0;
        let overflow_start = self.options.neighbor_overflow_penalty_start as f64;
        if tri_set.len() as f64 > overflow_start {
            error += 0.5 * (tri_set.len() as f64 - overflow_start);
        }

        let pos0 = self.vertices[p0 as usize].position;
        let pos1 = self.vertices[p1 as usize].position;
        let midpoint = Point3::from((pos0.coords + pos1.coords) * 0.5);
        let edge_len = (pos1 - pos0).norm();

        let new_pos = if locked0 && locked1 {
            error += 1.0e8;
            midpoint
        } else if locked0 {
            pos0
        } else if locked1 {
            pos1
        } else {
            match merged.solve_minimizing_vertex() {
                Some(p) if (p - midpoint).norm() <= 2.0 * edge_len => p,
                _ => midpoint,
            }
        };
        error += merged.distance_to_surface(&new_pos);

        let mut dirty = Vec::new();
        if do_merge {
            dirty = self.apply_merge(p0, p1, new_pos, locked0 || locked1, &tri_set);
        }
        (error, dirty)
    }

    fn apply_merge(&mut self, p0: u32, p1: u32, new_pos: Point3<f32>, new_locked: bool, tri_set: &[u32]) -> Vec<u32> {
        let survivor = p0.min(p1);
        let eliminated = p0.max(p1);

        let old_pos_survivor = self.vertices[survivor as usize].position;
        let old_pos_eliminated = self.vertices[eliminated as usize].position;
        self.vertex_table.remove(position_hash(&old_pos_survivor), survivor);
        self.vertex_table.remove(position_hash(&old_pos_eliminated), eliminated);

        let (normal, tangent, uv) = self.vertices[survivor as usize].lerp_attributes(&self.vertices[eliminated as usize], 0.5);
        self.vertices[survivor as usize] = Vertex::new(new_pos, normal, tangent, uv);
        self.locked[survivor as usize] = new_locked;
        self.vertex_table.insert_at(&new_pos, survivor);

        // Every offset that held either endpoint moves to the new position's
        // hash bucket in `index_table`, regardless of which vertex id it
        // ends up referencing.
        let survivor_offsets_before: SmallVec<[u32; 8]> = self.vertex_offsets[survivor as usize].clone();
        for &offset in &survivor_offsets_before {
            self.index_table.remove(position_hash(&old_pos_survivor), offset);
            self.index_table.insert_at(&new_pos, offset);
        }
        let eliminated_offsets: SmallVec<[u32; 8]> = std::mem::take(&mut self.vertex_offsets[eliminated as usize]);
        for &offset in &eliminated_offsets {
            self.index_table.remove(position_hash(&old_pos_eliminated), offset);
            self.index_table.insert_at(&new_pos, offset);
            self.indices[offset as usize] = survivor;
            self.vertex_offsets[survivor as usize].push(offset);
        }
        self.vertex_ref_count[survivor as usize] += self.vertex_ref_count[eliminated as usize];
        self.vertex_ref_count[eliminated as usize] = 0;

        // Retire every edge touching either endpoint; `fix_triangle` below
        // recomputes adjacency, and the outer loop re-derives fresh edges
        // (and fresh heap errors) for whatever survives.
        let stale_edges: SmallVec<[u32; 16]> = self.vertex_edges[survivor as usize]
            .iter()
            .chain(self.vertex_edges[eliminated as usize].iter())
            .copied()
            .collect();
        for edge in stale_edges {
            self.remove_edge(edge);
        }

        for &t in tri_set {
            self.fix_triangle(t as usize);
        }

        // Re-derive edges for whatever triangles survived the fix-up pass,
        // flagging them for the caller to push back onto the heap with a
        // fresh `evaluate`.
        let mut dirty = Vec::new();
        for &t in tri_set {
            if self.triangle_removed[t as usize] {
                continue;
            }
            let base = 3 * t as usize;
            let tri = [self.indices[base], self.indices[base + 1], self.indices[base + 2]];
            for k in 0..3 {
                if let Some(edge) = self.insert_edge(tri[k], tri[(k + 1) % 3]) {
                    if !dirty.contains(&edge) {
                        dirty.push(edge);
                    }
                }
            }
        }
        dirty
    }

    /// Copy-in-place live vertices to the front, remap indices, truncate.
    fn compact(&mut self) -> Result<u32, SimplifyError> {
        let mut remap = vec![u32::MAX; self.vertices.len()];
        let mut write = 0u32;
        for (vi, &refs) in self.vertex_ref_count.iter().enumerate() {
            if refs > 0 {
                remap[vi] = write;
                if write as usize != vi {
                    self.vertices[write as usize] = self.vertices[vi];
                }
                write += 1;
            }
        }
        self.vertices.truncate(write as usize);

        let mut write_idx = 0usize;
        let mut live_triangles = 0u32;
        for t in 0..self.triangle_removed.len() {
            if self.triangle_removed[t] {
                continue;
            }
            let base = 3 * t;
            for slot in 0..3 {
                let mapped = remap[self.indices[base + slot] as usize];
                self.indices[write_idx] = mapped;
                write_idx += 1;
            }
            live_triangles += 1;
        }
        self.indices.truncate(write_idx);

        let expected_vertices = write;
        let actual_vertices = self.vertices.len() as u32;
        if expected_vertices != actual_vertices {
            return Err(SimplifyError::VertexCountMismatch { expected_vertices, actual_vertices });
        }
        let expected_triangles = live_triangles;
        let actual_triangles = (self.indices.len() / 3) as u32;
        if expected_triangles != actual_triangles {
            return Err(SimplifyError::TriangleCountMismatch { expected_triangles, actual_triangles });
        }
        Ok(actual_triangles)
    }

    /// Reduce the mesh to at most `target` triangles. See module docs and
    /// the component design notes for the full algorithm.
    pub fn simplify(&mut self, target: u32) -> Result<SimplifyReport, SimplifyError> {
        let span = tracing::info_span!("mesh_simplify", target);
        let _enter = span.enter();

        for t in 0..self.triangle_removed.len() {
            self.fix_triangle(t);
        }

        if self.remaining_triangles() <= target {
            let remaining = self.compact()?;
            debug!(remaining, "simplify target already satisfied after coalescing");
            return Ok(SimplifyReport { success: true, max_error: self.max_error, remaining_triangles: remaining });
        }

        self.build_edges();
        for edge in 0..self.edges.len() as u32 {
            if self.edge_alive[edge as usize] {
                let (error, _) = self.evaluate(edge, false);
                self.heap.insert(edge, error);
            }
        }

        while !self.heap.is_empty() && self.remaining_triangles() > target {
            let (edge, key) = self.heap.pop().expect("heap non-empty checked above");
            if !self.edge_alive[edge as usize] {
                continue;
            }
            if key >= self.options.excessive_error_threshold {
                warn!(key, threshold = self.options.excessive_error_threshold, "excessive collapse error, stopping early");
                break;
            }
            self.edge_alive[edge as usize] = false;
            let (a, b) = self.edges[edge as usize];
            self.edge_lookup.remove(&(a, b));

            let (error, dirty) = self.evaluate(edge, true);
            if error > self.max_error {
                self.max_error = error;
            }
            trace!(edge, error, "collapsed edge");

            for dirty_edge in dirty {
                if self.edge_alive[dirty_edge as usize] {
                    let (fresh_error, _) = self.evaluate(dirty_edge, false);
                    self.heap.insert(dirty_edge, fresh_error);
                }
            }
        }

        let remaining = self.compact()?;
        if remaining > target {
            warn!(remaining, target, "locked boundary prevented reaching simplification target");
        }
        Ok(SimplifyReport { success: true, max_error: self.max_error, remaining_triangles: remaining })
    }

    /// Consume the simplifier, returning the (possibly reduced) buffers.
    pub fn into_parts(self) -> (Vec<Vertex>, Vec<u32>) {
        (self.vertices, self.indices)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::{Vector2, Vector3, Vector4};

    fn v(x: f32, y: f32, z: f32) -> Vertex {
        Vertex::new(Point3::new(x, y, z), Vector3::new(0.0, 0.0, 1.0), Vector4::new(1.0, 0.0, 0.0, 1.0), Vector2::new(0.0, 0.0))
    }

    /// Two triangles sharing an edge, forming a quad across z=0.
    fn quad() -> (Vec<Vertex>, Vec<u32>) {
        let vertices = vec![v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(1.0, 1.0, 0.0), v(0.0, 1.0, 0.0)];
        let indices = vec![0, 1, 2, 0, 2, 3];
        (vertices, indices)
    }

    /// Tetrahedron: 4 vertices, 4 triangles, all distinct planes.
    fn tetrahedron() -> (Vec<Vertex>, Vec<u32>) {
        let vertices = vec![v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0), v(0.0, 0.0, 1.0)];
        let indices = vec![0, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 3];
        (vertices, indices)
    }

    #[test]
    fn target_already_met_leaves_triangles_untouched() {
        let (vertices, indices) = quad();
        let mut simplifier = MeshSimplifier::new(vertices, indices, SimplifierOptions::default());
        let report = simplifier.simplify(2).unwrap();
        assert!(report.success);
        assert_eq!(report.remaining_triangles, 2);
    }

    #[test]
    fn tetrahedron_collapses_to_two_triangles() {
        let (vertices, indices) = tetrahedron();
        let mut simplifier = MeshSimplifier::new(vertices, indices, SimplifierOptions::default());
        let report = simplifier.simplify(2).unwrap();
        assert!(report.success);
        assert_eq!(report.remaining_triangles, 2);
        assert!(report.max_error > 0.0);
        let (out_vertices, out_indices) = simplifier.into_parts();
        for &i in &out_indices {
            assert!((i as usize) < out_vertices.len());
        }
        for tri in out_indices.chunks(3) {
            assert_ne!(tri[0], tri[1]);
            assert_ne!(tri[1], tri[2]);
            assert_ne!(tri[0], tri[2]);
        }
    }

    #[test]
    fn locking_all_corners_forces_the_locked_both_penalty() {
        let (vertices, indices) = quad();
        let mut simplifier = MeshSimplifier::new(vertices.clone(), indices, SimplifierOptions::default());
        for vtx in &vertices {
            simplifier.lock_position(&vtx.position);
        }
        let report = simplifier.simplify(1).unwrap();
        assert!(report.success);
        assert_eq!(report.remaining_triangles, 2);
    }

    #[test]
    fn idempotent_on_an_already_simplified_mesh() {
        let (vertices, indices) = tetrahedron();
        let mut simplifier = MeshSimplifier::new(vertices, indices, SimplifierOptions::default());
        let first = simplifier.simplify(2).unwrap();
        let (v1, i1) = simplifier.into_parts();

        let mut second_pass = MeshSimplifier::new(v1.clone(), i1.clone(), SimplifierOptions::default());
        let second = second_pass.simplify(2).unwrap();
        let (v2, i2) = second_pass.into_parts();

        assert_eq!(first.remaining_triangles, second.remaining_triangles);
        assert_eq!(v1, v2);
        assert_eq!(i1, i2);
    }

    #[test]
    fn no_locked_vertices_and_target_at_input_count_preserves_topology() {
        let (vertices, indices) = quad();
        let triangle_count = (indices.len() / 3) as u32;
        let mut simplifier = MeshSimplifier::new(vertices.clone(), indices.clone(), SimplifierOptions::default());
        let report = simplifier.simplify(triangle_count).unwrap();
        let (out_vertices, out_indices) = simplifier.into_parts();
        assert_eq!(report.remaining_triangles, triangle_count);
        assert_eq!(out_vertices.len(), vertices.len());
        assert_eq!(out_indices, indices);
    }
}
