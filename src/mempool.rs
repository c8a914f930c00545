//! Per-thread outline storage pool.
//!
//! Grounded on the teacher's `array.rs` growable-vector conventions
//! (geometric capacity growth instead of doubling every push) and the
//! redesign note in spec.md §9 ("replace the parent-pointer pool with
//! arena+index addressing"): the pool owns two `Vec<Outline>` arenas
//! indexed by thread id rather than a linked allocator.

use crate::outline::Outline;

/// Which of a shape's two outlines (the shape's own fill path, or the
/// stroker's generated border path) a caller wants from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Shape,
    Stroke,
}

/// `cap_new = max(cap_old + 16, cap_old * 3 / 2)`.
fn grow(cap_old: usize) -> usize {
    (cap_old + 16).max(cap_old * 3 / 2)
}

/// Two parallel arenas of reusable [`Outline`] storage, one slot per
/// render thread. `request`/`release` never allocate or free the
/// backing `Vec<Point>`/`Vec<PointTag>` storage inside an `Outline`
/// between jobs — only `clear()`s it — so repeated renders on the same
/// thread index reuse their capacity.
pub struct Mempool {
    shapes: Vec<Outline>,
    strokes: Vec<Outline>,
}

impl Mempool {
    /// Reserve slots for `threads` render threads.
    pub fn new(threads: usize) -> Self {
        Self {
            shapes: (0..threads).map(|_| Outline::new()).collect(),
            strokes: (0..threads).map(|_| Outline::new()).collect(),
        }
    }

    fn arena(&mut self, kind: PoolKind) -> &mut Vec<Outline> {
        match kind {
            PoolKind::Shape => &mut self.shapes,
            PoolKind::Stroke => &mut self.strokes,
        }
    }

    /// Grow the arena (geometric policy) so slot `tid` exists, if
    /// needed, then return a mutable borrow to it. Matches spec.md
    /// §4.2's `cap_new = max(cap_old + 16, cap_old * 3 / 2)` growth
    /// for the pool itself (not just the outlines it stores).
    pub fn request(&mut self, kind: PoolKind, tid: usize) -> &mut Outline {
        let arena = self.arena(kind);
        if tid >= arena.len() {
            let new_len = grow(arena.len()).max(tid + 1);
            arena.resize_with(new_len, Outline::new);
        }
        &mut arena[tid]
    }

    /// Logically empty slot `tid`, retaining its backing capacity.
    pub fn release(&mut self, kind: PoolKind, tid: usize) {
        if let Some(o) = self.arena(kind).get_mut(tid) {
            o.clear();
        }
    }

    pub fn thread_count(&self) -> usize {
        self.shapes.len()
    }
}
