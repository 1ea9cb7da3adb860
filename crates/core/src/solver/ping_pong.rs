//! Double-buffered surfaces
//!
//! A [`PingPong`] owns two surfaces of identical shape and an index naming the
//! current source. A stage borrows the pair through [`PingPong::stage`], which hands
//! out a read-only [`Source`] and a write-only [`Destination`] over the two distinct
//! surfaces, then the caller calls [`PingPong::swap`] once the stage has produced a
//! new version. Swapping flips the index and never moves data.

use std::ops::Deref;

/// Read-only view of the current source surface within a stage
#[derive(Debug)]
pub struct Source<'a, S>(&'a S);

impl<S> Deref for Source<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.0
    }
}

/// Write target of a stage
///
/// Deliberately not `Deref`: the destination is handed to kernels as an output and
/// is not read through this handle.
#[derive(Debug)]
pub struct Destination<'a, S>(&'a mut S);

impl<S> Destination<'_, S> {
    /// Surface to write into
    pub fn target(&mut self) -> &mut S {
        self.0
    }
}

/// Pair of surfaces used alternately as read source and write destination
#[derive(Debug)]
pub struct PingPong<S> {
    surfaces: [S; 2],
    read: usize,
}

impl<S> PingPong<S> {
    /// Wrap two already allocated surfaces. `first` starts as the source.
    pub fn from_pair(first: S, second: S) -> Self {
        Self {
            surfaces: [first, second],
            read: 0,
        }
    }

    /// Allocate both surfaces with `create`
    ///
    /// # Errors
    ///
    /// Propagates the first allocation failure.
    pub fn try_new<E>(mut create: impl FnMut() -> Result<S, E>) -> Result<Self, E> {
        let first = create()?;
        let second = create()?;
        Ok(Self::from_pair(first, second))
    }

    /// Last written surface
    #[must_use]
    pub fn source(&self) -> &S {
        &self.surfaces[self.read]
    }

    /// Mutable access to the source, for in-place blends and clears
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.surfaces[self.read]
    }

    /// Surface the next stage will write
    #[must_use]
    pub fn destination(&self) -> &S {
        &self.surfaces[1 - self.read]
    }

    /// Borrow source (read) and destination (write) together for one stage
    pub fn stage(&mut self) -> (Source<'_, S>, Destination<'_, S>) {
        let (head, tail) = self.surfaces.split_at_mut(1);
        let (a, b) = (&mut head[0], &mut tail[0]);
        if self.read == 0 {
            (Source(a), Destination(b))
        } else {
            (Source(b), Destination(a))
        }
    }

    /// Exchange source and destination roles
    pub fn swap(&mut self) {
        self.read = 1 - self.read;
    }

    /// Apply `f` to both surfaces, used for resets
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut S)) {
        for surface in &mut self.surfaces {
            f(surface);
        }
    }
}
