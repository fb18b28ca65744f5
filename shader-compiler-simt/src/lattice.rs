// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! join-semilattice traits for dataflow analyses

/// a element of a join-semilattice: https://en.wikipedia.org/wiki/Semilattice
pub trait JoinSemilattice: Eq + Clone {
    /// join operator ∨
    /// least upper bound
    /// similar to the maximum operator
    fn join(self, rhs: Self) -> Self;
}

/// an ordered lattice
/// helper trait that defines all other applicable traits in terms of this one
pub trait OrderedLattice: Ord + Clone {}

impl<T: OrderedLattice> JoinSemilattice for T {
    fn join(self, rhs: Self) -> Self {
        self.max(rhs)
    }
}

/// an bounded ordered lattice
/// helper trait that defines all other applicable traits in terms of this one
pub trait BoundedOrderedLattice: Ord + Clone {
    /// least element
    fn min_value() -> Self;
}

impl<T: BoundedOrderedLattice> OrderedLattice for T {}

impl<T: BoundedOrderedLattice> BottomBoundedLattice for T {
    fn bottom() -> Self {
        T::min_value()
    }
}

/// a element of a bottom-bounded lattice: https://en.wikipedia.org/wiki/Lattice_%28order%29
pub trait BottomBoundedLattice: JoinSemilattice {
    /// least element
    fn bottom() -> Self;
}

/// join every element of `iter`, `bottom` if `iter` is empty
pub fn join_all<T: BottomBoundedLattice>(iter: impl IntoIterator<Item = T>) -> T {
    iter.into_iter().fold(T::bottom(), T::join)
}
