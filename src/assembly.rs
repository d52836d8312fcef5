//! Partitioned global matrices and vectors produced by domain assembly.
//!
//! Rows and columns are split into the free partition (equations) and the
//! fixed partition (prescribed DOFs), giving the `uu`, `up`, `pu` and `pp`
//! blocks of the global system.

use nalgebra::DMatrix;
use nalgebra_sparse::CooMatrix;

use crate::containers::{coo_mul, Vector};
use crate::node::Dof;

/// Destination of an element or nodal DOF in the partitioned system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Row/column of the free partition.
    Free(usize),
    /// Row/column of the fixed partition.
    Fixed(usize),
}

impl Slot {
    /// Destination of `dof`, `None` when the DOF has not been numbered.
    pub(crate) fn of(dof: Dof) -> Option<Self> {
        match dof {
            Dof::Equation(eq) | Dof::Tied(eq) => Some(Self::Free(eq)),
            Dof::Fixed(slot) => Some(Self::Fixed(slot)),
            Dof::Unassigned => None,
        }
    }
}

/// Global vector split into free and fixed partitions.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionedVector {
    /// Entries of the free DOFs, indexed by equation.
    pub free: Vector,
    /// Entries of the prescribed DOFs, indexed by fixed slot.
    pub fixed: Vector,
}

impl PartitionedVector {
    /// Zero vector with the given partition sizes.
    #[must_use]
    pub fn zeros(free: usize, fixed: usize) -> Self {
        Self {
            free: Vector::zeros(free),
            fixed: Vector::zeros(fixed),
        }
    }

    pub(crate) fn add(&mut self, slot: Slot, value: f64) {
        match slot {
            Slot::Free(eq) => self.free[eq] += value,
            Slot::Fixed(slot) => self.fixed[slot] += value,
        }
    }
}

/// Global matrix split into the four partition blocks.
#[derive(Clone, Debug)]
pub struct PartitionedMatrix {
    /// Free rows, free columns.
    pub uu: CooMatrix<f64>,
    /// Free rows, fixed columns.
    pub up: CooMatrix<f64>,
    /// Fixed rows, free columns.
    pub pu: CooMatrix<f64>,
    /// Fixed rows, fixed columns.
    pub pp: CooMatrix<f64>,
}

impl PartitionedMatrix {
    /// Empty blocks for `free` equations and `fixed` prescribed DOFs.
    #[must_use]
    pub fn new(free: usize, fixed: usize) -> Self {
        Self {
            uu: CooMatrix::new(free, free),
            up: CooMatrix::new(free, fixed),
            pu: CooMatrix::new(fixed, free),
            pp: CooMatrix::new(fixed, fixed),
        }
    }

    pub(crate) fn push(&mut self, row: Slot, col: Slot, value: f64) {
        match (row, col) {
            (Slot::Free(i), Slot::Free(j)) => self.uu.push(i, j, value),
            (Slot::Free(i), Slot::Fixed(j)) => self.up.push(i, j, value),
            (Slot::Fixed(i), Slot::Free(j)) => self.pu.push(i, j, value),
            (Slot::Fixed(i), Slot::Fixed(j)) => self.pp.push(i, j, value),
        }
    }

    /// Dense copy of the free block.
    #[must_use]
    pub fn free_dense(&self) -> DMatrix<f64> {
        DMatrix::from(&self.uu)
    }

    /// Forces at the free DOFs produced by `displacement`: `K_uu u_u + K_up u_p`.
    #[must_use]
    pub fn free_forces(&self, displacement: &PartitionedVector) -> Vector {
        coo_mul(&self.uu, &displacement.free) + coo_mul(&self.up, &displacement.fixed)
    }

    /// Reactions at the prescribed DOFs produced by `displacement`: `K_pp u_p + K_pu u_u`.
    #[must_use]
    pub fn fixed_reactions(&self, displacement: &PartitionedVector) -> Vector {
        coo_mul(&self.pp, &displacement.fixed) + coo_mul(&self.pu, &displacement.free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_blocks_route_by_slot() {
        let mut matrix = PartitionedMatrix::new(2, 1);
        matrix.push(Slot::Free(0), Slot::Free(1), 1.0);
        matrix.push(Slot::Free(1), Slot::Fixed(0), 2.0);
        matrix.push(Slot::Fixed(0), Slot::Free(0), 3.0);
        matrix.push(Slot::Fixed(0), Slot::Fixed(0), 4.0);

        let displacement = PartitionedVector {
            free: Vector::from_vec(vec![1.0, 1.0]),
            fixed: Vector::from_element(1, 0.5),
        };
        assert_eq!(
            matrix.free_forces(&displacement),
            Vector::from_vec(vec![1.0, 1.0])
        );
        assert_eq!(
            matrix.fixed_reactions(&displacement),
            Vector::from_element(1, 5.0)
        );
        assert_eq!(matrix.free_dense()[(0, 1)], 1.0);
    }

    #[test]
    fn unassigned_dofs_have_no_slot() {
        assert_eq!(Slot::of(Dof::Unassigned), None);
        assert_eq!(Slot::of(Dof::Tied(3)), Some(Slot::Free(3)));
        assert_eq!(Slot::of(Dof::Fixed(1)), Some(Slot::Fixed(1)));
    }
}
