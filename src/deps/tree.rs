//! Lazy enumeration of candidate installation trees.
//!
//! When several versions of a package are available, every combination of
//! per-name choices is a candidate tree. The generator walks the cartesian
//! product of the per-name alternative lists one tree at a time, using
//! precomputed divisors so the n-th permutation is reconstructed in
//! O(number of names) without materializing the whole product.

use std::collections::HashSet;

use crate::installer::item::PackageItem;
use crate::types::package::PackageKind;

/// Lazy generator over tree permutations of a master item list.
///
/// Each yielded tree is a copy of the master list in which, for every
/// package name with alternative `Available` candidates, exactly one
/// candidate is kept and the others are marked `Invalid`. The yielded
/// permutations are not guaranteed to be valid plans; verification happens
/// afterwards.
///
/// The master list must not be reordered while the generator exists: the
/// generator carries indices into it.
#[derive(Debug)]
pub struct TreeGenerator {
    master: Vec<PackageItem>,
    alternatives: Vec<Vec<usize>>,
    divisor: Vec<u64>,
    n: u64,
    end: u64,
}

impl TreeGenerator {
    /// What: Precompute the alternative lists and divisors for a master
    /// list.
    ///
    /// Inputs:
    /// - `master`: The trimmed universe of package items.
    ///
    /// Output:
    /// - Returns the generator positioned before the first permutation.
    #[must_use]
    pub fn new(master: Vec<PackageItem>) -> Self {
        let mut visited: HashSet<String> = HashSet::new();
        let mut alternatives: Vec<Vec<usize>> = Vec::new();

        for (index, item) in master.iter().enumerate() {
            if !visited.insert(item.name().to_string()) {
                continue;
            }
            let mut options: Vec<usize> = Vec::new();
            if item.kind() == PackageKind::Available {
                options.push(index);
            }
            for (candidate_index, candidate) in master.iter().enumerate() {
                if candidate_index == index {
                    continue;
                }
                if candidate.kind() == PackageKind::Available && candidate.name() == item.name() {
                    options.push(candidate_index);
                }
            }
            if !options.is_empty() {
                alternatives.push(options);
            }
        }

        // walking the divisors backwards yields the cartesian product in
        // first-listed-first order
        let mut divisor = vec![0_u64; alternatives.len()];
        let mut factor = 1_u64;
        for i in (0..alternatives.len()).rev() {
            divisor[i] = factor;
            factor = factor.saturating_mul(alternatives[i].len() as u64);
        }

        Self {
            master,
            alternatives,
            divisor,
            n: 0,
            end: factor,
        }
    }

    /// What: Compute the next permutation.
    ///
    /// Inputs:
    /// - `self`: The generator.
    ///
    /// Output:
    /// - Returns one tree where exactly one candidate per name survives,
    ///   or `None` when the product is exhausted.
    pub fn next_tree(&mut self) -> Option<Vec<PackageItem>> {
        if self.n >= self.end {
            return None;
        }
        let mut tree = self.master.clone();
        for (set, options) in self.alternatives.iter().enumerate() {
            let selected = ((self.n / self.divisor[set]) % options.len() as u64) as usize;
            for (option, &index) in options.iter().enumerate() {
                if option != selected {
                    tree[index].set_kind(PackageKind::Invalid);
                }
            }
        }
        self.n += 1;
        Some(tree)
    }

    /// What: Return the number of the last yielded tree (1-based).
    ///
    /// Inputs:
    /// - `self`: The generator.
    ///
    /// Output:
    /// - Returns 0 before the first `next_tree` call.
    #[must_use]
    pub const fn tree_number(&self) -> u64 {
        self.n
    }

    /// What: Return the total number of permutations.
    #[must_use]
    pub const fn permutation_count(&self) -> u64 {
        self.end
    }
}
