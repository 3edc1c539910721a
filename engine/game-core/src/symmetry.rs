//! Dihedral symmetry maps for square boards.
//!
//! An `n × n` board has eight symmetries (four rotations, each optionally
//! mirrored). Applying the same map to a board and to its per-cell policy
//! yields an equivalent position with an equivalent policy and the same
//! value, which games use to amplify recorded training data.

/// A permutation of the cells of an `n × n` board, stored as the image of
/// each source index: applying the map moves cell `i` to `image(i)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellMap {
    dst: Vec<usize>,
}

impl CellMap {
    /// The identity map on an `n × n` board.
    pub fn identity(n: usize) -> Self {
        Self {
            dst: (0..n * n).collect(),
        }
    }

    /// Number of cells covered by this map.
    #[inline]
    pub fn len(&self) -> usize {
        self.dst.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dst.is_empty()
    }

    /// Index cell `i` is moved to.
    #[inline]
    pub fn image(&self, i: usize) -> usize {
        self.dst[i]
    }

    /// Permute a flat board (or per-cell policy) of matching length.
    pub fn apply<T: Copy + Default>(&self, cells: &[T]) -> Vec<T> {
        debug_assert_eq!(cells.len(), self.dst.len());
        let mut out = vec![T::default(); cells.len()];
        for (i, &cell) in cells.iter().enumerate() {
            out[self.dst[i]] = cell;
        }
        out
    }

    /// The inverse permutation.
    pub fn inverse(&self) -> Self {
        let mut dst = vec![0; self.dst.len()];
        for (i, &d) in self.dst.iter().enumerate() {
            dst[d] = i;
        }
        Self { dst }
    }
}

/// The eight rotation/reflection maps of an `n × n` board, identity first.
///
/// The maps are ordered rotation-major (0°, 90°, 180°, 270°), each followed
/// by its mirrored variant. Boards of different sizes produced by the same
/// call index transform coherently, which nested-board games rely on.
pub fn dihedral_maps(n: usize) -> Vec<CellMap> {
    let mut maps = Vec::with_capacity(8);

    for rotations in 0..4 {
        for mirror in [false, true] {
            let mut dst = vec![0; n * n];
            for row in 0..n {
                for col in 0..n {
                    let (mut r, mut c) = (row, col);
                    for _ in 0..rotations {
                        let (nr, nc) = (c, n - 1 - r);
                        r = nr;
                        c = nc;
                    }
                    if mirror {
                        c = n - 1 - c;
                    }
                    dst[row * n + col] = r * n + c;
                }
            }
            maps.push(CellMap { dst });
        }
    }

    maps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_comes_first() {
        let maps = dihedral_maps(3);
        assert_eq!(maps.len(), 8);
        assert_eq!(maps[0], CellMap::identity(3));
    }

    #[test]
    fn every_map_is_a_permutation() {
        for map in dihedral_maps(3) {
            let mut seen = vec![false; map.len()];
            for i in 0..map.len() {
                let image = map.image(i);
                assert!(!seen[image]);
                seen[image] = true;
            }
        }
    }

    #[test]
    fn maps_are_distinct() {
        let maps = dihedral_maps(3);
        for (i, a) in maps.iter().enumerate() {
            for b in maps.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn quarter_rotation_moves_corner() {
        // Map index 2 is the plain 90° rotation (rotation-major, unmirrored).
        let rot90 = &dihedral_maps(3)[2];
        let board = [
            1, 0, 0, //
            0, 0, 0, //
            0, 0, 2,
        ];
        let rotated = rot90.apply(&board);
        // (0,0) -> (0,2), (2,2) -> (2,0)
        assert_eq!(
            rotated,
            vec![
                0, 0, 1, //
                0, 0, 0, //
                2, 0, 0,
            ]
        );
    }

    #[test]
    fn inverse_round_trips() {
        let board: Vec<i32> = (0..9).collect();
        for map in dihedral_maps(3) {
            let transformed = map.apply(&board);
            let recovered = map.inverse().apply(&transformed);
            assert_eq!(recovered, board);
        }
    }

    #[test]
    fn rotation_composes_to_identity_after_four_turns() {
        let rot90 = &dihedral_maps(3)[2];
        let board: Vec<i32> = (0..9).collect();

        let mut current = board.clone();
        for _ in 0..4 {
            current = rot90.apply(&current);
        }
        assert_eq!(current, board);
    }

    #[test]
    fn nested_sizes_transform_coherently() {
        // The 9×9 map and the 3×3 map at the same index must agree on how
        // they move 3×3 blocks of the larger board.
        let maps9 = dihedral_maps(9);
        let maps3 = dihedral_maps(3);

        for (map9, map3) in maps9.iter().zip(maps3.iter()) {
            for block_row in 0..3 {
                for block_col in 0..3 {
                    // Top-left cell of the block on the 9×9 grid.
                    let cell = (block_row * 3) * 9 + block_col * 3;
                    let moved = map9.image(cell);
                    let moved_block = (moved / 9) / 3 * 3 + (moved % 9) / 3;
                    assert_eq!(moved_block, map3.image(block_row * 3 + block_col));
                }
            }
        }
    }
}
