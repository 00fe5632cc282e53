use serde::{Deserialize, Serialize};

use crate::particle::{Particle, Position};

/// Row/column address of a grid cell. Rows run along y, columns along x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIndex {
    pub row: usize,
    pub col: usize,
}

impl CellIndex {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Bucket statistics reported by [`SpatialGrid::occupancy`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridOccupancy {
    pub occupied_cells: usize,
    pub max_bucket: usize,
    pub mean_bucket: f64,
}

/// Uniform grid over `[0, width] x [0, height]` whose cells hold particle indices.
///
/// The cell size is the interaction cutoff radius, so every particle within
/// cutoff distance of a point lies in the 3x3 block of cells around that
/// point's cell. Buckets never own particles; they store indices into the
/// simulation's particle arena and each index lives in exactly one bucket.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cells: Vec<Vec<usize>>,
    cols: usize,
    rows: usize,
    cell_size: f64,
}

impl SpatialGrid {
    /// `cols * rows` is not bounded here; `SimulationSettings::validate`
    /// caps it at `MAX_GRID_CELLS` before a simulation builds its grid.
    pub fn new(width: f64, height: f64, cell_size: f64) -> Self {
        let cols = ((width / cell_size).ceil() as usize).max(1);
        let rows = ((height / cell_size).ceil() as usize).max(1);
        Self {
            cells: vec![Vec::new(); cols * rows],
            cols,
            rows,
            cell_size,
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Map a position to its cell. Coordinates on (or past) the far edge land
    /// in the last cell; negative or NaN coordinates land in the first.
    pub fn cell_index_of(&self, position: &Position) -> CellIndex {
        CellIndex {
            row: Self::axis_cell(position.y, self.cell_size, self.rows),
            col: Self::axis_cell(position.x, self.cell_size, self.cols),
        }
    }

    fn axis_cell(coord: f64, cell_size: f64, count: usize) -> usize {
        let cell = (coord / cell_size).floor();
        if cell.is_nan() || cell <= 0.0 {
            0
        } else {
            (cell as usize).min(count - 1)
        }
    }

    fn slot(&self, cell: CellIndex) -> Option<usize> {
        (cell.row < self.rows && cell.col < self.cols).then(|| cell.row * self.cols + cell.col)
    }

    /// Indices stored in `cell`; empty for cells outside the grid.
    pub fn bucket(&self, cell: CellIndex) -> &[usize] {
        match self.slot(cell) {
            Some(slot) => &self.cells[slot],
            None => &[],
        }
    }

    /// Append `index` to the bucket of `cell`. Returns `false` if the cell is
    /// outside the grid.
    pub fn insert(&mut self, cell: CellIndex, index: usize) -> bool {
        match self.slot(cell) {
            Some(slot) => {
                self.cells[slot].push(index);
                true
            }
            None => false,
        }
    }

    /// Remove `index` from the bucket of `cell`. Bucket order carries no
    /// meaning, so the hole is filled with swap-remove. Returns `false` when
    /// the bucket does not hold the index.
    pub fn remove(&mut self, cell: CellIndex, index: usize) -> bool {
        let Some(slot) = self.slot(cell) else {
            return false;
        };
        let bucket = &mut self.cells[slot];
        match bucket.iter().position(|&i| i == index) {
            Some(pos) => {
                bucket.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drop every reference to `index`, wherever it is. Returns how many were removed.
    pub fn purge(&mut self, index: usize) -> usize {
        let mut removed = 0;
        for bucket in &mut self.cells {
            let before = bucket.len();
            bucket.retain(|&i| i != index);
            removed += before - bucket.len();
        }
        removed
    }

    /// Move `index` from `from` to `to`. If `from` does not hold it, every
    /// stale reference is dropped before the insert and the number dropped is
    /// returned; `None` means the move was clean.
    pub fn relocate(&mut self, index: usize, from: CellIndex, to: CellIndex) -> Option<usize> {
        let stale = if self.remove(from, index) {
            None
        } else {
            Some(self.purge(index))
        };
        self.insert(to, index);
        stale
    }

    /// Linear search for the cell holding `index`.
    pub fn locate(&self, index: usize) -> Option<CellIndex> {
        self.cells
            .iter()
            .position(|bucket| bucket.contains(&index))
            .map(|slot| CellIndex::new(slot / self.cols, slot % self.cols))
    }

    /// The 3x3 block of cells centred on `cell`, clipped at the grid edges.
    pub fn neighbor_cells(&self, cell: CellIndex) -> impl Iterator<Item = CellIndex> {
        let rows = cell.row.saturating_sub(1)..=(cell.row + 1).min(self.rows - 1);
        let col_lo = cell.col.saturating_sub(1);
        let col_hi = (cell.col + 1).min(self.cols - 1);
        rows.flat_map(move |row| (col_lo..=col_hi).map(move |col| CellIndex { row, col }))
    }

    /// Every index stored in the 3x3 neighbourhood of `cell`.
    pub fn neighbors_of(&self, cell: CellIndex) -> impl Iterator<Item = usize> + '_ {
        self.neighbor_cells(cell)
            .flat_map(move |c| self.bucket(c).iter().copied())
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    pub fn rebuild(&mut self, particles: &[Particle]) {
        self.clear();
        for (i, particle) in particles.iter().enumerate() {
            let cell = self.cell_index_of(&particle.position);
            self.insert(cell, i);
        }
    }

    /// Total number of stored references.
    pub fn len(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Vec::is_empty)
    }

    pub fn occupancy(&self) -> GridOccupancy {
        let occupied: Vec<usize> = self
            .cells
            .iter()
            .map(Vec::len)
            .filter(|&len| len > 0)
            .collect();
        let total: usize = occupied.iter().sum();
        GridOccupancy {
            occupied_cells: occupied.len(),
            max_bucket: occupied.iter().copied().max().unwrap_or(0),
            mean_bucket: if occupied.is_empty() {
                0.0
            } else {
                total as f64 / occupied.len() as f64
            },
        }
    }
}
