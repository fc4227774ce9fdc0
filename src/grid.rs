//! Periodic uniform-grid spatial index ("cell list").
//!
//! The grid partitions a [`PeriodicBox`] into cells at least as wide as a
//! configured minimum width, and buckets a point set into those cells in one
//! pass. Neighbor queries then only need to look at a cell and its
//! geometrically adjacent cells instead of scanning all points.

use ndarray::Array3;

use crate::{Error, PeriodicBox, Vector3D};

/// Maximal number of cells, we need to use this to prevent having too many
/// cells with a small cell width and a large box
const MAX_NUMBER_OF_CELLS: f64 = 1e5;

/// A cell list over a periodic box.
///
/// Rebuilding is not incremental: every call to [`CellGrid::build`] discards
/// all previous buckets. Point sets change wholesale from one simulation
/// frame to the next, so there is nothing to gain from incremental updates.
#[derive(Debug, Clone)]
pub struct CellGrid {
    /// minimal cell width for the next build
    cell_width: f64,
    /// box used by the last build
    box_: Option<PeriodicBox>,
    /// the cells themselves, each one storing the indices of the points
    /// bucketed in it
    cells: Array3<Vec<u32>>,
    /// for each cell (in linear order), the deduplicated list of adjacent
    /// cells under periodic wraparound, including the cell itself
    adjacency: Vec<Vec<[usize; 3]>>,
}

impl CellGrid {
    /// Create a new empty `CellGrid` with the given minimal cell width.
    /// No queries are valid until the first call to [`CellGrid::build`].
    pub fn new(cell_width: f64) -> CellGrid {
        CellGrid {
            cell_width: cell_width,
            box_: None,
            cells: Array3::from_elem((0, 0, 0), Vec::new()),
            adjacency: Vec::new(),
        }
    }

    /// Set the minimal cell width used by the next [`CellGrid::build`]. The
    /// current buckets are left untouched.
    pub fn set_cell_width(&mut self, cell_width: f64) {
        self.cell_width = cell_width;
    }

    /// Get the minimal cell width
    pub fn cell_width(&self) -> f64 {
        self.cell_width
    }

    /// Get the number of cells along each axis
    pub fn shape(&self) -> [usize; 3] {
        let shape = self.cells.shape();
        [shape[0], shape[1], shape[2]]
    }

    /// Get the total number of cells
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Check whether a plain O(n²) scan is likely to beat this grid for
    /// `num_points` points. With fewer points than cells, most cells are
    /// empty and the bucketing overhead dominates.
    pub fn prefer_brute_force(&self, num_points: usize) -> bool {
        num_points < self.num_cells()
    }

    /// Partition `points` into cells, discarding all previous buckets.
    ///
    /// The number of cells along each axis is the largest count keeping every
    /// cell at least `cell_width` wide; a box narrower than twice the cell
    /// width along an axis degrades to a single cell along that axis, making
    /// all points mutually adjacent there.
    #[time_graph::instrument(name = "CellGrid::build")]
    pub fn build(&mut self, box_: &PeriodicBox, points: &[Vector3D]) -> Result<(), Error> {
        if !self.cell_width.is_finite() || self.cell_width <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "cell width must be positive and finite, got {}", self.cell_width
            )));
        }

        if points.len() >= u32::MAX as usize {
            return Err(Error::InvalidParameter(format!(
                "too many points for the cell grid: {}", points.len()
            )));
        }

        let shape = grid_shape(box_, self.cell_width);
        self.cells = Array3::from_elem(shape, Vec::new());
        self.box_ = Some(*box_);

        for (index, &position) in points.iter().enumerate() {
            let cell = cell_for(box_, shape, position);
            self.cells[cell].push(index as u32);
        }

        self.adjacency = build_adjacency(shape, box_.is_2d());

        return Ok(());
    }

    /// Get the cell containing `position`, honoring periodic wraparound and
    /// box tilt.
    ///
    /// # Panics
    ///
    /// If the grid has not been built yet.
    pub fn cell_of(&self, position: Vector3D) -> [usize; 3] {
        let box_ = self.box_.expect("grid has not been built yet");
        cell_for(&box_, self.shape(), position)
    }

    /// Get the list of cells adjacent to `cell`, including `cell` itself.
    /// Cells reachable through more than one periodic wrap appear only once.
    pub fn neighbors_of(&self, cell: [usize; 3]) -> &[[usize; 3]] {
        &self.adjacency[self.linear(cell)]
    }

    /// Iterate over the indices of the points bucketed in `cell`. The
    /// iterator is lazy and can be re-created at will.
    pub fn points_in(&self, cell: [usize; 3]) -> impl Iterator<Item = usize> + '_ {
        self.cells[cell].iter().map(|&index| index as usize)
    }

    /// Iterate over the indices of all points bucketed in the cell containing
    /// `position` or in any adjacent cell. This is the candidate set for
    /// cutoff-limited neighbor searches around `position`; some candidates
    /// may be further away than the cell width.
    pub fn candidates(&self, position: Vector3D) -> impl Iterator<Item = usize> + '_ {
        self.neighbors_of(self.cell_of(position))
            .iter()
            .flat_map(move |&cell| self.points_in(cell))
    }

    fn linear(&self, cell: [usize; 3]) -> usize {
        let [_, ny, nz] = self.shape();
        (cell[0] * ny + cell[1]) * nz + cell[2]
    }
}

/// Compute the number of cells along each axis for the given box and minimal
/// cell width, capping the total number of cells.
fn grid_shape(box_: &PeriodicBox, cell_width: f64) -> [usize; 3] {
    let plane = box_.nearest_plane_distances();

    let mut n_cells = [
        f64::clamp(f64::trunc(plane.x / cell_width), 1.0, f64::INFINITY),
        f64::clamp(f64::trunc(plane.y / cell_width), 1.0, f64::INFINITY),
        if box_.is_2d() {
            1.0
        } else {
            f64::clamp(f64::trunc(plane.z / cell_width), 1.0, f64::INFINITY)
        },
    ];

    // limit memory consumption by ensuring we have less than
    // `MAX_NUMBER_OF_CELLS` cells, while keeping roughly the ratio of cells
    // in each direction
    let n_cells_total = n_cells[0] * n_cells[1] * n_cells[2];
    if n_cells_total > MAX_NUMBER_OF_CELLS {
        if box_.is_2d() {
            let ratio_x_y = n_cells[0] / n_cells[1];
            n_cells[1] = f64::trunc(f64::sqrt(MAX_NUMBER_OF_CELLS / ratio_x_y));
            n_cells[0] = f64::trunc(ratio_x_y * n_cells[1]);
        } else {
            let ratio_x_y = n_cells[0] / n_cells[1];
            let ratio_y_z = n_cells[1] / n_cells[2];

            n_cells[2] = f64::trunc(f64::cbrt(MAX_NUMBER_OF_CELLS / (ratio_x_y * ratio_y_z * ratio_y_z)));
            n_cells[1] = f64::trunc(ratio_y_z * n_cells[2]);
            n_cells[0] = f64::trunc(ratio_x_y * n_cells[1]);
        }

        for n in &mut n_cells {
            if *n < 1.0 {
                *n = 1.0;
            }
        }
    }

    [n_cells[0] as usize, n_cells[1] as usize, n_cells[2] as usize]
}

/// Find the cell containing `position` for a grid of the given shape over
/// `box_`, wrapping the position inside the box first.
fn cell_for(box_: &PeriodicBox, shape: [usize; 3], position: Vector3D) -> [usize; 3] {
    let mut fractional = box_.fractional(position);
    fractional.x -= f64::floor(fractional.x);
    fractional.y -= f64::floor(fractional.y);
    if box_.is_2d() {
        fractional.z = 0.0;
    } else {
        fractional.z -= f64::floor(fractional.z);
    }

    // the clamp deals with fractional coordinates rounding up to exactly 1.0
    [
        usize::min(f64::floor(fractional.x * shape[0] as f64) as usize, shape[0] - 1),
        usize::min(f64::floor(fractional.y * shape[1] as f64) as usize, shape[1] - 1),
        usize::min(f64::floor(fractional.z * shape[2] as f64) as usize, shape[2] - 1),
    ]
}

/// Precompute the adjacent cells of every cell in a grid of the given shape:
/// all cells at offsets in `{-1, 0, 1}` along each axis (z fixed to 0 in 2D),
/// wrapped periodically and deduplicated.
fn build_adjacency(shape: [usize; 3], is_2d: bool) -> Vec<Vec<[usize; 3]>> {
    let z_offsets: &[i64] = if is_2d { &[0] } else { &[-1, 0, 1] };

    let mut adjacency = Vec::with_capacity(shape[0] * shape[1] * shape[2]);
    for x in 0..shape[0] {
        for y in 0..shape[1] {
            for z in 0..shape[2] {
                let mut neighbors = Vec::new();
                for dx in [-1, 0, 1] {
                    for dy in [-1, 0, 1] {
                        for &dz in z_offsets {
                            neighbors.push([
                                (x as i64 + dx).rem_euclid(shape[0] as i64) as usize,
                                (y as i64 + dy).rem_euclid(shape[1] as i64) as usize,
                                (z as i64 + dz).rem_euclid(shape[2] as i64) as usize,
                            ]);
                        }
                    }
                }
                neighbors.sort_unstable();
                neighbors.dedup();
                adjacency.push(neighbors);
            }
        }
    }

    return adjacency;
}
