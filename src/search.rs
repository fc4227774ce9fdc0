//! Adaptive k-nearest-neighbor search on top of the periodic cell grid.
//!
//! The search does not know the right cutoff in advance: it scans with the
//! current radius, tallies how many neighbors each reference point is still
//! missing, and grows the radius and rebuilds the grid until every reference
//! point has enough candidates (or the radius hits the largest value the box
//! allows).

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::warn;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use thread_local::ThreadLocal;

use crate::{CellGrid, Error, PeriodicBox, Vector3D};

/// Sentinel squared distance marking an unfilled neighbor slot
pub const SENTINEL_DISTANCE2: f64 = -1.0;
/// Sentinel point index marking an unfilled neighbor slot
pub const SENTINEL_INDEX: usize = usize::MAX;
/// Sentinel displacement vector marking an unfilled neighbor slot
pub const SENTINEL_VECTOR: Vector3D = Vector3D { x: -1.0, y: -1.0, z: -1.0 };

/// A single matched neighbor of a reference point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// index of the neighbor in the target point array
    pub index: usize,
    /// squared minimum image distance to the reference point
    pub distance2: f64,
    /// minimum image displacement from the reference point to the neighbor
    pub vector: Vector3D,
}

/// Neighbor candidate kept during a scan, before sorting and truncation
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance2: f64,
    index: usize,
    vector: Vector3D,
}

/// Output of [`NearestNeighbors::compute`]: exactly `num_ref × k` slots of
/// (squared distance, neighbor index, displacement vector), one row per
/// reference point.
///
/// Within a row, slots are sorted by increasing squared distance; slots
/// without a match hold the sentinel triple ([`SENTINEL_DISTANCE2`],
/// [`SENTINEL_INDEX`], [`SENTINEL_VECTOR`]).
#[derive(Debug, Clone)]
pub struct NeighborTable {
    distances2: Array2<f64>,
    indices: Array2<usize>,
    vectors: Array2<Vector3D>,
}

impl NeighborTable {
    fn new() -> NeighborTable {
        NeighborTable {
            distances2: Array2::from_elem((0, 0), SENTINEL_DISTANCE2),
            indices: Array2::from_elem((0, 0), SENTINEL_INDEX),
            vectors: Array2::from_elem((0, 0), SENTINEL_VECTOR),
        }
    }

    /// Resize to `num_ref × num_neighbors` slots and fill everything with
    /// sentinels, reusing the allocation when the shape did not change.
    fn reset(&mut self, num_ref: usize, num_neighbors: usize) {
        let shape = (num_ref, num_neighbors);
        if self.distances2.dim() == shape {
            self.distances2.fill(SENTINEL_DISTANCE2);
            self.indices.fill(SENTINEL_INDEX);
            self.vectors.fill(SENTINEL_VECTOR);
        } else {
            self.distances2 = Array2::from_elem(shape, SENTINEL_DISTANCE2);
            self.indices = Array2::from_elem(shape, SENTINEL_INDEX);
            self.vectors = Array2::from_elem(shape, SENTINEL_VECTOR);
        }
    }

    /// Get the number of reference points (rows) in this table
    pub fn num_ref(&self) -> usize {
        self.distances2.nrows()
    }

    /// Get the number of slots per reference point
    pub fn num_neighbors(&self) -> usize {
        self.distances2.ncols()
    }

    /// Get the squared distances for all slots, sentinel slots holding −1
    pub fn distances2(&self) -> ArrayView2<'_, f64> {
        self.distances2.view()
    }

    /// Get the neighbor indices for all slots, sentinel slots holding
    /// `usize::MAX`
    pub fn indices(&self) -> ArrayView2<'_, usize> {
        self.indices.view()
    }

    /// Get the displacement vectors for all slots, sentinel slots holding
    /// (−1, −1, −1)
    pub fn vectors(&self) -> ArrayView2<'_, Vector3D> {
        self.vectors.view()
    }

    /// Iterate over the matched neighbors of reference point `i`, skipping
    /// sentinel slots. Neighbors come out sorted by increasing squared
    /// distance.
    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = Neighbor> + '_ {
        let row = self.indices.row(i);
        (0..self.num_neighbors()).filter_map(move |slot| {
            let index = row[slot];
            if index == SENTINEL_INDEX {
                return None;
            }
            Some(Neighbor {
                index: index,
                distance2: self.distances2[[i, slot]],
                vector: self.vectors[[i, slot]],
            })
        })
    }
}

/// Parameters of a [`NearestNeighbors`] search, in the JSON form used to
/// construct one with [`NearestNeighbors::from_parameters`].
#[derive(Debug, Clone)]
#[derive(serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
pub struct NearestNeighborsParameters {
    /// Initial search radius. This is also the final radius in strict mode.
    pub r_max: f64,
    /// Number of neighbors to find for each reference point
    pub num_neighbors: usize,
    /// Growth factor applied to the search radius when some reference point
    /// is short of neighbors. Must be larger than 1; unused in strict mode.
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// In strict mode the radius never grows: whatever is found below `r_max`
    /// is returned, padded with sentinels.
    #[serde(default)]
    pub strict: bool,
}

fn default_scale() -> f64 {
    1.1
}

/// Adaptive nearest-neighbor search over a periodic box.
///
/// The final search radius of one [`NearestNeighbors::compute`] call is kept
/// as the starting radius of the next call: particle density changes slowly
/// along a typical trajectory, so this amortizes the radius growth over the
/// frames of one analysis.
pub struct NearestNeighbors {
    r_max: f64,
    num_neighbors: usize,
    scale: f64,
    strict: bool,
    grid: CellGrid,
    table: NeighborTable,
    /// per-worker candidate buffers, reused across reference points and
    /// across calls
    scratch: ThreadLocal<RefCell<Vec<Candidate>>>,
}

impl NearestNeighbors {
    /// Create a new `NearestNeighbors` searching for the `num_neighbors`
    /// nearest neighbors of every reference point, starting from the search
    /// radius `r_max` and growing it by `scale` as needed. With `strict` the
    /// radius never grows.
    pub fn new(r_max: f64, num_neighbors: usize, scale: f64, strict: bool) -> Result<NearestNeighbors, Error> {
        if !r_max.is_finite() || r_max <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "r_max must be positive and finite, got {}", r_max
            )));
        }

        if !strict && (!scale.is_finite() || scale <= 1.0) {
            return Err(Error::InvalidParameter(format!(
                "scale must be larger than 1, got {}", scale
            )));
        }

        return Ok(NearestNeighbors {
            r_max: r_max,
            num_neighbors: num_neighbors,
            scale: scale,
            strict: strict,
            grid: CellGrid::new(r_max),
            table: NeighborTable::new(),
            scratch: ThreadLocal::new(),
        });
    }

    /// Create a new `NearestNeighbors` from a JSON string containing
    /// [`NearestNeighborsParameters`].
    pub fn from_parameters(parameters: &str) -> Result<NearestNeighbors, Error> {
        let parameters: NearestNeighborsParameters = serde_json::from_str(parameters)?;
        NearestNeighbors::new(
            parameters.r_max,
            parameters.num_neighbors,
            parameters.scale,
            parameters.strict,
        )
    }

    /// Get the current parameters of this search as a JSON string
    pub fn parameters(&self) -> String {
        let parameters = NearestNeighborsParameters {
            r_max: self.r_max,
            num_neighbors: self.num_neighbors,
            scale: self.scale,
            strict: self.strict,
        };
        serde_json::to_string(&parameters).expect("failed to serialize to JSON")
    }

    /// Get the current search radius
    pub fn r_max(&self) -> f64 {
        self.r_max
    }

    /// Find the nearest neighbors of every point in `ref_points` among
    /// `points`, under the periodic boundary conditions of `box_`.
    ///
    /// The same slice can be passed as both `ref_points` and `points` to
    /// search a point set against itself; a point is never its own neighbor.
    ///
    /// The returned table borrows from `self` and stays valid until the next
    /// call to `compute`.
    #[time_graph::instrument(name = "NearestNeighbors::compute")]
    pub fn compute(
        &mut self,
        box_: &PeriodicBox,
        ref_points: &[Vector3D],
        points: &[Vector3D],
    ) -> Result<&NeighborTable, Error> {
        let plane = box_.nearest_plane_distances();
        let mut min_plane = f64::min(plane.x, plane.y);
        if !box_.is_2d() {
            min_plane = f64::min(min_plane, plane.z);
        }

        if self.r_max > 0.5 * min_plane {
            return Err(Error::InvalidParameter(format!(
                "r_max ({}) can not exceed half the smallest box plane distance ({})",
                self.r_max, min_plane
            )));
        }

        let k = self.num_neighbors;
        self.table.reset(ref_points.len(), k);
        if ref_points.is_empty() || points.is_empty() || k == 0 {
            return Ok(&self.table);
        }

        // set to true when the radius was clamped to the largest viable cell
        // width, forcing one last scan that terminates regardless of deficits
        let mut force_last = false;
        loop {
            self.grid.set_cell_width(self.r_max);
            self.grid.build(box_, points)?;

            let rows = self.scan(box_, ref_points, points, force_last);
            let deficits = count_deficits(&rows, k, self.strict, force_last);

            if deficits == 0 || self.strict || force_last {
                if force_last && deficits > 0 {
                    warn!(
                        "{} neighbors are still missing at the maximal search \
                         radius, the corresponding slots are left empty",
                        deficits
                    );
                }

                for (i, row) in rows.iter().enumerate() {
                    for (slot, candidate) in row.iter().enumerate() {
                        self.table.distances2[[i, slot]] = candidate.distance2;
                        self.table.indices[[i, slot]] = candidate.index;
                        self.table.vectors[[i, slot]] = candidate.vector;
                    }
                }

                return Ok(&self.table);
            }

            self.r_max *= self.scale;
            let limit = 0.5 * min_plane;
            if self.r_max > limit {
                self.r_max = 0.4999 * min_plane;
                force_last = true;
                warn!(
                    "the search radius has become too large to create a viable \
                     cell grid, clamping it to {} for one final pass",
                    self.r_max
                );
            }
        }
    }

    /// One parallel scan over all reference points with the current grid and
    /// radius. Each returned row holds the up-to-k nearest candidates of the
    /// matching reference point, sorted by squared distance.
    ///
    /// In non-strict mode a row is left empty as soon as its reference point
    /// is short of candidates, or when some earlier task already found a
    /// deficit (the radius will grow and everything will be recomputed, any
    /// further work is wasted).
    fn scan(
        &self,
        box_: &PeriodicBox,
        ref_points: &[Vector3D],
        points: &[Vector3D],
        force_last: bool,
    ) -> Vec<Vec<Candidate>> {
        let k = self.num_neighbors;
        let strict = self.strict;
        let r_max2 = self.r_max * self.r_max;
        let grid = &self.grid;
        let scratch = &self.scratch;
        let deficits = &AtomicUsize::new(0);
        let early_exit = !force_last && !strict;

        ref_points
            .par_iter()
            .enumerate()
            .map(|(i, &ref_position)| {
                if early_exit && deficits.load(Ordering::Relaxed) > 0 {
                    return Vec::new();
                }

                let mut candidates = scratch.get_or(|| RefCell::new(Vec::new())).borrow_mut();
                candidates.clear();

                for j in grid.candidates(ref_position) {
                    // never report a point as its own neighbor
                    if i == j {
                        continue;
                    }

                    let rij = box_.min_image(points[j] - ref_position);
                    let distance2 = rij.norm2();
                    if distance2 < r_max2 {
                        candidates.push(Candidate {
                            distance2: distance2,
                            index: j,
                            vector: rij,
                        });
                    }
                }

                if early_exit && candidates.len() < k {
                    deficits.fetch_add(k - candidates.len(), Ordering::Relaxed);
                    return Vec::new();
                }

                // stable sort keeps equidistant candidates in discovery order
                candidates.sort_by(|a, b| a.distance2.total_cmp(&b.distance2));
                candidates.iter().take(k).copied().collect()
            })
            .collect()
    }
}

/// Total number of neighbors still missing across all rows of a scan. This is
/// the convergence predicate of the retry loop: it only depends on the
/// per-row candidate counts, not on the order tasks ran in.
fn count_deficits(rows: &[Vec<Candidate>], k: usize, strict: bool, force_last: bool) -> usize {
    if strict && !force_last {
        // strict mode accepts whatever was found, short rows are not deficits
        return 0;
    }

    rows.iter()
        .map(|row| k.saturating_sub(row.len()))
        .sum()
}
