use approx::assert_relative_eq;

use locality::{NearestNeighbors, PeriodicBox, Vector3D};
use locality::{SENTINEL_DISTANCE2, SENTINEL_INDEX};

/// Deterministic pseudo-random number generator (splitmix64), to get
/// reproducible point sets without external dependencies
struct SplitMix64(u64);

impl SplitMix64 {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Uniform float in `[0, 1)`
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn random_points(rng: &mut SplitMix64, box_: &PeriodicBox, count: usize) -> Vec<Vector3D> {
    (0..count)
        .map(|_| {
            let fractional = Vector3D::new(
                rng.next_f64(),
                rng.next_f64(),
                if box_.is_2d() { 0.0 } else { rng.next_f64() },
            );
            box_.cartesian(fractional)
        })
        .collect()
}

/// O(n²) reference: the k nearest neighbors of every reference point, using
/// the same self-pair exclusion rule as the cell-grid search
fn brute_force(
    box_: &PeriodicBox,
    ref_points: &[Vector3D],
    points: &[Vector3D],
    k: usize,
) -> Vec<Vec<(usize, f64)>> {
    ref_points
        .iter()
        .enumerate()
        .map(|(i, &ref_position)| {
            let mut neighbors: Vec<(usize, f64)> = points
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, &position)| (j, box_.distance2(ref_position, position)))
                .collect();
            neighbors.sort_by(|a, b| a.1.total_cmp(&b.1));
            neighbors.truncate(k);
            neighbors
        })
        .collect()
}

fn check_against_brute_force(
    box_: &PeriodicBox,
    ref_points: &[Vector3D],
    points: &[Vector3D],
    k: usize,
    initial_radius: f64,
) {
    let mut search = NearestNeighbors::new(initial_radius, k, 1.1, false).unwrap();
    let table = search.compute(box_, ref_points, points).unwrap();

    assert_eq!(table.num_ref(), ref_points.len());
    assert_eq!(table.num_neighbors(), k);

    let reference = brute_force(box_, ref_points, points, k);
    for (i, expected) in reference.iter().enumerate() {
        let found: Vec<_> = table.neighbors(i).collect();
        assert_eq!(found.len(), expected.len(), "wrong neighbor count for point {}", i);
        for (neighbor, &(index, distance2)) in found.iter().zip(expected) {
            assert_eq!(neighbor.index, index, "wrong neighbor for point {}", i);
            assert_relative_eq!(neighbor.distance2, distance2, epsilon = 1e-12);
            assert_relative_eq!(neighbor.vector.norm2(), distance2, epsilon = 1e-12);
        }
    }
}

#[test]
fn matches_brute_force_cubic() {
    let box_ = PeriodicBox::cubic(10.0).unwrap();
    let mut rng = SplitMix64(0xDEADBEEF);
    let points = random_points(&mut rng, &box_, 50);

    // the initial radius is much too small, forcing the search to grow
    check_against_brute_force(&box_, &points, &points, 5, 0.2);
}

#[test]
fn matches_brute_force_triclinic() {
    let box_ = PeriodicBox::triclinic(8.0, 9.0, 10.0, 0.3, -0.2, 0.1).unwrap();
    let mut rng = SplitMix64(42);
    // dense enough that the k-th neighbor is always well below half the
    // smallest plane distance, where the search radius is allowed to grow
    let points = random_points(&mut rng, &box_, 60);

    check_against_brute_force(&box_, &points, &points, 4, 0.5);
}

#[test]
fn matches_brute_force_2d() {
    let box_ = PeriodicBox::rectangular(12.0, 7.0).unwrap();
    let mut rng = SplitMix64(7);
    let points = random_points(&mut rng, &box_, 35);

    check_against_brute_force(&box_, &points, &points, 3, 0.4);
}

#[test]
fn matches_brute_force_distinct_arrays() {
    let box_ = PeriodicBox::cubic(10.0).unwrap();
    let mut rng = SplitMix64(1234);
    let points = random_points(&mut rng, &box_, 50);
    let ref_points = random_points(&mut rng, &box_, 10);

    check_against_brute_force(&box_, &ref_points, &points, 5, 0.3);
}

#[test]
fn translation_invariance() {
    let box_ = PeriodicBox::cubic(10.0).unwrap();
    let mut rng = SplitMix64(99);
    let points = random_points(&mut rng, &box_, 30);

    let mut search = NearestNeighbors::new(1.0, 4, 1.1, false).unwrap();
    let table = search.compute(&box_, &points, &points).unwrap();
    let indices = table.indices().to_owned();
    let distances2 = table.distances2().to_owned();

    // translating every point by full box lengths must not change anything
    let shift = Vector3D::new(10.0, -10.0, 20.0);
    let translated: Vec<Vector3D> = points.iter().map(|&p| p + shift).collect();

    let mut search = NearestNeighbors::new(1.0, 4, 1.1, false).unwrap();
    let table = search.compute(&box_, &translated, &translated).unwrap();

    assert_eq!(table.indices(), indices);
    for (&d2, &expected) in table.distances2().iter().zip(distances2.iter()) {
        assert_relative_eq!(d2, expected, epsilon = 1e-9);
    }
}

#[test]
fn table_slots_are_well_formed() {
    let box_ = PeriodicBox::cubic(10.0).unwrap();
    let mut rng = SplitMix64(2718);
    let points = random_points(&mut rng, &box_, 20);

    // strict mode with a small cutoff leaves plenty of sentinel slots
    let mut search = NearestNeighbors::new(1.5, 8, 1.1, true).unwrap();
    let table = search.compute(&box_, &points, &points).unwrap();

    assert_eq!(table.indices().len(), 20 * 8);
    for i in 0..20 {
        for slot in 0..8 {
            let index = table.indices()[[i, slot]];
            let distance2 = table.distances2()[[i, slot]];
            if index == SENTINEL_INDEX {
                assert_eq!(distance2, SENTINEL_DISTANCE2);
                assert_eq!(table.vectors()[[i, slot]], locality::SENTINEL_VECTOR);
            } else {
                assert!(index < 20 && index != i);
                assert!(distance2 >= 0.0 && distance2 < 1.5 * 1.5);
            }
        }
        // sentinels only come after all real matches
        let slots: Vec<usize> = (0..8).map(|s| table.indices()[[i, s]]).collect();
        let first_sentinel = slots.iter().position(|&index| index == SENTINEL_INDEX);
        if let Some(first) = first_sentinel {
            assert!(slots[first..].iter().all(|&index| index == SENTINEL_INDEX));
        }
    }
}
