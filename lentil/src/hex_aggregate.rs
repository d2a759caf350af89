use crate::common::*;
use crate::dge_builder::{BiIndex, Dge};
use crate::errors::SgeError;
use crate::hex_grid::{pixel_to_hex, HexId};
use crate::hex_output::{HexCentroid, HexOutputWriter};

use indicatif::ProgressBar;
use matrix_util::traits::MatTriplets;
use matrix_util::utils::{generate_minibatch_intervals, median};

pub const DEFAULT_BATCH_SIZE: usize = 512;

#[derive(Debug, Clone)]
pub struct HexAggregateParams {
    /// hexagon radius in micrometers
    pub radius: f64,
    /// number of sliding offsets per axis
    pub n_move: usize,
    /// minimum total count of a unit
    pub min_ct_per_unit: f64,
    /// number of units per mini-batch
    pub batch_size: usize,
}

/// Too many sliding steps for a narrow hexagon are cut down to a
/// quarter of its (integer) width
pub fn effective_n_move(n_move: usize, hex_width: f64) -> usize {
    let width = hex_width.floor() as usize;
    if n_move > width {
        (width / 4).max(1)
    } else {
        n_move.max(1)
    }
}

/// Hexagons that survive the count threshold at one sliding offset
pub struct HexCells {
    /// hexagon ids in the order of their first pixel
    pub hexes: BiIndex<HexId>,
    /// pixel indexes of each hexagon
    pub members: Vec<Vec<usize>>,
    /// total count of each hexagon
    pub totals: Vec<f64>,
}

impl HexCells {
    pub fn len(&self) -> usize {
        self.hexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hexes.is_empty()
    }

    /// Mean coordinate and the largest tile of the pixels of each unit
    pub fn centroids(&self, coords: &[(f64, f64)], tiles: &[u32]) -> Vec<HexCentroid> {
        self.members
            .iter()
            .map(|pixels| {
                let n = pixels.len().max(1) as f64;
                let (sx, sy) = pixels
                    .iter()
                    .fold((0., 0.), |(sx, sy), &p| (sx + coords[p].0, sy + coords[p].1));
                let tile = pixels.iter().map(|&p| tiles[p]).max().unwrap_or(0);
                HexCentroid {
                    x: sx / n,
                    y: sy / n,
                    tile,
                }
            })
            .collect()
    }

    /// Boolean membership matrix (units `lb..ub` × all pixels)
    pub fn membership(&self, lb: usize, ub: usize, num_pixels: usize) -> CsrMat {
        let mut coo = CooMat::new(ub - lb, num_pixels);
        for (row, pixels) in self.members[lb..ub].iter().enumerate() {
            for &p in pixels {
                coo.push(row, p, 1.0);
            }
        }
        CsrMat::from(&coo)
    }
}

/// Bin pixels into hexagons and keep those with total count
/// `>= min_ct_per_unit`
///
/// * `coords` - pixel coordinates
/// * `pixel_totals` - count of each pixel
/// * `offset_x`, `offset_y` - sliding offsets in `[0, 1)`
pub fn collect_hex_cells(
    coords: &[(f64, f64)],
    pixel_totals: &[f64],
    radius: f64,
    offset_x: f64,
    offset_y: f64,
    min_ct_per_unit: f64,
) -> HexCells {
    let (hex_x, hex_y) = pixel_to_hex(coords, radius, offset_x, offset_y);
    let hex_of_pixel: Vec<HexId> = hex_x.into_iter().zip(hex_y).collect();

    let mut hex_totals: HashMap<HexId, f64> = HashMap::default();
    for (h, &t) in hex_of_pixel.iter().zip(pixel_totals) {
        *hex_totals.entry(*h).or_default() += t;
    }

    let mut hexes = BiIndex::new();
    let mut members: Vec<Vec<usize>> = vec![];
    let mut totals = vec![];

    for (pixel, h) in hex_of_pixel.iter().enumerate() {
        let tot = hex_totals.get(h).copied().unwrap_or(0.);
        if tot < min_ct_per_unit {
            continue;
        }
        let row = hexes.get_or_insert(h);
        if row == members.len() {
            members.push(vec![]);
            totals.push(tot);
        }
        members[row].push(pixel);
    }

    HexCells {
        hexes,
        members,
        totals,
    }
}

/// What happened at one sliding offset
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetReport {
    pub offset_x: usize,
    pub offset_y: usize,
    pub num_units: usize,
    pub skipped: bool,
}

/// Sliding-window aggregation of a pixel-level DGE into hexagon units.
///
/// Holds the running unit counter shared by every offset and
/// mini-batch; unit ids are 1-based and never reused within a run.
pub struct HexAggregator<'a> {
    dge: &'a Dge,
    coords: Vec<(f64, f64)>,
    params: HexAggregateParams,
    n_unit: usize,
}

impl<'a> HexAggregator<'a> {
    /// * `mu_scale` - raw coordinate units per micrometer
    pub fn new(dge: &'a Dge, mu_scale: f64, params: HexAggregateParams) -> Self {
        let coords = dge
            .pixels
            .keys()
            .iter()
            .map(|&(x, y)| (x as f64 / mu_scale, y as f64 / mu_scale))
            .collect();

        Self {
            dge,
            coords,
            params,
            n_unit: 0,
        }
    }

    /// Number of units written so far
    pub fn n_unit(&self) -> usize {
        self.n_unit
    }

    /// Visit every `(offset_x, offset_y)` in `{0..n_move}²`
    pub fn run(&mut self, out: &mut HexOutputWriter) -> anyhow::Result<Vec<OffsetReport>> {
        let n_move = self.params.n_move.max(1);
        let mut reports = Vec::with_capacity(n_move * n_move);
        for offset_x in 0..n_move {
            for offset_y in 0..n_move {
                reports.push(self.aggregate_offset(offset_x, offset_y, out)?);
            }
        }
        Ok(reports)
    }

    /// Aggregate the DGE at one sliding offset and stream out the units
    pub fn aggregate_offset(
        &mut self,
        offset_x: usize,
        offset_y: usize,
        out: &mut HexOutputWriter,
    ) -> anyhow::Result<OffsetReport> {
        let n_move = self.params.n_move.max(1) as f64;
        let batch_size = self.params.batch_size.max(1);

        let cells = collect_hex_cells(
            &self.coords,
            &self.dge.pixel_totals,
            self.params.radius,
            offset_x as f64 / n_move,
            offset_y as f64 / n_move,
            self.params.min_ct_per_unit,
        );

        let n_hex = cells.len();
        let skipped = OffsetReport {
            offset_x,
            offset_y,
            num_units: 0,
            skipped: true,
        };

        if cells.is_empty() {
            info!(
                "{}",
                SgeError::EmptyResult {
                    offset_x,
                    offset_y
                }
            );
            return Ok(skipped);
        }

        info!(
            "{} units at offset ({}, {}), median count per unit {}",
            n_hex,
            offset_x,
            offset_y,
            median(&cells.totals).unwrap_or(0.)
        );

        // performance shortcut only: an offset with very few units is
        // not worth the sparse products (threshold scales with batch size)
        if n_hex < batch_size / 4 {
            info!(
                "Skip offset ({}, {}): {} units < {}",
                offset_x,
                offset_y,
                n_hex,
                batch_size / 4
            );
            return Ok(skipped);
        }

        let centroids = cells.centroids(&self.coords, &self.dge.pixel_tiles);
        out.write_units(self.n_unit, &centroids)?;

        let minibatches = generate_minibatch_intervals(n_hex, batch_size);
        let nbatch = minibatches.len();
        let pb = ProgressBar::new(nbatch as u64);

        for (b, &(lb, ub)) in minibatches.iter().enumerate() {
            let membership = cells.membership(lb, ub, self.dge.num_pixels());
            let unit_by_gene = &membership * &self.dge.counts;

            let (_, _, triplets) = unit_by_gene.to_nonzero_triplets()?;
            let triplets: Vec<(u64, u64, f32)> = triplets
                .into_iter()
                .map(|(unit, gene, x)| (gene as u64, (self.n_unit + unit) as u64, x))
                .collect();
            out.write_triplets(&triplets)?;

            self.n_unit += ub - lb;
            pb.inc(1);
            info!("{}/{}. Wrote {} units so far.", b + 1, nbatch, self.n_unit);
        }
        pb.finish_and_clear();

        debug_assert_eq!(self.n_unit, out.num_units());

        info!(
            "Sliding offset {}, {}. Fit data with {} units.",
            offset_x, offset_y, self.n_unit
        );

        Ok(OffsetReport {
            offset_x,
            offset_y,
            num_units: n_hex,
            skipped: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n_move_is_capped_by_width() {
        assert_eq!(effective_n_move(2, 24.), 2);
        assert_eq!(effective_n_move(30, 24.), 6);
        assert_eq!(effective_n_move(5, 3.), 1);
        assert_eq!(effective_n_move(0, 24.), 1);
    }

    #[test]
    fn sparse_hexagons_are_dropped() {
        // two far-apart clusters; the second one only has one count
        let coords = vec![(0., 0.), (0.5, 0.2), (100., 100.)];
        let totals = vec![3., 2., 1.];
        let cells = collect_hex_cells(&coords, &totals, 5., 0., 0., 2.);

        assert_eq!(cells.len(), 1);
        assert_eq!(cells.members, vec![vec![0, 1]]);
        assert_eq!(cells.totals, vec![5.]);
    }

    #[test]
    fn membership_rows_follow_the_batch() {
        let coords = vec![(0., 0.), (100., 0.), (0.1, 0.1), (200., 0.)];
        let totals = vec![1.; 4];
        let cells = collect_hex_cells(&coords, &totals, 5., 0., 0., 1.);
        assert_eq!(cells.len(), 3);

        let m = cells.membership(1, 3, coords.len());
        assert_eq!((m.nrows(), m.ncols()), (2, 4));
        let (_, _, triplets) = m.to_nonzero_triplets().unwrap();
        assert_eq!(triplets, vec![(0, 1, 1.0), (1, 3, 1.0)]);
    }

    #[test]
    fn centroid_is_the_mean_with_max_tile() {
        let coords = vec![(0., 0.), (1., 2.)];
        let totals = vec![1., 1.];
        let cells = collect_hex_cells(&coords, &totals, 10., 0., 0., 1.);
        let centroids = cells.centroids(&coords, &[3, 7]);
        assert_eq!(
            centroids,
            vec![HexCentroid {
                x: 0.5,
                y: 1.0,
                tile: 7
            }]
        );
    }
}
