use crate::common::*;
use crate::sge_input::PixelRecord;
use matrix_util::traits::MatTriplets;
use std::hash::Hash;

/// Bijective mapping between keys and dense 0-based indexes, assigned
/// in the order keys are first seen
#[derive(Debug, Clone)]
pub struct BiIndex<K> {
    index: HashMap<K, usize>,
    keys: Vec<K>,
}

impl<K> Default for BiIndex<K> {
    fn default() -> Self {
        Self {
            index: HashMap::default(),
            keys: vec![],
        }
    }
}

impl<K> BiIndex<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `key`, inserting it at the end if new
    pub fn get_or_insert(&mut self, key: &K) -> usize {
        if let Some(&idx) = self.index.get(key) {
            return idx;
        }
        let idx = self.keys.len();
        self.index.insert(key.clone(), idx);
        self.keys.push(key.clone());
        idx
    }

    pub fn get(&self, key: &K) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn key(&self, idx: usize) -> Option<&K> {
        self.keys.get(idx)
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Global pixel coordinate
pub type PixelKey = (i64, i64);

/// Pixel × gene count matrix with its row and column keys
pub struct Dge {
    /// pixel × gene
    pub counts: CsrMat,
    /// feature local ids of the columns
    pub genes: BiIndex<u64>,
    /// global coordinates of the rows
    pub pixels: BiIndex<PixelKey>,
    /// tile of each pixel (first one seen)
    pub pixel_tiles: Vec<u32>,
    /// sum of retained counts per pixel
    pub pixel_totals: Vec<f64>,
    /// sum of counts per retained gene
    pub gene_totals: Vec<f64>,
}

impl Dge {
    pub fn num_pixels(&self) -> usize {
        self.pixels.len()
    }

    pub fn num_genes(&self) -> usize {
        self.genes.len()
    }

    pub fn total_count(&self) -> f64 {
        self.gene_totals.iter().sum()
    }
}

/// Build a pixel × gene sparse matrix from the raw records.
///
/// Genes with total count `<= min_feature_count` are dropped first, so
/// a pixel only becomes a row if it has a record of a retained gene.
pub fn build_dge(records: &[PixelRecord], min_feature_count: u64) -> anyhow::Result<Dge> {
    let mut gene_totals: HashMap<u64, f64> = HashMap::default();
    for rec in records {
        *gene_totals.entry(rec.gene).or_default() += rec.count as f64;
    }

    let ngenes_raw = gene_totals.len();
    gene_totals.retain(|_, tot| *tot > min_feature_count as f64);
    info!(
        "Kept {} out of {} genes with total count > {}",
        gene_totals.len(),
        ngenes_raw,
        min_feature_count
    );

    let mut genes = BiIndex::<u64>::new();
    let mut pixels = BiIndex::<PixelKey>::new();
    let mut pixel_tiles = vec![];
    let mut pixel_gene_counts: HashMap<(usize, usize), f64> = HashMap::default();

    for rec in records.iter().filter(|r| gene_totals.contains_key(&r.gene)) {
        let key = (rec.x, rec.y);
        let row = pixels.get_or_insert(&key);
        if row == pixel_tiles.len() {
            pixel_tiles.push(rec.tile.tile);
        }
        let col = genes.get_or_insert(&rec.gene);
        *pixel_gene_counts.entry((row, col)).or_default() += rec.count as f64;
    }

    let nrow = pixels.len();
    let ncol = genes.len();

    let mut pixel_totals = vec![0_f64; nrow];
    let mut triplets = Vec::with_capacity(pixel_gene_counts.len());
    for (&(row, col), &x) in pixel_gene_counts.iter() {
        pixel_totals[row] += x;
        triplets.push((row, col, x as f32));
    }
    triplets.sort_by_key(|&(row, col, _)| (row, col));

    let counts = CsrMat::from_nonzero_triplets(nrow, ncol, triplets)?;

    let gene_totals = genes
        .keys()
        .iter()
        .map(|g| gene_totals.get(g).copied().unwrap_or(0.))
        .collect();

    info!("Made DGE ({}, {})", nrow, ncol);

    Ok(Dge {
        counts,
        genes,
        pixels,
        pixel_tiles,
        pixel_totals,
        gene_totals,
    })
}
