use crate::common::*;
use crate::errors::SgeError;
use crate::sge_input::GeneFeature;
use matrix_util::mtx_io::{MtxSummary, MtxTripletStream};
use std::fs::File;
use std::io::{BufWriter, Write};

/// Centroid of one hexagon unit
#[derive(Debug, Clone, PartialEq)]
pub struct HexCentroid {
    pub x: f64,
    pub y: f64,
    /// largest tile number among the unit's pixels
    pub tile: u32,
}

/// Paths of the output directory
#[derive(Debug, Clone)]
pub struct HexOutputFiles {
    pub features: Box<str>,
    pub barcodes: Box<str>,
    pub barcodes_gz: Box<str>,
    pub mtx_body: Box<str>,
    pub mtx_header: Box<str>,
    pub mtx_gz: Box<str>,
}

impl HexOutputFiles {
    pub fn new(output_dir: &str) -> Self {
        let dir = output_dir.trim_end_matches('/');
        let file = |name: &str| format!("{}/{}", dir, name).into_boxed_str();
        Self {
            features: file("features.tsv.gz"),
            barcodes: file("barcodes.tsv"),
            barcodes_gz: file("barcodes.tsv.gz"),
            mtx_body: file("matrix.mtx"),
            mtx_header: file("matrix.header"),
            mtx_gz: file("matrix.mtx.gz"),
        }
    }
}

/// Write `gene_id \t gene \t Gene Expression` in column order
pub fn write_features(file: &str, features: &[&GeneFeature]) -> anyhow::Result<()> {
    let lines: Vec<Box<str>> = features
        .iter()
        .map(|f| format!("{}\t{}\tGene Expression", f.gene_id, f.gene).into_boxed_str())
        .collect();
    write_lines(&lines, file)?;
    info!("Wrote {} features: {}", lines.len(), file);
    Ok(())
}

/// Append-only writer of hexagon units and their gene counts.
///
/// Units go to a plain `barcodes.tsv`, one line per unit
/// (`unit_tile_X_Y`), and count triplets go to a plain `matrix.mtx`
/// body. Both are compressed by [`HexOutputWriter::finalize`].
pub struct HexOutputWriter {
    files: HexOutputFiles,
    units: BufWriter<File>,
    mtx: MtxTripletStream,
    precision: usize,
    num_units: usize,
}

impl HexOutputWriter {
    /// Stale intermediate files would be appended to, so they are
    /// removed first.
    pub fn create(output_dir: &str, precision: usize) -> anyhow::Result<Self> {
        mkdir(output_dir)?;
        let files = HexOutputFiles::new(output_dir);

        for stale in [&files.barcodes, &files.mtx_body, &files.mtx_header] {
            if std::path::Path::new(&**stale).exists() {
                info!("Removing existing file: {}", stale);
                remove_file(stale)?;
            }
        }

        Ok(Self {
            units: open_append_writer(&files.barcodes)?,
            mtx: MtxTripletStream::create(&files.mtx_body)?,
            files,
            precision,
            num_units: 0,
        })
    }

    pub fn files(&self) -> &HexOutputFiles {
        &self.files
    }

    /// Write the centroids of units numbered `first_unit + 1, ...`
    pub fn write_units(&mut self, first_unit: usize, centroids: &[HexCentroid]) -> anyhow::Result<()> {
        let prec = self.precision;
        for (k, c) in centroids.iter().enumerate() {
            writeln!(
                self.units,
                "{}_{}_{:.prec$}_{:.prec$}",
                first_unit + k + 1,
                c.tile,
                c.x,
                c.y,
                prec = prec
            )?;
        }
        self.num_units += centroids.len();
        self.units.flush()?;
        Ok(())
    }

    /// Append 0-based `(gene, unit, count)` triplets
    pub fn write_triplets(&mut self, triplets: &[(u64, u64, f32)]) -> anyhow::Result<()> {
        self.mtx.append(triplets)
    }

    pub fn num_units(&self) -> usize {
        self.num_units
    }

    /// Compress the barcodes, then merge the matrix header with the
    /// streamed triplets into `matrix.mtx.gz`.
    ///
    /// Intermediate files are kept on disk if anything fails.
    pub fn finalize(mut self, num_genes: usize) -> anyhow::Result<MtxSummary> {
        self.units.flush()?;
        drop(self.units);

        let files = self.files;

        gzip_file(&files.barcodes, &files.barcodes_gz).map_err(|e| SgeError::Write {
            path: files.barcodes_gz.clone(),
            message: e.to_string(),
        })?;
        remove_file(&files.barcodes).map_err(|e| SgeError::Write {
            path: files.barcodes.clone(),
            message: e.to_string(),
        })?;
        info!("Wrote {} units: {}", self.num_units, files.barcodes_gz);

        let summary = self
            .mtx
            .finalize(num_genes, self.num_units, &files.mtx_header, &files.mtx_gz)
            .map_err(|e| SgeError::Write {
                path: files.mtx_gz.clone(),
                message: e.to_string(),
            })?;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn centroid(x: f64, y: f64) -> HexCentroid {
        HexCentroid { x, y, tile: 2101 }
    }

    #[test]
    fn units_are_numbered_after_the_previous_ones() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out_dir = dir.path().join("out");
        let mut out = HexOutputWriter::create(out_dir.to_str().unwrap(), 2)?;

        out.write_units(0, &[centroid(1., 2.5)])?;
        out.write_triplets(&[(0, 0, 3.)])?;
        out.write_units(1, &[centroid(-0.3, 4.), centroid(10., 11.)])?;
        out.write_triplets(&[(1, 1, 1.), (0, 2, 2.)])?;
        assert_eq!(out.num_units(), 3);

        let files = out.files().clone();
        let summary = out.finalize(2)?;
        assert_eq!((summary.nrow, summary.ncol, summary.nnz), (2, 3, 3));
        assert_eq!(summary.total, 6.);

        let ReadLinesOut { lines, .. } = read_lines_of_words_delim(&files.barcodes_gz, "\t", -1)?;
        let units: Vec<&str> = lines.iter().map(|w| w[0].as_ref()).collect();
        assert_eq!(
            units,
            vec!["1_2101_1.00_2.50", "2_2101_-0.30_4.00", "3_2101_10.00_11.00"]
        );
        assert!(!Path::new(&*files.barcodes).exists());
        Ok(())
    }

    #[test]
    fn failed_compression_is_a_write_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out_dir = dir.path().join("out");
        let mut out = HexOutputWriter::create(out_dir.to_str().unwrap(), 1)?;
        out.write_units(0, &[centroid(0., 0.)])?;
        out.write_triplets(&[(0, 0, 5.)])?;

        // a directory sits where the matrix should go
        let files = out.files().clone();
        std::fs::create_dir_all(&*files.mtx_gz)?;

        let err = out.finalize(1).unwrap_err();
        match err.downcast_ref::<SgeError>() {
            Some(SgeError::Write { path, .. }) => assert_eq!(path, &files.mtx_gz),
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(Path::new(&*files.mtx_body).exists());
        assert!(Path::new(&*files.mtx_header).exists());
        Ok(())
    }
}
