use crate::common_io::*;
use log::info;
use std::io::{BufRead, BufWriter, Write};

/// MatrixMarket banner for count matrices
pub const MTX_BANNER: &str = "%%MatrixMarket matrix coordinate integer general";

/// Shape and content summary of a finalized MatrixMarket file
#[derive(Debug, Clone, PartialEq)]
pub struct MtxSummary {
    pub nrow: usize,
    pub ncol: usize,
    pub nnz: usize,
    pub total: f64,
}

/// Append-only MatrixMarket writer.
///
/// Non-zero triplets go straight to a plain-text body file, so the full
/// matrix is never held in memory. The dimension line can only be known
/// after the last triplet, so [`MtxTripletStream::finalize`] writes a
/// separate header file and concatenates `header + body` into one
/// gzipped output.
pub struct MtxTripletStream {
    body_file: Box<str>,
    buf: BufWriter<std::fs::File>,
    nnz: usize,
    total: f64,
}

impl MtxTripletStream {
    /// Open (or keep appending to) `body_file`
    pub fn create(body_file: &str) -> anyhow::Result<Self> {
        Ok(Self {
            body_file: body_file.into(),
            buf: open_append_writer(body_file)?,
            nnz: 0,
            total: 0.,
        })
    }

    /// Append 0-based `(row, col, value)` triplets as 1-based lines.
    /// Zero values are skipped.
    pub fn append(&mut self, triplets: &[(u64, u64, f32)]) -> anyhow::Result<()> {
        for &(row, col, val) in triplets {
            if val == 0.0 {
                continue;
            }
            writeln!(self.buf, "{} {} {}", row + 1, col + 1, val)?;
            self.nnz += 1;
            self.total += val as f64;
        }
        Ok(())
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// Sum of all values appended so far
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Write the header, concatenate `header + body` into `mtx_file`
    /// (gzipped), and remove the two intermediate files.
    ///
    /// The intermediate files are only removed after the concatenation
    /// succeeded; on failure they stay on disk.
    ///
    /// * `nrow` - number of rows
    /// * `ncol` - number of columns
    /// * `header_file` - temporary header file
    /// * `mtx_file` - the output file (e.g., "matrix.mtx.gz")
    pub fn finalize(
        mut self,
        nrow: usize,
        ncol: usize,
        header_file: &str,
        mtx_file: &str,
    ) -> anyhow::Result<MtxSummary> {
        self.buf.flush()?;
        drop(self.buf);

        {
            let mut hdr = open_buf_writer(header_file)?;
            writeln!(hdr, "{}", MTX_BANNER)?;
            writeln!(hdr, "%")?;
            writeln!(hdr, "{} {} {}", nrow, ncol, self.total)?;
            hdr.flush()?;
        }

        gzip_concat(&[header_file, &*self.body_file], mtx_file)?;
        remove_all_files(&[header_file, &*self.body_file])?;

        info!(
            "Wrote {} x {} matrix with {} non-zero elements: {}",
            nrow, ncol, self.nnz, mtx_file
        );

        Ok(MtxSummary {
            nrow,
            ncol,
            nnz: self.nnz,
            total: self.total,
        })
    }
}

/// Read a matrix market file and return a vector of 0-based
/// triplets (row, col, val) in the file order, along with the
/// dimension line
/// * `mtx_file` - Path to the matrix market file
pub fn read_mtx_triplets(
    mtx_file: &str,
) -> anyhow::Result<(Vec<(u64, u64, f32)>, (usize, usize, f64))> {
    let buf = open_buf_reader(mtx_file)?;

    let mut shape = None;
    let mut triplets = vec![];

    for line in buf.lines() {
        let line = line?;
        if is_comment_line(&line) || line.trim().is_empty() {
            continue;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.len() != 3 {
            anyhow::bail!("expected three fields in {}: {}", mtx_file, line);
        }

        if shape.is_none() {
            shape = Some((
                words[0].parse::<usize>()?,
                words[1].parse::<usize>()?,
                words[2].parse::<f64>()?,
            ));
            continue;
        }

        // convert 1-based to 0-based
        let row = words[0].parse::<u64>()? - 1;
        let col = words[1].parse::<u64>()? - 1;
        let val = words[2].parse::<f32>()?;
        triplets.push((row, col, val));
    }

    let shape = shape.ok_or_else(|| anyhow::anyhow!("Failed to parse mtx header: {}", mtx_file))?;
    Ok((triplets, shape))
}
