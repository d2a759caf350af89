use crate::common::*;
use crate::errors::check_input_file;
use crate::tile_stitch::{parse_coordinate, TileId, TileStitcher};
use std::io::BufRead;

/// Count channels of the raw `matrix.mtx.gz`; values may be integer
/// or floating point
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
pub enum CountChannel {
    /// gene
    Gn,
    /// gene total
    Gt,
    /// spliced
    Spl,
    /// unspliced
    Unspl,
    /// ambiguous
    Ambig,
}

impl CountChannel {
    /// Column of this channel after `feature_id pixel_id`
    pub fn column(&self) -> usize {
        match self {
            CountChannel::Gn => 2,
            CountChannel::Gt => 3,
            CountChannel::Spl => 4,
            CountChannel::Unspl => 5,
            CountChannel::Ambig => 6,
        }
    }
}

/// The three raw files under one input directory
#[derive(Debug, Clone)]
pub struct SgeInputFiles {
    pub barcodes: Box<str>,
    pub matrix: Box<str>,
    pub features: Box<str>,
}

impl SgeInputFiles {
    pub fn from_dir(input_dir: &str) -> Self {
        let dir = input_dir.trim_end_matches('/');
        Self {
            barcodes: format!("{}/barcodes.tsv.gz", dir).into_boxed_str(),
            matrix: format!("{}/matrix.mtx.gz", dir).into_boxed_str(),
            features: format!("{}/features.tsv.gz", dir).into_boxed_str(),
        }
    }

    pub fn check(&self) -> anyhow::Result<()> {
        check_input_file(&self.barcodes)?;
        check_input_file(&self.matrix)?;
        check_input_file(&self.features)?;
        Ok(())
    }
}

/// Local position of a raw pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBarcode {
    pub tile: TileId,
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneFeature {
    pub gene_id: Box<str>,
    pub gene: Box<str>,
}

/// One raw count after stitching
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRecord {
    pub x: i64,
    pub y: i64,
    /// feature local id
    pub gene: u64,
    pub count: f32,
    pub tile: TileId,
}

fn parse_field<T>(words: &[&str], k: usize, file: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
{
    words
        .get(k)
        .and_then(|w| w.trim().parse::<T>().ok())
        .ok_or_else(|| anyhow::anyhow!("bad field #{} in {}: {}", k + 1, file, words.join(" ")))
}

/// Read `barcodes.tsv.gz`: `barcode, j, v2, lane, tile, X, Y, ...`
/// separated by tabs or commas.
///
/// * `keep` - pixels of other tiles are dropped
pub fn read_barcodes(
    file: &str,
    keep: impl Fn(&TileId) -> bool,
) -> anyhow::Result<HashMap<u64, PixelBarcode>> {
    let buf = open_buf_reader(file)?;
    let mut barcodes = HashMap::default();
    let mut nskip = 0_usize;

    for line in buf.lines() {
        let line = line?;
        if line.trim().is_empty() || is_comment_line(&line) {
            continue;
        }
        let words: Vec<&str> = line.split(&['\t', ','][..]).collect();

        let tile = TileId::new(parse_field(&words, 3, file)?, parse_field(&words, 4, file)?);
        if !keep(&tile) {
            nskip += 1;
            continue;
        }

        let j: u64 = parse_field(&words, 1, file)?;
        let x = words
            .get(5)
            .ok_or_else(|| anyhow::anyhow!("missing X in {}", file))
            .and_then(|w| parse_coordinate(w.trim()))?;
        let y = words
            .get(6)
            .ok_or_else(|| anyhow::anyhow!("missing Y in {}", file))
            .and_then(|w| parse_coordinate(w.trim()))?;

        barcodes.insert(j, PixelBarcode { tile, x, y });
    }

    info!(
        "Read {} pixel barcodes ({} outside the selected tiles)",
        barcodes.len(),
        nskip
    );
    Ok(barcodes)
}

/// Read `features.tsv.gz`: `gene_id, gene, i, ...`
pub fn read_features(file: &str) -> anyhow::Result<HashMap<u64, GeneFeature>> {
    let ReadLinesOut { lines, .. } = read_lines_of_words_delim(file, &['\t', ','], -1)?;

    let mut features = HashMap::default();
    for words in lines {
        if words.len() < 3 {
            anyhow::bail!("expected `gene_id, gene, i` in {}", file);
        }
        let i: u64 = words[2]
            .parse()
            .map_err(|_| anyhow::anyhow!("bad feature index in {}: {}", file, words[2]))?;
        features.insert(
            i,
            GeneFeature {
                gene_id: words[0].clone(),
                gene: words[1].clone(),
            },
        );
    }
    info!("Read {} features", features.len());
    Ok(features)
}

/// Stream the raw `matrix.mtx.gz` (`i j gn gt spl unspl ambig`) and
/// join each count with its pixel and feature. Counts of unknown
/// pixels or features are dropped; pixel coordinates are stitched into
/// the global space.
pub fn read_pixel_records(
    file: &str,
    channel: CountChannel,
    barcodes: &HashMap<u64, PixelBarcode>,
    features: &HashMap<u64, GeneFeature>,
    stitcher: &TileStitcher,
) -> anyhow::Result<Vec<PixelRecord>> {
    let buf = open_buf_reader(file)?;
    let column = channel.column();

    let mut records = vec![];
    let mut dimension_line_seen = false;

    for line in buf.lines() {
        let line = line?;
        if line.trim().is_empty() || is_comment_line(&line) {
            continue;
        }
        if !dimension_line_seen {
            dimension_line_seen = true;
            continue;
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        let i: u64 = parse_field(&words, 0, file)?;
        let j: u64 = parse_field(&words, 1, file)?;

        let (Some(pixel), true) = (barcodes.get(&j), features.contains_key(&i)) else {
            continue;
        };

        let count: f32 = parse_field(&words, column, file)?;
        let (x, y) = stitcher.to_global(pixel.tile, pixel.x, pixel.y)?;

        records.push(PixelRecord {
            x,
            y,
            gene: i,
            count,
            tile: pixel.tile,
        });
    }

    info!("Read {} non-zero records from {}", records.len(), file);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile_stitch::{LayoutEntry, TileBox};

    #[test]
    fn floating_counts_are_joined() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("matrix.mtx.gz");
        let file = file.to_str().unwrap();
        write_lines(
            &[
                "%%MatrixMarket matrix coordinate real general".into(),
                "%".into(),
                "2 2 3".into(),
                "1 1 1.5 2 0 0 0".into(),
                "2 2 3 3 0 0 0".into(),
                // unknown pixel
                "1 9 7 7 0 0 0".into(),
            ],
            file,
        )?;

        let tile = TileId::new(1, 1);
        let stitcher = TileStitcher::new(
            &[LayoutEntry {
                tile,
                row: 0,
                col: 0,
            }],
            &[TileBox {
                tile,
                xmin: 0,
                xmax: 9,
                ymin: 0,
                ymax: 9,
            }],
            1,
        )?;

        let mut barcodes = HashMap::default();
        barcodes.insert(1, PixelBarcode { tile, x: 1, y: 2 });
        barcodes.insert(2, PixelBarcode { tile, x: 3, y: 4 });

        let mut features = HashMap::default();
        for i in 1..=2 {
            let gene_id = format!("G{}", i).into_boxed_str();
            features.insert(
                i,
                GeneFeature {
                    gene: gene_id.clone(),
                    gene_id,
                },
            );
        }

        let records = read_pixel_records(file, CountChannel::Gn, &barcodes, &features, &stitcher)?;
        let counts: Vec<(u64, f32)> = records.iter().map(|r| (r.gene, r.count)).collect();
        assert_eq!(counts, vec![(1, 1.5), (2, 3.0)]);
        assert_eq!((records[1].x, records[1].y), (3, 4));

        let records = read_pixel_records(file, CountChannel::Gt, &barcodes, &features, &stitcher)?;
        assert_eq!(records[0].count, 2.0);
        Ok(())
    }
}
