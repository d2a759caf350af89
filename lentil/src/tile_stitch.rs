use crate::common::*;
use crate::errors::SgeError;
use std::fmt;
use std::str::FromStr;

/// A physical tile within a lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub lane: u32,
    pub tile: u32,
}

impl TileId {
    pub fn new(lane: u32, tile: u32) -> Self {
        Self { lane, tile }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.lane, self.tile)
    }
}

/// Parse `lane_tile`
impl FromStr for TileId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let mut words = s.trim().split('_');
        match (words.next(), words.next()) {
            (Some(lane), Some(tile)) => Ok(Self {
                lane: lane.parse()?,
                tile: tile.parse()?,
            }),
            _ => Err(anyhow::anyhow!("expected `lane_tile`, but found {}", s)),
        }
    }
}

/// Position of a tile in the scan grid
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutEntry {
    pub tile: TileId,
    pub row: i64,
    pub col: i64,
}

/// Local coordinate extents of a tile
#[derive(Debug, Clone, PartialEq)]
pub struct TileBox {
    pub tile: TileId,
    pub xmin: i64,
    pub xmax: i64,
    pub ymin: i64,
    pub ymax: i64,
}

/// Parse an integer coordinate, tolerating a trailing `.0`
pub fn parse_coordinate(word: &str) -> anyhow::Result<i64> {
    match word.parse::<i64>() {
        Ok(x) => Ok(x),
        Err(_) => {
            let x = word
                .parse::<f64>()
                .map_err(|_| anyhow::anyhow!("not a coordinate: {}", word))?;
            Ok(x.round() as i64)
        }
    }
}

fn column_index(header: &[Box<str>], name: &str, file: &str) -> anyhow::Result<usize> {
    header
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or_else(|| anyhow::anyhow!("column `{}` not found in {}", name, file))
}

/// Read the per-tile manifest with named columns `id` (`lane_tile`),
/// `xmin`, `xmax`, `ymin`, `ymax`
pub fn read_manifest(file: &str) -> anyhow::Result<Vec<TileBox>> {
    let ReadLinesOut { lines, header } = read_lines_of_words_delim(file, &['\t', ','], 0)?;

    let id_col = column_index(&header, "id", file)?;
    let xmin_col = column_index(&header, "xmin", file)?;
    let xmax_col = column_index(&header, "xmax", file)?;
    let ymin_col = column_index(&header, "ymin", file)?;
    let ymax_col = column_index(&header, "ymax", file)?;
    let ncol = [id_col, xmin_col, xmax_col, ymin_col, ymax_col]
        .into_iter()
        .max()
        .unwrap_or(0)
        + 1;

    lines
        .iter()
        .filter(|words| words.len() >= ncol)
        .map(|words| -> anyhow::Result<TileBox> {
            Ok(TileBox {
                tile: words[id_col].parse()?,
                xmin: parse_coordinate(&words[xmin_col])?,
                xmax: parse_coordinate(&words[xmax_col])?,
                ymin: parse_coordinate(&words[ymin_col])?,
                ymax: parse_coordinate(&words[ymax_col])?,
            })
        })
        .collect()
}

/// Read the layout file: `lane tile row col` per line, separated by
/// tabs or spaces. A header line naming these columns is optional.
pub fn read_layout(file: &str) -> anyhow::Result<Vec<LayoutEntry>> {
    let parse_fn = |line: &str| -> Vec<Box<str>> {
        line.split_whitespace()
            .map(|x| x.to_owned().into_boxed_str())
            .collect()
    };
    let ReadLinesOut { mut lines, .. } = read_lines_of_words_generic(file, -1, parse_fn, parse_fn)?;

    if lines.is_empty() {
        anyhow::bail!("empty layout file: {}", file);
    }

    let has_header = lines[0].first().is_some_and(|x| x.parse::<i64>().is_err());

    let cols = if has_header {
        let header = lines.remove(0);
        [
            column_index(&header, "lane", file)?,
            column_index(&header, "tile", file)?,
            column_index(&header, "row", file)?,
            column_index(&header, "col", file)?,
        ]
    } else {
        [0, 1, 2, 3]
    };
    let ncol = cols.iter().max().copied().unwrap_or(0) + 1;

    lines
        .iter()
        .filter(|words| words.len() >= ncol)
        .map(|words| -> anyhow::Result<LayoutEntry> {
            Ok(LayoutEntry {
                tile: TileId::new(words[cols[0]].parse()?, words[cols[1]].parse()?),
                row: words[cols[2]].parse()?,
                col: words[cols[3]].parse()?,
            })
        })
        .collect()
}

/// Combines per-tile local coordinates into one global coordinate
/// system.
///
/// Every grid cell has the same size, the largest extent across the
/// lane's manifest, so the global coordinate of a pixel in the tile at
/// grid `(row, col)` is
/// `((nrows - row - 1) * x_range + x - x_min, col * y_range + y - y_min)`.
pub struct TileStitcher {
    declared: HashSet<TileId>,
    offsets: HashMap<TileId, (i64, i64)>,
    grid: Vec<(usize, usize, TileId)>,
    nrows: usize,
    ncols: usize,
    x_range: i64,
    y_range: i64,
}

impl TileStitcher {
    /// Join the layout with the manifest for one lane.
    ///
    /// Layout tiles without a manifest entry are left out of the grid.
    pub fn new(layout: &[LayoutEntry], manifest: &[TileBox], lane: u32) -> anyhow::Result<Self> {
        let boxes: Vec<&TileBox> = manifest.iter().filter(|b| b.tile.lane == lane).collect();

        if boxes.is_empty() {
            anyhow::bail!("no manifest entry for lane {}", lane);
        }

        let x_min = boxes.iter().map(|b| b.xmin).min().unwrap_or(0);
        let x_max = boxes.iter().map(|b| b.xmax).max().unwrap_or(0);
        let y_min = boxes.iter().map(|b| b.ymin).min().unwrap_or(0);
        let y_max = boxes.iter().map(|b| b.ymax).max().unwrap_or(0);
        let x_range = x_max - x_min + 1;
        let y_range = y_max - y_min + 1;

        info!("Read meta data. Xmax, Ymax: {}, {}", x_max, y_max);

        let known: HashSet<TileId> = boxes.iter().map(|b| b.tile).collect();

        let mut entries: Vec<&LayoutEntry> = layout.iter().filter(|e| e.tile.lane == lane).collect();
        entries.sort_by_key(|e| (e.row, e.col));

        let row_min = entries.iter().map(|e| e.row).min();
        let col_min = entries.iter().map(|e| e.col).min();

        let (Some(row_min), Some(col_min)) = (row_min, col_min) else {
            anyhow::bail!("no layout entry for lane {}", lane);
        };

        let declared: HashSet<TileId> = entries.iter().map(|e| e.tile).collect();

        // the grid shape follows the whole layout of the lane
        let nrows = entries.iter().map(|e| e.row - row_min).max().unwrap_or(0) as usize + 1;
        let ncols = entries.iter().map(|e| e.col - col_min).max().unwrap_or(0) as usize + 1;

        let mut grid = vec![];
        for e in entries {
            if !known.contains(&e.tile) {
                warn!("tile {} is in the layout, but not in the manifest", e.tile);
                continue;
            }
            grid.push(((e.row - row_min) as usize, (e.col - col_min) as usize, e.tile));
        }

        if grid.is_empty() {
            anyhow::bail!("no tile of lane {} is in both layout and manifest", lane);
        }

        let mut offsets = HashMap::default();
        for &(r, c, tile) in grid.iter() {
            let x_offset = (nrows - r - 1) as i64 * x_range - x_min;
            let y_offset = c as i64 * y_range - y_min;
            offsets.insert(tile, (x_offset, y_offset));
        }

        let ret = Self {
            declared,
            offsets,
            grid,
            nrows,
            ncols,
            x_range,
            y_range,
        };

        let show = |t: Option<TileId>| t.map(|t| t.tile.to_string()).unwrap_or("NA".into());
        info!(
            "Read layout info. lane {}, tile {}-{}",
            lane,
            show(ret.lower_left()),
            show(ret.upper_right())
        );

        Ok(ret)
    }

    /// Global coordinate of a local `(x, y)` in `tile`
    pub fn to_global(&self, tile: TileId, x: i64, y: i64) -> anyhow::Result<(i64, i64)> {
        match self.offsets.get(&tile) {
            Some(&(dx, dy)) => Ok((x + dx, y + dy)),
            None => Err(SgeError::MissingTile {
                lane: tile.lane,
                tile: tile.tile,
            }
            .into()),
        }
    }

    /// Whether `tile` can be stitched (layout and manifest both know it)
    pub fn contains(&self, tile: &TileId) -> bool {
        self.offsets.contains_key(tile)
    }

    /// Whether the layout places `tile` in the grid
    pub fn is_declared(&self, tile: &TileId) -> bool {
        self.declared.contains(tile)
    }

    /// Tile at a grid cell, if any
    pub fn tile_at(&self, row: usize, col: usize) -> Option<TileId> {
        self.grid
            .iter()
            .find(|&&(r, c, _)| r == row && c == col)
            .map(|&(_, _, t)| t)
    }

    pub fn lower_left(&self) -> Option<TileId> {
        self.tile_at(self.nrows - 1, 0)
    }

    pub fn upper_right(&self) -> Option<TileId> {
        self.tile_at(0, self.ncols - 1)
    }

    pub fn num_tiles(&self) -> usize {
        self.grid.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// Size of one grid cell
    pub fn cell_size(&self) -> (i64, i64) {
        (self.x_range, self.y_range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile_box(lane: u32, tile: u32, xmin: i64, xmax: i64, ymin: i64, ymax: i64) -> TileBox {
        TileBox {
            tile: TileId::new(lane, tile),
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    #[test]
    fn single_tile_subtracts_the_minimum() -> anyhow::Result<()> {
        let layout = vec![LayoutEntry {
            tile: TileId::new(1, 1),
            row: 1,
            col: 1,
        }];
        let manifest = vec![tile_box(1, 1, 100, 200, 50, 80)];

        let stitcher = TileStitcher::new(&layout, &manifest, 1)?;
        assert_eq!(stitcher.shape(), (1, 1));
        assert_eq!(stitcher.to_global(TileId::new(1, 1), 100, 50)?, (0, 0));
        assert_eq!(stitcher.to_global(TileId::new(1, 1), 150, 70)?, (50, 20));
        Ok(())
    }

    #[test]
    fn two_by_two_grid_uses_the_largest_extent() -> anyhow::Result<()> {
        let layout = vec![
            LayoutEntry { tile: TileId::new(1, 11), row: 0, col: 0 },
            LayoutEntry { tile: TileId::new(1, 12), row: 0, col: 1 },
            LayoutEntry { tile: TileId::new(1, 21), row: 1, col: 0 },
            LayoutEntry { tile: TileId::new(1, 22), row: 1, col: 1 },
            LayoutEntry { tile: TileId::new(2, 11), row: 0, col: 0 },
        ];
        let manifest = vec![
            tile_box(1, 11, 0, 99, 0, 49),
            tile_box(1, 12, 0, 89, 0, 49),
            tile_box(1, 21, 5, 99, 0, 39),
            tile_box(1, 22, 0, 99, 0, 49),
        ];

        let stitcher = TileStitcher::new(&layout, &manifest, 1)?;
        assert_eq!(stitcher.cell_size(), (100, 50));
        assert_eq!(stitcher.num_tiles(), 4);
        assert_eq!(stitcher.lower_left(), Some(TileId::new(1, 21)));
        assert_eq!(stitcher.upper_right(), Some(TileId::new(1, 12)));

        // top row goes to the far end of x
        assert_eq!(stitcher.to_global(TileId::new(1, 11), 10, 10)?, (110, 10));
        assert_eq!(stitcher.to_global(TileId::new(1, 12), 10, 10)?, (110, 60));
        assert_eq!(stitcher.to_global(TileId::new(1, 21), 10, 10)?, (10, 10));
        assert_eq!(stitcher.to_global(TileId::new(1, 22), 10, 10)?, (10, 60));
        Ok(())
    }

    #[test]
    fn unknown_tile_is_an_error() -> anyhow::Result<()> {
        let layout = vec![
            LayoutEntry { tile: TileId::new(1, 1), row: 0, col: 0 },
            LayoutEntry { tile: TileId::new(1, 2), row: 0, col: 1 },
        ];
        let manifest = vec![tile_box(1, 1, 0, 10, 0, 10)];

        let stitcher = TileStitcher::new(&layout, &manifest, 1)?;
        assert!(!stitcher.contains(&TileId::new(1, 2)));
        assert!(stitcher.is_declared(&TileId::new(1, 2)));
        assert!(!stitcher.is_declared(&TileId::new(1, 3)));

        let err = stitcher.to_global(TileId::new(1, 2), 0, 0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SgeError>(),
            Some(SgeError::MissingTile { lane: 1, tile: 2 })
        ));
        Ok(())
    }

    #[test]
    fn parse_tile_id() -> anyhow::Result<()> {
        let t: TileId = "1_2101".parse()?;
        assert_eq!(t, TileId::new(1, 2101));
        assert_eq!(t.to_string(), "1_2101");
        assert!("12101".parse::<TileId>().is_err());
        Ok(())
    }
}
