use crate::common::*;
use crate::dge_builder::build_dge;
use crate::errors::check_input_file;
use crate::hex_aggregate::*;
use crate::hex_grid::HexSize;
use crate::hex_output::{write_features, HexOutputWriter};
use crate::sge_input::*;
use crate::tile_stitch::{read_layout, read_manifest, TileId, TileStitcher};

use matrix_util::mtx_io::MtxSummary;

#[derive(Args, Debug, Clone)]
pub struct SgeByHexagonArgs {
    /// directory with `barcodes.tsv.gz`, `matrix.mtx.gz` and `features.tsv.gz`
    #[arg(short = 'i', long, required = true)]
    pub input_path: Box<str>,

    /// output directory
    #[arg(short = 'o', long, required = true)]
    pub output_path: Box<str>,

    /// per-tile manifest (`id` = `lane_tile`, `xmin`, `xmax`, `ymin`, `ymax`)
    #[arg(long, required = true)]
    pub meta_data: Box<str>,

    /// layout of tiles: `lane tile row col` in each line
    #[arg(long, required = true)]
    pub layout: Box<str>,

    /// lane to process
    #[arg(long, required = true)]
    pub lane: u32,

    /// only keep these tiles (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub tile: Vec<u32>,

    /// raw coordinate units per micrometer
    #[arg(long, default_value_t = 26.67)]
    pub mu_scale: f64,

    /// count channel (gn: gene, gt: gene total, spl: spliced, unspl: unspliced, ambig: ambiguous)
    #[arg(long, value_enum, default_value = "gn")]
    pub key: CountChannel,

    /// number of digits to store spatial location (in um), 0 for integer
    #[arg(long, default_value_t = 1)]
    pub precision: usize,

    /// hexagon width in micrometers
    #[arg(long, conflicts_with = "hex_radius", required_unless_present = "hex_radius")]
    pub hex_width: Option<f64>,

    /// hexagon radius in micrometers (`width / √3`)
    #[arg(long)]
    pub hex_radius: Option<f64>,

    /// number of sliding offsets along each axis
    #[arg(long, default_value_t = 1)]
    pub n_move: usize,

    /// minimum total count of a hexagon unit
    #[arg(long, default_value_t = 1)]
    pub min_ct_per_unit: u64,

    /// genes with total count less than or equal to this are dropped
    #[arg(long, default_value_t = 1)]
    pub min_count_per_feature: u64,

    /// number of units per mini-batch; offsets with fewer than a
    /// quarter of this many units are skipped
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct SgeByHexagonOut {
    pub reports: Vec<OffsetReport>,
    pub mtx: MtxSummary,
}

/// Stitch tiles, build the pixel-level DGE and write hexagon units
/// aggregated over sliding offsets
pub fn run_sge_by_hexagon(args: &SgeByHexagonArgs) -> anyhow::Result<SgeByHexagonOut> {
    let hex = HexSize::resolve(args.hex_width, args.hex_radius)?;
    let n_move = effective_n_move(args.n_move, hex.width);
    if n_move != args.n_move {
        info!("n_move {} is too large for width {}; use {}", args.n_move, hex.width, n_move);
    }

    if args.mu_scale.is_nan() || args.mu_scale <= 0. {
        anyhow::bail!("mu_scale should be positive: {}", args.mu_scale);
    }

    let inputs = SgeInputFiles::from_dir(&args.input_path);
    inputs.check()?;
    check_input_file(&args.meta_data)?;
    check_input_file(&args.layout)?;

    ////////////////////////
    // stitch tiles       //
    ////////////////////////

    let manifest = read_manifest(&args.meta_data)?;
    let layout = read_layout(&args.layout)?;
    let stitcher = TileStitcher::new(&layout, &manifest, args.lane)?;

    let tile_filter: HashSet<u32> = args.tile.iter().copied().collect();
    let keep = |t: &TileId| {
        stitcher.is_declared(t) && (tile_filter.is_empty() || tile_filter.contains(&t.tile))
    };

    let barcodes = read_barcodes(&inputs.barcodes, keep)?;
    let features = read_features(&inputs.features)?;
    let records = read_pixel_records(&inputs.matrix, args.key, &barcodes, &features, &stitcher)?;
    drop(barcodes);

    ////////////////////////
    // pixel-level DGE    //
    ////////////////////////

    let dge = build_dge(&records, args.min_count_per_feature)?;
    drop(records);
    info!(
        "Read data with {} pixels and {} genes, total count {}.",
        dge.num_pixels(),
        dge.num_genes(),
        dge.total_count()
    );

    let mut output = HexOutputWriter::create(&args.output_path, args.precision)?;

    let kept_features = dge
        .genes
        .keys()
        .iter()
        .map(|i| {
            features
                .get(i)
                .ok_or_else(|| anyhow::anyhow!("feature {} went missing", i))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    write_features(&output.files().features, &kept_features)?;

    ////////////////////////
    // hexagon units      //
    ////////////////////////

    let params = HexAggregateParams {
        radius: hex.radius,
        n_move,
        min_ct_per_unit: args.min_ct_per_unit as f64,
        batch_size: args.batch_size,
    };

    let mut aggregator = HexAggregator::new(&dge, args.mu_scale, params);
    let reports = aggregator.run(&mut output)?;
    info!(
        "Visited {} sliding offsets, {} units in total",
        reports.len(),
        aggregator.n_unit()
    );

    let mtx = output.finalize(dge.num_genes())?;
    info!(
        "Done: {} units x {} genes, total count {}",
        mtx.ncol, mtx.nrow, mtx.total
    );

    Ok(SgeByHexagonOut { reports, mtx })
}
