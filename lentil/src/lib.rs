mod common;

pub mod dge_builder;
pub mod errors;
pub mod hex_aggregate;
pub mod hex_grid;
pub mod hex_output;
pub mod run_sge_by_hexagon;
pub mod sge_input;
pub mod tile_stitch;
