use std::path::Path;

/// Failures of the hexagon binning run.
///
/// `EmptyResult` is reported through the log and the loop moves on to
/// the next sliding offset; the other kinds abort the run.
#[derive(Debug, thiserror::Error)]
pub enum SgeError {
    #[error("missing or unreadable input file: {path}")]
    MissingInputFile { path: Box<str> },

    #[error("lane {lane} tile {tile} is not found in the layout/manifest table")]
    MissingTile { lane: u32, tile: u32 },

    #[error("no hexagon unit survived at sliding offset ({offset_x}, {offset_y})")]
    EmptyResult { offset_x: usize, offset_y: usize },

    #[error("failed to write {path}: {message}")]
    Write { path: Box<str>, message: String },
}

/// Fail early if `file` does not exist or is not a regular file
pub fn check_input_file(file: &str) -> anyhow::Result<()> {
    let path = Path::new(file);
    if !path.is_file() {
        return Err(SgeError::MissingInputFile { path: file.into() }.into());
    }
    Ok(())
}
