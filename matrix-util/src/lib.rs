pub mod common_io;
pub mod mtx_io;
pub mod traits;
pub mod utils;
