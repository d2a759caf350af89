#![allow(dead_code)]

pub use matrix_util::common_io::*;

pub use clap::{Args, ValueEnum};

pub use fnv::FnvHashMap as HashMap;
pub use fnv::FnvHashSet as HashSet;

pub use log::{info, warn};

pub type CsrMat = nalgebra_sparse::CsrMatrix<f32>;
pub type CooMat = nalgebra_sparse::CooMatrix<f32>;
