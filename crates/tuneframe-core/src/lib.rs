pub mod cache;
pub mod consts;
pub mod error;
pub mod frame;
pub mod io;
pub mod kernels;
pub mod locate;
pub mod mask;
pub mod pipeline;
pub mod quality;
pub mod sequence;
pub mod store;
pub mod tables;
