pub mod archive;
pub mod product;

pub use archive::{ArchiveWriter, FrameArchive};
pub use product::DirectorySink;
