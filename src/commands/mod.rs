pub mod archive;
pub mod ingest;
pub mod migrate;

pub use archive::handle_archive;
pub use ingest::handle_ingest;
pub use migrate::handle_migrate;
