pub mod cipher;
pub mod file;
pub mod hasher;
pub mod ingest;
pub mod thumbnail;

pub use cipher::FileCipher;
pub use file::FileService;
pub use ingest::IngestPipeline;
