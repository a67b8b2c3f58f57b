#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Heed(#[from] heed::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid DISCO header in '{path}': {reason}")]
    InvalidDiscoHeader { path: String, reason: String },

    #[error(
        "Incompatible data block '{path}'. Got {received_dim} dims, descriptor \
         {received_descr} but expected {expected_dim} dims, descriptor {expected_descr}"
    )]
    IncompatibleBlock {
        path: String,
        expected_dim: u32,
        received_dim: u32,
        expected_descr: i32,
        received_descr: i32,
    },

    #[error("Invalid vector dimensions. Got {received} but expected {expected}")]
    InvalidVecDimension { expected: usize, received: usize },

    #[error("Metadata are missing from the index database, was it built?")]
    MissingMetadata,

    #[error("Search parameters ks={ks}, mpd={mpd} exceed the index parameter ki={ki}")]
    UnmatchingParameters { ks: usize, mpd: usize, ki: usize },

    #[error("Could not decompress a posting-list blob: {0}")]
    Compression(String),
}
