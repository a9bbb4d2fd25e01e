use thiserror::Error;

#[derive(Error, Debug)]
pub enum WipecheckError {
    #[error("malformed run list: {0}")]
    MalformedRun(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("volume I/O error: {0}")]
    VolumeIo(#[from] std::io::Error),

    #[error("invalid volume metadata: {0}")]
    VolumeMetadata(String),

    #[error("fill stalled at {occupancy_percent}% occupancy after {iterations} non-progressing iterations")]
    FillStalled {
        iterations: u32,
        occupancy_percent: u64,
    },
}
