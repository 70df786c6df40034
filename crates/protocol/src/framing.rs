/// Upper bound for a single length-delimited frame.
///
/// The tokio-util default is 8 MiB. Report batches from large link steps can carry long
/// argument vectors, so the collector and its clients agree on a larger limit.
///
/// Both sides must use the same value.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;
