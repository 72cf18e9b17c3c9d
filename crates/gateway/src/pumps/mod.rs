pub(crate) mod read;
pub(crate) mod ticker;
pub(crate) mod write;
