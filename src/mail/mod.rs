pub mod decoders;
pub mod normalizer;
