//! Audio output: speech cache, earcons and the playback process.

pub mod cache;
pub mod earcons;
pub mod renderer;
