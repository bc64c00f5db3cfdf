pub mod chase;
pub mod events;
pub mod indicators;
pub mod levels;
pub mod liquidity;
pub mod patterns;
pub mod pivots;
pub mod regime;
pub mod scoring;
pub mod setups;
pub mod structure;
pub mod zones;
