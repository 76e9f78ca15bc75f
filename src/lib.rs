// lib.rs
pub mod blocks;
pub mod commands;
pub mod gfa;
pub mod graph;
pub mod lace;
pub mod maf;
pub mod normalize;
pub mod poa;
pub mod progress;
pub mod smooth;
pub mod verify;
