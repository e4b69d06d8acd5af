#![allow(clippy::too_many_arguments)]

pub mod config;
pub mod p2p;
