//! Runtime utilities shared by the networking and state layers.

pub mod timer;
