//! Emotion State Tracker and Termination Policy.

pub mod termination;
pub mod tracker;
