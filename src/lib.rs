//! Timeline resolution and transform engine for judge-line rhythm charts.
//!
//! A [`game::chart::Chart`] owns judge lines, each of which owns its notes.
//! The host advances playback by calling [`game::chart::Chart::update`] once
//! per frame with the current host time and reads poses and note placements
//! back out.

pub mod config;
pub mod core;
pub mod game;
