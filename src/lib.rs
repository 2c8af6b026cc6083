pub mod app;
pub mod audio;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod library;
pub mod model;
pub mod presentation;
pub mod shuffle;
pub mod ui;
pub mod waveform;
