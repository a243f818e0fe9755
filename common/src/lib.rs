pub mod capture;
pub mod config;
pub mod frame;
pub mod gpu;
pub mod settings;
pub mod stats;
