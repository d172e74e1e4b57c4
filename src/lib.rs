#[cfg(test)]
#[macro_use]
extern crate approx;

pub mod coords;
pub mod jog_pad;
pub mod lights;
pub mod line_transport;
pub mod position_registry;
pub mod scan_path;
pub mod scope_config;
pub mod scope_config_parser;
pub mod stage;

#[cfg(test)]
mod tests;
