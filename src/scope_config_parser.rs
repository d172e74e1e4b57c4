use crate::scope_config::ScopeConfig;
use std::fs::File;
use std::io::{BufReader, Read};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to open file: {0}")]
    Open(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

pub fn parse_config<R: Read>(reader: R) -> Result<ScopeConfig, Error> {
    Ok(serde_json::from_reader(reader)?)
}

pub fn read_config(file_name: &str) -> Result<ScopeConfig, Error> {
    let file = File::open(file_name)?;
    parse_config(BufReader::new(file))
}
