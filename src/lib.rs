//! Eurostat SDMX catalog exposed as a browsable tree of category folders and
//! downloadable CSV dataflows.

pub mod builder;
pub mod cache;
pub mod catalog;
pub mod client;
pub mod codelist;
pub mod config;
pub mod domain;
pub mod download;
pub mod driver;
pub mod error;
pub mod output;
pub mod parser;
pub mod resolver;
pub mod source;
