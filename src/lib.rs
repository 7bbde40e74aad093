pub mod cache;
pub mod calendar;
pub mod commands;
pub mod config;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod packer;
pub mod rows;
pub mod source;
pub mod sync;
pub mod workload;
