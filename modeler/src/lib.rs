//! Data modeling service: metadata REST API, source connectors and an ETL
//! runner that loads modeled tables into a DuckDB warehouse.

pub mod api;
pub mod connector;
pub mod crypto;
pub mod entity;
pub mod etl;
pub mod masking;
pub mod warehouse;
