pub mod data_model;
pub mod data_source;
pub mod domain;
pub mod etl_log;
pub mod etl_task;
pub mod indicator;
pub mod mapping;
pub mod model_relation;
pub mod model_table_association;
pub mod property;
pub mod shared_attribute;
