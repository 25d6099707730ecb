pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_domains_and_models;
mod m20260301_000002_create_properties_and_relations;
mod m20260302_000003_create_shared_attributes_and_indicators;
mod m20260303_000004_create_datasources;
mod m20260303_000005_create_mappings_and_associations;
mod m20260305_000006_create_etl_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_domains_and_models::Migration),
            Box::new(m20260301_000002_create_properties_and_relations::Migration),
            Box::new(m20260302_000003_create_shared_attributes_and_indicators::Migration),
            Box::new(m20260303_000004_create_datasources::Migration),
            Box::new(m20260303_000005_create_mappings_and_associations::Migration),
            Box::new(m20260305_000006_create_etl_tables::Migration),
        ]
    }
}
