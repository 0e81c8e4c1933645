pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20260801_000001_links;
mod m20260801_000002_click_events;
mod m20260802_000001_click_rollups;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260801_000001_links::Migration),
            Box::new(m20260801_000002_click_events::Migration),
            Box::new(m20260802_000001_click_rollups::Migration),
        ]
    }
}
