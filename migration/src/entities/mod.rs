pub mod click_event;
pub mod click_rollup_daily;
pub mod click_rollup_monthly;
pub mod global_clicks;
pub mod link;

pub use click_event::Entity as ClickEventEntity;
pub use click_rollup_daily::Entity as ClickRollupDailyEntity;
pub use click_rollup_monthly::Entity as ClickRollupMonthlyEntity;
pub use global_clicks::Entity as GlobalClicksEntity;
pub use link::Entity as LinkEntity;
