//! outbox 语义测试
//!
//! 覆盖 append / claim_batch / mark_processed / purge_processed
//! 以及至少一次投递的关键性质：claim 是读取不是出队。

use std::sync::{Arc, Once};

use chrono::{Duration, TimeZone, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tempfile::TempDir;

use clicklytics::config::{StaticConfig, init_config_with};
use clicklytics::events::global::{get_click_emitter, set_global_click_emitter};
use clicklytics::events::{ClickEmitter, ClickEvent, DeviceType, OutboxEmitter, spawn_emit};
use clicklytics::outbox::EventStore;
use clicklytics::storage::SeaOrmStorage;
use migration::entities::click_event;

static INIT: Once = Once::new();

fn init_test_config() {
    INIT.call_once(|| {
        init_config_with(StaticConfig::default());
    });
}

async fn create_temp_storage() -> (Arc<SeaOrmStorage>, TempDir) {
    init_test_config();
    let td = TempDir::new().unwrap();
    let p = td.path().join("outbox.db");
    let u = format!("sqlite://{}?mode=rwc", p.display());
    let s = SeaOrmStorage::new(&u, "sqlite").await.unwrap();
    (Arc::new(s), td)
}

fn click(link_id: &str) -> ClickEvent {
    let mut event = ClickEvent::new(link_id.to_string(), "u1".to_string());
    event.country = "US".to_string();
    event.device_type = DeviceType::Desktop;
    event.timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    event
}

#[tokio::test]
async fn test_append_then_claim_round_trip() {
    let (storage, _td) = create_temp_storage().await;

    let event = click("L1");
    let event_id = event.event_id;
    storage.append(event).await.unwrap();

    let claimed = storage.claim_batch(10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].event.event_id, event_id);
    assert_eq!(claimed[0].event.link_id, "L1");
    assert_eq!(claimed[0].event.country, "US");
    assert_eq!(claimed[0].event.device_type, DeviceType::Desktop);
}

/// 至少一次：认领而未打标的事件在下一次认领中再次出现
#[tokio::test]
async fn test_claim_without_mark_is_reclaimable() {
    let (storage, _td) = create_temp_storage().await;
    storage.append(click("L1")).await.unwrap();

    let first = storage.claim_batch(10).await.unwrap();
    assert_eq!(first.len(), 1);

    // 模拟崩溃：不 mark_processed，直接再次认领
    let second = storage.claim_batch(10).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, first[0].id);
}

#[tokio::test]
async fn test_marked_events_are_not_reclaimed() {
    let (storage, _td) = create_temp_storage().await;
    storage.append(click("L1")).await.unwrap();
    storage.append(click("L2")).await.unwrap();

    let claimed = storage.claim_batch(10).await.unwrap();
    let ids: Vec<i64> = claimed.iter().map(|s| s.id).collect();
    storage.mark_processed(&ids).await.unwrap();

    assert!(storage.claim_batch(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_claim_respects_limit() {
    let (storage, _td) = create_temp_storage().await;
    for _ in 0..5 {
        storage.append(click("L1")).await.unwrap();
    }

    assert_eq!(storage.claim_batch(3).await.unwrap().len(), 3);
    assert_eq!(storage.claim_batch(100).await.unwrap().len(), 5);
}

/// event_id 唯一索引：生产端重发同一事件不会产生重复行
#[tokio::test]
async fn test_duplicate_event_id_is_deduplicated() {
    let (storage, _td) = create_temp_storage().await;

    let event = click("L1");
    storage.append(event.clone()).await.unwrap();
    storage.append(event).await.unwrap();

    assert_eq!(storage.claim_batch(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_purge_deletes_only_expired_processed_events() {
    let (storage, _td) = create_temp_storage().await;

    // 三条事件：过期已处理 / 新近已处理 / 未处理
    for link in ["OLD", "RECENT", "PENDING"] {
        storage.append(click(link)).await.unwrap();
    }
    let claimed = storage.claim_batch(10).await.unwrap();
    let old_id = claimed.iter().find(|s| s.event.link_id == "OLD").unwrap().id;
    let recent_id = claimed
        .iter()
        .find(|s| s.event.link_id == "RECENT")
        .unwrap()
        .id;
    storage.mark_processed(&[old_id, recent_id]).await.unwrap();

    // 把 OLD 的处理时间改到保留期之外
    click_event::Entity::update_many()
        .col_expr(
            click_event::Column::ProcessedAt,
            Expr::value(Utc::now() - Duration::days(30)),
        )
        .filter(click_event::Column::Id.eq(old_id))
        .exec(storage.get_db())
        .await
        .unwrap();

    let deleted = storage.purge_processed(7, 100).await.unwrap();
    assert_eq!(deleted, 1);

    let remaining = click_event::Entity::find()
        .count(storage.get_db())
        .await
        .unwrap();
    assert_eq!(remaining, 2);

    // 未处理的事件仍可认领
    let claimable = storage.claim_batch(10).await.unwrap();
    assert_eq!(claimable.len(), 1);
    assert_eq!(claimable[0].event.link_id, "PENDING");
}

#[tokio::test]
async fn test_purge_on_empty_outbox() {
    let (storage, _td) = create_temp_storage().await;
    assert_eq!(storage.purge_processed(7, 100).await.unwrap(), 0);
}

/// OutboxEmitter.emit 等待持久化写入；事件随后可被认领
#[tokio::test]
async fn test_outbox_emitter_writes_through() {
    let (storage, _td) = create_temp_storage().await;
    let emitter = OutboxEmitter::new(Arc::clone(&storage));

    emitter.emit(click("L1")).await.unwrap();

    let claimed = storage.claim_batch(10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].event.link_id, "L1");
}

/// 全局发射器 + spawn_emit：调用方不等待，事件仍然落入 outbox
#[tokio::test]
async fn test_global_emitter_with_spawned_emit() {
    let (storage, _td) = create_temp_storage().await;

    set_global_click_emitter(Arc::new(OutboxEmitter::new(Arc::clone(&storage))));
    let emitter = get_click_emitter().expect("emitter just set");

    spawn_emit(Arc::clone(emitter), click("L9"));

    // 给分离任务一点时间完成写入
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let claimed = storage.claim_batch(10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].event.link_id, "L9");
}
