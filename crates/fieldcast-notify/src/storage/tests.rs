//! Storage layer tests for the notification engine.

use tokio_stream::StreamExt;

use super::db::{DatabaseError, NotifyDatabase};
use super::models::{DeliveryStatus, InboxKind};
use super::queries_delivery::NewDeliveryLog;
use super::queries_inbox::NewInboxNotification;
use super::queries_messages::{NewMessage, NewRecipient, ReadTransition};
use super::queries_providers::ProviderParams;

async fn test_db() -> NotifyDatabase {
    NotifyDatabase::open_in_memory().await.unwrap()
}

fn recipients(ids: &[&str]) -> Vec<NewRecipient> {
    ids.iter()
        .map(|id| NewRecipient {
            id: format!("rec-{id}"),
            recipient_id: (*id).to_string(),
            membership_id: format!("mem-{id}"),
        })
        .collect()
}

async fn seed_message(db: &NotifyDatabase, id: &str, farm: &str, sent_at: i64, to: &[&str]) {
    db.create_message_with_recipients(
        &NewMessage {
            id,
            farm_id: farm,
            sender_id: "admin-1",
            title: "Harvest update",
            body: "Maize harvest is complete.",
            summary: None,
            media_refs: "[]",
            sent_at,
        },
        &recipients(to),
    )
    .await
    .unwrap();
}

// === Message tests ===

#[tokio::test]
async fn create_message_writes_recipient_records() {
    let db = test_db().await;
    seed_message(&db, "m1", "farm-1", 1_000, &["u1", "u2", "u3"]).await;

    let message = db.get_message("m1").await.unwrap();
    assert_eq!(message.recipient_count, 3);
    assert_eq!(message.read_count, 0);

    let records = db.list_recipient_records("m1").await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| !r.is_read && r.read_at.is_none()));
    assert_eq!(records[0].membership_id, "mem-u1");
}

#[tokio::test]
async fn duplicate_recipient_rolls_back_whole_message() {
    let db = test_db().await;
    let mut dupes = recipients(&["u1", "u2"]);
    dupes.push(NewRecipient {
        id: "rec-again".into(),
        recipient_id: "u1".into(),
        membership_id: "mem-other".into(),
    });

    let result = db
        .create_message_with_recipients(
            &NewMessage {
                id: "m1",
                farm_id: "farm-1",
                sender_id: "admin-1",
                title: "t",
                body: "b",
                summary: None,
                media_refs: "[]",
                sent_at: 1,
            },
            &dupes,
        )
        .await;

    assert!(result.is_err());
    assert!(db.find_message("m1").await.unwrap().is_none());
    assert_eq!(db.count_recipient_records(None).await.unwrap(), 0);
}

#[tokio::test]
async fn get_missing_message_is_not_found() {
    let db = test_db().await;
    let err = db.get_message("nope").await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound(_)));
}

#[tokio::test]
async fn farm_messages_are_newest_first() {
    let db = test_db().await;
    seed_message(&db, "m1", "farm-1", 100, &["u1"]).await;
    seed_message(&db, "m2", "farm-1", 300, &["u1"]).await;
    seed_message(&db, "m3", "farm-2", 200, &["u1"]).await;

    let messages = db.list_messages_for_farm("farm-1").await.unwrap();
    let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m2", "m1"]);
    assert_eq!(db.count_messages_for_farm("farm-2").await.unwrap(), 1);
}

// === Read tracking tests ===

#[tokio::test]
async fn mark_read_is_idempotent() {
    let db = test_db().await;
    seed_message(&db, "m1", "farm-1", 100, &["u1", "u2"]).await;

    assert_eq!(
        db.mark_recipient_read("m1", "u1", 500).await.unwrap(),
        ReadTransition::Marked
    );
    assert_eq!(
        db.mark_recipient_read("m1", "u1", 600).await.unwrap(),
        ReadTransition::AlreadyRead
    );

    let message = db.get_message("m1").await.unwrap();
    assert_eq!(message.read_count, 1);

    let record = db.get_recipient_record("m1", "u1").await.unwrap().unwrap();
    assert!(record.is_read);
    assert_eq!(record.read_at, Some(500));
}

#[tokio::test]
async fn mark_read_distinguishes_missing_record_from_missing_message() {
    let db = test_db().await;
    seed_message(&db, "m1", "farm-1", 100, &["u1"]).await;

    assert_eq!(
        db.mark_recipient_read("m1", "stranger", 1).await.unwrap(),
        ReadTransition::MissingRecord
    );
    assert_eq!(
        db.mark_recipient_read("ghost", "u1", 1).await.unwrap(),
        ReadTransition::MissingMessage
    );
    assert_eq!(db.get_message("m1").await.unwrap().read_count, 0);
}

#[tokio::test]
async fn recipient_stream_is_newest_first_with_read_state() {
    let db = test_db().await;
    seed_message(&db, "m1", "farm-1", 100, &["u1"]).await;
    seed_message(&db, "m2", "farm-2", 200, &["u1", "u2"]).await;
    seed_message(&db, "m3", "farm-1", 300, &["u2"]).await;
    db.mark_recipient_read("m1", "u1", 150).await.unwrap();

    let entries: Vec<_> = db
        .stream_messages_for_recipient("u1")
        .collect::<Result<Vec<_>, _>>()
        .await
        .unwrap();

    let ids: Vec<_> = entries.iter().map(|e| e.message.id.as_str()).collect();
    assert_eq!(ids, ["m2", "m1"]);
    assert!(!entries[0].is_read);
    assert!(entries[1].is_read);
    assert_eq!(entries[1].read_at, Some(150));
}

// === Delivery log tests ===

fn log_params<'a>(id: &'a str, channel: &'a str, status: DeliveryStatus) -> NewDeliveryLog<'a> {
    NewDeliveryLog {
        id,
        channel,
        recipient_id: "u1",
        broadcast_id: Some("m1"),
        farm_id: Some("farm-1"),
        subject: "s",
        content: "c",
        status,
        priority: "normal",
        external_id: None,
        provider_id: None,
        fallback_used: false,
        error: None,
        created_at: 10,
    }
}

#[tokio::test]
async fn delivery_log_rejects_updates_and_deletes() {
    let db = test_db().await;
    db.append_delivery_log(&log_params("d1", "internal", DeliveryStatus::Delivered))
        .await
        .unwrap();

    let update = sqlx::query("UPDATE delivery_log SET status = 'failed' WHERE id = 'd1'")
        .execute(db.pool())
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM delivery_log WHERE id = 'd1'")
        .execute(db.pool())
        .await;
    assert!(delete.is_err());

    let entry = db.get_delivery_log("d1").await.unwrap();
    assert_eq!(entry.status, "delivered");
}

#[tokio::test]
async fn delivery_log_filters_by_recipient_and_limit() {
    let db = test_db().await;
    for i in 0..4 {
        let id = format!("d{i}");
        let mut params = log_params(&id, "sms", DeliveryStatus::Pending);
        params.created_at = i;
        db.append_delivery_log(&params).await.unwrap();
    }
    let mut other = log_params("dx", "internal", DeliveryStatus::Delivered);
    other.recipient_id = "u9";
    db.append_delivery_log(&other).await.unwrap();

    let latest = db.list_delivery_log(Some("u1"), 2).await.unwrap();
    let ids: Vec<_> = latest.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["d3", "d2"]);
    assert_eq!(db.list_delivery_log(None, 100).await.unwrap().len(), 5);
}

#[tokio::test]
async fn delivery_log_rejects_unknown_channel() {
    let db = test_db().await;
    let result = db
        .append_delivery_log(&log_params("d1", "fax", DeliveryStatus::Failed))
        .await;
    assert!(result.is_err());
}

// === Provider tests ===

fn provider<'a>(id: &'a str, channel: &'a str, priority: i64, now: i64) -> ProviderParams<'a> {
    ProviderParams {
        id,
        channel_type: channel,
        provider_name: "Carrier",
        is_active: true,
        priority,
        config: "{}",
        now,
    }
}

#[tokio::test]
async fn active_providers_are_ordered_by_priority() {
    let db = test_db().await;
    db.upsert_provider(&provider("p-low", "sms", 1, 10)).await.unwrap();
    db.upsert_provider(&provider("p-high", "sms", 5, 20)).await.unwrap();
    db.upsert_provider(&provider("p-wa", "whatsapp", 3, 30)).await.unwrap();
    db.set_provider_active("p-wa", false, 40).await.unwrap();

    let active = db.list_active_providers().await.unwrap();
    let ids: Vec<_> = active.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["p-high", "p-low"]);

    assert!(db.list_active_providers_for("whatsapp").await.unwrap().is_empty());
    assert_eq!(db.list_providers().await.unwrap().len(), 3);
}

#[tokio::test]
async fn upsert_provider_keeps_created_at() {
    let db = test_db().await;
    db.upsert_provider(&provider("p1", "sms", 1, 10)).await.unwrap();
    let updated = db.upsert_provider(&provider("p1", "sms", 9, 50)).await.unwrap();

    assert_eq!(updated.priority, 9);
    assert_eq!(updated.created_at, 10);
    assert_eq!(updated.updated_at, 50);
}

#[tokio::test]
async fn internal_channel_cannot_have_a_provider() {
    let db = test_db().await;
    assert!(db.upsert_provider(&provider("p1", "internal", 1, 10)).await.is_err());
}

#[tokio::test]
async fn toggling_missing_provider_is_not_found() {
    let db = test_db().await;
    let err = db.set_provider_active("ghost", true, 1).await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound(_)));
}

// === Inbox tests ===

fn inbox<'a>(id: &'a str, kind: InboxKind, created_at: i64) -> NewInboxNotification<'a> {
    NewInboxNotification {
        id,
        recipient_id: "u1",
        farm_id: Some("farm-1"),
        broadcast_id: None,
        kind,
        subject: "Hello",
        body: "World",
        priority: "normal",
        created_at,
    }
}

#[tokio::test]
async fn inbox_counts_and_marks_unread() {
    let db = test_db().await;
    db.create_inbox_notification(&inbox("n1", InboxKind::Direct, 1))
        .await
        .unwrap();
    db.create_inbox_notification(&inbox("n2", InboxKind::Broadcast, 2))
        .await
        .unwrap();

    assert_eq!(db.unread_inbox_count("u1").await.unwrap(), 2);

    assert!(db.mark_inbox_read("n1", 5).await.unwrap());
    assert!(!db.mark_inbox_read("n1", 6).await.unwrap());

    let unread = db.list_inbox("u1", true).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].id, "n2");
    assert_eq!(unread[0].kind, "broadcast");

    let all = db.list_inbox("u1", false).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].read_at, Some(5));
}

#[tokio::test]
async fn mark_missing_inbox_entry_is_not_found() {
    let db = test_db().await;
    let err = db.mark_inbox_read("ghost", 1).await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound(_)));
}

// === Statistics tests ===

#[tokio::test]
async fn sender_totals_aggregate_messages() {
    let db = test_db().await;
    seed_message(&db, "m1", "farm-1", 100, &["u1", "u2"]).await;
    seed_message(&db, "m2", "farm-2", 300, &["u1"]).await;
    db.mark_recipient_read("m1", "u1", 150).await.unwrap();

    let totals = db.sender_totals("admin-1").await.unwrap();
    assert_eq!(totals.total_messages, 2);
    assert_eq!(totals.total_recipients, 3);
    assert_eq!(totals.total_reads, 1);
    assert_eq!(totals.distinct_farms, 2);
    assert_eq!(totals.last_sent_at, Some(300));

    let empty = db.sender_totals("nobody").await.unwrap();
    assert_eq!(empty.total_messages, 0);
    assert_eq!(empty.last_sent_at, None);
}

#[tokio::test]
async fn system_totals_bucket_recent_messages() {
    let db = test_db().await;
    let now = 100 * 86_400;
    seed_message(&db, "old", "farm-1", now - 40 * 86_400, &["u1"]).await;
    seed_message(&db, "month", "farm-2", now - 10 * 86_400, &["u1", "u2"]).await;
    seed_message(&db, "week", "farm-2", now - 86_400, &["u3"]).await;
    db.mark_recipient_read("month", "u2", now).await.unwrap();

    let totals = db.system_totals(now).await.unwrap();
    assert_eq!(totals.total_messages, 3);
    assert_eq!(totals.total_recipient_records, 4);
    assert_eq!(totals.total_read_records, 1);
    assert_eq!(totals.distinct_farms, 2);
    assert_eq!(totals.distinct_senders, 1);
    assert_eq!(totals.messages_last_7_days, 1);
    assert_eq!(totals.messages_last_30_days, 2);
}

#[tokio::test]
async fn delivery_outcomes_group_by_channel_and_status() {
    let db = test_db().await;
    db.append_delivery_log(&log_params("d1", "sms", DeliveryStatus::Pending))
        .await
        .unwrap();
    let mut fallback = log_params("d2", "internal", DeliveryStatus::Delivered);
    fallback.fallback_used = true;
    db.append_delivery_log(&fallback).await.unwrap();
    db.append_delivery_log(&log_params("d3", "internal", DeliveryStatus::Delivered))
        .await
        .unwrap();

    let counts = db.delivery_outcome_counts().await.unwrap();
    assert_eq!(counts.len(), 2);
    assert_eq!(counts[0].channel, "internal");
    assert_eq!(counts[0].count, 2);
    assert_eq!(counts[1].status, "pending");
    assert_eq!(db.fallback_delivery_count().await.unwrap(), 1);
}
