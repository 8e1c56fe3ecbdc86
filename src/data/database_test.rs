//! Database tests

use super::*;
use chrono::Utc;
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

fn test_business(account_id: &str) -> Business {
    Business {
        id: EntityId::new().0,
        account_id: account_id.to_string(),
        name: "Harbor Bistro".to_string(),
        industry: "restaurant".to_string(),
        description: Some("Seafood on the waterfront".to_string()),
        location: Some("Portland, ME".to_string()),
        website: None,
        tagline: Some("Fresh off the boat".to_string()),
        brand_primary_color: Some("#1F6FEB".to_string()),
        brand_secondary_color: None,
        preferred_styles: r#"["lifestyle"]"#.to_string(),
        avoided_styles: r#"["illustration"]"#.to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn test_text(account_id: &str, business_id: &str) -> GeneratedTextRecord {
    GeneratedTextRecord {
        id: EntityId::new().0,
        account_id: account_id.to_string(),
        business_id: business_id.to_string(),
        kind: ContentKind::BusinessUpdate.as_str().to_string(),
        topic: "new patio opens".to_string(),
        tone: Some("friendly".to_string()),
        content: "Our patio is open!".to_string(),
        content_format: "plain".to_string(),
        draft_id: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_database_connection() {
    let (_db, _temp_dir) = create_test_db().await;
    // Connection successful if we get here without panicking
}

#[tokio::test]
async fn test_account_upsert_refreshes_plan() {
    let (db, _temp_dir) = create_test_db().await;

    let account = db.upsert_account("acct-1", PlanTier::Free).await.unwrap();
    assert_eq!(account.plan_tier(), PlanTier::Free);

    let account = db.upsert_account("acct-1", PlanTier::Pro).await.unwrap();
    assert_eq!(account.plan_tier(), PlanTier::Pro);
}

#[tokio::test]
async fn test_usage_increment_respects_limit() {
    let (db, _temp_dir) = create_test_db().await;
    db.upsert_account("acct-1", PlanTier::Free).await.unwrap();

    for _ in 0..2 {
        assert!(
            db.try_increment_usage("acct-1", "2026-10", UsageCounter::Content, Some(2))
                .await
                .unwrap()
        );
    }
    assert!(
        !db.try_increment_usage("acct-1", "2026-10", UsageCounter::Content, Some(2))
            .await
            .unwrap()
    );

    let usage = db.get_usage("acct-1", "2026-10").await.unwrap();
    assert_eq!(usage.content_count, 2);
    assert_eq!(usage.image_count, 0);

    // A new period starts from zero
    let next = db.get_usage("acct-1", "2026-11").await.unwrap();
    assert_eq!(next.content_count, 0);
}

#[tokio::test]
async fn test_usage_decrement_floors_at_zero() {
    let (db, _temp_dir) = create_test_db().await;
    db.upsert_account("acct-1", PlanTier::Free).await.unwrap();

    assert!(
        db.try_increment_usage("acct-1", "2026-10", UsageCounter::Image, None)
            .await
            .unwrap()
    );
    db.decrement_usage("acct-1", "2026-10", UsageCounter::Image)
        .await
        .unwrap();
    db.decrement_usage("acct-1", "2026-10", UsageCounter::Image)
        .await
        .unwrap();

    let usage = db.get_usage("acct-1", "2026-10").await.unwrap();
    assert_eq!(usage.image_count, 0);
}

#[tokio::test]
async fn test_business_is_scoped_to_account() {
    let (db, _temp_dir) = create_test_db().await;
    db.upsert_account("acct-1", PlanTier::Free).await.unwrap();

    let business = test_business("acct-1");
    db.insert_business(&business).await.unwrap();

    let found = db.get_business("acct-1", &business.id).await.unwrap();
    assert_eq!(found.unwrap().preferred_style_names(), vec!["lifestyle"]);

    let other = db.get_business("acct-2", &business.id).await.unwrap();
    assert!(other.is_none());
}

#[tokio::test]
async fn test_draft_links_records() {
    let (db, _temp_dir) = create_test_db().await;
    db.upsert_account("acct-1", PlanTier::Free).await.unwrap();
    let business = test_business("acct-1");
    db.insert_business(&business).await.unwrap();

    let text = test_text("acct-1", &business.id);
    db.insert_generated_text(&text).await.unwrap();

    let draft = Draft {
        id: EntityId::new().0,
        account_id: "acct-1".to_string(),
        business_id: business.id.clone(),
        kind: text.kind.clone(),
        topic: text.topic.clone(),
        text_id: Some(text.id.clone()),
        image_id: None,
        created_at: Utc::now(),
    };
    db.insert_draft_with_links(&draft).await.unwrap();

    let stored = db.get_generated_text(&text.id).await.unwrap().unwrap();
    assert_eq!(stored.draft_id.as_deref(), Some(draft.id.as_str()));

    let fetched = db.get_draft("acct-1", &draft.id).await.unwrap().unwrap();
    assert_eq!(fetched.text_id.as_deref(), Some(text.id.as_str()));
}

#[tokio::test]
async fn test_cancelled_draft_insert_is_all_or_nothing() {
    let (db, _temp_dir) = create_test_db().await;
    db.upsert_account("acct-1", PlanTier::Free).await.unwrap();
    let business = test_business("acct-1");
    db.insert_business(&business).await.unwrap();

    let draft_for = |text: &GeneratedTextRecord| Draft {
        id: EntityId::new().0,
        account_id: "acct-1".to_string(),
        business_id: business.id.clone(),
        kind: text.kind.clone(),
        topic: text.topic.clone(),
        text_id: Some(text.id.clone()),
        image_id: None,
        created_at: Utc::now(),
    };

    for step in 0..10u64 {
        let text = test_text("acct-1", &business.id);
        db.insert_generated_text(&text).await.unwrap();
        let draft = draft_for(&text);

        let budget = std::time::Duration::from_micros(step * 100);
        let _ = tokio::time::timeout(budget, db.insert_draft_with_links(&draft)).await;

        let stored_draft = db.get_draft("acct-1", &draft.id).await.unwrap();
        let stored_text = db.get_generated_text(&text.id).await.unwrap().unwrap();
        assert_eq!(stored_draft.is_some(), stored_text.draft_id.is_some());
    }

    // No connection is left holding an open write transaction
    let text = test_text("acct-1", &business.id);
    db.insert_generated_text(&text).await.unwrap();
    let draft = draft_for(&text);
    db.insert_draft_with_links(&draft).await.unwrap();
    assert!(db.get_draft("acct-1", &draft.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_set_draft_image_requires_owned_draft() {
    let (db, _temp_dir) = create_test_db().await;
    db.upsert_account("acct-1", PlanTier::Free).await.unwrap();

    let image = GeneratedImageRecord {
        id: EntityId::new().0,
        account_id: "acct-1".to_string(),
        business_id: "biz".to_string(),
        kind: "blog-post".to_string(),
        topic: "spring menu".to_string(),
        url: "https://images.example.com/a.jpg".to_string(),
        provenance: ImageProvenance::Stock.as_str().to_string(),
        style: None,
        size: None,
        prompt: None,
        revised_prompt: None,
        ai_trigger: None,
        product_composited: false,
        stages_applied: "[]".to_string(),
        background_removal_method: None,
        photographer_name: Some("Ana".to_string()),
        photographer_url: None,
        download_location: None,
        draft_id: None,
        created_at: Utc::now(),
    };
    db.insert_generated_image(&image).await.unwrap();

    let linked = db
        .set_draft_image("acct-1", "missing-draft", &image.id)
        .await
        .unwrap();
    assert!(!linked);

    let stored = db.get_generated_image(&image.id).await.unwrap().unwrap();
    assert!(stored.draft_id.is_none());
    assert!(!stored.product_composited);
}
