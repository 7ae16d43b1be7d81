use std::env;
use uuid::Uuid;

use chrono::Utc;
use cin_lookup_api::auth::{create_account, hash_password, promote_to_admin, NewAccount};
use cin_lookup_api::csv_import::parse_csv;
use cin_lookup_api::db::Database;
use cin_lookup_api::db_storage::{PgUnlockStore, RecordPatch, RecordStorage};
use cin_lookup_api::errors::AppError;
use cin_lookup_api::models::{UnlockOrder, UnlockPaymentRecord};
use cin_lookup_api::services::RegistryService;
use cin_lookup_api::unlock::UnlockStore;
use moka::future::Cache;

/// Storage tests against a real Postgres.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
async fn test_db() -> anyhow::Result<Database> {
    let db_url = env::var("TEST_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL to run this test"))?;
    Database::new(&db_url).await
}

/// A CIN that will not collide with earlier runs.
fn unique_cin() -> String {
    format!(
        "U{:05}DL2024PTC{:06}",
        Uuid::new_v4().as_u128() % 100_000,
        Uuid::new_v4().as_u128() % 1_000_000
    )
}

fn unique_din() -> String {
    format!("{:07}", 1 + Uuid::new_v4().as_u128() % 9_999_998)
}

fn batch(cin: &str, din: &str) -> String {
    format!(
        "cin,company_name,din,first_name,last_name,director_email\n\
         {},Storage Test Private Limited,{},Meera,Iyer,meera@example.com\n",
        cin.to_lowercase(),
        din
    )
}

#[tokio::test]
#[ignore]
async fn reimport_same_name_rejected_new_name_accepted() -> anyhow::Result<()> {
    let db = test_db().await?;
    let storage = RecordStorage::new(db.pool.clone());
    let cin = unique_cin();
    let din = unique_din();
    let csv = batch(&cin, &din);

    let first_name = format!("storage-{}.csv", Uuid::new_v4());
    let report = storage
        .import(&first_name, parse_csv(csv.as_bytes(), &first_name)?, None)
        .await?;
    assert_eq!(report.rows_inserted, 1);
    assert_eq!(report.rows_duplicate, 0);

    // Same file name again
    let err = storage
        .import(&first_name, parse_csv(csv.as_bytes(), &first_name)?, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Same content under a new name is a separate batch
    let second_name = format!("storage-{}.csv", Uuid::new_v4());
    let report = storage
        .import(&second_name, parse_csv(csv.as_bytes(), &second_name)?, None)
        .await?;
    assert_eq!(report.rows_inserted, 1);

    let service = RegistryService::new(db.pool.clone(), Cache::new(100));
    let profile = service.company_by_cin(&cin.to_lowercase()).await?;
    assert_eq!(profile.cin, cin);
    assert_eq!(profile.appointments.len(), 2);
    assert_ne!(
        profile.company.director_email.as_deref(),
        Some("meera@example.com")
    );

    let padded = format!("{:0>8}", din);
    let director = service.director_by_din(&din, None).await?;
    assert_eq!(director.din, padded);
    assert!(!director.contacts_unlocked);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn admin_update_and_delete() -> anyhow::Result<()> {
    let db = test_db().await?;
    let storage = RecordStorage::new(db.pool.clone());
    let cin = unique_cin();
    let name = format!("storage-{}.csv", Uuid::new_v4());
    storage
        .import(&name, parse_csv(batch(&cin, &unique_din()).as_bytes(), &name)?, None)
        .await?;

    let service = RegistryService::new(db.pool.clone(), Cache::new(100));
    let id = service.company_by_cin(&cin).await?.company.id;

    let patch = RecordPatch::from_json(serde_json::json!({ "company_status": "Strike Off" }))?;
    let updated = storage.update(id, &patch).await?;
    assert_eq!(updated.company_status.as_deref(), Some("Strike Off"));
    assert!(updated.updated_at.is_some());
    assert_eq!(updated.cin, cin);

    let deleted = storage.delete(id).await?;
    assert_eq!(deleted.id, id);
    assert!(matches!(storage.get(id).await, Err(AppError::NotFound(_))));
    Ok(())
}

#[tokio::test]
#[ignore]
async fn payment_insert_is_unique_per_payment_id() -> anyhow::Result<()> {
    let db = test_db().await?;
    let store = PgUnlockStore::new(db.pool.clone());

    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, name, password_hash) VALUES ($1, $2, 'Test', 'x')")
        .bind(user_id)
        .bind(format!("{}@example.com", user_id))
        .execute(&db.pool)
        .await?;

    let order = UnlockOrder {
        order_id: format!("order_{}", Uuid::new_v4().simple()),
        user_id,
        din: "01234567".to_string(),
        amount: 10000,
        currency: "INR".to_string(),
        receipt: "unlock_01234567_1".to_string(),
        payer_name: "Test".to_string(),
        payer_email: "test@example.com".to_string(),
        payer_phone: None,
        status: "created".to_string(),
        failure_reason: None,
        created_at: Utc::now(),
        updated_at: None,
    };
    store.insert_order(&order).await?;

    let payment = UnlockPaymentRecord {
        id: Uuid::new_v4(),
        user_id,
        payer_name: order.payer_name.clone(),
        payer_email: order.payer_email.clone(),
        payer_phone: None,
        order_id: order.order_id.clone(),
        payment_id: format!("pay_{}", Uuid::new_v4().simple()),
        signature: Some("sig".to_string()),
        amount: 10000,
        currency: "INR".to_string(),
        status: "paid".to_string(),
        din: order.din.clone(),
        source: "checkout".to_string(),
        created_at: Utc::now(),
    };

    assert!(store.insert_payment(&payment).await?);
    let mut again = payment.clone();
    again.id = Uuid::new_v4();
    assert!(!store.insert_payment(&again).await?);

    let history = store.payments_for_user(user_id).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].payment_id, payment.payment_id);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn registration_never_grants_admin() -> anyhow::Result<()> {
    let db = test_db().await?;
    let email = format!("first-{}@example.com", Uuid::new_v4());
    let account = NewAccount {
        email: email.clone(),
        name: "First Caller".to_string(),
        phone: None,
    };
    let password_hash = hash_password("correct horse")
        .map_err(|e| anyhow::anyhow!("hashing failed: {}", e))?;

    let user = create_account(&db.pool, &account, &password_hash).await?;
    assert!(!user.is_admin);

    let again = create_account(&db.pool, &account, &password_hash).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let promoted = promote_to_admin(&db.pool, &email.to_uppercase()).await?;
    assert_eq!(promoted.id, user.id);
    assert!(promoted.is_admin);

    let missing = promote_to_admin(&db.pool, "nobody-here@example.com").await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
    Ok(())
}
