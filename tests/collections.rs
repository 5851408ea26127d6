mod common;

use std::sync::Arc;

use serde_json::json;

use tcg_records::{
    models::{NewPlayer, PlayerChanges, PromoChanges},
    storage::{Filter, StoreOp},
    AppError, Cards, MemoryBlobStorage, Players, Promos, Status,
};

use common::{U1, U2};

fn players(store: &Arc<tcg_records::MemoryStore>) -> Players {
    let blobs = Arc::new(MemoryBlobStorage::new("http://blobs.local/profile-pics"));
    Players::new(store.clone(), common::ids("player"), blobs)
}

#[tokio::test]
async fn adding_a_promo_returns_it_with_generated_fields() {
    let store = common::store();
    let promos = Promos::new(store.clone(), common::ids("promo"));
    common::sign_in(&promos, U1);
    let before = promos.len();

    let promo = promos.add(common::booster_bonus()).await.unwrap();

    assert_eq!(promo.promo_id, "promo-1");
    assert_eq!(promo.user_id, U1);
    assert_eq!(promo.title, "Booster Bonus");
    assert_eq!(promo.qty, 1);
    assert_eq!(promo.free.as_deref(), Some("1 sleeve"));
    assert_eq!(promo.price, 9.99);
    assert_eq!(promos.len(), before + 1);
    assert_eq!(promos.status(), Status::Idle);
    assert_eq!(store.count_calls(StoreOp::Insert, "promo"), 1);
}

#[tokio::test]
async fn added_promo_reads_back_by_id() {
    let store = common::store();
    let promos = Promos::new(store.clone(), common::ids("promo"));
    common::sign_in(&promos, U1);

    let added = promos.add(common::booster_bonus()).await.unwrap();
    let fetched = promos.fetch_one(&added.promo_id).await.unwrap();

    assert_eq!(fetched, added);
    assert_eq!(promos.len(), 1);
}

#[tokio::test]
async fn prices_are_rounded_before_sending() {
    let store = common::store();
    let promos = Promos::new(store.clone(), common::ids("promo"));
    common::sign_in(&promos, U1);

    let promo = promos.add(common::promo("Pack Deal", 4.999)).await.unwrap();

    assert_eq!(promo.price, 5.0);
    assert_eq!(store.rows("promo")[0]["price"], json!(5.0));
}

#[tokio::test]
async fn newest_rows_come_first() {
    let store = common::store();
    let promos = Promos::new(store.clone(), common::ids("promo"));
    common::sign_in(&promos, U1);

    promos.add(common::promo("First", 1.0)).await.unwrap();
    promos.add(common::promo("Second", 2.0)).await.unwrap();
    let local: Vec<String> = promos.items().into_iter().map(|p| p.title).collect();
    assert_eq!(local, vec!["Second", "First"]);

    assert!(promos.refetch().await);
    let fetched: Vec<String> = promos.items().into_iter().map(|p| p.title).collect();
    assert_eq!(fetched, local);
}

#[tokio::test]
async fn duplicate_player_name_is_rejected_without_insert() {
    let store = common::store();
    let players = players(&store);
    common::sign_in(&players, U1);
    players.add(NewPlayer::named("Alex")).await.unwrap();
    store.clear_calls();

    let result = players.add(NewPlayer::named("Alex")).await;

    assert!(result.is_none());
    assert!(players.error().unwrap().contains("name"));
    assert_eq!(
        players.last_error(),
        Some(AppError::Duplicate {
            field: "name".to_string()
        })
    );
    assert_eq!(store.count_calls(StoreOp::Insert, "players"), 0);
    assert_eq!(players.len(), 1);
}

#[tokio::test]
async fn renaming_onto_another_player_is_rejected() {
    let store = common::store();
    let players = players(&store);
    common::sign_in(&players, U1);
    let alex = players.add(NewPlayer::named("Alex")).await.unwrap();
    let bea = players.add(NewPlayer::named("Bea")).await.unwrap();

    let clash = PlayerChanges {
        name: Some("Alex".to_string()),
        ..Default::default()
    };
    assert!(players.update(&bea.player_id, &clash).await.is_none());
    assert_eq!(
        players.error().as_deref(),
        Some("Another record with the same name already exists.")
    );
    assert_eq!(store.count_calls(StoreOp::Update, "players"), 0);

    let same = PlayerChanges {
        name: Some("Alex".to_string()),
        address: Some(Some("12 Main St".to_string())),
        ..Default::default()
    };
    let updated = players.update(&alex.player_id, &same).await.unwrap();
    assert_eq!(updated.address.as_deref(), Some("12 Main St"));
    assert_eq!(players.get(&alex.player_id), Some(updated));
    assert_eq!(players.error(), None);
}

#[tokio::test]
async fn batch_with_a_repeated_name_is_rejected_without_insert() {
    let store = common::store();
    let players = players(&store);
    common::sign_in(&players, U1);

    let batch = vec![NewPlayer::named("Alex"), NewPlayer::named("Alex")];
    assert!(players.add_many(batch).await.is_none());

    assert_eq!(
        players.last_error(),
        Some(AppError::Duplicate {
            field: "name".to_string()
        })
    );
    assert_eq!(store.count_calls(StoreOp::Insert, "players"), 0);
    assert!(players.is_empty());
}

#[tokio::test]
async fn batch_colliding_with_a_listed_player_is_rejected() {
    let store = common::store();
    let players = players(&store);
    common::sign_in(&players, U1);
    players.add(NewPlayer::named("Alex")).await.unwrap();
    let before = players.items();
    store.clear_calls();

    let batch = vec![NewPlayer::named("Bea"), NewPlayer::named("Alex")];
    assert!(players.add_many(batch).await.is_none());

    assert_eq!(
        players.last_error(),
        Some(AppError::Duplicate {
            field: "name".to_string()
        })
    );
    assert_eq!(store.count_calls(StoreOp::Insert, "players"), 0);
    assert_eq!(players.items(), before);
}

#[tokio::test]
async fn same_name_is_allowed_for_different_owners() {
    let store = common::store();
    let players = players(&store);
    common::sign_in(&players, U1);
    players.add(NewPlayer::named("Alex")).await.unwrap();

    common::sign_in(&players, U2);
    assert!(players.refetch().await);
    let other = players.add(NewPlayer::named("Alex")).await;

    assert_eq!(other.map(|p| p.user_id).as_deref(), Some(U2));
}

#[tokio::test]
async fn updating_a_missing_row_records_not_found() {
    let store = common::store();
    let promos = Promos::new(store.clone(), common::ids("promo"));
    common::sign_in(&promos, U1);

    let changes = PromoChanges {
        qty: Some(3),
        ..Default::default()
    };
    assert!(promos.update("promo-404", &changes).await.is_none());
    assert_eq!(
        promos.last_error(),
        Some(AppError::NotFound("No promo found with id promo-404".to_string()))
    );
}

#[tokio::test]
async fn fetch_one_does_not_see_other_owners_rows() {
    let store = common::store();
    let promos = Promos::new(store.clone(), common::ids("promo"));
    common::sign_in(&promos, U1);
    let promo = promos.add(common::booster_bonus()).await.unwrap();

    common::sign_in(&promos, U2);
    assert!(promos.fetch_one(&promo.promo_id).await.is_none());
    assert!(matches!(promos.last_error(), Some(AppError::NotFound(_))));
}

#[tokio::test]
async fn operations_without_identity_make_no_remote_calls() {
    let store = common::store();
    let promos = Promos::new(store.clone(), common::ids("promo"));

    assert!(promos.add(common::booster_bonus()).await.is_none());
    assert_eq!(
        promos.error().as_deref(),
        Some("Not authenticated. Please log in to add a promo.")
    );
    assert!(!promos.remove("promo-1").await);
    assert_eq!(
        promos.error().as_deref(),
        Some("Not authenticated. Please log in to delete a promo.")
    );

    promos.clear_error();
    assert!(!promos.refetch().await);
    assert_eq!(promos.error(), None);
    assert!(!promos.loading());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn update_without_identity_reports_authentication_before_validation() {
    let store = common::store();
    let players = players(&store);

    let blank = PlayerChanges {
        name: Some("  ".to_string()),
        ..Default::default()
    };
    assert!(players.update("player-1", &blank).await.is_none());

    assert_eq!(
        players.last_error(),
        Some(AppError::NotAuthenticated("update a player".to_string()))
    );
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn remote_failure_keeps_the_list_until_error_is_cleared() {
    let store = common::store();
    let promos = Promos::new(store.clone(), common::ids("promo"));
    common::sign_in(&promos, U1);
    promos.add(common::promo("First", 1.0)).await.unwrap();
    promos.add(common::promo("Second", 2.0)).await.unwrap();
    let before = promos.items();

    store.fail_relation("promo", "connection reset by peer");
    assert!(!promos.refetch().await);
    assert_eq!(promos.error().as_deref(), Some("connection reset by peer"));
    assert_eq!(promos.status(), Status::Error("connection reset by peer".to_string()));
    assert_eq!(promos.items(), before);

    assert!(promos.add(common::promo("Third", 3.0)).await.is_none());
    assert_eq!(promos.items(), before);

    promos.clear_error();
    assert_eq!(promos.status(), Status::Idle);
    assert_eq!(promos.items(), before);

    store.restore_relation("promo");
    assert!(promos.refetch().await);
    assert_eq!(promos.len(), 2);
}

#[tokio::test]
async fn invalid_payloads_fail_before_any_remote_call() {
    let store = common::store();
    let promos = Promos::new(store.clone(), common::ids("promo"));
    common::sign_in(&promos, U1);

    assert!(promos.add(common::promo("Bad", -1.0)).await.is_none());
    assert!(matches!(promos.last_error(), Some(AppError::Validation(_))));

    let players = players(&store);
    common::sign_in(&players, U1);
    assert!(players.add(NewPlayer::named("  ")).await.is_none());
    assert!(matches!(players.last_error(), Some(AppError::Validation(_))));

    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn fetch_accepts_an_extra_filter() {
    let store = common::store();
    let promos = Promos::new(store.clone(), common::ids("promo"));
    common::sign_in(&promos, U1);
    promos.add(common::booster_bonus()).await.unwrap();
    promos.add(common::promo("Pack Deal", 3.0)).await.unwrap();

    assert!(promos.fetch(Some(Filter::eq("title", "Pack Deal"))).await);

    let titles: Vec<String> = promos.items().into_iter().map(|p| p.title).collect();
    assert_eq!(titles, vec!["Pack Deal"]);
}

#[tokio::test]
async fn removing_drops_the_row_locally_and_remotely() {
    let store = common::store();
    let promos = Promos::new(store.clone(), common::ids("promo"));
    common::sign_in(&promos, U1);
    let keep = promos.add(common::promo("Keep", 1.0)).await.unwrap();
    let gone = promos.add(common::promo("Gone", 1.0)).await.unwrap();

    assert!(promos.remove(&gone.promo_id).await);

    assert_eq!(promos.items(), vec![keep]);
    assert_eq!(store.rows("promo").len(), 1);
    assert!(promos.remove(&gone.promo_id).await);
}

#[tokio::test]
async fn card_import_inserts_one_batch_ahead_of_existing_cards() {
    let store = common::store();
    let cards = Cards::new(store.clone(), common::ids("card"));
    common::sign_in(&cards, U1);
    cards.add(common::card("BS-001", "Alakazam")).await.unwrap();
    store.clear_calls();

    let file = r#"[
        { "box_name": "Jungle", "display_name": "Snorlax", "card_code": "JU-011", "image_filename": "snorlax.png" },
        { "box_name": "Jungle", "display_name": "Scyther", "card_code": "JU-010", "image_filename": "" }
    ]"#;
    let imported = cards.import_json(file).await.unwrap();

    assert_eq!(imported.len(), 2);
    assert_eq!(store.count_calls(StoreOp::Insert, "cards"), 1);
    assert_eq!(imported[0].image_name.as_deref(), Some("snorlax.png"));
    assert_eq!(imported[1].image_name, None);
    assert!(imported.iter().all(|card| card.user_id == U1));

    let names: Vec<String> = cards.items().into_iter().map(|c| c.display_name).collect();
    assert_eq!(names, vec!["Snorlax", "Scyther", "Alakazam"]);
}

#[tokio::test]
async fn malformed_or_empty_imports_make_no_insert() {
    let store = common::store();
    let cards = Cards::new(store.clone(), common::ids("card"));
    common::sign_in(&cards, U1);

    assert!(cards.import_json("{ not json").await.is_none());
    assert!(matches!(cards.last_error(), Some(AppError::Validation(_))));

    assert_eq!(cards.import_json("[]").await, Some(Vec::new()));
    assert_eq!(cards.error(), None);
    assert!(store.calls().is_empty());
}
