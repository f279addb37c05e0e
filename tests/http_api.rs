mod common;

use axum::http::StatusCode;
use chrono::NaiveDate;
use common::{datatable_uri, names, TestApp};
use people_db::person::{Criteria, EyeColor, NewPerson};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn list_returns_everyone_in_insertion_order() {
    let app = TestApp::with_fixtures().await;
    let (status, body) = app.get("/person").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body), vec!["Farid Ulyanov", "Salvador L. Witcher", "Kim Hu"]);
}

#[tokio::test]
async fn unknown_eye_color_is_a_client_error() {
    let app = TestApp::with_fixtures().await;

    for color in ["PURPLE", "blue", "Blue"] {
        let (status, body) = app.get(&format!("/person/eyes/{color}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{color}");
        assert!(body["error"].as_str().unwrap().contains("eye color"));
    }

    let (status, body) = app.get("/person/eyes/GREEN").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn non_numeric_year_is_a_client_error() {
    let app = TestApp::with_fixtures().await;
    let (status, body) = app.get("/person/birth/before/nineteen").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("year"));
}

#[tokio::test]
async fn year_past_the_calendar_range_matches_everyone() {
    let app = TestApp::with_fixtures().await;
    let (status, body) = app.get("/person/birth/before/300000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (status, body) = app.get("/person/birth/before/-300000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn store_failure_is_a_server_error_with_an_envelope() {
    let app = TestApp::with_fixtures().await;
    let table = app.data_dir().join("tables").join("person.tbl");
    std::fs::write(&table, [0u8, 1, 2]).unwrap();

    let (status, body) = app.get(&datatable_uri(4, 0, 10, Some("yan"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["draw"], 4);
    assert_eq!(body["recordsTotal"], 0);
    assert_eq!(body["recordsFiltered"], 0);
    assert_eq!(body["data"], json!([]));
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("store unavailable"));

    let (status, body) = app.get("/person").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("store unavailable"));

    let (status, _) = app.get("/person/eyes/BLUE").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn malformed_datatable_parameters_still_get_an_envelope() {
    let app = TestApp::with_fixtures().await;

    for uri in [
        "/person/datatable?draw=3&start=0".to_string(),
        "/person/datatable?draw=3&start=0&length=ten".to_string(),
        datatable_uri(3, -10, 10, None),
        datatable_uri(3, 0, -1, None),
    ] {
        let (status, body) = app.get(&uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["draw"], 3, "{uri}");
        assert_eq!(body["data"], json!([]), "{uri}");
        assert!(body["error"].is_string(), "{uri}");
    }

    let (status, body) = app.get("/person/datatable?draw=abc&length=10").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["draw"], 0);
}

#[tokio::test]
async fn absent_search_means_no_filter() {
    let app = TestApp::with_fixtures().await;
    let (status, body) = app.get(&datatable_uri(7, 0, 2, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recordsTotal"], 3);
    assert_eq!(body["recordsFiltered"], 3);
    assert_eq!(names(&body["data"]), vec!["Farid Ulyanov", "Salvador L. Witcher"]);

    let (_, body) = app.get(&datatable_uri(8, 2, 2, None)).await;
    assert_eq!(names(&body["data"]), vec!["Kim Hu"]);

    let (_, body) = app.get(&datatable_uri(9, 4, 2, None)).await;
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["recordsFiltered"], 3);
}

#[tokio::test]
async fn identical_queries_return_identical_envelopes() {
    let app = TestApp::with_fixtures().await;
    let uri = datatable_uri(11, 0, 2, Some("i"));
    let (_, first) = app.get(&uri).await;
    let (_, second) = app.get(&uri).await;
    assert_eq!(first, second);
    assert_eq!(first["draw"], 11);
}

#[tokio::test]
async fn insert_appears_once_and_bumps_the_total_by_one() {
    let app = TestApp::with_fixtures().await;

    let (status, created) = app
        .post_json(
            "/person",
            json!({"name": "Ada Lovelace", "birth": "1815-12-10", "eyes": "GREEN"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], 4);

    let (_, all) = app.get("/person").await;
    let matches = names(&all).iter().filter(|n| *n == "Ada Lovelace").count();
    assert_eq!(matches, 1);

    let (_, body) = app.get(&datatable_uri(1, 0, 10, None)).await;
    assert_eq!(body["recordsTotal"], 4);

    let (status, _) = app
        .post_json(
            "/person",
            json!({"name": "Nobody", "birth": "1815-12-10", "eyes": "TEAL"}),
        )
        .await;
    assert!(status.is_client_error());
    assert_eq!(app.store.count(&Criteria::all()).await.unwrap(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reads_stay_well_formed_during_concurrent_inserts() {
    let app = Arc::new(TestApp::with_fixtures().await);
    let birth = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();

    let writer = {
        let store = app.store.clone();
        tokio::spawn(async move {
            for i in 0..60 {
                let person = NewPerson::new(format!("Writer {i}"), birth, EyeColor::Green);
                store.insert(person).await.unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for r in 0..4 {
        let app = app.clone();
        readers.push(tokio::spawn(async move {
            for i in 0..15 {
                let (status, body) = app.get(&datatable_uri(i, 0, 5, Some("r"))).await;
                assert_eq!(status, StatusCode::OK, "reader {r}");
                let total = body["recordsTotal"].as_u64().unwrap();
                let filtered = body["recordsFiltered"].as_u64().unwrap();
                let returned = body["data"].as_array().unwrap().len() as u64;
                assert!(returned <= 5);
                assert!(filtered <= total);
                assert!((3..=63).contains(&total));
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    let everyone = app.store.scan_all().await.unwrap();
    assert_eq!(everyone.len(), 63);
    let mut ids: Vec<u64> = everyone.iter().map(|p| p.id).collect();
    ids.dedup();
    assert_eq!(ids, (1..=63).collect::<Vec<_>>());
}
