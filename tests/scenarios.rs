mod common;

use axum::http::StatusCode;
use common::{datatable_uri, names, TestApp};
use people_db::seed::SampleDataGenerator;
use serde_json::json;

#[tokio::test]
async fn eyes_lookup_returns_only_matching_people() {
    let app = TestApp::with_fixtures().await;

    let (status, body) = app.get("/person/eyes/BLUE").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{"id": 1, "name": "Farid Ulyanov", "birth": "1974-08-15", "eyes": "BLUE"}])
    );
}

#[tokio::test]
async fn birth_before_is_inclusive_of_the_year() {
    let app = TestApp::with_fixtures().await;

    let (status, body) = app.get("/person/birth/before/1990").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body), vec!["Farid Ulyanov", "Salvador L. Witcher"]);

    let (_, body) = app.get("/person/birth/before/1999").await;
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn datatable_search_filters_and_counts() {
    let app = TestApp::with_fixtures().await;

    let (status, body) = app.get(&datatable_uri(1, 0, 10, Some("yan"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "draw": 1,
            "recordsTotal": 3,
            "recordsFiltered": 1,
            "data": [{"id": 1, "name": "Farid Ulyanov", "birth": "1974-08-15", "eyes": "BLUE"}],
            "error": null
        })
    );
}

#[tokio::test]
async fn zero_length_is_rejected_inside_an_envelope() {
    let app = TestApp::with_fixtures().await;

    let (status, body) = app.get(&datatable_uri(5, 0, 0, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["draw"], 5);
    assert_eq!(body["recordsTotal"], 0);
    assert_eq!(body["recordsFiltered"], 0);
    assert_eq!(body["data"], json!([]));
    assert!(body["error"].as_str().unwrap().contains("length"));
}

#[tokio::test]
async fn bulk_data_counts_match_an_independent_scan() {
    let app = TestApp::with_fixtures().await;
    let mut generator = SampleDataGenerator::new(40, None);
    generator.populate(&app.store, 1000).await.unwrap();

    let (status, body) = app.get(&datatable_uri(2, 0, 2, Some("F"))).await;
    assert_eq!(status, StatusCode::OK);

    let everyone = app.store.scan_all().await.unwrap();
    let expected = everyone.iter().filter(|p| p.name.contains('F')).count();

    assert_eq!(body["recordsTotal"], 1003);
    assert_eq!(body["recordsFiltered"], expected);
    let data = body["data"].as_array().unwrap();
    assert!(data.len() <= 2);
    assert_eq!(data.len(), expected.min(2));
    assert!(names(&body["data"]).iter().all(|n| n.contains('F')));
    assert_eq!(body["error"], json!(null));
}
