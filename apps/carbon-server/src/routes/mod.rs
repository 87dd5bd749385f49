pub mod devices;
pub mod directory;
pub mod emissions;
pub mod health;
pub mod usages;
pub mod users;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(emissions::router())
        .merge(devices::router())
        .merge(usages::router())
        .merge(directory::router())
        .merge(users::router())
        .merge(crate::openapi::router())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EmissionRow, MemoryStore, NewDevice};
    use crate::test_support::{admin_token, create_user, session_for, test_config, test_state};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn send_raw(
        app: &Router,
        method: Method,
        uri: &str,
        token: &str,
        raw: &str,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(raw.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn device_input(name: &str, power: f64) -> Value {
        json!({
            "device_name": name,
            "device_power": power,
            "campus_name": "A",
            "building_name": "Library",
            "room_name": "101",
            "usage_hours": 10,
            "year": 2024,
            "month": 1
        })
    }

    #[tokio::test]
    async fn device_input_feeds_campus_report() {
        let state = test_state();
        let token = admin_token(&state).await;
        let app = router(state);

        for (name, power) in [("Projector", 100.0), ("Heater", 200.0)] {
            let (status, body) = send(
                &app,
                Method::POST,
                "/emissions/device_input",
                Some(&token),
                Some(device_input(name, power)),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");
        }

        let (status, body) = send(
            &app,
            Method::GET,
            "/emissions/campus?campus=A&year=2024",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filter"], json!({"campus": "A", "year": "2024"}));
        assert_eq!(body["emissions"], json!({"A": {"1": 1.2}}));
        assert_eq!(body["total_emissions"], json!({"A": 1.2}));

        let (_, body) = send(&app, Method::GET, "/emissions/campus", None, None).await;
        assert_eq!(body["filter"], json!({"campus": "All", "year": "All"}));
        assert_eq!(body["emissions"], json!({"A": {"2024": 1.2}}));

        let (_, body) = send(&app, Method::GET, "/emissions/building?year=2024", None, None).await;
        assert_eq!(
            body["buildings"],
            json!({"Library": {"total_emission": 1.2, "rooms": {"101": 1.2}}})
        );

        let (_, body) = send(&app, Method::GET, "/emissions/device", None, None).await;
        assert_eq!(
            body["device_emissions"],
            json!({"Heater": 0.8, "Projector": 0.4})
        );

        let (_, body) = send(&app, Method::GET, "/emissions/device/raw", None, None).await;
        assert_eq!(body["raw_device_data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invalid_year_is_rejected_before_the_store() {
        let app = router(test_state());
        let (status, body) = send(
            &app,
            Method::GET,
            "/emissions/campus?year=twenty",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn incomplete_rows_are_skipped_not_fatal() {
        let rows = vec![
            EmissionRow {
                usage_id: Some(1),
                campus_name: Some("A".to_string()),
                building_name: Some("Library".to_string()),
                room_name: Some("101".to_string()),
                device_name: Some("Lamp".to_string()),
                device_power: Some(100.0),
                usage_hours: Some(10.0),
                year: Some(2024),
                month: Some(1),
            },
            EmissionRow {
                usage_id: Some(2),
                campus_name: Some("A".to_string()),
                device_name: Some("Ghost".to_string()),
                usage_hours: Some(10.0),
                year: Some(2024),
                month: Some(1),
                ..EmissionRow::default()
            },
        ];
        let state = crate::state::AppState::new(
            test_config(),
            Arc::new(MemoryStore::from_emission_rows(rows)),
        );
        let app = router(state);

        let (status, body) = send(&app, Method::GET, "/emissions/device", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["device_emissions"], json!({"Lamp": 0.4}));
    }

    #[tokio::test]
    async fn duplicate_usage_for_the_same_month_conflicts() {
        let state = test_state();
        let token = admin_token(&state).await;
        let (_, _, room) =
            crate::services::lookup::ensure_room_path(state.store.as_ref(), "A", "Library", "101")
                .await
                .unwrap();
        let mut device_id = 0;
        while device_id < 7 {
            device_id = state
                .store
                .insert_device(&NewDevice {
                    device_name: format!("Device {device_id}"),
                    device_power: 50.0,
                    room_id: room.room_id,
                })
                .await
                .unwrap()
                .device_id;
        }
        assert_eq!(device_id, 7);
        let app = router(state);

        let usage = json!({"device_id": 7, "usage_hours": 12.5, "year": 2024, "month": 3});
        let (status, first) = send(
            &app,
            Method::POST,
            "/device-usages",
            Some(&token),
            Some(usage.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(&app, Method::POST, "/device-usages", Some(&token), Some(usage)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());

        // Moving another record onto the taken month conflicts too.
        let other = json!({"device_id": 7, "usage_hours": 1, "year": 2024, "month": 4});
        let (_, second) = send(&app, Method::POST, "/device-usages", Some(&token), Some(other)).await;
        let moved = json!({
            "usage_id": second["usage"]["usage_id"],
            "device_id": 7,
            "usage_hours": 1,
            "year": 2024,
            "month": 3
        });
        let (status, _) = send(&app, Method::PUT, "/device-usages", Some(&token), Some(moved)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&app, Method::GET, "/device-usages?device_id=7", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let months: Vec<i64> = body["usage_records"]
            .as_array()
            .unwrap()
            .iter()
            .map(|record| record["month"].as_i64().unwrap())
            .collect();
        assert_eq!(months, vec![3, 4]);

        let delete = json!({"usage_id": first["usage"]["usage_id"]});
        let (status, _) = send(&app, Method::DELETE, "/device-usages", Some(&token), Some(delete.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::DELETE, "/device-usages", Some(&token), Some(delete)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn usage_for_missing_device_is_not_found() {
        let state = test_state();
        let token = admin_token(&state).await;
        let app = router(state);
        let usage = json!({"device_id": 99, "usage_hours": 1, "year": 2024, "month": 3});
        let (status, _) = send(&app, Method::POST, "/device-usages", Some(&token), Some(usage)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mutating_routes_require_bearer_auth() {
        let app = router(test_state());
        let cases = [
            (Method::POST, "/emissions/device_input"),
            (Method::POST, "/devices"),
            (Method::PUT, "/devices/1"),
            (Method::DELETE, "/devices/1"),
            (Method::POST, "/device-usages"),
            (Method::PUT, "/device-usages"),
            (Method::DELETE, "/device-usages"),
            (Method::POST, "/users/register"),
        ];
        for (method, uri) in cases {
            let (status, _) = send(&app, method.clone(), uri, None, Some(json!({}))).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        }

        let (status, _) = send(
            &app,
            Method::POST,
            "/devices",
            Some("not-a-session"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn device_crud_round_trip() {
        let state = test_state();
        let token = admin_token(&state).await;
        let (_, _, room) =
            crate::services::lookup::ensure_room_path(state.store.as_ref(), "North", "Lab", "2F")
                .await
                .unwrap();
        let app = router(state);

        let (status, body) = send(
            &app,
            Method::POST,
            "/devices",
            Some(&token),
            Some(json!({"device_name": "Fridge", "device_power": "150", "room_id": room.room_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let device_id = body["device"]["device_id"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            Method::GET,
            "/devices?building_name=Lab&room_name=2F&campus_name=North",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["devices"],
            json!([{"device_id": device_id, "device_name": "Fridge", "device_power": 150.0}])
        );

        let uri = format!("/devices/{device_id}");
        let (status, body) = send(
            &app,
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({"device_name": "Freezer", "device_power": 300, "room_id": room.room_id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["device"]["device_name"], "Freezer");

        let (status, body) = send(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted_device_id"], device_id);
        let (status, _) = send(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::GET, "/devices?building_name=Lab", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(
            &app,
            Method::GET,
            "/devices?building_name=Lab&room_name=9F",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn undecodable_bodies_are_json_bad_requests() {
        let state = test_state();
        let token = admin_token(&state).await;
        let app = router(state);

        let (status, body) = send(
            &app,
            Method::POST,
            "/devices",
            Some(&token),
            Some(json!({"device_name": 5, "device_power": 100, "room_id": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string(), "{body}");

        let (status, body) = send(
            &app,
            Method::POST,
            "/device-usages",
            Some(&token),
            Some(json!({"device_id": 1, "usage_hours": true, "year": 2024, "month": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string(), "{body}");

        let (status, body) =
            send_raw(&app, Method::POST, "/device-usages", &token, "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string(), "{body}");

        // No body at all, so no content type either.
        let (status, body) = send(&app, Method::DELETE, "/device-usages", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string(), "{body}");

        let (status, body) =
            send_raw(&app, Method::POST, "/users/login", &token, "[1, 2").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string(), "{body}");
    }

    #[tokio::test]
    async fn device_with_bad_power_is_rejected() {
        let state = test_state();
        let token = admin_token(&state).await;
        let app = router(state);
        let (status, body) = send(
            &app,
            Method::POST,
            "/devices",
            Some(&token),
            Some(json!({"device_name": "Fan", "device_power": -5, "room_id": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "device_power must be a positive number.");
    }

    #[tokio::test]
    async fn directory_lists_follow_the_hierarchy() {
        let state = test_state();
        for (campus, building, room) in [
            ("South", "Gym", "Court"),
            ("North", "Lab", "2F"),
            ("North", "Lab", "1F"),
            ("North", "Annex", "A1"),
        ] {
            crate::services::lookup::ensure_room_path(state.store.as_ref(), campus, building, room)
                .await
                .unwrap();
        }
        let app = router(state);

        let (_, body) = send(&app, Method::GET, "/campuses", None, None).await;
        assert_eq!(
            body["campuses"],
            json!([{"campus_name": "North"}, {"campus_name": "South"}])
        );
        let (_, body) = send(&app, Method::GET, "/buildings?campus_name=North", None, None).await;
        assert_eq!(body["buildings"], json!(["Annex", "Lab"]));
        let (_, body) = send(&app, Method::GET, "/buildings", None, None).await;
        assert_eq!(body["buildings"], json!([]));
        let (_, body) = send(&app, Method::GET, "/rooms?building_name=Lab", None, None).await;
        let names: Vec<&str> = body["rooms"]
            .as_array()
            .unwrap()
            .iter()
            .map(|room| room["room_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["1F", "2F"]);
        let (_, body) = send(&app, Method::GET, "/rooms?building_name=Nope", None, None).await;
        assert_eq!(body["rooms"], json!([]));
    }

    #[tokio::test]
    async fn only_the_admin_registers_users() {
        let state = test_state();
        let admin = admin_token(&state).await;
        create_user(&state, "staff@campus.test", "staff-pass").await;
        let staff = session_for(&state, "staff@campus.test").await;
        let app = router(state);

        let new_user = json!({"username": "new@campus.test", "password": "secret1"});
        let (status, _) = send(
            &app,
            Method::POST,
            "/users/register",
            Some(&staff),
            Some(new_user.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            Method::POST,
            "/users/register",
            Some(&admin),
            Some(json!({"username": "short@campus.test", "password": "12345"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/users/register",
            Some(&admin),
            Some(new_user.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(
            &app,
            Method::POST,
            "/users/register",
            Some(&admin),
            Some(new_user.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email already in use");

        let (status, body) = send(&app, Method::POST, "/users/login", None, Some(new_user)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].as_str().is_some_and(|token| !token.is_empty()));
        assert!(body["userId"].is_string());

        let (status, body) = send(
            &app,
            Method::POST,
            "/users/login",
            None,
            Some(json!({"username": "new@campus.test", "password": "wrong-one"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid login credentials.");
    }

    #[tokio::test]
    async fn forgot_password_does_not_reveal_accounts() {
        let state = test_state();
        create_user(&state, "staff@campus.test", "staff-pass").await;
        let app = router(state);

        let (known_status, known) = send(
            &app,
            Method::POST,
            "/users/forgot-password",
            None,
            Some(json!({"email": "staff@campus.test"})),
        )
        .await;
        let (unknown_status, unknown) = send(
            &app,
            Method::POST,
            "/users/forgot-password",
            None,
            Some(json!({"email": "nobody@campus.test"})),
        )
        .await;
        assert_eq!(known_status, StatusCode::OK);
        assert_eq!(unknown_status, StatusCode::OK);
        assert_eq!(known, unknown);

        let (status, _) = send(&app, Method::POST, "/users/forgot-password", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reset_token_changes_the_password_once() {
        let state = test_state();
        create_user(&state, "staff@campus.test", "staff-pass").await;
        let user = state
            .store
            .find_user_by_email("staff@campus.test")
            .await
            .unwrap()
            .unwrap();
        let token = state.auth.issue_reset(user.id).await;
        let app = router(state);

        let reset = json!({"token": token, "password": "fresh-pass"});
        let (status, _) = send(&app, Method::POST, "/users/reset-password", None, Some(reset.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::POST, "/users/reset-password", None, Some(reset)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/users/login",
            None,
            Some(json!({"username": "staff@campus.test", "password": "fresh-pass"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_and_openapi_are_served() {
        let app = router(test_state());
        let (status, body) = send(&app, Method::GET, "/healthz", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        let (status, body) = send(&app, Method::GET, "/openapi.json", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/emissions/campus"].is_object());
    }
}
