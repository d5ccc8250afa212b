//! `/users/` over HTTP: ownership filtering, 404 masking, self-registration,
//! staff roster, autocomplete and paging.

mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{harness, names, As};
use lims::fixtures::{JOE_PASSWORD, JOE_USERNAME};

#[tokio::test]
async fn unauthenticated_callers_get_401() -> Result<()> {
    let h = harness()?;
    for who in [As::Anonymous, As::Invalid] {
        assert_eq!(h.get("/users/", who).await?.0, StatusCode::UNAUTHORIZED);
        assert_eq!(h.get(&format!("/users/{}/", h.joe), who).await?.0, StatusCode::UNAUTHORIZED);
        let (status, _) = h.call(Method::PATCH, &format!("/users/{}/", h.joe), who, Some(json!({"email": "x@y.z"}))).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(h.call(Method::DELETE, &format!("/users/{}/", h.joe), who, None).await?.0, StatusCode::UNAUTHORIZED);
        assert_eq!(h.call(Method::POST, "/users/", who, Some(json!({"username": "x", "password": "y"}))).await?.0, StatusCode::UNAUTHORIZED);
    }
    assert!(h.state.store.read().user(h.joe).is_some());
    Ok(())
}

#[tokio::test]
async fn regular_user_lists_only_self() -> Result<()> {
    let h = harness()?;
    let t = h.token(h.joe);
    let (status, body) = h.get("/users/", As::Token(&t)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["username"], JOE_USERNAME);
    Ok(())
}

#[tokio::test]
async fn user_views_own_record() -> Result<()> {
    let h = harness()?;
    let t = h.token(h.joe);
    let (status, body) = h.get(&format!("/users/{}/", h.joe), As::Token(&t)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "joe@tgac.com");
    assert_eq!(body["first_name"], "Joe");
    assert_eq!(body["last_name"], "Bloggs");
    assert_eq!(body["addresses"][0]["institution_name"], "Beetroot Institute");
    assert_eq!(names(&body["groups"]), vec!["joe_group"]);
    assert!(body.get("password_hash").is_none());
    Ok(())
}

#[tokio::test]
async fn other_users_are_masked_as_missing() -> Result<()> {
    let h = harness()?;
    let t = h.token(h.joe);
    assert_eq!(h.get(&format!("/users/{}/", h.jane), As::Token(&t)).await?.0, StatusCode::NOT_FOUND);
    assert_eq!(h.get("/users/9999/", As::Token(&t)).await?.0, StatusCode::NOT_FOUND);
    assert_eq!(h.get("/users/joe/", As::Token(&t)).await?.0, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn writes_to_other_users_are_forbidden_and_inert() -> Result<()> {
    let h = harness()?;
    let joe = h.token(h.joe);
    let (status, _) = h.call(Method::PATCH, &format!("/users/{}/", h.jane), As::Token(&joe), Some(json!({"email": "hacked@evil.com"}))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(h.state.store.read().user(h.jane).map(|u| u.email.clone()).as_deref(), Some("jane@tgac.com"));

    let jane = h.token(h.jane);
    assert_eq!(h.call(Method::DELETE, &format!("/users/{}/", h.joe), As::Token(&jane), None).await?.0, StatusCode::FORBIDDEN);
    assert!(h.state.store.read().user(h.joe).is_some());

    // Forbidden wins over a malformed body
    let (status, _) = h.call(Method::PUT, &format!("/users/{}/", h.jane), As::Token(&joe), Some(json!([1, 2]))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn user_updates_own_record_but_not_groups() -> Result<()> {
    let h = harness()?;
    let t = h.token(h.joe);
    let uri = format!("/users/{}/", h.joe);
    let (status, body) = h.call(Method::PATCH, &uri, As::Token(&t), Some(json!({"email": "joe@bloggs.org"}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "joe@bloggs.org");
    assert_eq!(body["first_name"], "Joe");

    let (status, _) = h.call(Method::PATCH, &uri, As::Token(&t), Some(json!({"groups": ["admin"]}))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(h.state.store.read().actor_for(h.joe).map(|a| a.is_admin()), Some(false));

    let (status, _) = h.call(Method::PUT, &uri, As::Token(&t), Some(json!({"email": "no-username@x.org"}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn user_deletes_self_and_loses_access() -> Result<()> {
    let h = harness()?;
    let t = h.token(h.joe);
    assert_eq!(h.call(Method::DELETE, &format!("/users/{}/", h.joe), As::Token(&t), None).await?.0, StatusCode::NO_CONTENT);
    assert!(h.state.store.read().user_by_username(JOE_USERNAME).is_none());
    assert_eq!(h.get("/users/", As::Token(&t)).await?.0, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn admin_manages_everyone() -> Result<()> {
    let h = harness()?;
    let t = h.token(h.admin);
    let (status, body) = h.get("/users/", As::Token(&t)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 4);

    let (status, body) = h.get(&format!("/users/{}/", h.joe), As::Token(&t)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], JOE_USERNAME);

    let (status, body) = h.call(Method::PATCH, &format!("/users/{}/", h.jane), As::Token(&t), Some(json!({"email": "jane@lab.org", "groups": ["jane_group"]}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "jane@lab.org");
    assert_eq!(names(&body["groups"]), vec!["jane_group"]);

    assert_eq!(h.call(Method::DELETE, &format!("/users/{}/", h.joe), As::Token(&t), None).await?.0, StatusCode::NO_CONTENT);
    assert!(h.state.store.read().user(h.joe).is_none());
    assert_eq!(h.call(Method::DELETE, &format!("/users/{}/", h.joe), As::Token(&t), None).await?.0, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn only_admin_creates_through_users_endpoint() -> Result<()> {
    let h = harness()?;
    let new_user = json!({"username": "Test_User", "password": "worms", "email": "silly@silly.com", "groups": ["joe_group"]});

    let joe = h.token(h.joe);
    assert_eq!(h.call(Method::POST, "/users/", As::Token(&joe), Some(new_user.clone())).await?.0, StatusCode::FORBIDDEN);

    let admin = h.token(h.admin);
    let (status, body) = h.call(Method::POST, "/users/", As::Token(&admin), Some(new_user.clone())).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(names(&body["groups"]), vec!["joe_group", "user"]);

    assert_eq!(h.call(Method::POST, "/users/", As::Token(&admin), Some(new_user)).await?.0, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn anonymous_registration_adds_baseline_group() -> Result<()> {
    let h = harness()?;
    let new_user = json!({
        "username": "Test_User",
        "email": "Silly@silly.com",
        "password": "worms",
        "first_name": "Test",
        "last_name": "User",
        "groups": ["joe_group"]
    });
    let (status, body) = h.call(Method::POST, "/users/register/", As::Anonymous, Some(new_user.clone())).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "Silly@silly.com");
    assert_eq!(body["first_name"], "Test");
    assert_eq!(names(&body["groups"]), vec!["joe_group", "user"]);
    assert_eq!(h.state.store.read().user_count(), 5);

    let (status, _) = h.call(Method::POST, "/users/register/", As::Anonymous, Some(new_user)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(h.state.store.read().user_count(), 5);
    Ok(())
}

#[tokio::test]
async fn registration_edge_cases() -> Result<()> {
    let h = harness()?;
    let body = |groups: serde_json::Value| json!({"username": "newcomer", "password": "pw", "groups": groups});

    let (status, _) = h.call(Method::POST, "/users/register/", As::Invalid, Some(body(json!([])))).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h.call(Method::POST, "/users/register/", As::Anonymous, Some(body(json!(["admin"])))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h.call(Method::POST, "/users/register/", As::Anonymous, Some(body(json!(["no_such_group"])))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.call(Method::POST, "/users/register/", As::Anonymous, Some(json!({"username": "nopw"}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(h.state.store.read().user_by_username("newcomer").is_none());

    let admin = h.token(h.admin);
    let (status, body) = h.call(Method::POST, "/users/register/", As::Token(&admin), Some(body(json!(["staff"])))).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(names(&body["groups"]), vec!["staff", "user"]);
    Ok(())
}

#[tokio::test]
async fn staff_roster_is_global() -> Result<()> {
    let h = harness()?;
    for who in [As::Anonymous, As::Invalid] {
        assert_eq!(h.get("/users/staff/", who).await?.0, StatusCode::UNAUTHORIZED);
    }
    for user in [h.joe, h.admin] {
        let t = h.token(user);
        let (status, body) = h.get("/users/staff/", As::Token(&t)).await?;
        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().cloned().unwrap_or_default();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], h.jane);
        assert!(list[0].get("email").is_none());
    }
    Ok(())
}

#[tokio::test]
async fn staff_roster_can_be_empty() -> Result<()> {
    let h = harness()?;
    let admin = h.token(h.admin);
    let (status, _) = h.call(Method::PATCH, &format!("/users/{}/", h.jane), As::Token(&admin), Some(json!({"groups": ["jane_group"]}))).await?;
    assert_eq!(status, StatusCode::OK);
    for user in [h.joe, h.admin] {
        let t = h.token(user);
        let (status, body) = h.get("/users/staff/", As::Token(&t)).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }
    Ok(())
}

#[tokio::test]
async fn inactive_staff_leave_roster() -> Result<()> {
    let h = harness()?;
    let admin = h.token(h.admin);
    let (status, body) = h.call(Method::PATCH, &format!("/users/{}/", h.jane), As::Token(&admin), Some(json!({"is_active": false}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(names(&body["groups"]).contains(&"staff".to_string()));
    let (status, body) = h.get("/users/staff/", As::Token(&admin)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
    Ok(())
}

#[tokio::test]
async fn autocomplete_is_owner_filtered() -> Result<()> {
    let h = harness()?;
    for who in [As::Anonymous, As::Invalid] {
        assert_eq!(h.get("/users/autocomplete/?q=oggs", who).await?.0, StatusCode::UNAUTHORIZED);
    }
    let joe = h.token(h.joe);
    let (status, body) = h.get("/users/autocomplete/?q=oggs", As::Token(&joe)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["id"], h.joe);

    let jane = h.token(h.jane);
    let (_, body) = h.get("/users/autocomplete/?q=oggs", As::Token(&jane)).await?;
    assert_eq!(body.as_array().map(Vec::len), Some(0));

    let admin = h.token(h.admin);
    let (_, body) = h.get("/users/autocomplete/?q=OGGS", As::Token(&admin)).await?;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["id"], h.joe);
    Ok(())
}

#[tokio::test]
async fn listing_pages_through_results() -> Result<()> {
    let h = harness()?;
    let t = h.token(h.admin);
    let (status, body) = h.get("/users/?limit=2", As::Token(&t)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 4);
    assert_eq!(body["results"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["next"], "?limit=2&offset=2");
    assert!(body["previous"].is_null());

    assert_eq!(h.get("/users/?limit=zero", As::Token(&t)).await?.0, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn password_login_and_logout() -> Result<()> {
    let h = harness()?;
    let creds = json!({"username": JOE_USERNAME, "password": JOE_PASSWORD});
    let (status, body) = h.call(Method::POST, "/auth/login/", As::Anonymous, Some(creds)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], h.joe);
    let token = body["token"].as_str().unwrap_or_default().to_string();
    assert!(!token.is_empty());

    assert_eq!(h.get("/users/", As::Token(&token)).await?.0, StatusCode::OK);
    assert_eq!(h.call(Method::POST, "/auth/logout/", As::Token(&token), None).await?.0, StatusCode::NO_CONTENT);
    assert_eq!(h.get("/users/", As::Token(&token)).await?.0, StatusCode::UNAUTHORIZED);

    let wrong = json!({"username": JOE_USERNAME, "password": "nope"});
    assert_eq!(h.call(Method::POST, "/auth/login/", As::Anonymous, Some(wrong)).await?.0, StatusCode::UNAUTHORIZED);
    assert_eq!(h.call(Method::POST, "/auth/logout/", As::Anonymous, None).await?.0, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn oversized_limit_is_harmless() -> Result<()> {
    let h = harness()?;
    let t = h.token(h.admin);
    let (status, body) = h.get(&format!("/users/?limit={}&offset=1", usize::MAX), As::Token(&t)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 4);
    assert_eq!(body["results"].as_array().map(Vec::len), Some(3));
    assert!(body["next"].is_null());
    Ok(())
}

#[tokio::test]
async fn passwords_set_over_http_log_in() -> Result<()> {
    let h = harness()?;
    let new_user = json!({"username": "newcomer", "password": "first-pw"});
    assert_eq!(h.call(Method::POST, "/users/register/", As::Anonymous, Some(new_user)).await?.0, StatusCode::CREATED);
    let (status, body) = h.call(Method::POST, "/auth/login/", As::Anonymous, Some(json!({"username": "newcomer", "password": "first-pw"}))).await?;
    assert_eq!(status, StatusCode::OK);
    let id = body["user_id"].clone();
    let token = body["token"].as_str().unwrap_or_default().to_string();

    let (status, _) = h.call(Method::PATCH, &format!("/users/{id}/"), As::Token(&token), Some(json!({"password": "second-pw"}))).await?;
    assert_eq!(status, StatusCode::OK);
    let stale = json!({"username": "newcomer", "password": "first-pw"});
    assert_eq!(h.call(Method::POST, "/auth/login/", As::Anonymous, Some(stale)).await?.0, StatusCode::UNAUTHORIZED);
    let fresh = json!({"username": "newcomer", "password": "second-pw"});
    assert_eq!(h.call(Method::POST, "/auth/login/", As::Anonymous, Some(fresh)).await?.0, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn errors_use_json_envelope() -> Result<()> {
    let h = harness()?;
    let (status, body) = h.get("/users/", As::Anonymous).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "not_authenticated");
    let (status, body) = h.get("/", As::Anonymous).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "lims ok");
    Ok(())
}
