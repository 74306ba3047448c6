//! End-to-end tests through the router, without a socket

use bytes::Bytes;
use clap::Parser;
use http_body_util::BodyExt;
use hyper::{Method, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

use studyhall::config::Args;
use studyhall::db::{seed, MemStorage, SeedOptions};
use studyhall::server::{route, AppState};

const ADMIN_PASSWORD: &str = "admin-password-1";

struct TestApp {
    state: Arc<AppState>,
}

impl TestApp {
    async fn new() -> Self {
        let args = Args::parse_from(["studyhall", "--dev-mode", "--chat-history-limit", "3"]);
        let store = Arc::new(MemStorage::new());
        seed(
            &store,
            &SeedOptions {
                admin_username: "admin".into(),
                admin_email: "admin@studyhall.local".into(),
                admin_password: ADMIN_PASSWORD.into(),
                sample_users: 0,
            },
        )
        .await
        .unwrap();
        let state = Arc::new(AppState::new(args, store).unwrap());
        Self { state }
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let body = body
            .map(|b| Bytes::from(serde_json::to_vec(&b).unwrap()))
            .unwrap_or_default();
        let response = route(Arc::clone(&self.state), builder.body(body).unwrap()).await;

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::GET, path, token, None).await
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, path, Some(token), Some(body)).await
    }

    /// Register a student, returning (id, token)
    async fn register(&self, username: &str, display_name: &str) -> (u32, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{}@uni.edu", username),
                    "password": "password123",
                    "displayName": display_name,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        (
            body["user"]["id"].as_u64().unwrap() as u32,
            body["token"].as_str().unwrap().to_string(),
        )
    }

    async fn login(&self, identifier: &str, password: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "identifier": identifier, "password": password })),
        )
        .await
    }

    async fn admin_token(&self) -> String {
        let (status, body) = self.login("admin", ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_health_and_unknown_routes() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
    assert_eq!(body["store"]["users"], 1);
    assert_eq!(body["mode"], "development");

    let (status, body) = app.get("/api/nothing-here", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "ROUTE_NOT_FOUND");

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/papers")
        .body(Bytes::new())
        .unwrap();
    let response = route(Arc::clone(&app.state), request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = TestApp::new().await;
    let (id, token) = app.register("ada", "Ada Lovelace").await;

    let (status, me) = app.get("/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], id);
    assert_eq!(me["displayName"], "Ada Lovelace");
    assert!(me.get("passwordHash").is_none());

    let (status, _) = app.login("ada@uni.edu", "password123").await;
    assert_eq!(status, StatusCode::OK);

    let (wrong_pw, wrong_body) = app.login("ada", "not-the-password").await;
    let (no_user, no_user_body) = app.login("nobody", "password123").await;
    assert_eq!(wrong_pw, StatusCode::UNAUTHORIZED);
    assert_eq!(no_user, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, no_user_body);

    let (status, body) = app
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "ADA", "email": "other@uni.edu", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);

    let (status, _) = app.get("/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.get("/auth/me", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_paper_upload_filter_and_search() {
    let app = TestApp::new().await;
    let (id, token) = app.register("sam", "Sam").await;

    for (title, course, year) in [
        ("Calculus Final", "MATH101", 2021),
        ("Linear Algebra Midterm", "MATH201", 2022),
        ("Intro to Calculus notes", "MATH101", 2022),
    ] {
        let (status, _) = app
            .post(
                "/api/papers",
                &token,
                json!({ "title": title, "course": course, "year": year, "fileUrl": "/u/x.pdf" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, papers) = app.get("/api/papers?course=MATH101&year=2022", None).await;
    let papers = papers.as_array().unwrap();
    assert_eq!(papers.len(), 1);
    assert_eq!(papers[0]["title"], "Intro to Calculus notes");
    assert_eq!(papers[0]["uploaderId"], id);

    let (_, results) = app.get("/api/papers/search?q=calculus", None).await;
    let titles: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles.len(), 2);
    assert!(titles.contains(&"Calculus Final"));

    // Three uploads at ten points each
    let (_, me) = app.get("/auth/me", Some(&token)).await;
    assert_eq!(me["points"], 30);

    let (status, _) = app
        .call(Method::DELETE, "/api/papers/1", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.admin_token().await;
    let (status, _) = app
        .call(Method::DELETE, "/api/papers/1", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get("/api/papers/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_discussion_thread_and_accepted_reply() {
    let app = TestApp::new().await;
    let (_, asker) = app.register("asker", "Asker").await;
    let (helper_id, helper) = app.register("helper", "Helper").await;

    let (status, post) = app
        .post(
            "/api/discussions",
            &asker,
            json!({ "title": "Why is heapsort n log n?", "content": "Confused", "tags": ["Algorithms"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(post["tags"], json!(["algorithms"]));
    let post_id = post["id"].as_u64().unwrap();

    let (_, first) = app
        .post(
            &format!("/api/discussions/{}/replies", post_id),
            &asker,
            json!({ "content": "Bumping this" }),
        )
        .await;
    let (_, answer) = app
        .post(
            &format!("/api/discussions/{}/replies", post_id),
            &helper,
            json!({ "content": "Each sift-down is log n" }),
        )
        .await;
    let answer_id = answer["id"].as_u64().unwrap();

    let (status, _) = app
        .post(&format!("/api/replies/{}/accept", answer_id), &helper, json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, accepted) = app
        .post(&format!("/api/replies/{}/accept", answer_id), &asker, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["isAccepted"], true);

    let (status, _) = app
        .post(
            &format!("/api/replies/{}/comments", answer_id),
            &asker,
            json!({ "content": "Thanks!" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, thread) = app.get(&format!("/api/discussions/{}", post_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(thread["authorName"], "Asker");
    assert_eq!(thread["views"], 1);
    let replies = thread["replies"].as_array().unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["id"], answer_id);
    assert_eq!(replies[0]["authorName"], "Helper");
    assert_eq!(replies[0]["comments"][0]["authorName"], "Asker");
    assert_eq!(replies[1]["id"], first["id"]);

    // Reply (2) plus accepted answer (15)
    let (_, profile) = app
        .get(&format!("/api/users/{}", helper_id), Some(&asker))
        .await;
    assert_eq!(profile["points"], 17);
    assert!(profile.get("email").is_none());

    let (_, summaries) = app.get("/api/discussions?tag=algorithms", None).await;
    assert_eq!(summaries[0]["replyCount"], 2);
    assert_eq!(summaries[0]["hasAcceptedReply"], true);
}

#[tokio::test]
async fn test_friend_request_and_messages() {
    let app = TestApp::new().await;
    let (alice_id, alice) = app.register("alice", "Alice").await;
    let (bob_id, bob) = app.register("bob", "Bob").await;

    let (status, request) = app
        .post("/api/friends/requests", &alice, json!({ "userId": bob_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "pending");

    // Bob cannot send the mirror request while Alice's is pending
    let (status, _) = app
        .post("/api/friends/requests", &bob, json!({ "userId": alice_id }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, pending) = app.get("/api/friends/requests", Some(&bob)).await;
    assert_eq!(pending[0]["senderName"], "Alice");
    let request_id = pending[0]["id"].as_u64().unwrap();

    let (status, _) = app
        .post(
            &format!("/api/friends/requests/{}/accept", request_id),
            &alice,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, accepted) = app
        .post(
            &format!("/api/friends/requests/{}/accept", request_id),
            &bob,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "accepted");

    let (_, alice_friends) = app.get("/api/friends", Some(&alice)).await;
    let (_, bob_friends) = app.get("/api/friends", Some(&bob)).await;
    assert_eq!(alice_friends[0]["id"], bob_id);
    assert_eq!(alice_friends[0]["displayName"], "Bob");
    assert_eq!(bob_friends[0]["id"], alice_id);

    for text in ["hi bob", "are you coming to the review?"] {
        let (status, _) = app
            .post(&format!("/api/messages/{}", bob_id), &alice, json!({ "content": text }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, inbox) = app.get("/api/messages", Some(&bob)).await;
    assert_eq!(inbox[0]["partnerId"], alice_id);
    assert_eq!(inbox[0]["unreadCount"], 2);
    assert_eq!(inbox[0]["lastMessage"]["content"], "are you coming to the review?");

    let (_, thread) = app
        .get(&format!("/api/messages/{}", alice_id), Some(&bob))
        .await;
    assert_eq!(thread.as_array().unwrap().len(), 2);
    assert_eq!(thread[0]["content"], "hi bob");

    let (_, inbox) = app.get("/api/messages", Some(&bob)).await;
    assert_eq!(inbox[0]["unreadCount"], 0);

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/friends/{}", alice_id), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, alice_friends) = app.get("/api/friends", Some(&alice)).await;
    assert_eq!(alice_friends, json!([]));
}

#[tokio::test]
async fn test_study_group_membership_and_chat() {
    let app = TestApp::new().await;
    let (_, owner) = app.register("owner", "Owner").await;
    let (_, member) = app.register("member", "Member").await;
    let (_, outsider) = app.register("outsider", "Outsider").await;

    let (status, group) = app
        .post("/api/groups", &owner, json!({ "name": "Organic Chemistry", "course": "CHEM210" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_u64().unwrap();

    let (status, _) = app
        .post(&format!("/api/groups/{}/join", group_id), &member, json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .post(&format!("/api/groups/{}/join", group_id), &member, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, view) = app
        .get(&format!("/api/groups/{}", group_id), Some(&outsider))
        .await;
    assert_eq!(view["memberCount"], 2);
    assert_eq!(view["creatorName"], "Owner");

    for n in 1..=4 {
        let (status, _) = app
            .post(
                &format!("/api/groups/{}/messages", group_id),
                if n % 2 == 0 { &member } else { &owner },
                json!({ "content": format!("message {}", n) }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    // Default window is the configured three trailing messages
    let (_, chat) = app
        .get(&format!("/api/groups/{}/messages", group_id), Some(&member))
        .await;
    let contents: Vec<&str> = chat
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, ["message 2", "message 3", "message 4"]);

    let (_, chat) = app
        .get(&format!("/api/groups/{}/messages?limit=1", group_id), Some(&member))
        .await;
    assert_eq!(chat[0]["content"], "message 4");
    assert_eq!(chat[0]["authorName"], "Member");

    let (status, _) = app
        .get(&format!("/api/groups/{}/messages", group_id), Some(&outsider))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, session) = app
        .post(
            &format!("/api/groups/{}/sessions", group_id),
            &member,
            json!({
                "title": "Reaction mechanisms",
                "startTime": "2099-03-01T15:00:00Z",
                "endTime": "2099-03-01T17:00:00Z",
                "location": "Library room 4",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", session);

    let (_, upcoming) = app.get("/api/sessions/upcoming", Some(&owner)).await;
    assert_eq!(upcoming[0]["title"], "Reaction mechanisms");
    assert_eq!(upcoming[0]["groupName"], "Organic Chemistry");

    let (status, _) = app
        .post(
            &format!("/api/groups/{}/sessions", group_id),
            &member,
            json!({
                "title": "Backwards",
                "startTime": "2099-03-01T17:00:00Z",
                "endTime": "2099-03-01T15:00:00Z",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, private) = app
        .post("/api/groups", &owner, json!({ "name": "Invite only", "isPrivate": true }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .post(&format!("/api/groups/{}/join", private["id"]), &outsider, json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/groups/{}", group_id),
            Some(&member),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/groups/{}", group_id),
            Some(&owner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, mine) = app.get("/api/groups/mine", Some(&member)).await;
    assert_eq!(mine, json!([]));
}

#[tokio::test]
async fn test_admin_roles_and_bans() {
    let app = TestApp::new().await;
    let root = app.admin_token().await;
    let (carol_id, carol) = app.register("carol", "Carol").await;
    let (dave_id, dave) = app.register("dave", "Dave").await;

    let (status, _) = app.get("/api/admin/users", Some(&carol)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, promoted) = app
        .post(&format!("/api/admin/users/{}/grant-admin", carol_id), &root, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["role"], "admin");

    // Carol's existing token now carries admin rights
    let (status, listing) = app.get("/api/admin/users?search=da", Some(&carol)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["users"][0]["username"], "dave");

    // Only the first admin manages roles
    let (status, _) = app
        .post(&format!("/api/admin/users/{}/grant-admin", dave_id), &carol, json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .post("/api/admin/users/1/revoke-admin", &carol, json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, banned) = app
        .post(
            &format!("/api/admin/users/{}/ban", dave_id),
            &carol,
            json!({ "reason": "spam" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(banned["isBanned"], true);

    let (status, _) = app.get("/auth/me", Some(&dave)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.login("dave", "password123").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, board) = app.get("/api/users/leaderboard", None).await;
    assert!(board
        .as_array()
        .unwrap()
        .iter()
        .all(|u| u["id"] != dave_id));

    let (status, _) = app
        .post("/api/admin/users/1/revoke-admin", &root, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post(&format!("/api/admin/users/{}/revoke-admin", carol_id), &root, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/api/admin/stats", Some(&carol)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, actions) = app.get("/api/admin/actions", Some(&root)).await;
    let actions = actions.as_array().unwrap();
    assert_eq!(actions.len(), 3);
    assert_eq!(actions[0]["action"], "revoke_admin");
    assert_eq!(actions[1]["reason"], "spam");

    let (_, stats) = app.get("/api/admin/stats", Some(&root)).await;
    assert_eq!(stats["bannedUsers"], 1);
    assert_eq!(stats["admins"], 1);
}
