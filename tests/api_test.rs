//! End-to-end tests for the HTTP API.
//!
//! Each test binds the router on an ephemeral port over a throwaway data
//! directory and drives it with a cookie-aware client.

use poster::config::Config;
use poster::db;
use poster::routes;
use poster::state::AppState;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct TestServer {
    base: String,
    tmp: TempDir,
}

impl TestServer {
    async fn spawn(admins: &[&str]) -> Self {
        let tmp = TempDir::new().unwrap();

        let mut config = Config::default();
        config.auth.admins = admins.iter().map(|a| a.to_string()).collect();
        config.feed.page_size = 2;
        config.resolve_paths(tmp.path());

        let pool = db::create_pool(&config.db_path()).unwrap();
        db::run_migrations(&pool).unwrap();
        let app = routes::app(AppState::new(pool, config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            tmp,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn client(&self) -> Client {
        Client::builder().cookie_store(true).build().unwrap()
    }

    /// A client already signed up (and therefore signed in) as `username`.
    async fn user(&self, username: &str) -> Result<Client, Box<dyn std::error::Error>> {
        let client = self.client();
        let res = client
            .post(self.url("/auth/signup"))
            .json(&json!({ "username": username, "password": "pw123" }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::CREATED, "signup {username}");
        Ok(client)
    }

    async fn post_image(
        &self,
        client: &Client,
        description: &str,
    ) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
        let form = Form::new().text("description", description.to_string()).part(
            "image",
            Part::bytes(b"\xff\xd8fake-jpeg".to_vec())
                .file_name("photo.jpg")
                .mime_str("image/jpeg")?,
        );
        Ok(client
            .post(self.url("/posts"))
            .multipart(form)
            .send()
            .await?)
    }

    fn staging_is_empty(&self) -> bool {
        match std::fs::read_dir(self.tmp.path().join("staging")) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }
}

#[tokio::test]
async fn signup_login_logout() -> TestResult {
    let server = TestServer::spawn(&[]).await;
    let client = server.user("alice").await?;

    let me: Value = client.get(server.url("/auth/me")).send().await?.json().await?;
    assert_eq!(me["username"], "alice");
    assert_eq!(me["is_admin"], false);

    let res = client.post(server.url("/auth/logout")).send().await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = client.get(server.url("/auth/me")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(server.url("/auth/login"))
        .json(&json!({ "username": "alice", "password": "wrong" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let res = client.get(server.url("/auth/me")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(server.url("/auth/login"))
        .json(&json!({ "username": "alice", "password": "pw123" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 64);

    // The same token works as a bearer credential
    let me: Value = server
        .client()
        .get(server.url("/auth/me"))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(me["username"], "alice");

    Ok(())
}

#[tokio::test]
async fn signup_rejections() -> TestResult {
    let server = TestServer::spawn(&[]).await;
    server.user("alice").await?;
    let client = server.client();

    for (username, password) in [
        ("ab", "pw123"),
        ("alice", "pw123"),
        ("stupidname", "pw123"),
        ("carol", "pw"),
    ] {
        let res = client
            .post(server.url("/auth/signup"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        assert_eq!(
            res.status(),
            StatusCode::UNPROCESSABLE_ENTITY,
            "{username}/{password}"
        );
        let body: Value = res.json().await?;
        assert!(body["error"].is_string());
    }

    let res = client
        .post(server.url("/auth/login"))
        .json(&json!({ "username": "nobody", "password": "pw123" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn posting_requires_a_session() -> TestResult {
    let server = TestServer::spawn(&[]).await;
    let res = server.post_image(&server.client(), "hello").await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn post_then_browse_feed() -> TestResult {
    let server = TestServer::spawn(&[]).await;
    let alice = server.user("alice").await?;

    let res = server.post_image(&alice, "Sunset at the beach").await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await?;
    assert!(created["id"].as_i64().unwrap() > 0);
    server.post_image(&alice, "my cat").await?;
    server.post_image(&alice, "SUNSET again").await?;
    assert!(server.staging_is_empty());

    // The feed is public
    let anon = server.client();
    let all: Vec<Value> = anon.get(server.url("/feed")).send().await?.json().await?;
    assert_eq!(all.len(), 3);

    let sunsets: Vec<Value> = anon
        .get(server.url("/feed?q=sunset"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(sunsets.len(), 2);
    assert!(sunsets.iter().all(|p| p["description"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("sunset")));

    let none: Vec<Value> = anon
        .get(server.url("/feed?q=xyz"))
        .send()
        .await?
        .json()
        .await?;
    assert!(none.is_empty());

    // Images are served from durable media
    let image = sunsets[0]["image"].as_str().unwrap();
    assert!(image.starts_with("/media/"));
    let res = anon.get(server.url(image)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.bytes().await?.as_ref(), b"\xff\xd8fake-jpeg");

    Ok(())
}

#[tokio::test]
async fn pages_are_newest_first() -> TestResult {
    let server = TestServer::spawn(&[]).await;
    let alice = server.user("alice").await?;
    for description in ["one", "two", "three"] {
        server.post_image(&alice, description).await?;
    }

    let first: Vec<Value> = alice
        .get(server.url("/posts?page=1"))
        .send()
        .await?
        .json()
        .await?;
    let second: Vec<Value> = alice
        .get(server.url("/posts?page=2"))
        .send()
        .await?
        .json()
        .await?;
    let descriptions: Vec<&str> = first
        .iter()
        .chain(second.iter())
        .map(|p| p["description"].as_str().unwrap())
        .collect();
    assert_eq!(descriptions, vec!["three", "two", "one"]);

    let res = alice.get(server.url("/posts?page=0")).send().await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn rejected_post_leaves_nothing_behind() -> TestResult {
    let server = TestServer::spawn(&[]).await;
    let alice = server.user("alice").await?;

    let res = server.post_image(&alice, &"x".repeat(101)).await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = server.post_image(&alice, "selling cocaine").await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = alice
        .post(server.url("/posts"))
        .multipart(Form::new().text("description", "no image"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let feed: Vec<Value> = alice.get(server.url("/feed")).send().await?.json().await?;
    assert!(feed.is_empty());
    assert!(server.staging_is_empty());

    Ok(())
}

#[tokio::test]
async fn only_the_author_deletes_a_post() -> TestResult {
    let server = TestServer::spawn(&[]).await;
    let alice = server.user("alice").await?;
    let bob = server.user("bob").await?;

    let created: Value = server.post_image(&alice, "mine").await?.json().await?;
    let id = created["id"].as_i64().unwrap();
    let feed: Vec<Value> = alice.get(server.url("/feed")).send().await?.json().await?;
    let image = feed[0]["image"].as_str().unwrap().to_string();

    let res = bob.delete(server.url(&format!("/posts/{id}"))).send().await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = alice.delete(server.url(&format!("/posts/{id}"))).send().await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = alice.get(server.url(&image)).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = alice.delete(server.url(&format!("/posts/{id}"))).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn profiles() -> TestResult {
    let server = TestServer::spawn(&[]).await;
    let alice = server.user("alice").await?;
    let bob = server.user("bob").await?;

    let own: Value = alice.get(server.url("/profile")).send().await?.json().await?;
    assert_eq!(own["username"], "alice");
    assert_eq!(own["bio_text"], "No bio yet.");
    assert_eq!(own["has_profile_image"], false);

    let res = alice
        .put(server.url("/profile/bio"))
        .json(&json!({ "bio": "I like sunsets" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = alice
        .put(server.url("/profile/bio"))
        .json(&json!({ "bio": "b".repeat(81) }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let form = Form::new().part(
        "image",
        Part::bytes(b"png-bytes".to_vec())
            .file_name("me.png")
            .mime_str("image/png")?,
    );
    let res = alice
        .put(server.url("/profile/image"))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let uri = body["profile_image"].as_str().unwrap().to_string();
    assert!(uri.starts_with("/media/"));

    server.post_image(&alice, "nice day").await?;

    let seen: Value = bob
        .get(server.url("/users/alice"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(seen["bio"], "I like sunsets");
    assert_eq!(seen["profile_image"], uri.as_str());
    assert_eq!(seen["posts"].as_array().unwrap().len(), 1);
    assert_eq!(seen["posts"][0]["content"], "nice day");

    let res = bob.get(server.url("/users/ghost")).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn admin_bulk_deletes() -> TestResult {
    let server = TestServer::spawn(&["admin"]).await;
    let admin = server.user("admin").await?;
    let alice = server.user("alice").await?;
    server.post_image(&alice, "one").await?;
    server.post_image(&alice, "two").await?;

    let res = alice
        .post(server.url("/admin/posts/delete-all"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let body: Value = admin
        .post(server.url("/admin/posts/delete-all"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["deleted"], 2);
    let feed: Vec<Value> = alice.get(server.url("/feed")).send().await?.json().await?;
    assert!(feed.is_empty());

    let body: Value = admin
        .post(server.url("/admin/users/delete-all"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["deleted"], 2);

    // Sessions went with the users
    let res = alice.get(server.url("/auth/me")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Names are free again
    server.user("alice").await?;

    Ok(())
}

#[tokio::test]
async fn text_posts_live_on_the_profile() -> TestResult {
    let server = TestServer::spawn(&[]).await;
    let alice = server.user("alice").await?;
    let bob = server.user("bob").await?;

    let res = server
        .client()
        .post(server.url("/profile/posts"))
        .json(&json!({ "content": "anonymous thoughts" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = alice
        .post(server.url("/profile/posts"))
        .json(&json!({ "content": "Share your ideas" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let id = res.json::<Value>().await?["id"].as_i64().unwrap();

    for content in ["x".repeat(301), "   ".to_string(), "selling cocaine".to_string()] {
        let res = alice
            .post(server.url("/profile/posts"))
            .json(&json!({ "content": content }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY, "{content:?}");
    }

    let seen: Value = bob.get(server.url("/users/alice")).send().await?.json().await?;
    assert_eq!(seen["posts"].as_array().unwrap().len(), 1);
    assert_eq!(seen["posts"][0]["content"], "Share your ideas");

    // Text posts stay off the image feed
    let feed: Vec<Value> = bob.get(server.url("/feed")).send().await?.json().await?;
    assert!(feed.is_empty());

    let res = bob
        .delete(server.url(&format!("/profile/posts/{id}")))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = alice
        .delete(server.url(&format!("/profile/posts/{id}")))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let own: Value = alice.get(server.url("/profile")).send().await?.json().await?;
    assert!(own["posts"].as_array().unwrap().is_empty());

    let res = alice
        .delete(server.url(&format!("/profile/posts/{id}")))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn new_profile_image_replaces_the_old_file() -> TestResult {
    let server = TestServer::spawn(&[]).await;
    let alice = server.user("alice").await?;

    let mut uris = Vec::new();
    for name in ["one.png", "two.png"] {
        let form = Form::new().part(
            "image",
            Part::bytes(b"png-bytes".to_vec())
                .file_name(name)
                .mime_str("image/png")?,
        );
        let body: Value = alice
            .put(server.url("/profile/image"))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;
        uris.push(body["profile_image"].as_str().unwrap().to_string());
    }

    let res = alice.get(server.url(&uris[0])).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = alice.get(server.url(&uris[1])).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(server.staging_is_empty());

    Ok(())
}
