mod common;

use anyhow::Result;

fn signup(
    client: &reqwest::blocking::Client,
    base_url: &str,
    email: &str,
    password: &str,
    name: &str,
) -> Result<reqwest::blocking::Response> {
    Ok(client
        .post(format!("{}/signup", base_url))
        .json(&serde_json::json!({
            "email": email,
            "password": password,
            "name": name,
        }))
        .send()?)
}

fn login(
    client: &reqwest::blocking::Client,
    base_url: &str,
    email: &str,
    password: &str,
) -> Result<reqwest::blocking::Response> {
    Ok(client
        .post(format!("{}/login", base_url))
        .json(&serde_json::json!({
            "email": email,
            "password": password,
        }))
        .send()?)
}

#[test]
fn signup_approve_login_over_http() -> Result<()> {
    let server = common::spawn_server()?;
    let client = reqwest::blocking::Client::new();

    let resp = signup(&client, &server.base_url, "ada@example.com", "pw", "Ada")?;
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json()?;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["delivery"], "skipped");

    // Approval pending, login forbidden.
    let resp = login(&client, &server.base_url, "ada@example.com", "pw")?;
    assert_eq!(resp.status().as_u16(), 403);

    let approve_url = body["approve_url"].as_str().unwrap();
    let resp = client.get(approve_url).send()?;
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json()?;
    assert_eq!(body["status"], "approved");

    let resp = login(&client, &server.base_url, "ada@example.com", "pw")?;
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json()?;
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["name"], "Ada");
    Ok(())
}

#[test]
fn rejection_over_http_blocks_login() -> Result<()> {
    let server = common::spawn_server()?;
    let client = reqwest::blocking::Client::new();

    let resp = signup(&client, &server.base_url, "bob@example.com", "pw", "Bob")?;
    let body: serde_json::Value = resp.json()?;

    let reject_url = body["reject_url"].as_str().unwrap();
    let resp = client.get(reject_url).send()?;
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json()?;
    assert_eq!(body["status"], "rejected");

    let resp = login(&client, &server.base_url, "bob@example.com", "pw")?;
    assert_eq!(resp.status().as_u16(), 403);
    Ok(())
}

#[test]
fn malformed_token_is_a_bad_request() -> Result<()> {
    let server = common::spawn_server()?;
    let client = reqwest::blocking::Client::new();

    let resp = client
        .get(format!("{}/approve/not!a!token", server.base_url))
        .send()?;
    assert_eq!(resp.status().as_u16(), 400);

    // Decodes, but carries the wrong payload shape.
    let resp = client
        .get(format!("{}/reject/aGVsbG8", server.base_url))
        .send()?;
    assert_eq!(resp.status().as_u16(), 400);
    Ok(())
}

#[test]
fn expired_token_is_gone() -> Result<()> {
    let server = common::spawn_server()?;
    let client = reqwest::blocking::Client::new();

    let resp = signup(&client, &server.base_url, "ada@example.com", "pw", "Ada")?;
    let body: serde_json::Value = resp.json()?;
    let id = body["id"].as_i64().unwrap();

    // Same shape the server mints, aged one millisecond past the limit.
    let payload = serde_json::json!({
        "account_id": id,
        "email": "ada@example.com",
        "issued_at_ms": canteen::store::now_ms() - canteen::approval::TOKEN_TTL_MS - 1,
    });
    let token = canteen::token::encode(&payload.to_string());

    let resp = client
        .get(format!("{}/approve/{}", server.base_url, token))
        .send()?;
    assert_eq!(resp.status().as_u16(), 410);

    // Expiry wrote nothing; the freshly-issued link still redeems.
    let approve_url = body["approve_url"].as_str().unwrap();
    let resp = client.get(approve_url).send()?;
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json()?;
    assert_eq!(body["status"], "approved");
    Ok(())
}

#[test]
fn token_for_an_unknown_account_is_not_found() -> Result<()> {
    let server = common::spawn_server()?;
    let client = reqwest::blocking::Client::new();

    let payload = serde_json::json!({
        "account_id": 42,
        "email": "ghost@example.com",
        "issued_at_ms": canteen::store::now_ms(),
    });
    let token = canteen::token::encode(&payload.to_string());

    let resp = client
        .get(format!("{}/approve/{}", server.base_url, token))
        .send()?;
    assert_eq!(resp.status().as_u16(), 404);
    Ok(())
}

#[test]
fn duplicate_signup_conflicts() -> Result<()> {
    let server = common::spawn_server()?;
    let client = reqwest::blocking::Client::new();

    let resp = signup(&client, &server.base_url, "ada@example.com", "pw", "Ada")?;
    assert!(resp.status().is_success());

    let resp = signup(&client, &server.base_url, "ADA@example.com", "pw", "Ada")?;
    assert_eq!(resp.status().as_u16(), 409);
    Ok(())
}

#[test]
fn wrong_password_is_unauthorized() -> Result<()> {
    let server = common::spawn_server()?;
    let client = reqwest::blocking::Client::new();

    let resp = signup(&client, &server.base_url, "ada@example.com", "pw", "Ada")?;
    let body: serde_json::Value = resp.json()?;
    let approve_url = body["approve_url"].as_str().unwrap();
    client.get(approve_url).send()?;

    let resp = login(&client, &server.base_url, "ada@example.com", "nope")?;
    assert_eq!(resp.status().as_u16(), 401);

    let resp = login(&client, &server.base_url, "nobody@example.com", "pw")?;
    assert_eq!(resp.status().as_u16(), 404);
    Ok(())
}
