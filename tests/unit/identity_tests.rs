use std::collections::BTreeMap;
use std::sync::Arc;

use form_pilot::models::identity::{IdentityField, ViewportProfile};
use form_pilot::models::run::{IdentityMode, RunConfiguration};
use form_pilot::orchestrator::identity::{sequential_username, IdentityGenerator, SEQUENCE_COUNTER};
use form_pilot::persistence::counter_repo::IdentityCounterRepo;
use form_pilot::persistence::db;
use form_pilot::AppError;

fn run_config(mode: IdentityMode, base: Option<&str>) -> RunConfiguration {
    RunConfiguration {
        credential: "Pa55word!".into(),
        mode,
        custom_base: base.map(str::to_owned),
        proxies: String::new(),
        flags: BTreeMap::new(),
    }
}

fn viewports() -> Vec<ViewportProfile> {
    vec![
        ViewportProfile {
            name: "laptop".into(),
            width: 1366,
            height: 768,
            scale: 1.0,
        },
        ViewportProfile {
            name: "retina".into(),
            width: 1440,
            height: 900,
            scale: 2.0,
        },
    ]
}

async fn generator(start: i64) -> (IdentityGenerator, IdentityCounterRepo) {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    let counter = IdentityCounterRepo::new(database);
    (
        IdentityGenerator::new(counter.clone(), start, viewports()),
        counter,
    )
}

#[tokio::test]
async fn sequential_mode_produces_padded_suffixes_and_advances_counter() {
    let (generator, counter) = generator(5).await;
    let config = run_config(IdentityMode::CustomSequential, Some("pilot"));

    let mut usernames = Vec::new();
    for _ in 0..3 {
        usernames.push(generator.generate(&config).await.expect("identity").username);
    }

    assert_eq!(usernames, ["pilot05", "pilot06", "pilot07"]);
    assert_eq!(
        counter.current(SEQUENCE_COUNTER).await.expect("read"),
        Some(8)
    );
}

#[tokio::test]
async fn sequential_mode_without_base_fails() {
    let (generator, counter) = generator(1).await;
    let result = generator
        .generate(&run_config(IdentityMode::CustomSequential, Some("  ")))
        .await;
    assert!(matches!(result, Err(AppError::Config(_))));
    assert_eq!(counter.current(SEQUENCE_COUNTER).await.expect("read"), None);
}

#[tokio::test]
async fn random_mode_builds_lowercase_username_and_copies_credential() {
    let (generator, counter) = generator(1).await;
    let identity = generator
        .generate(&run_config(IdentityMode::Random, None))
        .await
        .expect("identity");

    assert!(!identity.username.is_empty());
    assert!(identity
        .username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    assert!(identity
        .username
        .starts_with(&identity.given_name.to_ascii_lowercase()));
    assert_eq!(identity.credential, "Pa55word!");
    assert_eq!(identity.field(IdentityField::Credential), "Pa55word!");
    assert_eq!(identity.field(IdentityField::Username), identity.username);
    assert!(viewports().contains(&identity.viewport));
    assert_eq!(counter.current(SEQUENCE_COUNTER).await.expect("read"), None);
}

#[test]
fn sequential_username_pads_to_two_digits() {
    assert_eq!(sequential_username("pilot", 0), "pilot00");
    assert_eq!(sequential_username("pilot", 7), "pilot07");
    assert_eq!(sequential_username("pilot", 123), "pilot123");
}
