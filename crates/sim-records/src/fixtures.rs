//! Sample data fixtures for testing.
//!
//! This module provides ready-made test data for other crates to use.
//! Enable the `test-fixtures` feature to access these helpers.
//!
//! # Example
//!
//! ```ignore
//! // In your Cargo.toml:
//! // [dev-dependencies]
//! // sim-records = { path = "../sim-records", features = ["test-fixtures"] }
//!
//! use sim_records::fixtures;
//!
//! let posts = fixtures::sample_posts();
//! let profiles = fixtures::sample_profiles();
//! ```

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{AgentProfile, Post};

/// Returns sample posts from the fixtures file.
///
/// Contains 12 posts spread over one day:
/// - 4 from a news account (climate, sports, compilers, transit)
/// - 1 each from the four sample agents
/// - 2 each from a science desk and a sports wire
pub fn sample_posts() -> Vec<Post> {
    let jsonl = include_str!("../tests/fixtures/sample_posts.jsonl");
    jsonl
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            Post::from_jsonl(l).unwrap_or_else(|e| {
                panic!("Failed to parse post line: {}\nError: {}", l, e)
            })
        })
        .collect()
}

/// Returns sample agent profiles from the fixtures file.
///
/// Contains alice (climate), bob (sports), carol (compilers) and dave
/// (gardening), in handle order.
pub fn sample_profiles() -> Vec<AgentProfile> {
    let jsonl = include_str!("../tests/fixtures/sample_profiles.jsonl");
    jsonl
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            AgentProfile::from_jsonl(l).unwrap_or_else(|e| {
                panic!("Failed to parse profile line: {}\nError: {}", l, e)
            })
        })
        .collect()
}

/// Returns a specific post by URI from the sample posts.
pub fn get_post(uri: &str) -> Option<Post> {
    sample_posts().into_iter().find(|p| p.uri == uri)
}

/// Fixed base time for synthetic posts.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Builds `count` posts by `author`, one minute apart, with URIs
/// `p1..=p{count}`; `p{count}` is the newest.
pub fn posts_by(author: &str, count: usize) -> Vec<Post> {
    (1..=count)
        .map(|i| {
            Post::new(
                format!("p{}", i),
                author,
                format!("post number {} by {}", i, author),
                base_time() + Duration::minutes(i as i64),
            )
        })
        .collect()
}
