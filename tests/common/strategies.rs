#![allow(dead_code)]

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::{json, Value};

use catalog_core::config::DEFAULT_ALLOWED_GENRES;

/// Strategy for generating display titles
pub fn title_strategy() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{1,10}( [A-Z][a-z]{1,8})?"
}

/// Strategy for generating release years well inside the accepted range
pub fn year_strategy() -> impl Strategy<Value = i64> {
    1920i64..2020
}

/// Strategy for generating one to three allowed genres
pub fn genre_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::sample::subsequence(DEFAULT_ALLOWED_GENRES.to_vec(), 1..=3)
        .prop_map(|genres| genres.into_iter().map(str::to_string).collect())
}

/// Strategy for generating cast lists
pub fn cast_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[A-Z][a-z]{2,8} [A-Z][a-z]{2,10}", 1..4)
}

/// Strategy for generating a valid movie payload object
pub fn movie_strategy() -> impl Strategy<Value = Value> {
    (title_strategy(), year_strategy(), genre_strategy(), cast_strategy()).prop_map(
        |(title, year, genre, cast)| {
            json!({
                "title": title,
                "year": year,
                "genre": genre,
                "cast": cast,
            })
        },
    )
}

/// Strategy for generating batches of valid movies with distinct title and year
pub fn movie_batch_strategy() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(movie_strategy(), 1..6).prop_map(|movies| {
        let mut by_key = BTreeMap::new();
        for movie in movies {
            let key = (movie["title"].to_string(), movie["year"].to_string());
            by_key.entry(key).or_insert(movie);
        }
        by_key.into_values().collect()
    })
}

/// Strategy for generating payload bytes of any quality: valid, invalid or garbage
pub fn arbitrary_payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        movie_batch_strategy().prop_map(|batch| Value::Array(batch).to_string().into_bytes()),
        movie_strategy().prop_map(|movie| movie.to_string().into_bytes()),
        (title_strategy(), any::<i64>(), prop::collection::vec(".{0,12}", 0..8)).prop_map(
            |(title, year, genre)| json!({"title": title, "year": year, "genre": genre})
                .to_string()
                .into_bytes()
        ),
        prop::collection::vec(any::<u8>(), 0..64),
    ]
}

/// Strategy for generating minute offsets for `updatedAt`
pub fn minute_strategy() -> impl Strategy<Value = i64> {
    0i64..10_000
}
