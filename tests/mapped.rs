use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use batchfetch::{
    Context, LoadError, Loader, MappedFetchError, MappedFetcher, MappedOutput,
};

/// Serves a fixed table; key "3" resolves but carries a keyed error.
struct Table;

#[async_trait]
impl MappedFetcher for Table {
    type Key = String;
    type Value = String;

    async fn fetch(&self, _cx: &Context, _keys: &[String]) -> MappedOutput<String, String> {
        let mut values = HashMap::new();
        values.insert("1".to_owned(), "one".to_owned());
        values.insert("3".to_owned(), "three".to_owned());
        let mut errors = HashMap::new();
        errors.insert("3".to_owned(), LoadError::fetch("stale entry"));
        MappedOutput::with_error(values, MappedFetchError::Keyed(errors))
    }
}

#[tokio::test]
async fn missing_key_is_not_found() {
    let loader = Loader::mapped_builder(Table)
        .wait(Duration::from_millis(5))
        .build();
    let cx = Context::new();

    let err = loader.load(&cx, "2".to_owned()).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "batchfetch: not found");
}

#[tokio::test]
async fn keyed_errors_attach_to_their_slots() {
    let loader = Loader::mapped_builder(Table)
        .wait(Duration::from_millis(5))
        .batch_capacity(3)
        .build();
    let cx = Context::new();

    let one = loader.load_thunk(&cx, "1".to_owned());
    let two = loader.load_thunk(&cx, "2".to_owned());
    let three = loader.load_thunk(&cx, "3".to_owned());

    assert_eq!(one.get().await.unwrap(), "one");
    assert!(two.get().await.unwrap_err().is_not_found());
    assert_eq!(three.get().await.unwrap_err().to_string(), "stale entry");
}

#[tokio::test]
async fn whole_error_covers_resolved_keys_only() {
    struct Failing;

    #[async_trait]
    impl MappedFetcher for Failing {
        type Key = String;
        type Value = String;

        async fn fetch(&self, _cx: &Context, _keys: &[String]) -> MappedOutput<String, String> {
            let mut values = HashMap::new();
            values.insert("1".to_owned(), "one".to_owned());
            MappedOutput::with_error(values, LoadError::fetch("backend down").into())
        }
    }

    let loader = Loader::mapped_builder(Failing).batch_capacity(2).build();
    let cx = Context::new();

    let one = loader.load_thunk(&cx, "1".to_owned());
    let two = loader.load_thunk(&cx, "2".to_owned());

    // The resolved key carries the batch error; the absent key stays a miss.
    assert_eq!(one.get().await.unwrap_err().to_string(), "backend down");
    assert!(two.get().await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn successful_map_resolves_every_slot() {
    struct Echo;

    #[async_trait]
    impl MappedFetcher for Echo {
        type Key = String;
        type Value = String;

        async fn fetch(&self, _cx: &Context, keys: &[String]) -> MappedOutput<String, String> {
            MappedOutput::from_map(
                keys.iter()
                    .map(|key| (key.clone(), key.to_uppercase()))
                    .collect(),
            )
        }
    }

    let loader = Loader::mapped_builder(Echo)
        .wait(Duration::from_millis(5))
        .build();
    let cx = Context::new();

    let values = loader
        .load_all(&cx, &["a".to_owned(), "b".to_owned()])
        .await
        .unwrap();
    assert_eq!(values, vec!["A", "B"]);
}

#[test]
fn keyed_error_display() {
    let mut errors = HashMap::new();
    errors.insert("k", LoadError::fetch("oops"));
    let err = MappedFetchError::Keyed(errors);
    assert_eq!(err.to_string(), "Mapped errors: [\"k\": oops]");

    let err: MappedFetchError<&str> = LoadError::fetch("oops").into();
    assert_eq!(err.to_string(), "oops");
}
