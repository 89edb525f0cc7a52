use std::collections::HashMap;

use async_trait::async_trait;
use batchfetch::{
    Context, FetchOutput, Fetcher, LoadError, Loader, MappedFetcher, MappedOutput,
};

// Resolves movie titles by year from an in-memory table. For this example the
// "expensive resource" is just a HashMap held by the fetcher.
struct TitleFetcher {
    titles: HashMap<i64, String>,
}

#[async_trait]
impl Fetcher for TitleFetcher {
    type Key = i64;
    type Value = String;

    async fn fetch(&self, _cx: &Context, keys: &[i64]) -> FetchOutput<String> {
        println!("fetching titles {keys:?}");
        FetchOutput::from_results(
            keys.iter()
                .map(|key| self.titles.get(key).cloned().ok_or(LoadError::NotFound))
                .collect(),
        )
    }
}

// The same idea as a mapping-style fetch: return whatever resolved, and keys
// absent from the map surface `LoadError::NotFound` to their requesters.
struct DirectorFetcher {
    directors: HashMap<String, String>,
}

#[async_trait]
impl MappedFetcher for DirectorFetcher {
    type Key = String;
    type Value = String;

    async fn fetch(&self, _cx: &Context, keys: &[String]) -> MappedOutput<String, String> {
        println!("fetching directors {keys:?}");
        MappedOutput::from_map(
            keys.iter()
                .filter_map(|key| {
                    self.directors
                        .get(key)
                        .map(|director| (key.clone(), director.clone()))
                })
                .collect(),
        )
    }
}

#[tokio::main]
async fn main() {
    let mut titles = HashMap::new();
    titles.insert(2001, "a space odyssey".to_owned());
    titles.insert(7, "samurai".to_owned());
    titles.insert(12, "angry men".to_owned());

    let loader = Loader::new(TitleFetcher { titles });
    let cx = Context::new();

    assert_eq!(loader.load(&cx, 7).await.unwrap(), "samurai");

    // 15 is not in the table. The failure is cached like any other outcome:
    // the second load returns the same error without fetching again (watch
    // the "fetching titles" lines).
    assert!(loader.load(&cx, 15).await.unwrap_err().is_not_found());
    assert!(loader.load(&cx, 15).await.unwrap_err().is_not_found());

    // Clear the cached failure to retry, or prime the value directly.
    loader.clear(&15);
    assert!(loader.prime(15, "minutes of fame".to_owned()));
    assert_eq!(loader.load(&cx, 15).await.unwrap(), "minutes of fame");

    // These two keys are coalesced into a single fetch.
    let titles = loader.load_all(&cx, &[12, 2001]).await.unwrap();
    println!("{titles:?}");

    let mut directors = HashMap::new();
    directors.insert("samurai".to_owned(), "Kurosawa".to_owned());
    directors.insert("angry men".to_owned(), "Lumet".to_owned());

    let directors = Loader::new_mapped(DirectorFetcher { directors });

    assert_eq!(
        directors.load(&cx, "samurai".to_owned()).await.unwrap(),
        "Kurosawa"
    );
    let missing = directors.load(&cx, "unknown".to_owned()).await.unwrap_err();
    assert!(missing.is_not_found());
    println!("unknown film: {missing}");
}
