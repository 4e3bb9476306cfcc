//! Object enumeration
//!
//! Turns the paginated `list_objects` primitive into a lazy stream of
//! [`ObjectDescriptor`]s. The stream is finite, yields keys in the order
//! the store returns them, and can be restarted by calling [`enumerate`]
//! again; it cannot be resumed mid-way.

use futures::stream::{self, Stream, StreamExt, TryStreamExt};

use crate::error::{Error, Result};
use crate::traits::{ListOptions, ObjectDescriptor, ObjectStore};

/// Default number of keys requested per page
pub const DEFAULT_PAGE_SIZE: i32 = 1000;

enum Cursor {
    First,
    After(String),
}

/// Stream every object in `bucket` whose key starts with `prefix`
///
/// A failure to fetch a page is yielded as a single
/// [`Error::StoreUnavailable`] (or [`Error::Auth`]) item, after which the
/// stream ends. Objects from earlier pages have already been yielded.
pub fn enumerate<'a>(
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    prefix: &'a str,
    page_size: i32,
) -> impl Stream<Item = Result<ObjectDescriptor>> + Send + 'a {
    let page_size = page_size.max(1);

    stream::unfold(Some((Cursor::First, 1usize)), move |state| async move {
        let (cursor, page_no) = state?;
        let options = ListOptions {
            prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
            max_keys: Some(page_size),
            continuation_token: match cursor {
                Cursor::First => None,
                Cursor::After(token) => Some(token),
            },
        };

        match store.list_objects(bucket, options).await {
            Ok(page) => {
                tracing::debug!(bucket, page = page_no, objects = page.objects.len(), "listed page");
                let next = match (page.truncated, page.continuation_token) {
                    (true, Some(token)) => Some((Cursor::After(token), page_no + 1)),
                    (true, None) => {
                        tracing::warn!(bucket, page = page_no, "truncated listing without continuation token");
                        None
                    }
                    (false, _) => None,
                };
                Some((Ok(page.objects), next))
            }
            Err(e) => Some((Err(list_error(bucket, page_no, e)), None)),
        }
    })
    .flat_map(|page| {
        let items: Vec<Result<ObjectDescriptor>> = match page {
            Ok(objects) => objects.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        stream::iter(items)
    })
}

/// Enumerate completely, failing if any page cannot be fetched
pub async fn collect_objects(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    page_size: i32,
) -> Result<Vec<ObjectDescriptor>> {
    enumerate(store, bucket, prefix, page_size).try_collect().await
}

fn list_error(bucket: &str, page_no: usize, err: Error) -> Error {
    match err {
        Error::Auth(_) | Error::StoreUnavailable(_) => err,
        other => Error::StoreUnavailable(format!(
            "cannot list bucket '{bucket}' (page {page_no}): {other}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ListPage, MockObjectStore};

    fn page(keys: &[&str], next: Option<&str>) -> ListPage {
        ListPage {
            objects: keys
                .iter()
                .map(|k| ObjectDescriptor::new(*k, 1, format!("etag-{k}")))
                .collect(),
            truncated: next.is_some(),
            continuation_token: next.map(str::to_string),
        }
    }

    fn paged_store() -> MockObjectStore {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .returning(|_, options| match options.continuation_token.as_deref() {
                None => Ok(page(&["a", "b"], Some("t1"))),
                Some("t1") => Ok(page(&["c", "d"], Some("t2"))),
                Some("t2") => Ok(page(&["e"], None)),
                Some(other) => panic!("unexpected token {other}"),
            });
        store
    }

    #[tokio::test]
    async fn test_enumerate_follows_continuation_tokens() {
        let store = paged_store();
        let keys: Vec<String> = collect_objects(&store, "bucket", "", 2)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.key)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_enumerate_is_restartable() {
        let store = paged_store();
        let first = collect_objects(&store, "bucket", "", 2).await.unwrap();
        let second = collect_objects(&store, "bucket", "", 2).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_enumerate_passes_prefix_and_page_size() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|bucket, options| {
                bucket == "photos"
                    && options.prefix.as_deref() == Some("2024/")
                    && options.max_keys == Some(50)
            })
            .times(1)
            .returning(|_, _| Ok(page(&["2024/a.jpg"], None)));

        let objects = collect_objects(&store, "photos", "2024/", 50).await.unwrap();
        assert_eq!(objects.len(), 1);
    }

    #[tokio::test]
    async fn test_first_page_failure_is_store_unavailable() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .returning(|_, _| Err(Error::General("connection refused".into())));

        let err = collect_objects(&store, "bucket", "", 10).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_auth_failure_passes_through() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .returning(|_, _| Err(Error::Auth("InvalidAccessKeyId".into())));

        let err = collect_objects(&store, "bucket", "", 10).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_later_page_failure_keeps_yielded_items() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .returning(|_, options| match options.continuation_token {
                None => Ok(page(&["a", "b"], Some("t1"))),
                Some(_) => Err(Error::General("reset".into())),
            });

        let items: Vec<Result<ObjectDescriptor>> =
            enumerate(&store, "bucket", "", 2).collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_ok());
        assert!(matches!(items[2], Err(Error::StoreUnavailable(_))));

        assert!(collect_objects(&store, "bucket", "", 2).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_without_token_terminates() {
        let mut store = MockObjectStore::new();
        store.expect_list_objects().times(1).returning(|_, _| {
            Ok(ListPage {
                objects: vec![ObjectDescriptor::new("a", 1, "e")],
                truncated: true,
                continuation_token: None,
            })
        });

        let objects = collect_objects(&store, "bucket", "", 10).await.unwrap();
        assert_eq!(objects.len(), 1);
    }
}
