#![cfg(test)]

use std::{collections::VecDeque, panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use futures::{
    channel::oneshot,
    future::{FutureExt, LocalBoxFuture},
};
use parking_lot::Mutex;
use quickpost_mock_server::{MockConfig, MockServer};

use crate::{
    api::{Comment, CommentListing, CommentPages, Error, NewComment, PageParam, RemoteCommentStore},
    CacheConfig, InfiniteCommentsQuery, MemoryCache, OptimisticMutationCoordinator, QueryCache,
};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    Submit {
        #[generator(bolero::generator::gen_with::<String>().len(1..20usize))]
        text: String,
    },
    Answer {
        idx: usize,
        ok: bool,
    },
    Abandon {
        idx: usize,
    },
    FetchNextPage,
    Refetch,
}

/// Mock server whose `create_comment` calls each wait to be told whether to
/// succeed, in call order
struct FuzzStore {
    server: MockServer,
    answers: Arc<Mutex<VecDeque<oneshot::Receiver<bool>>>>,
}

#[async_trait]
impl RemoteCommentStore for FuzzStore {
    async fn create_comment(&self, c: NewComment) -> Result<Comment, Error> {
        let answer = self
            .answers
            .lock()
            .pop_front()
            .expect("create_comment called without an answer queued");
        // abandoned submissions drop their sender
        let succeed = answer.await.unwrap_or(false);
        c.validate()?;
        if !succeed {
            self.server.test_fail_next().await;
        }
        self.server.create_comment(c).await
    }

    async fn fetch_comments(&self, page: PageParam, limit: usize) -> Result<CommentListing, Error> {
        self.server.fetch_comments(page, limit).await
    }
}

fn is_placeholder(c: &Comment) -> bool {
    c.client_id.map_or(false, |id| c.is_placeholder_for(id))
}

fn is_confirmed(c: &Comment) -> bool {
    c.client_id.map_or(false, |id| c.id != id)
}

fn check_invariants(
    coord: &OptimisticMutationCoordinator<MemoryCache<CommentPages>, FuzzStore>,
    data: Option<CommentPages>,
    fetched_totals: &[u64],
) {
    let data = match data {
        None => return,
        Some(d) => d,
    };

    // at most one entry per client id
    let mut client_ids = data.comments().filter_map(|c| c.client_id).collect::<Vec<_>>();
    let num_client_ids = client_ids.len();
    client_ids.sort();
    client_ids.dedup();
    assert_eq!(client_ids.len(), num_client_ids, "duplicate client id in {data:#?}");

    // placeholders only exist for unsettled submissions
    let pending = coord.pending();
    for c in data.comments().filter(|c| is_placeholder(c)) {
        assert!(
            pending.iter().any(|m| Some(m.client_id) == c.client_id),
            "stranded placeholder {c:?}, pending submissions are {pending:?}"
        );
    }

    // counts stay consistent with what the server reported
    if let Some(first) = data.pages.first() {
        let optimistic = data
            .comments()
            .filter(|c| is_placeholder(c) || is_confirmed(c))
            .count() as u64;
        let base = first.total_count.checked_sub(optimistic);
        assert!(
            base.map_or(false, |b| fetched_totals.contains(&b)),
            "total count {} with {optimistic} optimistic entries does not match any fetched total in {fetched_totals:?}",
            first.total_count,
        );
    }
}

do_tokio_test!(fuzz_optimistic_submissions, Vec<FuzzOp>, |ops: Vec<FuzzOp>| async move {
    let server = MockServer::new(MockConfig::instant());
    let cache = MemoryCache::new(CacheConfig::default());
    let query = InfiniteCommentsQuery::new(cache.clone(), server.clone());
    let answers = Arc::new(Mutex::new(VecDeque::new()));
    let coord = OptimisticMutationCoordinator::new(
        cache.clone(),
        FuzzStore {
            server: server.clone(),
            answers: answers.clone(),
        },
    );
    let mut fetched_totals = Vec::new();
    let mut inflight: Vec<(
        LocalBoxFuture<'_, Result<Comment, Error>>,
        oneshot::Sender<bool>,
    )> = Vec::new();

    for op in ops {
        match op {
            FuzzOp::Submit { text } => {
                let (answer, answered) = oneshot::channel();
                answers.lock().push_back(answered);
                let mut submit = coord.submit(text).boxed_local();
                assert!(futures::poll!(&mut submit).is_pending());
                inflight.push((submit, answer));
            }
            FuzzOp::Answer { idx, ok } => {
                if inflight.is_empty() {
                    continue;
                }
                let (submit, answer) = inflight.remove(idx % inflight.len());
                let _ = answer.send(ok);
                if let Ok(saved) = submit.await {
                    assert!(saved.client_id.is_some());
                    let cached = cache.get(coord.key()).and_then(|d| {
                        d.comments()
                            .find(|c| c.id == saved.id && c.client_id.is_some())
                            .cloned()
                    });
                    if let Some(cached) = cached {
                        assert_eq!(cached, saved);
                    }
                }
            }
            FuzzOp::Abandon { idx } => {
                if !inflight.is_empty() {
                    drop(inflight.remove(idx % inflight.len()));
                }
            }
            FuzzOp::FetchNextPage => {
                let loads_first_page = cache.get(coord.key()).is_none();
                query.fetch_next_page().await.expect("fetching next page");
                if loads_first_page {
                    fetched_totals.push(server.test_num_comments().await as u64);
                }
            }
            FuzzOp::Refetch => {
                query.refetch().await.expect("refetching");
                fetched_totals.push(server.test_num_comments().await as u64);
            }
        }
        check_invariants(&coord, cache.get(coord.key()), &fetched_totals);
    }

    inflight.clear();
    assert!(coord.pending().is_empty());
    check_invariants(&coord, cache.get(coord.key()), &fetched_totals);
    if let Some(data) = cache.get(coord.key()) {
        assert!(!data.comments().any(is_placeholder));
    }
});
