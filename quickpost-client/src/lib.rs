mod cache;
pub use cache::{CacheConfig, FetchStatus, MemoryCache, QueryCache};

mod client_id;
pub use client_id::ClientIdGenerator;

pub mod key;
pub use key::{KeySegment, QueryKey};

mod mutation;
pub use mutation::{
    CoordinatorOptions, CreateCommentMutation, MutationPhase, MutationSnapshot,
    OptimisticMutationCoordinator, PendingMutation,
};

mod query;
pub use query::{InfiniteCommentsQuery, NextPage, PAGE_SIZE};

#[cfg(test)]
mod fuzz;

pub mod api {
    pub use quickpost_api::*;
}
