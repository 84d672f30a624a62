use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use futures::{channel::mpsc, future, StreamExt};
use quickpost_client::{
    api::{self, Comment, CommentPages},
    CacheConfig, CreateCommentMutation, InfiniteCommentsQuery, MemoryCache, NextPage,
    OptimisticMutationCoordinator,
};
use quickpost_mock_server::{MockConfig, MockServer};

#[derive(structopt::StructOpt)]
struct Opt {
    /// Probability for each comment creation to fail
    #[structopt(long, env = "QUICKPOST_FAILURE_RATE", default_value = "0.1")]
    failure_rate: f64,

    /// Minimum simulated latency of comment creation
    #[structopt(long, env = "QUICKPOST_MIN_DELAY_MS", default_value = "2000")]
    min_delay_ms: u64,

    /// Maximum simulated latency of comment creation
    #[structopt(long, env = "QUICKPOST_MAX_DELAY_MS", default_value = "4000")]
    max_delay_ms: u64,

    /// json-server database to start from, as output by generate-test-data
    #[structopt(long, env = "QUICKPOST_DATA", parse(from_os_str))]
    data: Option<PathBuf>,

    /// Seed for the simulated latency and failures
    #[structopt(long)]
    seed: Option<u64>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Post comments, all at once
    Post {
        /// Only display the comments once the server confirmed them
        #[structopt(long)]
        plain: bool,

        #[structopt(required = true)]
        texts: Vec<String>,
    },

    /// Display the latest comments
    Pages {
        /// Number of pages to load
        #[structopt(long, default_value = "1")]
        count: usize,
    },
}

fn mock_server(opt: &Opt) -> anyhow::Result<MockServer> {
    anyhow::ensure!(
        opt.min_delay_ms <= opt.max_delay_ms,
        "minimum delay {}ms is above maximum delay {}ms",
        opt.min_delay_ms,
        opt.max_delay_ms,
    );
    anyhow::ensure!(
        (0.0..=1.0).contains(&opt.failure_rate),
        "failure rate {} is not a probability",
        opt.failure_rate,
    );
    let config = MockConfig {
        min_delay: Duration::from_millis(opt.min_delay_ms),
        max_delay: Duration::from_millis(opt.max_delay_ms),
        failure_rate: opt.failure_rate,
        seed: opt.seed,
    };
    match &opt.data {
        None => Ok(MockServer::new(config)),
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading database file {path:?}"))?;
            MockServer::from_json(config, &json)
        }
    }
}

fn print_comment(c: &Comment) {
    let status = match c.client_id {
        Some(id) if c.is_placeholder_for(id) => String::from("posting..."),
        _ => format!("#{}", c.id.0),
    };
    println!(
        "  {status:>12} {} ({}) at {}: {}",
        c.user.name,
        c.user.avatar,
        c.created_at.format("%Y-%m-%d %H:%M:%S"),
        c.text
    );
}

fn print_pages(data: &CommentPages) {
    for (page, param) in data.pages.iter().zip(data.page_params.iter()) {
        println!("page {param} ({} comments in total):", page.total_count);
        for c in page.comments.iter() {
            print_comment(c);
        }
    }
}

async fn print_transitions(mut updates: mpsc::UnboundedReceiver<Option<CommentPages>>) {
    while let Some(update) = updates.next().await {
        println!("---");
        match update {
            None => println!("comment list dropped from the cache"),
            Some(data) => match data.pages.first() {
                None => println!("comment list is empty"),
                Some(first) => {
                    println!("first page ({} comments in total):", first.total_count);
                    for c in first.comments.iter() {
                        print_comment(c);
                    }
                }
            },
        }
    }
}

fn report(results: Vec<Result<Comment, api::Error>>) -> anyhow::Result<()> {
    println!("===");
    let mut num_failed = 0;
    for res in results {
        match res {
            Ok(c) => match c.client_id {
                Some(client_id) => println!("posted #{} (was {}): {}", c.id.0, client_id.0, c.text),
                None => println!("posted #{}: {}", c.id.0, c.text),
            },
            Err(err) if err.is_remote() => {
                num_failed += 1;
                println!("failed, nothing was posted and it can be resubmitted: {err}");
            }
            Err(err) => {
                num_failed += 1;
                println!("failed: {err}");
            }
        }
    }
    anyhow::ensure!(num_failed == 0, "{num_failed} comments could not be posted");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = <Opt as structopt::StructOpt>::from_args();

    let server = mock_server(&opt)?;
    let cache = MemoryCache::new(CacheConfig::default());
    let query = InfiniteCommentsQuery::new(cache.clone(), server.clone());

    match opt.cmd {
        Command::Post { plain, texts } => {
            for t in texts.iter() {
                api::validate_comment_text(t)
                    .with_context(|| format!("validating comment {t:?}"))?;
            }
            query
                .fetch_next_page()
                .await
                .context("loading the first page of comments")?;
            let printer = tokio::spawn(print_transitions(cache.subscribe(query.key())));

            let results = if plain {
                let mutation = CreateCommentMutation::new(cache.clone(), server.clone());
                future::join_all(texts.into_iter().map(|t| mutation.submit(t))).await
            } else {
                let coord = OptimisticMutationCoordinator::new(cache.clone(), server.clone());
                future::join_all(texts.into_iter().map(|t| coord.submit(t))).await
            };

            // the printer stops once no handle to the cache is left
            drop(query);
            drop(cache);
            printer.await.context("waiting for the cache printer")?;
            report(results)?;
        }
        Command::Pages { count } => {
            for _ in 0..count {
                let next = query
                    .fetch_next_page()
                    .await
                    .context("fetching comments")?;
                if next == NextPage::Exhausted {
                    tracing::info!("no more comments to load");
                    break;
                }
            }
            match query.data() {
                None => println!("no comments"),
                Some(data) => print_pages(&data),
            }
        }
    }

    Ok(())
}
