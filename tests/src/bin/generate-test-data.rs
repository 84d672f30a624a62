use chrono::{Duration, Utc};
use quickpost_api::{Comment, CommentId, User};
use quickpost_mock_server::JsonDb;
use rand::Rng;

const NUM_COMMENTS: u64 = 42;
const MIN_COMMENT_WORDS: usize = 3;
const MAX_COMMENT_WORDS: usize = 40;

/// Comments are spread over this many minutes before now
const HISTORY_MINUTES: i64 = 60 * 24 * 7;

const AUTHORS: &[(&str, &str)] = &[
    ("User", "U"),
    ("Alice Martin", "AM"),
    ("Bob Dupont", "BD"),
    ("Chloé Bernard", "CB"),
];

fn gen_comment_text(rng: &mut impl Rng) -> String {
    lipsum::lipsum_words(rng.gen_range(MIN_COMMENT_WORDS..=MAX_COMMENT_WORDS))
}

fn gen_user(rng: &mut impl Rng) -> User {
    let (name, avatar) = AUTHORS[rng.gen_range(0..AUTHORS.len())];
    User::new(name, avatar)
}

fn main() {
    let mut rng = rand::thread_rng();
    let now = Utc::now();

    let mut minutes_ago = (0..NUM_COMMENTS)
        .map(|_| rng.gen_range(0..HISTORY_MINUTES))
        .collect::<Vec<_>>();
    // ids follow creation order, like json-server would assign them
    minutes_ago.sort_unstable_by(|a, b| b.cmp(a));

    let comments = minutes_ago
        .into_iter()
        .zip(1..)
        .map(|(ago, id)| Comment {
            id: CommentId(id),
            client_id: None,
            text: gen_comment_text(&mut rng),
            user: gen_user(&mut rng),
            created_at: now - Duration::minutes(ago),
        })
        .collect();

    let db = serde_json::to_string_pretty(&JsonDb { comments })
        .expect("serializing the generated comments");
    println!("{db}");
}
