mod common;

use std::time::Duration;

use ambit_data::prelude::*;
use ambit_data_sqlx::{tx_from_context, SqlxRepository, SqlxTransactor};
use common::{Author, Book};
use tokio_util::sync::CancellationToken;

async fn setup() -> (SqlxTransactor, SqlxRepository<Author>) {
    let pool = common::pool().await;
    (SqlxTransactor::new(pool.clone()), SqlxRepository::new(pool))
}

async fn total(repo: &SqlxRepository<Author>) -> u64 {
    repo.count(&Context::background(), &Specification::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn commits_on_success() {
    let (tx, repo) = setup().await;
    let ctx = Context::background();

    let inserted = tx
        .within_transaction(&ctx, |ctx| {
            let repo = repo.clone();
            async move {
                assert!(tx_from_context(&ctx).unwrap().is_some());
                let conn = repo.get_connection(&ctx).await?;
                assert!(conn.in_transaction());
                drop(conn);
                repo.insert(&ctx, Author::new("alice", 30)).await
            }
        })
        .await
        .unwrap();

    assert!(inserted.id > 0);
    assert_eq!(total(&repo).await, 1);
}

#[tokio::test]
async fn rolls_back_and_returns_the_same_error() {
    let (tx, repo) = setup().await;

    let err = tx
        .within_transaction(&Context::background(), |ctx| {
            let repo = repo.clone();
            async move {
                repo.insert(&ctx, Author::new("alice", 30)).await?;
                repo.insert(&ctx, Author::default()).await
            }
        })
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert!(err.to_string().contains("zero value"));
    assert_eq!(total(&repo).await, 0);
}

#[tokio::test]
async fn nested_calls_share_one_transaction() {
    let (tx, repo) = setup().await;

    let err = tx
        .within_transaction(&Context::background(), |outer| {
            let tx = tx.clone();
            let repo = repo.clone();
            async move {
                let outer_id = tx_from_context(&outer)?.map(|h| h.id());
                repo.insert(&outer, Author::new("outer", 1)).await?;

                tx.within_transaction(&outer, |inner| {
                    let repo = repo.clone();
                    async move {
                        assert_eq!(tx_from_context(&inner)?.map(|h| h.id()), outer_id);
                        repo.insert(&inner, Author::new("inner", 2)).await
                    }
                })
                .await?;

                // The inner call did not finish the shared transaction.
                assert_eq!(repo.count(&outer, &Specification::new()).await?, 2);
                Err::<(), _>(DataError::validation("abort after both writes"))
            }
        })
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(total(&repo).await, 0);
}

#[tokio::test]
async fn commit_and_rollback_without_a_transaction() {
    let (tx, _repo) = setup().await;
    let ctx = Context::background();

    tx.commit(&ctx).await.unwrap();
    tx.rollback(&ctx).await;
    assert!(!tx.in_transaction(&ctx).unwrap());
}

#[tokio::test]
async fn finished_handles() {
    let (tx, repo) = setup().await;

    let tx_ctx = tx.begin(&Context::background()).await.unwrap();
    assert!(tx.in_transaction(&tx_ctx).unwrap());
    repo.insert(&tx_ctx, Author::new("alice", 30)).await.unwrap();
    tx.commit(&tx_ctx).await.unwrap();

    let handle = tx_from_context(&tx_ctx).unwrap().unwrap();
    assert!(handle.is_finished().await);

    let err = tx.commit(&tx_ctx).await.unwrap_err();
    assert!(err.is_transaction());
    assert!(err.to_string().starts_with("error processing transaction"));

    // Rolling back a finished transaction is benign.
    tx.rollback(&tx_ctx).await;

    let err = repo
        .find_all(&tx_ctx, &Specification::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::TransactionFinished));

    assert_eq!(total(&repo).await, 1);
}

#[tokio::test]
async fn explicit_rollback_discards_writes() {
    let (tx, repo) = setup().await;

    let tx_ctx = tx.begin(&Context::background()).await.unwrap();
    repo.insert(&tx_ctx, Author::new("alice", 30)).await.unwrap();
    tx.rollback(&tx_ctx).await;

    assert_eq!(total(&repo).await, 0);
}

#[tokio::test]
async fn panics_roll_back() {
    let (tx, repo) = setup().await;

    let runner = tx.clone();
    let writer = repo.clone();
    let joined = tokio::spawn(async move {
        runner
            .within_transaction(&Context::background(), |ctx| async move {
                writer.insert(&ctx, Author::new("alice", 30)).await?;
                if ctx.has_transaction() {
                    panic!("handler exploded");
                }
                Ok::<_, DataError>(())
            })
            .await
    })
    .await;

    assert!(joined.unwrap_err().is_panic());
    assert_eq!(total(&repo).await, 0);
}

#[tokio::test]
async fn batches_join_the_ambient_transaction() {
    let (tx, repo) = setup().await;

    let err = tx
        .within_transaction(&Context::background(), |ctx| {
            let repo = repo.clone();
            async move {
                repo.insert_many(&ctx, vec![Author::new("a", 1), Author::new("b", 2)])
                    .await?;
                Err::<(), _>(DataError::validation("abort"))
            }
        })
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(total(&repo).await, 0);
}

#[tokio::test]
async fn batches_are_all_or_nothing() {
    let pool = common::pool().await;
    let books = SqlxRepository::<Book>::new(pool);
    let ctx = Context::background();

    let mut first = Book::new(1, "Dune");
    first.base.id = "duplicate".to_string();
    let mut second = Book::new(1, "Dune Messiah");
    second.base.id = "duplicate".to_string();

    let err = books.insert_many(&ctx, vec![first, second]).await.unwrap_err();
    assert!(matches!(err, DataError::Engine { context: "error inserting data", .. }));
    assert_eq!(books.count(&ctx, &Specification::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn cancelled_context_cannot_begin() {
    let (tx, repo) = setup().await;
    let token = CancellationToken::new();
    token.cancel();
    let ctx = Context::background().with_cancellation(token);

    let err = tx.begin(&ctx).await.unwrap_err();
    assert!(err.is_transaction());

    let err = repo.find_all(&ctx, &Specification::new()).await.unwrap_err();
    assert!(matches!(err, DataError::Cancelled));
}

#[tokio::test]
async fn waiting_for_a_connection_honours_the_deadline() {
    let (tx, repo) = setup().await;

    // The only connection is held by this transaction.
    let tx_ctx = tx.begin(&Context::background()).await.unwrap();

    let short = Context::background().with_timeout(Duration::from_millis(50));
    let err = repo.count(&short, &Specification::new()).await.unwrap_err();
    assert!(matches!(err, DataError::DeadlineExceeded));

    tx.rollback(&tx_ctx).await;
    assert_eq!(total(&repo).await, 0);
}

#[tokio::test]
async fn held_connection_blocks_calls_on_the_same_transaction() {
    let (tx, repo) = setup().await;
    let tx_ctx = tx.begin(&Context::background()).await.unwrap();

    let conn = repo.get_connection(&tx_ctx).await.unwrap();
    assert!(conn.in_transaction());

    let short = tx_ctx.with_timeout(Duration::from_millis(50));
    let err = repo.insert(&short, Author::new("alice", 30)).await.unwrap_err();
    assert!(matches!(err, DataError::DeadlineExceeded));

    drop(conn);
    repo.insert(&tx_ctx, Author::new("alice", 30)).await.unwrap();
    tx.commit(&tx_ctx).await.unwrap();
    assert_eq!(total(&repo).await, 1);
}

#[tokio::test]
async fn failed_commit_is_a_transaction_error() {
    let (tx, repo) = setup().await;
    let pool = repo.pool().clone();
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await.unwrap();
    sqlx::query("CREATE TABLE publishers (id INTEGER PRIMARY KEY)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "CREATE TABLE editions (
            id INTEGER PRIMARY KEY,
            publisher_id BIGINT NOT NULL
                REFERENCES publishers(id) DEFERRABLE INITIALLY DEFERRED
        )",
    )
    .execute(&pool)
    .await
    .unwrap();

    let err = tx
        .within_transaction(&Context::background(), |ctx| {
            let repo = repo.clone();
            async move {
                let mut conn = repo.get_connection(&ctx).await?;
                // Deferred: the dangling reference only fails at commit.
                sqlx::query("INSERT INTO editions (publisher_id) VALUES (42)")
                    .execute(conn.executor()?)
                    .await
                    .map_err(|e| DataError::engine("error inserting data", e))?;
                Ok::<_, DataError>(())
            }
        })
        .await
        .unwrap_err();

    assert!(err.is_transaction());
    assert!(err.to_string().contains("FOREIGN KEY"), "{err}");

    let editions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM editions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(editions, 0);
}
