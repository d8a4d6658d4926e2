#![allow(dead_code)]

use ambit_data::prelude::*;
use ambit_data_sqlx::{connect, DatabaseConfig, RelationLoader, SqlxEntity};
use sqlx::AnyPool;

const SCHEMA: &[&str] = &[
    "CREATE TABLE authors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        age BIGINT NOT NULL,
        created_at BIGINT NOT NULL,
        deleted_at BIGINT
    )",
    "CREATE TABLE books (
        id TEXT PRIMARY KEY,
        author_id BIGINT NOT NULL,
        title TEXT NOT NULL,
        created_at BIGINT NOT NULL,
        updated_at BIGINT NOT NULL,
        deleted_at BIGINT
    )",
];

/// A single-connection in-memory SQLite pool with the test schema.
///
/// The whole database lives in that one connection, so code under test must
/// not touch the pool while a transaction is open on it.
pub async fn pool() -> AnyPool {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let mut config = DatabaseConfig::new("sqlite::memory:");
    config.max_connections = 1;
    config.acquire_timeout = std::time::Duration::from_secs(5);
    let pool = connect(&config).await.unwrap();
    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool
}

#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub created_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
    #[sqlx(skip)]
    pub books: Vec<Book>,
}

impl Author {
    pub fn new(name: &str, age: i64) -> Self {
        Self {
            name: name.to_string(),
            age,
            ..Default::default()
        }
    }

    /// Fix the creation time, for deterministic ordering.
    pub fn created(mut self, millis: i64) -> Self {
        self.created_at = Timestamp::from_millis(millis).unwrap();
        self
    }
}

#[derive(Debug, Default)]
pub struct AuthorFilter {
    pub name: Option<String>,
    pub age: Option<i64>,
}

impl Filter for AuthorFilter {
    fn conditions(&self) -> Vec<(&'static str, Value)> {
        let mut out = Vec::new();
        if let Some(name) = &self.name {
            out.push(("name", name.into()));
        }
        if let Some(age) = self.age {
            out.push(("age", age.into()));
        }
        out
    }
}

impl Entity for Author {
    type Filter = AuthorFilter;

    fn table_name() -> &'static str {
        "authors"
    }

    fn id(&self) -> Value {
        if self.id == 0 {
            Value::Null
        } else {
            self.id.into()
        }
    }

    fn values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("name", (&self.name).into()),
            ("age", self.age.into()),
            ("created_at", self.created_at.into()),
            ("deleted_at", self.deleted_at.into()),
        ]
    }

    fn before_insert(&mut self) {
        if self.created_at == Timestamp::default() {
            self.created_at = Timestamp::now();
        }
    }
}

impl SqlxEntity for Author {
    async fn preload(
        authors: &mut [Self],
        relation: &str,
        loader: &mut RelationLoader<'_>,
    ) -> Result<(), DataError> {
        match relation {
            "Books" => {
                let ids = authors.iter().map(|a| a.id.into()).collect();
                let books: Vec<Book> = loader.fetch_by("author_id", ids).await?;
                for author in authors.iter_mut() {
                    author.books = books
                        .iter()
                        .filter(|b| b.author_id == author.id)
                        .cloned()
                        .collect();
                }
                Ok(())
            }
            other => Err(ambit_data_sqlx::unknown_relation::<Self>(other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct Book {
    #[sqlx(flatten)]
    pub base: BaseEntity,
    pub author_id: i64,
    pub title: String,
}

impl Book {
    pub fn new(author_id: i64, title: &str) -> Self {
        Self {
            author_id,
            title: title.to_string(),
            ..Default::default()
        }
    }
}

impl Entity for Book {
    type Filter = ();

    fn table_name() -> &'static str {
        "books"
    }

    fn id(&self) -> Value {
        self.base.id_value()
    }

    fn values(&self) -> Vec<(&'static str, Value)> {
        let mut values = vec![
            ("author_id", self.author_id.into()),
            ("title", (&self.title).into()),
        ];
        values.extend(self.base.values());
        values
    }

    fn before_insert(&mut self) {
        self.base.touch_insert();
    }

    fn before_update(&mut self) {
        self.base.touch_update();
    }
}

impl SqlxEntity for Book {}
